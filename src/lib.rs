pub mod bgg;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod normalizer;
pub mod output;
pub mod queue;
pub mod resolver;
pub mod server;
pub mod store;
pub mod xml;
