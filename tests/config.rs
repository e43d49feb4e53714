use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use assert_matches::assert_matches;

use shelf_shuffler::config::{Config, ConfigLoader, DEFAULT_LISTEN, DEFAULT_USER_AGENT};
use shelf_shuffler::error::ShelfError;

fn write_config(dir: &tempfile::TempDir, content: &str) -> String {
    let path = dir.path().join("shelf-shuffler.json");
    fs::write(&path, content).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn load_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"{
            "base_url": "http://localhost:8080/xmlapi2/",
            "max_retries": 2,
            "retry_delay_ms": 10,
            "chunk_size": 5,
            "cache_dir": "/tmp/shelf-cache",
            "listen": "0.0.0.0:8000"
        }"#,
    );

    let resolved = ConfigLoader::resolve(Some(path.as_str())).unwrap();
    assert_eq!(resolved.upstream.base_url, "http://localhost:8080/xmlapi2");
    assert_eq!(resolved.upstream.retry.max_retries, 2);
    assert_eq!(resolved.upstream.retry.delay, Duration::from_millis(10));
    assert_eq!(resolved.upstream.user_agent, DEFAULT_USER_AGENT);
    assert_eq!(resolved.chunk_size, 5);
    assert_eq!(resolved.cache_dir, Some(PathBuf::from("/tmp/shelf-cache")));
    assert_eq!(resolved.listen, "0.0.0.0:8000");
}

#[test]
fn empty_object_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "{}");
    let resolved = ConfigLoader::resolve(Some(path.as_str())).unwrap();
    assert_eq!(resolved.chunk_size, 20);
    assert_eq!(resolved.upstream.retry.max_retries, 5);
    assert_eq!(resolved.listen, DEFAULT_LISTEN);
    assert!(resolved.cache_dir.is_none());
}

#[test]
fn explicit_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nope.json").to_string_lossy().into_owned();
    let err = ConfigLoader::resolve(Some(path.as_str())).unwrap_err();
    assert_matches!(err, ShelfError::ConfigRead(_));
}

#[test]
fn invalid_json_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "{ chunk_size: ");
    let err = ConfigLoader::resolve(Some(path.as_str())).unwrap_err();
    assert_matches!(err, ShelfError::ConfigParse(_));
}

#[test]
fn zero_chunk_size_is_rejected() {
    let config = Config {
        chunk_size: Some(0),
        ..Config::default()
    };
    let err = ConfigLoader::resolve_with_token(config, None).unwrap_err();
    assert_matches!(err, ShelfError::ConfigParse(message) if message.contains("chunk_size"));
}

#[test]
fn file_token_is_used_without_environment() {
    let config: Config = serde_json::from_str(r#"{ "api_token": "secret" }"#).unwrap();
    let resolved = ConfigLoader::resolve_with_token(config, None).unwrap();
    assert_eq!(resolved.upstream.api_token.as_deref(), Some("secret"));
}
