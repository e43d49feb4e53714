use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use shelf_shuffler::bgg::{BggClient, BggHttpClient};
use shelf_shuffler::cache::{CACHE_KEY, FileGameCache, GameCache, MemoryGameCache};
use shelf_shuffler::config::{ConfigLoader, ResolvedConfig};
use shelf_shuffler::domain::{CollectionItem, Username, filter_collection, parse_game_ids};
use shelf_shuffler::error::ShelfError;
use shelf_shuffler::output::{JsonOutput, LogSink};
use shelf_shuffler::queue::PrintQueue;
use shelf_shuffler::resolver::{BulkAddResult, Resolver};
use shelf_shuffler::server::{self, AppState};
use shelf_shuffler::store::Store;

#[derive(Parser)]
#[command(name = "shelf-shuffler")]
#[command(about = "Mirror a BoardGameGeek collection and build a print queue")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    /// Keep game details in memory only for this run
    #[arg(long, global = true)]
    no_cache: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "List the games a user owns")]
    Collection(CollectionArgs),
    #[command(about = "Show details for one id or a comma-joined list")]
    Game(GameArgs),
    #[command(about = "Resolve a whole collection into a print queue")]
    AddAll(CollectionArgs),
    #[command(about = "Inspect or clear the game detail cache")]
    Cache(CacheArgs),
    #[command(about = "Run the local HTTP service")]
    Serve(ServeArgs),
}

#[derive(Args)]
struct CollectionArgs {
    username: String,

    /// Only keep games whose name contains this text
    #[arg(long)]
    search: Option<String>,
}

#[derive(Args)]
struct GameArgs {
    ids: String,
}

#[derive(Args)]
struct CacheArgs {
    #[command(subcommand)]
    command: CacheCommand,
}

#[derive(Subcommand)]
enum CacheCommand {
    #[command(about = "Show where the cache lives and how many games it holds")]
    Info,
    #[command(about = "Remove every cached game")]
    Clear,
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long)]
    listen: Option<String>,
}

#[derive(Serialize)]
struct CacheInfo {
    path: Option<String>,
    games: usize,
}

#[derive(Serialize)]
struct AddAllOutput<'a> {
    #[serde(flatten)]
    summary: BulkAddResult,
    queue: &'a PrintQueue,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<ShelfError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &ShelfError) -> u8 {
    match error.root() {
        ShelfError::InvalidGameId(_)
        | ShelfError::InvalidUsername(_)
        | ShelfError::GameNotFound(_) => 2,
        ShelfError::UpstreamHttp(_)
        | ShelfError::UpstreamStatus { .. }
        | ShelfError::StillProcessing { .. }
        | ShelfError::XmlParse(_)
        | ShelfError::MalformedPayload(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Collection(args) => run_collection(args, &config),
        Commands::Game(args) => {
            let resolver = build_resolver(&config, cli.no_cache)?;
            let ids = parse_game_ids(&args.ids)?;
            let games = resolver.resolve_ids(&ids, &LogSink)?;
            JsonOutput::print(&games).into_diagnostic()
        }
        Commands::AddAll(args) => {
            let resolver = build_resolver(&config, cli.no_cache)?;
            let items = fetch_filtered(resolver.client(), &args)?;
            let mut queue = PrintQueue::new();
            let summary = resolver.add_all_to_queue(&items, &mut queue, &LogSink)?;
            eprintln!("Added {} items to queue", summary.resolved);
            JsonOutput::print(&AddAllOutput {
                summary,
                queue: &queue,
            })
            .into_diagnostic()
        }
        Commands::Cache(args) => run_cache(args, &config, cli.no_cache),
        Commands::Serve(args) => run_serve(args, &config),
    }
}

fn run_collection(args: CollectionArgs, config: &ResolvedConfig) -> miette::Result<()> {
    let client = BggHttpClient::new(&config.upstream)?;
    let items = fetch_filtered(&client, &args)?;
    JsonOutput::print(&items).into_diagnostic()
}

fn fetch_filtered<C: BggClient>(
    client: &C,
    args: &CollectionArgs,
) -> Result<Vec<CollectionItem>, ShelfError> {
    let username: Username = args.username.parse()?;
    let items = client.fetch_collection(&username)?;
    Ok(match args.search.as_deref() {
        Some(search) => filter_collection(&items, search)
            .into_iter()
            .cloned()
            .collect(),
        None => items,
    })
}

fn run_cache(args: CacheArgs, config: &ResolvedConfig, no_cache: bool) -> miette::Result<()> {
    let store = if no_cache { None } else { Some(build_store(config)?) };
    let cache = open_cache(store.clone());
    match args.command {
        CacheCommand::Info => JsonOutput::print(&CacheInfo {
            path: store.map(|store| store.key_path(CACHE_KEY).to_string()),
            games: cache.len(),
        })
        .into_diagnostic(),
        CacheCommand::Clear => {
            cache.clear();
            eprintln!("Game cache cleared");
            Ok(())
        }
    }
}

fn run_serve(args: ServeArgs, config: &ResolvedConfig) -> miette::Result<()> {
    let listen = args.listen.unwrap_or_else(|| config.listen.clone());
    let addr: SocketAddr = listen
        .parse()
        .map_err(|err| ShelfError::ConfigParse(format!("listen address {listen}: {err}")))?;

    // Built outside the runtime: the blocking client must not be dropped on
    // an async worker thread.
    let client: Arc<dyn BggClient> = Arc::new(BggHttpClient::new(&config.upstream)?);
    let state = AppState::new(Arc::clone(&client));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;
    runtime.block_on(server::serve(addr, state))?;
    drop(runtime);
    drop(client);
    Ok(())
}

fn build_store(config: &ResolvedConfig) -> Result<Store, ShelfError> {
    match &config.cache_dir {
        Some(dir) => {
            let root = Utf8PathBuf::from_path_buf(dir.clone())
                .map_err(|_| ShelfError::Filesystem("cache_dir is not valid UTF-8".to_string()))?;
            Ok(Store::new_with_root(root))
        }
        None => Store::new(),
    }
}

fn open_cache(store: Option<Store>) -> Box<dyn GameCache> {
    match store {
        Some(store) => Box::new(FileGameCache::new(store)),
        None => Box::new(MemoryGameCache::new()),
    }
}

fn build_resolver(
    config: &ResolvedConfig,
    no_cache: bool,
) -> Result<Resolver<BggHttpClient, Box<dyn GameCache>>, ShelfError> {
    let store = if no_cache { None } else { Some(build_store(config)?) };
    let client = BggHttpClient::new(&config.upstream)?;
    Ok(Resolver::with_chunk_size(
        client,
        open_cache(store),
        config.chunk_size,
    ))
}
