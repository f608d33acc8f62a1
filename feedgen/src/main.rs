use std::{
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use clap::{
    Parser,
    ValueEnum,
};
use feedgen::{
    ops::Collection,
    storage_mem::MemStorage,
    storage_sqlite::SqliteStorage,
    FeedFilter,
    Ingester,
    KeywordFilter,
    Storage,
};
use firehose::{
    DefaultJetstreamEndpoints,
    ReplayTransport,
    SubscriptionConfig,
    SubscriptionMode,
    WebSocketTransport,
};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Index keyword posts from the atproto firehose for a feed generator
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Streams to subscribe to, comma separated
    #[arg(
        long,
        env = "FEEDGEN_SUBSCRIPTION_MODE",
        value_delimiter = ',',
        default_value = "jetstream",
        ignore_case = true
    )]
    #[clap(value_enum)]
    subscription_mode: Vec<Mode>,
    /// Relay to use for the firehose mode
    #[arg(long, env = "FEEDGEN_SUBSCRIPTION_FIREHOSE_ENDPOINT", default_value = "wss://bsky.network")]
    firehose_endpoint: String,
    /// Jetstream server to connect to. Provide either a wss:// URL, or a shorhand value:
    /// 'us-east-1', 'us-east-2', 'us-west-1', or 'us-west-2'
    #[arg(
        long,
        env = "FEEDGEN_SUBSCRIPTION_JETSTREAM_ENDPOINT",
        default_value = "wss://jetstream1.us-east.bsky.network"
    )]
    jetstream_endpoint: String,
    /// Turbostream server to connect to
    #[arg(long, env = "FEEDGEN_SUBSCRIPTION_TURBOSTREAM_ENDPOINT", default_value = "wss://api.graze.social")]
    turbostream_endpoint: String,
    /// Milliseconds to wait before reconnecting a dropped stream
    #[arg(long, env = "FEEDGEN_SUBSCRIPTION_RECONNECT_DELAY", default_value_t = 3000)]
    reconnect_delay: u64,
    /// Save the stream cursor every this many events
    #[arg(
        long,
        env = "FEEDGEN_CHECKPOINT_INTERVAL",
        default_value_t = 20,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    checkpoint_interval: u64,
    /// Storage backend to use
    #[arg(long)]
    #[clap(value_enum, default_value_t = StorageBackend::Sqlite)]
    backend: StorageBackend,
    /// Where the sqlite backend keeps its database. ':memory:' keeps nothing on disk
    #[arg(long, env = "FEEDGEN_SQLITE_LOCATION", default_value = ":memory:")]
    sqlite_location: PathBuf,
    /// Posts mentioning this are included in the feed
    #[arg(long, default_value = "alf")]
    keyword: String,
    /// Also match the keyword against image alt text
    #[arg(long, action)]
    match_alt_text: bool,
    /// Include replies in the feed
    #[arg(long, action)]
    include_replies: bool,
    /// Saved jsonl from the stream to use instead of a live subscription
    #[arg(long)]
    fixture: Option<PathBuf>,
    /// Prefix for the user-agent sent when connecting
    #[arg(long)]
    user_agent: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Firehose,
    Jetstream,
    Turbostream,
}

impl From<Mode> for SubscriptionMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Firehose => SubscriptionMode::Firehose,
            Mode::Jetstream => SubscriptionMode::Jetstream,
            Mode::Turbostream => SubscriptionMode::Turbostream,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum StorageBackend {
    Memory,
    Sqlite,
}

impl Args {
    fn endpoint(&self, mode: SubscriptionMode) -> String {
        match mode {
            SubscriptionMode::Firehose => self.firehose_endpoint.clone(),
            SubscriptionMode::Jetstream => {
                DefaultJetstreamEndpoints::endpoint_or_shortcut(&self.jetstream_endpoint)
            }
            SubscriptionMode::Turbostream => self.turbostream_endpoint.clone(),
        }
    }

    fn filter(&self) -> Arc<dyn FeedFilter> {
        let mut filter = KeywordFilter::new(&self.keyword);
        filter.match_alt_text = self.match_alt_text;
        filter.include_replies = self.include_replies;
        Arc::new(filter)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    if args.subscription_mode.is_empty() {
        anyhow::bail!("at least one subscription mode is required");
    }
    if args.fixture.is_some() && args.subscription_mode.len() > 1 {
        anyhow::bail!("--fixture replays a single stream, pick one subscription mode");
    }

    println!("starting with storage backend: {:?}...", args.backend);
    match args.backend {
        StorageBackend::Memory => run(MemStorage::new(), args).await,
        StorageBackend::Sqlite => {
            let storage = SqliteStorage::open(&args.sqlite_location)?;
            run(storage, args).await
        }
    }
}

async fn run(storage: impl Storage, args: Args) -> anyhow::Result<()> {
    let stay_alive = CancellationToken::new();
    ctrlc::set_handler({
        let mut desperation: u8 = 0;
        let stay_alive = stay_alive.clone();
        move || match desperation {
            0 => {
                println!("ok, shutting down...");
                stay_alive.cancel();
                desperation += 1;
            }
            1.. => panic!("fine, panicking!"),
        }
    })?;

    let filter = args.filter();
    let mut ingesters = JoinSet::new();
    for mode in args.subscription_mode.iter().copied().map(SubscriptionMode::from) {
        let config = SubscriptionConfig {
            endpoint: args.endpoint(mode),
            wanted_collections: Collection::wanted(),
            reconnect_delay: Duration::from_millis(args.reconnect_delay),
        };
        println!("subscribing to {mode} at {:?}...", config.endpoint);
        let storage = storage.clone();
        let filter = filter.clone();
        let stop = stay_alive.clone();
        let interval = args.checkpoint_interval;
        match &args.fixture {
            Some(fixture) => {
                println!("using fixture at {fixture:?}...");
                let transport = ReplayTransport::from_jsonl(fixture)?;
                let ingester = Ingester::new(mode, config, transport, storage, filter, interval)?;
                ingesters.spawn(ingester.run(stop));
            }
            None => {
                let transport = WebSocketTransport::new(args.user_agent.clone());
                let ingester = Ingester::new(mode, config, transport, storage, filter, interval)?;
                ingesters.spawn(ingester.run(stop));
            }
        }
    }

    while let Some(finished) = ingesters.join_next().await {
        match finished {
            Ok(stats) => log::info!("ingester finished: {stats:?}"),
            Err(e) => log::error!("ingester task failed: {e}"),
        }
    }

    println!("byeeee");

    Ok(())
}
