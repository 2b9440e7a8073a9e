use anyhow::{anyhow, Context, Error};
use std::path::PathBuf;
use std::sync::Arc;
use structopt::StructOpt;
use tracing_subscriber::filter::LevelFilter;

use chart_streams as cs;
use cs::config::Config;

fn parse_level(s: &str) -> Result<LevelFilter, Error> {
    s.parse::<LevelFilter>()
        .map_err(|_| anyhow!("failed to parse level '{}'", s))
}

#[derive(StructOpt)]
#[structopt(name = "chart-streams")]
struct Opts {
    /// Source Git URL (http/https/file scheme)
    #[structopt(long = "repo-url", env = "CHART_STREAMS_REPO_URL")]
    repo_url: String,

    /// Shallow-clone depth; 0 means full history. Also caps per-branch
    /// traversal during indexing
    #[structopt(
        long = "clone-depth",
        env = "CHART_STREAMS_CLONE_DEPTH",
        default_value = "0"
    )]
    clone_depth: u32,

    /// Base path inside the repository under which chart directories live
    #[structopt(
        long = "relative-dir",
        env = "CHART_STREAMS_RELATIVE_DIR",
        default_value = "/"
    )]
    relative_dir: String,

    /// `host:port` HTTP bind address
    #[structopt(
        long = "listen-addr",
        env = "CHART_STREAMS_LISTEN_ADDR",
        default_value = "0.0.0.0:8080"
    )]
    listen_addr: String,

    /// Local filesystem path used for the bare clone
    #[structopt(
        long = "working-dir",
        env = "CHART_STREAMS_WORKING_DIR",
        parse(from_os_str),
        default_value = "chart-streams-workdir"
    )]
    working_dir: PathBuf,

    /// Delete working-dir before cloning
    #[structopt(long = "force-clone", env = "CHART_STREAMS_FORCE_CLONE")]
    force_clone: bool,

    #[structopt(
        long = "log-level",
        env = "CHART_STREAMS_LOG_LEVEL",
        default_value = "info",
        parse(try_from_str = parse_level)
    )]
    log_level: LevelFilter,

    /// Output log messages as json
    #[structopt(long = "json", env = "CHART_STREAMS_JSON")]
    json: bool,

    /// HMAC secret for the GitHub webhook; empty means unauthenticated
    #[structopt(
        long = "github-webhook-secret",
        env = "CHART_STREAMS_GITHUB_WEBHOOK_SECRET",
        default_value = ""
    )]
    github_webhook_secret: String,
}

fn init_logging(opts: &Opts) -> Result<(), Error> {
    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env();
    env_filter = env_filter.add_directive(opts.log_level.into());

    let subscriber = tracing_subscriber::FmtSubscriber::builder().with_env_filter(env_filter);

    if opts.json {
        tracing::subscriber::set_global_default(subscriber.json().finish())
            .context("failed to set default subscriber")
    } else {
        tracing::subscriber::set_global_default(subscriber.finish())
            .context("failed to set default subscriber")
    }
}

async fn real_main() -> Result<(), Error> {
    let opts = Opts::from_args();
    init_logging(&opts)?;

    let config = Config {
        repo_url: opts.repo_url,
        clone_depth: opts.clone_depth,
        relative_dir: opts.relative_dir,
        listen_addr: opts.listen_addr,
        working_dir: opts.working_dir,
        force_clone: opts.force_clone,
        github_webhook_secret: opts.github_webhook_secret,
    };

    tracing::info!(repo_url = %config.repo_url, "opening repository");
    let backend = Arc::new(cs::git::Backend::open(&config).context("failed to open repository")?);

    let base = config.normalized_relative_dir().to_owned();

    tracing::info!("building initial index");
    let initial = cs::index::build(&backend, &base, config.clone_depth)
        .context("failed building initial index")?;
    let cache = Arc::new(cs::index::SharedCache::new(initial));

    let reindex = cs::worker::spawn(backend.clone(), base.clone(), config.clone_depth, cache.clone());

    let state = cs::server::AppState {
        cache,
        backend,
        base,
        reindex,
        webhook_secret: config.github_webhook_secret.clone(),
    };

    let app = cs::server::router(state);

    tracing::info!(addr = %config.listen_addr, "listening");
    axum::Server::bind(&config.listen_addr.parse().context("invalid listen-addr")?)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server error")
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() {
    match real_main().await {
        Ok(()) => {}
        Err(e) => {
            tracing::error!("{:#}", e);
            std::process::exit(1);
        }
    }
}
