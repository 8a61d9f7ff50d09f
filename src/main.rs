//! insider-threat entrypoint: train, score, serve the API, or browse the dashboard.

use clap::{Parser, Subcommand, ValueEnum};
use insider_threat::{
    config::{AppConfig, CONFIG_PATH_ENV},
    dashboard::{self, DashboardClient},
    logging::{RankingEvent, StructuredLogger},
    pipeline::{train_and_store, warm_start, warm_start_or_untrained},
    server::{self, AppState},
    storage::{store_secret, SecureStore},
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "insider-threat", version, about = "Insider threat detection over activity logs")]
struct Cli {
    /// Config file (JSON); falls back to $INSIDER_CONFIG_PATH, then config.json
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load CSVs, train, and store a snapshot
    Train,
    /// Print the user ranking
    Score {
        #[arg(long)]
        top_n: Option<usize>,
        /// One JSON object per line instead of a table
        #[arg(long)]
        ndjson: bool,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
    /// Render a dashboard page from a running API
    Dashboard {
        #[arg(value_enum, default_value_t = Page::Home)]
        page: Page,
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        top_n: Option<usize>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Page {
    Home,
    Risky,
    Features,
    Raw,
    Refresh,
}

fn config_path(cli: &Cli) -> PathBuf {
    cli.config.clone().unwrap_or_else(|| {
        std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.json"))
    })
}

fn open_store(config: &AppConfig) -> anyhow::Result<SecureStore> {
    let secret = store_secret(&config.store);
    Ok(SecureStore::open(&config.store.path, &secret)?)
}

fn run_dashboard(config: &AppConfig, page: Page, user: Option<String>, top_n: Option<usize>) -> anyhow::Result<()> {
    let client = DashboardClient::new(&config.dashboard)?;
    let need_user = || {
        user.clone()
            .ok_or_else(|| anyhow::anyhow!("--user is required for this page"))
    };
    let out = match page {
        Page::Home => dashboard::render_home(&client.risky_users(top_n)?),
        Page::Risky => dashboard::render_risky(&client.risky_users(top_n)?),
        Page::Features => {
            let user = need_user()?;
            dashboard::render_features(&user, &client.user_features(&user)?)
        }
        Page::Raw => {
            let user = need_user()?;
            dashboard::render_raw(&user, &client.user_raw(&user)?)
        }
        Page::Refresh => {
            client.refresh()?;
            "Model refreshed\n".to_string()
        }
    };
    print!("{out}");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::try_load(&config_path(&cli))?;
    if let Some(dir) = cli.data_dir.clone() {
        config.data_dir = dir;
    }

    StructuredLogger::init(config.log.json, &config.log.level);
    info!(data_dir = ?config.data_dir, "insider-threat starting");

    match cli.command {
        Command::Train => {
            let store = open_store(&config)?;
            let pipeline = train_and_store(config, Some(&store))?;
            info!(users = pipeline.user_count(), "training complete");
        }
        Command::Score { top_n, ndjson } => {
            let store = open_store(&config)?;
            let pipeline = warm_start(config, Some(&store))?;
            let top_n = top_n.unwrap_or(pipeline.user_count());
            let mut stdout = std::io::stdout().lock();
            if ndjson {
                for r in pipeline.rankings().iter().take(top_n) {
                    StructuredLogger::emit_json(&RankingEvent::from_result(r), &mut stdout)?;
                }
            } else {
                print!("{}", dashboard::render_risky(&pipeline.risky_users(top_n)));
            }
        }
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let store = Arc::new(open_store(&config)?);
            let pipeline = warm_start_or_untrained(config, Some(store.as_ref()))?;
            let state = AppState::new(pipeline, Some(store));
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(server::serve(state, &bind))?;
            info!("insider-threat stopping");
        }
        Command::Dashboard { page, user, top_n } => {
            run_dashboard(&config, page, user, top_n)?;
        }
    }

    Ok(())
}
