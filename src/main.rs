use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kyc_capture::config::DEFAULT_CONFIG_PATH;
use kyc_capture::notify::{NatsNotifier, Notifier, TelegramBot};
use kyc_capture::submission::SubmissionReader;
use kyc_capture::{create_router, AppState, Config, InMemoryService, RestService};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "kyc-capture")]
#[command(about = "Identity capture: timed selfie video, document photo, submission relay")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the notify relay and review feed
    Serve {
        /// Path to configuration file (extension optional)
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: String,
    },
    /// Run one capture session against the synthetic camera
    Demo {
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: String,

        /// Hide the page this many seconds into the recording
        #[arg(long, value_name = "SECS")]
        hide_after: Option<u64>,
    },
}

fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("kyc_capture=info,tower_http=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    match args.command {
        Command::Serve { config } => serve(&config).await,
        Command::Demo { config, hide_after } => {
            let cfg = Config::load(&config)?;
            let outcome =
                kyc_capture::demo::run_demo(&cfg, hide_after.map(Duration::from_secs)).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
    }
}

async fn serve(path: &str) -> Result<()> {
    let cfg = Config::load(path)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    let reader: Arc<dyn SubmissionReader> = if cfg.storage.url.is_empty() {
        warn!("No storage url configured, serving the in-memory service");
        Arc::new(InMemoryService::new())
    } else {
        info!("Reading submissions from {}", cfg.storage.url);
        Arc::new(RestService::new(&cfg.storage)?)
    };

    let notifier: Option<Arc<dyn Notifier>> = match (
        cfg.notify.telegram_bot_token.as_deref(),
        cfg.notify.nats_url.as_deref(),
    ) {
        (Some(token), _) if !token.is_empty() => Some(Arc::new(TelegramBot::new(token))),
        (_, Some(url)) => Some(Arc::new(NatsNotifier::connect(url).await?)),
        _ => {
            warn!("No bot token or NATS url configured, /api/notify will fail");
            None
        }
    };

    let state = AppState::new(notifier, reader)
        .with_admin_chat_id(cfg.submission().admin_chat_id)
        .with_default_locale(cfg.notify.default_locale);
    let app = create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
