//! Referral Dashboard CLI
//!
//! Terminal rendition of the referral dashboard:
//! - Show the current stats once
//! - Watch them update live
//! - Copy the referral link
//! - Print share links

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use referral_dashboard::backend::{
    BackendContext, DisabledRealtime, RealtimeClient, RealtimeClientConfig, RealtimeSource,
    SupabaseClient,
};
use referral_dashboard::config::{generate_default_config, Config, LoggingConfig};
use referral_dashboard::dashboard::{DashboardView, Screen};
use referral_dashboard::share::{
    CommandClipboard, ConsoleNotifier, ReferralLink, ShareLink, ShareTarget,
};

#[derive(Parser)]
#[command(name = "referral-dashboard")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Live referral earnings dashboard")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: user config dir, then ./config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the dashboard once
    Show,

    /// Show the dashboard and refresh it on every earnings change
    Watch,

    /// Copy the referral link to the clipboard
    Link,

    /// Print a social share link
    Share {
        #[arg(value_enum)]
        target: ShareTarget,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    init_tracing(&config.logging);

    match cli.command {
        Commands::Show => {
            let view = DashboardView::from_config(backend_context(&config, false).await?, &config);
            let dashboard = view.mount().await;
            dashboard.settled().await;
            print_screen(&dashboard.render(), cli.format)?;
            dashboard.unmount();
        }

        Commands::Watch => {
            let view = DashboardView::from_config(backend_context(&config, true).await?, &config);
            let dashboard = view.mount().await;
            let mut changes = dashboard.changes();
            let mut shown: Option<Screen> = None;

            loop {
                let screen = dashboard.render();
                if shown.as_ref() != Some(&screen) {
                    print_screen(&screen, cli.format)?;
                    shown = Some(screen);
                }

                tokio::select! {
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Interrupted, stopping");
                        break;
                    }
                }
            }

            dashboard.unmount();
        }

        Commands::Link => {
            let link = ReferralLink::new(config.referral.link.clone());
            match cli.format {
                OutputFormat::Text => println!("{}", link),
                OutputFormat::Json => println!("{}", serde_json::to_string(&link)?),
            }
            link.copy(&CommandClipboard::default(), &ConsoleNotifier);
        }

        Commands::Share { target } => {
            let share = ShareLink::from(target);
            match cli.format {
                OutputFormat::Text => println!("{}: {}", share.label, share.url),
                OutputFormat::Json => println!("{}", serde_json::to_string(&share)?),
            }
        }

        Commands::Config { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)
                        .with_context(|| format!("writing config to {:?}", path))?;
                    println!("Config written to {:?}", path);
                }
                None => print!("{}", content),
            }
        }
    }

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("referral_dashboard={}", logging.level).into());
    let registry = tracing_subscriber::registry().with(filter);

    if logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Build the collaborators; without `live` no websocket is opened
async fn backend_context(config: &Config, live: bool) -> anyhow::Result<BackendContext> {
    let client = Arc::new(
        SupabaseClient::new(config.backend.clone()).context("creating backend client")?,
    );

    let realtime: Arc<dyn RealtimeSource> = if live {
        let realtime_config = RealtimeClientConfig::from_config(&config.backend, &config.realtime);
        match RealtimeClient::connect(realtime_config).await {
            Ok(client) => Arc::new(client),
            Err(e) => {
                tracing::warn!(error = %e, "Realtime unavailable, showing static dashboard");
                Arc::new(DisabledRealtime)
            }
        }
    } else {
        Arc::new(DisabledRealtime)
    };

    Ok(BackendContext::supabase(client, realtime))
}

fn print_screen(screen: &Screen, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => {
            println!("{}", screen);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(screen)?);
        }
    }
    Ok(())
}
