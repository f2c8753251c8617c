//! Binary entrypoint for the rpgchat CLI.
//!
//! Commands:
//! - `start [--bind <addr>]` - run the server, creating a blank map file if none exists
//! - `init` - write a starter `config.toml` and a blank map file
//! - `status` - print the configuration summary and map dimensions
//!
//! See the library crate docs for module-level details: `rpgchat::`.
use std::str::FromStr;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{info, warn};

use rpgchat::config::Config;
use rpgchat::metrics;
use rpgchat::server::RpgServer;
use rpgchat::storage::{JsonMapStore, MapFile, MapStore, StorageError};

#[derive(Parser)]
#[command(name = "rpgchat")]
#[command(about = "A grid presence and chat server with channels, whispers and pathed movement")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Start {
        /// Listen address, overriding `server.bind` (e.g. 127.0.0.1:6000)
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Write a default configuration and a blank map
    Init,
    /// Show configuration and map summary
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start { bind } => {
            let mut config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            info!("Starting rpgchat v{}", env!("CARGO_PKG_VERSION"));

            if let Some(addr) = bind {
                config.server.bind = addr;
            }
            let server = RpgServer::from_config(&config).await?;
            server
                .run_until(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!("Failed to listen for shutdown signal: {}", e);
                        std::future::pending::<()>().await;
                    }
                })
                .await?;
            info!("Served {}", metrics::snapshot().summary());
        }
        Commands::Init => {
            init_logging(&None, cli.verbose);
            info!("Initializing new rpgchat configuration");
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);

            let cfg = Config::default();
            let store = JsonMapStore::new(&cfg.storage.map_file);
            if store.exists() {
                info!("Keeping existing map at {}", cfg.storage.map_file);
            } else {
                store.save(&MapFile::blank(cfg.world.width, cfg.world.height))?;
                info!(
                    "Blank {}x{} map created at {}",
                    cfg.world.width, cfg.world.height, cfg.storage.map_file
                );
            }
        }
        Commands::Status => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            show_status(&config);
        }
    }

    Ok(())
}

fn show_status(config: &Config) {
    println!("rpgchat v{}", env!("CARGO_PKG_VERSION"));
    println!("  server name:     {}", config.server.server_name);
    println!("  bind:            {}", config.server.bind);
    println!("  duplicate login: {:?}", config.server.duplicate_login);
    println!("  step delay:      {} ms", config.world.step_delay_ms);
    println!(
        "  rate limit:      {} tokens, 1 per {} ms",
        config.rate_limit.max_tokens, config.rate_limit.fill_interval_ms
    );
    println!("  travel ttl:      {} s", config.travel.token_ttl_secs);

    let store = JsonMapStore::new(&config.storage.map_file);
    match store.load() {
        Ok(map) => println!(
            "  map:             {} ({}x{})",
            config.storage.map_file, map.width, map.height
        ),
        Err(StorageError::Missing(_)) => println!(
            "  map:             {} (missing; a blank {}x{} map is created on start)",
            config.storage.map_file, config.world.width, config.world.height
        ),
        Err(e) => println!("  map:             {} (unreadable: {})", config.storage.map_file, e),
    }
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let configured = config
        .as_ref()
        .and_then(|cfg| log::LevelFilter::from_str(&cfg.logging.level).ok())
        .unwrap_or(log::LevelFilter::Info);
    let base_level = match verbosity {
        0 => configured,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config.as_ref().and_then(|cfg| {
        let path = cfg.logging.file.as_ref()?;
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });
    let security_path = config
        .as_ref()
        .and_then(|cfg| cfg.logging.security_file.clone());

    match log_file {
        Some(f) => {
            let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
            // Foreground runs echo to the console as well as the file
            let is_tty = atty::is(atty::Stream::Stdout);

            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());

                if let Ok(mut guard) = write_mutex.lock() {
                    let _ = writeln!(guard, "{}", line);
                }

                if record.target() == "security" {
                    if let Some(ref sec_path) = security_path {
                        if let Ok(mut sf) = std::fs::OpenOptions::new()
                            .create(true)
                            .append(true)
                            .open(sec_path)
                        {
                            let _ = writeln!(sf, "{}", line);
                        }
                    }
                }

                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        }
        None => {
            builder.format(|fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
            });
        }
    }
    let _ = builder.try_init();
}
