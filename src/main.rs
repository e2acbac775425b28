//! Binary entrypoint for the Empireworld CLI.
//!
//! Commands:
//! - `init` - write a starter `config.toml` and an empty ocean world
//! - `start` - load the world and run the tick loop until Ctrl-C
//! - `status` - print a summary of the stored world
//! - `save` - rewrite every world file from memory
//! - `annual` - force an annual world update
//! - `backup [--list] [--name <n>]` - archive the data directory
//!
//! See the library crate docs for module-level details: `empireworld::`.
use std::path::Path;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{info, warn};

use empireworld::config::Config;
use empireworld::logutil::SYSERR_TARGET;
use empireworld::server::{load_catalog, WorldServer};
use empireworld::storage::backup::{BackupManager, BackupType};
use empireworld::storage::WorldStore;

#[derive(Parser)]
#[command(name = "empireworld")]
#[command(about = "World and room state engine for a persistent map-based MUD")]
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
    /// Create a configuration file and a fresh ocean world
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },
    /// Run the world loop
    Start,
    /// Show world status and statistics
    Status,
    /// Rewrite every world file
    Save,
    /// Run the annual world update now
    Annual,
    /// Archive the data directory
    Backup {
        /// List existing backups instead of creating one
        #[arg(short, long)]
        list: bool,
        /// Optional label for the archive
        #[arg(short, long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => {
            init_logging(&None, cli.verbose);
            info!("Initializing new world configuration");
            if Path::new(&cli.config).exists() && !force {
                warn!("{} already exists; use --force to overwrite it", cli.config);
            } else {
                Config::create_default(&cli.config).await?;
                info!("Configuration file created at {}", cli.config);
            }
            let config = Config::load(&cli.config).await?;
            let catalog = load_catalog(&config)?;
            let mut store = WorldStore::open(&config.storage.data_dir)?;
            if store.has_map() {
                warn!(
                    "{} already holds a world; leaving it untouched",
                    config.storage.data_dir
                );
                return Ok(());
            }
            let mut world = store.load_world(config.clone(), catalog)?;
            let report = store.save_whole_world(&mut world)?;
            info!(
                "Created a {}x{} ocean world in {} ({} map records)",
                config.world.width, config.world.height, config.storage.data_dir, report.map_records
            );
        }
        Commands::Start => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            info!("Starting Empireworld v{}", env!("CARGO_PKG_VERSION"));
            let mut server = WorldServer::new(config).await?;
            server.run().await?;
        }
        Commands::Status => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            let server = WorldServer::new(config).await?;
            server.show_status()?;
        }
        Commands::Save => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            let mut server = WorldServer::new(config).await?;
            let report = server.save_all()?;
            println!(
                "Saved {} map records, {} room files, {} empires",
                report.map_records, report.room_files, report.empires
            );
        }
        Commands::Annual => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            let mut server = WorldServer::new(config).await?;
            let report = server.run_annual_update()?;
            server.shutdown()?;
            println!("{:#?}", report);
        }
        Commands::Backup { list, name } => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            // holding the store lock keeps a running server from writing mid-archive
            let store = WorldStore::open(&config.storage.data_dir)?;
            let mut backups = BackupManager::from_config(store.data_dir(), &config.backup)?;
            if list {
                for meta in backups.list_backups() {
                    println!(
                        "{}  {:?}  {}  {} bytes  {}",
                        meta.id,
                        meta.backup_type,
                        meta.created_at.format("%Y-%m-%d %H:%M:%SZ"),
                        meta.size_bytes,
                        meta.name.as_deref().unwrap_or("-")
                    );
                }
            } else {
                let meta = backups.create_backup(name, BackupType::Manual)?;
                backups.apply_retention_policy()?;
                println!("Created backup {} ({} bytes)", meta.id, meta.size_bytes);
            }
        }
    }

    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let configured = config
        .as_ref()
        .and_then(|c| c.logging.level.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);
    let base_level = match verbosity {
        0 => configured,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let Some(cfg) = config else {
        builder.format(|fmt, record| {
            writeln!(
                fmt,
                "{} [{}] {}",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                record.level(),
                record.args()
            )
        });
        let _ = builder.try_init();
        return;
    };

    let log_file = cfg.logging.file.as_ref().and_then(|file| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(file)
            .ok()
    });
    let syserr_file = cfg.logging.syserr_file.as_ref().and_then(|file| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(file)
            .ok()
    });
    let log_file = log_file.map(|f| std::sync::Arc::new(std::sync::Mutex::new(f)));
    let syserr_file = syserr_file.map(|f| std::sync::Arc::new(std::sync::Mutex::new(f)));

    // Without a log file the console is the only sink, TTY or not
    let echo = atty::is(atty::Stream::Stdout) || log_file.is_none();

    builder.format(move |fmt, record| {
        let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
        let line = format!("{} [{}] {}", ts, record.level(), record.args());

        if let Some(file) = &log_file {
            if let Ok(mut guard) = file.lock() {
                let _ = writeln!(guard, "{}", line);
            }
        }
        if record.target() == SYSERR_TARGET {
            if let Some(file) = &syserr_file {
                if let Ok(mut guard) = file.lock() {
                    let _ = writeln!(guard, "{}", line);
                }
            }
        }
        if echo {
            writeln!(fmt, "{}", line)
        } else {
            Ok(())
        }
    });
    let _ = builder.try_init();
}
