use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use modbot::application::errors::{BotError, ConfigError};
use modbot::application::messaging::DispatchOutcome;
use modbot::domain::entities::{Override, Subject};
use modbot::domain::traits::PermissionStore;
use modbot::infrastructure::adapters::console::ConsoleGateway;
use modbot::infrastructure::config::Config;
use modbot::infrastructure::database::SqlitePermissionStore;
use modbot::infrastructure::instance::InstanceLock;
use modbot::infrastructure::modules::{HostContext, ModuleLoader};
use modbot::infrastructure::storage::MemoryPermissionStore;
use modbot::Runtime;

#[derive(Parser)]
#[command(name = "modbot")]
#[command(about = "A modular chat-bot runtime", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot
    Run,
    /// Show version
    Version,
    /// Generate default config
    InitConfig,
    /// Show discovered module packages and their load order
    Modules,
    /// Grant or deny a permission node in a guild
    Permit {
        #[arg(long)]
        guild: u64,
        /// User the override applies to
        #[arg(long, conflicts_with = "role", required_unless_present = "role")]
        user: Option<u64>,
        /// Role the override applies to
        #[arg(long)]
        role: Option<u64>,
        /// Permission node, e.g. `base.module` or `fun.*`
        node: String,
        /// Limit the override to one channel
        #[arg(long)]
        channel: Option<u64>,
        #[arg(long)]
        deny: bool,
        /// Remove the override instead of setting it
        #[arg(long, conflicts_with = "deny")]
        remove: bool,
    },
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run => run_bot(&cli.config),
        Commands::Version => {
            println!("modbot v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::InitConfig => init_config(&cli.config),
        Commands::Modules => list_modules(&cli.config),
        Commands::Permit {
            guild,
            user,
            role,
            node,
            channel,
            deny,
            remove,
        } => {
            match user.map(Subject::User).or(role.map(Subject::Role)) {
                Some(subject) => permit(&cli.config, guild, subject, node, channel, deny, remove),
                None => Err(BotError::Internal("either --user or --role is required".to_string())),
            }
        }
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn load_config(config_path: &str) -> Config {
    let mut config = if Path::new(config_path).exists() {
        Config::load(config_path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config: {}, using defaults", e);
            Config::default()
        })
    } else {
        Config::default()
    };
    config.apply_env();
    config
}

fn run_bot(config_path: &str) -> Result<(), BotError> {
    let config = load_config(config_path);
    tracing::info!("Starting {}", config.bot.name);

    let _lock = InstanceLock::acquire(format!("{}.lock", config.bot.name))?;

    let store: Arc<dyn PermissionStore> = match &config.permissions.database {
        Some(path) => {
            let store = SqlitePermissionStore::new(path)?;
            tracing::info!("Permission database at {}", path.display());
            Arc::new(store)
        }
        None => {
            tracing::info!("Using in-memory permission store");
            Arc::new(MemoryPermissionStore::new())
        }
    };

    let console = config
        .adapters
        .console
        .clone()
        .filter(|console| console.enabled)
        .ok_or_else(|| ConfigError::MissingField("adapters.console".to_string()))?;
    let gateway = Arc::new(ConsoleGateway::new(&config.bot.name, console));

    // Modules compiled into this binary register their entries here
    let host = Arc::new(HostContext::new());

    let rt = tokio::runtime::Runtime::new().map_err(|e| BotError::Internal(e.to_string()))?;
    rt.block_on(async move {
        let runtime = Runtime::new(&config, host, store, gateway.clone())?;

        if config.modules.auto_load {
            let report = runtime.load_modules();
            for error in &report.errors {
                tracing::warn!("{}", error);
            }
        }

        run_console(&runtime, &gateway).await;
        Ok::<(), BotError>(())
    })
}

async fn run_console(runtime: &Runtime, gateway: &ConsoleGateway) {
    tracing::info!("Console ready, type commands or 'quit' to exit");

    while let Some(input) = gateway.read_line("> ").await {
        if input.is_empty() {
            continue;
        }
        if input == "quit" || input == "exit" {
            break;
        }

        let message = gateway.message(input);
        if runtime.dispatch(&message).await == DispatchOutcome::Ignored {
            tracing::debug!("No command in '{}'", message.body);
        }
        // let the reply print before the next prompt
        tokio::task::yield_now().await;
    }

    tracing::info!("Console closed");
}

fn init_config(config_path: &str) -> Result<(), BotError> {
    let yaml = Config::default().to_yaml()?;

    if Path::new(config_path).exists() {
        println!("{}", yaml);
        println!("\n{} already exists; save the above and adjust as needed.", config_path);
        return Ok(());
    }

    std::fs::write(config_path, yaml).map_err(|e| BotError::Internal(e.to_string()))?;
    println!("Wrote default config to {}", config_path);
    Ok(())
}

fn list_modules(config_path: &str) -> Result<(), BotError> {
    let config = load_config(config_path);
    let loader = ModuleLoader::new(&config.modules.directory, Arc::new(HostContext::new()));

    let discovery = loader.discover();
    for error in &discovery.errors {
        println!("! {}", error);
    }

    let plan = ModuleLoader::plan(discovery.packages);
    println!("Load order ({}):", config.modules.directory.display());
    for (i, package) in plan.ordered.iter().enumerate() {
        let descriptor = &package.descriptor;
        let depends = if descriptor.depend.is_empty() {
            String::new()
        } else {
            format!(" (depends on {})", descriptor.depend.join(", "))
        };
        println!("  {}. {}{}", i + 1, descriptor.full_name(), depends);
    }
    for error in &plan.rejected {
        println!("! {}", error);
    }
    Ok(())
}

fn permit(
    config_path: &str,
    guild: u64,
    subject: Subject,
    node: String,
    channel: Option<u64>,
    deny: bool,
    remove: bool,
) -> Result<(), BotError> {
    let config = load_config(config_path);
    let path: PathBuf = config
        .permissions
        .database
        .ok_or_else(|| ConfigError::MissingField("permissions.database".to_string()))?;
    let store = SqlitePermissionStore::new(&path)?;

    if remove {
        let removed = store.remove_override(guild, subject, &node, channel)?;
        println!("{}", if removed { "Override removed" } else { "No matching override" });
        return Ok(());
    }

    let mut entry = if deny {
        Override::deny(subject, node)
    } else {
        Override::grant(subject, node)
    };
    if let Some(channel) = channel {
        entry = entry.in_channel(channel);
    }
    store.set_override(guild, &entry)?;

    println!(
        "{} {} {} on {}{}",
        if deny { "Denied" } else { "Granted" },
        entry.subject.kind(),
        entry.subject.id(),
        entry.node,
        entry.channel.map(|c| format!(" in channel {}", c)).unwrap_or_default()
    );
    Ok(())
}
