// Stratum CLI entry point

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::Value;
use stratum::{
    ConfigLevel, ConflictResolver, HierarchyManager, HierarchySettings, ResolutionPolicy,
};
use stratum_core::resolve::parse_literal;
use stratum_core::{BatchResolver, CliResolver};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// Stratum - layered configuration hierarchy
#[derive(Parser, Debug)]
#[command(name = "stratum")]
#[command(about = "Inspect and edit the merged enterprise/user/team/project configuration")]
#[command(version)]
#[command(disable_help_subcommand = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (JSON, YAML or TOML); STRATUM_* variables still apply
    #[arg(long, global = true, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Shorthand for --log-level debug
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the merged configuration, or one value from it
    Get {
        /// Dot-path, e.g. settings.debug
        #[arg(value_name = "PATH")]
        path: Option<String>,

        /// Comma-separated levels to merge (default: all)
        #[arg(long, value_delimiter = ',')]
        levels: Vec<ConfigLevel>,
    },

    /// Write a value into one level
    Set {
        #[arg(value_name = "PATH")]
        path: String,

        /// JSON literal; anything unparsable is stored as a string
        #[arg(value_name = "VALUE")]
        value: String,

        #[arg(long)]
        level: ConfigLevel,

        /// Create the level document and missing parents
        #[arg(long)]
        create: bool,
    },

    /// List configuration names found per level
    Discover {
        #[arg(long)]
        level: Option<ConfigLevel>,
    },

    /// Report missing levels, unreadable files, schema errors and conflicts
    Validate,

    /// List merge conflicts
    Conflicts {
        #[arg(long, value_delimiter = ',')]
        levels: Vec<ConfigLevel>,
    },

    /// Show merged document, conflicts, sources and strategy
    Preview,

    /// Merge once with an explicit conflict policy
    Resolve {
        #[arg(long, value_enum)]
        strategy: StrategyArg,

        /// `{pattern: action}` rules file; answers conflicts without prompting
        #[arg(long, value_name = "FILE")]
        rules: Option<PathBuf>,

        #[arg(long, value_delimiter = ',')]
        levels: Vec<ConfigLevel>,
    },

    /// Print change events for every level directory until interrupted
    Watch,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    Higher,
    Lower,
    Merge,
    Interactive,
    Abort,
}

impl From<StrategyArg> for ResolutionPolicy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Higher => ResolutionPolicy::HigherPriority,
            StrategyArg::Lower => ResolutionPolicy::LowerPriority,
            StrategyArg::Merge => ResolutionPolicy::MergeArrays,
            StrategyArg::Interactive => ResolutionPolicy::Interactive,
            StrategyArg::Abort => ResolutionPolicy::Abort,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    if let Err(e) = run(cli).await {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(cli: &Cli) {
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        match cli.log_level.to_lowercase().as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "info" => tracing::Level::INFO,
            "error" => tracing::Level::ERROR,
            _ => tracing::Level::WARN,
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(cli.verbose)
        .with_writer(std::io::stderr)
        .init();
}

fn load_settings(path: Option<&PathBuf>) -> Result<HierarchySettings> {
    let mut settings = match path {
        Some(path) => HierarchySettings::load_from_file(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => HierarchySettings::default(),
    };
    settings.apply_env_overrides();
    Ok(settings)
}

fn levels_arg(levels: &[ConfigLevel]) -> Option<&[ConfigLevel]> {
    if levels.is_empty() {
        None
    } else {
        Some(levels)
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(cli.settings.as_ref())?;
    let manager = HierarchyManager::new(settings)?;

    match cli.command {
        Commands::Get { path, levels } => {
            let levels = levels_arg(&levels);
            match path {
                Some(path) => {
                    print_json(&manager.get_config_value(&path, Value::Null, levels))?
                }
                None => print_json(&manager.get_config(levels)?)?,
            }
        }
        Commands::Set {
            path,
            value,
            level,
            create,
        } => {
            manager.set_config_value(&path, parse_literal(&value), level, create)?;
            info!(path = %path, level = %level, "Value written");
        }
        Commands::Discover { level } => print_json(&manager.discover_configurations(level))?,
        Commands::Validate => {
            let issues = manager.validate_hierarchy();
            print_json(&issues)?;
            if !issues.is_empty() {
                bail!("{} hierarchy issue(s) found", issues.len());
            }
        }
        Commands::Conflicts { levels } => {
            print_json(&manager.get_configuration_conflicts(levels_arg(&levels))?)?
        }
        Commands::Preview => print_json(&manager.get_merge_preview(None)?)?,
        Commands::Resolve {
            strategy,
            rules,
            levels,
        } => {
            let mut policy = ResolutionPolicy::from(strategy);
            let resolver: Option<Arc<dyn ConflictResolver>> = match rules {
                Some(path) => {
                    let batch = BatchResolver::from_file(&path)
                        .with_context(|| format!("loading rules from {}", path.display()))?;
                    policy = ResolutionPolicy::Interactive;
                    Some(Arc::new(batch))
                }
                None if policy == ResolutionPolicy::Interactive => {
                    Some(Arc::new(CliResolver::stdio()))
                }
                None => None,
            };
            let result =
                manager.resolve_configuration_conflicts(policy, levels_arg(&levels), resolver)?;
            print_json(&result.merged)?;
        }
        Commands::Watch => watch(&manager).await?,
    }

    Ok(())
}

async fn watch(manager: &HierarchyManager) -> Result<()> {
    let mut events = manager.subscribe();
    let backend = manager.start_watching()?;
    eprintln!("Watching configuration levels ({} backend), Ctrl-C to stop", backend);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            received = events.recv() => match received {
                Ok(event) => println!("{}", serde_json::to_string(&event)?),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Dropped change events"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    manager.stop_watching();
    Ok(())
}
