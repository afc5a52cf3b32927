//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use presswork_core::Pipeline;
use presswork_shared::{CONFIG_FILE_NAME, init_site_config, load_site_config_from};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Presswork — build structured content into JSON artifacts.
#[derive(Parser)]
#[command(
    name = "presswork",
    version,
    about = "Validate structured content against a schema and emit per-collection JSON artifacts.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Build all collections declared in the config file.
    Build {
        /// Path to the project config file.
        #[arg(short, long, default_value = CONFIG_FILE_NAME)]
        config: PathBuf,

        /// Remove the output directories before building.
        #[arg(long)]
        clean: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Write a starter config file in the current directory.
    Init,
    /// Show the resolved configuration.
    Show {
        /// Path to the project config file.
        #[arg(short, long, default_value = CONFIG_FILE_NAME)]
        config: PathBuf,
    },
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "presswork=info",
        1 => "presswork=debug",
        _ => "presswork=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Build { config, clean } => cmd_build(&config, clean).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show { config } => cmd_config_show(&config).await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_build(config_path: &Path, clean: bool) -> Result<()> {
    if !config_path.exists() {
        return Err(eyre!(
            "no config file at '{}' — run `presswork config init` to create one",
            config_path.display()
        ));
    }

    let config = load_site_config_from(config_path)?;

    info!(
        config = %config_path.display(),
        collections = config.collections.len(),
        clean,
        "starting build"
    );

    let summary = Pipeline::new(config).clean(clean).build().await?;

    println!();
    println!("  Build complete!");
    println!("  Collections: {}", summary.collections);
    println!("  Entries:     {}", summary.entries);
    println!("  Assets:      {}", summary.assets);
    println!("  Time:        {:.1}s", summary.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = PathBuf::from(CONFIG_FILE_NAME);
    init_site_config(&path)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: &Path) -> Result<()> {
    let config = load_site_config_from(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
