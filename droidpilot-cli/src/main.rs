//! droidpilot CLI
//!
//! Operator tool for locator tables and recipes.
//!
//! Usage from workspace root:
//!   cargo run --bin droidpilot -- validate bundled --recipes
//!   cargo run --bin droidpilot -- validate tables/app.yaml --key chat.send.button
//!   cargo run --bin droidpilot -- show bundled --version 8.0.58
//!   cargo run --bin droidpilot -- dry-run bundled --tree home.json --version 8.0.58 \
//!       --contact Alice --message hello
//!
//! `bundled` stands for the locator table shipped with the library.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use droidpilot::catalog;
use droidpilot::platforms::memory::MemoryEngine;
use droidpilot::recipes::{self, pages};
use droidpilot::registry::LocatorTable;
use droidpilot::{
    Automation, AutomationError, ConfigError, Poller, SerializableUIElement,
    VersionedNodeRegistry,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

mod report;

const BUNDLED: &str = "bundled";

#[derive(Parser)]
#[command(name = "droidpilot")]
#[command(about = "Inspect locator tables and dry-run page workflows")]
struct Cli {
    /// Log at debug level, ignoring RUST_LOG
    #[clap(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that a table loads and that every version defines the given keys
    Validate(ValidateArgs),
    /// Print the locators of one app version
    Show(ShowArgs),
    /// Run the search-and-send recipe against a recorded tree
    DryRun(DryRunArgs),
}

#[derive(Parser, Debug)]
struct ValidateArgs {
    /// Table file (YAML, or JSON by extension) or `bundled`
    table: String,

    /// Logical key that every version must define; repeatable
    #[clap(long = "key", short)]
    keys: Vec<String>,

    /// Also require every key used by the bundled recipes
    #[clap(long)]
    recipes: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
#[clap(rename_all = "lower")]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Parser, Debug)]
struct ShowArgs {
    /// Table file (YAML, or JSON by extension) or `bundled`
    table: String,

    /// App version to print
    #[clap(long)]
    version: String,

    #[clap(long, value_enum, default_value = "yaml")]
    format: OutputFormat,
}

#[derive(Parser, Debug)]
struct DryRunArgs {
    /// Table file (YAML, or JSON by extension) or `bundled`
    table: String,

    /// Recorded accessibility tree (JSON)
    #[clap(long)]
    tree: PathBuf,

    /// App version the recorded tree belongs to
    #[clap(long, env = "DROIDPILOT_APP_VERSION")]
    version: String,

    /// Contact to search for
    #[clap(long)]
    contact: String,

    /// Message to send
    #[clap(long)]
    message: String,

    /// Print the run summary as JSON
    #[clap(long)]
    json: bool,
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
    };
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn load_table(table: &str) -> Result<VersionedNodeRegistry> {
    if table == BUNDLED {
        debug!("Using bundled locator table");
        return catalog::wechat().context("Bundled locator table is invalid");
    }
    VersionedNodeRegistry::from_path(table)
        .with_context(|| format!("Failed to load locator table {table}"))
}

fn validate(args: ValidateArgs) -> Result<()> {
    let registry = load_table(&args.table)?;
    report::print_versions(&registry);

    let mut keys = args.keys;
    if args.recipes {
        for builder in [recipes::search_and_send("", ""), recipes::open_contacts_tab()] {
            keys.extend(builder.keys().into_iter().map(|k| k.to_string()));
        }
        keys.push(catalog::keys::HOME_BOTTOM_NAV.to_string());
    }
    keys.sort();
    keys.dedup();

    match registry.validate_keys(&keys) {
        Ok(()) => {
            report::print_valid(keys.len());
            Ok(())
        }
        Err(AutomationError::Configuration(ConfigError::Incomplete(missing))) => {
            report::print_missing(&missing);
            bail!("{} locator(s) missing from {}", missing.len(), args.table)
        }
        Err(e) => Err(e.into()),
    }
}

fn show(args: ShowArgs) -> Result<()> {
    let registry = load_table(&args.table)?;
    let set = registry
        .resolve(&args.version)
        .with_context(|| format!("Cannot show version {}", args.version))?;
    info!(version = set.version(), keys = set.len(), "Showing locator set");

    let mut table: LocatorTable = registry.to_table();
    table.versions.retain(|version, _| version == set.version());
    let rendered = match args.format {
        OutputFormat::Yaml => serde_yaml::to_string(&table)?,
        OutputFormat::Json => serde_json::to_string_pretty(&table)?,
    };
    println!("{rendered}");
    Ok(())
}

async fn dry_run(args: DryRunArgs, verbose: bool) -> Result<()> {
    let registry = load_table(&args.table)?;
    let source = std::fs::read_to_string(&args.tree)
        .with_context(|| format!("Failed to read tree {}", args.tree.display()))?;
    let tree = SerializableUIElement::from_json(&source)
        .with_context(|| format!("Invalid tree JSON in {}", args.tree.display()))?;

    let engine = MemoryEngine::new(args.version.as_str(), tree);
    let automation = Automation::new(Arc::new(engine.clone()), Arc::new(registry))
        .with_poller(Poller::new().verbose(verbose));
    let workflow = automation
        .workflow(recipes::search_and_send(&args.contact, &args.message))
        .context("Recipe does not fit the locator table")?;

    info!(contact = %args.contact, version = %args.version, "Starting dry run");
    let outcome = workflow.run(pages::HOME).await;
    let actions = engine.actions();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report::summary(&outcome, &actions))?);
    } else {
        report::print_outcome(&outcome, &actions);
    }

    match outcome.into_result() {
        Ok(_) => Ok(()),
        Err(failure) => bail!(failure),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Validate(args) => validate(args),
        Commands::Show(args) => show(args),
        Commands::DryRun(args) => dry_run(args, cli.verbose).await,
    }
}
