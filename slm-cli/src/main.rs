//! Operator CLI for the Switch library manager settings file
//!
//! Reads and edits `settings.json` in a data folder through `slm-core`.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use slm_core::constants::{titles_db_path, versions_db_path, SLM_VERSION, SLM_WEB_VERSION};
use slm_core::template::tokens_in;
use slm_core::{AppSettings, LoadOutcome, SettingsStore, TemplateToken};

#[derive(Parser)]
#[command(name = "slm")]
#[command(about = "Inspect and edit Switch library manager settings")]
#[command(version)]
struct Cli {
    /// Folder holding settings.json and the title databases
    #[arg(short, long, default_value = ".")]
    data_folder: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data folder and settings file if missing
    Init,
    /// Print the decoded settings
    Show,
    /// Print settings.json exactly as stored
    Raw,
    /// Print the settings and database file locations
    Paths,
    /// Set one value by key, e.g. `port 8080` or `organize_options.rename_files true`
    Set {
        key: String,
        /// JSON value; anything that is not valid JSON is stored as a string
        value: String,
    },
    /// Manage extra folders to scan
    ScanFolder {
        #[command(subcommand)]
        action: ListAction,
    },
    /// Manage ignored DLC title ids
    Ignore {
        #[command(subcommand)]
        action: ListAction,
    },
    /// Overwrite settings with the defaults
    Reset,
    /// List template placeholders, or those used by a template
    Tokens { template: Option<String> },
}

#[derive(Subcommand)]
enum ListAction {
    Add { value: String },
    Remove { value: String },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    debug!("slm {} (web {})", SLM_VERSION, SLM_WEB_VERSION);

    if let Commands::Tokens { template } = &cli.command {
        print_tokens(template.as_deref());
        return Ok(());
    }

    if matches!(cli.command, Commands::Init) {
        std::fs::create_dir_all(&cli.data_folder)
            .with_context(|| format!("Cannot create data folder {:?}", cli.data_folder))?;
    }

    let store = SettingsStore::open(&cli.data_folder);
    report_outcome(store.outcome());

    match cli.command {
        Commands::Init => {
            if let Some(e) = store.outcome().persist_error() {
                anyhow::bail!("Settings could not be written: {}", e);
            }
            println!("{}", store.settings_path().display());
        }
        Commands::Show => print_settings(&store.current())?,
        Commands::Raw => println!("{}", store.raw_text_lossy()),
        Commands::Paths => {
            println!("settings: {}", store.settings_path().display());
            println!("titles:   {}", titles_db_path(store.data_folder()).display());
            println!("versions: {}", versions_db_path(store.data_folder()).display());
        }
        Commands::Set { key, value } => {
            let mut next = AppSettings::clone(&store.current());
            next.set_field(&key, parse_value(&value))?;
            store.save(next).into_result()?;
            info!("Updated {}", key);
        }
        Commands::ScanFolder { action } => {
            let settings = store.update(|s| edit_scan_folders(s, action)).into_result()?;
            print_settings(&settings)?;
        }
        Commands::Ignore { action } => {
            let settings = store.update(|s| edit_ignored_ids(s, action)).into_result()?;
            print_settings(&settings)?;
        }
        Commands::Reset => {
            let settings = store.reset_to_defaults().into_result()?;
            print_settings(&settings)?;
        }
        Commands::Tokens { .. } => {}
    }

    Ok(())
}

fn report_outcome(outcome: &LoadOutcome) {
    match outcome {
        LoadOutcome::Loaded => debug!("Settings loaded"),
        LoadOutcome::PartiallyDecoded { rejected } => {
            warn!("Settings partially decoded, {} value(s) ignored", rejected.len())
        }
        LoadOutcome::Created { .. } => info!("Default settings created"),
        LoadOutcome::RecoveredWithDefaults { cause, .. } => {
            warn!("Settings replaced with defaults: {}", cause)
        }
    }
}

fn edit_scan_folders(settings: &mut AppSettings, action: ListAction) {
    match action {
        ListAction::Add { value } => settings.scan_roots.push(PathBuf::from(value)),
        ListAction::Remove { value } => {
            let target = PathBuf::from(value);
            settings.scan_roots.retain(|p| *p != target);
        }
    }
}

fn edit_ignored_ids(settings: &mut AppSettings, action: ListAction) {
    match action {
        ListAction::Add { value } => {
            settings.ignored_content_ids.insert(value);
        }
        ListAction::Remove { value } => {
            settings.ignored_content_ids.remove(&value);
        }
    }
}

fn print_settings(settings: &AppSettings) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(settings)?);
    Ok(())
}

fn print_tokens(template: Option<&str>) {
    let tokens = match template {
        Some(t) => tokens_in(t),
        None => TemplateToken::ALL.to_vec(),
    };
    for token in tokens {
        println!("{}", token.placeholder());
    }
}

/// Parse a command-line value as JSON, falling back to a plain string
fn parse_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}
