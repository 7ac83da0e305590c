//! metabind CLI - bind input fields to note front-matter

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use metabind::cache::{MetadataManager, SubscriberId};
use metabind::error::{FixSuggestion, MetaBindError, Result};
use metabind::field::{BoundField, FieldContext, FieldHost, Placement};
use metabind::signal::{Signal, ValueSignal};
use metabind::store::{forward_changes, DocumentLookup, DocumentRef, DocumentStore, VaultStore, VaultWatcher};
use metabind::MetaBindConfig;

#[derive(Parser)]
#[command(name = "metabind")]
#[command(about = "metabind - two-way binding between input fields and note metadata")]
#[command(version)]
struct Cli {
    /// Vault directory (overrides config and METABIND_VAULT)
    #[arg(long, global = true)]
    vault: Option<PathBuf>,

    /// Config file (default: ~/.config/metabind/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a bind target to note#path
    Resolve {
        /// Bind target, e.g. `status` or `Project#meta.tags[0]`
        target: String,

        /// Note the target is written in
        #[arg(long)]
        from: String,
    },

    /// Print the value at a bind target
    Get {
        target: String,

        #[arg(long)]
        from: String,
    },

    /// Set the value at a bind target (value is parsed as YAML)
    Set {
        target: String,

        value: String,

        #[arg(long)]
        from: String,
    },

    /// Render an INPUT[...] declaration against the vault
    Render {
        /// e.g. `INPUT[toggle:done]`
        declaration: String,

        #[arg(long)]
        from: String,

        /// Render as a block (card) instead of inline
        #[arg(long)]
        block: bool,
    },

    /// Print notes' metadata whenever they change on disk
    Watch {
        /// Notes to follow
        #[arg(required = true)]
        notes: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.fix_suggestion() {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => MetaBindConfig::load_from(path)?,
        None => MetaBindConfig::load()?,
    }
    .with_env()?;
    if let Some(vault) = cli.vault {
        config.vault.root = Some(vault);
    }

    let store = Arc::new(VaultStore::open(config.vault_root()?)?);
    let shared: Arc<dyn DocumentStore> = store.clone();
    let manager = Arc::new(MetadataManager::with_settings(shared, config.sync_settings()));

    match cli.command {
        Commands::Resolve { target, from } => {
            let current = find_note(&store, &from)?;
            let target = manager.resolve(&target, &current)?;
            println!("{target}");
        }
        Commands::Get { target, from } => {
            let current = find_note(&store, &from)?;
            let target = manager.resolve(&target, &current)?;
            match manager.get_initial_value(&target).await? {
                Some(value) => println!("{}", format_value(&value)),
                None => println!("{}", "(not set)".dimmed()),
            }
        }
        Commands::Set { target, value, from } => {
            let current = find_note(&store, &from)?;
            let value: Value = serde_yaml::from_str(&value)?;
            let target = manager.resolve(&target, &current)?;

            let field = BoundField::new(Some(target.clone()));
            field.load(&manager).await?;
            field.read_signal().set(Some(value.clone()));
            field.unload();

            let report = manager.flush_all().await;
            if report.failed > 0 {
                return Err(MetaBindError::Storage {
                    document: target.document.to_string(),
                    reason: "metadata could not be written".to_string(),
                });
            }
            println!("{} {} = {}", "✓".green(), target, format_value(&value));
        }
        Commands::Render {
            declaration,
            from,
            block,
        } => {
            let current = find_note(&store, &from)?;
            let placement = if block { Placement::Block } else { Placement::Inline };
            let mut host = FieldHost::new(&declaration, &current, placement, FieldContext::new(Arc::clone(&manager)));
            host.load().await;
            println!("{}", host.render());
        }
        Commands::Watch { notes } => watch(&store, manager, &config, &notes).await?,
    }

    Ok(())
}

async fn watch(
    store: &VaultStore,
    manager: Arc<MetadataManager>,
    config: &MetaBindConfig,
    notes: &[String],
) -> Result<()> {
    let watcher = VaultWatcher::new(store)?;

    // Kept alive for the whole session
    let mut sinks: Vec<ValueSignal> = Vec::new();
    for name in notes {
        let document = find_note(store, name)?;
        let cache = manager.acquire(&document).await?;
        let sink: ValueSignal = Signal::new(None);
        let label = document.clone();
        sink.register_listener(move |tree: &Option<Value>| {
            let tree = tree.clone().unwrap_or(Value::Null);
            println!("{} {}", format!("{label}:").cyan().bold(), format_value(&tree));
        });
        cache.register_whole_tree(SubscriberId::new(), sink.clone());
        sinks.push(sink);
    }

    let cancel = CancellationToken::new();
    let sync = Arc::clone(&manager).spawn_sync_loop(config.sync_interval(), cancel.clone());
    let forward = tokio::spawn(forward_changes(watcher, Arc::clone(&manager), cancel.clone()));

    println!("{} watching {} note(s), Ctrl-C to stop", "→".cyan(), sinks.len());
    tokio::signal::ctrl_c().await?;
    cancel.cancel();

    for (task, handle) in [("sync loop", sync), ("change forwarding", forward)] {
        if let Err(e) = handle.await {
            tracing::warn!(task, error = %e, "task ended abnormally");
        }
    }
    Ok(())
}

/// Exactly one note named `name`
fn find_note(store: &VaultStore, name: &str) -> Result<DocumentRef> {
    let mut found = store.find_documents_by_name(name);
    match found.len() {
        0 => Err(MetaBindError::DocumentNotFound {
            document: name.to_string(),
        }),
        1 => Ok(found.remove(0)),
        n => Err(MetaBindError::InvalidArgument {
            argument: "--from".to_string(),
            reason: format!("{n} notes are named '{name}'; qualify further with its folder"),
        }),
    }
}

/// Values print as YAML: `draft`, `3`, or a block for maps and lists
fn format_value(value: &Value) -> String {
    match value {
        Value::Object(_) | Value::Array(_) => serde_yaml::to_string(value)
            .map(|yaml| format!("\n{}", yaml.trim_end()))
            .unwrap_or_else(|_| value.to_string()),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
