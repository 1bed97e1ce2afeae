// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! sfrag - load and inspect module graphs built from module fragments
//!
//! ## Commands
//!
//! - `sfrag run <entry>` loads, links and evaluates the graph, printing the
//!   evaluation order
//! - `sfrag graph <entry>` loads the graph and prints every module map entry
//! - `sfrag check <entry>` loads and links without evaluating
//!
//! An entry is a file path or URL, optionally naming a fragment:
//! `app.js#uppercaseBlock`.

use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use spacey_loader::config::file_url;
use spacey_loader::{
    FragmentForm, LoaderConfig, ModuleMapKey, ModuleStatus, Realm, RealmBuilder, TraceExecutor,
    VERSION,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "sfrag",
    about = "Module fragment loader for JavaScript",
    version = VERSION,
    author = "Pegasus Heavy Industries"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Import map JSON file
    #[arg(long, global = true)]
    import_map: Option<PathBuf>,

    /// Config file to use instead of ./spacey-fragments.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Allow fetching http(s) modules
    #[arg(long, global = true)]
    allow_remote: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Load, link and evaluate a module graph
    Run {
        /// Entry module path or URL
        entry: String,
    },
    /// Print the module map after loading
    Graph {
        /// Entry module path or URL
        entry: String,
    },
    /// Load and link without evaluating
    Check {
        /// Entry module path or URL
        entry: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("spacey_loader=debug,sfrag=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match &cli.command {
        Command::Run { entry } => run(&config, entry).await,
        Command::Graph { entry } => graph(&config, entry).await,
        Command::Check { entry } => check(&config, entry).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<LoaderConfig> {
    let mut config = LoaderConfig::load_with(cli.config.as_deref())?;
    if let Some(import_map) = &cli.import_map {
        config.set("import_map", &import_map.display().to_string())?;
    }
    if cli.allow_remote {
        config.set("allow_remote", "true")?;
    }
    Ok(config)
}

/// Key for an entry given as a URL or as a local path with optional `#fragment`
fn entry_key(entry: &str) -> anyhow::Result<ModuleMapKey> {
    if entry.contains("://") {
        return Ok(ModuleMapKey::parse(entry)?);
    }

    let (path, fragment) = match entry.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment)),
        None => (entry, None),
    };
    let mut url = file_url(Path::new(path))?;
    url.set_fragment(fragment);
    let key = ModuleMapKey::parse(url.as_str())?;
    debug!(entry, key = %key, "resolved entry");
    Ok(key)
}

async fn run(config: &LoaderConfig, entry: &str) -> anyhow::Result<()> {
    let key = entry_key(entry)?;
    let executor = Arc::new(TraceExecutor::new());
    let realm = RealmBuilder::from_config(config)?
        .executor(executor.clone())
        .build()?;

    let result = realm.import(&key).await;
    for (i, module) in executor.evaluated().iter().enumerate() {
        println!("{:>4} {}", (i + 1).to_string().dimmed(), module.cyan());
    }

    let instance = result?;
    let exports = instance.export_names();
    if !exports.is_empty() {
        println!("{} {}", "exports:".white().bold(), exports.join(", "));
    }
    Ok(())
}

async fn graph(config: &LoaderConfig, entry: &str) -> anyhow::Result<()> {
    let key = entry_key(entry)?;
    let realm = RealmBuilder::from_config(config)?.build()?;

    let result = realm.load_key(&key).await;
    print_graph(&realm);
    result?;
    Ok(())
}

async fn check(config: &LoaderConfig, entry: &str) -> anyhow::Result<()> {
    let key = entry_key(entry)?;
    let realm = RealmBuilder::from_config(config)?.build()?;

    realm.load_key(&key).await?;
    realm.instantiate(&key)?;

    let linked = realm
        .entries()
        .iter()
        .filter(|entry| entry.status() == ModuleStatus::Instantiated)
        .count();
    println!("{} {} ({} modules linked)", "ok".green().bold(), key, linked);
    Ok(())
}

fn print_graph(realm: &Realm) {
    for entry in realm.entries() {
        let status = entry.status();
        let label = format!("{:<12}", status.to_string());
        let label = match status {
            ModuleStatus::Failed => label.red().to_string(),
            ModuleStatus::Registered => label.dimmed().to_string(),
            _ => label.green().to_string(),
        };
        let form = entry.declaration().and_then(|declaration| declaration.form());
        let note = if form == Some(FragmentForm::InlineValue) {
            " (inline)"
        } else if !realm.is_exported(entry.key()) {
            " (private)"
        } else {
            ""
        };
        println!("{} {}{}", label, entry.key(), note.dimmed());

        for dep in entry.dependencies() {
            println!("{:12}   {} {}", "", "->".dimmed(), dep);
        }
        if let Some(failure) = entry.failure() {
            println!("{:12}   {}", "", failure.to_string().red());
        }
    }
}
