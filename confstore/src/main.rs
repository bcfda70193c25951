mod logging;
mod options;

use std::io::Read as _;
use std::path::PathBuf;
use std::process::exit;

use anyhow::{Context, Result};
use clap::{CommandFactory as _, Parser, Subcommand};
use confstore_core::{ConfigStore, UserId, VersionRef};
use options::Options;
use serde_json::Value;

fn main() {
    let args = Args::parse();
    handle_result(run_args(args));
}

fn run_args(args: Args) -> Result<()> {
    match &args.command {
        Commands::Get { user, version } => with_store(&args.options, |store| {
            get(store, user, version.clone())
        }),
        Commands::Save {
            user,
            version,
            file,
        } => with_store(&args.options, |store| {
            save(store, user, version, file.as_ref())
        }),
        Commands::Diff { user, current } => {
            with_store(&args.options, |store| diff(store, user, current))
        }
        Commands::Log { user } => with_store(&args.options, |store| log(store, user)),
        Commands::GenerateMan => (|| {
            let cmd = Args::command();
            let man = clap_mangen::Man::new(cmd);
            let mut buffer: Vec<u8> = Default::default();
            man.render(&mut buffer)?;
            println!("{}", String::from_utf8(buffer)?);
            Ok(())
        })(),
        Commands::GenerateMarkdown => {
            let opts = clap_markdown::MarkdownOptions::new().show_footer(false);
            let markdown: String = clap_markdown::help_markdown_custom::<Args>(&opts);
            println!("{}", markdown);
            Ok(())
        }
        Commands::GenerateCompletion { shell } => {
            let mut cmd = Args::command();
            clap_complete::generate(*shell, &mut cmd, "confstore", &mut std::io::stdout());
            Ok(())
        }
    }
}

/// Set up logging, open the configured backend and run `f` against it.
fn with_store<T>(options: &Options, f: impl FnOnce(&ConfigStore) -> Result<T>) -> Result<T> {
    logging::set_up(&logging::Options {
        verbose: options.verbose,
        color: options.color_enabled(),
    })?;
    let config = options.backend_config()?;
    let backend = config
        .open()
        .with_context(|| format!("failed to open storage backend {:?}", config))?;
    f(&ConfigStore::new(backend))
}

fn parse_user(user: &str) -> Result<UserId> {
    Ok(UserId::new(user)?)
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn get(store: &ConfigStore, user: &str, version: Option<String>) -> Result<()> {
    let user = parse_user(user)?;
    let version = VersionRef::from_option(version);
    let document = store.get(&user, &version)?;
    print_json(document.as_value())
}

fn save(store: &ConfigStore, user: &str, version: &str, file: Option<&PathBuf>) -> Result<()> {
    let user = parse_user(user)?;
    let text = match file {
        Some(file) => std::fs::read_to_string(file)
            .with_context(|| format!("failed to read {}", file.display()))?,
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("failed to read document from stdin")?;
            text
        }
    };
    let body: Value = serde_json::from_str(&text).context("failed to parse document as JSON")?;
    let document = store.save_with_version(&user, version, body)?;
    print_json(document.as_value())
}

fn diff(store: &ConfigStore, user: &str, current: &str) -> Result<()> {
    let user = parse_user(user)?;
    let d = store.diff_against_latest(&user, current)?;
    print_json(&d)
}

fn log(store: &ConfigStore, user: &str) -> Result<()> {
    let user = parse_user(user)?;
    for revision in store.revisions(&user)? {
        println!("{}", serde_json::to_string(&revision)?);
    }
    Ok(())
}

/// 2 when a requested configuration does not exist, 1 for any other failure.
fn exit_code(e: &anyhow::Error) -> i32 {
    let not_found = e.chain().any(|cause| {
        cause
            .downcast_ref::<confstore_core::Error>()
            .is_some_and(|e| e.is_not_found())
    });
    if not_found {
        2
    } else {
        1
    }
}

fn handle_result(r: Result<()>) {
    match r {
        Ok(()) => {}
        Err(e) => {
            eprintln!("confstore error: {:#}", e);
            exit(exit_code(&e));
        }
    }
}

/// Versioned per-user configuration store
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    options: Options,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print a user's configuration document
    Get {
        user: String,

        /// The version to print; the latest version when omitted
        #[arg(long)]
        version: Option<String>,
    },

    /// Save a configuration document as a new version and make it the latest
    ///
    /// Any `version` field in the document is replaced by `--version`.
    Save {
        user: String,

        #[arg(long)]
        version: String,

        /// Read the document from FILE instead of stdin
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Print the changes from a version to the latest version, as a JSON Patch
    Diff {
        user: String,

        /// The version the client currently has
        #[arg(long)]
        current: String,
    },

    /// List a user's saved revisions, oldest first
    Log { user: String },

    /// Generate markdown documentation for confstore
    #[command(hide = true)]
    GenerateMarkdown,

    /// Generate a manpage for confstore
    #[command(hide = true)]
    GenerateMan,

    /// Generate shell completion for confstore
    #[command(hide = true)]
    GenerateCompletion {
        /// The shell to generate completion for
        #[arg(long)]
        shell: clap_complete::Shell,
    },
}
