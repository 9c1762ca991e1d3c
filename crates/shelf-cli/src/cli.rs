use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "shelf",
    about = "Inspect and edit shelf document stores",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Which store to open. Defaults to the current directory.
#[derive(Args, Debug)]
#[group(multiple = false)]
pub struct StoreArgs {
    /// Directory of `<id>.json` documents
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Zip archive of documents
    #[arg(long)]
    pub archive: Option<PathBuf>,

    /// TOML backend configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Store a document
    Put(PutArgs),
    /// Print a document
    Get(IdArgs),
    /// Check whether a document exists
    Exists(IdArgs),
    /// Delete a document
    Delete(IdArgs),
    /// List the references a document makes
    Refs(IdArgs),
    /// Follow references from a document and report dangling ones
    Check(IdArgs),
}

#[derive(Args)]
pub struct PutArgs {
    pub id: String,
    /// Read the document from this file instead of stdin
    #[arg(short, long)]
    pub file: Option<PathBuf>,
    /// Replace an existing document
    #[arg(long)]
    pub overwrite: bool,
}

#[derive(Args)]
pub struct IdArgs {
    pub id: String,
}
