use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "grove", about = "Grove object store: pack ingestion and inspection", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Root of the object store
    #[arg(short = 'C', long, global = true, default_value = ".grove")]
    pub root: PathBuf,

    /// fsync staged files before committing them
    #[arg(long, global = true)]
    pub fsync: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Store a pack stream and write its index
    IndexPack(IndexPackArgs),
    /// Compute an object ID, optionally storing the object
    HashObject(HashObjectArgs),
    /// Print the entries of a pack index
    ShowIndex(ShowIndexArgs),
    /// Pack files as blobs
    BuildPack(BuildPackArgs),
}

#[derive(Args)]
pub struct IndexPackArgs {
    /// Pack file to read; stdin when omitted
    pub input: Option<PathBuf>,
}

#[derive(Args)]
pub struct HashObjectArgs {
    pub path: PathBuf,
    #[arg(short = 't', long = "type", default_value = "blob")]
    pub kind: String,
    /// Write the object into the store
    #[arg(short, long)]
    pub write: bool,
}

#[derive(Args)]
pub struct ShowIndexArgs {
    /// `.idx` file to decode
    pub path: PathBuf,
}

#[derive(Args)]
pub struct BuildPackArgs {
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
    /// Where to write the pack; stdout when omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
