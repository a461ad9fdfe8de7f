use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "bfs",
    about = "bucketfs: filesystem commands over a flat object store",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding the local object store
    #[arg(long, global = true, default_value = ".bfs")]
    pub root: PathBuf,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

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
    /// List a directory, a bucket, or every bucket
    Ls(LsArgs),
    /// Show metadata for a path
    Stat(PathArgs),
    /// Create a directory or bucket
    Mkdir(PathArgs),
    /// Delete a path recursively
    Rm(RmArgs),
    /// Copy objects or directories
    Cp(CpArgs),
    /// Rename a path
    Mv(MvArgs),
    /// Move the contents of a directory into another
    MvStar(MvArgs),
    /// Upload a local file or directory
    Put(PutArgs),
    /// Print an object's contents
    Cat(CatArgs),
}

#[derive(Args)]
pub struct LsArgs {
    #[arg(default_value = "s3a://")]
    pub path: String,
    /// Show size, modification time and kind
    #[arg(short = 'l', long)]
    pub long: bool,
}

#[derive(Args)]
pub struct PathArgs {
    pub path: String,
}

#[derive(Args)]
pub struct RmArgs {
    pub path: String,
    /// Delete permanently (required)
    #[arg(long)]
    pub skip_trash: bool,
}

#[derive(Args)]
pub struct CpArgs {
    pub src: String,
    pub dst: String,
    #[arg(short = 'r', long)]
    pub recursive: bool,
}

#[derive(Args)]
pub struct MvArgs {
    pub src: String,
    pub dst: String,
}

#[derive(Args)]
pub struct PutArgs {
    pub local: PathBuf,
    pub dst: String,
}

#[derive(Args)]
pub struct CatArgs {
    pub path: String,
    #[arg(long, default_value = "0")]
    pub offset: u64,
    #[arg(long)]
    pub length: Option<u64>,
}
