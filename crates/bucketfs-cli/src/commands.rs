use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use bucketfs_core::{BucketFs, FsConfig, StatRecord};
use bucketfs_store::LocalObjectStore;
use colored::Colorize;
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let fs = open_fs(&cli)?;
    let format = cli.format;
    match cli.command {
        Command::Ls(args) => cmd_ls(&fs, args, format),
        Command::Stat(args) => cmd_stat(&fs, args, format),
        Command::Mkdir(args) => {
            fs.mkdir(&args.path)?;
            done(format, "created", &args.path)
        }
        Command::Rm(args) => {
            fs.rmtree(&args.path, args.skip_trash)
                .with_context(|| format!("cannot remove {}", args.path))?;
            done(format, "removed", &args.path)
        }
        Command::Cp(args) => {
            fs.copy(&args.src, &args.dst, args.recursive)?;
            done(format, "copied", &format!("{} -> {}", args.src, args.dst))
        }
        Command::Mv(args) => {
            fs.rename(&args.src, &args.dst)?;
            done(format, "renamed", &format!("{} -> {}", args.src, args.dst))
        }
        Command::MvStar(args) => {
            fs.rename_star(&args.src, &args.dst)?;
            done(format, "moved", &format!("{}/* -> {}", args.src, args.dst))
        }
        Command::Put(args) => {
            let files = fs.copy_from_local(&args.local, &args.dst)?;
            done(
                format,
                "uploaded",
                &format!("{} -> {} ({files} file(s))", args.local.display(), args.dst),
            )
        }
        Command::Cat(args) => cmd_cat(&fs, args),
    }
}

fn open_fs(cli: &Cli) -> anyhow::Result<BucketFs> {
    let config = match &cli.config {
        Some(path) => FsConfig::load(path)
            .with_context(|| format!("cannot load configuration from {}", path.display()))?,
        None => FsConfig::default(),
    };
    debug!(root = %cli.root.display(), "opening local object store");
    let store = LocalObjectStore::open(&cli.root)
        .with_context(|| format!("cannot open object store at {}", cli.root.display()))?;
    if cli.verbose {
        eprintln!(
            "{} {} (scheme {}, chunk {} bytes)",
            "store:".dimmed(),
            cli.root.display(),
            config.scheme,
            config.write_chunk_size
        );
    }
    Ok(BucketFs::with_config(Arc::new(store), config)?)
}

fn cmd_ls(fs: &BucketFs, args: LsArgs, format: OutputFormat) -> anyhow::Result<()> {
    let entries = fs.listdir_stats(&args.path)?;
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    for entry in &entries {
        if args.long {
            println!("{}", long_line(entry));
        } else if entry.is_dir {
            println!("{}/", entry.name.blue().bold());
        } else {
            println!("{}", entry.name);
        }
    }
    Ok(())
}

fn cmd_stat(fs: &BucketFs, args: PathArgs, format: OutputFormat) -> anyhow::Result<()> {
    let st = fs.stats(&args.path)?;
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&st)?);
        return Ok(());
    }
    println!("  Path: {}", st.path.bold());
    println!("  Kind: {}", if st.is_dir { "directory".blue() } else { "file".green() });
    println!("  Size: {}", st.size);
    match st.mtime {
        Some(mtime) => println!("  Modified: {}", mtime.to_rfc3339()),
        None => println!("  Modified: {}", "-".dimmed()),
    }
    Ok(())
}

fn cmd_cat(fs: &BucketFs, args: CatArgs) -> anyhow::Result<()> {
    let data = match args.length {
        Some(length) => fs.read(&args.path, args.offset, length)?,
        None => {
            let size = fs.stats(&args.path)?.size;
            fs.read(&args.path, args.offset, size.saturating_sub(args.offset))?
        }
    };
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&data)?;
    stdout.flush()?;
    Ok(())
}

fn long_line(entry: &StatRecord) -> String {
    let kind = if entry.is_dir { "d".blue() } else { "-".normal() };
    let mtime = entry
        .mtime
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".into());
    format!("{kind} {:>12} {:>16} {}", entry.size, mtime, entry.name)
}

fn done(format: OutputFormat, action: &str, subject: &str) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::json!({ "status": "ok", "action": action, "subject": subject }));
        }
        OutputFormat::Text => println!("{} {} {}", "✓".green().bold(), action, subject),
    }
    Ok(())
}
