// main refs:
// https://googleprojectzero.blogspot.com/2024/12/the-windows-registry-adventure-5-regf.html
//
use std::{
    io::{self, BufWriter, Write},
    path::PathBuf,
};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use regview::{
    reg::{HiveFile, HiveHeader, RootLocator, TreeWalker, WalkOptions},
    render,
};

/// Print the key tree of a registry hive file
#[derive(Parser)]
#[command(name = "regview", author, version, about, long_about = None)]
struct Cli {
    /// Registry hive file
    hive: PathBuf,

    /// Describe every key node instead of printing names only
    #[arg(short, long)]
    verbose: bool,

    /// Do not expand keys below this depth (the root is depth 0)
    #[arg(long)]
    max_depth: Option<usize>,

    /// Accept an "li" subkey list referenced directly by a key
    #[arg(long)]
    accept_top_level_li: bool,
}

fn main() -> anyhow::Result<()> {
    // logs go to stderr so the tree on stdout stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let mut regf = HiveFile::open(&cli.hive)
        .with_context(|| format!("unable to open {}", cli.hive.display()))?;

    let header =
        HiveHeader::read(&mut regf).context("registry file failed basic validation")?;
    println!("{}", render::modification_line(header.modified));
    if cli.verbose {
        println!("{header}");
    }
    if header.is_dirty() {
        tracing::warn!(
            "hive was not cleanly written back (sequence {} != {})",
            header.update_count1,
            header.update_count2
        );
    }

    let root = RootLocator::new()
        .locate(&mut regf)
        .context("unable to find the root key")?;

    let options = WalkOptions {
        accept_top_level_index: cli.accept_top_level_li,
        max_depth: cli.max_depth,
    };
    let mut walker = TreeWalker::with_options(regf, options);

    let mut out = BufWriter::new(io::stdout().lock());
    let written = render::write_tree(&mut walker, root, &mut out, cli.verbose);
    out.flush()?;
    let written = written.context("unable to read the key tree")?;

    tracing::info!("{written} keys, {} warnings", walker.warnings().len());
    Ok(())
}
