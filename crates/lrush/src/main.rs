//! lrush - line-oriented shell over a sharded LRU cache

mod shell;

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use shardlru::{ShardedConfig, ShardedLruCache, DEFAULT_SHARD_BITS};
use tracing::{info, warn};

use crate::shell::{Reply, Shell};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Total cache capacity in charge units
    #[arg(short, long, default_value_t = 1024)]
    capacity: usize,

    /// Use 2^N shards
    #[arg(short, long, default_value_t = DEFAULT_SHARD_BITS)]
    shard_bits: u32,

    /// Command script to run (reads stdin when omitted)
    #[arg(long)]
    script: Option<PathBuf>,
}

fn main() -> Result<()> {
    // Logs go to stderr so replies on stdout stay scriptable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let config = ShardedConfig::new(args.capacity).shard_bits(args.shard_bits);
    let cache = ShardedLruCache::with_config(config).context("invalid cache configuration")?;
    info!(
        "Cache ready: {} shards x {} capacity",
        cache.shard_count(),
        cache.shard_capacity()
    );

    let input: Box<dyn BufRead> = match &args.script {
        Some(path) => {
            info!("Running script {}", path.display());
            let file = File::open(path)
                .with_context(|| format!("failed to open script {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(io::stdin().lock()),
    };

    let mut shell = Shell::new(cache);
    run(&mut shell, input, io::stdout().lock())?;

    let outstanding = shell.finish();
    if outstanding > 0 {
        warn!("Released {} handles left outstanding at end of input", outstanding);
    }
    Ok(())
}

/// Feed every input line to the shell and write each reply on its own line
fn run<R: BufRead, W: Write>(shell: &mut Shell, input: R, mut out: W) -> Result<()> {
    for (lineno, line) in input.lines().enumerate() {
        let line = line.context("failed to read command")?;
        if let Some(reply) = shell.execute(&line) {
            if let Reply::Error(msg) = &reply {
                warn!(line = lineno + 1, "{}", msg);
            }
            writeln!(out, "{}", reply)?;
        }
    }
    out.flush()?;
    Ok(())
}
