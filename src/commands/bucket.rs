//! Bucket pool administration subcommands: the CLI surface over
//! `picidx_core::bucket`.

use std::fs;
use std::io::{Read, Write as _};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use log::info;

use picidx_core::bucket::{self, KibitzAction, Pool, ScanCursor};

use crate::config::Config;

#[derive(Subcommand, Debug)]
pub enum BucketCommand {
    /// Append a new bucket containing the given file's contents.
    Create { input: PathBuf },
    /// List every live bucket's oid and length.
    List,
    /// Write one bucket's payload to stdout, or to a file if given.
    Fetch { oid: u32, output: Option<PathBuf> },
    /// Tombstone a bucket.
    Delete { oid: u32 },
    /// Compact the pool, dropping tombstoned buckets.
    Shakedown,
}

pub fn run(cmd: &BucketCommand, cfg: &Config) -> Result<()> {
    match cmd {
        BucketCommand::Create { input } => create(cfg, input),
        BucketCommand::List => list(cfg),
        BucketCommand::Fetch { oid, output } => fetch(cfg, *oid, output.as_deref()),
        BucketCommand::Delete { oid } => delete(cfg, *oid),
        BucketCommand::Shakedown => shakedown(cfg),
    }
}

fn open(cfg: &Config, writeable: bool) -> Result<Pool> {
    Pool::open(&cfg.buckets.bucket_file, writeable)
        .with_context(|| format!("opening bucket pool {}", cfg.buckets.bucket_file))
}

fn create(cfg: &Config, input: &PathBuf) -> Result<()> {
    let payload = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let mut pool = open(cfg, true)?;
    let mut writer = pool.create(bucket::BUCKET_TYPE_V33)?;
    writer.write_all(&payload)?;
    let hdr = writer.finish()?;
    info!("created bucket oid={} length={}", hdr.oid, hdr.length);
    println!("{}", hdr.oid);
    Ok(())
}

fn list(cfg: &Config) -> Result<()> {
    let pool = open(cfg, false)?;
    let mut cursor = ScanCursor::new();
    let mut next = pool.find_first(&mut cursor, false)?;
    while let Some(loc) = next {
        println!("{}\t{}", loc.header.oid, loc.header.length);
        next = pool.find_next(&mut cursor, false)?;
    }
    Ok(())
}

fn fetch(cfg: &Config, oid: u32, output: Option<&std::path::Path>) -> Result<()> {
    let pool = open(cfg, false)?;
    let loc = pool.find_by_oid(oid)?;
    let mut reader = pool.fetch(&loc);
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    match output {
        Some(path) => fs::write(path, buf)?,
        None => std::io::stdout().write_all(&buf)?,
    }
    Ok(())
}

fn delete(cfg: &Config, oid: u32) -> Result<()> {
    let mut pool = open(cfg, true)?;
    pool.delete(oid)?;
    info!("deleted bucket oid={}", oid);
    Ok(())
}

fn shakedown(cfg: &Config) -> Result<()> {
    let mut pool = open(cfg, true)?;
    pool.shakedown(cfg.buckets.shake_buf_size, cfg.buckets.shake_security, |_hdr, _new_oid, _payload| {
        KibitzAction::Keep
    })?;
    info!("shakedown complete");
    Ok(())
}
