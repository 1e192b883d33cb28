//! Pass 0: ingest a directory of card images into the bucket pool,
//! extract their signatures, and build the k-d tree, per SPEC_FULL.md
//! section 4.6.

use std::fs::{self, File};
use std::io::{BufWriter, Write as _};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use log::info;

use picidx_core::bucket::{self, Pool};
use picidx_core::image::{RawRgbDecoder, ThumbnailDecoder};
use picidx_core::kdtree::KdTree;
use picidx_core::signature;

use crate::config::Config;

#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Directory of raw-rgb card images to ingest.
    pub cards_dir: PathBuf,
    /// Where to write the signature file.
    #[arg(long, default_value = "signatures.bin")]
    pub sig_file: PathBuf,
    /// Where to write the k-d tree file.
    #[arg(long, default_value = "index.kdt")]
    pub tree_file: PathBuf,
}

pub fn run(args: &IndexArgs, cfg: &Config) -> Result<()> {
    let mut pool = Pool::open(&cfg.buckets.bucket_file, true)
        .with_context(|| format!("opening bucket pool {}", cfg.buckets.bucket_file))?;

    let mut paths: Vec<_> = fs::read_dir(&args.cards_dir)
        .with_context(|| format!("reading {}", args.cards_dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    paths.sort();

    let mut entries = Vec::new();
    let mut total_bytes = 0u64;
    for path in &paths {
        let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let decoded =
            RawRgbDecoder.decode(&bytes).with_context(|| format!("decoding {}", path.display()))?;
        let sig = signature::compute_signature(&decoded.as_image())
            .with_context(|| format!("signing {}", path.display()))?;

        let mut writer = pool.create(bucket::BUCKET_TYPE_V33)?;
        writer.write_all(&bytes)?;
        let hdr = writer.finish()?;

        info!("indexed {} as oid={}", path.display(), hdr.oid);
        total_bytes += hdr.length as u64;
        entries.push((hdr.oid, sig));
    }

    let sig_out = File::create(&args.sig_file)
        .with_context(|| format!("creating {}", args.sig_file.display()))?;
    signature::write_signatures(&mut BufWriter::new(sig_out), &entries)?;

    let points: Vec<_> = entries.iter().map(|(oid, sig)| (*oid, sig.f)).collect();
    let tree = KdTree::build(&points);
    let tree_out = File::create(&args.tree_file)
        .with_context(|| format!("creating {}", args.tree_file.display()))?;
    tree.write(&mut BufWriter::new(tree_out))?;

    info!("indexed {} cards, {} total", entries.len(), crate::util::fmt_bytes_human(total_bytes));
    Ok(())
}
