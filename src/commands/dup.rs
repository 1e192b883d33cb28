//! Pass 1: Hilbert-ordered nearest-neighbor duplicate search, per
//! SPEC_FULL.md section 4.6. Walks the signature set in Hilbert-curve
//! order (for cache locality in the thumbnail cache, grounded in
//! `picidx_core::hilbert`), queries the k-d tree for each card's nearest
//! neighbor, and runs the full duplicate comparator on any candidate pair.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use log::info;

use picidx_core::bucket::Pool;
use picidx_core::cache::ThumbnailCache;
use picidx_core::dup::{self, Transforms};
use picidx_core::hilbert;
use picidx_core::image::{RawRgbDecoder, ThumbnailDecoder};
use picidx_core::kdtree::KdTree;
use picidx_core::oid::Oid;
use picidx_core::signature;

use crate::config::Config;

#[derive(Args, Debug)]
pub struct DupArgs {
    #[arg(long, default_value = "signatures.bin")]
    pub sig_file: PathBuf,
    #[arg(long, default_value = "index.kdt")]
    pub tree_file: PathBuf,
    /// Maximum squared signature distance to consider as a candidate pair.
    #[arg(long, default_value_t = 64)]
    pub max_dist: u32,
}

pub fn run(args: &DupArgs, cfg: &Config) -> Result<()> {
    let pool = Pool::open(&cfg.buckets.bucket_file, false)
        .with_context(|| format!("opening bucket pool {}", cfg.buckets.bucket_file))?;

    let sig_reader =
        File::open(&args.sig_file).with_context(|| format!("opening {}", args.sig_file.display()))?;
    let entries = signature::read_signatures(&mut BufReader::new(sig_reader))?;

    let tree_reader =
        File::open(&args.tree_file).with_context(|| format!("opening {}", args.tree_file.display()))?;
    let tree = KdTree::read(&mut BufReader::new(tree_reader))?;

    let mut ordered: Vec<(Vec<u32>, Oid, signature::Signature)> = entries
        .iter()
        .map(|(oid, sig)| {
            let point: Vec<u32> = sig.f.iter().map(|&b| b as u32).collect();
            let h = hilbert::encode(signature::SIGNATURE_DIM as u32, 8, &point)
                .expect("SIGNATURE_DIM and 8 bits are always in the valid hilbert range");
            (h, *oid, *sig)
        })
        .collect();
    ordered.sort_by(|a, b| a.0.cmp(&b.0));

    let mut cache = ThumbnailCache::new(cfg.buckets.buf_size * 64);
    let mut pairs_reported = 0u32;

    for (_, oid, sig) in &ordered {
        let Some((neighbor_oid, dist)) =
            tree.search(&sig.f, args.max_dist).find(|&(found, _)| found != *oid)
        else {
            continue;
        };

        let slot_a = cache.lock(*oid, || load_image_bytes(&pool, *oid))?;
        let bytes_a = cache.bytes(slot_a).to_vec();
        cache.unlock(slot_a);
        let slot_b = cache.lock(neighbor_oid, || load_image_bytes(&pool, neighbor_oid))?;
        let bytes_b = cache.bytes(slot_b).to_vec();
        cache.unlock(slot_b);

        let img_a = RawRgbDecoder.decode(&bytes_a)?;
        let img_b = RawRgbDecoder.decode(&bytes_b)?;
        cache.note_pair_comparison();

        let result = dup::compare(&img_a.as_image(), &img_b.as_image(), Transforms::all());
        if !result.is_empty() {
            cache.note_duplicate();
            pairs_reported += 1;
            println!("{}\t{}\t{:?}\t{}", oid, neighbor_oid, result, dist);
        }
    }

    info!("pass 1 complete: {} duplicate pairs, cache stats={:?}", pairs_reported, cache.stats());
    Ok(())
}

fn load_image_bytes(pool: &Pool, oid: Oid) -> Vec<u8> {
    let loc = pool.find_by_oid(oid).expect("oid present in pool");
    let mut reader = pool.fetch(&loc);
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).expect("read bucket payload");
    buf
}
