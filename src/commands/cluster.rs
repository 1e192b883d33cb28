//! Pass 2: random-BSP cluster pass over the signature set, grounded in
//! `original_source/images/image-idx.c`'s cluster-building routine, which
//! repeatedly splits the signature set with a random hyperplane through
//! its bounding box.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use log::info;

use picidx_core::kdtree::Vector;
use picidx_core::oid::Oid;
use picidx_core::signature::{self, SIGNATURE_DIM};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct ClusterArgs {
    #[arg(long, default_value = "signatures.bin")]
    pub sig_file: PathBuf,
    /// Stop splitting a cluster once it has this many members or fewer.
    #[arg(long, default_value_t = 16)]
    pub max_cluster: usize,
}

pub fn run(args: &ClusterArgs, _cfg: &Config) -> Result<()> {
    let sig_reader =
        File::open(&args.sig_file).with_context(|| format!("opening {}", args.sig_file.display()))?;
    let entries = signature::read_signatures(&mut BufReader::new(sig_reader))?;
    let points: Vec<(Oid, Vector)> = entries.iter().map(|(oid, sig)| (*oid, sig.f)).collect();

    let mut seed: u32 = 0x9e37_79b9;
    let clusters = build_bsp_clusters(&points, args.max_cluster, &mut seed);

    for (i, cluster) in clusters.iter().enumerate() {
        println!("cluster {}: {:?}", i, cluster);
    }
    info!("built {} clusters from {} cards", clusters.len(), points.len());
    Ok(())
}

fn xorshift(state: &mut u32) -> u32 {
    *state ^= *state << 13;
    *state ^= *state >> 17;
    *state ^= *state << 5;
    *state
}

/// Recursively splits the signature set with a random hyperplane through
/// its bounding box, grounded in `original_source/images/image-idx.c`'s
/// cluster-building pass.
pub fn build_bsp_clusters(points: &[(Oid, Vector)], max_cluster: usize, seed: &mut u32) -> Vec<Vec<Oid>> {
    if points.len() <= max_cluster {
        return vec![points.iter().map(|(oid, _)| *oid).collect()];
    }

    let weights: [i32; SIGNATURE_DIM] = std::array::from_fn(|_| (xorshift(seed) % 512) as i32 - 256);

    let mut projected: Vec<(i64, usize)> = points
        .iter()
        .enumerate()
        .map(|(i, (_, v))| {
            let p: i64 = v.iter().zip(weights.iter()).map(|(&x, &w)| x as i64 * w as i64).sum();
            (p, i)
        })
        .collect();
    projected.sort_by_key(|&(p, _)| p);

    let mid = projected.len() / 2;
    let left: Vec<(Oid, Vector)> = projected[..mid].iter().map(|&(_, i)| points[i]).collect();
    let right: Vec<(Oid, Vector)> = projected[mid..].iter().map(|&(_, i)| points[i]).collect();

    let mut out = build_bsp_clusters(&left, max_cluster, seed);
    out.extend(build_bsp_clusters(&right, max_cluster, seed));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clusters_cover_every_point_exactly_once() {
        let mut seed = 1u32;
        let points: Vec<(Oid, Vector)> =
            (0..100u32).map(|i| (i, [(i % 7) as u8; SIGNATURE_DIM])).collect();
        let clusters = build_bsp_clusters(&points, 8, &mut seed);
        let mut seen: Vec<Oid> = clusters.into_iter().flatten().collect();
        seen.sort();
        let mut expected: Vec<Oid> = (0..100u32).collect();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn small_input_is_a_single_cluster() {
        let mut seed = 1u32;
        let points: Vec<(Oid, Vector)> = (0..4u32).map(|i| (i, [0u8; SIGNATURE_DIM])).collect();
        let clusters = build_bsp_clusters(&points, 16, &mut seed);
        assert_eq!(clusters.len(), 1);
    }
}
