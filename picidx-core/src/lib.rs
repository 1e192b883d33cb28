//! Core algorithms for the image similarity indexer: the bucket pool
//! object store, perceptual signature extraction, the k-d tree similarity
//! index, the duplicate comparator, and the thumbnail cache that backs it.

pub mod bucket;
pub mod cache;
pub mod color;
pub mod dup;
pub mod error;
pub mod hilbert;
pub mod image;
pub mod kdtree;
pub mod oid;
pub mod signature;
pub mod wavelet;
