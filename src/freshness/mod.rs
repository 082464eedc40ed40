//! Freshness detection: content-hash (blake3) comparison of deployed files.

mod hash;

pub use hash::{compute_file_hash, files_identical};
