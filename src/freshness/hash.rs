//! Content hashing and byte-identity detection using blake3.
//!
//! Files are streamed through the hasher in fixed-size chunks, so large
//! deployment artifacts are never loaded whole.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

const CHUNK: usize = 64 * 1024;

/// A 256-bit content hash (blake3 output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Create a new ContentHash from raw bytes.
    #[inline]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Convert to hex string.
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // First 16 hex chars are plenty for log lines
        write!(f, "{}", &self.to_hex()[..16])
    }
}

/// Compute the blake3 hash of a file's contents.
///
/// Returns `None` when the file cannot be opened or read.
pub fn compute_file_hash(path: &Path) -> Option<ContentHash> {
    let file = File::open(path).ok()?;

    let mut reader = BufReader::with_capacity(CHUNK, file);
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; CHUNK];

    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                hasher.update(&buffer[..n]);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => return None,
        }
    }

    Some(ContentHash::new(*hasher.finalize().as_bytes()))
}

/// Check whether two files have byte-identical content.
///
/// Any path that is missing or unreadable makes the pair "not identical",
/// which callers treat as "needs update".
pub fn files_identical(a: &Path, b: &Path) -> bool {
    match (compute_file_hash(a), compute_file_hash(b)) {
        (Some(ha), Some(hb)) => ha == hb,
        _ => false,
    }
}
