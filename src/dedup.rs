use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::types::HASH_BUF_LEN;

/// Shard count for the fingerprint registry. Distinct fingerprints almost
/// always land on distinct shards, so concurrent registration rarely
/// contends on a lock.
const SHARDS: usize = 16;

/// Streaming SHA-256 over the full file bytes. Collision risk must be
/// cryptographically negligible: a duplicate verdict leaves the file
/// unplaced. Zero-byte files hash to the well-known empty digest, so all
/// empties form one duplicate group.
pub fn fingerprint(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_BUF_LEN];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupDecision {
    /// First file seen with this fingerprint; it is kept.
    Canonical,
    /// Byte-identical to the file registered at this discovery index.
    DuplicateOf(usize),
}

/// Shared registry of content fingerprints. One canonical-vs-duplicate
/// decision per fingerprint, decided atomically under that fingerprint's
/// shard lock.
///
/// The canonical member of a group is whichever index registers first, so
/// callers must register in stable discovery order for run-to-run stability.
pub struct FingerprintRegistry {
    shards: Vec<Mutex<HashMap<String, usize>>>,
}

impl FingerprintRegistry {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARDS).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    pub fn register(&self, digest: &str, index: usize) -> DedupDecision {
        let mut shard = self.shards[Self::shard_of(digest)].lock();
        match shard.get(digest) {
            Some(&canonical) => DedupDecision::DuplicateOf(canonical),
            None => {
                shard.insert(digest.to_string(), index);
                DedupDecision::Canonical
            }
        }
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.lock().is_empty())
    }

    fn shard_of(digest: &str) -> usize {
        // Hex digests are uniformly distributed; the first byte is enough.
        digest.as_bytes().first().map(|b| *b as usize).unwrap_or(0) % SHARDS
    }
}

impl Default for FingerprintRegistry {
    fn default() -> Self {
        Self::new()
    }
}
