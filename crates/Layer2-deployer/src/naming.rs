//! Container name generation
//!
//! A seeded generator shared by every deploy on one connector. The lock only
//! serializes access to the generator state; names are unique by entropy,
//! not by checking what is already running.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Length of the random suffix
pub const SUFFIX_LEN: usize = 10;

const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Produces `prefix_suffix` container names
#[derive(Debug)]
pub struct NameGenerator {
    prefix: String,
    seed: i64,
    rng: Mutex<StdRng>,
}

impl NameGenerator {
    /// `seed == 0` derives a seed from the wall clock. Negative seeds are
    /// used bit for bit.
    pub fn new(prefix: impl Into<String>, seed: i64) -> Self {
        let seed = if seed == 0 { clock_seed() } else { seed };
        Self {
            prefix: prefix.into(),
            seed,
            rng: Mutex::new(StdRng::seed_from_u64(seed as u64)),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Seed actually in use, for reproducing a run
    pub fn seed(&self) -> i64 {
        self.seed
    }

    /// Draw the next suffix
    pub fn next_suffix(&self) -> String {
        let mut rng = self.rng.lock();
        (0..SUFFIX_LEN)
            .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
            .collect()
    }

    /// Draw the next full container name
    pub fn next_name(&self) -> String {
        format!("{}_{}", self.prefix, self.next_suffix())
    }
}

fn clock_seed() -> i64 {
    let now = chrono::Utc::now();
    let nanos = now
        .timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1_000));
    match nanos {
        0 => 1,
        seed => seed,
    }
}
