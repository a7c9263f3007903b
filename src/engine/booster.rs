// Deterministic entropy booster
// Factors a small seed and hashes the sorted factor list together with the seed

use sha2::{Digest, Sha256};
use std::thread;

use super::EngineError;

/// Seeds must be strictly below 2^20
pub const SEED_LIMIT: u32 = 1 << 20;

const BOOST_DOMAIN: &[u8] = b"strata-entropy-boost-v1";

/// Below this many candidates a divisor search is never split across workers
const MIN_CANDIDATES_PER_WORKER: u32 = 64;

/// Entropy-expansion step used by the key schedule.
///
/// `boost` is a pure function of its seed. The worker count only changes how
/// the trial-division range is scanned: the range is cut into contiguous,
/// index-ordered chunks and the divisor reported by the lowest chunk wins, so
/// sequential and parallel runs always agree.
#[derive(Clone, Debug)]
pub struct EntropyBooster {
    workers: usize,
}

impl EntropyBooster {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn sequential() -> Self {
        Self::new(1)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Expand `seed` into a 32-byte digest
    pub fn boost(&self, seed: u32) -> Result<[u8; 32], EngineError> {
        if seed >= SEED_LIMIT {
            return Err(EngineError::KeyDerivationFailure {
                layer: None,
                reason: format!("entropy seed {} is not below 2^20", seed),
            });
        }

        let factors = self.factorize(seed.max(2));

        let mut hasher = Sha256::new();
        hasher.update(BOOST_DOMAIN);
        hasher.update(seed.to_be_bytes());
        hasher.update((factors.len() as u32).to_be_bytes());
        for factor in &factors {
            hasher.update(factor.to_be_bytes());
        }

        Ok(hasher.finalize().into())
    }

    /// Prime factorization of `n` (n >= 2) in ascending order
    pub fn factorize(&self, mut n: u32) -> Vec<u32> {
        let mut factors = Vec::new();

        while n > 1 {
            match self.smallest_divisor(n) {
                Some(d) => {
                    factors.push(d);
                    n /= d;
                }
                None => {
                    factors.push(n);
                    break;
                }
            }
        }

        factors
    }

    /// Smallest divisor of `n` in `2..=isqrt(n)`, or None when `n` is prime
    fn smallest_divisor(&self, n: u32) -> Option<u32> {
        let limit = isqrt(n);
        if limit < 2 {
            return None;
        }

        let candidates = limit - 1;
        let workers = (self.workers as u32)
            .min(candidates / MIN_CANDIDATES_PER_WORKER)
            .max(1);

        if workers == 1 {
            return scan(n, 2, limit);
        }

        let chunk = candidates.div_ceil(workers);
        let ranges: Vec<(u32, u32)> = (0..workers)
            .map(|i| {
                let start = 2 + i * chunk;
                let end = (start + chunk - 1).min(limit);
                (start, end)
            })
            .filter(|(start, end)| start <= end)
            .collect();

        // Results are collected in chunk order, never completion order
        let results: Vec<Option<u32>> = thread::scope(|scope| {
            let handles: Vec<_> = ranges
                .iter()
                .map(|&(start, end)| scope.spawn(move || scan(n, start, end)))
                .collect();

            handles
                .into_iter()
                .zip(ranges.iter())
                .map(|(handle, &(start, end))| {
                    // A panicked worker is rescanned inline so the answer stays exact
                    handle.join().unwrap_or_else(|_| scan(n, start, end))
                })
                .collect()
        });

        results.into_iter().flatten().next()
    }
}

impl Default for EntropyBooster {
    fn default() -> Self {
        Self::sequential()
    }
}

fn scan(n: u32, start: u32, end: u32) -> Option<u32> {
    (start..=end).find(|d| n % d == 0)
}

fn isqrt(n: u32) -> u32 {
    let mut r = (n as f64).sqrt() as u32;
    while (r as u64) * (r as u64) > n as u64 {
        r -= 1;
    }
    while ((r + 1) as u64) * ((r + 1) as u64) <= n as u64 {
        r += 1;
    }
    r
}
