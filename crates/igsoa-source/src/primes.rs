// ─────────────────────────────────────────────────────────────────────
// IGSOA GW Engine — Prime Utilities
// ─────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};

/// All primes ≤ `limit` (sieve of Eratosthenes).
pub fn sieve(limit: usize) -> Vec<u64> {
    if limit < 2 {
        return Vec::new();
    }
    let mut composite = vec![false; limit + 1];
    let mut i = 2;
    while i * i <= limit {
        if !composite[i] {
            let mut m = i * i;
            while m <= limit {
                composite[m] = true;
                m += i;
            }
        }
        i += 1;
    }
    (2..=limit)
        .filter(|&n| !composite[n])
        .map(|n| n as u64)
        .collect()
}

/// The first `count` primes.
pub fn first_primes(count: usize) -> Vec<u64> {
    if count == 0 {
        return Vec::new();
    }
    // p_n < n(ln n + ln ln n) for n ≥ 6.
    let n = count.max(6) as f64;
    let mut limit = (n * (n.ln() + n.ln().ln())).ceil() as usize + 10;
    loop {
        let mut primes = sieve(limit);
        if primes.len() >= count {
            primes.truncate(count);
            return primes;
        }
        limit *= 2;
    }
}

/// Differences between consecutive primes.
pub fn prime_gaps(primes: &[u64]) -> Vec<u64> {
    primes.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Summary of a run of prime gaps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PrimeStats {
    pub gaps: usize,
    pub min_gap: u64,
    pub max_gap: u64,
    pub mean_gap: f64,
    /// Gaps equal to 2.
    pub twin_pairs: usize,
}

impl PrimeStats {
    pub fn from_gaps(gaps: &[u64]) -> Self {
        if gaps.is_empty() {
            return Self::default();
        }
        Self {
            gaps: gaps.len(),
            min_gap: gaps.iter().copied().min().unwrap_or(0),
            max_gap: gaps.iter().copied().max().unwrap_or(0),
            mean_gap: gaps.iter().sum::<u64>() as f64 / gaps.len() as f64,
            twin_pairs: gaps.iter().filter(|&&g| g == 2).count(),
        }
    }
}
