use crate::*;
use rand::rngs::OsRng;
use rand_chacha::ChaCha20Rng;
use rand_core::{RngCore, SeedableRng};

/// Rejection sampling gives up after this many draws for a single index
const MAX_INDEX_DRAWS: usize = 128;

/// Source of unpredictable bits
///
/// The protocol never inspects how bits are produced. A failure is reported as
/// `Error::Unavailable` and leaves protocol state untouched.
pub trait RandomSource: Send {
    fn next_bits(&mut self, n: usize) -> Result<BitString, Error>;
}

/// Operating-system entropy
#[derive(Default, Debug, Clone, Copy)]
pub struct OsRandomSource;

impl RandomSource for OsRandomSource {
    fn next_bits(&mut self, n: usize) -> Result<BitString, Error> {
        let mut bytes = vec![0u8; (n + 7) / 8];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| Error::Unavailable(format!("os random source: {}", e)))?;
        Ok(BitString::from_bytes(&bytes, n)?)
    }
}

/// Reproducible ChaCha20 stream, for simulations and tests
pub struct SeededRandomSource {
    rng: ChaCha20Rng,
}

impl SeededRandomSource {
    pub fn new(seed: u64) -> Self {
        SeededRandomSource {
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }
}

impl RandomSource for SeededRandomSource {
    fn next_bits(&mut self, n: usize) -> Result<BitString, Error> {
        let mut bytes = vec![0u8; (n + 7) / 8];
        self.rng.fill_bytes(&mut bytes);
        Ok(BitString::from_bytes(&bytes, n)?)
    }
}

/// Uniform index in `0..bound`, drawn from `random` by rejection sampling.
pub fn random_index(random: &mut dyn RandomSource, bound: usize) -> Result<usize, Error> {
    if bound <= 1 {
        return Ok(0);
    }
    let width = (usize::BITS - (bound - 1).leading_zeros()) as usize;
    for _ in 0..MAX_INDEX_DRAWS {
        let value = random
            .next_bits(width)?
            .to_u64()
            .ok_or_else(|| Error::Unavailable("index wider than 64 bits".to_owned()))?;
        if (value as usize) < bound {
            return Ok(value as usize);
        }
    }
    Err(Error::Unavailable(format!(
        "random source produced no index below {} in {} draws",
        bound, MAX_INDEX_DRAWS
    )))
}

/// In-place Fisher–Yates shuffle driven by `random`
pub fn shuffle<T>(items: &mut [T], random: &mut dyn RandomSource) -> Result<(), Error> {
    for i in (1..items.len()).rev() {
        let j = random_index(random, i + 1)?;
        items.swap(i, j);
    }
    Ok(())
}
