use super::Mutator;
use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

/// Flips `count` random bits.
pub struct BitFlip {
    pub count: usize,
    /// Optional seed for deterministic mutations. Uses thread_rng if None.
    pub seed: Option<u64>,
}

impl Mutator for BitFlip {
    fn mutate(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut corrupted = data.to_vec();
        if corrupted.is_empty() {
            return Ok(corrupted);
        }

        let mut rng: Box<dyn RngCore> = match self.seed {
            Some(seed) => Box::new(StdRng::seed_from_u64(seed)),
            None => Box::new(rand::thread_rng()),
        };
        for _ in 0..self.count {
            let idx = rng.gen_range(0..corrupted.len());
            corrupted[idx] ^= 1 << rng.gen_range(0..8u32);
        }

        // an even number of flips on one bit cancels out
        if corrupted == data {
            corrupted[0] ^= 0x80;
        }

        Ok(corrupted)
    }
}
