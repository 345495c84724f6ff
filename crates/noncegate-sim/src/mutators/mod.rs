pub mod bitflip;
pub mod truncate;

use anyhow::Result;

pub use bitflip::BitFlip;
pub use truncate::{Extend, Truncate};

/// Corrupts raw token bytes.
pub trait Mutator {
    fn mutate(&self, data: &[u8]) -> Result<Vec<u8>>;
}
