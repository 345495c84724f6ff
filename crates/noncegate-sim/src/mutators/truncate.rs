use super::Mutator;
use anyhow::Result;

/// Keeps the first `at` bytes of the token.
pub struct Truncate {
    pub at: usize,
}

impl Mutator for Truncate {
    fn mutate(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data[..self.at.min(data.len())].to_vec())
    }
}

/// Appends `extra` bytes after the token.
pub struct Extend {
    pub extra: Vec<u8>,
}

impl Mutator for Extend {
    fn mutate(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok([data, self.extra.as_slice()].concat())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_past_end_is_identity() {
        let data = [1u8, 2, 3];
        assert_eq!(Truncate { at: 2 }.mutate(&data).unwrap(), vec![1, 2]);
        assert_eq!(Truncate { at: 9 }.mutate(&data).unwrap(), data.to_vec());
        assert!(Truncate { at: 0 }.mutate(&data).unwrap().is_empty());
    }

    #[test]
    fn test_extend_appends() {
        let out = Extend { extra: vec![9, 9] }.mutate(&[1]).unwrap();
        assert_eq!(out, vec![1, 9, 9]);
    }
}
