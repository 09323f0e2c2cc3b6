//! Deterministic index derivation.
//!
//! Indexes look unpredictable to callers but are a pure function of the
//! configured seed, the identity being assigned and a nonce, so any party
//! holding the seed can reproduce and verify an assignment.

use sha2::{Digest, Sha256};

use surety_core::{Address, FlightKey};

/// Hash rounds tried before falling back to filling the lowest free indexes.
const MAX_ROUNDS: u32 = 16;

/// Derives oracle and request indexes from a seed.
#[derive(Debug, Clone)]
pub struct IndexDeriver {
    seed: String,
    index_space: u8,
}

impl IndexDeriver {
    /// Create a deriver over `[0, index_space)`.
    pub fn new(seed: impl Into<String>, index_space: u8) -> Self {
        Self {
            seed: seed.into(),
            index_space: index_space.max(1),
        }
    }

    /// Size of the index space.
    pub fn index_space(&self) -> u8 {
        self.index_space
    }

    /// `count` distinct indexes for an oracle registered with `nonce`.
    pub fn oracle_indexes(&self, oracle: &Address, nonce: u64, count: usize) -> Vec<u8> {
        let count = count.min(usize::from(self.index_space));
        let mut indexes = Vec::with_capacity(count);

        for round in 0..MAX_ROUNDS {
            let digest = self.digest(&[
                b"oracle".as_slice(),
                oracle.as_str().as_bytes(),
                nonce.to_be_bytes().as_slice(),
                round.to_be_bytes().as_slice(),
            ]);
            for byte in digest {
                let index = byte % self.index_space;
                if !indexes.contains(&index) {
                    indexes.push(index);
                    if indexes.len() == count {
                        return indexes;
                    }
                }
            }
        }

        for index in 0..self.index_space {
            if indexes.len() == count {
                break;
            }
            if !indexes.contains(&index) {
                indexes.push(index);
            }
        }
        indexes
    }

    /// Index tagging the `nonce`-th status request, opened for `flight`.
    pub fn request_index(&self, flight: &FlightKey, nonce: u64) -> u8 {
        let digest = self.digest(&[
            b"request".as_slice(),
            flight.airline.as_str().as_bytes(),
            flight.designator.as_bytes(),
            flight.scheduled.timestamp().to_be_bytes().as_slice(),
            nonce.to_be_bytes().as_slice(),
        ]);
        digest[0] % self.index_space
    }

    /// Stable identifier of a request: hash of its index and flight key.
    pub fn request_id(index: u8, flight: &FlightKey) -> String {
        let mut hasher = Sha256::new();
        hasher.update([index]);
        hasher.update(flight.airline.as_str().as_bytes());
        hasher.update(flight.designator.as_bytes());
        hasher.update(flight.scheduled.timestamp().to_be_bytes());
        hex::encode(hasher.finalize())
    }

    fn digest(&self, parts: &[&[u8]]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.seed.as_bytes());
        for part in parts {
            // Length-prefix each part so concatenations cannot collide
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(*part);
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    #[test]
    fn test_oracle_indexes_distinct_and_in_range() {
        let deriver = IndexDeriver::new("seed", 10);
        for n in 0..50u64 {
            let oracle = Address::new(format!("oracle-{}", n));
            let indexes = deriver.oracle_indexes(&oracle, n, 3);
            assert_eq!(indexes.len(), 3);
            assert!(indexes.iter().all(|i| *i < 10));
            let mut sorted = indexes.clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(sorted.len(), 3);
        }
    }

    #[test]
    fn test_assignment_is_reproducible() {
        let a = IndexDeriver::new("seed", 10);
        let b = IndexDeriver::new("seed", 10);
        let oracle = Address::new("oracle-1");
        assert_eq!(a.oracle_indexes(&oracle, 7, 3), b.oracle_indexes(&oracle, 7, 3));
    }

    #[test]
    fn test_full_space_assignment() {
        let deriver = IndexDeriver::new("seed", 3);
        let mut indexes = deriver.oracle_indexes(&Address::new("o"), 0, 3);
        indexes.sort_unstable();
        assert_eq!(indexes, vec![0, 1, 2]);
    }

    #[test]
    fn test_request_id_depends_on_index() {
        let scheduled = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let flight = FlightKey::new("a0", "BD674", scheduled);
        assert_ne!(
            IndexDeriver::request_id(1, &flight),
            IndexDeriver::request_id(2, &flight)
        );
        assert_eq!(IndexDeriver::request_id(1, &flight).len(), 64);
    }
}
