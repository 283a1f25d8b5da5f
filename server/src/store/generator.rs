use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Snapshot tag of the multiplicative generator below. A snapshot carrying
/// any other tag was written by an incompatible scheme.
pub const YUKI_S0_VERSION: &str = "yuki-s0";

/// Odd multiplier of the reference configuration (Knuth's 2^32 / phi prime).
pub const REFERENCE_PRIME: u64 = 2_654_435_761;

/// Tokens carry three bytes, so the capacity can never exceed 2^24.
pub const REFERENCE_MAX_ENTRIES: u64 = 1 << 24;

/// Every token is three bytes in unpadded base64.
pub const TOKEN_WIDTH: usize = 4;

/// Maps an insertion index to a short, opaque token.
///
/// `index -> prime * (index + base) mod max_entries` is a bijection on
/// `[0, max_entries)` whenever `prime` is odd and `max_entries` is a power
/// of two, so distinct indices below the capacity never share a token. The
/// random `base` only shifts where in the permutation a store starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generator {
    #[serde(rename = "generator-prime", alias = "prime")]
    prime: u64,
    #[serde(rename = "max-entries")]
    max_entries: u64,
    base: u64,
}

impl Generator {
    #[allow(dead_code)]
    pub fn new(prime: u64, max_entries: u64, base: u64) -> Result<Self> {
        let generator = Self {
            prime,
            max_entries,
            base,
        };
        generator.validate()?;
        Ok(generator)
    }

    /// The reference configuration with a caller-chosen base.
    pub fn reference(base: u64) -> Self {
        Self {
            prime: REFERENCE_PRIME,
            max_entries: REFERENCE_MAX_ENTRIES,
            base,
        }
    }

    /// The reference configuration with a random base, used for new stores.
    pub fn random() -> Self {
        Self::reference(rand::random())
    }

    /// Rejects configurations under which `permute` would not be injective
    /// or whose results would not fit in a token.
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 || !self.max_entries.is_power_of_two() {
            return Err(StoreError::InvalidConfig(format!(
                "max-entries must be a power of two, got {}",
                self.max_entries
            )));
        }
        if self.max_entries > REFERENCE_MAX_ENTRIES {
            return Err(StoreError::InvalidConfig(format!(
                "max-entries must be at most {REFERENCE_MAX_ENTRIES}, got {}",
                self.max_entries
            )));
        }
        // A power-of-two modulus makes every odd multiplier invertible.
        if self.prime % 2 == 0 {
            return Err(StoreError::InvalidConfig(format!(
                "generator prime must be odd, got {}",
                self.prime
            )));
        }
        Ok(())
    }

    pub fn prime(&self) -> u64 {
        self.prime
    }

    pub fn max_entries(&self) -> u64 {
        self.max_entries
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    /// Position of `index` in the permutation, before encoding.
    pub fn permute(&self, index: u64) -> Result<u64> {
        if index >= self.max_entries {
            return Err(StoreError::CapacityExhausted {
                index,
                max_entries: self.max_entries,
            });
        }
        let shifted = index as u128 + self.base as u128;
        let result = (self.prime as u128 * shifted) % self.max_entries as u128;
        Ok(result as u64)
    }

    /// Token for the `index`-th distinct URL of a store.
    pub fn generate(&self, index: u64) -> Result<String> {
        let result = self.permute(index)?;
        let bytes = [(result >> 16) as u8, (result >> 8) as u8, result as u8];
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }
}

/// Whether `candidate` has the width and alphabet of a generated token.
pub fn is_token(candidate: &str) -> bool {
    candidate.len() == TOKEN_WIDTH
        && candidate
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn small_permutation_matches_hand_computation() {
        let generator = Generator::new(3, 8, 0).unwrap();
        let values: Vec<u64> = (0..8).map(|i| generator.permute(i).unwrap()).collect();
        assert_eq!(values, vec![0, 3, 6, 1, 4, 7, 2, 5]);
    }

    #[test]
    fn tokens_cover_the_whole_capacity() {
        let generator = Generator::new(31, 1 << 10, rand::random()).unwrap();
        let tokens: HashSet<String> = (0..generator.max_entries())
            .map(|i| generator.generate(i).unwrap())
            .collect();
        assert_eq!(tokens.len() as u64, generator.max_entries());
    }

    #[test]
    fn reference_configuration_is_a_bijection() {
        let generator = Generator::random();
        let mut seen = vec![0u64; (REFERENCE_MAX_ENTRIES / 64) as usize];
        for index in 0..REFERENCE_MAX_ENTRIES {
            let value = generator.permute(index).unwrap();
            let (word, bit) = ((value / 64) as usize, value % 64);
            assert_eq!(seen[word] & (1u64 << bit), 0, "index {index} collides");
            seen[word] |= 1u64 << bit;
        }
        assert!(seen.iter().all(|word| *word == u64::MAX));
    }

    #[test]
    fn tokens_have_fixed_width_and_alphabet() {
        let generator = Generator::random();
        for index in [0, 1, 2, 63, 64, 4095, REFERENCE_MAX_ENTRIES - 1] {
            let token = generator.generate(index).unwrap();
            assert_eq!(token.len(), TOKEN_WIDTH);
            assert!(is_token(&token), "unexpected token {token}");
        }
    }

    #[test]
    fn encodes_low_three_bytes_big_endian() {
        let generator = Generator::new(3, 8, 0).unwrap();
        assert_eq!(generator.generate(0).unwrap(), "AAAA");
        assert_eq!(generator.generate(1).unwrap(), "AAAD");
    }

    #[test]
    fn large_base_does_not_overflow() {
        let generator = Generator::new(REFERENCE_PRIME, REFERENCE_MAX_ENTRIES, u64::MAX).unwrap();
        assert!(generator.generate(REFERENCE_MAX_ENTRIES - 1).is_ok());
    }

    #[test]
    fn index_at_capacity_is_rejected() {
        let generator = Generator::new(3, 8, 5).unwrap();
        assert!(matches!(
            generator.generate(8),
            Err(StoreError::CapacityExhausted {
                index: 8,
                max_entries: 8
            })
        ));
    }

    #[test]
    fn rejects_configurations_that_break_the_bijection() {
        assert!(matches!(
            Generator::new(4, 8, 0),
            Err(StoreError::InvalidConfig(_))
        ));
        assert!(matches!(
            Generator::new(3, 12, 0),
            Err(StoreError::InvalidConfig(_))
        ));
        assert!(matches!(
            Generator::new(3, 0, 0),
            Err(StoreError::InvalidConfig(_))
        ));
        assert!(matches!(
            Generator::new(3, 1 << 25, 0),
            Err(StoreError::InvalidConfig(_))
        ));
    }

    #[test]
    fn serializes_with_snapshot_field_names() {
        let generator = Generator::new(31, 1024, 7).unwrap();
        let json = serde_json::to_value(generator).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "generator-prime": 31, "max-entries": 1024, "base": 7 })
        );

        let aliased: Generator =
            serde_json::from_str(r#"{"prime": 31, "max-entries": 1024, "base": 7}"#).unwrap();
        assert_eq!(aliased, generator);
    }

    #[test]
    fn token_shape_check() {
        assert!(is_token("aB-_"));
        assert!(!is_token("abc"));
        assert!(!is_token("abcde"));
        assert!(!is_token("ab/c"));
        assert!(!is_token("ab=c"));
    }
}
