//! Game and Client Identifiers
//!
//! Both are 8 ASCII alphanumeric characters. Random IDs are drawn from a
//! UUIDv4; deterministic IDs (bots) come from the seeded RNG.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use super::rng::{DeterministicRng, ID_LENGTH};

/// Identifier validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    /// Wrong number of characters.
    #[error("expected 8 characters, got {0}")]
    Length(usize),
    /// Non-alphanumeric character.
    #[error("invalid character {0:?}")]
    Character(char),
}

fn validate(s: &str) -> Result<(), IdError> {
    if let Some(c) = s.chars().find(|c| !c.is_ascii_alphanumeric()) {
        return Err(IdError::Character(c));
    }
    if s.len() != ID_LENGTH {
        return Err(IdError::Length(s.len()));
    }
    Ok(())
}

fn random_id() -> String {
    let bits = uuid::Uuid::new_v4().as_u128();
    let mut rng = DeterministicRng::default();
    // Full 128 bits of state; a 32-bit seed would collide too often
    rng.set_state([bits as u64 | 1, (bits >> 64) as u64]);
    rng.next_id()
}

macro_rules! short_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            /// Parse and validate.
            pub fn parse(s: &str) -> Result<Self, IdError> {
                validate(s)?;
                Ok(Self(s.to_owned()))
            }

            /// Generate a fresh random identifier.
            pub fn generate() -> Self {
                Self(random_id())
            }

            /// Draw an identifier from a deterministic RNG.
            pub fn from_rng(rng: &mut DeterministicRng) -> Self {
                Self(rng.next_id())
            }

            /// Borrow as string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

short_id!(
    /// Unique game identifier. Also the sharding key.
    GameId
);

short_id!(
    /// Client identifier, stable across reconnects.
    ClientId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let id = GameId::parse("abcD1234").unwrap();
        assert_eq!(id.as_str(), "abcD1234");
        assert_eq!(id.to_string(), "abcD1234");
    }

    #[test]
    fn test_parse_rejects_bad_ids() {
        assert_eq!(GameId::parse("short"), Err(IdError::Length(5)));
        assert_eq!(GameId::parse("abcdefghi"), Err(IdError::Length(9)));
        assert_eq!(ClientId::parse("abc-1234"), Err(IdError::Character('-')));
        assert_eq!(ClientId::parse("../../aa"), Err(IdError::Character('.')));
    }

    #[test]
    fn test_generate_is_valid_and_distinct() {
        let a = GameId::generate();
        let b = GameId::generate();
        assert!(GameId::parse(a.as_str()).is_ok());
        assert_ne!(a, b);
    }

    #[test]
    fn test_from_rng_is_deterministic() {
        let a = ClientId::from_rng(&mut DeterministicRng::new(7));
        let b = ClientId::from_rng(&mut DeterministicRng::new(7));
        assert_eq!(a, b);
    }

    #[test]
    fn test_serde_validates() {
        let id: GameId = serde_json::from_str("\"Zz009988\"").unwrap();
        assert_eq!(id.as_str(), "Zz009988");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"Zz009988\"");

        let bad: Result<GameId, _> = serde_json::from_str("\"nope\"");
        assert!(bad.is_err());
    }
}
