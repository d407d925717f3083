use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("identifier is empty")]
    Empty,
    #[error("identifier {0:?} contains characters outside [A-Za-z0-9]")]
    NotAlphanumeric(String),
    #[error("topic segment {0:?} contains a separator or wildcard")]
    ReservedCharacter(String),
}

fn validate_id(raw: &str) -> Result<(), IdError> {
    if raw.is_empty() {
        return Err(IdError::Empty);
    }
    if !raw.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(IdError::NotAlphanumeric(raw.to_string()));
    }
    Ok(())
}

fn validate_segment(raw: &str) -> Result<(), IdError> {
    if raw.is_empty() {
        return Err(IdError::Empty);
    }
    if raw.contains(['/', '+', '#']) {
        return Err(IdError::ReservedCharacter(raw.to_string()));
    }
    Ok(())
}

macro_rules! topic_segment {
    ($(#[$meta:meta])* $name:ident, $validate:path) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn parse(raw: &str) -> Result<Self, IdError> {
                $validate(raw)?;
                Ok(Self(raw.to_string()))
            }

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

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                $validate(&value)?;
                Ok(Self(value))
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

topic_segment!(
    /// Processing chain identifier. Generated ids are 32 lowercase hex characters.
    ChainId,
    validate_id
);
topic_segment!(
    /// Subsystem identifier as broadcast on `AvailableSubSystems/{id}/...`.
    SubSystemId,
    validate_id
);
topic_segment!(ControlId, validate_segment);
topic_segment!(
    /// Name of one output stream of a subsystem (`Data/{streamKey}/...`).
    StreamKey,
    validate_segment
);

impl ChainId {
    /// Mint a fresh chain id for a locally added chain.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

/// A layer bound to one data stream of one subsystem in one chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamLayerId {
    pub chain: ChainId,
    pub subsystem: SubSystemId,
    pub stream: StreamKey,
}

/// Composite identity of every map layer the console can show.
///
/// The dotted [`fmt::Display`] form doubles as the key under which the
/// layer's opacity and visibility are persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LayerId {
    WorldMap,
    Rosette(ChainId),
    Stream(StreamLayerId),
}

impl LayerId {
    pub fn stream(chain: ChainId, subsystem: SubSystemId, stream: StreamKey) -> Self {
        LayerId::Stream(StreamLayerId {
            chain,
            subsystem,
            stream,
        })
    }

    pub fn chain(&self) -> Option<&ChainId> {
        match self {
            LayerId::WorldMap => None,
            LayerId::Rosette(chain) => Some(chain),
            LayerId::Stream(id) => Some(&id.chain),
        }
    }

    pub fn subsystem(&self) -> Option<&SubSystemId> {
        match self {
            LayerId::Stream(id) => Some(&id.subsystem),
            _ => None,
        }
    }

    pub fn preference_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerId::WorldMap => f.write_str("Base.Setup.WorldMap"),
            LayerId::Rosette(chain) => write!(f, "{chain}.Setup.Rosette"),
            LayerId::Stream(id) => {
                let stream: String = id
                    .stream
                    .as_str()
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect();
                write!(f, "{}.{}.{}", id.chain, id.subsystem, stream)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_chain_ids_are_32_hex_characters() {
        let id = ChainId::generate();
        assert_eq!(id.as_str().len(), 32);
        assert!(id.as_str().bytes().all(|b| b.is_ascii_hexdigit()));
        assert_ne!(id, ChainId::generate());
    }

    #[test]
    fn ids_reject_separators_and_wildcards() {
        assert_eq!(ChainId::parse(""), Err(IdError::Empty));
        assert!(matches!(
            SubSystemId::parse("a/b"),
            Err(IdError::NotAlphanumeric(_))
        ));
        assert!(matches!(
            StreamKey::parse("tracks+"),
            Err(IdError::ReservedCharacter(_))
        ));
        assert!(StreamKey::parse("Air Tracks").is_ok());
    }

    #[test]
    fn layer_keys_use_dotted_form() {
        let chain = ChainId::parse("A").unwrap();
        let stream = LayerId::stream(
            chain.clone(),
            SubSystemId::parse("S1").unwrap(),
            StreamKey::parse("Air Tracks").unwrap(),
        );
        assert_eq!(stream.preference_key(), "A.S1.AirTracks");
        assert_eq!(LayerId::Rosette(chain).to_string(), "A.Setup.Rosette");
        assert_eq!(LayerId::WorldMap.to_string(), "Base.Setup.WorldMap");
    }

    #[test]
    fn ids_round_trip_through_json_strings() {
        let id: ChainId = serde_json::from_str("\"abc123\"").unwrap();
        assert_eq!(id.as_str(), "abc123");
        assert!(serde_json::from_str::<ChainId>("\"bad id\"").is_err());
    }
}
