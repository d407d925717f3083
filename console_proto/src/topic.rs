//! Structured topic grammar.
//!
//! Topics are tokenized on `/` and matched segment by segment; ids are
//! validated as they are extracted so no caller ever slices topic strings.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::ids::{ChainId, ControlId, IdError, StreamKey, SubSystemId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TopicError {
    #[error("topic {0:?} does not match any known shape")]
    UnknownShape(String),
    #[error("invalid id in topic {topic:?}: {source}")]
    InvalidId {
        topic: String,
        #[source]
        source: IdError,
    },
}

/// The `(chain, subsystem)` pair addressed by `Chains/{c}/SubSystems/{s}/...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubSystemPath {
    pub chain: ChainId,
    pub subsystem: SubSystemId,
}

impl SubSystemPath {
    pub fn new(chain: ChainId, subsystem: SubSystemId) -> Self {
        Self { chain, subsystem }
    }
}

impl fmt::Display for SubSystemPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Chains/{}/SubSystems/{}", self.chain, self.subsystem)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    AvailableChains,
    SelectedChain,
    ChainSetup(ChainId),
    ChainSubSystems(ChainId),
    SubSystemStatus(SubSystemId),
    SubSystemDefinition(SubSystemId),
    Outgoing(SubSystemPath),
    Incoming(SubSystemPath),
    Rates(SubSystemPath),
    Control {
        path: SubSystemPath,
        control: ControlId,
    },
    Interpretation {
        path: SubSystemPath,
        stream: StreamKey,
    },
    Records {
        path: SubSystemPath,
        stream: StreamKey,
    },
}

impl Topic {
    pub fn parse(raw: &str) -> Result<Self, TopicError> {
        let invalid = |source: IdError| TopicError::InvalidId {
            topic: raw.to_string(),
            source,
        };
        let segments: Vec<&str> = raw.split('/').collect();
        let topic = match segments.as_slice() {
            ["AvailableChains"] => Topic::AvailableChains,
            ["SelectedChain"] => Topic::SelectedChain,
            ["Chains", chain, "Setup"] => {
                Topic::ChainSetup(ChainId::parse(chain).map_err(invalid)?)
            }
            ["Chains", chain, "Setup", "SubSystems"] => {
                Topic::ChainSubSystems(ChainId::parse(chain).map_err(invalid)?)
            }
            ["AvailableSubSystems", sub, "Status"] => {
                Topic::SubSystemStatus(SubSystemId::parse(sub).map_err(invalid)?)
            }
            ["AvailableSubSystems", sub, "Definition"] => {
                Topic::SubSystemDefinition(SubSystemId::parse(sub).map_err(invalid)?)
            }
            ["Chains", chain, "SubSystems", sub, rest @ ..] => {
                let path = SubSystemPath::new(
                    ChainId::parse(chain).map_err(invalid)?,
                    SubSystemId::parse(sub).map_err(invalid)?,
                );
                match rest {
                    ["Outgoing"] => Topic::Outgoing(path),
                    ["Incoming"] => Topic::Incoming(path),
                    ["Rates"] => Topic::Rates(path),
                    ["Controls", control] => Topic::Control {
                        path,
                        control: ControlId::parse(control).map_err(invalid)?,
                    },
                    ["Data", stream, "Interpretation"] => Topic::Interpretation {
                        path,
                        stream: StreamKey::parse(stream).map_err(invalid)?,
                    },
                    ["Data", stream, "Records"] => Topic::Records {
                        path,
                        stream: StreamKey::parse(stream).map_err(invalid)?,
                    },
                    _ => return Err(TopicError::UnknownShape(raw.to_string())),
                }
            }
            _ => return Err(TopicError::UnknownShape(raw.to_string())),
        };
        Ok(topic)
    }

    pub fn chain(&self) -> Option<&ChainId> {
        match self {
            Topic::ChainSetup(chain) | Topic::ChainSubSystems(chain) => Some(chain),
            Topic::Outgoing(path) | Topic::Incoming(path) | Topic::Rates(path) => Some(&path.chain),
            Topic::Control { path, .. }
            | Topic::Interpretation { path, .. }
            | Topic::Records { path, .. } => Some(&path.chain),
            _ => None,
        }
    }
}

impl FromStr for Topic {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::parse(s)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::AvailableChains => f.write_str("AvailableChains"),
            Topic::SelectedChain => f.write_str("SelectedChain"),
            Topic::ChainSetup(chain) => write!(f, "Chains/{chain}/Setup"),
            Topic::ChainSubSystems(chain) => write!(f, "Chains/{chain}/Setup/SubSystems"),
            Topic::SubSystemStatus(sub) => write!(f, "AvailableSubSystems/{sub}/Status"),
            Topic::SubSystemDefinition(sub) => write!(f, "AvailableSubSystems/{sub}/Definition"),
            Topic::Outgoing(path) => write!(f, "{path}/Outgoing"),
            Topic::Incoming(path) => write!(f, "{path}/Incoming"),
            Topic::Rates(path) => write!(f, "{path}/Rates"),
            Topic::Control { path, control } => write!(f, "{path}/Controls/{control}"),
            Topic::Interpretation { path, stream } => {
                write!(f, "{path}/Data/{stream}/Interpretation")
            }
            Topic::Records { path, stream } => write!(f, "{path}/Data/{stream}/Records"),
        }
    }
}

/// A subscription pattern. `+` matches one segment, a trailing `#` matches
/// the remainder (including nothing).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicFilter(String);

impl TopicFilter {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    pub fn exact(topic: &Topic) -> Self {
        Self(topic.to_string())
    }

    pub fn all_statuses() -> Self {
        Self::new("AvailableSubSystems/+/Status")
    }

    pub fn all_definitions() -> Self {
        Self::new("AvailableSubSystems/+/Definition")
    }

    /// `Chains/{chain}/Setup` and everything below it.
    pub fn chain_setup_tree(chain: &ChainId) -> Self {
        Self(format!("Chains/{chain}/Setup/#"))
    }

    pub fn controls(path: &SubSystemPath) -> Self {
        Self(format!("{path}/Controls/#"))
    }

    pub fn interpretations(path: &SubSystemPath) -> Self {
        Self(format!("{path}/Data/+/Interpretation"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, topic: &str) -> bool {
        let mut pattern = self.0.split('/');
        let mut segments = topic.split('/');
        loop {
            match (pattern.next(), segments.next()) {
                (Some("#"), _) => return true,
                (Some("+"), Some(_)) => {}
                (Some(expected), Some(actual)) if expected == actual => {}
                (None, None) => return true,
                _ => return false,
            }
        }
    }
}

impl fmt::Display for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&Topic> for TopicFilter {
    fn from(topic: &Topic) -> Self {
        TopicFilter::exact(topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path() -> SubSystemPath {
        SubSystemPath::new(ChainId::parse("A").unwrap(), SubSystemId::parse("S1").unwrap())
    }

    #[test]
    fn parses_every_topic_shape() {
        let cases = [
            "AvailableChains",
            "SelectedChain",
            "Chains/A/Setup",
            "Chains/A/Setup/SubSystems",
            "AvailableSubSystems/S1/Status",
            "AvailableSubSystems/S1/Definition",
            "Chains/A/SubSystems/S1/Outgoing",
            "Chains/A/SubSystems/S1/Incoming",
            "Chains/A/SubSystems/S1/Rates",
            "Chains/A/SubSystems/S1/Controls/Gain",
            "Chains/A/SubSystems/S1/Data/T1/Interpretation",
            "Chains/A/SubSystems/S1/Data/T1/Records",
        ];
        for raw in cases {
            let topic = Topic::parse(raw).unwrap_or_else(|err| panic!("{raw}: {err}"));
            assert_eq!(topic.to_string(), raw);
        }
    }

    #[test]
    fn extracts_structured_ids() {
        let topic = Topic::parse("Chains/A/SubSystems/S1/Data/T1/Records").unwrap();
        assert_eq!(
            topic,
            Topic::Records {
                path: path(),
                stream: StreamKey::parse("T1").unwrap(),
            }
        );
        assert_eq!(topic.chain().map(ChainId::as_str), Some("A"));
    }

    #[test]
    fn rejects_unknown_shapes_and_bad_ids() {
        assert!(matches!(
            Topic::parse("Chains/A/Unknown"),
            Err(TopicError::UnknownShape(_))
        ));
        assert!(matches!(
            Topic::parse("Chains/A/SubSystems/S1/Data/T1"),
            Err(TopicError::UnknownShape(_))
        ));
        assert!(matches!(
            Topic::parse("Chains//Setup"),
            Err(TopicError::InvalidId { .. })
        ));
        assert!(matches!(
            Topic::parse("Chains/a-b/Setup"),
            Err(TopicError::InvalidId { .. })
        ));
    }

    #[test]
    fn filters_honour_wildcards() {
        let status = TopicFilter::all_statuses();
        assert!(status.matches("AvailableSubSystems/S1/Status"));
        assert!(!status.matches("AvailableSubSystems/S1/Definition"));
        assert!(!status.matches("AvailableSubSystems/S1/Status/extra"));

        let controls = TopicFilter::controls(&path());
        assert!(controls.matches("Chains/A/SubSystems/S1/Controls/Gain"));
        assert!(controls.matches("Chains/A/SubSystems/S1/Controls"));
        assert!(!controls.matches("Chains/A/SubSystems/S2/Controls/Gain"));

        let interpretations = TopicFilter::interpretations(&path());
        assert!(interpretations.matches("Chains/A/SubSystems/S1/Data/T1/Interpretation"));
        assert!(!interpretations.matches("Chains/A/SubSystems/S1/Data/T1/Records"));
    }
}
