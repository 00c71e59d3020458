//! Core type definitions for the voice repackaging pipeline

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::{Error, KeyFormat, Result};

/// Sibling file holding the voice configuration
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Sibling file holding the optional model card
pub const MODEL_CARD_FILE_NAME: &str = "MODEL_CARD";

/// Checkpoint index: voice key to checkpoint record, iterated in key order
pub type CheckpointIndex = BTreeMap<String, CheckpointRecord>;

/// Location of one voice's files inside the source repository
///
/// Paths are POSIX-style and relative to the repository root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// Checkpoint file
    pub checkpoint: String,

    /// Sibling `config.json`
    pub config: String,

    /// Sibling `MODEL_CARD`, present only if the repository has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_card: Option<String>,
}

/// Canonical voice key of the form `language-name-quality`
///
/// The name may itself contain dashes; the language is the first
/// segment and the quality the last.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceKey {
    pub language: String,
    pub name: String,
    pub quality: String,
}

impl VoiceKey {
    /// Parse a voice key such as `en_US-amy-medium`
    pub fn parse(key: &str) -> Result<Self> {
        let segments: Vec<&str> = key.split('-').collect();
        if segments.len() < 3 {
            return Err(Error::InvalidVoiceKey {
                key: key.to_string(),
                reason: "expected language-name-quality".to_string(),
            });
        }
        if segments.iter().any(|s| s.is_empty()) {
            return Err(Error::InvalidVoiceKey {
                key: key.to_string(),
                reason: "empty segment".to_string(),
            });
        }

        let last = segments.len() - 1;
        Ok(Self {
            language: segments[0].to_string(),
            name: segments[1..last].join("-"),
            quality: segments[last].to_string(),
        })
    }

    /// Key with the real-time marker inserted, used to name archives
    pub fn streaming_key(&self, format: KeyFormat) -> String {
        match format {
            KeyFormat::RtSegment => {
                format!("{}-{}-rt-{}", self.language, self.name, self.quality)
            }
            KeyFormat::RtSuffix => {
                format!("{}-{}+RT-{}", self.language, self.name, self.quality)
            }
        }
    }
}

impl fmt::Display for VoiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.language, self.name, self.quality)
    }
}

impl FromStr for VoiceKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Local working set of a single voice export
///
/// Owned by exactly one packaging invocation and discarded once the
/// archive is written.
#[derive(Debug, Clone)]
pub struct VoiceExport {
    /// Voice key as found in the index
    pub voice_key: String,

    /// Key with the real-time marker
    pub streaming_key: String,

    /// Downloaded checkpoint
    pub local_checkpoint: PathBuf,

    /// Downloaded sidecar config
    pub local_config: Option<PathBuf>,

    /// Downloaded model card
    pub local_model_card: Option<PathBuf>,

    /// Directory the exporter writes into
    pub output_dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_voice_key() {
        let key = VoiceKey::parse("en_US-amy-medium").unwrap();
        assert_eq!(key.language, "en_US");
        assert_eq!(key.name, "amy");
        assert_eq!(key.quality, "medium");
        assert_eq!(key.to_string(), "en_US-amy-medium");
    }

    #[test]
    fn test_parse_voice_key_with_dashed_name() {
        let key: VoiceKey = "de_DE-thorsten-emotional-medium".parse().unwrap();
        assert_eq!(key.name, "thorsten-emotional");
        assert_eq!(key.to_string(), "de_DE-thorsten-emotional-medium");
    }

    #[test]
    fn test_parse_voice_key_rejects_short_and_empty() {
        assert!(matches!(
            VoiceKey::parse("en-amy"),
            Err(Error::InvalidVoiceKey { .. })
        ));
        assert!(matches!(
            VoiceKey::parse("en--medium"),
            Err(Error::InvalidVoiceKey { .. })
        ));
    }

    #[test]
    fn test_streaming_key_formats() {
        let key = VoiceKey::parse("en-amy-medium").unwrap();
        assert_eq!(key.streaming_key(KeyFormat::RtSuffix), "en-amy+RT-medium");
        assert_eq!(key.streaming_key(KeyFormat::RtSegment), "en-amy-rt-medium");
    }

    #[test]
    fn test_record_omits_missing_model_card() {
        let record = CheckpointRecord {
            checkpoint: "en/en_US/amy/medium/voice.ckpt".to_string(),
            config: "en/en_US/amy/medium/config.json".to_string(),
            model_card: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("model_card"));

        let parsed: CheckpointRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }
}
