//! Remote agent status read from the memory snapshot.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_ENERGY: i64 = 100;
pub const DEFAULT_EMOTION: &str = "curiosity";
pub const DEFAULT_SELF_UNDERSTANDING: i64 = 99;
pub const DEFAULT_WORLD_CONNECTION: i64 = 37;

/// Complete status of the remote agent.
///
/// Never partially filled: every field either came from the snapshot or
/// carries its fixed default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStatus {
    pub energy: i64,
    pub emotion: String,
    pub self_understanding: i64,
    pub world_connection: i64,
}

impl Default for RemoteStatus {
    fn default() -> Self {
        Self {
            energy: DEFAULT_ENERGY,
            emotion: DEFAULT_EMOTION.to_string(),
            self_understanding: DEFAULT_SELF_UNDERSTANDING,
            world_connection: DEFAULT_WORLD_CONNECTION,
        }
    }
}

/// Known snapshot fields; anything else in the file is ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotFields {
    #[serde(default)]
    energy: Option<i64>,
    #[serde(default)]
    emotion: Option<String>,
    #[serde(default)]
    self_understanding: Option<i64>,
    #[serde(default)]
    world_connection: Option<i64>,
}

impl RemoteStatus {
    /// Parse a memory-snapshot file, defaulting missing or null fields.
    ///
    /// # Errors
    /// Returns error if the payload is not a JSON object or a known field
    /// has the wrong type.
    pub fn from_snapshot(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_slice(bytes)?;
        if !value.is_object() {
            return Err(serde::de::Error::custom("memory snapshot is not a JSON object"));
        }

        let fields: SnapshotFields = serde_json::from_value(value)?;
        Ok(Self {
            energy: fields.energy.unwrap_or(DEFAULT_ENERGY),
            emotion: fields.emotion.unwrap_or_else(|| DEFAULT_EMOTION.to_string()),
            self_understanding: fields.self_understanding.unwrap_or(DEFAULT_SELF_UNDERSTANDING),
            world_connection: fields.world_connection.unwrap_or(DEFAULT_WORLD_CONNECTION),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_snapshot_is_filled() {
        let status = RemoteStatus::from_snapshot(br#"{"energy": 55}"#).unwrap();
        assert_eq!(
            status,
            RemoteStatus {
                energy: 55,
                emotion: "curiosity".to_string(),
                self_understanding: 99,
                world_connection: 37,
            }
        );
    }

    #[test]
    fn test_extra_fields_and_nulls() {
        let status = RemoteStatus::from_snapshot(
            br#"{"emotion": "serene", "worldConnection": null, "selfUnderstanding": 0, "dreams": [1, 2]}"#,
        )
        .unwrap();
        assert_eq!(status.energy, 100);
        assert_eq!(status.emotion, "serene");
        assert_eq!(status.self_understanding, 0);
        assert_eq!(status.world_connection, 37);
    }

    #[test]
    fn test_malformed_snapshots_are_rejected() {
        assert!(RemoteStatus::from_snapshot(b"{not json").is_err());
        assert!(RemoteStatus::from_snapshot(b"[55, \"joy\"]").is_err());
        assert!(RemoteStatus::from_snapshot(br#"{"energy": "plenty"}"#).is_err());
        assert!(RemoteStatus::from_snapshot(b"").is_err());
        assert!(RemoteStatus::from_snapshot(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_value(RemoteStatus::default()).unwrap();
        assert_eq!(json["selfUnderstanding"], 99);
        assert_eq!(json["worldConnection"], 37);
    }
}
