//! Checksummed, portable snapshots of ledger state.

use crate::types::BlockNumber;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serialized state of every store at one block.
///
/// The event history is not included; indexers keep their own copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Format version of `data`
    pub version: u32,

    /// Block the snapshot was taken at
    pub block_number: BlockNumber,

    /// Serialized store state (JSON)
    #[serde(with = "base64_serde")]
    pub data: Vec<u8>,

    /// BLAKE3 checksum over the version, block number and data
    #[serde(with = "hex_serde")]
    pub checksum: [u8; 32],

    /// When this snapshot was created
    pub taken_at: DateTime<Utc>,
}

impl LedgerSnapshot {
    pub(crate) fn seal(block_number: BlockNumber, data: Vec<u8>) -> Self {
        let checksum = digest(SNAPSHOT_VERSION, block_number, &data);
        Self {
            version: SNAPSHOT_VERSION,
            block_number,
            data,
            checksum,
            taken_at: Utc::now(),
        }
    }

    /// Verify the checksum over the version, block number and data
    pub fn verify(&self) -> bool {
        digest(self.version, self.block_number, &self.data) == self.checksum
    }
}

fn digest(version: u32, block_number: BlockNumber, data: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&version.to_le_bytes());
    hasher.update(&block_number.to_le_bytes());
    hasher.update(data);
    *hasher.finalize().as_bytes()
}

// Base64 serialization for binary data
mod base64_serde {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

// Hex serialization for checksums
mod hex_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("invalid checksum length"))
    }
}
