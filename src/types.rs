//! Shared types used across all stores.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Ledger position supplied by the host with every call.
pub type BlockNumber = u64;

/// Failure to parse a hex-encoded identifier or address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseHexError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

macro_rules! hex_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// Byte length of this identifier.
            pub const LEN: usize = $len;

            /// The all-zero value.
            pub const ZERO: Self = Self([0u8; $len]);

            pub fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Value with `n` stored big-endian in the trailing bytes.
            pub fn from_u64(n: u64) -> Self {
                let mut bytes = [0u8; $len];
                bytes[$len - 8..].copy_from_slice(&n.to_be_bytes());
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; $len]
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl std::str::FromStr for $name {
            type Err = ParseHexError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.strip_prefix("0x").unwrap_or(s);
                let bytes = hex::decode(s).map_err(|e| ParseHexError::InvalidHex(e.to_string()))?;
                let actual = bytes.len();
                let bytes: [u8; $len] = bytes.try_into().map_err(|_| ParseHexError::InvalidLength {
                    expected: $len,
                    actual,
                })?;
                Ok(Self(bytes))
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_bytes!(
    /// 32-byte identifier for templates, conditions and agreements.
    ///
    /// Conditions share one flat namespace across every agreement;
    /// agreements and templates each have their own.
    Id,
    32
);

hex_bytes!(
    /// 20-byte identity of an acting party: a caller, a creator,
    /// a store, or a condition-type handler.
    Address,
    20
);

impl Id {
    /// Content-addressed id: BLAKE3 over the given parts, in order.
    pub fn hash_of<I, P>(parts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<[u8]>,
    {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            hasher.update(part.as_ref());
        }
        Self(*hasher.finalize().as_bytes())
    }
}

impl Address {
    /// Deterministic address derived from a label (deployment tooling, fixtures).
    pub fn derive(label: &str) -> Self {
        let digest = blake3::hash(label.as_bytes());
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest.as_bytes()[..20]);
        Self(bytes)
    }
}

/// Opaque reference to the resource an agreement concerns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Did(pub String);

impl Did {
    pub fn new(did: impl Into<String>) -> Self {
        Self(did.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Did {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Did {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Did {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Who is calling, and at which ledger position.
///
/// The host hands one of these to every mutating operation. The stores
/// never keep a clock of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    pub sender: Address,
    pub block_number: BlockNumber,
}

impl CallContext {
    pub fn new(sender: Address, block_number: BlockNumber) -> Self {
        Self {
            sender,
            block_number,
        }
    }

    /// Same block, different caller.
    pub fn as_sender(self, sender: Address) -> Self {
        Self { sender, ..self }
    }
}
