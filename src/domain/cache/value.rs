//! Cached value codecs
//!
//! Values are held as JSON together with a versioned codec tag. The tag is
//! what makes a value restorable after a restart: the registry maps each tag
//! to a decoder check for the concrete type that produced it.

use std::fmt;
use std::str::FromStr;

use dashmap::DashMap;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::domain::CacheError;

/// Contract for types that can live in the cache
///
/// `TYPE_TAG` must stay stable across releases; bump `VERSION` when the
/// serialized shape changes so older snapshots are skipped instead of
/// misread.
pub trait CacheValue: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const TYPE_TAG: &'static str;
    const VERSION: u32 = 1;

    fn codec() -> CodecTag {
        CodecTag::new(Self::TYPE_TAG, Self::VERSION)
    }
}

impl CacheValue for String {
    const TYPE_TAG: &'static str = "string";
}

impl CacheValue for serde_json::Value {
    const TYPE_TAG: &'static str = "json";
}

/// Versioned identifier of a value codec, rendered as `name@v<version>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CodecTag {
    name: String,
    version: u32,
}

impl CodecTag {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }
}

impl fmt::Display for CodecTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@v{}", self.name, self.version)
    }
}

impl FromStr for CodecTag {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, version) = s
            .rsplit_once("@v")
            .ok_or_else(|| CacheError::codec(format!("Malformed value type tag '{}'", s)))?;

        if name.is_empty() {
            return Err(CacheError::codec(format!("Empty codec name in '{}'", s)));
        }

        let version = version
            .parse::<u32>()
            .map_err(|_| CacheError::codec(format!("Invalid codec version in '{}'", s)))?;

        Ok(Self::new(name, version))
    }
}

/// A value as held by the cache
#[derive(Debug, Clone, PartialEq)]
pub struct StoredValue {
    pub json: serde_json::Value,
    pub codec: CodecTag,
}

impl StoredValue {
    /// Serializes a typed value
    pub fn encode<T: CacheValue>(value: &T) -> Result<Self, CacheError> {
        let json = serde_json::to_value(value).map_err(|e| {
            CacheError::serialization(format!("Failed to serialize cache value: {}", e))
        })?;

        Ok(Self {
            json,
            codec: T::codec(),
        })
    }

    /// Deserializes into `T`, refusing values written by another codec
    pub fn decode<T: CacheValue>(&self) -> Result<T, CacheError> {
        let expected = T::codec();

        if self.codec != expected {
            return Err(CacheError::codec(format!(
                "Value was stored as '{}', requested '{}'",
                self.codec, expected
            )));
        }

        T::deserialize(&self.json).map_err(|e| {
            CacheError::serialization(format!("Failed to deserialize cache value: {}", e))
        })
    }

    /// Returns true when this value was produced by `T`'s codec
    pub fn is_codec_of<T: CacheValue>(&self) -> bool {
        self.codec.name == T::TYPE_TAG && self.codec.version == T::VERSION
    }
}

type DecodeCheck = fn(&serde_json::Value) -> Result<(), serde_json::Error>;

fn decode_check<T: CacheValue>(json: &serde_json::Value) -> Result<(), serde_json::Error> {
    T::deserialize(json).map(|_| ())
}

/// Registry resolving codec tags to concrete decoders
#[derive(Debug, Default)]
pub struct CodecRegistry {
    decoders: DashMap<CodecTag, DecodeCheck>,
}

impl CodecRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry knowing the built-in `String` and JSON codecs
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register::<String>();
        registry.register::<serde_json::Value>();
        registry
    }

    /// Registers the codec of `T`
    pub fn register<T: CacheValue>(&self) {
        let codec = T::codec();

        if !self.decoders.contains_key(&codec) {
            self.decoders.insert(codec, decode_check::<T>);
        }
    }

    /// Returns true when the codec is known
    pub fn is_registered(&self, codec: &CodecTag) -> bool {
        self.decoders.contains_key(codec)
    }

    /// Number of known codecs
    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Checks that `json` decodes with the codec registered under `codec`
    pub fn validate(&self, codec: &CodecTag, json: &serde_json::Value) -> Result<(), CacheError> {
        let check = self
            .decoders
            .get(codec)
            .map(|entry| *entry.value())
            .ok_or_else(|| CacheError::codec(format!("Unknown value type '{}'", codec)))?;

        check(json).map_err(|e| {
            CacheError::codec(format!("Value does not decode as '{}': {}", codec, e))
        })
    }
}
