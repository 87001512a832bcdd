//! Durable storage for cart lines.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

use super::PersistenceError;
use crate::domain::aggregates::CartLine;
use crate::domain::value_objects::{CartKey, Money};

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

/// Entry name used when none is given.
pub const DEFAULT_ENTRY: &str = "cart";

/// Where the cart store reads and writes its lines.
pub trait CartPersistence: Send + Sync {
    fn load(&self) -> Result<Vec<CartLine>, PersistenceError>;
    fn save(&self, lines: &[CartLine]) -> Result<(), PersistenceError>;
}

#[derive(Serialize)]
struct EnvelopeOut<'a> {
    version: u32,
    lines: &'a [CartLine],
}

#[derive(Deserialize)]
struct EnvelopeIn {
    version: u32,
    lines: Vec<CartLine>,
}

/// Record shape written before the envelope existed: the key is one string.
#[derive(Deserialize)]
struct LegacyLine {
    id: String,
    name: String,
    price: i64,
    quantity: i64,
    #[serde(default)]
    image: Option<String>,
}

impl LegacyLine {
    fn into_line(self) -> Option<CartLine> {
        let key = match CartKey::parse_legacy(&self.id) {
            Ok(key) => key,
            Err(e) => {
                warn!(id = %self.id, error = %e, "dropping legacy cart line with unusable key");
                return None;
            }
        };
        let quantity = u32::try_from(self.quantity).ok().filter(|q| *q >= 1)?;
        Some(CartLine { key, name: self.name, price: Money::from_minor(self.price), quantity, image: self.image })
    }
}

/// Serializes lines in the current versioned format.
pub fn encode(lines: &[CartLine]) -> Result<String, PersistenceError> {
    Ok(serde_json::to_string(&EnvelopeOut { version: FORMAT_VERSION, lines })?)
}

/// Reads either the versioned envelope or the legacy bare array.
pub fn decode(raw: &str) -> Result<Vec<CartLine>, PersistenceError> {
    if raw.trim().is_empty() { return Ok(Vec::new()); }
    match serde_json::from_str::<Value>(raw)? {
        Value::Array(items) => {
            let legacy: Vec<LegacyLine> = serde_json::from_value(Value::Array(items))?;
            Ok(legacy.into_iter().filter_map(LegacyLine::into_line).collect())
        }
        Value::Null => Ok(Vec::new()),
        other => {
            let envelope: EnvelopeIn = serde_json::from_value(other)?;
            if envelope.version != FORMAT_VERSION {
                return Err(PersistenceError::UnsupportedVersion(envelope.version));
            }
            Ok(envelope.lines)
        }
    }
}

/// Keeps the encoded cart in memory. Used by tests and short-lived sessions.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    raw: Mutex<Option<String>>,
}

impl MemoryPersistence {
    pub fn new() -> Self { Self::default() }

    /// Starts from an already-encoded payload, e.g. a legacy array.
    pub fn with_raw(raw: impl Into<String>) -> Self { Self { raw: Mutex::new(Some(raw.into())) } }

    pub fn raw(&self) -> Option<String> {
        self.raw.lock().map(|g| g.clone()).unwrap_or_else(|p| p.into_inner().clone())
    }
}

impl CartPersistence for MemoryPersistence {
    fn load(&self) -> Result<Vec<CartLine>, PersistenceError> {
        match self.raw() {
            Some(raw) => decode(&raw),
            None => Ok(Vec::new()),
        }
    }

    fn save(&self, lines: &[CartLine]) -> Result<(), PersistenceError> {
        let encoded = encode(lines)?;
        match self.raw.lock() {
            Ok(mut guard) => *guard = Some(encoded),
            Err(poisoned) => *poisoned.into_inner() = Some(encoded),
        }
        Ok(())
    }
}

/// One JSON file per named entry inside a directory.
#[derive(Clone, Debug)]
pub struct FilePersistence {
    path: PathBuf,
}

impl FilePersistence {
    pub fn new(dir: impl AsRef<Path>) -> Self { Self::named(dir, DEFAULT_ENTRY) }

    pub fn named(dir: impl AsRef<Path>, entry: &str) -> Self {
        Self { path: dir.as_ref().join(format!("{entry}.json")) }
    }

    pub fn path(&self) -> &Path { &self.path }
}

impl CartPersistence for FilePersistence {
    fn load(&self) -> Result<Vec<CartLine>, PersistenceError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => decode(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, lines: &[CartLine]) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, encode(lines)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
