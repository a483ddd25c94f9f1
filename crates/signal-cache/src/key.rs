use core_types::Instrument;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A blake3 digest of everything a signal depends on, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Incrementally hashes named components into a `Fingerprint`.
///
/// Each component is written as `name=value` followed by a separator byte, so
/// `("ab", "c")` and `("a", "bc")` hash differently.
pub struct FingerprintBuilder {
    hasher: blake3::Hasher,
}

impl Default for FingerprintBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FingerprintBuilder {
    pub fn new() -> Self {
        Self {
            hasher: blake3::Hasher::new(),
        }
    }

    pub fn field(mut self, name: &str, value: impl fmt::Display) -> Self {
        self.hasher.update(name.as_bytes());
        self.hasher.update(b"=");
        self.hasher.update(value.to_string().as_bytes());
        self.hasher.update(&[0x1f]);
        self
    }

    /// Hashes a serializable value through its JSON form.
    pub fn json<T: Serialize>(self, name: &str, value: &T) -> Result<Self, serde_json::Error> {
        let encoded = serde_json::to_string(value)?;
        Ok(self.field(name, encoded))
    }

    pub fn finish(self) -> Fingerprint {
        Fingerprint(self.hasher.finalize().to_hex().to_string())
    }
}

/// Identity of one memoized signal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub node: String,
    pub instrument: Instrument,
    pub fingerprint: Fingerprint,
}

impl CacheKey {
    pub fn new(node: impl Into<String>, instrument: Instrument, fingerprint: Fingerprint) -> Self {
        Self {
            node: node.into(),
            instrument,
            fingerprint,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.node, self.instrument, &self.fingerprint.0[..12.min(self.fingerprint.0.len())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic_and_component_sensitive() {
        let a = FingerprintBuilder::new().field("as_of", "2024-01-02").field("model", "x").finish();
        let b = FingerprintBuilder::new().field("as_of", "2024-01-02").field("model", "x").finish();
        let c = FingerprintBuilder::new().field("as_of", "2024-01-03").field("model", "x").finish();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn component_boundaries_matter() {
        let a = FingerprintBuilder::new().field("ab", "c").finish();
        let b = FingerprintBuilder::new().field("a", "bc").finish();
        assert_ne!(a, b);
    }
}
