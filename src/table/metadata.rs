//! Structured sub-table detection
//!
//! Some sub-tables describe a single object rather than a bag of entries,
//! e.g. a chooser publishes `.type`, `.name`, `options`, `active` and
//! `default`. Such tables mark themselves with metadata keys. The store
//! never knows about concrete object kinds; it asks a recognizer.

/// Decides whether a sub-table is a structured object from its keys
pub trait StructureRecognizer: Send + Sync {
    fn is_structured(&self, keys: &[String]) -> bool;
}

impl<F> StructureRecognizer for F
where
    F: Fn(&[String]) -> bool + Send + Sync,
{
    fn is_structured(&self, keys: &[String]) -> bool {
        self(keys)
    }
}

/// Default recognizer: any key starting with the metadata prefix
#[derive(Debug, Clone)]
pub struct MetadataPrefix {
    prefix: String,
}

impl MetadataPrefix {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn is_metadata_key(&self, key: &str) -> bool {
        !self.prefix.is_empty() && key.starts_with(&self.prefix)
    }
}

impl Default for MetadataPrefix {
    fn default() -> Self {
        Self::new(".")
    }
}

impl StructureRecognizer for MetadataPrefix {
    fn is_structured(&self, keys: &[String]) -> bool {
        keys.iter().any(|k| self.is_metadata_key(k))
    }
}
