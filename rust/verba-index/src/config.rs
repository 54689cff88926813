//! Configuration of the indexing pipeline.

use std::sync::Arc;

use verba_analysis::{Analyzer, UnicodeWordAnalyzer};
use verba_common::{Result, error::Error};

pub const DEFAULT_RAM_BUFFER_SIZE_MB: f64 = 16.0;
pub const DEFAULT_MAX_FIELD_LENGTH: u32 = 10_000;
pub const DEFAULT_TERM_INDEX_INTERVAL: u32 = 128;
pub const DEFAULT_SKIP_INTERVAL: u32 = 16;
pub const DEFAULT_MAX_SKIP_LEVELS: u32 = 10;
pub const DEFAULT_MAX_THREAD_STATES: usize = 5;

/// Computes the per-field normalization factor recorded in the norms file.
pub trait Similarity: Send + Sync {
    /// Normalization factor for a field value made of `num_terms` tokens.
    fn length_norm(&self, field: &str, num_terms: u32) -> f32;
}

/// `1 / sqrt(num_terms)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSimilarity;

impl Similarity for DefaultSimilarity {
    fn length_norm(&self, _field: &str, num_terms: u32) -> f32 {
        (1.0 / (num_terms as f64).sqrt()) as f32
    }
}

/// Parameters of an [`IndexWriter`](crate::IndexWriter) and its documents writer.
#[derive(Clone)]
pub struct IndexWriterConfig {
    /// Size of the in-memory buffer that triggers a flush; `None` disables
    /// RAM-triggered flushing.
    pub ram_buffer_size_mb: Option<f64>,
    /// Number of buffered documents that triggers a flush.
    pub max_buffered_docs: Option<u32>,
    /// Number of buffered delete terms that triggers a flush.
    pub max_buffered_delete_terms: Option<u32>,
    /// Maximum number of tokens indexed per field and document; the rest is dropped.
    pub max_field_length: u32,
    /// Every `term_index_interval`-th term is copied to the terms index.
    pub term_index_interval: u32,
    pub skip_interval: u32,
    pub max_skip_levels: u32,
    /// Maximum number of per-thread indexing states.
    pub max_thread_states: usize,
    pub analyzer: Arc<dyn Analyzer>,
    pub similarity: Arc<dyn Similarity>,
}

impl Default for IndexWriterConfig {
    fn default() -> Self {
        IndexWriterConfig {
            ram_buffer_size_mb: Some(DEFAULT_RAM_BUFFER_SIZE_MB),
            max_buffered_docs: None,
            max_buffered_delete_terms: None,
            max_field_length: DEFAULT_MAX_FIELD_LENGTH,
            term_index_interval: DEFAULT_TERM_INDEX_INTERVAL,
            skip_interval: DEFAULT_SKIP_INTERVAL,
            max_skip_levels: DEFAULT_MAX_SKIP_LEVELS,
            max_thread_states: DEFAULT_MAX_THREAD_STATES,
            analyzer: Arc::new(UnicodeWordAnalyzer::new()),
            similarity: Arc::new(DefaultSimilarity),
        }
    }
}

impl IndexWriterConfig {
    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn with_ram_buffer_size_mb(mut self, mb: Option<f64>) -> Self {
        self.ram_buffer_size_mb = mb;
        self
    }

    pub fn with_max_buffered_docs(mut self, docs: Option<u32>) -> Self {
        self.max_buffered_docs = docs;
        self
    }

    pub fn with_max_buffered_delete_terms(mut self, terms: Option<u32>) -> Self {
        self.max_buffered_delete_terms = terms;
        self
    }

    pub fn ram_buffer_size_bytes(&self) -> Option<u64> {
        self.ram_buffer_size_mb
            .map(|mb| (mb * 1024.0 * 1024.0) as u64)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ram_buffer_size_mb.is_none() && self.max_buffered_docs.is_none() {
            return Err(Error::invalid_arg(
                "ram_buffer_size_mb",
                "at least one of ram_buffer_size_mb and max_buffered_docs must be enabled",
            ));
        }
        if let Some(mb) = self.ram_buffer_size_mb {
            if !(mb > 0.0) {
                return Err(Error::invalid_arg(
                    "ram_buffer_size_mb",
                    format!("must be positive, got {mb}"),
                ));
            }
        }
        if let Some(docs) = self.max_buffered_docs {
            if docs < 2 {
                return Err(Error::invalid_arg(
                    "max_buffered_docs",
                    format!("must be at least 2, got {docs}"),
                ));
            }
        }
        if let Some(terms) = self.max_buffered_delete_terms {
            verba_common::verify_arg!(max_buffered_delete_terms, terms >= 1);
        }
        verba_common::verify_arg!(max_field_length, self.max_field_length > 0);
        verba_common::verify_arg!(term_index_interval, self.term_index_interval > 0);
        verba_common::verify_arg!(skip_interval, self.skip_interval > 1);
        verba_common::verify_arg!(max_thread_states, self.max_thread_states > 0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use verba_common::error::ErrorKind;

    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = IndexWriterConfig::default();
        config.validate().unwrap();
        assert_eq!(config.ram_buffer_size_bytes(), Some(16 * 1024 * 1024));
        assert_eq!(config.max_field_length, 10_000);
    }

    #[test]
    fn test_validate_rejects() {
        let config = IndexWriterConfig::default()
            .with_ram_buffer_size_mb(None)
            .with_max_buffered_docs(None);
        assert!(matches!(
            config.validate().unwrap_err().kind(),
            ErrorKind::InvalidArgument { .. }
        ));

        let config = IndexWriterConfig::default().with_max_buffered_docs(Some(1));
        assert!(config.validate().is_err());

        let config = IndexWriterConfig::default().with_ram_buffer_size_mb(Some(0.0));
        assert!(config.validate().is_err());

        let config = IndexWriterConfig {
            skip_interval: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_similarity() {
        let sim = DefaultSimilarity;
        assert_eq!(sim.length_norm("body", 1), 1.0);
        assert_eq!(sim.length_norm("body", 4), 0.5);
    }
}
