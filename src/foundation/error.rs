use crate::foundation::core::{CompositeKey, LayerIndex};

/// Result alias used throughout the crate.
pub type LayerResult<T> = Result<T, LayerError>;

/// Error type for cache, planning and compositing failures.
#[derive(thiserror::Error, Debug)]
pub enum LayerError {
    /// Malformed input: unsorted keys, empty targets, mismatched buffers.
    #[error("validation error: {0}")]
    Validation(String),

    /// An instruction operand could not be resolved from the cache or the layer source.
    ///
    /// This is an internal-consistency fault. The compositor never substitutes a blank image.
    #[error("missing operand: no image for key {key}")]
    MissingOperand {
        /// Key that failed to resolve.
        key: CompositeKey,
    },

    /// A cached composite was built from layer content that has since changed.
    #[error("content drift: cached composite {key} is stale for layer {layer}")]
    ContentDrift {
        /// Cached key whose lineage no longer matches.
        key: CompositeKey,
        /// First layer whose fingerprint differs.
        layer: LayerIndex,
    },

    /// Invalid or unreadable configuration.
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LayerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
