use std::path::Path;

use crate::foundation::error::{LayerError, LayerResult};

/// Engine configuration. Missing JSON fields fall back to [`EngineOpts::default`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineOpts {
    /// Record per-layer content fingerprints with every composite and refuse to reuse a
    /// composite whose layers changed without invalidation.
    pub verify_fingerprints: bool,
    /// Update `last_used_at` when a cached composite is read.
    pub record_usage: bool,
    /// Blend rows on the rayon pool. Output is identical either way.
    pub parallel_blend: bool,
}

impl Default for EngineOpts {
    fn default() -> Self {
        Self {
            verify_fingerprints: false,
            record_usage: true,
            parallel_blend: false,
        }
    }
}

impl EngineOpts {
    pub fn from_json_str(s: &str) -> LayerResult<Self> {
        serde_json::from_str(s).map_err(|e| LayerError::config(format!("parse engine opts: {e}")))
    }

    pub fn from_json_path(path: impl AsRef<Path>) -> LayerResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| LayerError::config(format!("read '{}': {e}", path.display())))?;
        Self::from_json_str(&text)
    }
}
