//! Layer stack compositing with reuse of cached partial composites.
//!
//! Rendering a stack means alpha-compositing its visible layers bottom to top. Instead of
//! re-blending every layer on every redraw, the engine:
//!
//! - keeps previously built composites in a [`CompositeCache`] keyed by layer-index runs
//! - picks the cached runs that save the most blends for the current target
//!   ([`select_cover`], weighted interval scheduling)
//! - plans the remaining pairwise blends ([`plan_instructions`])
//! - executes them in order with the straight-alpha [`over`] operator, caching every
//!   intermediate result ([`render_composite`])
//!
//! [`LayerStack`] owns layers and cache together and keeps the cache consistent across
//! content edits, reordering, insertion and deletion.
#![forbid(unsafe_code)]

pub mod cache;
pub mod compile;
pub mod config;
pub mod foundation;
pub mod render;
pub mod stack;

pub use crate::cache::cover::select_cover;
pub use crate::cache::fingerprint::{ContentFingerprint, fingerprint_image};
pub use crate::cache::store::{CacheEntry, CacheStats, CompositeCache};
pub use crate::compile::plan::{Instruction, OverlayPlan, gap_fill, plan_instructions};
pub use crate::config::EngineOpts;
pub use crate::foundation::core::{Canvas, CompositeKey, LayerIndex};
pub use crate::foundation::error::{LayerError, LayerResult};
pub use crate::render::composite::{Rgba8, over, over_images, over_in_place};
pub use crate::render::pipeline::{
    LayerSource, RenderStats, render_composite, render_composite_with_stats,
};
pub use crate::stack::layer::{Layer, LayerId};
pub use crate::stack::list::LayerStack;
