use std::collections::BTreeMap;
use std::sync::Arc;

use image::RgbaImage;

use crate::cache::fingerprint::{ContentFingerprint, fingerprint_image};
use crate::cache::store::CompositeCache;
use crate::config::EngineOpts;
use crate::foundation::core::{CompositeKey, LayerIndex};
use crate::foundation::error::{LayerError, LayerResult};
use crate::render::composite::over_images;

/// Read-only access to per-layer images, owned outside the engine.
pub trait LayerSource {
    /// Current image of the layer at `index`, if it exists.
    fn layer_image(&self, index: LayerIndex) -> Option<Arc<RgbaImage>>;

    /// Content fingerprint of the layer at `index`.
    fn fingerprint(&self, index: LayerIndex) -> Option<ContentFingerprint> {
        self.layer_image(index).map(|img| fingerprint_image(&img))
    }
}

impl LayerSource for [Arc<RgbaImage>] {
    fn layer_image(&self, index: LayerIndex) -> Option<Arc<RgbaImage>> {
        self.get(index.0).cloned()
    }
}

impl LayerSource for Vec<Arc<RgbaImage>> {
    fn layer_image(&self, index: LayerIndex) -> Option<Arc<RgbaImage>> {
        self.as_slice().layer_image(index)
    }
}

/// Work done by one render.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Number of layers in the target.
    pub target_len: usize,
    /// Cached composites reused as whole blocks.
    pub reused: usize,
    /// Pairwise blends executed.
    pub blends: usize,
}

/// Composite `target` (ascending visible layer indices) using and extending `cache`.
///
/// The result is the plan's merge tree evaluated with [`over`](crate::over). `over` is only
/// associative when every alpha is 0 or 255; for partial alpha the pixels depend on which
/// blocks were reused, and can differ from a bottom-to-top fold in the low bits.
pub fn render_composite<S: LayerSource + ?Sized>(
    cache: &mut CompositeCache,
    layers: &S,
    target: &[LayerIndex],
    opts: &EngineOpts,
) -> LayerResult<Arc<RgbaImage>> {
    render_composite_with_stats(cache, layers, target, opts).map(|(image, _)| image)
}

/// Like [`render_composite`], also reporting how much work was reused.
///
/// Instructions run strictly in plan order. Each blend result is stored under the
/// concatenated key before the next instruction runs, so later instructions can consume it.
#[tracing::instrument(skip(cache, layers, opts), fields(target_len = target.len()))]
pub fn render_composite_with_stats<S: LayerSource + ?Sized>(
    cache: &mut CompositeCache,
    layers: &S,
    target: &[LayerIndex],
    opts: &EngineOpts,
) -> LayerResult<(Arc<RgbaImage>, RenderStats)> {
    let plan = cache.overlay_plan(target)?;

    let current = if opts.verify_fingerprints {
        let fps = current_fingerprints(layers, target)?;
        verify_cover(cache, &plan.cover, &fps)?;
        Some(fps)
    } else {
        None
    };

    let mut stats = RenderStats {
        target_len: target.len(),
        reused: plan.cover.len(),
        blends: 0,
    };

    if plan.is_trivial() {
        let key = CompositeKey::new(target.to_vec())?;
        return Ok((resolve(cache, layers, &key)?.image, stats));
    }

    let mut last = None;
    for ins in &plan.instructions {
        let bottom = resolve(cache, layers, &ins.bottom)?;
        let top = resolve(cache, layers, &ins.top)?;
        let blended = Arc::new(over_images(&bottom.image, &top.image, opts.parallel_blend)?);

        let key = ins.output_key()?;
        // A result built on an unverified operand records no lineage.
        let lineage = current
            .as_ref()
            .filter(|_| bottom.verified && top.verified)
            .and_then(|fps| {
                key.indices()
                    .iter()
                    .map(|i| fps.get(i).copied())
                    .collect::<Option<Vec<_>>>()
            });
        tracing::trace!(instruction = %ins, "blend");
        cache.store_entry(key, Arc::clone(&blended), lineage);
        stats.blends += 1;
        last = Some(blended);
    }

    tracing::debug!(reused = stats.reused, blends = stats.blends, "composite ready");
    let image = last.ok_or_else(|| LayerError::validation("overlay plan produced no result"))?;
    Ok((image, stats))
}

/// Operand image plus whether its content is backed by recorded lineage.
struct Resolved {
    image: Arc<RgbaImage>,
    verified: bool,
}

/// Cache first; single-layer keys absent from the cache come from the layer source.
fn resolve<S: LayerSource + ?Sized>(
    cache: &mut CompositeCache,
    layers: &S,
    key: &CompositeKey,
) -> LayerResult<Resolved> {
    if key.is_singleton() && !cache.contains_key(key) {
        return layers
            .layer_image(key.first())
            .map(|image| Resolved {
                image,
                verified: true,
            })
            .ok_or_else(|| LayerError::MissingOperand { key: key.clone() });
    }
    let verified = cache.peek(key).is_some_and(|e| e.lineage().is_some());
    cache
        .lookup(key)
        .map(|image| Resolved { image, verified })
        .ok_or_else(|| LayerError::MissingOperand { key: key.clone() })
}

fn current_fingerprints<S: LayerSource + ?Sized>(
    layers: &S,
    target: &[LayerIndex],
) -> LayerResult<BTreeMap<LayerIndex, ContentFingerprint>> {
    target
        .iter()
        .map(|&idx| {
            layers
                .fingerprint(idx)
                .map(|fp| (idx, fp))
                .ok_or_else(|| LayerError::MissingOperand {
                    key: CompositeKey::singleton(idx),
                })
        })
        .collect()
}

/// Entries without recorded lineage cannot be checked and are trusted.
fn verify_cover(
    cache: &CompositeCache,
    cover: &[CompositeKey],
    current: &BTreeMap<LayerIndex, ContentFingerprint>,
) -> LayerResult<()> {
    for key in cover {
        let Some(lineage) = cache.peek(key).and_then(|e| e.lineage()) else {
            continue;
        };
        for (idx, recorded) in key.indices().iter().zip(lineage) {
            if current.get(idx) != Some(recorded) {
                tracing::warn!(%key, layer = %idx, "cached composite is stale");
                return Err(LayerError::ContentDrift {
                    key: key.clone(),
                    layer: *idx,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/render/pipeline.rs"]
mod tests;
