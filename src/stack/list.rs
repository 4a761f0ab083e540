use std::cmp::Ordering;
use std::sync::Arc;

use image::{DynamicImage, RgbaImage};

use crate::cache::store::CompositeCache;
use crate::config::EngineOpts;
use crate::foundation::core::{Canvas, LayerIndex};
use crate::foundation::error::{LayerError, LayerResult};
use crate::render::composite::over_images;
use crate::render::pipeline::{LayerSource, RenderStats, render_composite_with_stats};
use crate::stack::layer::{Layer, LayerId};

/// Ordered layer stack (index 0 at the bottom) together with the composite cache serving it.
///
/// Every edit that changes what a cached key means is reflected in the cache: structural
/// edits rewrite or drop keys, content edits drop every composite containing the layer.
/// Visibility changes need no invalidation because hidden layers simply leave the target.
#[derive(Debug)]
pub struct LayerStack {
    canvas: Canvas,
    layers: Vec<Layer>,
    active: Option<usize>,
    next_id: u64,
    cache: CompositeCache,
    opts: EngineOpts,
}

impl LayerStack {
    pub fn new(canvas: Canvas, opts: EngineOpts) -> Self {
        Self {
            canvas,
            layers: Vec::new(),
            active: None,
            next_id: 0,
            cache: CompositeCache::new().with_usage_recording(opts.record_usage),
            opts,
        }
    }

    /// New document from a decoded image. Images without alpha become fully opaque.
    pub fn from_image(image: DynamicImage, opts: EngineOpts) -> Self {
        let rgba = image.to_rgba8();
        let mut stack = Self::new(Canvas::of(&rgba), opts);
        stack.push_layer(Arc::new(rgba), true);
        stack
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    pub fn opts(&self) -> &EngineOpts {
        &self.opts
    }

    pub fn cache(&self) -> &CompositeCache {
        &self.cache
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, index: LayerIndex) -> Option<&Layer> {
        self.layers.get(index.0)
    }

    /// Current position of the layer with `id`.
    pub fn index_of(&self, id: LayerId) -> Option<LayerIndex> {
        self.layers.iter().position(|l| l.id() == id).map(LayerIndex)
    }

    pub fn active_index(&self) -> Option<LayerIndex> {
        self.active.map(LayerIndex)
    }

    pub fn active_layer(&self) -> Option<&Layer> {
        self.active.and_then(|i| self.layers.get(i))
    }

    pub fn set_active_layer(&mut self, index: LayerIndex) -> LayerResult<()> {
        self.check_index(index)?;
        self.active = Some(index.0);
        Ok(())
    }

    /// Add a layer on top of the stack.
    ///
    /// The new layer becomes active when `set_active` is set or no layer was active yet.
    pub fn add_layer(
        &mut self,
        image: impl Into<Arc<RgbaImage>>,
        set_active: bool,
    ) -> LayerResult<LayerId> {
        let image = image.into();
        self.canvas.check(&image, "layer image")?;
        Ok(self.push_layer(image, set_active))
    }

    /// Add a fully transparent layer on top of the stack.
    pub fn add_empty_layer(&mut self) -> LayerId {
        let blank = Arc::new(self.canvas.blank());
        self.push_layer(blank, false)
    }

    fn push_layer(&mut self, image: Arc<RgbaImage>, set_active: bool) -> LayerId {
        let id = self.alloc_id();
        self.layers.push(Layer::new(id, image));
        if set_active || self.active.is_none() {
            self.active = Some(self.layers.len() - 1);
        }
        tracing::debug!(?id, len = self.layers.len(), "added layer");
        id
    }

    /// Insert a transparent layer directly above or below `relative_to` and make it active.
    pub fn insert_empty_layer(
        &mut self,
        relative_to: LayerIndex,
        above: bool,
    ) -> LayerResult<LayerId> {
        self.check_index(relative_to)?;
        let at = relative_to.0 + usize::from(above);

        let id = self.alloc_id();
        self.layers
            .insert(at, Layer::new(id, Arc::new(self.canvas.blank())));
        self.cache.remap(|i| {
            if i.0 >= at {
                Some(LayerIndex(i.0 + 1))
            } else {
                Some(i)
            }
        });
        self.active = Some(at);
        tracing::debug!(?id, at, "inserted empty layer");
        Ok(id)
    }

    /// Remove the layer at `index`.
    ///
    /// Deleting the active layer activates the layer below it, or the new top layer when
    /// the bottom one was deleted, or nothing when the stack becomes empty.
    pub fn delete_layer(&mut self, index: LayerIndex) -> LayerResult<Layer> {
        self.check_index(index)?;
        let del = index.0;
        let len_before = self.layers.len();

        self.active = match self.active {
            Some(a) if a == del && a > 0 => Some(a - 1),
            Some(a) if a == del && len_before > 1 => Some(len_before - 2),
            Some(a) if a == del => None,
            Some(a) if del < a => Some(a - 1),
            other => other,
        };

        let removed = self.layers.remove(del);
        self.cache.remap(|i| match i.0.cmp(&del) {
            Ordering::Less => Some(i),
            Ordering::Equal => None,
            Ordering::Greater => Some(LayerIndex(i.0 - 1)),
        });
        tracing::debug!(id = ?removed.id(), at = del, "deleted layer");
        Ok(removed)
    }

    /// Move the layer at `index` to the top of the stack.
    pub fn move_layer_to_top(&mut self, index: LayerIndex) -> LayerResult<()> {
        self.check_index(index)?;
        let from = index.0;
        let top = self.layers.len() - 1;
        if from == top {
            return Ok(());
        }

        let layer = self.layers.remove(from);
        self.layers.push(layer);
        self.cache.remap(|i| match i.0.cmp(&from) {
            Ordering::Less => Some(i),
            Ordering::Equal => None,
            Ordering::Greater => Some(LayerIndex(i.0 - 1)),
        });
        self.active = self.active.map(|a| match a.cmp(&from) {
            Ordering::Equal => top,
            Ordering::Greater => a - 1,
            Ordering::Less => a,
        });
        tracing::debug!(from, to = top, "moved layer to top");
        Ok(())
    }

    pub fn delete_all_layers(&mut self) {
        self.layers.clear();
        self.active = None;
        self.cache.clear();
    }

    pub fn set_layer_visibility(&mut self, index: LayerIndex, visible: bool) -> LayerResult<()> {
        self.check_index(index)?;
        self.layers[index.0].set_visible(visible);
        Ok(())
    }

    /// Flip visibility of the layer at `index`, returning the new state.
    pub fn toggle_visibility(&mut self, index: LayerIndex) -> LayerResult<bool> {
        self.check_index(index)?;
        let layer = &mut self.layers[index.0];
        let visible = !layer.is_visible();
        layer.set_visible(visible);
        Ok(visible)
    }

    /// Replace the rendered content of a layer and drop every composite built from it.
    pub fn replace_layer_image(
        &mut self,
        index: LayerIndex,
        image: impl Into<Arc<RgbaImage>>,
    ) -> LayerResult<()> {
        self.check_index(index)?;
        let image = image.into();
        self.canvas.check(&image, "layer image")?;
        self.layers[index.0].set_image(image);
        self.cache.invalidate_layer(index);
        Ok(())
    }

    /// Ascending indices of the visible layers.
    pub fn visible_indices(&self) -> Vec<LayerIndex> {
        self.layers
            .iter()
            .enumerate()
            .filter(|(_, l)| l.is_visible())
            .map(|(i, _)| LayerIndex(i))
            .collect()
    }

    /// Flatten the visible layers. With nothing visible the result is a transparent canvas.
    pub fn render(&mut self) -> LayerResult<Arc<RgbaImage>> {
        self.render_with_stats().map(|(image, _)| image)
    }

    pub fn render_with_stats(&mut self) -> LayerResult<(Arc<RgbaImage>, RenderStats)> {
        let target = self.visible_indices();
        if target.is_empty() {
            return Ok((Arc::new(self.canvas.blank()), RenderStats::default()));
        }
        render_composite_with_stats(&mut self.cache, self.layers.as_slice(), &target, &self.opts)
    }

    /// Flatten the visible layers and draw `preview` over the result.
    ///
    /// The preview is display-only and never enters the cache.
    pub fn render_with_preview(&mut self, preview: &RgbaImage) -> LayerResult<RgbaImage> {
        self.canvas.check(preview, "preview image")?;
        let base = self.render()?;
        over_images(&base, preview, self.opts.parallel_blend)
    }

    fn check_index(&self, index: LayerIndex) -> LayerResult<()> {
        if index.0 >= self.layers.len() {
            return Err(LayerError::validation(format!(
                "layer index {index} out of range for {} layers",
                self.layers.len()
            )));
        }
        Ok(())
    }

    fn alloc_id(&mut self) -> LayerId {
        let id = LayerId(self.next_id);
        self.next_id += 1;
        id
    }
}

impl LayerSource for [Layer] {
    fn layer_image(&self, index: LayerIndex) -> Option<Arc<RgbaImage>> {
        self.get(index.0).map(|l| Arc::clone(l.image()))
    }
}

impl LayerSource for LayerStack {
    fn layer_image(&self, index: LayerIndex) -> Option<Arc<RgbaImage>> {
        self.layers.as_slice().layer_image(index)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/stack/list.rs"]
mod tests;
