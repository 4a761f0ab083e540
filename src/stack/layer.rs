use std::sync::Arc;

use image::RgbaImage;

/// Stable identity of a layer, unaffected by reordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerId(pub u64);

/// One drawing layer: its rendered image and visibility flag.
#[derive(Clone, Debug)]
pub struct Layer {
    id: LayerId,
    image: Arc<RgbaImage>,
    visible: bool,
}

impl Layer {
    pub(crate) fn new(id: LayerId, image: Arc<RgbaImage>) -> Self {
        Self {
            id,
            image,
            visible: true,
        }
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn image(&self) -> &Arc<RgbaImage> {
        &self.image
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    // Content changes go through `LayerStack` so that dependent composites get invalidated.
    pub(crate) fn set_image(&mut self, image: Arc<RgbaImage>) {
        self.image = image;
    }

    pub(crate) fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }
}
