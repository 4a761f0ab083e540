use std::fmt;

use image::RgbaImage;

use crate::foundation::error::{LayerError, LayerResult};

/// Position of a layer in the stack, counted from the bottom (0).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct LayerIndex(pub usize);

impl fmt::Display for LayerIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for LayerIndex {
    fn from(v: usize) -> Self {
        Self(v)
    }
}

/// Strictly ascending, non-empty run of layer indices naming one composite.
///
/// Keys order lexicographically, which gives the cache a deterministic iteration order.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "Vec<LayerIndex>")]
pub struct CompositeKey(Vec<LayerIndex>);

impl CompositeKey {
    /// Validate and wrap a sequence of indices.
    pub fn new(indices: Vec<LayerIndex>) -> LayerResult<Self> {
        ensure_ascending(&indices, "composite key")?;
        Ok(Self(indices))
    }

    /// Build a key from raw positions, e.g. `CompositeKey::from_raw([1, 2, 3])`.
    pub fn from_raw(indices: impl IntoIterator<Item = usize>) -> LayerResult<Self> {
        Self::new(indices.into_iter().map(LayerIndex).collect())
    }

    /// Key for a single layer.
    pub fn singleton(index: LayerIndex) -> Self {
        Self(vec![index])
    }

    pub fn indices(&self) -> &[LayerIndex] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`: keys are non-empty by construction.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_singleton(&self) -> bool {
        self.0.len() == 1
    }

    pub fn first(&self) -> LayerIndex {
        self.0[0]
    }

    pub fn last(&self) -> LayerIndex {
        self.0[self.0.len() - 1]
    }

    pub fn contains(&self, index: LayerIndex) -> bool {
        self.0.binary_search(&index).is_ok()
    }

    /// Concatenate `self` (bottom) with `top`. Requires `self.last() < top.first()`.
    pub fn concat(&self, top: &CompositeKey) -> LayerResult<Self> {
        if self.last() >= top.first() {
            return Err(LayerError::validation(format!(
                "cannot stack {top} over {self}: keys overlap or are out of order"
            )));
        }
        let mut out = Vec::with_capacity(self.len() + top.len());
        out.extend_from_slice(&self.0);
        out.extend_from_slice(&top.0);
        Ok(Self(out))
    }
}

impl TryFrom<Vec<LayerIndex>> for CompositeKey {
    type Error = LayerError;

    fn try_from(v: Vec<LayerIndex>) -> LayerResult<Self> {
        Self::new(v)
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let [only] = self.0.as_slice() {
            return write!(f, "({only},)");
        }
        write!(f, "(")?;
        for (i, idx) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{idx}")?;
        }
        write!(f, ")")
    }
}

/// Check that `indices` is non-empty and strictly ascending.
pub(crate) fn ensure_ascending(indices: &[LayerIndex], what: &str) -> LayerResult<()> {
    if indices.is_empty() {
        return Err(LayerError::validation(format!("{what} must be non-empty")));
    }
    if let Some(w) = indices.windows(2).find(|w| w[0] >= w[1]) {
        return Err(LayerError::validation(format!(
            "{what} must be strictly ascending, found {} before {}",
            w[0], w[1]
        )));
    }
    Ok(())
}

/// Pixel dimensions shared by every layer of a stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    pub fn of(image: &RgbaImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }

    /// Fully transparent black buffer of this size.
    pub fn blank(self) -> RgbaImage {
        RgbaImage::new(self.width, self.height)
    }

    pub(crate) fn check(self, image: &RgbaImage, what: &str) -> LayerResult<()> {
        if Canvas::of(image) != self {
            return Err(LayerError::validation(format!(
                "{what} is {}x{}, expected {}x{}",
                image.width(),
                image.height(),
                self.width,
                self.height
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
