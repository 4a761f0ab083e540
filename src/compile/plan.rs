use std::collections::BTreeMap;
use std::fmt;

use crate::cache::cover::{find_leftmost, select_cover};
use crate::cache::store::CompositeCache;
use crate::foundation::core::{CompositeKey, LayerIndex, ensure_ascending};
use crate::foundation::error::{LayerError, LayerResult};

/// One pending blend: `top` over `bottom`, producing `bottom ++ top`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Instruction {
    /// Lower block of layers.
    pub bottom: CompositeKey,
    /// Upper block of layers, composited over `bottom`.
    pub top: CompositeKey,
}

impl Instruction {
    pub fn new(bottom: CompositeKey, top: CompositeKey) -> LayerResult<Self> {
        if bottom.last() >= top.first() {
            return Err(LayerError::validation(format!(
                "instruction operands {bottom} and {top} overlap or are out of order"
            )));
        }
        Ok(Self { bottom, top })
    }

    /// Key under which the blend result is cached.
    pub fn output_key(&self) -> LayerResult<CompositeKey> {
        self.bottom.concat(&self.top)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} over {}", self.top, self.bottom)
    }
}

/// Reusable cover plus the blends needed to finish a render target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OverlayPlan {
    /// Cached keys reused as-is, in target order.
    pub cover: Vec<CompositeKey>,
    /// Blends to execute, strictly in order.
    pub instructions: Vec<Instruction>,
}

impl OverlayPlan {
    /// `true` when the target is a single block and no blend is needed.
    pub fn is_trivial(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// Split `target` into blocks: the cover keys where they match, singletons elsewhere.
///
/// The concatenation of the returned blocks is exactly `target`.
pub fn gap_fill(cover: &[CompositeKey], target: &[LayerIndex]) -> LayerResult<Vec<CompositeKey>> {
    let mut by_start: BTreeMap<usize, &CompositeKey> = BTreeMap::new();
    for key in cover {
        let start = find_leftmost(target, key).ok_or_else(|| {
            LayerError::validation(format!("cover key {key} is not a run of the target"))
        })?;
        by_start.insert(start, key);
    }

    let mut blocks = Vec::with_capacity(target.len());
    let mut used = 0usize;
    let mut i = 0usize;
    while i < target.len() {
        match by_start.get(&i) {
            Some(key) => {
                blocks.push((*key).clone());
                used += 1;
                i += key.len();
            }
            None => {
                blocks.push(CompositeKey::singleton(target[i]));
                i += 1;
            }
        }
    }

    if used != cover.len() {
        return Err(LayerError::validation("cover keys overlap within the target"));
    }
    Ok(blocks)
}

/// Merge adjacent blocks pairwise, smallest combined size first.
///
/// Pass `S = 2, 3, ...` scans left to right and merges every adjacent pair whose combined
/// length is exactly `S`, re-checking the merged block against its new right neighbour.
/// A single block yields no instructions.
pub fn plan_instructions(
    cover: &[CompositeKey],
    target: &[LayerIndex],
) -> LayerResult<Vec<Instruction>> {
    let mut blocks = gap_fill(cover, target)?;
    let mut out = Vec::with_capacity(blocks.len().saturating_sub(1));

    let mut size = 2usize;
    while blocks.len() > 1 {
        let mut i = 0usize;
        while i + 1 < blocks.len() {
            if blocks[i].len() + blocks[i + 1].len() != size {
                i += 1;
                continue;
            }
            let top = blocks.remove(i + 1);
            let merged = blocks[i].concat(&top)?;
            let bottom = std::mem::replace(&mut blocks[i], merged);
            out.push(Instruction { bottom, top });
        }
        size += 1;
    }
    Ok(out)
}

impl CompositeCache {
    /// Cover selection followed by instruction planning for `target`.
    pub fn overlay_plan(&self, target: &[LayerIndex]) -> LayerResult<OverlayPlan> {
        ensure_ascending(target, "render target")?;
        let cover = select_cover(self.keys(), target);
        let instructions = plan_instructions(&cover, target)?;
        tracing::debug!(
            target_len = target.len(),
            reused = cover.len(),
            blends = instructions.len(),
            "planned overlay"
        );
        Ok(OverlayPlan {
            cover,
            instructions,
        })
    }

    /// Ordered blends that build `target` from the current cache contents.
    pub fn overlay_instructions(&self, target: &[LayerIndex]) -> LayerResult<Vec<Instruction>> {
        self.overlay_plan(target).map(|plan| plan.instructions)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/compile/plan.rs"]
mod tests;
