use image::RgbaImage;
use rayon::prelude::*;

use crate::foundation::error::{LayerError, LayerResult};

/// Straight (non-premultiplied) RGBA8 pixel, alpha last.
pub type Rgba8 = [u8; 4];

/// Alpha-over of `top` onto `bottom`.
///
/// Math runs in f64 normalized alpha and every channel is truncated on the way back to u8.
/// Bottom alpha only enters the alpha channel; it never scales bottom color.
pub fn over(bottom: Rgba8, top: Rgba8) -> Rgba8 {
    let a_top = f64::from(top[3]) / 255.0;
    let a_bottom = f64::from(bottom[3]) / 255.0;
    let inv = 1.0 - a_top;

    let mut out = [0u8; 4];
    for c in 0..3 {
        out[c] = (f64::from(top[c]) * a_top + f64::from(bottom[c]) * inv) as u8;
    }
    out[3] = ((a_top + a_bottom * inv) * 255.0) as u8;
    out
}

/// Blend `src` over `dst` in place. Both buffers are tightly packed RGBA8.
pub fn over_in_place(dst: &mut [u8], src: &[u8]) -> LayerResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(LayerError::validation(
            "over_in_place expects equal-length rgba8 buffers",
        ));
    }
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let out = over([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]]);
        d.copy_from_slice(&out);
    }
    Ok(())
}

/// Composite `top` over `bottom` into a new buffer.
///
/// With `parallel` set, rows are blended on the rayon pool; the output is identical to the
/// serial path.
pub fn over_images(bottom: &RgbaImage, top: &RgbaImage, parallel: bool) -> LayerResult<RgbaImage> {
    if bottom.dimensions() != top.dimensions() {
        return Err(LayerError::validation(format!(
            "cannot blend {}x{} over {}x{}",
            top.width(),
            top.height(),
            bottom.width(),
            bottom.height()
        )));
    }

    let mut out = bottom.clone();
    let row_bytes = (out.width() as usize) * 4;
    if parallel && row_bytes > 0 {
        let dst: &mut [u8] = &mut out;
        dst.par_chunks_mut(row_bytes)
            .zip(top.as_raw().par_chunks(row_bytes))
            .try_for_each(|(d, s)| over_in_place(d, s))?;
    } else {
        over_in_place(&mut out, top.as_raw())?;
    }
    Ok(out)
}

#[cfg(test)]
#[path = "../../tests/unit/render/composite.rs"]
mod tests;
