use image::RgbaImage;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a content hash of one layer buffer (dimensions + pixel bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContentFingerprint(pub u64);

pub fn fingerprint_image(image: &RgbaImage) -> ContentFingerprint {
    let dims = [image.width().to_le_bytes(), image.height().to_le_bytes()];
    let bytes = dims.iter().flatten().chain(image.as_raw().iter());
    ContentFingerprint(fnv1a(FNV_OFFSET, bytes))
}

fn fnv1a<'a>(seed: u64, bytes: impl IntoIterator<Item = &'a u8>) -> u64 {
    bytes
        .into_iter()
        .fold(seed, |h, &b| (h ^ u64::from(b)).wrapping_mul(FNV_PRIME))
}
