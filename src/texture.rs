//! CPU-side texture data: neutral placeholders and procedural noise.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Addressing mode requested for a texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Clamp,
    Repeat,
}

/// RGBA8 pixels waiting to be uploaded.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureData {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    pub address: AddressMode,
}

impl TextureData {
    /// Create a texture from raw RGBA data.
    ///
    /// Returns `None` when the pixel count does not match the dimensions.
    pub fn from_rgba(label: &'static str, pixels: Vec<u8>, width: u32, height: u32) -> Option<Self> {
        if pixels.len() != (width * height * 4) as usize {
            return None;
        }
        Some(Self {
            label,
            width,
            height,
            pixels,
            address: AddressMode::Clamp,
        })
    }

    pub fn solid(label: &'static str, rgba: [u8; 4]) -> Self {
        Self {
            label,
            width: 1,
            height: 1,
            pixels: rgba.to_vec(),
            address: AddressMode::Clamp,
        }
    }

    /// Neutral "fully lit" / "unoccluded" input.
    pub fn white() -> Self {
        Self::solid("Placeholder White", [255, 255, 255, 255])
    }

    pub fn black() -> Self {
        Self::solid("Placeholder Black", [0, 0, 0, 255])
    }

    /// Tileable per-pixel random values used to rotate the ambient-occlusion sampling
    /// pattern. R and G hold independent uniform noise; B and A are their complements so
    /// the texture averages to mid-grey.
    pub fn random_rotation(size: u32, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut pixels = Vec::with_capacity((size * size * 4) as usize);

        for _ in 0..size * size {
            let r: u8 = rng.r#gen();
            let g: u8 = rng.r#gen();
            pixels.extend_from_slice(&[r, g, 255 - r, 255 - g]);
        }

        Self {
            label: "Random Rotation Noise",
            width: size,
            height: size,
            pixels,
            address: AddressMode::Repeat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noise_is_deterministic_per_seed() {
        let a = TextureData::random_rotation(16, 7);
        let b = TextureData::random_rotation(16, 7);
        let c = TextureData::random_rotation(16, 8);
        assert_eq!(a, b);
        assert_ne!(a.pixels, c.pixels);
        assert_eq!(a.address, AddressMode::Repeat);
    }

    #[test]
    fn noise_channels_are_complements() {
        let noise = TextureData::random_rotation(8, 0x5EED);
        assert_eq!(noise.pixels.len(), 8 * 8 * 4);
        for texel in noise.pixels.chunks_exact(4) {
            assert_eq!(texel[0] as u16 + texel[2] as u16, 255);
            assert_eq!(texel[1] as u16 + texel[3] as u16, 255);
        }
        let first = noise.pixels[0];
        assert!(noise.pixels.chunks_exact(4).any(|t| t[0] != first));
    }

    #[test]
    fn from_rgba_checks_length() {
        assert!(TextureData::from_rgba("t", vec![0; 16], 2, 2).is_some());
        assert!(TextureData::from_rgba("t", vec![0; 15], 2, 2).is_none());
    }
}
