//! Object identifiers for pixel-exact picking.
//!
//! Every drawable gets a 24-bit id when it is constructed. The id is written into the
//! RGB channels of a byte-precision target by the object-id passes, and decoded back
//! from a single-pixel readback as `R << 16 | G << 8 | B`.

use std::sync::atomic::{AtomicU32, Ordering};

/// Largest id that fits in three 8-bit channels.
pub const MAX_OBJECT_ID: u32 = 0x00FF_FFFF;

static NEXT_ID: AtomicU32 = AtomicU32::new(1);

/// A 24-bit drawable identifier. `0` is reserved for "nothing drawn here".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u32);

impl ObjectId {
    /// The background id.
    pub const NONE: ObjectId = ObjectId(0);

    /// Allocates the next id from the global counter.
    ///
    /// Ids are handed out monotonically; after `MAX_OBJECT_ID` the counter wraps and
    /// skips `0`.
    pub fn next() -> Self {
        let raw = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let id = raw % (MAX_OBJECT_ID + 1);
        if id == 0 {
            return Self::next();
        }
        ObjectId(id)
    }

    /// Wraps a raw value, rejecting anything wider than 24 bits.
    pub fn from_raw(raw: u32) -> Option<Self> {
        (raw <= MAX_OBJECT_ID).then_some(ObjectId(raw))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Channel bytes `[R, G, B]`.
    pub fn to_rgb(self) -> [u8; 3] {
        [(self.0 >> 16) as u8, (self.0 >> 8) as u8, self.0 as u8]
    }

    /// Normalized color as the shaders receive it. Each channel is `byte / 255`, which
    /// an 8-bit unorm target stores back exactly.
    pub fn to_color(self) -> [f32; 4] {
        let [r, g, b] = self.to_rgb();
        [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0, 1.0]
    }
}

/// Decodes a readback pixel into its id. Alpha is ignored.
pub fn decode_object_id(pixel: [u8; 4]) -> u32 {
    (pixel[0] as u32) << 16 | (pixel[1] as u32) << 8 | pixel[2] as u32
}
