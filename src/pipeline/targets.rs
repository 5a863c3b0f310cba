//! The named offscreen targets the strategies render into.

use std::collections::HashMap;

use crate::backend::{GpuBackend, Precision};
use crate::render_graph::RenderTarget;

/// Name of the single color attachment every pipeline target carries.
pub const COLOR_ATTACHMENT: &str = "color";

/// Every offscreen target a strategy may own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetKey {
    NormalDepth,
    WorldPosition,
    ColorSpecular,
    ObjectId,
    HudObjectId,
    LightSpaceNormal,
    ShadowPing,
    ShadowPong,
    LightAccumPing,
    LightAccumPong,
    AmbientOcclusion,
    AoBlurPing,
    TonemapPing,
    TonemapPong,
    ForwardColor,
}

impl TargetKey {
    pub fn label(self) -> &'static str {
        match self {
            TargetKey::NormalDepth => "normal_depth",
            TargetKey::WorldPosition => "world_position",
            TargetKey::ColorSpecular => "color_specular",
            TargetKey::ObjectId => "object_id",
            TargetKey::HudObjectId => "hud_object_id",
            TargetKey::LightSpaceNormal => "light_space_normal",
            TargetKey::ShadowPing => "shadow_ping",
            TargetKey::ShadowPong => "shadow_pong",
            TargetKey::LightAccumPing => "light_accum_ping",
            TargetKey::LightAccumPong => "light_accum_pong",
            TargetKey::AmbientOcclusion => "ambient_occlusion",
            TargetKey::AoBlurPing => "ao_blur_ping",
            TargetKey::TonemapPing => "tonemap_ping",
            TargetKey::TonemapPong => "tonemap_pong",
            TargetKey::ForwardColor => "forward_color",
        }
    }

    /// Geometry, light-space depth moments and light accumulation need range beyond
    /// `[0, 1]`. Object ids must round-trip exactly through 8-bit channels.
    pub fn precision(self) -> Precision {
        match self {
            TargetKey::NormalDepth
            | TargetKey::WorldPosition
            | TargetKey::LightSpaceNormal
            | TargetKey::LightAccumPing
            | TargetKey::LightAccumPong => Precision::Float,
            _ => Precision::Byte,
        }
    }
}

/// Targets of the deferred strategy.
pub const DEFERRED_TARGETS: [TargetKey; 14] = [
    TargetKey::NormalDepth,
    TargetKey::WorldPosition,
    TargetKey::ColorSpecular,
    TargetKey::ObjectId,
    TargetKey::HudObjectId,
    TargetKey::LightSpaceNormal,
    TargetKey::ShadowPing,
    TargetKey::ShadowPong,
    TargetKey::LightAccumPing,
    TargetKey::LightAccumPong,
    TargetKey::AmbientOcclusion,
    TargetKey::AoBlurPing,
    TargetKey::TonemapPing,
    TargetKey::TonemapPong,
];

/// Targets of the forward strategy.
pub const FORWARD_TARGETS: [TargetKey; 3] = [
    TargetKey::ForwardColor,
    TargetKey::ObjectId,
    TargetKey::HudObjectId,
];

/// Two targets of identical layout that trade reader and writer roles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PingPongPair {
    Shadow,
    LightAccum,
    Tonemap,
}

impl PingPongPair {
    pub fn keys(self) -> [TargetKey; 2] {
        match self {
            PingPongPair::Shadow => [TargetKey::ShadowPing, TargetKey::ShadowPong],
            PingPongPair::LightAccum => [TargetKey::LightAccumPing, TargetKey::LightAccumPong],
            PingPongPair::Tonemap => [TargetKey::TonemapPing, TargetKey::TonemapPong],
        }
    }
}

/// The allocated targets of one strategy, by key.
#[derive(Debug, Default)]
pub struct TargetRegistry {
    targets: HashMap<TargetKey, RenderTarget>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a square single-attachment target for each key not yet present.
    pub fn create(&mut self, keys: &[TargetKey], resolution: u32, backend: &mut dyn GpuBackend) {
        for &key in keys {
            if self.targets.contains_key(&key) {
                continue;
            }
            let mut target = RenderTarget::new(key.label(), resolution, resolution);
            target.add_attachment(COLOR_ATTACHMENT, key.precision(), 0);
            target.complete(backend);
            self.targets.insert(key, target);
        }
    }

    pub fn get(&self, key: TargetKey) -> Option<&RenderTarget> {
        self.targets.get(&key)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn destroy_all(&mut self, backend: &mut dyn GpuBackend) {
        for (_, mut target) in self.targets.drain() {
            target.destroy(backend);
        }
    }
}
