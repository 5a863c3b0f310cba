//! Offscreen render targets with named color attachments.

use std::collections::BTreeMap;

use crate::backend::{
    AttachmentDesc, GpuBackend, Output, Precision, TargetDesc, TargetId, TextureRef,
};
use crate::error::PipelineError;

/// A framebuffer with one or more named color attachments and a depth buffer.
///
/// Attachments are declared with [`add_attachment`](Self::add_attachment) and the target
/// is allocated by [`complete`](Self::complete). Every attachment is a square texture of
/// the target's size that can be rendered to and sampled from.
///
/// # Example
///
/// ```ignore
/// let mut target = RenderTarget::new("g-buffer", 1024, 1024);
/// target
///     .add_attachment("normal_depth", Precision::Float, 0)
///     .add_attachment("albedo", Precision::Byte, 1);
/// if !target.complete(&mut backend) {
///     // logged; the target is still usable, its contents are undefined
/// }
/// ```
#[derive(Debug)]
pub struct RenderTarget {
    label: String,
    width: u32,
    height: u32,
    /// Declared attachments keyed by attachment point.
    pending: Vec<(u32, AttachmentDesc)>,
    /// Attachment names in attachment-point order, filled by `complete`.
    names: Vec<&'static str>,
    id: Option<TargetId>,
}

impl RenderTarget {
    pub fn new(label: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            pending: Vec::new(),
            names: Vec::new(),
            id: None,
        }
    }

    /// Declares a color attachment at `point`. Takes effect at [`complete`](Self::complete).
    pub fn add_attachment(
        &mut self,
        name: &'static str,
        precision: Precision,
        point: u32,
    ) -> &mut Self {
        self.pending.push((point, AttachmentDesc { name, precision }));
        self
    }

    /// Allocates the target. Returns `false` when the declaration is unusable.
    ///
    /// Problems are logged and, except for a target with no attachments at all, the
    /// target is still created so that rendering continues with undefined contents.
    pub fn complete(&mut self, backend: &mut dyn GpuBackend) -> bool {
        if let Some(old) = self.id.take() {
            backend.destroy_target(old);
        }

        let problems = self.validate();
        for problem in &problems {
            log::error!("render target '{}' incomplete: {}", self.label, problem);
        }

        // BTreeMap orders by point and keeps the last declaration for a reused point.
        let ordered: BTreeMap<u32, AttachmentDesc> = self.pending.iter().cloned().collect();
        if ordered.is_empty() {
            return false;
        }

        self.names = ordered.values().map(|a| a.name).collect();
        let desc = TargetDesc {
            label: self.label.clone(),
            width: self.width.max(1),
            height: self.height.max(1),
            attachments: ordered.into_values().collect(),
        };
        self.id = Some(backend.create_target(&desc));
        log::debug!(
            "render target '{}' created: {}x{}, {} attachments",
            self.label,
            desc.width,
            desc.height,
            desc.attachments.len()
        );

        problems.is_empty()
    }

    fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.pending.is_empty() {
            problems.push("no color attachments".to_string());
        }
        if self.width == 0 || self.height == 0 {
            problems.push(format!("zero size {}x{}", self.width, self.height));
        }

        let mut points: Vec<u32> = self.pending.iter().map(|(p, _)| *p).collect();
        points.sort_unstable();
        if points.windows(2).any(|w| w[0] == w[1]) {
            problems.push("attachment point used twice".to_string());
        }
        points.dedup();
        if points.iter().enumerate().any(|(i, p)| *p != i as u32) {
            problems.push(format!("attachment points {:?} are not contiguous from 0", points));
        }

        let mut names: Vec<&str> = self.pending.iter().map(|(_, a)| a.name).collect();
        names.sort_unstable();
        if names.windows(2).any(|w| w[0] == w[1]) {
            problems.push("attachment name used twice".to_string());
        }

        problems
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn id(&self) -> Option<TargetId> {
        self.id
    }

    pub fn is_complete(&self) -> bool {
        self.id.is_some()
    }

    /// Where a pass writes when it binds this target.
    pub fn output(&self) -> Option<Output> {
        self.id.map(Output::Target)
    }

    /// The attachment called `name`.
    pub fn texture(&self, name: &str) -> Option<TextureRef> {
        let target = self.id?;
        let index = self.names.iter().position(|n| *n == name)?;
        Some(TextureRef::Attachment { target, index })
    }

    /// The attachment at point 0.
    pub fn first_texture(&self) -> Option<TextureRef> {
        self.id.map(|target| TextureRef::Attachment { target, index: 0 })
    }

    /// Attachment names in attachment-point order.
    pub fn attachment_names(&self) -> &[&'static str] {
        &self.names
    }

    /// Reads one texel of the first attachment. Blocks until the GPU is done.
    pub fn read_pixel(
        &self,
        backend: &mut dyn GpuBackend,
        x: u32,
        y: u32,
    ) -> Result<[u8; 4], PipelineError> {
        let target = self.id.ok_or_else(|| {
            PipelineError::Readback(format!("render target '{}' was never completed", self.label))
        })?;
        backend.read_pixel(target, x, y)
    }

    pub fn destroy(&mut self, backend: &mut dyn GpuBackend) {
        if let Some(id) = self.id.take() {
            backend.destroy_target(id);
        }
        self.names.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;

    #[test]
    fn attachments_are_ordered_by_point() {
        let mut backend = HeadlessBackend::new(64, 64);
        let mut target = RenderTarget::new("gbuffer", 16, 16);
        target
            .add_attachment("albedo", Precision::Byte, 1)
            .add_attachment("normal", Precision::Float, 0);

        assert!(target.complete(&mut backend));
        assert_eq!(target.attachment_names(), &["normal", "albedo"]);

        let id = target.id().unwrap();
        let desc = backend.target_desc(id).unwrap();
        assert_eq!(desc.attachments[0].precision, Precision::Float);
        assert_eq!(
            target.texture("albedo"),
            Some(TextureRef::Attachment { target: id, index: 1 })
        );
        assert_eq!(target.texture("missing"), None);
    }

    #[test]
    fn bad_declarations_fail_open() {
        let mut backend = HeadlessBackend::new(64, 64);
        let mut target = RenderTarget::new("gapped", 8, 8);
        target
            .add_attachment("a", Precision::Byte, 0)
            .add_attachment("b", Precision::Byte, 2);

        assert!(!target.complete(&mut backend));
        assert!(target.is_complete());
        assert_eq!(backend.live_targets(), 1);
    }

    #[test]
    fn empty_target_is_not_created() {
        let mut backend = HeadlessBackend::new(64, 64);
        let mut target = RenderTarget::new("empty", 8, 8);
        assert!(!target.complete(&mut backend));
        assert!(!target.is_complete());
        assert!(target.read_pixel(&mut backend, 0, 0).is_err());
    }

    #[test]
    fn recompleting_replaces_the_allocation() {
        let mut backend = HeadlessBackend::new(64, 64);
        let mut target = RenderTarget::new("color", 8, 8);
        target.add_attachment("color", Precision::Byte, 0);
        assert!(target.complete(&mut backend));
        assert!(target.complete(&mut backend));
        assert_eq!(backend.live_targets(), 1);

        target.destroy(&mut backend);
        assert_eq!(backend.live_targets(), 0);
        assert_eq!(target.output(), None);
    }

    #[test]
    fn readback_goes_through_the_backend() {
        let mut backend = HeadlessBackend::new(64, 64);
        let mut target = RenderTarget::new("ids", 8, 8);
        target.add_attachment("color", Precision::Byte, 0);
        target.complete(&mut backend);

        let id = target.id().unwrap();
        backend.poke(id, 3, 4, [0, 0, 5, 255]);
        assert_eq!(target.read_pixel(&mut backend, 3, 4).unwrap(), [0, 0, 5, 255]);
        assert!(matches!(
            target.read_pixel(&mut backend, 8, 0),
            Err(PipelineError::PixelOutOfBounds { .. })
        ));
    }
}
