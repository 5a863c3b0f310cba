use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::{
    DrawKind, GpuBackend, MeshId, Output, PassCommand, PassUniforms, ProgramDesc, ProgramId,
    TargetDesc, TargetId, TextureId, TextureRef,
};
use crate::error::PipelineError;
use crate::mesh::MeshData;
use crate::texture::TextureData;

/// One submitted pass, as seen by a [`HeadlessBackend`].
#[derive(Clone, Debug)]
pub struct RecordedPass {
    /// Index of the frame the pass was submitted in.
    pub frame: u64,
    pub label: &'static str,
    /// Label of the program that ran.
    pub program: &'static str,
    pub output: Output,
    pub cleared: bool,
    /// Texture units bound, in submission order.
    pub units: Vec<u32>,
    pub inputs: Vec<TextureRef>,
    pub uniforms: PassUniforms,
    pub draw_count: usize,
}

struct HeadlessTarget {
    desc: TargetDesc,
    signature: u64,
    pixels: HashMap<(u32, u32), [u8; 4]>,
}

struct HeadlessProgram {
    label: &'static str,
    ok: bool,
}

/// A [`GpuBackend`] without a GPU.
///
/// Every pass is recorded, and each target carries a signature that summarizes
/// everything drawn into it: the program, uniforms, draws and the signatures of the
/// textures it sampled. Two frames that would produce identical pixels produce identical
/// screen signatures. Pixels for readback are seeded with [`poke`](Self::poke).
pub struct HeadlessBackend {
    size: (u32, u32),
    next_id: u32,
    targets: HashMap<TargetId, HeadlessTarget>,
    programs: HashMap<ProgramId, HeadlessProgram>,
    textures: HashMap<TextureId, u64>,
    meshes: HashMap<MeshId, usize>,
    frame: u64,
    in_frame: bool,
    screen: u64,
    passes: Vec<RecordedPass>,
    frames: Vec<u64>,
}

impl HeadlessBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width.max(1), height.max(1)),
            next_id: 1,
            targets: HashMap::new(),
            programs: HashMap::new(),
            textures: HashMap::new(),
            meshes: HashMap::new(),
            frame: 0,
            in_frame: false,
            screen: 0,
            passes: Vec::new(),
            frames: Vec::new(),
        }
    }

    fn allocate(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Every pass submitted so far.
    pub fn passes(&self) -> &[RecordedPass] {
        &self.passes
    }

    /// Passes submitted during frame `frame`.
    pub fn frame_passes(&self, frame: u64) -> impl Iterator<Item = &RecordedPass> {
        self.passes.iter().filter(move |p| p.frame == frame)
    }

    pub fn clear_log(&mut self) {
        self.passes.clear();
    }

    /// Screen signature of every completed frame.
    pub fn frame_signatures(&self) -> &[u64] {
        &self.frames
    }

    pub fn target_signature(&self, target: TargetId) -> Option<u64> {
        self.targets.get(&target).map(|t| t.signature)
    }

    pub fn target_desc(&self, target: TargetId) -> Option<&TargetDesc> {
        self.targets.get(&target).map(|t| &t.desc)
    }

    pub fn live_targets(&self) -> usize {
        self.targets.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Seeds the color of one pixel of a target's first attachment.
    pub fn poke(&mut self, target: TargetId, x: u32, y: u32, rgba: [u8; 4]) {
        if let Some(t) = self.targets.get_mut(&target) {
            t.pixels.insert((x, y), rgba);
        }
    }

    fn texture_signature(&self, texture: TextureRef) -> u64 {
        match texture {
            TextureRef::Attachment { target, index } => {
                let mut h = DefaultHasher::new();
                self.target_signature(target).unwrap_or(0).hash(&mut h);
                index.hash(&mut h);
                h.finish()
            }
            TextureRef::Texture(id) => self.textures.get(&id).copied().unwrap_or(0),
        }
    }

    fn pass_signature(&self, pass: &PassCommand, previous: u64) -> u64 {
        let mut h = DefaultHasher::new();
        match pass.clear {
            Some(color) => bytemuck::bytes_of(&color).hash(&mut h),
            None => previous.hash(&mut h),
        }
        pass.program.hash(&mut h);
        pass.depth_test.hash(&mut h);
        pass.blend.hash(&mut h);
        bytemuck::bytes_of(&pass.uniforms).hash(&mut h);

        for input in &pass.inputs {
            input.unit.hash(&mut h);
            self.texture_signature(input.texture).hash(&mut h);
        }

        for draw in &pass.draws {
            match draw.kind {
                DrawKind::Mesh(mesh) => mesh.hash(&mut h),
                DrawKind::Quad => u32::MAX.hash(&mut h),
            }
            bytemuck::bytes_of(&draw.uniforms).hash(&mut h);
            if let Some(texture) = draw.texture {
                self.texture_signature(TextureRef::Texture(texture)).hash(&mut h);
            }
        }
        h.finish()
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new(crate::config::TARGET_RESOLUTION, crate::config::TARGET_RESOLUTION)
    }
}

impl GpuBackend for HeadlessBackend {
    fn create_target(&mut self, desc: &TargetDesc) -> TargetId {
        let id = TargetId(self.allocate());
        self.targets.insert(
            id,
            HeadlessTarget {
                desc: desc.clone(),
                signature: 0,
                pixels: HashMap::new(),
            },
        );
        id
    }

    fn destroy_target(&mut self, target: TargetId) {
        self.targets.remove(&target);
    }

    fn create_program(&mut self, desc: &ProgramDesc) -> ProgramId {
        let id = ProgramId(self.allocate());
        let ok = desc.source.contains("fn vs(") && desc.source.contains("fn fs(");
        if !ok {
            log::error!("program '{}' is missing an entry point", desc.label);
        }
        self.programs.insert(
            id,
            HeadlessProgram {
                label: desc.label,
                ok,
            },
        );
        id
    }

    fn program_ok(&self, program: ProgramId) -> bool {
        self.programs.get(&program).is_some_and(|p| p.ok)
    }

    fn destroy_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
    }

    fn create_texture(&mut self, data: &TextureData) -> TextureId {
        let id = TextureId(self.allocate());
        let mut h = DefaultHasher::new();
        data.pixels.hash(&mut h);
        data.width.hash(&mut h);
        data.height.hash(&mut h);
        self.textures.insert(id, h.finish());
        id
    }

    fn create_mesh(&mut self, data: &MeshData) -> MeshId {
        let id = MeshId(self.allocate());
        self.meshes.insert(id, data.indices.len());
        id
    }

    fn begin_frame(&mut self) -> bool {
        self.in_frame = true;
        self.screen = 0;
        true
    }

    fn submit(&mut self, pass: &PassCommand) {
        if !self.in_frame {
            log::warn!("pass '{}' submitted outside a frame", pass.label);
        }

        let previous = match pass.output {
            Output::Screen => self.screen,
            Output::Target(target) => self.target_signature(target).unwrap_or(0),
        };
        let signature = self.pass_signature(pass, previous);

        match pass.output {
            Output::Screen => self.screen = signature,
            Output::Target(target) => {
                if let Some(t) = self.targets.get_mut(&target) {
                    t.signature = signature;
                    if pass.clear.is_some() {
                        t.pixels.clear();
                    }
                }
            }
        }

        let program = self
            .programs
            .get(&pass.program)
            .map(|p| p.label)
            .unwrap_or("<destroyed>");

        self.passes.push(RecordedPass {
            frame: self.frame,
            label: pass.label,
            program,
            output: pass.output,
            cleared: pass.clear.is_some(),
            units: pass.inputs.iter().map(|b| b.unit).collect(),
            inputs: pass.inputs.iter().map(|b| b.texture).collect(),
            uniforms: pass.uniforms,
            draw_count: pass.draws.len(),
        });
    }

    fn end_frame(&mut self) {
        self.frames.push(self.screen);
        self.frame += 1;
        self.in_frame = false;
    }

    fn read_pixel(&mut self, target: TargetId, x: u32, y: u32) -> Result<[u8; 4], PipelineError> {
        let t = self
            .targets
            .get(&target)
            .ok_or_else(|| PipelineError::Readback(format!("unknown target {:?}", target)))?;

        if x >= t.desc.width || y >= t.desc.height {
            return Err(PipelineError::PixelOutOfBounds {
                x,
                y,
                width: t.desc.width,
                height: t.desc.height,
            });
        }
        Ok(t.pixels.get(&(x, y)).copied().unwrap_or([0, 0, 0, 0]))
    }

    fn surface_size(&self) -> (u32, u32) {
        self.size
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.size = (width.max(1), height.max(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AttachmentDesc, Blend, BoundTexture, Precision};

    fn target(backend: &mut HeadlessBackend) -> TargetId {
        backend.create_target(&TargetDesc {
            label: "test".into(),
            width: 4,
            height: 4,
            attachments: vec![AttachmentDesc {
                name: "color",
                precision: Precision::Byte,
            }],
        })
    }

    fn pass(program: ProgramId, output: Output, inputs: Vec<BoundTexture>) -> PassCommand {
        PassCommand {
            label: "test",
            program,
            output,
            clear: Some([0.0; 4]),
            depth_test: false,
            blend: Blend::Replace,
            inputs,
            uniforms: PassUniforms::default(),
            draws: Vec::new(),
        }
    }

    #[test]
    fn programs_without_entry_points_are_broken() {
        let mut backend = HeadlessBackend::default();
        let good = backend.create_program(&ProgramDesc {
            label: "good",
            source: "fn vs() {} fn fs() {}".into(),
            uses_vertices: false,
        });
        let bad = backend.create_program(&ProgramDesc {
            label: "bad",
            source: "fn vs() {}".into(),
            uses_vertices: false,
        });
        assert!(backend.program_ok(good));
        assert!(!backend.program_ok(bad));
    }

    #[test]
    fn signatures_follow_input_content() {
        let mut backend = HeadlessBackend::default();
        let program = backend.create_program(&ProgramDesc {
            label: "p",
            source: "fn vs() {} fn fs() {}".into(),
            uses_vertices: false,
        });
        let a = target(&mut backend);
        let b = target(&mut backend);
        let read_a = vec![BoundTexture {
            texture: TextureRef::Attachment { target: a, index: 0 },
            unit: 0,
        }];

        backend.begin_frame();
        backend.submit(&pass(program, Output::Target(a), vec![]));
        backend.submit(&pass(program, Output::Screen, read_a.clone()));
        backend.end_frame();

        // Same content in a different target yields the same screen.
        let read_b = vec![BoundTexture {
            texture: TextureRef::Attachment { target: b, index: 0 },
            unit: 0,
        }];
        backend.begin_frame();
        backend.submit(&pass(program, Output::Target(b), vec![]));
        backend.submit(&pass(program, Output::Screen, read_b));
        backend.end_frame();

        let frames = backend.frame_signatures();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], frames[1]);
        assert_eq!(backend.frame_passes(1).count(), 2);
    }

    #[test]
    fn readback_checks_bounds_and_clears() {
        let mut backend = HeadlessBackend::default();
        let t = target(&mut backend);
        backend.poke(t, 1, 2, [0, 0, 5, 255]);
        assert_eq!(backend.read_pixel(t, 1, 2).unwrap(), [0, 0, 5, 255]);
        assert!(matches!(
            backend.read_pixel(t, 4, 0),
            Err(PipelineError::PixelOutOfBounds { .. })
        ));

        let program = backend.create_program(&ProgramDesc {
            label: "p",
            source: "fn vs() {} fn fs() {}".into(),
            uses_vertices: false,
        });
        backend.begin_frame();
        backend.submit(&pass(program, Output::Target(t), vec![]));
        backend.end_frame();
        assert_eq!(backend.read_pixel(t, 1, 2).unwrap(), [0, 0, 0, 0]);
    }
}
