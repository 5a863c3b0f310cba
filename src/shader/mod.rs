//! Shader source acquisition and program contracts.
//!
//! Sources arrive through a [`ShaderSourceProvider`] and are collected by a
//! [`ShaderLibrary`]. Acquisition is modeled as a poll: the library asks the provider for
//! every file it needs, then drains whatever has arrived on each [`ShaderLibrary::poll`].
//! Once every required file is present the owning strategy compiles its programs.
//!
//! Each program is assembled from `common.wgsl` (shared bindings and the screen-quad
//! vertex helper) followed by the program's own file.
//!
//! # Providers
//!
//! - [`EmbeddedShaders`]: the sources compiled into the binary.
//! - [`DirectoryShaders`]: files read from a directory and watched for modification, so
//!   shaders can be edited while the application runs.

mod hot;
mod program;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

pub use hot::HotShader;
pub use program::{
    Attribute, ProgramBinding, ProgramContract, ProgramKey, Sampler, Uniform, UniformScope,
    UniformValue,
};
pub(crate) use program::pad_mat3;

/// Shared prelude concatenated in front of every program.
pub const COMMON_SOURCE: &str = "common.wgsl";

/// Source of shader text.
pub trait ShaderSourceProvider {
    /// Ask for a file. The source arrives on some later [`poll`](Self::poll).
    fn request(&mut self, name: &str);

    /// Drain the `(name, source)` pairs that arrived since the last call.
    fn poll(&mut self) -> Vec<(String, String)>;

    /// Names of previously delivered files whose contents changed. The default provider
    /// never changes.
    fn changed(&mut self) -> Vec<String> {
        Vec::new()
    }
}

/// Serves the WGSL sources compiled into the crate.
#[derive(Default)]
pub struct EmbeddedShaders {
    pending: Vec<String>,
}

impl EmbeddedShaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(name: &str) -> Option<&'static str> {
        let source = match name {
            "common.wgsl" => include_str!("../shaders/common.wgsl"),
            "normal_depth.wgsl" => include_str!("../shaders/normal_depth.wgsl"),
            "world_position.wgsl" => include_str!("../shaders/world_position.wgsl"),
            "color_specular.wgsl" => include_str!("../shaders/color_specular.wgsl"),
            "object_id.wgsl" => include_str!("../shaders/object_id.wgsl"),
            "light_space_depth.wgsl" => include_str!("../shaders/light_space_depth.wgsl"),
            "shadow_map.wgsl" => include_str!("../shaders/shadow_map.wgsl"),
            "lighting.wgsl" => include_str!("../shaders/lighting.wgsl"),
            "ssao.wgsl" => include_str!("../shaders/ssao.wgsl"),
            "blur.wgsl" => include_str!("../shaders/blur.wgsl"),
            "tonemap.wgsl" => include_str!("../shaders/tonemap.wgsl"),
            "fxaa.wgsl" => include_str!("../shaders/fxaa.wgsl"),
            "overlay.wgsl" => include_str!("../shaders/overlay.wgsl"),
            "object_id_overlay.wgsl" => include_str!("../shaders/object_id_overlay.wgsl"),
            "blit.wgsl" => include_str!("../shaders/blit.wgsl"),
            "phong.wgsl" => include_str!("../shaders/phong.wgsl"),
            _ => return None,
        };
        Some(source)
    }
}

impl ShaderSourceProvider for EmbeddedShaders {
    fn request(&mut self, name: &str) {
        self.pending.push(name.to_string());
    }

    fn poll(&mut self) -> Vec<(String, String)> {
        self.pending
            .drain(..)
            .filter_map(|name| match Self::lookup(&name) {
                Some(source) => Some((name, source.to_string())),
                None => {
                    log::error!("no embedded shader named '{}'", name);
                    None
                }
            })
            .collect()
    }
}

/// Reads sources from a directory and reports edits.
pub struct DirectoryShaders {
    root: PathBuf,
    pending: Vec<String>,
    watched: HashMap<String, HotShader>,
    /// Missing files already reported at `error` level.
    reported: HashSet<String>,
}

impl DirectoryShaders {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            pending: Vec::new(),
            watched: HashMap::new(),
            reported: HashSet::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ShaderSourceProvider for DirectoryShaders {
    fn request(&mut self, name: &str) {
        self.pending.push(name.to_string());
    }

    fn poll(&mut self) -> Vec<(String, String)> {
        let mut arrived = Vec::new();
        let mut still_pending = Vec::new();

        for name in self.pending.drain(..) {
            match HotShader::new(name.as_str(), self.root.join(&name)) {
                Ok(shader) => {
                    arrived.push((name.clone(), shader.source().to_string()));
                    self.reported.remove(&name);
                    self.watched.insert(name, shader);
                }
                Err(e) => {
                    if self.reported.insert(name.clone()) {
                        log::error!("{}", e);
                    } else {
                        log::trace!("{}", e);
                    }
                    still_pending.push(name);
                }
            }
        }

        self.pending = still_pending;
        arrived
    }

    fn changed(&mut self) -> Vec<String> {
        let mut changed: Vec<String> = self
            .watched
            .values_mut()
            .filter_map(|shader| shader.check_reload().then(|| shader.name().to_string()))
            .collect();
        changed.sort();
        changed
    }
}

/// Collects the sources a strategy needs and assembles program text.
pub struct ShaderLibrary {
    provider: Box<dyn ShaderSourceProvider>,
    required: BTreeSet<String>,
    sources: HashMap<String, String>,
}

impl ShaderLibrary {
    pub fn new(provider: impl ShaderSourceProvider + 'static) -> Self {
        Self {
            provider: Box::new(provider),
            required: BTreeSet::new(),
            sources: HashMap::new(),
        }
    }

    pub fn embedded() -> Self {
        Self::new(EmbeddedShaders::new())
    }

    /// Embedded sources, or a watched directory when one is given.
    pub fn from_dir(dir: Option<&Path>) -> Self {
        match dir {
            Some(dir) => Self::new(DirectoryShaders::new(dir)),
            None => Self::embedded(),
        }
    }

    /// Forgets every source and requests the files for `programs` again.
    pub fn request(&mut self, programs: &[ProgramKey]) {
        self.sources.clear();
        self.required.clear();
        self.required.insert(COMMON_SOURCE.to_string());
        self.required
            .extend(programs.iter().map(|key| key.file_name()));

        for name in &self.required {
            self.provider.request(name);
        }
    }

    /// Stores newly arrived sources. Returns `true` when this call completed the set.
    pub fn poll(&mut self) -> bool {
        let was_complete = self.is_complete();
        for (name, source) in self.provider.poll() {
            log::debug!("shader source arrived: {}", name);
            self.sources.insert(name, source);
        }
        !was_complete && self.is_complete()
    }

    pub fn is_complete(&self) -> bool {
        !self.required.is_empty() && self.required.iter().all(|n| self.sources.contains_key(n))
    }

    pub fn missing(&self) -> Vec<&str> {
        self.required
            .iter()
            .filter(|n| !self.sources.contains_key(*n))
            .map(String::as_str)
            .collect()
    }

    /// `common.wgsl` followed by the program's own file.
    pub fn program_source(&self, key: ProgramKey) -> Option<String> {
        let common = self.sources.get(COMMON_SOURCE)?;
        let own = self.sources.get(&key.file_name())?;
        Some(format!("{}\n{}", common, own))
    }

    /// True when the provider reports an edited file.
    pub fn sources_changed(&mut self) -> bool {
        let changed = self.provider.changed();
        for name in &changed {
            log::info!("shader source changed: {}", name);
        }
        !changed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Delivers one requested file per poll.
    #[derive(Default)]
    struct Trickle {
        queue: VecDeque<String>,
    }

    impl ShaderSourceProvider for Trickle {
        fn request(&mut self, name: &str) {
            self.queue.push_back(name.to_string());
        }

        fn poll(&mut self) -> Vec<(String, String)> {
            self.queue
                .pop_front()
                .map(|name| {
                    let source = EmbeddedShaders::lookup(&name).unwrap_or_default();
                    vec![(name, source.to_string())]
                })
                .unwrap_or_default()
        }
    }

    #[test]
    fn every_program_has_an_embedded_source() {
        assert!(EmbeddedShaders::lookup(COMMON_SOURCE).is_some());
        for key in ProgramKey::ALL {
            let source = EmbeddedShaders::lookup(&key.file_name())
                .unwrap_or_else(|| panic!("missing {}", key.file_name()));
            assert!(source.contains("fn vs("), "{} lacks vs", key.name());
            assert!(source.contains("fn fs("), "{} lacks fs", key.name());
        }
    }

    #[test]
    fn library_completes_after_last_arrival() {
        let mut library = ShaderLibrary::new(Trickle::default());
        library.request(&[ProgramKey::Blur, ProgramKey::Blit]);

        assert!(!library.poll());
        assert!(!library.is_complete());
        assert!(!library.poll());
        assert!(library.poll());
        assert!(library.is_complete());
        assert!(!library.poll());

        let source = library.program_source(ProgramKey::Blur).unwrap();
        assert!(source.contains("struct PassUniforms"));
        assert!(library.program_source(ProgramKey::Tonemap).is_none());
    }

    #[test]
    fn embedded_library_is_complete_after_one_poll() {
        let mut library = ShaderLibrary::embedded();
        assert!(!library.is_complete());
        library.request(&ProgramKey::ALL);
        assert!(library.poll());
        assert!(library.missing().is_empty());
    }

    #[test]
    fn missing_file_is_reported_once_until_it_arrives() {
        let dir = tempfile::tempdir().unwrap();
        let mut provider = DirectoryShaders::new(dir.path());
        provider.request("ssao.wgsl");

        for _ in 0..3 {
            assert!(provider.poll().is_empty());
        }
        assert_eq!(provider.reported.len(), 1);
        assert_eq!(provider.pending, vec!["ssao.wgsl".to_string()]);

        std::fs::write(dir.path().join("ssao.wgsl"), "fn vs() {} fn fs() {}").unwrap();
        assert_eq!(provider.poll().len(), 1);
        assert!(provider.reported.is_empty());
        assert!(provider.pending.is_empty());
    }

    #[test]
    fn directory_reports_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blur.wgsl");
        std::fs::write(&path, "fn vs() {}").unwrap();

        let mut provider = DirectoryShaders::new(dir.path());
        provider.request("blur.wgsl");
        provider.request("missing.wgsl");
        let arrived = provider.poll();
        assert_eq!(arrived.len(), 1);
        assert!(provider.changed().is_empty());

        // Push the timestamp forward so coarse filesystem clocks still see a change.
        std::fs::write(&path, "fn vs() {} fn fs() {}").unwrap();
        let later = std::time::SystemTime::now() + std::time::Duration::from_secs(5);
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(later)
            .unwrap();

        assert_eq!(provider.changed(), vec!["blur.wgsl".to_string()]);
        assert!(provider.changed().is_empty());
    }
}
