//! Declarative render passes and the graph that runs them.
//!
//! A strategy describes each stage of its frame as a [`RenderPass`]: the program it runs,
//! the target it writes, the textures it samples on which units, and the passes that must
//! run before it. Passes live in a [`PassGraph`] and are executed on demand with
//! [`PassGraph::run`], which runs every dependency first.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐
//! │ normal/depth │   │ world pos    │ ...  geometry prepass (FullScene)
//! └──────┬───────┘   └──────┬───────┘
//!        └────────┬─────────┘
//!                 ▼
//!        ┌─────────────────┐  per light   ┌──────────────────────┐
//!        │ lighting        │◀────────────▶│ LightAccum ping/pong │
//!        └────────┬────────┘              └──────────────────────┘
//!                 ▼
//!        ┌─────────────────┐     ┌──────────────────┐
//!        │ tonemap         │────▶│ antialias/screen │
//!        └─────────────────┘     └──────────────────┘
//! ```
//!
//! # Ping-pong targets
//!
//! A pass that accumulates into a buffer cannot sample the buffer it writes. Such passes
//! name a [`PingPongPair`](crate::pipeline::PingPongPair) through [`TargetRef::PingPong`]
//! and pick a side relative to a counter: the `Current` side is `counter % 2`, the
//! `Other` side is `(counter + 1) % 2`. Advancing the counter swaps the roles without
//! rebuilding any pass.

mod context;
mod graph;
mod render_pass;
mod render_target;

pub use context::FrameContext;
pub use graph::{PassGraph, PassId};
pub use render_pass::{
    Counter, DepthTestSwitch, DrawMode, Placeholder, RenderPass, ScreenRect, Side, TargetRef,
    TextureInput, TextureSource,
};
pub use render_target::RenderTarget;
