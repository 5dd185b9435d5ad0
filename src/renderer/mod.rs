pub mod buffers;
pub mod clusters;
pub mod handle;
pub mod lights;
pub mod passes;
pub mod queue;
pub mod schedule;
#[allow(clippy::module_inception)]
pub mod renderer;
pub mod uniforms;

pub use handle::{Handle, Registry};
pub use passes::{Material, Pass, PassKind, Plugin, Shader};
pub use queue::{DrawCommand, DrawKey, DrawQueue};
pub use renderer::{Filter, FrameContext, Renderer, RendererError, SceneProcessor};
