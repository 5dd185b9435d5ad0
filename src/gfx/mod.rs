//! Interface to the graphics-command submission primitive.
//!
//! The renderer core never talks to a concrete API; everything it needs from
//! the backend is expressed through [`GpuDevice`]: buffer creation/growth and
//! mapped writes, program binding, per-stage resource/constant binding, and
//! the three draw shapes (indexed, full-screen triangle, compute dispatch).

pub mod headless;

use std::ops::Range;

pub use headless::HeadlessDevice;

/// Opaque handle to a device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);

/// Opaque handle to a compiled shader program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u32);

/// Opaque handle to a render target. `None` in [`GpuDevice::begin_target`]
/// selects the default surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(pub u32);

/// Pipeline stage a resource or constant block is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Vertex,
    Fragment,
    Compute,
}

/// How a buffer is used by shaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Constant/uniform block.
    Constant,
    /// Shader-readable structured buffer.
    Structured,
    /// Structured buffer that is also CPU-mappable for per-frame writes.
    MappableStructured,
}

/// Creation parameters for a typed device buffer.
#[derive(Debug, Clone, Copy)]
pub struct BufferDesc {
    pub label: &'static str,
    /// Element stride in bytes.
    pub stride: u32,
    /// Capacity in elements.
    pub capacity: u32,
    pub usage: BufferUsage,
}

#[derive(Debug, thiserror::Error)]
pub enum GfxError {
    #[error("failed to create buffer '{label}'")]
    BufferCreation { label: &'static str },
    #[error("unknown buffer id {0:?}")]
    UnknownBuffer(BufferId),
}

/// The graphics-command submission primitive assumed by the renderer.
///
/// All methods take `&self`; implementations are expected to use interior
/// mutability so the device can be shared across the frame's worker threads.
pub trait GpuDevice: Send + Sync {
    /// Creates a buffer. Failure here is a fatal initialization error for
    /// anything the renderer owns persistently.
    fn create_buffer(&self, desc: &BufferDesc) -> Result<BufferId, GfxError>;

    /// Reallocates `buffer` to hold `capacity` elements. Old contents are not
    /// required to be preserved.
    fn grow_buffer(&self, buffer: BufferId, capacity: u32) -> Result<(), GfxError>;

    /// Writes `bytes` into a mappable buffer at `offset` bytes.
    fn write_buffer(&self, buffer: BufferId, offset: u64, bytes: &[u8]);

    fn bind_program(&self, program: ProgramId);

    /// Binds a structured buffer to `slot` of `stage`; `None` clears the slot.
    fn bind_resource(&self, stage: Stage, slot: u32, buffer: Option<BufferId>);

    /// Binds a constant block to `slot` of `stage`; `None` clears the slot.
    fn bind_constants(&self, stage: Stage, slot: u32, buffer: Option<BufferId>);

    fn draw_indexed(&self, index_count: u32, base_vertex: i32, instances: Range<u32>);

    /// Issues a single full-screen-triangle invocation.
    fn draw_fullscreen(&self);

    /// Runs a compute-style step. No geometry is invoked.
    fn dispatch_compute(&self, program: ProgramId);

    /// Switches the output target; `None` selects the default surface.
    fn begin_target(&self, target: Option<TargetId>);

    fn present(&self);
}
