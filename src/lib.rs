//! Clustered forward/deferred rendering core.
//!
//! Lights are collected from a [`hecs`] world into view space, assigned to a
//! fixed 16x8x24 screen-aligned cluster grid, and uploaded as flat GPU
//! buffers. Draw calls are queued concurrently by scene processors, sorted
//! into shader runs, bucketed by shader priority, and executed against an
//! abstract [`gfx::GpuDevice`]. The whole pipeline runs headless for tests
//! via [`gfx::headless::HeadlessDevice`].

pub mod gfx;
pub mod renderer;
pub mod scene;

pub use renderer::{Renderer, RendererError};
