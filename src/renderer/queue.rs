//! Frame-scoped draw-call queue.
//!
//! Scene processors submit concurrently during the collect broadcast; no
//! ordering exists among submitters. Ordering is imposed afterwards by the
//! batch scheduler, which sorts on [`DrawKey`].

use std::fmt;
use std::ops::Range;
use std::sync::Mutex;

use crate::gfx::GpuDevice;
use crate::renderer::handle::Handle;
use crate::renderer::passes::{Material, Plugin, Shader};

/// Composite sort key. Shader is the most expensive bind and sorts first,
/// then material, then plugin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawKey {
    pub shader: Handle<Shader>,
    pub material: Handle<Material>,
    pub plugin: Option<Handle<Plugin>>,
}

impl DrawKey {
    pub(crate) fn sort_key(&self) -> (usize, usize, usize) {
        (
            self.shader.index(),
            self.material.index(),
            // plugin-less draws sort ahead of any plugin
            self.plugin.map_or(0, |plugin| plugin.index() + 1),
        )
    }
}

/// The geometry submission a draw entry performs, as a tagged union rather
/// than a trait object hierarchy. `Callback` covers submissions the core
/// cannot express (multi-buffer setups, vendor extensions).
pub enum DrawCommand {
    Indexed {
        index_count: u32,
        base_vertex: i32,
        instances: Range<u32>,
    },
    Fullscreen,
    Callback(Box<dyn Fn(&dyn GpuDevice) + Send>),
}

impl DrawCommand {
    pub fn execute(&self, device: &dyn GpuDevice) {
        match self {
            DrawCommand::Indexed {
                index_count,
                base_vertex,
                instances,
            } => device.draw_indexed(*index_count, *base_vertex, instances.clone()),
            DrawCommand::Fullscreen => device.draw_fullscreen(),
            DrawCommand::Callback(callback) => callback(device),
        }
    }
}

impl fmt::Debug for DrawCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrawCommand::Indexed {
                index_count,
                base_vertex,
                instances,
            } => f
                .debug_struct("Indexed")
                .field("index_count", index_count)
                .field("base_vertex", base_vertex)
                .field("instances", instances)
                .finish(),
            DrawCommand::Fullscreen => f.write_str("Fullscreen"),
            DrawCommand::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

#[derive(Debug)]
pub struct DrawEntry {
    pub key: DrawKey,
    pub command: DrawCommand,
}

/// Append-only multi-writer queue, cleared at the start of every frame's
/// collection phase.
#[derive(Default)]
pub struct DrawQueue {
    entries: Mutex<Vec<DrawEntry>>,
}

impl DrawQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&self, key: DrawKey, command: DrawCommand) {
        self.entries.lock().unwrap().push(DrawEntry { key, command });
    }

    pub fn begin_frame(&self) {
        self.entries.lock().unwrap().clear();
    }

    /// Drains the frame's entries for scheduling.
    pub fn take(&self) -> Vec<DrawEntry> {
        std::mem::take(&mut *self.entries.lock().unwrap())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
