//! Shader/material/plugin descriptions and schedule execution.

use crate::gfx::{BufferId, GpuDevice, ProgramId, Stage};
use crate::renderer::buffers::{
    LightingBuffers, MATERIAL_CONSTANTS_SLOT, PLUGIN_RESOURCES_SLOT,
};
use crate::renderer::handle::{Handle, Registry};
use crate::renderer::queue::DrawEntry;
use crate::renderer::schedule::{DrawSet, Schedule};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    /// Per-draw geometry pass; walks the set's draw commands.
    Forward,
    /// Single fullscreen resolve; ignores per-draw geometry.
    Deferred,
    /// Compute dispatch, no rasterization.
    Compute,
}

/// One stage of a shader. A pass that consumes lighting gets the cluster
/// buffers bound for its duration and cleared immediately after.
#[derive(Debug, Clone)]
pub struct Pass {
    pub program: ProgramId,
    pub kind: PassKind,
    pub needs_lighting: bool,
}

/// An ordered multi-pass shading technique.
#[derive(Debug, Clone)]
pub struct Shader {
    pub name: String,
    pub priority: i32,
    pub passes: Vec<Pass>,
}

impl Shader {
    pub fn needs_lighting(&self) -> bool {
        self.passes.iter().any(|pass| pass.needs_lighting)
    }
}

/// Shader binding plus optional per-material constants.
#[derive(Debug, Clone)]
pub struct Material {
    pub shader: Handle<Shader>,
    pub constants: Option<BufferId>,
}

/// Optional per-draw resource provider (instance data, skinning palettes).
#[derive(Debug, Clone)]
pub struct Plugin {
    pub name: String,
    pub resources: Option<BufferId>,
}

/// Executes a built schedule: priority buckets in ascending order, each draw
/// set running every pass of its shader before the next set starts.
pub fn execute_schedule(
    device: &dyn GpuDevice,
    schedule: &Schedule,
    entries: &[DrawEntry],
    shaders: &Registry<Shader>,
    materials: &Registry<Material>,
    plugins: &Registry<Plugin>,
    lighting: Option<&LightingBuffers>,
) {
    for sets in schedule.buckets.values() {
        for set in sets {
            run_shader_passes(device, set, entries, shaders, materials, plugins, lighting);
        }
    }
}

fn run_shader_passes(
    device: &dyn GpuDevice,
    set: &DrawSet,
    entries: &[DrawEntry],
    shaders: &Registry<Shader>,
    materials: &Registry<Material>,
    plugins: &Registry<Plugin>,
    lighting: Option<&LightingBuffers>,
) {
    let Some(shader) = shaders.get(set.shader) else {
        // build_schedule already dropped unresolvable runs
        return;
    };

    for pass in &shader.passes {
        device.bind_program(pass.program);

        let lighting = lighting.filter(|_| pass.needs_lighting);
        if let Some(buffers) = lighting {
            buffers.bind(device, Stage::Fragment);
        }

        match pass.kind {
            PassKind::Forward => {
                run_forward_pass(device, set, entries, materials, plugins);
            }
            PassKind::Deferred => device.draw_fullscreen(),
            PassKind::Compute => device.dispatch_compute(pass.program),
        }

        if let Some(buffers) = lighting {
            buffers.unbind(device, Stage::Fragment);
        }
    }
}

/// Walks the set's draw commands, rebinding material constants and plugin
/// resources only when they change between consecutive draws. The tracking
/// resets per pass, so the first draw of each pass always binds.
fn run_forward_pass(
    device: &dyn GpuDevice,
    set: &DrawSet,
    entries: &[DrawEntry],
    materials: &Registry<Material>,
    plugins: &Registry<Plugin>,
) {
    let mut last_material = None;
    let mut last_plugin = None;

    for entry in &entries[set.range.clone()] {
        if last_material != Some(entry.key.material) {
            last_material = Some(entry.key.material);
            let constants = materials
                .get(entry.key.material)
                .and_then(|material| material.constants);
            device.bind_constants(Stage::Fragment, MATERIAL_CONSTANTS_SLOT, constants);
        }

        if last_plugin != Some(entry.key.plugin) {
            last_plugin = Some(entry.key.plugin);
            let resources = entry
                .key
                .plugin
                .and_then(|plugin| plugins.get(plugin))
                .and_then(|plugin| plugin.resources);
            device.bind_resource(Stage::Vertex, PLUGIN_RESOURCES_SLOT, resources);
        }

        entry.command.execute(device);
    }
}
