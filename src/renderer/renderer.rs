//! Frame orchestration.
//!
//! [`Renderer::render`] runs one frame end to end: frame constants, the
//! collect broadcast, scheduling, the lighting stage (skipped entirely when
//! no scheduled pass consumes lights), pass execution, post filters, and the
//! composite to the output target.

use std::sync::Arc;
use std::time::Instant;

use glam::Mat4;
use hecs::World;
use thiserror::Error;

use crate::gfx::{BufferUsage, GfxError, GpuDevice, ProgramId, Stage, TargetId};
use crate::renderer::buffers::{GrowableBuffer, LightingBuffers, FRAME_CONSTANTS_SLOT};
use crate::renderer::clusters::{ClusterGrid, ClusterParams};
use crate::renderer::handle::{Handle, Registry};
use crate::renderer::passes::{execute_schedule, Material, Plugin, Shader};
use crate::renderer::queue::{DrawCommand, DrawKey, DrawQueue};
use crate::renderer::schedule::build_schedule;
use crate::renderer::uniforms::FrameConstants;
use crate::scene::lights::collect_lights;

/// Threads in the renderer's worker pool. Light collection, cluster
/// assignment, and the schedule sort all run on these workers.
pub const WORKER_COUNT: usize = 3;

#[derive(Debug, Error)]
pub enum RendererError {
    /// A required resource could not be created at startup.
    #[error("renderer initialization failed: {0}")]
    Init(GfxError),
    #[error("worker pool construction failed: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    /// A device operation failed mid-frame (buffer growth, typically).
    #[error(transparent)]
    Gfx(#[from] GfxError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessorId(u64);

/// A draw-call producer. Processors are broadcast to once per frame, after
/// frame constants are written and before scheduling.
pub trait SceneProcessor: Send {
    fn collect_draw_calls(&mut self, ctx: &FrameContext<'_>);
}

/// Everything a processor may consult while producing draw calls. Submission
/// goes through [`FrameContext::queue_draw_call`]; processors never touch the
/// device.
pub struct FrameContext<'a> {
    queue: &'a DrawQueue,
    materials: &'a Registry<Material>,
    shaders: &'a Registry<Shader>,
    pub world: &'a World,
    pub view: Mat4,
    pub proj: Mat4,
}

impl FrameContext<'_> {
    /// Queues a draw. A missing plugin handle, a material handle that does
    /// not resolve, or a material whose shader does not resolve all make this
    /// a silent no-op; a processor built against stale handles cannot poison
    /// the frame.
    pub fn queue_draw_call(
        &self,
        plugin: Option<Handle<Plugin>>,
        material: Handle<Material>,
        command: DrawCommand,
    ) {
        let Some(plugin) = plugin else {
            log::debug!("dropping draw call: no plugin handle");
            return;
        };
        let Some(resolved) = self.materials.get(material) else {
            log::debug!("dropping draw call: unknown material {material:?}");
            return;
        };
        if self.shaders.get(resolved.shader).is_none() {
            log::debug!(
                "dropping draw call: material {material:?} references unknown shader {:?}",
                resolved.shader
            );
            return;
        }
        self.queue.submit(
            DrawKey {
                shader: resolved.shader,
                material,
                plugin: Some(plugin),
            },
            command,
        );
    }
}

/// Fullscreen post effect, run after all scheduled passes in registration
/// order.
pub trait Filter: Send {
    fn name(&self) -> &str;
    fn apply(&self, device: &dyn GpuDevice);
}

pub struct Renderer {
    device: Arc<dyn GpuDevice>,
    pool: rayon::ThreadPool,
    shaders: Registry<Shader>,
    materials: Registry<Material>,
    plugins: Registry<Plugin>,
    queue: DrawQueue,
    grid: ClusterGrid,
    lighting: LightingBuffers,
    frame_constants: GrowableBuffer,
    composite_program: Option<ProgramId>,
    processors: Vec<(ProcessorId, Box<dyn SceneProcessor>)>,
    next_processor_id: u64,
    started: Instant,
    last_frame: Instant,
    frame_index: u32,
}

impl Renderer {
    pub fn new(device: Arc<dyn GpuDevice>) -> Result<Self, RendererError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(WORKER_COUNT)
            .thread_name(|i| format!("render-worker-{i}"))
            .build()?;
        Self::with_pool(device, pool)
    }

    pub fn with_pool(
        device: Arc<dyn GpuDevice>,
        pool: rayon::ThreadPool,
    ) -> Result<Self, RendererError> {
        let lighting = LightingBuffers::new(device.as_ref()).map_err(RendererError::Init)?;
        let frame_constants = GrowableBuffer::new(
            device.as_ref(),
            "FrameConstants",
            std::mem::size_of::<FrameConstants>() as u32,
            1,
            BufferUsage::Constant,
        )
        .map_err(RendererError::Init)?;

        let now = Instant::now();
        Ok(Self {
            device,
            pool,
            shaders: Registry::new(),
            materials: Registry::new(),
            plugins: Registry::new(),
            queue: DrawQueue::new(),
            grid: ClusterGrid::new(),
            lighting,
            frame_constants,
            composite_program: None,
            processors: Vec::new(),
            next_processor_id: 0,
            started: now,
            last_frame: now,
            frame_index: 0,
        })
    }

    pub fn add_shader(&mut self, shader: Shader) -> Handle<Shader> {
        self.shaders.add(shader)
    }

    pub fn add_material(&mut self, material: Material) -> Handle<Material> {
        self.materials.add(material)
    }

    pub fn add_plugin(&mut self, plugin: Plugin) -> Handle<Plugin> {
        self.plugins.add(plugin)
    }

    /// Program for the final blit to the output target. Without one, the
    /// frame's passes are presented as-is.
    pub fn set_composite_program(&mut self, program: Option<ProgramId>) {
        self.composite_program = program;
    }

    pub fn add_processor(&mut self, processor: Box<dyn SceneProcessor>) -> ProcessorId {
        let id = ProcessorId(self.next_processor_id);
        self.next_processor_id += 1;
        self.processors.push((id, processor));
        id
    }

    pub fn remove_processor(&mut self, id: ProcessorId) -> bool {
        let before = self.processors.len();
        self.processors.retain(|(pid, _)| *pid != id);
        self.processors.len() != before
    }

    pub fn cluster_grid(&self) -> &ClusterGrid {
        &self.grid
    }

    pub fn lighting_buffers(&self) -> &LightingBuffers {
        &self.lighting
    }

    /// Renders one frame of `world` into `target` (`None` for the default
    /// backbuffer).
    pub fn render(
        &mut self,
        world: &World,
        view: Mat4,
        proj: Mat4,
        near: f32,
        far: f32,
        filters: &[Box<dyn Filter>],
        target: Option<TargetId>,
    ) -> Result<(), RendererError> {
        let device = Arc::clone(&self.device);
        let now = Instant::now();
        let constants = FrameConstants::new(
            view,
            proj,
            near,
            far,
            now.duration_since(self.started).as_secs_f32(),
            now.duration_since(self.last_frame).as_secs_f32(),
            self.frame_index,
        );
        self.last_frame = now;
        self.frame_constants.write_value(device.as_ref(), &constants);
        for stage in [Stage::Vertex, Stage::Fragment, Stage::Compute] {
            device.bind_constants(stage, FRAME_CONSTANTS_SLOT, Some(self.frame_constants.id()));
        }

        // Collect broadcast. Processors are moved out so the context can
        // borrow the registries while each processor is called mutably.
        self.queue.begin_frame();
        let mut processors = std::mem::take(&mut self.processors);
        {
            let ctx = FrameContext {
                queue: &self.queue,
                materials: &self.materials,
                shaders: &self.shaders,
                world,
                view,
                proj,
            };
            for (_, processor) in &mut processors {
                processor.collect_draw_calls(&ctx);
            }
        }
        self.processors = processors;

        let mut entries = self.queue.take();
        let schedule = build_schedule(&mut entries, &self.shaders, &self.pool);

        // Lighting stage, gated on the schedule actually consuming lights.
        let lighting_active = schedule.lighting_required;
        if lighting_active {
            let params = ClusterParams::new(proj, near, far);
            let lights = self.pool.install(|| collect_lights(world, view));
            self.grid.assign(&lights, &params, &self.pool);
            self.lighting.upload(device.as_ref(), &lights, &self.grid)?;
        }

        device.begin_target(None);
        execute_schedule(
            device.as_ref(),
            &schedule,
            &entries,
            &self.shaders,
            &self.materials,
            &self.plugins,
            lighting_active.then_some(&self.lighting),
        );

        for filter in filters {
            log::trace!("applying filter {}", filter.name());
            filter.apply(device.as_ref());
        }

        device.begin_target(target);
        if let Some(program) = self.composite_program {
            device.bind_program(program);
            device.draw_fullscreen();
        }
        device.present();

        self.frame_index = self.frame_index.wrapping_add(1);
        Ok(())
    }
}
