//! Whole-frame orchestration against the recording device.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use glam::{Mat4, Vec3};
use hecs::World;

use cluster_forward::gfx::headless::{DeviceCall, HeadlessDevice};
use cluster_forward::gfx::{BufferId, GpuDevice, TargetId};
use cluster_forward::renderer::buffers::POINT_LIGHTS_SLOT;
use cluster_forward::renderer::handle::Handle;
use cluster_forward::renderer::passes::{Material, Pass, PassKind, Plugin, Shader};
use cluster_forward::renderer::queue::DrawCommand;
use cluster_forward::renderer::renderer::{Filter, FrameContext, SceneProcessor};
use cluster_forward::scene::components::PointLight;
use cluster_forward::Renderer;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn camera() -> (Mat4, Mat4) {
    let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 0.0), Vec3::NEG_Z, Vec3::Y);
    let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
    (view, proj)
}

/// Submits one indexed draw per frame with a fixed plugin and material.
struct SingleDraw {
    plugin: Option<Handle<Plugin>>,
    material: Handle<Material>,
    frames: Arc<AtomicUsize>,
}

impl SceneProcessor for SingleDraw {
    fn collect_draw_calls(&mut self, ctx: &FrameContext<'_>) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        ctx.queue_draw_call(
            self.plugin,
            self.material,
            DrawCommand::Indexed {
                index_count: 3,
                base_vertex: 0,
                instances: 0..1,
            },
        );
    }
}

fn lit_renderer(device: &Arc<HeadlessDevice>) -> (Renderer, Handle<Material>, Handle<Plugin>) {
    let mut renderer = Renderer::new(device.clone() as Arc<dyn GpuDevice>).unwrap();
    let shader = renderer.add_shader(Shader {
        name: "lit".into(),
        priority: 0,
        passes: vec![Pass {
            program: device.register_program("lit"),
            kind: PassKind::Forward,
            needs_lighting: true,
        }],
    });
    let material = renderer.add_material(Material {
        shader,
        constants: None,
    });
    let plugin = renderer.add_plugin(Plugin {
        name: "static-mesh".into(),
        resources: None,
    });
    (renderer, material, plugin)
}

fn buffer_named(device: &HeadlessDevice, name: &str) -> BufferId {
    device
        .calls()
        .iter()
        .find_map(|call| match call {
            DeviceCall::CreateBuffer { label, id, .. } if *label == name => Some(*id),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no buffer named {name}"))
}

/// With a lit pass scheduled but no lights in the world, the cluster buffers
/// are still uploaded and bound; every count is simply zero.
#[test]
fn lit_frame_without_lights_binds_zeroed_clusters() {
    init_logging();
    let device = Arc::new(HeadlessDevice::new());
    let (mut renderer, material, plugin) = lit_renderer(&device);
    let frames = Arc::new(AtomicUsize::new(0));
    renderer.add_processor(Box::new(SingleDraw {
        plugin: Some(plugin),
        material,
        frames: frames.clone(),
    }));

    let world = World::new();
    let (view, proj) = camera();
    device.take_calls();
    renderer
        .render(&world, view, proj, 0.1, 100.0, &[], None)
        .unwrap();

    assert_eq!(frames.load(Ordering::Relaxed), 1);
    assert_eq!(renderer.cluster_grid().total_index_count(), 0);
    assert!(renderer
        .cluster_grid()
        .records()
        .iter()
        .all(|record| record.point_count == 0 && record.spot_count == 0));

    let bound_points = device.calls().iter().any(|call| {
        matches!(
            call,
            DeviceCall::BindResource {
                slot: POINT_LIGHTS_SLOT,
                buffer: Some(_),
                ..
            }
        )
    });
    assert!(bound_points, "cluster buffers bind even with zero lights");
}

/// Spawning more point lights than the initial buffer capacity grows the
/// buffer before the frame's write.
#[test]
fn light_overflow_grows_the_point_buffer() {
    init_logging();
    let device = Arc::new(HeadlessDevice::new());
    let (mut renderer, material, plugin) = lit_renderer(&device);
    renderer.add_processor(Box::new(SingleDraw {
        plugin: Some(plugin),
        material,
        frames: Arc::new(AtomicUsize::new(0)),
    }));
    let point_buffer = buffer_named(&device, "PointLights");
    let initial_capacity = device.buffer_capacity(point_buffer).unwrap();

    let mut world = World::new();
    for i in 0..(initial_capacity + 100) {
        world.spawn((
            PointLight {
                radiance: Vec3::ONE,
                range: 1.0,
            },
            cluster_forward::scene::TransformComponent(
                cluster_forward::scene::Transform::from_trs(
                    Vec3::new((i % 10) as f32 - 5.0, 0.0, -((i / 10) as f32) - 5.0),
                    glam::Quat::IDENTITY,
                    Vec3::ONE,
                ),
            ),
        ));
    }

    let (view, proj) = camera();
    device.take_calls();
    renderer
        .render(&world, view, proj, 0.1, 100.0, &[], None)
        .unwrap();

    let final_capacity = device.buffer_capacity(point_buffer).unwrap();
    assert!(final_capacity >= initial_capacity + 100);

    // growth must precede the write that needs it
    let calls = device.calls();
    let grow_at = calls
        .iter()
        .position(|c| matches!(c, DeviceCall::GrowBuffer { id, .. } if *id == point_buffer))
        .expect("point buffer grew");
    let write_at = calls
        .iter()
        .position(|c| matches!(c, DeviceCall::WriteBuffer { id, .. } if *id == point_buffer))
        .expect("point buffer written");
    assert!(grow_at < write_at);
}

/// Frames whose scheduled shaders never consume lighting skip collection,
/// assignment, and upload entirely.
#[test]
fn unlit_frame_skips_all_light_work() {
    init_logging();
    let device = Arc::new(HeadlessDevice::new());
    let mut renderer = Renderer::new(device.clone() as Arc<dyn GpuDevice>).unwrap();
    let shader = renderer.add_shader(Shader {
        name: "unlit".into(),
        priority: 0,
        passes: vec![Pass {
            program: device.register_program("unlit"),
            kind: PassKind::Forward,
            needs_lighting: false,
        }],
    });
    let material = renderer.add_material(Material {
        shader,
        constants: None,
    });
    let plugin = renderer.add_plugin(Plugin {
        name: "static-mesh".into(),
        resources: None,
    });
    renderer.add_processor(Box::new(SingleDraw {
        plugin: Some(plugin),
        material,
        frames: Arc::new(AtomicUsize::new(0)),
    }));
    let point_buffer = buffer_named(&device, "PointLights");

    let mut world = World::new();
    world.spawn((PointLight {
        radiance: Vec3::ONE,
        range: 5.0,
    },));

    let (view, proj) = camera();
    device.take_calls();
    renderer
        .render(&world, view, proj, 0.1, 100.0, &[], None)
        .unwrap();

    for call in device.calls() {
        match call {
            DeviceCall::WriteBuffer { id, .. } => assert_ne!(id, point_buffer),
            DeviceCall::BindResource {
                slot, buffer: Some(_), ..
            } => assert_ne!(slot, POINT_LIGHTS_SLOT),
            _ => {}
        }
    }
}

/// Filters run after the scheduled passes, in registration order, before the
/// composite.
#[test]
fn filters_run_in_order_before_the_composite() {
    init_logging();
    let device = Arc::new(HeadlessDevice::new());
    let mut renderer = Renderer::new(device.clone() as Arc<dyn GpuDevice>).unwrap();
    let composite = device.register_program("composite");
    renderer.set_composite_program(Some(composite));

    struct NamedFilter {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }
    impl Filter for NamedFilter {
        fn name(&self) -> &str {
            self.name
        }
        fn apply(&self, device: &dyn GpuDevice) {
            self.log.lock().unwrap().push(self.name);
            device.draw_fullscreen();
        }
    }

    let log = Arc::new(Mutex::new(Vec::new()));
    let filters: Vec<Box<dyn Filter>> = vec![
        Box::new(NamedFilter {
            name: "bloom",
            log: log.clone(),
        }),
        Box::new(NamedFilter {
            name: "tonemap",
            log: log.clone(),
        }),
    ];

    let world = World::new();
    let (view, proj) = camera();
    device.take_calls();
    renderer
        .render(&world, view, proj, 0.1, 100.0, &filters, Some(TargetId(7)))
        .unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["bloom", "tonemap"]);

    // tail of the frame: retarget, composite, present
    let calls = device.calls();
    let tail_start = calls
        .iter()
        .position(|c| *c == DeviceCall::BeginTarget(Some(TargetId(7))))
        .expect("frame retargets to the output");
    assert_eq!(
        &calls[tail_start..],
        &[
            DeviceCall::BeginTarget(Some(TargetId(7))),
            DeviceCall::BindProgram(composite),
            DeviceCall::DrawFullscreen,
            DeviceCall::Present,
        ]
    );
}

/// Stale material handles make `queue_draw_call` a no-op instead of
/// poisoning the frame.
#[test]
fn stale_material_handles_are_dropped_silently() {
    init_logging();
    let device = Arc::new(HeadlessDevice::new());
    let mut renderer = Renderer::new(device.clone() as Arc<dyn GpuDevice>).unwrap();
    let plugin = renderer.add_plugin(Plugin {
        name: "static-mesh".into(),
        resources: None,
    });
    let frames = Arc::new(AtomicUsize::new(0));
    renderer.add_processor(Box::new(SingleDraw {
        plugin: Some(plugin),
        material: Handle::new(12),
        frames: frames.clone(),
    }));

    let world = World::new();
    let (view, proj) = camera();
    device.take_calls();
    renderer
        .render(&world, view, proj, 0.1, 100.0, &[], None)
        .unwrap();

    assert_eq!(frames.load(Ordering::Relaxed), 1, "the processor still ran");
    assert!(!device
        .calls()
        .iter()
        .any(|c| matches!(c, DeviceCall::DrawIndexed { .. })));
}

/// Submitting without a plugin handle is a no-op, even when the material and
/// its shader resolve fine.
#[test]
fn missing_plugin_handle_drops_the_submission() {
    init_logging();
    let device = Arc::new(HeadlessDevice::new());
    let (mut renderer, material, _plugin) = lit_renderer(&device);
    let frames = Arc::new(AtomicUsize::new(0));
    renderer.add_processor(Box::new(SingleDraw {
        plugin: None,
        material,
        frames: frames.clone(),
    }));

    let world = World::new();
    let (view, proj) = camera();
    device.take_calls();
    renderer
        .render(&world, view, proj, 0.1, 100.0, &[], None)
        .unwrap();

    assert_eq!(frames.load(Ordering::Relaxed), 1, "the processor still ran");
    assert!(!device
        .calls()
        .iter()
        .any(|c| matches!(c, DeviceCall::DrawIndexed { .. })));
}

/// A second frame reuses the same buffers and produces a fresh present.
#[test]
fn consecutive_frames_are_independent() {
    init_logging();
    let device = Arc::new(HeadlessDevice::new());
    let (mut renderer, material, plugin) = lit_renderer(&device);
    let frames = Arc::new(AtomicUsize::new(0));
    renderer.add_processor(Box::new(SingleDraw {
        plugin: Some(plugin),
        material,
        frames: frames.clone(),
    }));

    let mut world = World::new();
    world.spawn((PointLight {
        radiance: Vec3::ONE,
        range: 5.0,
    },));
    let (view, proj) = camera();

    for _ in 0..3 {
        renderer
            .render(&world, view, proj, 0.1, 100.0, &[], None)
            .unwrap();
    }

    assert_eq!(frames.load(Ordering::Relaxed), 3);
    let presents = device
        .calls()
        .iter()
        .filter(|c| matches!(c, DeviceCall::Present))
        .count();
    assert_eq!(presents, 3);
    let draws = device
        .calls()
        .iter()
        .filter(|c| matches!(c, DeviceCall::DrawIndexed { .. }))
        .count();
    assert_eq!(draws, 3, "one queued draw per frame, none carried over");
}
