//! Pulls light components out of the world into flat view-space records.
//!
//! The three light types are independent, so they are collected as parallel
//! tasks. Call [`collect_lights`] from inside the renderer's worker pool to
//! keep the tasks on its threads.

use glam::{Mat4, Vec3};
use hecs::World;

use crate::renderer::lights::{
    DirectionalLightRecord, LightsData, PointLightRecord, SpotLightRecord,
};
use crate::scene::components::{DirectionalLight, PointLight, SpotLight, TransformComponent};

fn safe_normalize(v: Vec3, fallback: Vec3) -> Vec3 {
    v.try_normalize().unwrap_or(fallback)
}

fn world_position(transform: Option<&TransformComponent>) -> Vec3 {
    transform.map_or(Vec3::ZERO, |t| t.0.translation)
}

/// A light aims along its transform's -Z axis, matching the camera.
fn world_direction(transform: Option<&TransformComponent>) -> Vec3 {
    transform.map_or(Vec3::NEG_Z, |t| t.0.forward())
}

pub fn collect_directional_lights(world: &World, view: Mat4) -> Vec<DirectionalLightRecord> {
    world
        .query::<(&DirectionalLight, Option<&TransformComponent>)>()
        .iter()
        .map(|(_, (light, transform))| DirectionalLightRecord {
            direction: safe_normalize(
                view.transform_vector3(world_direction(transform)),
                Vec3::NEG_Z,
            ),
            radiance: light.radiance,
        })
        .collect()
}

pub fn collect_point_lights(world: &World, view: Mat4) -> Vec<PointLightRecord> {
    world
        .query::<(&PointLight, Option<&TransformComponent>)>()
        .iter()
        .map(|(_, (light, transform))| PointLightRecord {
            position: view.transform_point3(world_position(transform)),
            radiance: light.radiance,
            range: light.range,
        })
        .collect()
}

pub fn collect_spot_lights(world: &World, view: Mat4) -> Vec<SpotLightRecord> {
    world
        .query::<(&SpotLight, Option<&TransformComponent>)>()
        .iter()
        .map(|(_, (light, transform))| SpotLightRecord {
            position: view.transform_point3(world_position(transform)),
            direction: safe_normalize(
                view.transform_vector3(world_direction(transform)),
                Vec3::NEG_Z,
            ),
            radiance: light.radiance,
            range: light.range,
            inner_angle: light.inner_angle,
            outer_angle: light.outer_angle,
            falloff: light.falloff,
        })
        .collect()
}

/// Collects all three light lists as parallel tasks.
pub fn collect_lights(world: &World, view: Mat4) -> LightsData {
    let (directional, (point, spot)) = rayon::join(
        || collect_directional_lights(world, view),
        || {
            rayon::join(
                || collect_point_lights(world, view),
                || collect_spot_lights(world, view),
            )
        },
    );
    LightsData::from_parts(directional, point, spot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;
    use crate::scene::transform::Transform;

    #[test]
    fn positions_land_in_view_space() {
        let mut world = World::new();
        world.spawn((
            PointLight {
                radiance: Vec3::ONE,
                range: 5.0,
            },
            TransformComponent(Transform::from_trs(
                Vec3::new(0.0, 0.0, -10.0),
                Quat::IDENTITY,
                Vec3::ONE,
            )),
        ));

        // camera at origin looking down -Z: view is identity
        let lights = collect_point_lights(&world, Mat4::IDENTITY);
        assert_eq!(lights.len(), 1);
        assert!((lights[0].position - Vec3::new(0.0, 0.0, -10.0)).length() < 1e-6);

        // camera shifted back 5 units: light moves 5 closer in view space
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, 4.0), Vec3::Y);
        let lights = collect_point_lights(&world, view);
        assert!((lights[0].position - Vec3::new(0.0, 0.0, -15.0)).length() < 1e-5);
    }

    #[test]
    fn missing_transform_defaults_to_origin_and_forward() {
        let mut world = World::new();
        world.spawn((DirectionalLight { radiance: Vec3::ONE },));
        world.spawn((SpotLight {
            radiance: Vec3::ONE,
            range: 3.0,
            inner_angle: 0.2,
            outer_angle: 0.4,
            falloff: 1.0,
        },));

        let directional = collect_directional_lights(&world, Mat4::IDENTITY);
        assert_eq!(directional[0].direction, Vec3::NEG_Z);

        let spots = collect_spot_lights(&world, Mat4::IDENTITY);
        assert_eq!(spots[0].position, Vec3::ZERO);
        assert_eq!(spots[0].direction, Vec3::NEG_Z);
    }

    #[test]
    fn collect_gathers_every_light_type() {
        let mut world = World::new();
        world.spawn((DirectionalLight { radiance: Vec3::ONE },));
        for i in 0..4 {
            world.spawn((PointLight {
                radiance: Vec3::ONE,
                range: i as f32,
            },));
        }
        world.spawn((SpotLight {
            radiance: Vec3::ONE,
            range: 3.0,
            inner_angle: 0.2,
            outer_angle: 0.4,
            falloff: 1.0,
        },));

        let lights = collect_lights(&world, Mat4::IDENTITY);
        assert_eq!(lights.directional_lights().len(), 1);
        assert_eq!(lights.point_lights().len(), 4);
        assert_eq!(lights.spot_lights().len(), 1);
    }
}
