//! Per-frame light records and their GPU-facing layouts.
//!
//! Records are built fresh each frame from visible entities, already
//! transformed into view space, and discarded at frame end. The `*Raw`
//! structs are the exact byte layouts of the three light storage buffers.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

#[derive(Clone, Copy, Debug)]
pub struct DirectionalLightRecord {
    /// View-space direction the light travels in (normalized).
    pub direction: Vec3,
    pub radiance: Vec3,
}

#[derive(Clone, Copy, Debug)]
pub struct PointLightRecord {
    /// View-space position.
    pub position: Vec3,
    pub radiance: Vec3,
    pub range: f32,
}

#[derive(Clone, Copy, Debug)]
pub struct SpotLightRecord {
    /// View-space position.
    pub position: Vec3,
    /// View-space direction (normalized).
    pub direction: Vec3,
    pub radiance: Vec3,
    pub range: f32,
    pub inner_angle: f32,
    pub outer_angle: f32,
    pub falloff: f32,
}

/// The frame's flat per-type light lists.
#[derive(Clone, Default)]
pub struct LightsData {
    directional: Vec<DirectionalLightRecord>,
    point: Vec<PointLightRecord>,
    spot: Vec<SpotLightRecord>,
}

impl LightsData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(
        directional: Vec<DirectionalLightRecord>,
        point: Vec<PointLightRecord>,
        spot: Vec<SpotLightRecord>,
    ) -> Self {
        Self {
            directional,
            point,
            spot,
        }
    }

    pub fn clear(&mut self) {
        self.directional.clear();
        self.point.clear();
        self.spot.clear();
    }

    pub fn add_directional(&mut self, light: DirectionalLightRecord) {
        self.directional.push(light);
    }

    pub fn add_point(&mut self, light: PointLightRecord) {
        self.point.push(light);
    }

    pub fn add_spot(&mut self, light: SpotLightRecord) {
        self.spot.push(light);
    }

    pub fn directional_lights(&self) -> &[DirectionalLightRecord] {
        &self.directional
    }

    pub fn point_lights(&self) -> &[PointLightRecord] {
        &self.point
    }

    pub fn spot_lights(&self) -> &[SpotLightRecord] {
        &self.spot
    }

    pub fn is_empty(&self) -> bool {
        self.directional.is_empty() && self.point.is_empty() && self.spot.is_empty()
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct DirectionalLightRaw {
    pub direction: [f32; 4],
    pub radiance: [f32; 4],
}

impl DirectionalLightRaw {
    pub fn from_record(record: &DirectionalLightRecord) -> Self {
        Self {
            direction: [
                record.direction.x,
                record.direction.y,
                record.direction.z,
                0.0,
            ],
            radiance: [record.radiance.x, record.radiance.y, record.radiance.z, 0.0],
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct PointLightRaw {
    pub position_range: [f32; 4],
    pub radiance: [f32; 4],
}

impl PointLightRaw {
    pub fn from_record(record: &PointLightRecord) -> Self {
        Self {
            position_range: [
                record.position.x,
                record.position.y,
                record.position.z,
                record.range,
            ],
            radiance: [record.radiance.x, record.radiance.y, record.radiance.z, 0.0],
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct SpotLightRaw {
    pub position_range: [f32; 4],
    pub direction_falloff: [f32; 4],
    pub radiance: [f32; 4],
    /// cos(inner), cos(outer), unused, unused
    pub cone_params: [f32; 4],
}

impl SpotLightRaw {
    pub fn from_record(record: &SpotLightRecord) -> Self {
        let mut inner = record.inner_angle;
        let mut outer = record.outer_angle;
        if inner > outer {
            std::mem::swap(&mut inner, &mut outer);
        }
        let cos_inner = inner.cos();
        let cos_outer = outer.cos();

        Self {
            position_range: [
                record.position.x,
                record.position.y,
                record.position.z,
                record.range,
            ],
            direction_falloff: [
                record.direction.x,
                record.direction.y,
                record.direction.z,
                record.falloff,
            ],
            radiance: [record.radiance.x, record.radiance.y, record.radiance.z, 0.0],
            cone_params: [cos_inner, cos_outer, 0.0, 0.0],
        }
    }
}

/// Constant block telling shaders how many lights and cluster indices the
/// frame produced.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct LightCountsUniform {
    /// directional, point, spot, total cluster index count
    pub counts: [u32; 4],
}

impl LightCountsUniform {
    pub fn new(lights: &LightsData, cluster_index_count: u32) -> Self {
        Self {
            counts: [
                lights.directional_lights().len() as u32,
                lights.point_lights().len() as u32,
                lights.spot_lights().len() as u32,
                cluster_index_count,
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spot_raw_swaps_reversed_cone_angles() {
        let record = SpotLightRecord {
            position: Vec3::new(1.0, 2.0, -3.0),
            direction: Vec3::NEG_Z,
            radiance: Vec3::ONE,
            range: 10.0,
            inner_angle: 0.8,
            outer_angle: 0.4,
            falloff: 2.0,
        };

        let raw = SpotLightRaw::from_record(&record);

        // cos is decreasing on [0, pi]: inner cone must keep the larger cosine
        assert!(raw.cone_params[0] >= raw.cone_params[1]);
        assert!((raw.cone_params[0] - 0.4f32.cos()).abs() < 1e-6);
        assert!((raw.cone_params[1] - 0.8f32.cos()).abs() < 1e-6);
        assert!((raw.direction_falloff[3] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn light_counts_mirror_list_lengths() {
        let mut lights = LightsData::new();
        lights.add_point(PointLightRecord {
            position: Vec3::ZERO,
            radiance: Vec3::ONE,
            range: 5.0,
        });
        lights.add_point(PointLightRecord {
            position: Vec3::X,
            radiance: Vec3::ONE,
            range: 5.0,
        });
        lights.add_directional(DirectionalLightRecord {
            direction: Vec3::NEG_Y,
            radiance: Vec3::ONE,
        });

        let counts = LightCountsUniform::new(&lights, 42);
        assert_eq!(counts.counts, [1, 2, 0, 42]);
    }

    #[test]
    fn raw_structs_are_tightly_packed_vec4s() {
        assert_eq!(std::mem::size_of::<DirectionalLightRaw>(), 32);
        assert_eq!(std::mem::size_of::<PointLightRaw>(), 32);
        assert_eq!(std::mem::size_of::<SpotLightRaw>(), 64);
        assert_eq!(std::mem::size_of::<LightCountsUniform>(), 16);
    }
}
