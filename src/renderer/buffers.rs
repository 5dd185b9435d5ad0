//! Persistent GPU-facing buffers.
//!
//! Buffers are grown, never shrunk, within a session; exceeding capacity is
//! the sole reallocation trigger. Old contents are not preserved across a
//! grow, which is fine because every buffer here is rewritten in full each
//! frame it is used.

use bytemuck::Pod;

use crate::gfx::{BufferDesc, BufferId, BufferUsage, GfxError, GpuDevice, Stage};
use crate::renderer::clusters::{ClusterGrid, ClusterRecord, CELL_COUNT};
use crate::renderer::lights::{
    DirectionalLightRaw, LightCountsUniform, LightsData, PointLightRaw, SpotLightRaw,
};

// Constant-block slots shared with shaders.
pub const FRAME_CONSTANTS_SLOT: u32 = 0;
pub const MATERIAL_CONSTANTS_SLOT: u32 = 1;
pub const LIGHT_COUNTS_SLOT: u32 = 2;

// Resource slots.
pub const PLUGIN_RESOURCES_SLOT: u32 = 0;
pub const DIRECTIONAL_LIGHTS_SLOT: u32 = 4;
pub const POINT_LIGHTS_SLOT: u32 = 5;
pub const SPOT_LIGHTS_SLOT: u32 = 6;
pub const CLUSTER_RECORDS_SLOT: u32 = 7;
pub const CLUSTER_INDICES_SLOT: u32 = 8;

const INITIAL_DIRECTIONAL_CAPACITY: u32 = 8;
const INITIAL_LIGHT_CAPACITY: u32 = 200;
const INITIAL_INDEX_CAPACITY: u32 = 4096;

/// A device buffer with tracked element capacity and grow-on-demand.
pub struct GrowableBuffer {
    id: BufferId,
    label: &'static str,
    capacity: u32,
}

impl GrowableBuffer {
    pub fn new(
        device: &dyn GpuDevice,
        label: &'static str,
        stride: u32,
        capacity: u32,
        usage: BufferUsage,
    ) -> Result<Self, GfxError> {
        let id = device.create_buffer(&BufferDesc {
            label,
            stride,
            capacity,
            usage,
        })?;
        Ok(Self {
            id,
            label,
            capacity,
        })
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Grows to at least `required` elements, doubling to amortize. Never
    /// shrinks.
    pub fn ensure_capacity(&mut self, device: &dyn GpuDevice, required: u32) -> Result<(), GfxError> {
        if required <= self.capacity {
            return Ok(());
        }
        let new_capacity = required.max(self.capacity.saturating_mul(2));
        log::info!(
            "Growing {}: {} -> {} elements",
            self.label,
            self.capacity,
            new_capacity
        );
        device.grow_buffer(self.id, new_capacity)?;
        self.capacity = new_capacity;
        Ok(())
    }

    pub fn write<T: Pod>(&self, device: &dyn GpuDevice, data: &[T]) {
        if data.is_empty() {
            return;
        }
        device.write_buffer(self.id, 0, bytemuck::cast_slice(data));
    }

    pub fn write_value<T: Pod>(&self, device: &dyn GpuDevice, value: &T) {
        device.write_buffer(self.id, 0, bytemuck::bytes_of(value));
    }
}

/// The cluster-lighting buffer set: three per-type light buffers, the cluster
/// record and index buffers, and the light-count constant block. Bound and
/// cleared as a unit around lighting-consuming passes.
pub struct LightingBuffers {
    directional: GrowableBuffer,
    point: GrowableBuffer,
    spot: GrowableBuffer,
    cluster_records: GrowableBuffer,
    cluster_indices: GrowableBuffer,
    light_counts: GrowableBuffer,
}

impl LightingBuffers {
    pub fn new(device: &dyn GpuDevice) -> Result<Self, GfxError> {
        Ok(Self {
            directional: GrowableBuffer::new(
                device,
                "DirectionalLights",
                std::mem::size_of::<DirectionalLightRaw>() as u32,
                INITIAL_DIRECTIONAL_CAPACITY,
                BufferUsage::MappableStructured,
            )?,
            point: GrowableBuffer::new(
                device,
                "PointLights",
                std::mem::size_of::<PointLightRaw>() as u32,
                INITIAL_LIGHT_CAPACITY,
                BufferUsage::MappableStructured,
            )?,
            spot: GrowableBuffer::new(
                device,
                "SpotLights",
                std::mem::size_of::<SpotLightRaw>() as u32,
                INITIAL_LIGHT_CAPACITY,
                BufferUsage::MappableStructured,
            )?,
            cluster_records: GrowableBuffer::new(
                device,
                "ClusterRecords",
                std::mem::size_of::<ClusterRecord>() as u32,
                CELL_COUNT as u32,
                BufferUsage::MappableStructured,
            )?,
            cluster_indices: GrowableBuffer::new(
                device,
                "ClusterIndices",
                std::mem::size_of::<u32>() as u32,
                INITIAL_INDEX_CAPACITY,
                BufferUsage::MappableStructured,
            )?,
            light_counts: GrowableBuffer::new(
                device,
                "LightCounts",
                std::mem::size_of::<LightCountsUniform>() as u32,
                1,
                BufferUsage::Constant,
            )?,
        })
    }

    /// Uploads the frame's lights and cluster data. All growth happens before
    /// any mapping; zero lights still write zeroed records and counts so the
    /// bound buffers are valid.
    pub fn upload(
        &mut self,
        device: &dyn GpuDevice,
        lights: &LightsData,
        grid: &ClusterGrid,
    ) -> Result<(), GfxError> {
        let directional: Vec<DirectionalLightRaw> = lights
            .directional_lights()
            .iter()
            .map(DirectionalLightRaw::from_record)
            .collect();
        let point: Vec<PointLightRaw> = lights
            .point_lights()
            .iter()
            .map(PointLightRaw::from_record)
            .collect();
        let spot: Vec<SpotLightRaw> = lights
            .spot_lights()
            .iter()
            .map(SpotLightRaw::from_record)
            .collect();

        self.directional
            .ensure_capacity(device, directional.len() as u32)?;
        self.point.ensure_capacity(device, point.len() as u32)?;
        self.spot.ensure_capacity(device, spot.len() as u32)?;
        self.cluster_indices
            .ensure_capacity(device, grid.total_index_count())?;

        self.directional.write(device, &directional);
        self.point.write(device, &point);
        self.spot.write(device, &spot);
        self.cluster_records.write(device, grid.records());
        self.cluster_indices.write(device, grid.indices());
        self.light_counts.write_value(
            device,
            &LightCountsUniform::new(lights, grid.total_index_count()),
        );
        Ok(())
    }

    pub fn bind(&self, device: &dyn GpuDevice, stage: Stage) {
        device.bind_resource(stage, DIRECTIONAL_LIGHTS_SLOT, Some(self.directional.id()));
        device.bind_resource(stage, POINT_LIGHTS_SLOT, Some(self.point.id()));
        device.bind_resource(stage, SPOT_LIGHTS_SLOT, Some(self.spot.id()));
        device.bind_resource(stage, CLUSTER_RECORDS_SLOT, Some(self.cluster_records.id()));
        device.bind_resource(stage, CLUSTER_INDICES_SLOT, Some(self.cluster_indices.id()));
        device.bind_constants(stage, LIGHT_COUNTS_SLOT, Some(self.light_counts.id()));
    }

    /// Explicitly clears every lighting slot so stale bindings cannot leak
    /// into unrelated passes.
    pub fn unbind(&self, device: &dyn GpuDevice, stage: Stage) {
        device.bind_resource(stage, DIRECTIONAL_LIGHTS_SLOT, None);
        device.bind_resource(stage, POINT_LIGHTS_SLOT, None);
        device.bind_resource(stage, SPOT_LIGHTS_SLOT, None);
        device.bind_resource(stage, CLUSTER_RECORDS_SLOT, None);
        device.bind_resource(stage, CLUSTER_INDICES_SLOT, None);
        device.bind_constants(stage, LIGHT_COUNTS_SLOT, None);
    }

    pub fn point_capacity(&self) -> u32 {
        self.point.capacity()
    }

    pub fn index_capacity(&self) -> u32 {
        self.cluster_indices.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::headless::{DeviceCall, HeadlessDevice};

    #[test]
    fn growth_doubles_and_never_shrinks() {
        let device = HeadlessDevice::new();
        let mut buffer = GrowableBuffer::new(
            &device,
            "Test",
            4,
            100,
            BufferUsage::MappableStructured,
        )
        .unwrap();

        buffer.ensure_capacity(&device, 50).unwrap();
        assert_eq!(buffer.capacity(), 100);

        buffer.ensure_capacity(&device, 150).unwrap();
        assert_eq!(buffer.capacity(), 200);

        // far over double: grows straight to the requirement
        buffer.ensure_capacity(&device, 1000).unwrap();
        assert_eq!(buffer.capacity(), 1000);

        buffer.ensure_capacity(&device, 10).unwrap();
        assert_eq!(buffer.capacity(), 1000);
    }

    #[test]
    fn empty_write_is_elided() {
        let device = HeadlessDevice::new();
        let buffer =
            GrowableBuffer::new(&device, "Test", 4, 8, BufferUsage::MappableStructured).unwrap();
        device.take_calls();

        buffer.write::<u32>(&device, &[]);
        assert!(device.calls().is_empty());

        buffer.write::<u32>(&device, &[1, 2, 3]);
        assert_eq!(
            device.calls(),
            vec![DeviceCall::WriteBuffer {
                id: buffer.id(),
                offset: 0,
                len: 12,
            }]
        );
    }

    #[test]
    fn unbind_clears_every_lighting_slot() {
        let device = HeadlessDevice::new();
        let buffers = LightingBuffers::new(&device).unwrap();
        device.take_calls();

        buffers.unbind(&device, Stage::Fragment);

        let calls = device.calls();
        assert_eq!(calls.len(), 6);
        for call in calls {
            match call {
                DeviceCall::BindResource { buffer, .. } => assert!(buffer.is_none()),
                DeviceCall::BindConstants { buffer, .. } => assert!(buffer.is_none()),
                other => panic!("unexpected call {other:?}"),
            }
        }
    }
}
