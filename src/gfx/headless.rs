//! Recording headless backend.
//!
//! Implements [`GpuDevice`] without any GPU: every call is appended to a log
//! and buffer capacities are tracked, which is exactly what the integration
//! tests need to observe binding order, rebinds, and growth behavior. It also
//! serves as a no-op backend for running the renderer in CI.

use std::ops::Range;
use std::sync::Mutex;

use super::{BufferDesc, BufferId, BufferUsage, GfxError, GpuDevice, ProgramId, Stage, TargetId};

/// One recorded device call. Payload bytes are reduced to lengths; the tests
/// care about ordering and sizing, not contents.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    CreateBuffer {
        label: &'static str,
        stride: u32,
        capacity: u32,
        usage: BufferUsage,
        id: BufferId,
    },
    GrowBuffer {
        id: BufferId,
        capacity: u32,
    },
    WriteBuffer {
        id: BufferId,
        offset: u64,
        len: usize,
    },
    BindProgram(ProgramId),
    BindResource {
        stage: Stage,
        slot: u32,
        buffer: Option<BufferId>,
    },
    BindConstants {
        stage: Stage,
        slot: u32,
        buffer: Option<BufferId>,
    },
    DrawIndexed {
        index_count: u32,
        base_vertex: i32,
        instances: Range<u32>,
    },
    DrawFullscreen,
    DispatchCompute(ProgramId),
    BeginTarget(Option<TargetId>),
    Present,
}

#[derive(Debug, Clone)]
struct BufferInfo {
    label: &'static str,
    stride: u32,
    capacity: u32,
}

#[derive(Default)]
struct State {
    buffers: Vec<BufferInfo>,
    calls: Vec<DeviceCall>,
    next_program: u32,
    fail_next_create: bool,
}

#[derive(Default)]
pub struct HeadlessDevice {
    state: Mutex<State>,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints a program id, standing in for the external shader compiler.
    pub fn register_program(&self, _label: &str) -> ProgramId {
        let mut state = self.state.lock().unwrap();
        let id = ProgramId(state.next_program);
        state.next_program += 1;
        id
    }

    /// Makes the next `create_buffer` fail, for exercising fatal-init paths.
    pub fn fail_next_create(&self) {
        self.state.lock().unwrap().fail_next_create = true;
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Drains the call log.
    pub fn take_calls(&self) -> Vec<DeviceCall> {
        std::mem::take(&mut self.state.lock().unwrap().calls)
    }

    /// Current capacity (in elements) of a live buffer.
    pub fn buffer_capacity(&self, id: BufferId) -> Option<u32> {
        let state = self.state.lock().unwrap();
        state.buffers.get(id.0 as usize).map(|b| b.capacity)
    }

    pub fn buffer_label(&self, id: BufferId) -> Option<&'static str> {
        let state = self.state.lock().unwrap();
        state.buffers.get(id.0 as usize).map(|b| b.label)
    }

    /// Element stride (in bytes) a live buffer was created with.
    pub fn buffer_stride(&self, id: BufferId) -> Option<u32> {
        let state = self.state.lock().unwrap();
        state.buffers.get(id.0 as usize).map(|b| b.stride)
    }

    fn record(&self, call: DeviceCall) {
        self.state.lock().unwrap().calls.push(call);
    }
}

impl GpuDevice for HeadlessDevice {
    fn create_buffer(&self, desc: &BufferDesc) -> Result<BufferId, GfxError> {
        let mut state = self.state.lock().unwrap();
        if std::mem::take(&mut state.fail_next_create) {
            return Err(GfxError::BufferCreation { label: desc.label });
        }
        let id = BufferId(state.buffers.len() as u32);
        state.buffers.push(BufferInfo {
            label: desc.label,
            stride: desc.stride,
            capacity: desc.capacity,
        });
        state.calls.push(DeviceCall::CreateBuffer {
            label: desc.label,
            stride: desc.stride,
            capacity: desc.capacity,
            usage: desc.usage,
            id,
        });
        Ok(id)
    }

    fn grow_buffer(&self, buffer: BufferId, capacity: u32) -> Result<(), GfxError> {
        let mut state = self.state.lock().unwrap();
        let info = state
            .buffers
            .get_mut(buffer.0 as usize)
            .ok_or(GfxError::UnknownBuffer(buffer))?;
        info.capacity = capacity;
        state.calls.push(DeviceCall::GrowBuffer {
            id: buffer,
            capacity,
        });
        Ok(())
    }

    fn write_buffer(&self, buffer: BufferId, offset: u64, bytes: &[u8]) {
        self.record(DeviceCall::WriteBuffer {
            id: buffer,
            offset,
            len: bytes.len(),
        });
    }

    fn bind_program(&self, program: ProgramId) {
        self.record(DeviceCall::BindProgram(program));
    }

    fn bind_resource(&self, stage: Stage, slot: u32, buffer: Option<BufferId>) {
        self.record(DeviceCall::BindResource {
            stage,
            slot,
            buffer,
        });
    }

    fn bind_constants(&self, stage: Stage, slot: u32, buffer: Option<BufferId>) {
        self.record(DeviceCall::BindConstants {
            stage,
            slot,
            buffer,
        });
    }

    fn draw_indexed(&self, index_count: u32, base_vertex: i32, instances: Range<u32>) {
        self.record(DeviceCall::DrawIndexed {
            index_count,
            base_vertex,
            instances,
        });
    }

    fn draw_fullscreen(&self) {
        self.record(DeviceCall::DrawFullscreen);
    }

    fn dispatch_compute(&self, program: ProgramId) {
        self.record(DeviceCall::DispatchCompute(program));
    }

    fn begin_target(&self, target: Option<TargetId>) {
        self.record(DeviceCall::BeginTarget(target));
    }

    fn present(&self) {
        self.record(DeviceCall::Present);
    }
}
