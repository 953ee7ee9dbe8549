//! A CPU-only device. Memory is bookkeeping, device addresses are fake but unique, and
//! uploads land in host vectors so their content can be inspected.

mod descriptor_allocator;
mod recorder;

pub use descriptor_allocator::HeadlessDescriptorAllocator;
pub use recorder::{HeadlessRecorder, RecordedCommand};

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use raven_math::min_value_align_to_u64;

use crate::backend::BuildInputTranslator;
use crate::accel::ContainerLevel;
use crate::buffer::{Buffer, BufferDesc};
use crate::config::RayTracingConfig;
use crate::device::{
    Device, DeviceAddress, MemoryAllocation, MemoryKind, PrebuildSizes, RayTracingProperties,
    ResourceState, Serial,
};
use crate::error::{RtError, RtResult};

const ADDRESS_BASE: DeviceAddress = 0x1_0000;
const ADDRESS_ALIGNMENT: u64 = 256;
const ACCELERATION_STRUCTURE_ALIGNMENT: u64 = 256;

#[derive(Default)]
struct HeadlessDeviceState {
    live_allocations: HashMap<u64, MemoryAllocation>,
    buffer_contents: HashMap<u64, Vec<u8>>,
    allocation_count: usize,
    upload_count: usize,
    /// Number of allocations still allowed to succeed, unlimited when `None`.
    allocation_budget: Option<usize>,
}

pub struct HeadlessDevice<B: BuildInputTranslator> {
    config: RayTracingConfig,
    next_address: AtomicU64,
    next_id: AtomicU64,
    pending_serial: AtomicU64,
    state: Mutex<HeadlessDeviceState>,
    _backend: PhantomData<fn() -> B>,
}

impl<B: BuildInputTranslator> HeadlessDevice<B> {
    pub fn new(config: RayTracingConfig) -> Arc<Self> {
        glog::trace!("Created headless {} device", B::NAME);

        Arc::new(Self {
            config,
            next_address: AtomicU64::new(ADDRESS_BASE),
            next_id: AtomicU64::new(1),
            pending_serial: AtomicU64::new(1),
            state: Mutex::new(HeadlessDeviceState::default()),
            _backend: PhantomData,
        })
    }

    pub fn config(&self) -> &RayTracingConfig {
        &self.config
    }

    /// Retire the pending submission and return the new pending serial.
    pub fn submit(&self) -> Serial {
        self.pending_serial.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Let `count` more allocations succeed, then fail every following one.
    pub fn fail_allocations_after(&self, count: usize) {
        self.state.lock().allocation_budget = Some(count);
    }

    pub fn live_allocation_count(&self) -> usize {
        self.state.lock().live_allocations.len()
    }

    pub fn allocation_count(&self) -> usize {
        self.state.lock().allocation_count
    }

    pub fn upload_count(&self) -> usize {
        self.state.lock().upload_count
    }

    pub fn buffer_contents(&self, buffer: &Buffer) -> Option<Vec<u8>> {
        self.state.lock().buffer_contents.get(&buffer.id()).cloned()
    }

    fn reserve_address_range(&self, size: u64) -> DeviceAddress {
        let size = min_value_align_to_u64(size.max(1), ADDRESS_ALIGNMENT);
        self.next_address.fetch_add(size, Ordering::AcqRel)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::AcqRel)
    }
}

impl<B: BuildInputTranslator> Device for HeadlessDevice<B> {
    type Backend = B;

    fn is_ray_tracing_supported(&self) -> bool {
        self.config.ray_tracing_supported
    }

    fn ray_tracing_properties(&self) -> RayTracingProperties {
        self.config.ray_tracing_properties()
    }

    fn allocate_device_memory(
        &self,
        kind: MemoryKind,
        byte_size: u64,
        initial_state: ResourceState,
        name: &str,
    ) -> RtResult<MemoryAllocation> {
        let mut state = self.state.lock();

        if byte_size == 0 {
            return Err(RtError::exhausted(format!("Refusing to allocate zero bytes for {}", name)));
        }

        if let Some(budget) = state.allocation_budget.as_mut() {
            if *budget == 0 {
                return Err(RtError::exhausted(format!(
                    "Out of device memory allocating {} bytes for {}", byte_size, name
                )));
            }
            *budget -= 1;
        }

        let allocation = MemoryAllocation {
            id: self.next_id(),
            kind,
            size: byte_size,
            device_address: self.reserve_address_range(byte_size),
            initial_state,
        };

        state.allocation_count += 1;
        state.live_allocations.insert(allocation.id, allocation.clone());

        Ok(allocation)
    }

    fn free_device_memory(&self, allocation: MemoryAllocation) {
        if self.state.lock().live_allocations.remove(&allocation.id).is_none() {
            glog::warn!("Freeing unknown device memory allocation {}", allocation.id);
        }
    }

    fn query_prebuild_sizes(&self, inputs: &B::BuildInputs) -> PrebuildSizes {
        let summary = B::summarize(inputs);
        let scratch_alignment = self.config.min_scratch_offset_alignment;

        let (node_size, scratch_per_primitive) = match summary.level {
            ContainerLevel::Bottom => (64, 32),
            ContainerLevel::Top => (128, 64),
        };

        let update_scratch_size = if summary.allow_update {
            min_value_align_to_u64(128 + summary.primitive_count * scratch_per_primitive / 2, scratch_alignment)
        } else {
            0
        };

        PrebuildSizes {
            result_size: min_value_align_to_u64(
                512 + summary.primitive_count * node_size,
                ACCELERATION_STRUCTURE_ALIGNMENT,
            ),
            build_scratch_size: min_value_align_to_u64(
                256 + summary.primitive_count * scratch_per_primitive,
                scratch_alignment,
            ),
            update_scratch_size,
        }
    }

    fn pending_submission_serial(&self) -> Serial {
        self.pending_serial.load(Ordering::Acquire)
    }

    fn create_buffer(&self, desc: BufferDesc, name: &str) -> RtResult<Arc<Buffer>> {
        if desc.size == 0 {
            return Err(RtError::structural(format!("Buffer {} must not be empty", name)));
        }

        let buffer = Arc::new(Buffer::new(self.next_id(), desc, self.reserve_address_range(desc.size)));
        self.state.lock().buffer_contents.insert(buffer.id(), vec![0; desc.size as usize]);

        glog::trace!("Created headless buffer {} ({} bytes)", name, desc.size);
        Ok(buffer)
    }

    fn destroy_buffer(&self, buffer: &Buffer) {
        buffer.mark_destroyed();
        self.state.lock().buffer_contents.remove(&buffer.id());
    }

    fn upload_buffer_data(&self, buffer: &Buffer, offset: u64, data: &[u8]) -> RtResult<()> {
        if buffer.is_destroyed() {
            return Err(RtError::destroyed("Cannot upload into a destroyed buffer"));
        }

        let mut state = self.state.lock();
        let contents = state.buffer_contents.get_mut(&buffer.id())
            .ok_or_else(|| RtError::reference("Buffer does not belong to this device"))?;

        let start = offset as usize;
        let end = start + data.len();
        if end > contents.len() {
            return Err(RtError::structural(format!(
                "Upload of {} bytes at offset {} overflows buffer of {} bytes",
                data.len(), offset, contents.len()
            )));
        }

        contents[start..end].copy_from_slice(data);
        state.upload_count += 1;

        Ok(())
    }
}
