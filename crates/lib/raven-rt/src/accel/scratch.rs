use raven_math::min_value_align_to_u64;

use crate::device::{Device, MemoryAllocation, MemoryKind, PrebuildSizes, ResourceState};
use crate::error::{ensure_structure, RtResult};

/// Result, build and update memory of one acceleration container.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScratchMemoryPool {
    pub result: Option<MemoryAllocation>,
    pub build: Option<MemoryAllocation>,
    /// Absent when the hardware needs no update scratch.
    pub update: Option<MemoryAllocation>,
}

impl ScratchMemoryPool {
    pub fn is_empty(&self) -> bool {
        self.result.is_none() && self.build.is_none() && self.update.is_none()
    }
}

pub struct ScratchMemoryManager;

impl ScratchMemoryManager {
    /// Allocate one pool. Zero-sized update requests are skipped.
    pub fn allocate_scratch_memory<D: Device + ?Sized>(
        device: &D,
        kind: MemoryKind,
        byte_size: u64,
        initial_state: ResourceState,
    ) -> RtResult<Option<MemoryAllocation>> {
        if kind == MemoryKind::Update && byte_size == 0 {
            return Ok(None);
        }

        let name = match kind {
            MemoryKind::Result => "acceleration container result",
            MemoryKind::Build => "acceleration container build scratch",
            MemoryKind::Update => "acceleration container update scratch",
        };

        device.allocate_device_memory(kind, byte_size, initial_state, name).map(Some)
    }

    /// Allocate all pools for the given sizes. Each allocation lands in `pool` as soon as it
    /// succeeds, so a failure leaves the earlier ones for the owner to release.
    pub fn reserve<D: Device + ?Sized>(
        device: &D,
        sizes: &PrebuildSizes,
        pool: &mut ScratchMemoryPool,
    ) -> RtResult<()> {
        let alignment = device.ray_tracing_properties().min_scratch_offset_alignment;
        ensure_structure!(
            alignment.is_power_of_two(),
            "Scratch offset alignment must be a power of two, got {}", alignment
        );

        pool.result = Self::allocate_scratch_memory(
            device,
            MemoryKind::Result,
            sizes.result_size,
            ResourceState::AccelerationStructure,
        )?;
        pool.build = Self::allocate_scratch_memory(
            device,
            MemoryKind::Build,
            min_value_align_to_u64(sizes.build_scratch_size, alignment),
            ResourceState::UnorderedAccess,
        )?;
        pool.update = Self::allocate_scratch_memory(
            device,
            MemoryKind::Update,
            min_value_align_to_u64(sizes.update_scratch_size, alignment),
            ResourceState::UnorderedAccess,
        )?;

        Ok(())
    }

    pub fn release_build<D: Device + ?Sized>(device: &D, pool: &mut ScratchMemoryPool) {
        if let Some(build) = pool.build.take() {
            device.free_device_memory(build);
        }
    }

    pub fn release<D: Device + ?Sized>(device: &D, pool: &mut ScratchMemoryPool) {
        for allocation in [pool.result.take(), pool.build.take(), pool.update.take()].into_iter().flatten() {
            device.free_device_memory(allocation);
        }
    }
}
