use crate::device::{DeviceAddress, Serial};
use crate::error::RtResult;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DescriptorHeapType {
    /// Constant buffer, shader resource and unordered access views.
    View,
    Sampler,
}

/// GPU-visible address of a descriptor slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct GpuDescriptorHandle(pub u64);

/// A contiguous range of slots in one shader-visible heap.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GpuDescriptorAllocation {
    pub heap_type: DescriptorHeapType,
    /// Heap generation the slots belong to.
    pub heap_serial: Serial,
    /// Submission the slots were handed out for.
    pub usage_serial: Serial,
    pub first_slot: u32,
    pub count: u32,
    pub base_descriptor: GpuDescriptorHandle,
}

/// A CPU-staged descriptor, waiting to be copied into a shader-visible heap.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CpuDescriptor {
    ConstantBufferView {
        address: DeviceAddress,
        size: u64,
    },
    ShaderResourceView {
        address: DeviceAddress,
        first_element: u64,
        num_elements: u64,
    },
    UnorderedAccessView {
        address: DeviceAddress,
        first_element: u64,
        num_elements: u64,
    },
    AccelerationStructure {
        location: DeviceAddress,
    },
    Sampler {
        id: u64,
    },
}

impl CpuDescriptor {
    pub fn heap_type(&self) -> DescriptorHeapType {
        match self {
            CpuDescriptor::Sampler { .. } => DescriptorHeapType::Sampler,
            _ => DescriptorHeapType::View,
        }
    }
}

/// Hands out slots of the shader-visible heaps.
///
/// Serials only advance on the device's single submission path, so comparing them needs no
/// synchronization beyond the exclusive borrow taken here.
pub trait ShaderVisibleDescriptorAllocator {
    /// Serial of the submission currently being recorded.
    fn pending_serial(&self) -> Serial;

    /// Generation of the current shader-visible heaps, bumped on every switch.
    fn heap_serial(&self) -> Serial;

    /// `None` when the current heap has no room left; switching heaps may help.
    fn allocate_gpu_descriptors(
        &mut self,
        count: u32,
        pending_serial: Serial,
        heap_type: DescriptorHeapType,
    ) -> Option<GpuDescriptorAllocation>;

    fn copy_descriptors(
        &mut self,
        allocation: &GpuDescriptorAllocation,
        descriptors: &[CpuDescriptor],
    ) -> RtResult<()>;

    /// Retire the current heaps and start filling fresh ones.
    fn switch_heaps(&mut self) -> RtResult<()>;
}
