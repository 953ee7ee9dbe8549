use std::sync::Arc;

use crate::config::RayTracingConfig;
use crate::descriptor::{
    CpuDescriptor, DescriptorHeapType, GpuDescriptorAllocation, GpuDescriptorHandle,
    ShaderVisibleDescriptorAllocator,
};
use crate::device::{Device, Serial};
use crate::error::{ensure_structure, RtError, RtResult};

const DESCRIPTOR_INCREMENT_SIZE: u64 = 32;
const HEAP_ADDRESS_SPAN: u64 = 1 << 32;

struct HeadlessHeap {
    heap_type: DescriptorHeapType,
    slots: Vec<Option<CpuDescriptor>>,
    used: u32,
}

impl HeadlessHeap {
    fn new(heap_type: DescriptorHeapType, capacity: u32) -> Self {
        Self {
            heap_type,
            slots: vec![None; capacity as usize],
            used: 0,
        }
    }

    fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    fn base_address(&self, heap_serial: Serial) -> u64 {
        let type_offset = match self.heap_type {
            DescriptorHeapType::View => 0,
            DescriptorHeapType::Sampler => HEAP_ADDRESS_SPAN / 2,
        };
        heap_serial * HEAP_ADDRESS_SPAN + type_offset
    }

    fn reset(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.used = 0;
    }
}

/// Linear shader-visible heaps living in host memory. A heap is only recycled by
/// `switch_heaps`, which starts a new heap generation.
pub struct HeadlessDescriptorAllocator<D: Device> {
    device: Arc<D>,
    view_heap: HeadlessHeap,
    sampler_heap: HeadlessHeap,
    heap_serial: Serial,
    copy_count: usize,
    heap_switch_count: usize,
}

impl<D: Device> HeadlessDescriptorAllocator<D> {
    pub fn new(device: Arc<D>, view_capacity: u32, sampler_capacity: u32) -> Self {
        Self {
            device,
            view_heap: HeadlessHeap::new(DescriptorHeapType::View, view_capacity),
            sampler_heap: HeadlessHeap::new(DescriptorHeapType::Sampler, sampler_capacity),
            heap_serial: 1,
            copy_count: 0,
            heap_switch_count: 0,
        }
    }

    pub fn from_config(device: Arc<D>, config: &RayTracingConfig) -> Self {
        Self::new(device, config.view_heap_capacity, config.sampler_heap_capacity)
    }

    /// Number of `copy_descriptors` calls so far.
    pub fn copy_count(&self) -> usize {
        self.copy_count
    }

    pub fn heap_switch_count(&self) -> usize {
        self.heap_switch_count
    }

    pub fn used_slots(&self, heap_type: DescriptorHeapType) -> u32 {
        self.heap(heap_type).used
    }

    /// Content of a slot in the current heap generation.
    pub fn descriptor_at(&self, heap_type: DescriptorHeapType, slot: u32) -> Option<CpuDescriptor> {
        self.heap(heap_type).slots.get(slot as usize).copied().flatten()
    }

    fn heap(&self, heap_type: DescriptorHeapType) -> &HeadlessHeap {
        match heap_type {
            DescriptorHeapType::View => &self.view_heap,
            DescriptorHeapType::Sampler => &self.sampler_heap,
        }
    }

    fn heap_mut(&mut self, heap_type: DescriptorHeapType) -> &mut HeadlessHeap {
        match heap_type {
            DescriptorHeapType::View => &mut self.view_heap,
            DescriptorHeapType::Sampler => &mut self.sampler_heap,
        }
    }
}

impl<D: Device> ShaderVisibleDescriptorAllocator for HeadlessDescriptorAllocator<D> {
    fn pending_serial(&self) -> Serial {
        self.device.pending_submission_serial()
    }

    fn heap_serial(&self) -> Serial {
        self.heap_serial
    }

    fn allocate_gpu_descriptors(
        &mut self,
        count: u32,
        pending_serial: Serial,
        heap_type: DescriptorHeapType,
    ) -> Option<GpuDescriptorAllocation> {
        let heap_serial = self.heap_serial;
        let heap = self.heap_mut(heap_type);

        if count == 0 || heap.used + count > heap.capacity() {
            return None;
        }

        let first_slot = heap.used;
        heap.used += count;

        Some(GpuDescriptorAllocation {
            heap_type,
            heap_serial,
            usage_serial: pending_serial,
            first_slot,
            count,
            base_descriptor: GpuDescriptorHandle(
                heap.base_address(heap_serial) + first_slot as u64 * DESCRIPTOR_INCREMENT_SIZE,
            ),
        })
    }

    fn copy_descriptors(
        &mut self,
        allocation: &GpuDescriptorAllocation,
        descriptors: &[CpuDescriptor],
    ) -> RtResult<()> {
        if allocation.heap_serial != self.heap_serial {
            return Err(RtError::reference("Descriptor allocation belongs to a retired heap"));
        }
        ensure_structure!(
            descriptors.len() == allocation.count as usize,
            "Copying {} descriptors into an allocation of {}", descriptors.len(), allocation.count
        );
        ensure_structure!(
            descriptors.iter().all(|descriptor| descriptor.heap_type() == allocation.heap_type),
            "Descriptor kind does not match the {:?} heap", allocation.heap_type
        );

        let heap = self.heap_mut(allocation.heap_type);
        let first = allocation.first_slot as usize;
        for (slot, descriptor) in heap.slots[first..first + descriptors.len()].iter_mut().zip(descriptors) {
            *slot = Some(*descriptor);
        }

        self.copy_count += 1;
        Ok(())
    }

    fn switch_heaps(&mut self) -> RtResult<()> {
        self.view_heap.reset();
        self.sampler_heap.reset();
        self.heap_serial += 1;
        self.heap_switch_count += 1;

        glog::trace!("Switched to shader-visible heap generation {}", self.heap_serial);
        Ok(())
    }
}
