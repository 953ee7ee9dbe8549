use crate::device::Serial;
use crate::error::{RtError, RtResult};

use super::allocator::{
    CpuDescriptor, DescriptorHeapType, GpuDescriptorHandle, ShaderVisibleDescriptorAllocator,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PopulateStatus {
    Ready,
    /// The shader-visible heap is full; retry after switching heaps.
    HeapExhausted,
}

/// Remembers where a bind group's descriptors were last copied to, so repeated binds within
/// one submission and one heap generation skip the copy.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DescriptorExposureCache {
    last_usage_serial: Option<Serial>,
    heap_serial: Option<Serial>,
    base_view_descriptor: Option<GpuDescriptorHandle>,
    base_sampler_descriptor: Option<GpuDescriptorHandle>,
}

impl DescriptorExposureCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn last_usage_serial(&self) -> Option<Serial> {
        self.last_usage_serial
    }

    #[inline]
    pub fn heap_serial(&self) -> Option<Serial> {
        self.heap_serial
    }

    #[inline]
    pub fn base_view_descriptor(&self) -> Option<GpuDescriptorHandle> {
        self.base_view_descriptor
    }

    #[inline]
    pub fn base_sampler_descriptor(&self) -> Option<GpuDescriptorHandle> {
        self.base_sampler_descriptor
    }

    pub fn is_valid_for(&self, pending_serial: Serial, heap_serial: Serial) -> bool {
        (self.last_usage_serial, self.heap_serial) == (Some(pending_serial), Some(heap_serial))
    }

    pub fn invalidate(&mut self) {
        *self = Self::default();
    }

    pub fn populate<A: ShaderVisibleDescriptorAllocator + ?Sized>(
        &mut self,
        allocator: &mut A,
        views: &[CpuDescriptor],
        samplers: &[CpuDescriptor],
    ) -> RtResult<PopulateStatus> {
        let pending_serial = allocator.pending_serial();

        if self.is_valid_for(pending_serial, allocator.heap_serial()) {
            glog::debug!("Descriptor table reused (serial {})", pending_serial);
            return Ok(PopulateStatus::Ready);
        }

        let mut base_view_descriptor = None;
        if !views.is_empty() {
            let allocation = match allocator.allocate_gpu_descriptors(views.len() as u32, pending_serial, DescriptorHeapType::View) {
                Some(allocation) => allocation,
                None => return Ok(PopulateStatus::HeapExhausted),
            };

            allocator.copy_descriptors(&allocation, views)?;
            base_view_descriptor = Some(allocation.base_descriptor);
        }

        let mut base_sampler_descriptor = None;
        if !samplers.is_empty() {
            let allocation = match allocator.allocate_gpu_descriptors(samplers.len() as u32, pending_serial, DescriptorHeapType::Sampler) {
                Some(allocation) => allocation,
                None => return Ok(PopulateStatus::HeapExhausted),
            };

            allocator.copy_descriptors(&allocation, samplers)?;
            base_sampler_descriptor = Some(allocation.base_descriptor);
        }

        glog::debug!(
            "Descriptor table written ({} views, {} samplers, serial {})",
            views.len(), samplers.len(), pending_serial
        );

        self.last_usage_serial = Some(pending_serial);
        self.heap_serial = Some(allocator.heap_serial());
        self.base_view_descriptor = base_view_descriptor;
        self.base_sampler_descriptor = base_sampler_descriptor;

        Ok(PopulateStatus::Ready)
    }

    /// Populate, switching heaps once when the current ones are full.
    pub fn populate_with_rotation<A: ShaderVisibleDescriptorAllocator + ?Sized>(
        &mut self,
        allocator: &mut A,
        views: &[CpuDescriptor],
        samplers: &[CpuDescriptor],
    ) -> RtResult<()> {
        if self.populate(allocator, views, samplers)? == PopulateStatus::Ready {
            return Ok(());
        }

        glog::warn!("Shader-visible descriptor heap exhausted, switching heaps");
        allocator.switch_heaps()?;

        match self.populate(allocator, views, samplers)? {
            PopulateStatus::Ready => Ok(()),
            PopulateStatus::HeapExhausted => Err(RtError::exhausted(format!(
                "A fresh shader-visible heap can not hold {} views and {} samplers",
                views.len(), samplers.len()
            ))),
        }
    }
}
