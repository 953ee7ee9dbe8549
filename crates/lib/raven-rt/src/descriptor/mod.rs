//! Bind groups and their exposure into shader-visible descriptor heaps.

mod allocator;
mod bind_group;
mod cache;

pub use allocator::{
    CpuDescriptor, DescriptorHeapType, GpuDescriptorAllocation, GpuDescriptorHandle,
    ShaderVisibleDescriptorAllocator,
};
pub use bind_group::{
    BindGroup, BindGroupEntry, BindGroupLayout, BindGroupLayoutEntry, BindingResource,
    BindingType, SamplerHandle,
};
pub use cache::{DescriptorExposureCache, PopulateStatus};
