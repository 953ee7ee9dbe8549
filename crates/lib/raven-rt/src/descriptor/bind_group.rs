use std::collections::BTreeMap;
use std::sync::Arc;

use raven_math::min_value_align_to_u64;

use crate::accel::{AccelerationContainer, ContainerLevel};
use crate::buffer::{Buffer, BufferUsage};
use crate::device::Device;
use crate::error::{ensure_structure, RtError, RtResult};

use super::allocator::{
    CpuDescriptor, DescriptorHeapType, GpuDescriptorHandle, ShaderVisibleDescriptorAllocator,
};
use super::cache::{DescriptorExposureCache, PopulateStatus};

/// Constant buffer views are sized in multiples of this.
const CONSTANT_BUFFER_ALIGNMENT: u64 = 256;
/// Storage buffers are viewed as raw 32-bit elements.
const RAW_ELEMENT_SIZE: u64 = 4;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BindingType {
    UniformBuffer,
    StorageBuffer,
    ReadonlyStorageBuffer,
    Sampler,
    AccelerationContainer,
}

impl BindingType {
    pub fn heap_type(self) -> DescriptorHeapType {
        match self {
            BindingType::Sampler => DescriptorHeapType::Sampler,
            _ => DescriptorHeapType::View,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BindGroupLayoutEntry {
    pub binding: u32,
    pub ty: BindingType,
}

/// Binding slot assignment of a bind group. Views and samplers each get a dense range,
/// ordered by binding number.
#[derive(Debug)]
pub struct BindGroupLayout {
    /// binding -> (type, slot within its heap type)
    bindings: BTreeMap<u32, (BindingType, u32)>,
    view_count: u32,
    sampler_count: u32,
}

impl BindGroupLayout {
    pub fn new(entries: &[BindGroupLayoutEntry]) -> RtResult<Arc<Self>> {
        let mut types = BTreeMap::new();
        for entry in entries {
            ensure_structure!(
                types.insert(entry.binding, entry.ty).is_none(),
                "Binding {} is declared more than once", entry.binding
            );
        }

        let mut bindings = BTreeMap::new();
        let mut view_count = 0;
        let mut sampler_count = 0;

        for (binding, ty) in types {
            let counter = match ty.heap_type() {
                DescriptorHeapType::View => &mut view_count,
                DescriptorHeapType::Sampler => &mut sampler_count,
            };

            bindings.insert(binding, (ty, *counter));
            *counter += 1;
        }

        Ok(Arc::new(Self {
            bindings,
            view_count,
            sampler_count,
        }))
    }

    #[inline]
    pub fn view_descriptor_count(&self) -> u32 {
        self.view_count
    }

    #[inline]
    pub fn sampler_descriptor_count(&self) -> u32 {
        self.sampler_count
    }

    pub fn binding_type(&self, binding: u32) -> Option<BindingType> {
        self.bindings.get(&binding).map(|(ty, _)| *ty)
    }

    pub fn entry_count(&self) -> usize {
        self.bindings.len()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SamplerHandle(pub u64);

pub enum BindingResource<D: Device> {
    Buffer {
        buffer: Arc<Buffer>,
        offset: u64,
        /// Rest of the buffer when `None`.
        size: Option<u64>,
    },
    Sampler(SamplerHandle),
    AccelerationContainer(Arc<AccelerationContainer<D>>),
}

pub struct BindGroupEntry<D: Device> {
    pub binding: u32,
    pub resource: BindingResource<D>,
}

impl<D: Device> BindGroupEntry<D> {
    pub fn buffer(binding: u32, buffer: Arc<Buffer>) -> Self {
        Self {
            binding,
            resource: BindingResource::Buffer {
                buffer,
                offset: 0,
                size: None,
            },
        }
    }

    pub fn sampler(binding: u32, sampler: SamplerHandle) -> Self {
        Self {
            binding,
            resource: BindingResource::Sampler(sampler),
        }
    }

    pub fn acceleration_container(binding: u32, container: Arc<AccelerationContainer<D>>) -> Self {
        Self {
            binding,
            resource: BindingResource::AccelerationContainer(container),
        }
    }
}

/// Resources bound against a layout, staged as CPU descriptors and exposed into
/// shader-visible heaps on demand.
pub struct BindGroup<D: Device> {
    layout: Arc<BindGroupLayout>,
    views: Vec<CpuDescriptor>,
    samplers: Vec<CpuDescriptor>,
    buffers: Vec<Arc<Buffer>>,
    containers: Vec<Arc<AccelerationContainer<D>>>,
    cache: DescriptorExposureCache,
}

impl<D: Device> BindGroup<D> {
    pub fn new(layout: Arc<BindGroupLayout>, entries: Vec<BindGroupEntry<D>>) -> RtResult<Self> {
        ensure_structure!(
            entries.len() == layout.entry_count(),
            "Bind group has {} entries but its layout declares {}", entries.len(), layout.entry_count()
        );

        let placeholder = CpuDescriptor::Sampler { id: 0 };
        let mut views = vec![placeholder; layout.view_count as usize];
        let mut samplers = vec![placeholder; layout.sampler_count as usize];
        let mut written = BTreeMap::new();

        let mut buffers = Vec::new();
        let mut containers = Vec::new();

        for entry in entries {
            let (ty, slot) = *layout.bindings.get(&entry.binding)
                .ok_or_else(|| RtError::structural(format!("Binding {} is not part of the layout", entry.binding)))?;
            ensure_structure!(
                written.insert(entry.binding, ()).is_none(),
                "Binding {} is bound more than once", entry.binding
            );

            let descriptor = match (ty, entry.resource) {
                (BindingType::UniformBuffer, BindingResource::Buffer { buffer, offset, size }) => {
                    let size = Self::validate_buffer_range(&buffer, offset, size, BufferUsage::UNIFORM)?;
                    let descriptor = CpuDescriptor::ConstantBufferView {
                        address: buffer.device_address() + offset,
                        size: min_value_align_to_u64(size, CONSTANT_BUFFER_ALIGNMENT),
                    };
                    buffers.push(buffer);
                    descriptor
                }
                (BindingType::StorageBuffer, BindingResource::Buffer { buffer, offset, size }) => {
                    let size = Self::validate_buffer_range(&buffer, offset, size, BufferUsage::STORAGE)?;
                    Self::validate_raw_range(offset, size)?;
                    let descriptor = CpuDescriptor::UnorderedAccessView {
                        address: buffer.device_address(),
                        first_element: offset / RAW_ELEMENT_SIZE,
                        num_elements: size / RAW_ELEMENT_SIZE,
                    };
                    buffers.push(buffer);
                    descriptor
                }
                (BindingType::ReadonlyStorageBuffer, BindingResource::Buffer { buffer, offset, size }) => {
                    let size = Self::validate_buffer_range(&buffer, offset, size, BufferUsage::STORAGE)?;
                    Self::validate_raw_range(offset, size)?;
                    let descriptor = CpuDescriptor::ShaderResourceView {
                        address: buffer.device_address(),
                        first_element: offset / RAW_ELEMENT_SIZE,
                        num_elements: size / RAW_ELEMENT_SIZE,
                    };
                    buffers.push(buffer);
                    descriptor
                }
                (BindingType::Sampler, BindingResource::Sampler(sampler)) => {
                    CpuDescriptor::Sampler { id: sampler.0 }
                }
                (BindingType::AccelerationContainer, BindingResource::AccelerationContainer(container)) => {
                    ensure_structure!(
                        container.level() == ContainerLevel::Top,
                        "Only top-level acceleration containers can be bound (binding {})", entry.binding
                    );
                    container.validate_can_use_in_submit()?;

                    let descriptor = CpuDescriptor::AccelerationStructure {
                        location: container.handle()?,
                    };
                    containers.push(container);
                    descriptor
                }
                (ty, _) => {
                    return Err(RtError::structural(format!(
                        "Resource bound at binding {} does not match its {:?} layout entry", entry.binding, ty
                    )));
                }
            };

            match ty.heap_type() {
                DescriptorHeapType::View => views[slot as usize] = descriptor,
                DescriptorHeapType::Sampler => samplers[slot as usize] = descriptor,
            }
        }

        Ok(Self {
            layout,
            views,
            samplers,
            buffers,
            containers,
            cache: DescriptorExposureCache::new(),
        })
    }

    fn validate_buffer_range(
        buffer: &Buffer,
        offset: u64,
        size: Option<u64>,
        usage: BufferUsage,
    ) -> RtResult<u64> {
        if buffer.is_destroyed() {
            return Err(RtError::reference("Bound buffer is destroyed"));
        }
        ensure_structure!(buffer.usage().contains(usage), "Bound buffer lacks {:?} usage", usage);

        let size = size.unwrap_or_else(|| buffer.size().saturating_sub(offset));
        ensure_structure!(size > 0, "Bound buffer range must not be empty");

        let end = offset.checked_add(size);
        ensure_structure!(
            end.map_or(false, |end| end <= buffer.size()),
            "Bound range of {} bytes at offset {} exceeds buffer size {}", size, offset, buffer.size()
        );

        Ok(size)
    }

    /// Raw views address whole 32-bit elements only.
    fn validate_raw_range(offset: u64, size: u64) -> RtResult<()> {
        ensure_structure!(
            offset % RAW_ELEMENT_SIZE == 0 && size % RAW_ELEMENT_SIZE == 0,
            "Storage buffer range (offset {}, size {}) must be a multiple of {} bytes",
            offset, size, RAW_ELEMENT_SIZE
        );
        Ok(())
    }

    pub fn layout(&self) -> &Arc<BindGroupLayout> {
        &self.layout
    }

    pub fn view_descriptors(&self) -> &[CpuDescriptor] {
        &self.views
    }

    pub fn sampler_descriptors(&self) -> &[CpuDescriptor] {
        &self.samplers
    }

    pub fn buffers(&self) -> &[Arc<Buffer>] {
        &self.buffers
    }

    pub fn cache(&self) -> &DescriptorExposureCache {
        &self.cache
    }

    fn validate_can_use_in_submit(&self) -> RtResult<()> {
        for container in &self.containers {
            container.validate_can_use_in_submit()?;
        }
        Ok(())
    }

    /// Expose the descriptors into the allocator's current heaps.
    pub fn populate<A: ShaderVisibleDescriptorAllocator + ?Sized>(
        &mut self,
        allocator: &mut A,
    ) -> RtResult<PopulateStatus> {
        self.validate_can_use_in_submit()?;
        self.cache.populate(allocator, &self.views, &self.samplers)
    }

    pub fn populate_with_rotation<A: ShaderVisibleDescriptorAllocator + ?Sized>(
        &mut self,
        allocator: &mut A,
    ) -> RtResult<()> {
        self.validate_can_use_in_submit()?;
        self.cache.populate_with_rotation(allocator, &self.views, &self.samplers)
    }

    pub fn base_view_descriptor(&self) -> Option<GpuDescriptorHandle> {
        self.cache.base_view_descriptor()
    }

    pub fn base_sampler_descriptor(&self) -> Option<GpuDescriptorHandle> {
        self.cache.base_sampler_descriptor()
    }
}
