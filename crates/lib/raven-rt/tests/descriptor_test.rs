mod common;

use std::sync::Arc;

use raven_rt::accel::ContainerFlags;
use raven_rt::backend::headless::HeadlessDescriptorAllocator;
use raven_rt::descriptor::{
    BindGroup, BindGroupEntry, BindGroupLayout, BindGroupLayoutEntry, BindingResource,
    BindingType, CpuDescriptor, DescriptorExposureCache, DescriptorHeapType, PopulateStatus,
    SamplerHandle, ShaderVisibleDescriptorAllocator,
};
use raven_rt::{Buffer, BufferDesc, BufferUsage, Device, RtError};

use common::*;

fn scene_layout() -> Arc<BindGroupLayout> {
    BindGroupLayout::new(&[
        BindGroupLayoutEntry { binding: 3, ty: BindingType::AccelerationContainer },
        BindGroupLayoutEntry { binding: 0, ty: BindingType::UniformBuffer },
        BindGroupLayoutEntry { binding: 2, ty: BindingType::Sampler },
        BindGroupLayoutEntry { binding: 1, ty: BindingType::StorageBuffer },
    ])
    .unwrap()
}

fn uniform_buffer(device: &TestDevice) -> Arc<Buffer> {
    device.create_buffer(BufferDesc::new(100, BufferUsage::UNIFORM), "uniforms").unwrap()
}

fn storage_buffer(device: &TestDevice) -> Arc<Buffer> {
    device.create_buffer(BufferDesc::new(64, BufferUsage::STORAGE), "storage").unwrap()
}

fn scene_group(device: &Arc<TestDevice>) -> (BindGroup<TestDevice>, Arc<TestContainer>) {
    let blas = triangle_blas(device);
    let tlas = tlas_over(device, &[&blas], ContainerFlags::empty());

    let group = BindGroup::new(scene_layout(), vec![
        BindGroupEntry::buffer(0, uniform_buffer(device)),
        BindGroupEntry::buffer(1, storage_buffer(device)),
        BindGroupEntry::sampler(2, SamplerHandle(9)),
        BindGroupEntry::acceleration_container(3, tlas.clone()),
    ])
    .unwrap();

    (group, tlas)
}

#[test]
fn layout_assigns_dense_slots_by_binding() {
    let layout = scene_layout();

    assert_eq!(layout.entry_count(), 4);
    assert_eq!(layout.view_descriptor_count(), 3);
    assert_eq!(layout.sampler_descriptor_count(), 1);
    assert_eq!(layout.binding_type(2), Some(BindingType::Sampler));
    assert_eq!(layout.binding_type(7), None);

    let duplicate = BindGroupLayout::new(&[
        BindGroupLayoutEntry { binding: 0, ty: BindingType::UniformBuffer },
        BindGroupLayoutEntry { binding: 0, ty: BindingType::Sampler },
    ]);
    assert!(matches!(duplicate, Err(RtError::StructuralValidation { .. })));
}

#[test]
fn bind_group_stages_descriptors_in_layout_order() {
    let device = device();
    let (group, tlas) = scene_group(&device);

    let views = group.view_descriptors();
    assert!(matches!(views[0], CpuDescriptor::ConstantBufferView { size: 256, .. }));
    assert!(matches!(views[1], CpuDescriptor::UnorderedAccessView { first_element: 0, num_elements: 16, .. }));
    assert_eq!(views[2], CpuDescriptor::AccelerationStructure { location: tlas.handle().unwrap() });
    assert_eq!(group.sampler_descriptors(), &[CpuDescriptor::Sampler { id: 9 }]);
    assert_eq!(group.buffers().len(), 2);
}

#[test]
fn bind_group_rejects_mismatched_resources() {
    let device = device();
    let layout = BindGroupLayout::new(&[
        BindGroupLayoutEntry { binding: 0, ty: BindingType::StorageBuffer },
    ])
    .unwrap();

    let uniform_only = BindGroup::<TestDevice>::new(layout.clone(), vec![BindGroupEntry::buffer(0, uniform_buffer(&device))]);
    assert!(matches!(uniform_only, Err(RtError::StructuralValidation { .. })));

    let sampler = BindGroup::<TestDevice>::new(layout.clone(), vec![BindGroupEntry::sampler(0, SamplerHandle(1))]);
    assert!(matches!(sampler, Err(RtError::StructuralValidation { .. })));

    let unknown = BindGroup::<TestDevice>::new(layout.clone(), vec![BindGroupEntry::buffer(5, storage_buffer(&device))]);
    assert!(matches!(unknown, Err(RtError::StructuralValidation { .. })));

    let out_of_range = BindGroup::<TestDevice>::new(layout, vec![BindGroupEntry {
        binding: 0,
        resource: BindingResource::Buffer {
            buffer: storage_buffer(&device),
            offset: 32,
            size: Some(64),
        },
    }]);
    assert!(matches!(out_of_range, Err(RtError::StructuralValidation { .. })));
}

#[test]
fn only_live_top_level_containers_can_be_bound() {
    let device = device();
    let layout = BindGroupLayout::new(&[
        BindGroupLayoutEntry { binding: 0, ty: BindingType::AccelerationContainer },
    ])
    .unwrap();

    let blas = triangle_blas(&device);
    let bottom = BindGroup::new(layout.clone(), vec![BindGroupEntry::acceleration_container(0, blas.clone())]);
    assert!(matches!(bottom, Err(RtError::StructuralValidation { .. })));

    let tlas = tlas_over(&device, &[&blas], ContainerFlags::empty());
    tlas.destroy();
    let destroyed = BindGroup::new(layout, vec![BindGroupEntry::acceleration_container(0, tlas)]);
    assert!(matches!(destroyed, Err(RtError::UseAfterDestroy { .. })));
}

#[test]
fn populate_is_skipped_within_one_submission() {
    let device = device();
    let (mut group, _tlas) = scene_group(&device);
    let mut allocator = HeadlessDescriptorAllocator::from_config(device.clone(), device.config());

    assert_eq!(group.populate(&mut allocator).unwrap(), PopulateStatus::Ready);
    assert_eq!(allocator.copy_count(), 2);
    let base_view = group.base_view_descriptor().unwrap();

    for _ in 0..3 {
        assert_eq!(group.populate(&mut allocator).unwrap(), PopulateStatus::Ready);
    }
    assert_eq!(allocator.copy_count(), 2);
    assert_eq!(allocator.used_slots(DescriptorHeapType::View), 3);
    assert_eq!(group.base_view_descriptor(), Some(base_view));
    assert_eq!(
        allocator.descriptor_at(DescriptorHeapType::Sampler, 0),
        Some(CpuDescriptor::Sampler { id: 9 })
    );

    device.submit();
    group.populate(&mut allocator).unwrap();
    assert_eq!(allocator.copy_count(), 4);
    assert_ne!(group.base_view_descriptor(), Some(base_view));
    assert_eq!(group.cache().last_usage_serial(), Some(device.pending_submission_serial()));
}

#[test]
fn heap_switch_invalidates_the_cache() {
    let device = device();
    let (mut group, _tlas) = scene_group(&device);
    let mut allocator = HeadlessDescriptorAllocator::new(device.clone(), 16, 4);

    group.populate(&mut allocator).unwrap();
    allocator.switch_heaps().unwrap();

    assert!(!group.cache().is_valid_for(allocator.pending_serial(), allocator.heap_serial()));
    group.populate(&mut allocator).unwrap();
    assert_eq!(allocator.copy_count(), 4);
    assert_eq!(group.cache().heap_serial(), Some(allocator.heap_serial()));
}

#[test]
fn exhausted_heap_is_rotated_once() {
    let device = device();
    let (mut group, _tlas) = scene_group(&device);
    let mut allocator = HeadlessDescriptorAllocator::new(device.clone(), 4, 4);

    group.populate_with_rotation(&mut allocator).unwrap();
    device.submit();

    assert_eq!(group.populate(&mut allocator).unwrap(), PopulateStatus::HeapExhausted);
    group.populate_with_rotation(&mut allocator).unwrap();

    assert_eq!(allocator.heap_switch_count(), 1);
    assert_eq!(allocator.used_slots(DescriptorHeapType::View), 3);
    assert!(group.cache().is_valid_for(allocator.pending_serial(), allocator.heap_serial()));
}

#[test]
fn table_larger_than_a_heap_fails() {
    let device = device();
    let (mut group, _tlas) = scene_group(&device);
    let mut allocator = HeadlessDescriptorAllocator::new(device.clone(), 2, 4);

    let result = group.populate_with_rotation(&mut allocator);
    assert!(matches!(result, Err(RtError::DeviceResourceExhaustion { .. })));
    assert_eq!(allocator.heap_switch_count(), 1);
    assert_eq!(group.base_view_descriptor(), None);
}

#[test]
fn destroyed_container_fails_populate() {
    let device = device();
    let (mut group, tlas) = scene_group(&device);
    let mut allocator = HeadlessDescriptorAllocator::from_config(device.clone(), device.config());

    tlas.destroy();

    assert!(matches!(group.populate(&mut allocator), Err(RtError::UseAfterDestroy { .. })));
    assert_eq!(allocator.copy_count(), 0);
}

#[test]
fn cache_without_samplers_only_touches_the_view_heap() {
    let device = device();
    let mut allocator = HeadlessDescriptorAllocator::new(device.clone(), 8, 8);
    let mut cache = DescriptorExposureCache::new();
    let views = [CpuDescriptor::AccelerationStructure { location: 0x100 }];

    cache.populate(&mut allocator, &views, &[]).unwrap();

    assert!(cache.base_view_descriptor().is_some());
    assert!(cache.base_sampler_descriptor().is_none());
    assert_eq!(allocator.used_slots(DescriptorHeapType::Sampler), 0);

    cache.invalidate();
    assert_eq!(cache, DescriptorExposureCache::default());
}

#[test]
fn overflowing_buffer_range_is_rejected() {
    let device = device();
    let layout = BindGroupLayout::new(&[
        BindGroupLayoutEntry { binding: 0, ty: BindingType::StorageBuffer },
    ])
    .unwrap();

    let group = BindGroup::<TestDevice>::new(layout, vec![BindGroupEntry {
        binding: 0,
        resource: BindingResource::Buffer {
            buffer: storage_buffer(&device),
            offset: u64::MAX - 8,
            size: Some(64),
        },
    }]);
    assert!(matches!(group, Err(RtError::StructuralValidation { .. })));
}

#[test]
fn storage_ranges_must_cover_whole_elements() {
    let device = device();
    let storage = BindGroupLayout::new(&[
        BindGroupLayoutEntry { binding: 0, ty: BindingType::StorageBuffer },
    ])
    .unwrap();
    let readonly = BindGroupLayout::new(&[
        BindGroupLayoutEntry { binding: 0, ty: BindingType::ReadonlyStorageBuffer },
    ])
    .unwrap();

    let range = |offset, size| BindGroupEntry {
        binding: 0,
        resource: BindingResource::Buffer {
            buffer: storage_buffer(&device),
            offset,
            size: Some(size),
        },
    };

    for layout in [&storage, &readonly] {
        for (offset, size) in [(6, 6), (4, 6), (6, 8)] {
            let group = BindGroup::<TestDevice>::new(layout.clone(), vec![range(offset, size)]);
            assert!(matches!(group, Err(RtError::StructuralValidation { .. })));
        }
    }

    let group = BindGroup::<TestDevice>::new(readonly, vec![range(8, 16)]).unwrap();
    assert_eq!(group.view_descriptors()[0], CpuDescriptor::ShaderResourceView {
        address: group.buffers()[0].device_address(),
        first_element: 2,
        num_elements: 4,
    });
}
