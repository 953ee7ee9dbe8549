mod common;

use std::sync::Arc;

use raven_rt::accel::{
    AabbData, ContainerDescriptor, ContainerFlags, ContainerLevel, GeometryDescriptor, GeometryInstance,
    GeometryType, IndexData, IndexFormat, InstanceDescriptor, TransformDescriptor,
};
use raven_rt::backend::headless::{HeadlessDevice, HeadlessRecorder, RecordedCommand};
use raven_rt::accel::{BuildMode, ScratchMemoryManager, ScratchMemoryPool};
use raven_math::Vec3;
use raven_rt::{
    AccelerationContainer, BufferDesc, BufferUsage, Device, PrebuildSizes, RayTracingConfig,
    RtError,
};

use common::*;

fn is_structural<T>(result: &Result<T, RtError>) -> bool {
    matches!(result, Err(RtError::StructuralValidation { .. }))
}

#[test]
fn level_and_payload_must_agree() {
    let device = device();
    let blas = triangle_blas(&device);
    let buffer = vertex_buffer(&*device, 3);

    let mut bottom = ContainerDescriptor::bottom_level(vec![triangle_geometry(buffer.clone())]);
    bottom.instances.push(InstanceDescriptor::new(blas.clone()));
    assert!(is_structural(&TestContainer::new(&device, &bottom)));

    let mut top = ContainerDescriptor::top_level(vec![InstanceDescriptor::new(blas)]);
    top.geometries.push(triangle_geometry(buffer));
    let err = TestContainer::new(&device, &top).err().unwrap();
    assert_eq!(err.reason(), "Geometry count for top-level acceleration container must be zero");

    assert!(is_structural(&TestContainer::new(&device, &ContainerDescriptor::bottom_level(vec![]))));
    assert!(is_structural(&TestContainer::new(&device, &ContainerDescriptor::top_level(vec![]))));
}

#[test]
fn aabb_is_exclusive_with_vertex_and_index_data() {
    let device = device();
    let vertices = vertex_buffer(&*device, 3);
    let aabbs = aabb_buffer(&*device, 1);

    let mut procedural = GeometryDescriptor::aabbs(aabb_data(aabbs.clone()));
    procedural.vertex = Some(vertex_data(vertices.clone()));
    let err = TestContainer::new(&device, &ContainerDescriptor::bottom_level(vec![procedural])).err().unwrap();
    assert!(matches!(err, RtError::StructuralValidation { .. }));
    assert!(err.reason().starts_with("AABB is not allowed to be combined with vertex data"));

    let mut procedural = GeometryDescriptor::aabbs(aabb_data(aabbs.clone()));
    procedural.index = Some(IndexData {
        buffer: vertices.clone(),
        offset: 0,
        count: 3,
        format: IndexFormat::Uint32,
    });
    assert!(is_structural(&TestContainer::new(&device, &ContainerDescriptor::bottom_level(vec![procedural]))));

    let mut triangles = triangle_geometry(vertices);
    triangles.aabb = Some(aabb_data(aabbs));
    assert_eq!(triangles.ty, GeometryType::Triangles);
    assert!(is_structural(&TestContainer::new(&device, &ContainerDescriptor::bottom_level(vec![triangles]))));
}

#[test]
fn input_buffers_need_ray_tracing_usage_and_nonzero_counts() {
    let device = device();
    let plain = device.create_buffer(BufferDesc::new(36, BufferUsage::VERTEX), "plain").unwrap();

    let err = TestContainer::new(&device, &ContainerDescriptor::bottom_level(vec![triangle_geometry(plain)]))
        .err().unwrap();
    assert_eq!(err.reason(), "Vertex buffer must have RAY_TRACING usage flag");

    let mut empty = vertex_data(vertex_buffer(&*device, 3));
    empty.count = 0;
    let geometry = GeometryDescriptor::triangles(empty, None);
    assert!(is_structural(&TestContainer::new(&device, &ContainerDescriptor::bottom_level(vec![geometry]))));
}

#[test]
fn destroyed_input_buffer_is_a_reference_error() {
    let device = device();
    let buffer = vertex_buffer(&*device, 3);
    device.destroy_buffer(&buffer);

    let result = TestContainer::new(&device, &ContainerDescriptor::bottom_level(vec![triangle_geometry(buffer)]));
    assert!(matches!(result, Err(RtError::ReferenceValidity { .. })));
}

#[test]
fn shared_buffers_are_retained_once() {
    let device = device();
    let vertices = vertex_buffer(&*device, 6);
    let indices = device.create_buffer(BufferDesc::new_ray_tracing_input(24, BufferUsage::INDEX), "indices").unwrap();

    let index_data = IndexData {
        buffer: indices.clone(),
        offset: 0,
        count: 6,
        format: IndexFormat::Uint16,
    };
    let desc = ContainerDescriptor::bottom_level(vec![
        GeometryDescriptor::triangles(vertex_data(vertices.clone()), Some(index_data.clone())),
        GeometryDescriptor::triangles(vertex_data(vertices.clone()), Some(index_data)),
    ]);

    let blas = TestContainer::new(&device, &desc).unwrap();
    assert_eq!(blas.geometry_count(), 2);
    assert_eq!(blas.vertex_buffers().len(), 1);
    assert_eq!(blas.index_buffers().len(), 1);
    assert!(blas.aabb_buffers().is_empty());
    assert!(Arc::ptr_eq(&blas.vertex_buffers()[0], &vertices));
}

#[test]
fn triangle_blas_allocates_result_and_build_pools_only() {
    let device = device();
    let blas = triangle_blas(&device);

    let pool = blas.scratch_memory().unwrap();
    let result = pool.result.unwrap();
    let build = pool.build.unwrap();

    assert!(result.size > 0);
    assert!(build.size > 0);
    assert!(pool.update.is_none());
    assert_eq!(device.live_allocation_count(), 2);
    assert_eq!(blas.handle().unwrap(), result.device_address);
    assert!(!blas.is_built());
}

#[test]
fn allow_update_adds_update_pool() {
    let device = device();
    let buffer = vertex_buffer(&*device, 3);
    let desc = ContainerDescriptor::bottom_level(vec![triangle_geometry(buffer)])
        .with_flags(ContainerFlags::ALLOW_UPDATE);

    let blas = TestContainer::new(&device, &desc).unwrap();
    let update = blas.scratch_memory().unwrap().update.unwrap();

    assert!(update.size > 0);
    assert_eq!(update.size % device.ray_tracing_properties().min_scratch_offset_alignment, 0);
    assert_eq!(device.live_allocation_count(), 3);
}

#[test]
fn instances_of_one_blas_share_one_reference() {
    let device = device();
    let blas = triangle_blas(&device);
    let tlas = tlas_over(&device, &[&blas, &blas], ContainerFlags::empty());

    assert_eq!(tlas.level(), ContainerLevel::Top);
    assert_eq!(tlas.instance_count(), 2);
    assert_eq!(tlas.geometry_containers().len(), 1);

    let instances = tlas.instances();
    assert_eq!(instances.len(), 2);
    assert_eq!(instances[1].instance_id(), 1);
    assert_eq!(instances[0].blas_address(), blas.handle().unwrap());

    let uploaded = device.buffer_contents(&tlas.instance_buffer().unwrap()).unwrap();
    assert_eq!(uploaded, GeometryInstance::slice_as_bytes(&instances));
}

#[test]
fn destroyed_blas_fails_tlas_build() {
    let device = device();
    let blas = built_triangle_blas(&device);
    let tlas = tlas_over(&device, &[&blas, &blas], ContainerFlags::empty());

    blas.destroy();

    let mut recorder = HeadlessRecorder::new();
    let result = tlas.encode_build(&mut recorder);
    assert!(matches!(result, Err(RtError::ReferenceValidity { .. })));
    assert!(recorder.commands().is_empty());
    assert!(!tlas.is_built());
}

#[test]
fn tlas_creation_rejects_destroyed_blas() {
    let device = device();
    let blas = triangle_blas(&device);
    blas.destroy();

    let desc = ContainerDescriptor::top_level(vec![InstanceDescriptor::new(blas)]);
    let err = TestContainer::new(&device, &desc).err().unwrap();

    assert!(matches!(err, RtError::ReferenceValidity { .. }));
    assert_eq!(err.reason(), "Linked geometry container must not be destroyed");
}

#[test]
fn tlas_cannot_instance_another_tlas() {
    let device = device();
    let blas = triangle_blas(&device);
    let tlas = tlas_over(&device, &[&blas], ContainerFlags::empty());

    let desc = ContainerDescriptor::top_level(vec![InstanceDescriptor::new(tlas)]);
    assert!(is_structural(&TestContainer::new(&device, &desc)));
}

#[test]
fn tlas_build_requires_built_blas() {
    let device = device();
    let blas = triangle_blas(&device);
    let tlas = tlas_over(&device, &[&blas], ContainerFlags::empty());

    let mut recorder = HeadlessRecorder::new();
    assert!(is_structural(&tlas.encode_build(&mut recorder)));

    blas.encode_build(&mut recorder).unwrap();
    tlas.encode_build(&mut recorder).unwrap();
    assert!(tlas.is_built());
    assert_eq!(recorder.commands().len(), 2);
}

#[test]
fn update_instance_on_bottom_level_always_fails() {
    let device = device();
    let blas = triangle_blas(&device);
    let other = triangle_blas(&device);

    let valid = InstanceDescriptor::new(other);
    let mut invalid = valid.clone();
    invalid.geometry_container = None;

    assert!(is_structural(&blas.update_instance(0, &valid)));
    assert!(is_structural(&blas.update_instance(0, &invalid)));

    blas.destroy();
    assert!(is_structural(&blas.update_instance(0, &valid)));
}

#[test]
fn update_instance_patches_one_record_in_place() {
    let device = device();
    let first = triangle_blas(&device);
    let second = triangle_blas(&device);
    let tlas = tlas_over(&device, &[&first, &first], ContainerFlags::ALLOW_UPDATE);
    let instance_buffer = tlas.instance_buffer().unwrap();
    let before = device.buffer_contents(&instance_buffer).unwrap();

    let desc = InstanceDescriptor::new(second.clone())
        .with_instance_id(7)
        .with_mask(0x0F)
        .with_instance_offset(3);
    tlas.update_instance(1, &desc).unwrap();

    let after = device.buffer_contents(&instance_buffer).unwrap();
    assert_eq!(before[..GeometryInstance::SIZE], after[..GeometryInstance::SIZE]);

    let patched = tlas.instances()[1];
    assert_eq!(patched.instance_id(), 7);
    assert_eq!(patched.mask(), 0x0F);
    assert_eq!(patched.sbt_offset(), 3);
    assert_eq!(patched.blas_address(), second.handle().unwrap());
    assert_eq!(&after[GeometryInstance::SIZE..], patched.as_bytes());
    assert_eq!(tlas.geometry_containers().len(), 2);

    assert!(is_structural(&tlas.update_instance(2, &desc)));
}

#[test]
fn update_instance_rejects_destroyed_references_and_containers() {
    let device = device();
    let blas = triangle_blas(&device);
    let gone = triangle_blas(&device);
    let tlas = tlas_over(&device, &[&blas], ContainerFlags::empty());

    gone.destroy();
    let result = tlas.update_instance(0, &InstanceDescriptor::new(gone));
    assert!(matches!(result, Err(RtError::ReferenceValidity { .. })));

    tlas.destroy();
    let result = tlas.update_instance(0, &InstanceDescriptor::new(blas));
    assert!(matches!(result, Err(RtError::UseAfterDestroy { .. })));
}

#[test]
fn transform_sources_are_exclusive() {
    let device = device();
    let blas = triangle_blas(&device);

    let both = InstanceDescriptor::new(blas.clone())
        .with_transform(TransformDescriptor::default())
        .with_transform_matrix(raven_math::IDENTITY_ROW_MAJOR_3X4);
    assert!(is_structural(&TestContainer::new(&device, &ContainerDescriptor::top_level(vec![both]))));

    let moved = InstanceDescriptor::new(blas.clone()).with_transform(TransformDescriptor {
        translation: Vec3::new(1.0, 2.0, 3.0),
        ..Default::default()
    });
    let plain = InstanceDescriptor::new(blas);
    let tlas = TestContainer::new(&device, &ContainerDescriptor::top_level(vec![moved, plain])).unwrap();

    let instances = tlas.instances();
    assert_eq!(instances[0].transform()[3], 1.0);
    assert_eq!(instances[0].transform()[7], 2.0);
    assert_eq!(instances[0].transform()[11], 3.0);
    assert_eq!(*instances[1].transform(), raven_math::IDENTITY_ROW_MAJOR_3X4);
}

#[test]
fn instance_id_must_fit_24_bits() {
    let device = device();
    let blas = triangle_blas(&device);
    let desc = InstanceDescriptor::new(blas).with_instance_id(1 << 24);

    assert!(is_structural(&TestContainer::new(&device, &ContainerDescriptor::top_level(vec![desc]))));
}

#[test]
fn build_and_update_follow_the_state_machine() {
    let device = device();
    let buffer = vertex_buffer(&*device, 3);
    let desc = ContainerDescriptor::bottom_level(vec![triangle_geometry(buffer)])
        .with_flags(ContainerFlags::ALLOW_UPDATE);
    let blas = TestContainer::new(&device, &desc).unwrap();
    let mut recorder = HeadlessRecorder::new();

    assert!(is_structural(&blas.encode_update(&mut recorder)));

    blas.encode_build(&mut recorder).unwrap();
    assert!(blas.is_built());
    assert!(is_structural(&blas.encode_build(&mut recorder)));

    blas.encode_update(&mut recorder).unwrap();
    assert!(blas.is_updated());

    let pool = blas.scratch_memory().unwrap();
    let result = pool.result.unwrap().device_address;
    match recorder.commands() {
        [RecordedCommand::Build { mode: BuildMode::Build, source: None, destination, scratch, summary, .. },
         RecordedCommand::Build { mode: BuildMode::Update, source: Some(source), destination: updated, scratch: update_scratch, .. }] => {
            assert_eq!(*destination, result);
            assert_eq!(*scratch, pool.build.unwrap().device_address);
            assert_eq!(summary.primitive_count, 1);
            assert!(summary.allow_update);
            assert_eq!(*source, result);
            assert_eq!(*updated, result);
            assert_eq!(*update_scratch, pool.update.unwrap().device_address);
        }
        commands => panic!("unexpected commands {:?}", commands),
    }
}

#[test]
fn update_needs_allow_update_flag() {
    let device = device();
    let blas = built_triangle_blas(&device);

    let err = blas.encode_update(&mut HeadlessRecorder::new()).err().unwrap();
    assert!(matches!(err, RtError::StructuralValidation { .. }));
    assert!(!blas.is_updated());
}

#[test]
fn copy_requires_built_and_alive_containers() {
    let device = device();
    let source = built_triangle_blas(&device);
    let destination = triangle_blas(&device);
    let mut recorder = HeadlessRecorder::new();

    assert!(is_structural(&TestContainer::encode_copy(&source, &destination, &mut recorder)));
    assert!(is_structural(&TestContainer::encode_copy(&source, &source, &mut recorder)));

    destination.encode_build(&mut recorder).unwrap();
    recorder.clear();
    TestContainer::encode_copy(&source, &destination, &mut recorder).unwrap();
    assert_eq!(recorder.commands(), &[RecordedCommand::Copy {
        source: source.handle().unwrap(),
        destination: destination.handle().unwrap(),
    }]);

    destination.destroy();
    let result = TestContainer::encode_copy(&source, &destination, &mut recorder);
    assert!(matches!(result, Err(RtError::UseAfterDestroy { .. })));
}

#[test]
fn build_scratch_is_released_after_build() {
    let device = device();
    let blas = triangle_blas(&device);

    assert!(is_structural(&blas.release_build_scratch()));

    blas.encode_build(&mut HeadlessRecorder::new()).unwrap();
    blas.release_build_scratch().unwrap();

    let pool = blas.scratch_memory().unwrap();
    assert!(pool.build.is_none());
    assert!(pool.result.is_some());
    assert_eq!(device.live_allocation_count(), 1);
}

#[test]
fn destroy_is_idempotent_and_frees_everything() {
    let device = device();
    let blas = triangle_blas(&device);
    let tlas = tlas_over(&device, &[&blas], ContainerFlags::ALLOW_UPDATE);
    let instance_buffer = tlas.instance_buffer().unwrap();

    tlas.destroy();
    tlas.destroy();

    assert!(tlas.is_destroyed());
    assert!(instance_buffer.is_destroyed());
    assert!(matches!(tlas.handle(), Err(RtError::UseAfterDestroy { .. })));
    assert!(matches!(tlas.scratch_memory(), Err(RtError::UseAfterDestroy { .. })));
    assert!(matches!(tlas.encode_build(&mut HeadlessRecorder::new()), Err(RtError::UseAfterDestroy { .. })));
    assert!(matches!(tlas.validate_can_use_in_submit(), Err(RtError::UseAfterDestroy { .. })));

    // the bottom level container is shared, not destroyed with the top level one
    assert!(!blas.is_destroyed());
    assert_eq!(device.live_allocation_count(), 2);

    drop(blas);
    drop(tlas);
    assert_eq!(device.live_allocation_count(), 0);
}

#[test]
fn allocation_failure_aborts_initialization_and_cleans_up() {
    let device = device();
    let buffer = vertex_buffer(&*device, 3);
    device.fail_allocations_after(1);

    let desc = ContainerDescriptor::bottom_level(vec![triangle_geometry(buffer)]);
    let result = TestContainer::new(&device, &desc);

    assert!(matches!(result, Err(RtError::DeviceResourceExhaustion { .. })));
    assert_eq!(device.allocation_count(), 1);
    assert_eq!(device.live_allocation_count(), 0);
}

#[test]
fn error_handle_repeats_its_creation_error() {
    let config = RayTracingConfig::builder().ray_tracing_supported(false).build().unwrap();
    let device = HeadlessDevice::<raven_rt::backend::vulkan::Vulkan>::new(config);
    let buffer = vertex_buffer(&*device, 3);

    let handle = AccelerationContainer::create(
        &device,
        &ContainerDescriptor::bottom_level(vec![triangle_geometry(buffer)]),
    );
    assert!(handle.is_error());

    let expected = handle.error().cloned().unwrap();
    assert!(matches!(expected, RtError::Unsupported { .. }));

    let mut recorder = HeadlessRecorder::new();
    for _ in 0..3 {
        assert_eq!(handle.encode_build(&mut recorder).err(), Some(expected.clone()));
        assert_eq!(handle.handle().err(), Some(expected.clone()));
        assert_eq!(handle.scratch_memory().err(), Some(expected.clone()));
        assert_eq!(handle.destroy().err(), Some(expected.clone()));
        assert_eq!(handle.level().err(), Some(expected.clone()));
    }
    assert!(recorder.commands().is_empty());
}

#[test]
fn valid_handle_forwards_to_the_container() {
    let device = device();
    let buffer = vertex_buffer(&*device, 3);
    let handle = AccelerationContainer::create(
        &device,
        &ContainerDescriptor::bottom_level(vec![triangle_geometry(buffer)]),
    );

    assert!(!handle.is_error());
    assert_eq!(handle.level().unwrap(), ContainerLevel::Bottom);
    handle.encode_build(&mut HeadlessRecorder::new()).unwrap();
    assert!(handle.is_built().unwrap());
    assert!(is_structural(&handle.update_instance(0, &InstanceDescriptor::new(handle.container().unwrap().clone()))));

    handle.destroy().unwrap();
    assert!(handle.is_destroyed().unwrap());
}

#[test]
fn partial_triangles_are_rejected() {
    let device = device();
    let vertices = vertex_buffer(&*device, 6);

    for count in [1, 2, 4] {
        let mut vertex = vertex_data(vertices.clone());
        vertex.count = count;
        let desc = ContainerDescriptor::bottom_level(vec![GeometryDescriptor::triangles(vertex, None)]);
        assert!(is_structural(&TestContainer::new(&device, &desc)));
    }

    let indices = device.create_buffer(BufferDesc::new_ray_tracing_input(32, BufferUsage::INDEX), "indices").unwrap();
    for count in [2, 4] {
        let index = IndexData {
            buffer: indices.clone(),
            offset: 0,
            count,
            format: IndexFormat::Uint32,
        };
        let desc = ContainerDescriptor::bottom_level(vec![
            GeometryDescriptor::triangles(vertex_data(vertices.clone()), Some(index)),
        ]);
        assert!(is_structural(&TestContainer::new(&device, &desc)));
    }
}

#[test]
fn aabb_stride_must_be_8_byte_aligned() {
    let device = device();
    let aabbs = aabb_buffer(&*device, 4);

    let with_stride = |stride| ContainerDescriptor::bottom_level(vec![GeometryDescriptor::aabbs(AabbData {
        buffer: aabbs.clone(),
        offset: 0,
        count: 1,
        stride,
    })]);

    assert!(is_structural(&TestContainer::new(&device, &with_stride(25))));
    assert!(is_structural(&TestContainer::new(&device, &with_stride(36))));
    assert!(is_structural(&TestContainer::new(&device, &with_stride(16))));
    TestContainer::new(&device, &with_stride(32)).unwrap();
    TestContainer::new(&device, &with_stride(0)).unwrap();
}

#[test]
fn invalid_device_alignment_yields_error_handle() {
    let config = RayTracingConfig {
        min_scratch_offset_alignment: 0,
        ..Default::default()
    };
    let device = HeadlessDevice::<raven_rt::backend::vulkan::Vulkan>::new(config);
    let buffer = vertex_buffer(&*device, 3);

    let handle = AccelerationContainer::create(
        &device,
        &ContainerDescriptor::bottom_level(vec![triangle_geometry(buffer)]),
    );
    assert!(matches!(handle.error(), Some(RtError::StructuralValidation { .. })));
    assert_eq!(device.allocation_count(), 0);

    let sizes = PrebuildSizes {
        result_size: 512,
        build_scratch_size: 256,
        update_scratch_size: 0,
    };
    let mut pool = ScratchMemoryPool::default();
    let result = ScratchMemoryManager::reserve(&*device, &sizes, &mut pool);
    assert!(matches!(result, Err(RtError::StructuralValidation { .. })));
    assert!(pool.is_empty());
}
