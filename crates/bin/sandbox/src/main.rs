// use log macros.
#[macro_use]
extern crate log as _log;

mod console;

use std::sync::Arc;

use raven_math::{Vec3, AABB};
use raven_rt::accel::{
    AabbData, ContainerFlags, GeometryDescriptor, GeometryFlags, InstanceDescriptor,
    InstanceFlags, TransformDescriptor, VertexData, VertexFormat,
};
use raven_rt::backend::d3d12::D3d12;
use raven_rt::backend::headless::{HeadlessDescriptorAllocator, HeadlessDevice, HeadlessRecorder};
use raven_rt::backend::vulkan::Vulkan;
use raven_rt::backend::BuildInputTranslator;
use raven_rt::descriptor::{
    BindGroup, BindGroupEntry, BindGroupLayout, BindGroupLayoutEntry, BindingType,
};
use raven_rt::sbt::{ShaderDescriptor, ShaderModuleHandle, ShaderStage};
use raven_rt::{
    AccelerationContainer, Buffer, BufferDesc, BufferUsage, ContainerDescriptor, Device,
    RayTracingConfig, RayTracingPipeline, RayTracingPipelineDesc, ShaderBindingTable,
    ShaderGroupRole,
};

use console::BackendKind;

fn upload_vertices<D: Device>(device: &D, vertices: &[Vec3]) -> anyhow::Result<Arc<Buffer>> {
    let bytes: Vec<u8> = vertices.iter()
        .flat_map(|vertex| vertex.to_array())
        .flat_map(|value| value.to_ne_bytes())
        .collect();

    let buffer = device.create_buffer(
        BufferDesc::new_ray_tracing_input(bytes.len() as u64, BufferUsage::VERTEX),
        "sandbox triangle",
    )?;
    device.upload_buffer_data(&buffer, 0, &bytes)?;

    Ok(buffer)
}

fn upload_aabbs<D: Device>(device: &D, aabbs: &[AABB]) -> anyhow::Result<Arc<Buffer>> {
    let bytes = AABB::pack_all(aabbs);

    let buffer = device.create_buffer(
        BufferDesc::new_ray_tracing_input(bytes.len() as u64, BufferUsage::STORAGE),
        "sandbox boxes",
    )?;
    device.upload_buffer_data(&buffer, 0, &bytes)?;

    Ok(buffer)
}

fn run<B: BuildInputTranslator>(config: RayTracingConfig) -> anyhow::Result<()> {
    let device = HeadlessDevice::<B>::new(config);
    info!("Running ray tracing scenario on headless {} device", B::NAME);

    // bottom level: one triangle and two procedural boxes
    let triangle = upload_vertices(&*device, &[
        Vec3::new(-1.0, -1.0, 0.0),
        Vec3::new(1.0, -1.0, 0.0),
        Vec3::new(0.0, 1.0, 0.0),
    ])?;
    let triangle_blas = AccelerationContainer::new(&device, &ContainerDescriptor::bottom_level(vec![
        GeometryDescriptor::triangles(VertexData {
            buffer: triangle,
            offset: 0,
            stride: 12,
            count: 3,
            format: VertexFormat::Float3,
        }, None)
        .with_flags(GeometryFlags::OPAQUE),
    ]))?;

    let boxes = [
        AABB::from_min_max(Vec3::splat(-0.5), Vec3::splat(0.5)),
        AABB::from_min_max(Vec3::new(1.0, 0.0, 0.0), Vec3::new(2.0, 1.0, 1.0)),
    ];
    let procedural_blas = AccelerationContainer::new(&device, &ContainerDescriptor::bottom_level(vec![
        GeometryDescriptor::aabbs(AabbData {
            buffer: upload_aabbs(&*device, &boxes)?,
            offset: 0,
            count: boxes.len() as u32,
            stride: 0,
        }),
    ]))?;

    // top level: both bottom levels side by side
    let tlas = AccelerationContainer::create(&device, &ContainerDescriptor::top_level(vec![
        InstanceDescriptor::new(triangle_blas.clone())
            .with_flags(InstanceFlags::TRIANGLE_CULL_DISABLE),
        InstanceDescriptor::new(procedural_blas.clone())
            .with_instance_id(1)
            .with_instance_offset(1)
            .with_transform(TransformDescriptor {
                translation: Vec3::new(3.0, 0.0, 0.0),
                ..Default::default()
            }),
    ])
    .with_flags(ContainerFlags::ALLOW_UPDATE | ContainerFlags::PREFER_FAST_TRACE));

    let mut recorder = HeadlessRecorder::new();
    triangle_blas.encode_build(&mut recorder)?;
    procedural_blas.encode_build(&mut recorder)?;
    tlas.encode_build(&mut recorder)?;
    device.submit();

    triangle_blas.release_build_scratch()?;
    procedural_blas.release_build_scratch()?;
    tlas.release_build_scratch()?;

    // move the boxes and refit
    tlas.update_instance(1, &InstanceDescriptor::new(procedural_blas.clone())
        .with_instance_id(1)
        .with_instance_offset(1)
        .with_transform(TransformDescriptor {
            translation: Vec3::new(3.0, 1.0, 0.0),
            rotation: Vec3::new(0.0, 45.0, 0.0),
            ..Default::default()
        }))?;
    tlas.encode_update(&mut recorder)?;
    info!("Recorded {} acceleration container commands", recorder.commands().len());

    // shaders and descriptors the trace consumes
    let table = ShaderBindingTable::create(&device.ray_tracing_properties(), &[
        ShaderDescriptor::new(ShaderStage::RayGeneration, ShaderModuleHandle(0)),
        ShaderDescriptor::new(ShaderStage::Miss, ShaderModuleHandle(1)),
        ShaderDescriptor::new(ShaderStage::ClosestHit, ShaderModuleHandle(2)),
        ShaderDescriptor::new(ShaderStage::Intersection, ShaderModuleHandle(3)),
    ])?;

    let layout = BindGroupLayout::new(&[
        BindGroupLayoutEntry { binding: 0, ty: BindingType::AccelerationContainer },
        BindGroupLayoutEntry { binding: 1, ty: BindingType::StorageBuffer },
    ])?;
    let output = device.create_buffer(BufferDesc::new(4 * 64 * 64, BufferUsage::STORAGE), "sandbox output")?;

    let pipeline = RayTracingPipeline::new(RayTracingPipelineDesc {
        bind_group_layouts: vec![layout.clone()],
        shader_binding_table: Some(table.clone()),
        max_recursion_depth: 1,
    })?;

    let mut bind_group = BindGroup::new(layout, vec![
        BindGroupEntry::acceleration_container(0, tlas.container()?.clone()),
        BindGroupEntry::buffer(1, output),
    ])?;

    let mut allocator = HeadlessDescriptorAllocator::from_config(device.clone(), device.config());
    for _ in 0..2 {
        bind_group.populate_with_rotation(&mut allocator)?;
    }

    info!(
        "Trace ready: miss region at {} bytes, descriptors copied {} times",
        pipeline.shader_binding_table_offset(ShaderGroupRole::Miss)?,
        allocator.copy_count()
    );

    tlas.destroy()?;
    triangle_blas.destroy();
    procedural_blas.destroy();
    table.destroy();

    debug!("{} device allocations still alive", device.live_allocation_count());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let console_vars = console::from_args()?;

    raven_log::init_log(raven_log::LogConfig {
        level: console_vars.level,
        file: console_vars.log_file,
    })?;

    let config = match &console_vars.config {
        Some(path) => RayTracingConfig::load(path)?,
        None => RayTracingConfig::default(),
    };

    match console_vars.backend {
        BackendKind::Vulkan => run::<Vulkan>(config),
        BackendKind::D3d12 => run::<D3d12>(config),
    }
}
