#![allow(dead_code)]

use std::sync::Arc;

use raven_rt::accel::{
    AabbData, ContainerDescriptor, ContainerFlags, GeometryDescriptor, InstanceDescriptor,
    VertexData, VertexFormat,
};
use raven_rt::backend::headless::{HeadlessDevice, HeadlessRecorder};
use raven_rt::backend::vulkan::Vulkan;
use raven_rt::{AccelerationContainer, Buffer, BufferDesc, BufferUsage, Device, RayTracingConfig};

pub type TestDevice = HeadlessDevice<Vulkan>;
pub type TestContainer = AccelerationContainer<TestDevice>;

pub fn device() -> Arc<TestDevice> {
    HeadlessDevice::new(RayTracingConfig::default())
}

pub fn vertex_buffer<D: Device>(device: &D, vertex_count: u64) -> Arc<Buffer> {
    device.create_buffer(
        BufferDesc::new_ray_tracing_input(vertex_count * 12, BufferUsage::VERTEX),
        "test vertices",
    ).unwrap()
}

pub fn aabb_buffer<D: Device>(device: &D, aabb_count: u64) -> Arc<Buffer> {
    device.create_buffer(
        BufferDesc::new_ray_tracing_input(aabb_count * 24, BufferUsage::STORAGE),
        "test aabbs",
    ).unwrap()
}

pub fn vertex_data(buffer: Arc<Buffer>) -> VertexData {
    VertexData {
        buffer,
        offset: 0,
        stride: 12,
        count: 3,
        format: VertexFormat::Float3,
    }
}

pub fn aabb_data(buffer: Arc<Buffer>) -> AabbData {
    AabbData {
        buffer,
        offset: 0,
        count: 1,
        stride: 0,
    }
}

pub fn triangle_geometry(buffer: Arc<Buffer>) -> GeometryDescriptor {
    GeometryDescriptor::triangles(vertex_data(buffer), None)
}

pub fn triangle_blas<D: Device>(device: &Arc<D>) -> Arc<AccelerationContainer<D>> {
    let buffer = vertex_buffer(&**device, 3);
    AccelerationContainer::new(device, &ContainerDescriptor::bottom_level(vec![triangle_geometry(buffer)]))
        .unwrap()
}

pub fn built_triangle_blas<D: Device>(device: &Arc<D>) -> Arc<AccelerationContainer<D>> {
    let blas = triangle_blas(device);
    blas.encode_build(&mut HeadlessRecorder::new()).unwrap();
    blas
}

pub fn tlas_over<D: Device>(
    device: &Arc<D>,
    blases: &[&Arc<AccelerationContainer<D>>],
    flags: ContainerFlags,
) -> Arc<AccelerationContainer<D>> {
    let instances = blases.iter()
        .enumerate()
        .map(|(index, blas)| InstanceDescriptor::new((*blas).clone()).with_instance_id(index as u32))
        .collect();

    AccelerationContainer::new(device, &ContainerDescriptor::top_level(instances).with_flags(flags))
        .unwrap()
}
