//! D3D12 raytracing build input layout, expressed with plain `repr(C)` records mirroring
//! `D3D12_BUILD_RAYTRACING_ACCELERATION_STRUCTURE_INPUTS`.

use crate::accel::{
    ContainerFlags, ContainerLevel, GeometryDescriptor, GeometryFlags, GeometryType,
    IndexFormat, InstanceFlags, VertexFormat,
};
use crate::device::DeviceAddress;

use super::{BuildInputTranslator, BuildInputsSummary};

pub struct D3d12;

pub const RAYTRACING_ACCELERATION_STRUCTURE_TYPE_TOP_LEVEL: u32 = 0;
pub const RAYTRACING_ACCELERATION_STRUCTURE_TYPE_BOTTOM_LEVEL: u32 = 1;

pub const RAYTRACING_GEOMETRY_TYPE_TRIANGLES: u32 = 0;
pub const RAYTRACING_GEOMETRY_TYPE_PROCEDURAL_PRIMITIVE_AABBS: u32 = 1;

pub const ELEMENTS_LAYOUT_ARRAY: u32 = 0;

pub const BUILD_FLAG_ALLOW_UPDATE: u32 = 0x1;
pub const BUILD_FLAG_PREFER_FAST_TRACE: u32 = 0x4;
pub const BUILD_FLAG_PREFER_FAST_BUILD: u32 = 0x8;
pub const BUILD_FLAG_MINIMIZE_MEMORY: u32 = 0x10;

pub const GEOMETRY_FLAG_OPAQUE: u32 = 0x1;
pub const GEOMETRY_FLAG_NO_DUPLICATE_ANYHIT_INVOCATION: u32 = 0x2;

pub const INSTANCE_FLAG_TRIANGLE_CULL_DISABLE: u8 = 0x1;
pub const INSTANCE_FLAG_TRIANGLE_FRONT_COUNTERCLOCKWISE: u8 = 0x2;
pub const INSTANCE_FLAG_FORCE_OPAQUE: u8 = 0x4;
pub const INSTANCE_FLAG_FORCE_NON_OPAQUE: u8 = 0x8;

pub const DXGI_FORMAT_UNKNOWN: u32 = 0;
pub const DXGI_FORMAT_R32G32B32_FLOAT: u32 = 6;
pub const DXGI_FORMAT_R32G32_FLOAT: u32 = 16;
pub const DXGI_FORMAT_R32_UINT: u32 = 42;
pub const DXGI_FORMAT_R16_UINT: u32 = 57;

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct GpuVirtualAddressAndStride {
    pub start_address: DeviceAddress,
    pub stride_in_bytes: u64,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct GeometryTrianglesDesc {
    pub transform_3x4: DeviceAddress,
    pub index_format: u32,
    pub vertex_format: u32,
    pub index_count: u32,
    pub vertex_count: u32,
    pub index_buffer: DeviceAddress,
    pub vertex_buffer: GpuVirtualAddressAndStride,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct GeometryAabbsDesc {
    pub aabb_count: u64,
    pub aabbs: GpuVirtualAddressAndStride,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GeometryDescData {
    Triangles(GeometryTrianglesDesc),
    Aabbs(GeometryAabbsDesc),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RaytracingGeometryDesc {
    pub ty: u32,
    pub flags: u32,
    pub data: GeometryDescData,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct D3d12BuildInputs {
    pub ty: u32,
    pub flags: u32,
    pub num_descs: u32,
    pub descs_layout: u32,
    /// Bottom level only.
    pub geometry_descs: Vec<RaytracingGeometryDesc>,
    /// Top level only.
    pub instance_descs: DeviceAddress,
}

pub fn container_flags(flags: ContainerFlags) -> u32 {
    let mut result = 0;

    if flags.contains(ContainerFlags::ALLOW_UPDATE) {
        result |= BUILD_FLAG_ALLOW_UPDATE;
    }
    if flags.contains(ContainerFlags::PREFER_FAST_BUILD) {
        result |= BUILD_FLAG_PREFER_FAST_BUILD;
    }
    if flags.contains(ContainerFlags::PREFER_FAST_TRACE) {
        result |= BUILD_FLAG_PREFER_FAST_TRACE;
    }
    if flags.contains(ContainerFlags::LOW_MEMORY) {
        result |= BUILD_FLAG_MINIMIZE_MEMORY;
    }

    result
}

pub fn geometry_flags(flags: GeometryFlags) -> u32 {
    let mut result = 0;

    if flags.contains(GeometryFlags::OPAQUE) {
        result |= GEOMETRY_FLAG_OPAQUE;
    }
    if flags.contains(GeometryFlags::NO_DUPLICATE_ANY_HIT_INVOCATION) {
        result |= GEOMETRY_FLAG_NO_DUPLICATE_ANYHIT_INVOCATION;
    }

    result
}

pub fn vertex_format(format: VertexFormat) -> u32 {
    match format {
        VertexFormat::Float2 => DXGI_FORMAT_R32G32_FLOAT,
        VertexFormat::Float3 => DXGI_FORMAT_R32G32B32_FLOAT,
    }
}

pub fn index_format(format: Option<IndexFormat>) -> u32 {
    match format {
        Some(IndexFormat::Uint16) => DXGI_FORMAT_R16_UINT,
        Some(IndexFormat::Uint32) => DXGI_FORMAT_R32_UINT,
        None => DXGI_FORMAT_UNKNOWN,
    }
}

impl BuildInputTranslator for D3d12 {
    type Geometry = RaytracingGeometryDesc;
    type BuildInputs = D3d12BuildInputs;

    const NAME: &'static str = "d3d12";

    fn translate_geometry(geometry: &GeometryDescriptor) -> Self::Geometry {
        match geometry.ty {
            GeometryType::Triangles => {
                let mut triangles = GeometryTrianglesDesc {
                    index_format: index_format(geometry.index.as_ref().map(|index| index.format)),
                    ..Default::default()
                };

                if let Some(vertex) = &geometry.vertex {
                    triangles.vertex_format = vertex_format(vertex.format);
                    triangles.vertex_count = vertex.count;
                    triangles.vertex_buffer = GpuVirtualAddressAndStride {
                        start_address: vertex.buffer.device_address() + vertex.offset,
                        stride_in_bytes: vertex.stride,
                    };
                }

                if let Some(index) = &geometry.index {
                    triangles.index_count = index.count;
                    triangles.index_buffer = index.buffer.device_address() + index.offset;
                }

                RaytracingGeometryDesc {
                    ty: RAYTRACING_GEOMETRY_TYPE_TRIANGLES,
                    flags: geometry_flags(geometry.flags),
                    data: GeometryDescData::Triangles(triangles),
                }
            }
            GeometryType::Aabbs => {
                let aabbs = geometry.aabb.as_ref()
                    .map(|aabb| GeometryAabbsDesc {
                        aabb_count: aabb.count as u64,
                        aabbs: GpuVirtualAddressAndStride {
                            start_address: aabb.buffer.device_address() + aabb.offset,
                            stride_in_bytes: aabb.effective_stride(),
                        },
                    })
                    .unwrap_or_default();

                RaytracingGeometryDesc {
                    ty: RAYTRACING_GEOMETRY_TYPE_PROCEDURAL_PRIMITIVE_AABBS,
                    flags: geometry_flags(geometry.flags),
                    data: GeometryDescData::Aabbs(aabbs),
                }
            }
        }
    }

    fn translate_instance_flags(flags: InstanceFlags) -> u8 {
        let mut result = 0;

        if flags.contains(InstanceFlags::TRIANGLE_CULL_DISABLE) {
            result |= INSTANCE_FLAG_TRIANGLE_CULL_DISABLE;
        }
        if flags.contains(InstanceFlags::TRIANGLE_FRONT_COUNTERCLOCKWISE) {
            result |= INSTANCE_FLAG_TRIANGLE_FRONT_COUNTERCLOCKWISE;
        }
        if flags.contains(InstanceFlags::FORCE_OPAQUE) {
            result |= INSTANCE_FLAG_FORCE_OPAQUE;
        }
        if flags.contains(InstanceFlags::FORCE_NO_OPAQUE) {
            result |= INSTANCE_FLAG_FORCE_NON_OPAQUE;
        }

        result
    }

    fn bottom_level_inputs(
        flags: ContainerFlags,
        geometries: &[GeometryDescriptor],
    ) -> Self::BuildInputs {
        D3d12BuildInputs {
            ty: RAYTRACING_ACCELERATION_STRUCTURE_TYPE_BOTTOM_LEVEL,
            flags: container_flags(flags),
            num_descs: geometries.len() as u32,
            descs_layout: ELEMENTS_LAYOUT_ARRAY,
            geometry_descs: geometries.iter().map(Self::translate_geometry).collect(),
            instance_descs: 0,
        }
    }

    fn top_level_inputs(
        flags: ContainerFlags,
        instance_address: DeviceAddress,
        instance_count: u32,
    ) -> Self::BuildInputs {
        D3d12BuildInputs {
            ty: RAYTRACING_ACCELERATION_STRUCTURE_TYPE_TOP_LEVEL,
            flags: container_flags(flags),
            num_descs: instance_count,
            descs_layout: ELEMENTS_LAYOUT_ARRAY,
            geometry_descs: Vec::new(),
            instance_descs: instance_address,
        }
    }

    fn summarize(inputs: &Self::BuildInputs) -> BuildInputsSummary {
        let is_top_level = inputs.ty == RAYTRACING_ACCELERATION_STRUCTURE_TYPE_TOP_LEVEL;

        let primitive_count = if is_top_level {
            inputs.num_descs as u64
        } else {
            inputs.geometry_descs.iter()
                .map(|desc| match desc.data {
                    GeometryDescData::Triangles(triangles) if triangles.index_count > 0 => {
                        (triangles.index_count / 3) as u64
                    }
                    GeometryDescData::Triangles(triangles) => (triangles.vertex_count / 3) as u64,
                    GeometryDescData::Aabbs(aabbs) => aabbs.aabb_count,
                })
                .sum()
        };

        BuildInputsSummary {
            level: if is_top_level { ContainerLevel::Top } else { ContainerLevel::Bottom },
            geometry_count: if is_top_level { 0 } else { inputs.num_descs },
            primitive_count,
            allow_update: inputs.flags & BUILD_FLAG_ALLOW_UPDATE != 0,
        }
    }
}
