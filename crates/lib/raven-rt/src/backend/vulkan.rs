use ash::vk;

use crate::accel::{
    ContainerFlags, ContainerLevel, GeometryDescriptor, GeometryFlags, GeometryType,
    IndexFormat, InstanceFlags, VertexFormat,
};
use crate::device::DeviceAddress;

use super::{BuildInputTranslator, BuildInputsSummary};

/// `VK_KHR_acceleration_structure` build inputs.
pub struct Vulkan;

/// Build inputs of one acceleration structure, ready for `vkCmdBuildAccelerationStructuresKHR`.
#[derive(Clone)]
pub struct VulkanBuildInputs {
    pub ty: vk::AccelerationStructureTypeKHR,
    pub flags: vk::BuildAccelerationStructureFlagsKHR,
    pub geometries: Vec<vk::AccelerationStructureGeometryKHR>,
    pub build_range_infos: Vec<vk::AccelerationStructureBuildRangeInfoKHR>,
    pub max_primitive_counts: Vec<u32>,
}

// p_next of every stored geometry is null and the geometry data only carries device addresses
unsafe impl Send for VulkanBuildInputs {}
unsafe impl Sync for VulkanBuildInputs {}

impl std::fmt::Debug for VulkanBuildInputs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanBuildInputs")
            .field("ty", &self.ty)
            .field("flags", &self.flags)
            .field("geometry_count", &self.geometries.len())
            .field("max_primitive_counts", &self.max_primitive_counts)
            .finish()
    }
}

impl VulkanBuildInputs {
    /// Geometry info pointing into `self.geometries`, only valid while `self` is borrowed.
    pub fn geometry_build_info(
        &self,
        mode: vk::BuildAccelerationStructureModeKHR,
    ) -> vk::AccelerationStructureBuildGeometryInfoKHR {
        vk::AccelerationStructureBuildGeometryInfoKHR::builder()
            .ty(self.ty)
            .flags(self.flags)
            .mode(mode)
            .geometries(&self.geometries)
            .build()
    }
}

pub fn container_flags(flags: ContainerFlags) -> vk::BuildAccelerationStructureFlagsKHR {
    let mut result = vk::BuildAccelerationStructureFlagsKHR::empty();

    if flags.contains(ContainerFlags::ALLOW_UPDATE) {
        result |= vk::BuildAccelerationStructureFlagsKHR::ALLOW_UPDATE;
    }
    if flags.contains(ContainerFlags::PREFER_FAST_BUILD) {
        result |= vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_BUILD;
    }
    if flags.contains(ContainerFlags::PREFER_FAST_TRACE) {
        result |= vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE;
    }
    if flags.contains(ContainerFlags::LOW_MEMORY) {
        result |= vk::BuildAccelerationStructureFlagsKHR::LOW_MEMORY;
    }

    result
}

pub fn geometry_flags(flags: GeometryFlags) -> vk::GeometryFlagsKHR {
    let mut result = vk::GeometryFlagsKHR::empty();

    if flags.contains(GeometryFlags::OPAQUE) {
        result |= vk::GeometryFlagsKHR::OPAQUE;
    }
    if flags.contains(GeometryFlags::NO_DUPLICATE_ANY_HIT_INVOCATION) {
        result |= vk::GeometryFlagsKHR::NO_DUPLICATE_ANY_HIT_INVOCATION;
    }

    result
}

pub fn vertex_format(format: VertexFormat) -> vk::Format {
    match format {
        VertexFormat::Float2 => vk::Format::R32G32_SFLOAT,
        VertexFormat::Float3 => vk::Format::R32G32B32_SFLOAT,
    }
}

pub fn index_type(format: Option<IndexFormat>) -> vk::IndexType {
    match format {
        Some(IndexFormat::Uint16) => vk::IndexType::UINT16,
        Some(IndexFormat::Uint32) => vk::IndexType::UINT32,
        None => vk::IndexType::NONE_KHR,
    }
}

// VK_GEOMETRY_INSTANCE_TRIANGLE_FRONT_COUNTERCLOCKWISE_BIT_KHR
const TRIANGLE_FRONT_COUNTERCLOCKWISE: vk::GeometryInstanceFlagsKHR =
    vk::GeometryInstanceFlagsKHR::from_raw(0b10);

#[inline]
fn address(device_address: DeviceAddress) -> vk::DeviceOrHostAddressConstKHR {
    vk::DeviceOrHostAddressConstKHR { device_address }
}

impl BuildInputTranslator for Vulkan {
    type Geometry = vk::AccelerationStructureGeometryKHR;
    type BuildInputs = VulkanBuildInputs;

    const NAME: &'static str = "vulkan";

    fn translate_geometry(geometry: &GeometryDescriptor) -> Self::Geometry {
        let (geometry_type, data) = match geometry.ty {
            GeometryType::Triangles => {
                let mut triangles = vk::AccelerationStructureGeometryTrianglesDataKHR::builder()
                    .index_type(index_type(geometry.index.as_ref().map(|index| index.format)));

                if let Some(vertex) = &geometry.vertex {
                    triangles = triangles
                        .vertex_format(vertex_format(vertex.format))
                        .vertex_data(address(vertex.buffer.device_address() + vertex.offset))
                        .vertex_stride(vertex.stride)
                        // highest addressable vertex index
                        .max_vertex(vertex.count.saturating_sub(1));
                }

                if let Some(index) = &geometry.index {
                    triangles = triangles
                        .index_data(address(index.buffer.device_address() + index.offset));
                }

                (
                    vk::GeometryTypeKHR::TRIANGLES,
                    vk::AccelerationStructureGeometryDataKHR {
                        triangles: triangles.build(),
                    },
                )
            }
            GeometryType::Aabbs => {
                let mut aabbs = vk::AccelerationStructureGeometryAabbsDataKHR::builder();

                if let Some(aabb) = &geometry.aabb {
                    aabbs = aabbs
                        .data(address(aabb.buffer.device_address() + aabb.offset))
                        .stride(aabb.effective_stride());
                }

                (
                    vk::GeometryTypeKHR::AABBS,
                    vk::AccelerationStructureGeometryDataKHR {
                        aabbs: aabbs.build(),
                    },
                )
            }
        };

        vk::AccelerationStructureGeometryKHR::builder()
            .geometry_type(geometry_type)
            .geometry(data)
            .flags(geometry_flags(geometry.flags))
            .build()
    }

    fn translate_instance_flags(flags: InstanceFlags) -> u8 {
        let mut result = vk::GeometryInstanceFlagsKHR::empty();

        if flags.contains(InstanceFlags::TRIANGLE_CULL_DISABLE) {
            result |= vk::GeometryInstanceFlagsKHR::TRIANGLE_FACING_CULL_DISABLE;
        }
        if flags.contains(InstanceFlags::TRIANGLE_FRONT_COUNTERCLOCKWISE) {
            result |= TRIANGLE_FRONT_COUNTERCLOCKWISE;
        }
        if flags.contains(InstanceFlags::FORCE_OPAQUE) {
            result |= vk::GeometryInstanceFlagsKHR::FORCE_OPAQUE;
        }
        if flags.contains(InstanceFlags::FORCE_NO_OPAQUE) {
            result |= vk::GeometryInstanceFlagsKHR::FORCE_NO_OPAQUE;
        }

        result.as_raw() as u8
    }

    fn bottom_level_inputs(
        flags: ContainerFlags,
        geometries: &[GeometryDescriptor],
    ) -> Self::BuildInputs {
        let max_primitive_counts: Vec<u32> = geometries.iter()
            .map(|geometry| geometry.primitive_count())
            .collect();

        let build_range_infos = max_primitive_counts.iter()
            .map(|&primitive_count| {
                vk::AccelerationStructureBuildRangeInfoKHR::builder()
                    .primitive_count(primitive_count)
                    .primitive_offset(0)
                    .first_vertex(0)
                    .transform_offset(0)
                    .build()
            })
            .collect();

        VulkanBuildInputs {
            ty: vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL,
            flags: container_flags(flags),
            geometries: geometries.iter().map(Self::translate_geometry).collect(),
            build_range_infos,
            max_primitive_counts,
        }
    }

    fn top_level_inputs(
        flags: ContainerFlags,
        instance_address: DeviceAddress,
        instance_count: u32,
    ) -> Self::BuildInputs {
        let geometry = vk::AccelerationStructureGeometryKHR::builder()
            .geometry_type(vk::GeometryTypeKHR::INSTANCES)
            .geometry(vk::AccelerationStructureGeometryDataKHR {
                instances: vk::AccelerationStructureGeometryInstancesDataKHR::builder()
                    .array_of_pointers(false)
                    .data(address(instance_address))
                    .build(),
            })
            .build();

        let build_range_info = vk::AccelerationStructureBuildRangeInfoKHR::builder()
            .primitive_count(instance_count)
            .build();

        VulkanBuildInputs {
            ty: vk::AccelerationStructureTypeKHR::TOP_LEVEL,
            flags: container_flags(flags),
            geometries: vec![geometry],
            build_range_infos: vec![build_range_info],
            max_primitive_counts: vec![instance_count],
        }
    }

    fn summarize(inputs: &Self::BuildInputs) -> BuildInputsSummary {
        let is_top_level = inputs.ty == vk::AccelerationStructureTypeKHR::TOP_LEVEL;

        BuildInputsSummary {
            level: if is_top_level { ContainerLevel::Top } else { ContainerLevel::Bottom },
            // the single instances geometry of a top level is not a user geometry
            geometry_count: if is_top_level { 0 } else { inputs.geometries.len() as u32 },
            primitive_count: inputs.max_primitive_counts.iter().map(|&count| count as u64).sum(),
            allow_update: inputs.flags.contains(vk::BuildAccelerationStructureFlagsKHR::ALLOW_UPDATE),
        }
    }
}
