use std::sync::Arc;

use crate::buffer::{Buffer, BufferUsage};
use crate::device::Device;
use crate::error::{ensure_structure, RtError, RtResult};

use super::desc::{
    ContainerDescriptor, ContainerLevel, GeometryDescriptor, GeometryType, InstanceDescriptor,
    DEFAULT_AABB_STRIDE, MAX_INSTANCE_FIELD_VALUE,
};
use super::instance::resolve_transform;

/// Both native APIs read boxes at 8-byte aligned strides.
const AABB_STRIDE_ALIGNMENT: u64 = 8;

/// Check every structural rule of a container descriptor. Runs before any device work.
pub fn validate_container_descriptor<D: Device>(desc: &ContainerDescriptor<D>) -> RtResult<()> {
    match desc.level {
        ContainerLevel::Bottom => {
            ensure_structure!(
                desc.instances.is_empty(),
                "Instance count for bottom-level acceleration container must be zero"
            );
            ensure_structure!(
                !desc.geometries.is_empty(),
                "No data provided for bottom-level acceleration container"
            );

            for (index, geometry) in desc.geometries.iter().enumerate() {
                validate_geometry(index, geometry)?;
            }
        }
        ContainerLevel::Top => {
            ensure_structure!(
                desc.geometries.is_empty(),
                "Geometry count for top-level acceleration container must be zero"
            );
            ensure_structure!(
                !desc.instances.is_empty(),
                "No data provided for top-level acceleration container"
            );

            for (index, instance) in desc.instances.iter().enumerate() {
                validate_instance(index, instance)?;
            }
        }
    }

    Ok(())
}

pub fn validate_geometry(index: usize, geometry: &GeometryDescriptor) -> RtResult<()> {
    if geometry.aabb.is_some() {
        ensure_structure!(
            geometry.vertex.is_none() && geometry.index.is_none(),
            "AABB is not allowed to be combined with vertex data (geometry {})", index
        );
    }

    match geometry.ty {
        GeometryType::Triangles => {
            let vertex = geometry.vertex.as_ref()
                .ok_or_else(|| RtError::structural(format!("No vertex data provided for geometry {}", index)))?;

            validate_input_buffer(&vertex.buffer, "Vertex")?;
            ensure_structure!(vertex.count > 0, "Vertex count of geometry {} must be nonzero", index);
            ensure_structure!(vertex.stride > 0, "Vertex stride of geometry {} must be nonzero", index);

            if let Some(index_data) = &geometry.index {
                validate_input_buffer(&index_data.buffer, "Index")?;
                ensure_structure!(index_data.count > 0, "Index count of geometry {} must be nonzero", index);
                ensure_structure!(
                    index_data.count % 3 == 0,
                    "Index count {} of geometry {} is not a whole number of triangles", index_data.count, index
                );
            } else {
                ensure_structure!(
                    vertex.count % 3 == 0,
                    "Vertex count {} of non-indexed geometry {} is not a whole number of triangles",
                    vertex.count, index
                );
            }
        }
        GeometryType::Aabbs => {
            ensure_structure!(
                geometry.vertex.is_none() && geometry.index.is_none(),
                "Procedural geometry {} must not carry vertex or index data", index
            );

            let aabb = geometry.aabb.as_ref()
                .ok_or_else(|| RtError::structural(format!("No AABB data provided for geometry {}", index)))?;

            validate_input_buffer(&aabb.buffer, "AABB")?;
            ensure_structure!(aabb.count > 0, "AABB count of geometry {} must be nonzero", index);
            ensure_structure!(
                aabb.stride == 0 || aabb.stride >= DEFAULT_AABB_STRIDE,
                "AABB stride of geometry {} must be at least {} bytes", index, DEFAULT_AABB_STRIDE
            );
            ensure_structure!(
                aabb.stride % AABB_STRIDE_ALIGNMENT == 0,
                "AABB stride of geometry {} must be a multiple of {} bytes", index, AABB_STRIDE_ALIGNMENT
            );
        }
    }

    Ok(())
}

pub fn validate_instance<D: Device>(index: usize, instance: &InstanceDescriptor<D>) -> RtResult<()> {
    let container = instance.geometry_container.as_ref()
        .ok_or_else(|| RtError::structural(format!("No geometry container provided for instance {}", index)))?;

    ensure_structure!(
        container.level() == ContainerLevel::Bottom,
        "Instance {} must reference a bottom-level acceleration container", index
    );
    if container.is_destroyed() {
        return Err(RtError::reference("Linked geometry container must not be destroyed"));
    }

    ensure_structure!(
        instance.instance_id <= MAX_INSTANCE_FIELD_VALUE,
        "Instance id {} does not fit into 24 bits", instance.instance_id
    );
    ensure_structure!(
        instance.instance_offset <= MAX_INSTANCE_FIELD_VALUE,
        "Instance offset {} does not fit into 24 bits", instance.instance_offset
    );

    resolve_transform(instance).map(|_| ())
}

fn validate_input_buffer(buffer: &Arc<Buffer>, what: &str) -> RtResult<()> {
    ensure_structure!(buffer.size() > 0, "Invalid buffer for {} data", what.to_lowercase());
    ensure_structure!(
        buffer.usage().contains(BufferUsage::RAY_TRACING),
        "{} buffer must have RAY_TRACING usage flag", what
    );
    if buffer.is_destroyed() {
        return Err(RtError::reference(format!("{} buffer is destroyed", what)));
    }

    Ok(())
}
