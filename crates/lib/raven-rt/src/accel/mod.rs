//! Acceleration containers: validated, refcounted owners of bottom-level geometry or
//! top-level instances, their backend build inputs and their scratch memory pools.

mod container;
mod desc;
mod handle;
mod instance;
mod scratch;
mod validation;

pub use container::{AccelerationContainer, BuildCommand, BuildMode, BuildRecorder};
pub use desc::{
    AabbData, ContainerDescriptor, ContainerFlags, ContainerLevel, ContainerUsage,
    GeometryDescriptor, GeometryFlags, GeometryType, IndexData, IndexFormat,
    InstanceDescriptor, InstanceFlags, TransformDescriptor, VertexData, VertexFormat,
    DEFAULT_AABB_STRIDE, MAX_INSTANCE_FIELD_VALUE,
};
pub use handle::AccelerationContainerHandle;
pub use instance::{encode_instance, resolve_transform, GeometryInstance};
pub use scratch::{ScratchMemoryManager, ScratchMemoryPool};
pub use validation::{validate_container_descriptor, validate_geometry, validate_instance};
