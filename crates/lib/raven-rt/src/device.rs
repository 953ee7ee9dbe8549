use std::sync::Arc;

use crate::backend::BuildInputTranslator;
use crate::buffer::{Buffer, BufferDesc};
use crate::error::{ensure_structure, RtResult};

pub type DeviceAddress = u64;

/// Monotonically increasing submission counter.
pub type Serial = u64;

/// Which scratch pool a device memory request serves.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MemoryKind {
    Result,
    Build,
    Update,
}

/// Initial resource state an allocation is created in.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResourceState {
    /// Can be consumed as an acceleration structure.
    AccelerationStructure,
    /// Can be randomly read and written by a build.
    UnorderedAccess,
}

/// Opaque handle to a block of device memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryAllocation {
    pub id: u64,
    pub kind: MemoryKind,
    pub size: u64,
    pub device_address: DeviceAddress,
    pub initial_state: ResourceState,
}

/// Hardware reported memory requirements of one build input.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PrebuildSizes {
    pub result_size: u64,
    pub build_scratch_size: u64,
    pub update_scratch_size: u64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RayTracingProperties {
    pub shader_group_handle_size: u32,
    pub shader_group_handle_alignment: u32,
    pub shader_group_base_alignment: u32,
    pub min_scratch_offset_alignment: u64,
}

impl RayTracingProperties {
    /// Alignments must be powers of two and the handle must fit its own alignment.
    pub fn validate(&self) -> RtResult<()> {
        let alignments = [
            ("shader_group_handle_alignment", self.shader_group_handle_alignment as u64),
            ("shader_group_base_alignment", self.shader_group_base_alignment as u64),
            ("min_scratch_offset_alignment", self.min_scratch_offset_alignment),
        ];

        for (name, value) in alignments {
            ensure_structure!(value.is_power_of_two(), "{} must be a power of two, got {}", name, value);
        }
        ensure_structure!(self.shader_group_handle_size > 0, "shader_group_handle_size must be nonzero");
        ensure_structure!(
            self.shader_group_base_alignment >= self.shader_group_handle_alignment,
            "shader_group_base_alignment must not be smaller than shader_group_handle_alignment"
        );

        Ok(())
    }
}

/// The GPU device the ray tracing core is layered on.
///
/// Implementations own the native objects; the core only ever asks for memory, sizes
/// and uploads through this seam.
pub trait Device: Send + Sync + 'static {
    /// The native build input layout this device consumes.
    type Backend: BuildInputTranslator;

    fn is_ray_tracing_supported(&self) -> bool;

    fn ray_tracing_properties(&self) -> RayTracingProperties;

    fn allocate_device_memory(
        &self,
        kind: MemoryKind,
        byte_size: u64,
        initial_state: ResourceState,
        name: &str,
    ) -> RtResult<MemoryAllocation>;

    fn free_device_memory(&self, allocation: MemoryAllocation);

    fn query_prebuild_sizes(
        &self,
        inputs: &<Self::Backend as BuildInputTranslator>::BuildInputs,
    ) -> PrebuildSizes;

    fn pending_submission_serial(&self) -> Serial;

    fn create_buffer(&self, desc: BufferDesc, name: &str) -> RtResult<Arc<Buffer>>;

    fn destroy_buffer(&self, buffer: &Buffer);

    fn upload_buffer_data(&self, buffer: &Buffer, offset: u64, data: &[u8]) -> RtResult<()>;
}
