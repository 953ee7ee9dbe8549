//! Backend build input translation.
//!
//! Each native API lays out acceleration structure build inputs differently. A backend is a
//! set of pure functions turning the portable descriptors into that layout.

pub mod d3d12;
pub mod headless;
pub mod vulkan;

use crate::accel::{ContainerFlags, ContainerLevel, GeometryDescriptor, InstanceFlags};
use crate::device::DeviceAddress;

/// What a device needs to know about a build input to size its memory.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BuildInputsSummary {
    pub level: ContainerLevel,
    pub geometry_count: u32,
    pub primitive_count: u64,
    pub allow_update: bool,
}

pub trait BuildInputTranslator: Send + Sync + 'static {
    /// Native encoding of one geometry.
    type Geometry: Clone;
    /// Native build input of a whole container.
    type BuildInputs: Send + Sync;

    const NAME: &'static str;

    fn translate_geometry(geometry: &GeometryDescriptor) -> Self::Geometry;

    fn translate_instance_flags(flags: InstanceFlags) -> u8;

    fn bottom_level_inputs(
        flags: ContainerFlags,
        geometries: &[GeometryDescriptor],
    ) -> Self::BuildInputs;

    fn top_level_inputs(
        flags: ContainerFlags,
        instance_address: DeviceAddress,
        instance_count: u32,
    ) -> Self::BuildInputs;

    fn summarize(inputs: &Self::BuildInputs) -> BuildInputsSummary;
}
