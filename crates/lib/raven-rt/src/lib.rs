#[macro_use]
extern crate derive_builder;

extern crate log as glog;

pub mod accel;
pub mod backend;
pub mod descriptor;
pub mod pipeline;
pub mod sbt;

mod buffer;
mod config;
mod device;
mod error;

pub use buffer::{Buffer, BufferDesc, BufferUsage};
pub use config::{RayTracingConfig, RayTracingConfigBuilder};
pub use device::{
    Device, DeviceAddress, MemoryAllocation, MemoryKind, PrebuildSizes, RayTracingProperties,
    ResourceState, Serial,
};
pub use error::{RtError, RtResult};

pub use accel::{
    AccelerationContainer, AccelerationContainerHandle, ContainerDescriptor, ContainerLevel,
};
pub use pipeline::{RayTracingPipeline, RayTracingPipelineDesc};
pub use sbt::{ShaderBindingTable, ShaderBindingTableBuilder, ShaderGroupRole};
