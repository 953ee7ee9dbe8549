use std::sync::atomic::{AtomicBool, Ordering};

use bitflags::bitflags;

use crate::device::DeviceAddress;

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const MAP_READ             = 1 << 0;
        const MAP_WRITE            = 1 << 1;
        const COPY_SRC             = 1 << 2;
        const COPY_DST             = 1 << 3;
        const INDEX                = 1 << 4;
        const VERTEX               = 1 << 5;
        const UNIFORM              = 1 << 6;
        const STORAGE              = 1 << 7;
        const INDIRECT             = 1 << 8;
        /// Readable as acceleration structure build input.
        const RAY_TRACING          = 1 << 9;
        const SHADER_BINDING_TABLE = 1 << 10;
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BufferDesc {
    pub size: u64,
    pub usage: BufferUsage,
}

impl BufferDesc {
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            size,
            usage,
        }
    }

    /// A buffer whose contents feed acceleration structure builds.
    pub fn new_ray_tracing_input(size: u64, usage: BufferUsage) -> Self {
        Self::new(size, usage | BufferUsage::RAY_TRACING | BufferUsage::COPY_DST)
    }
}

/// A device buffer as seen by the ray tracing core. Shared through `Arc`, every clone is a
/// keep-alive reference.
#[derive(Debug)]
pub struct Buffer {
    id: u64,
    desc: BufferDesc,
    device_address: DeviceAddress,
    destroyed: AtomicBool,
}

impl Buffer {
    pub fn new(id: u64, desc: BufferDesc, device_address: DeviceAddress) -> Self {
        Self {
            id,
            desc,
            device_address,
            destroyed: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn desc(&self) -> &BufferDesc {
        &self.desc
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.desc.size
    }

    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.desc.usage
    }

    #[inline]
    pub fn device_address(&self) -> DeviceAddress {
        self.device_address
    }

    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Called by the owning device when the native buffer goes away.
    pub fn mark_destroyed(&self) {
        self.destroyed.store(true, Ordering::Release);
    }
}
