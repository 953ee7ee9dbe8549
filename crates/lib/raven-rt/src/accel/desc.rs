use std::sync::Arc;

use bitflags::bitflags;
use raven_math::Vec3;

use crate::buffer::Buffer;
use crate::device::Device;

use super::AccelerationContainer;

/// Stride of tightly packed `min.xyz, max.xyz` boxes, used when an AABB stride is left unset.
pub const DEFAULT_AABB_STRIDE: u64 = raven_math::AABB_PACKED_SIZE as u64;

/// Widest value the 24-bit instance id and instance offset fields can hold.
pub const MAX_INSTANCE_FIELD_VALUE: u32 = (1 << 24) - 1;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ContainerLevel {
    Bottom,
    Top,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GeometryType {
    Triangles,
    Aabbs,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VertexFormat {
    Float2,
    Float3,
}

impl VertexFormat {
    pub fn byte_size(self) -> u64 {
        match self {
            VertexFormat::Float2 => 8,
            VertexFormat::Float3 => 12,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct ContainerFlags: u32 {
        const ALLOW_UPDATE      = 1 << 0;
        const PREFER_FAST_BUILD = 1 << 1;
        const PREFER_FAST_TRACE = 1 << 2;
        const LOW_MEMORY        = 1 << 3;
    }

    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct GeometryFlags: u32 {
        const OPAQUE                          = 1 << 0;
        const NO_DUPLICATE_ANY_HIT_INVOCATION = 1 << 1;
    }

    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct InstanceFlags: u32 {
        const TRIANGLE_CULL_DISABLE           = 1 << 0;
        const TRIANGLE_FRONT_COUNTERCLOCKWISE = 1 << 1;
        const FORCE_OPAQUE                    = 1 << 2;
        const FORCE_NO_OPAQUE                 = 1 << 3;
    }
}

/// Usage hints, carried along but never interpreted.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ContainerUsage(pub u32);

impl ContainerUsage {
    pub const NONE: Self = Self(0);
}

#[derive(Clone, Debug)]
pub struct VertexData {
    pub buffer: Arc<Buffer>,
    pub offset: u64,
    pub stride: u64,
    pub count: u32,
    pub format: VertexFormat,
}

#[derive(Clone, Debug)]
pub struct IndexData {
    pub buffer: Arc<Buffer>,
    pub offset: u64,
    pub count: u32,
    pub format: IndexFormat,
}

#[derive(Clone, Debug)]
pub struct AabbData {
    pub buffer: Arc<Buffer>,
    pub offset: u64,
    pub count: u32,
    /// Zero means tightly packed.
    pub stride: u64,
}

impl AabbData {
    #[inline]
    pub fn effective_stride(&self) -> u64 {
        if self.stride == 0 { DEFAULT_AABB_STRIDE } else { self.stride }
    }
}

#[derive(Clone, Debug)]
pub struct GeometryDescriptor {
    pub ty: GeometryType,
    pub flags: GeometryFlags,
    pub vertex: Option<VertexData>,
    pub index: Option<IndexData>,
    pub aabb: Option<AabbData>,
}

impl GeometryDescriptor {
    pub fn triangles(vertex: VertexData, index: Option<IndexData>) -> Self {
        Self {
            ty: GeometryType::Triangles,
            flags: GeometryFlags::empty(),
            vertex: Some(vertex),
            index,
            aabb: None,
        }
    }

    pub fn aabbs(aabb: AabbData) -> Self {
        Self {
            ty: GeometryType::Aabbs,
            flags: GeometryFlags::empty(),
            vertex: None,
            index: None,
            aabb: Some(aabb),
        }
    }

    pub fn with_flags(mut self, flags: GeometryFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Number of primitives the build consumes: triangles or boxes.
    pub fn primitive_count(&self) -> u32 {
        match self.ty {
            GeometryType::Triangles => match (&self.index, &self.vertex) {
                (Some(index), _) => index.count / 3,
                (None, Some(vertex)) => vertex.count / 3,
                (None, None) => 0,
            },
            GeometryType::Aabbs => self.aabb.as_ref().map_or(0, |aabb| aabb.count),
        }
    }
}

/// Translation, euler rotation in degrees and scale.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TransformDescriptor {
    pub translation: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for TransformDescriptor {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

pub struct InstanceDescriptor<D: Device> {
    pub geometry_container: Option<Arc<AccelerationContainer<D>>>,
    pub transform: Option<TransformDescriptor>,
    /// Row-major 3x4 matrix, exclusive with `transform`.
    pub transform_matrix: Option<[f32; 12]>,
    pub instance_id: u32,
    pub mask: u8,
    pub instance_offset: u32,
    pub flags: InstanceFlags,
}

impl<D: Device> Clone for InstanceDescriptor<D> {
    fn clone(&self) -> Self {
        Self {
            geometry_container: self.geometry_container.clone(),
            transform: self.transform,
            transform_matrix: self.transform_matrix,
            instance_id: self.instance_id,
            mask: self.mask,
            instance_offset: self.instance_offset,
            flags: self.flags,
        }
    }
}

impl<D: Device> InstanceDescriptor<D> {
    pub fn new(geometry_container: Arc<AccelerationContainer<D>>) -> Self {
        Self {
            geometry_container: Some(geometry_container),
            transform: None,
            transform_matrix: None,
            instance_id: 0,
            mask: 0xFF,
            instance_offset: 0,
            flags: InstanceFlags::empty(),
        }
    }

    pub fn with_transform(mut self, transform: TransformDescriptor) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn with_transform_matrix(mut self, matrix: [f32; 12]) -> Self {
        self.transform_matrix = Some(matrix);
        self
    }

    pub fn with_instance_id(mut self, instance_id: u32) -> Self {
        self.instance_id = instance_id;
        self
    }

    pub fn with_mask(mut self, mask: u8) -> Self {
        self.mask = mask;
        self
    }

    pub fn with_instance_offset(mut self, instance_offset: u32) -> Self {
        self.instance_offset = instance_offset;
        self
    }

    pub fn with_flags(mut self, flags: InstanceFlags) -> Self {
        self.flags = flags;
        self
    }
}

pub struct ContainerDescriptor<D: Device> {
    pub level: ContainerLevel,
    pub flags: ContainerFlags,
    pub usage: ContainerUsage,
    pub geometries: Vec<GeometryDescriptor>,
    pub instances: Vec<InstanceDescriptor<D>>,
}

impl<D: Device> ContainerDescriptor<D> {
    pub fn bottom_level(geometries: Vec<GeometryDescriptor>) -> Self {
        Self {
            level: ContainerLevel::Bottom,
            flags: ContainerFlags::empty(),
            usage: ContainerUsage::NONE,
            geometries,
            instances: Vec::new(),
        }
    }

    pub fn top_level(instances: Vec<InstanceDescriptor<D>>) -> Self {
        Self {
            level: ContainerLevel::Top,
            flags: ContainerFlags::empty(),
            usage: ContainerUsage::NONE,
            geometries: Vec::new(),
            instances,
        }
    }

    pub fn with_flags(mut self, flags: ContainerFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_usage(mut self, usage: ContainerUsage) -> Self {
        self.usage = usage;
        self
    }
}
