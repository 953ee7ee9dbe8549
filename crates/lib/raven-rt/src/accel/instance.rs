use raven_math::{affine_to_row_major_3x4, compose_trs_degrees, IDENTITY_ROW_MAJOR_3X4};

use crate::backend::BuildInputTranslator;
use crate::device::{Device, DeviceAddress};
use crate::error::{RtError, RtResult};

use super::desc::InstanceDescriptor;

/// Instance record in the layout both native APIs consume (64 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GeometryInstance {
    transform: [f32; 12], // affine transform matrix (row major)
    /// Store instance id in low 24 bits, (maximum up to 2^24 instances).
    /// Store mask id in high 8 bits
    instance_id_and_mask: u32,
    /// Store sbt offset in low 24 bits.
    /// Store flags in high 8 bits
    instance_sbt_offset_and_flags: u32, // sbt stands for shader binding table
    blas_address: DeviceAddress,
}

impl GeometryInstance {
    pub const SIZE: usize = std::mem::size_of::<GeometryInstance>();

    pub fn new(
        transform: [f32; 12],
        instance_id: u32,
        mask: u8,
        sbt_offset: u32,
        flags: u8,
        blas_address: DeviceAddress,
    ) -> Self {
        let mut inst = GeometryInstance {
            transform,
            instance_id_and_mask: 0,
            instance_sbt_offset_and_flags: 0,
            blas_address,
        };

        inst.set_instance_id(instance_id);
        inst.set_mask(mask);
        inst.set_sbt_offset(sbt_offset);
        inst.set_flags(flags);

        inst
    }

    fn set_instance_id(&mut self, instance_id: u32) {
        let id = instance_id & 0x00ffffff;
        self.instance_id_and_mask |= id;
    }

    fn set_mask(&mut self, mask: u8) {
        self.instance_id_and_mask |= (mask as u32) << 24;
    }

    fn set_sbt_offset(&mut self, sbt_offset: u32) {
        let offset = sbt_offset & 0x00ffffff;
        self.instance_sbt_offset_and_flags |= offset;
    }

    fn set_flags(&mut self, flags: u8) {
        self.instance_sbt_offset_and_flags |= (flags as u32) << 24;
    }

    #[inline]
    pub fn transform(&self) -> &[f32; 12] {
        &self.transform
    }

    #[inline]
    pub fn instance_id(&self) -> u32 {
        self.instance_id_and_mask & 0x00ffffff
    }

    #[inline]
    pub fn mask(&self) -> u8 {
        (self.instance_id_and_mask >> 24) as u8
    }

    #[inline]
    pub fn sbt_offset(&self) -> u32 {
        self.instance_sbt_offset_and_flags & 0x00ffffff
    }

    #[inline]
    pub fn flags(&self) -> u8 {
        (self.instance_sbt_offset_and_flags >> 24) as u8
    }

    #[inline]
    pub fn blas_address(&self) -> DeviceAddress {
        self.blas_address
    }

    pub fn as_bytes(&self) -> &[u8] {
        Self::slice_as_bytes(std::slice::from_ref(self))
    }

    pub fn slice_as_bytes(instances: &[GeometryInstance]) -> &[u8] {
        // repr(C) with no padding: 48 + 4 + 4 + 8 bytes
        unsafe {
            std::slice::from_raw_parts(
                instances.as_ptr() as *const u8,
                instances.len() * Self::SIZE,
            )
        }
    }
}

/// Resolve the row-major transform of an instance. Both sources at once are rejected,
/// neither yields the identity.
pub fn resolve_transform<D: Device>(desc: &InstanceDescriptor<D>) -> RtResult<[f32; 12]> {
    match (&desc.transform, &desc.transform_matrix) {
        (Some(_), Some(_)) => Err(RtError::structural(
            "Instance transform must be given either as translation/rotation/scale or as a matrix, not both",
        )),
        (Some(trs), None) => Ok(affine_to_row_major_3x4(&compose_trs_degrees(
            trs.translation,
            trs.rotation,
            trs.scale,
        ))),
        (None, Some(matrix)) => Ok(*matrix),
        (None, None) => Ok(IDENTITY_ROW_MAJOR_3X4),
    }
}

/// Encode one validated instance descriptor against the bottom-level address it references.
pub fn encode_instance<D: Device>(
    desc: &InstanceDescriptor<D>,
    blas_address: DeviceAddress,
) -> RtResult<GeometryInstance> {
    let transform = resolve_transform(desc)?;

    Ok(GeometryInstance::new(
        transform,
        desc.instance_id,
        desc.mask,
        desc.instance_offset,
        <D::Backend as BuildInputTranslator>::translate_instance_flags(desc.flags),
        blas_address,
    ))
}
