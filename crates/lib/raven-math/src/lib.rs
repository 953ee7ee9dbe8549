mod aabb;
mod transform;

pub use glam::*;

pub use aabb::{AABB, AABB_PACKED_SIZE};
pub use transform::{
    affine_to_row_major_3x4,
    compose_trs_degrees,
    IDENTITY_ROW_MAJOR_3X4,
};

#[inline]
pub fn min_value_align_to(size: usize, alignment: usize) -> usize {
    assert_eq!(alignment.count_ones(), 1);
    (size + alignment - 1) & !(alignment - 1)
}

#[inline]
pub fn min_value_align_to_u64(size: u64, alignment: u64) -> u64 {
    assert_eq!(alignment.count_ones(), 1);
    (size + alignment - 1) & !(alignment - 1)
}
