use super::Vec3;

/// Byte size of an AABB when laid out tightly for acceleration structure builds.
pub const AABB_PACKED_SIZE: usize = 6 * std::mem::size_of::<f32>();

/// Axis-Aligned Bounding Box
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AABB {
    pub min: Vec3,
    pub max: Vec3
}

impl Default for AABB {
    fn default() -> Self {
        Self::new()
    }
}

impl AABB {
    pub fn new() -> Self {
        Self {
            min: Vec3::splat(f32::MAX),
            max: Vec3::splat(f32::MIN)
        }
    }

    pub fn from_min_max(min: Vec3, max: Vec3) -> Self {
        Self {
            min,
            max
        }
    }

    pub fn is_valid(&self) -> bool {
        self.min.cmplt(self.max).all()
    }

    pub fn merge_point_vec3(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Return the center of the AABB.
    pub fn get_center(&self) -> Vec3 {
        debug_assert!(self.is_valid());

        (self.min + self.max) * 0.5
    }

    /// Return the packed `min.xyz, max.xyz` layout procedural geometry consumes.
    pub fn to_packed(&self) -> [f32; 6] {
        [self.min.x, self.min.y, self.min.z, self.max.x, self.max.y, self.max.z]
    }

    /// Pack a list of boxes back to back, ready to be uploaded into an AABB buffer.
    pub fn pack_all(aabbs: &[AABB]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(aabbs.len() * AABB_PACKED_SIZE);
        for aabb in aabbs {
            for value in aabb.to_packed() {
                bytes.extend_from_slice(&value.to_ne_bytes());
            }
        }
        bytes
    }
}
