use glam::{Affine3A, Vec3};

/// Row-major 3x4 identity, the layout instance transforms are stored in.
pub const IDENTITY_ROW_MAJOR_3X4: [f32; 12] = [
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 1.0, 0.0,
];

/// Compose translation, euler rotation (in degrees) and scale.
///
/// The rotation is applied as X, then Y, then Z in the parent frame of the scale,
/// which yields `T * Rx * Ry * Rz * S`.
pub fn compose_trs_degrees(translation: Vec3, rotation_degrees: Vec3, scale: Vec3) -> Affine3A {
    Affine3A::from_translation(translation)
        * Affine3A::from_rotation_x(rotation_degrees.x.to_radians())
        * Affine3A::from_rotation_y(rotation_degrees.y.to_radians())
        * Affine3A::from_rotation_z(rotation_degrees.z.to_radians())
        * Affine3A::from_scale(scale)
}

/// Flatten an affine transform into the row-major 3x4 layout.
pub fn affine_to_row_major_3x4(transform: &Affine3A) -> [f32; 12] {
    let x = transform.matrix3.x_axis;
    let y = transform.matrix3.y_axis;
    let z = transform.matrix3.z_axis;
    let t = transform.translation;

    [
        x.x, y.x, z.x, t.x,
        x.y, y.y, z.y, t.y,
        x.z, y.z, z.z, t.z,
    ]
}
