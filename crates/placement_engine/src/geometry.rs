use glam::{Mat3, Quat, Vec3};

/// Penetration below this depth counts as touching, not overlapping.
pub const CONTACT_TOLERANCE: f32 = 1.0e-4;

const DEGENERATE_AXIS_LENGTH_SQ: f32 = 1.0e-8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        orientation: Quat::IDENTITY,
    };

    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self {
            position,
            orientation,
        }
    }

    pub fn at(position: Vec3) -> Self {
        Self::new(position, Quat::IDENTITY)
    }

    pub fn with_position(self, position: Vec3) -> Self {
        Self { position, ..self }
    }

    /// Yaw is applied in world space so repeated steps never tilt the entity.
    pub fn rotated_about_vertical(self, radians: f32) -> Self {
        Self {
            position: self.position,
            orientation: (Quat::from_rotation_y(radians) * self.orientation).normalize(),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.orientation.is_finite()
    }

    /// Orientation comparison treats `q` and `-q` as the same rotation.
    pub fn approx_eq(&self, other: &Pose, epsilon: f32) -> bool {
        self.position.abs_diff_eq(other.position, epsilon)
            && self.orientation.dot(other.orientation).abs() >= 1.0 - epsilon
    }
}

/// Axis-aligned box in an entity's local frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxShape {
    pub center: Vec3,
    pub half_extents: Vec3,
}

impl BoxShape {
    pub fn new(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            center,
            half_extents,
        }
    }

    pub fn centered(size: Vec3) -> Self {
        Self::new(Vec3::ZERO, size * 0.5)
    }

    pub fn world_box(&self, pose: Pose, scale: Vec3) -> OrientedBox {
        OrientedBox {
            center: pose.position + pose.orientation * (self.center * scale),
            half_extents: self.half_extents * scale.abs(),
            orientation: pose.orientation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedBox {
    pub center: Vec3,
    pub half_extents: Vec3,
    pub orientation: Quat,
}

impl OrientedBox {
    pub fn axes(&self) -> [Vec3; 3] {
        let basis = Mat3::from_quat(self.orientation);
        [basis.x_axis, basis.y_axis, basis.z_axis]
    }

    fn projected_radius(&self, axes: &[Vec3; 3], axis: Vec3) -> f32 {
        self.half_extents.x * axes[0].dot(axis).abs()
            + self.half_extents.y * axes[1].dot(axis).abs()
            + self.half_extents.z * axes[2].dot(axis).abs()
    }

    /// Separating-axis test over the 15 candidate axes of two boxes.
    /// Boxes whose interiors meet by less than `tolerance` are reported as
    /// separated, so flush neighbours never block each other.
    pub fn overlaps(&self, other: &OrientedBox, tolerance: f32) -> bool {
        let own_axes = self.axes();
        let other_axes = other.axes();
        let delta = other.center - self.center;

        let face_axes = own_axes.iter().chain(other_axes.iter()).copied();
        let edge_axes = own_axes
            .iter()
            .flat_map(|a| other_axes.iter().map(move |b| a.cross(*b)));

        for axis in face_axes.chain(edge_axes) {
            let length_sq = axis.length_squared();
            if length_sq < DEGENERATE_AXIS_LENGTH_SQ {
                continue;
            }
            let axis = axis / length_sq.sqrt();
            let distance = delta.dot(axis).abs();
            let reach = self.projected_radius(&own_axes, axis)
                + other.projected_radius(&other_axes, axis);
            if distance >= reach - tolerance {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use super::*;

    fn unit_box_at(x: f32, y: f32, z: f32) -> OrientedBox {
        BoxShape::centered(Vec3::ONE).world_box(Pose::at(Vec3::new(x, y, z)), Vec3::ONE)
    }

    #[test]
    fn overlapping_unit_boxes_are_detected() {
        let a = unit_box_at(0.0, 0.0, 0.0);
        let b = unit_box_at(0.4, 0.0, 0.0);
        assert!(a.overlaps(&b, CONTACT_TOLERANCE));
        assert!(b.overlaps(&a, CONTACT_TOLERANCE));
    }

    #[test]
    fn separated_unit_boxes_do_not_overlap() {
        let a = unit_box_at(0.0, 0.0, 0.0);
        let b = unit_box_at(1.1, 0.0, 0.0);
        assert!(!a.overlaps(&b, CONTACT_TOLERANCE));
    }

    #[test]
    fn flush_faces_count_as_touching() {
        let a = unit_box_at(0.0, 0.0, 0.0);
        let b = unit_box_at(1.0, 0.0, 0.0);
        assert!(!a.overlaps(&b, CONTACT_TOLERANCE));
    }

    #[test]
    fn rotation_changes_long_box_footprint() {
        let long = BoxShape::centered(Vec3::new(3.0, 1.0, 1.0));
        let neighbour = unit_box_at(1.2, 0.0, 0.0);

        let unrotated = long.world_box(Pose::IDENTITY, Vec3::ONE);
        assert!(unrotated.overlaps(&neighbour, CONTACT_TOLERANCE));

        let rotated = long.world_box(Pose::IDENTITY.rotated_about_vertical(FRAC_PI_2), Vec3::ONE);
        assert!(!rotated.overlaps(&neighbour, CONTACT_TOLERANCE));
    }

    #[test]
    fn diagonal_box_is_caught_by_face_axes_of_rotated_box() {
        let diamond = BoxShape::centered(Vec3::ONE).world_box(
            Pose::at(Vec3::new(1.2, 0.0, 0.0)).rotated_about_vertical(FRAC_PI_2 * 0.5),
            Vec3::ONE,
        );
        // Half diagonal is ~0.707, so the tip reaches x ~0.49 and enters the unit box.
        assert!(unit_box_at(0.0, 0.0, 0.0).overlaps(&diamond, CONTACT_TOLERANCE));

        let farther = BoxShape::centered(Vec3::ONE).world_box(
            Pose::at(Vec3::new(1.3, 0.0, 0.0)).rotated_about_vertical(FRAC_PI_2 * 0.5),
            Vec3::ONE,
        );
        assert!(!unit_box_at(0.0, 0.0, 0.0).overlaps(&farther, CONTACT_TOLERANCE));
    }

    #[test]
    fn world_box_applies_scale_and_rotated_offset() {
        let shape = BoxShape::new(Vec3::new(1.0, 0.0, 0.0), Vec3::splat(0.5));
        let pose = Pose::at(Vec3::new(0.0, 2.0, 0.0)).rotated_about_vertical(FRAC_PI_2);
        let world = shape.world_box(pose, Vec3::new(2.0, 1.0, 1.0));

        // Local +X offset of 2.0 (scaled) rotated a quarter turn about +Y ends up on -Z.
        assert!(world.center.abs_diff_eq(Vec3::new(0.0, 2.0, -2.0), 1.0e-5));
        assert!(world.half_extents.abs_diff_eq(Vec3::new(1.0, 0.5, 0.5), 1.0e-6));
    }

    #[test]
    fn rotated_pose_compares_equal_to_its_negated_quaternion() {
        let pose = Pose::IDENTITY.rotated_about_vertical(0.3);
        let negated = Pose::new(pose.position, -pose.orientation);
        assert!(pose.approx_eq(&negated, 1.0e-5));
    }
}
