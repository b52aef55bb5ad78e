use glam::{Vec3, Vec4};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    #[must_use]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub fn from_center_extents(center: Vec3, half: Vec3) -> Self {
        Self {
            min: center - half,
            max: center + half,
        }
    }

    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[must_use]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    #[must_use]
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    /// Packs as `(center, radius)`.
    #[inline]
    #[must_use]
    pub fn to_vec4(self) -> Vec4 {
        self.center.extend(self.radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_covers_both_boxes() {
        let a = BoundingBox::from_center_extents(Vec3::ZERO, Vec3::ONE);
        let b = BoundingBox::new(Vec3::new(2.0, -3.0, 0.0), Vec3::new(4.0, 0.0, 0.5));
        let u = a.union(&b);
        assert_eq!(u.min, Vec3::new(-1.0, -3.0, -1.0));
        assert_eq!(u.max, Vec3::new(4.0, 1.0, 1.0));
        assert_eq!(u.center(), Vec3::new(1.5, -1.0, 0.0));
        assert_eq!(u.size(), Vec3::new(5.0, 4.0, 2.0));
    }

    #[test]
    fn test_sphere_packing() {
        let sphere = BoundingSphere {
            center: Vec3::new(1.0, 2.0, 3.0),
            radius: 4.0,
        };
        assert_eq!(sphere.to_vec4(), Vec4::new(1.0, 2.0, 3.0, 4.0));
    }
}
