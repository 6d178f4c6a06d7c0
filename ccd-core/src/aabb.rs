//! Axis-aligned bounding boxes for the broad phase.

use nalgebra::DVector;

/// An axis-aligned box, dimension-generic (2D or 3D).
#[derive(Debug, Clone, PartialEq)]
pub struct Aabb {
    /// Minimum corner.
    pub min: DVector<f64>,
    /// Maximum corner.
    pub max: DVector<f64>,
}

impl Aabb {
    /// The box containing a single point.
    #[must_use]
    pub fn from_point(p: DVector<f64>) -> Self {
        Self {
            min: p.clone(),
            max: p,
        }
    }

    /// Grow to contain `p`.
    pub fn take_point(&mut self, p: &DVector<f64>) {
        for i in 0..self.min.len() {
            self.min[i] = self.min[i].min(p[i]);
            self.max[i] = self.max[i].max(p[i]);
        }
    }

    /// The smallest box containing every given point. Points must be
    /// non-empty and of equal dimension.
    #[must_use]
    pub fn hull(points: &[DVector<f64>]) -> Self {
        debug_assert!(!points.is_empty());
        let mut aabb = Self::from_point(points[0].clone());
        for p in &points[1..] {
            aabb.take_point(p);
        }
        aabb
    }

    /// Expand by `radius` on every side.
    #[must_use]
    pub fn inflated(&self, radius: f64) -> Self {
        Self {
            min: self.min.map(|v| v - radius),
            max: self.max.map(|v| v + radius),
        }
    }

    /// Do two boxes overlap (closed intervals, touching counts)?
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        (0..self.min.len())
            .all(|i| self.min[i] <= other.max[i] && self.max[i] >= other.min[i])
    }

    /// Spatial dimension.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.min.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use nalgebra::dvector;

    #[test]
    fn hull_and_inflation() {
        let aabb = Aabb::hull(&[dvector![0.0, 1.0], dvector![2.0, -1.0]]);
        assert_eq!(aabb.min, dvector![0.0, -1.0]);
        assert_eq!(aabb.max, dvector![2.0, 1.0]);

        let fat = aabb.inflated(0.5);
        assert_eq!(fat.min, dvector![-0.5, -1.5]);
    }

    #[test]
    fn touching_boxes_intersect() {
        let a = Aabb::hull(&[dvector![0.0, 0.0], dvector![1.0, 1.0]]);
        let b = Aabb::hull(&[dvector![1.0, 0.0], dvector![2.0, 1.0]]);
        let c = Aabb::hull(&[dvector![3.0, 0.0], dvector![4.0, 1.0]]);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }
}
