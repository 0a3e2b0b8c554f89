use nalgebra::{Isometry3, Matrix3, Point3, Rotation3, Translation3, UnitQuaternion, Vector3};

/// An axis-aligned bounding box in Cartesian coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Bounds {
    pub fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    /// Edge lengths along each axis.
    pub fn size(&self) -> Vector3<f64> {
        self.max - self.min
    }

    /// Smallest box containing both `self` and `other`.
    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min: Point3::new(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            max: Point3::new(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        }
    }
}

/// Union of a collection of bounds, or `None` if the collection is empty.
pub fn union_bounds(bounds: impl IntoIterator<Item = Bounds>) -> Option<Bounds> {
    let mut iter = bounds.into_iter();
    let first = iter.next()?;
    Some(iter.fold(first, |acc, b| acc.union(&b)))
}

/// Computes the rigid transform (rotation + translation) that best maps
/// `from_points` onto `to_points` in the least-squares sense, together with
/// the RMSD of the fit.
///
/// Returns `None` for fewer than three point pairs or mismatched lengths;
/// a rigid placement is under-determined below that.
pub fn align_points(
    from_points: &[Point3<f64>],
    to_points: &[Point3<f64>],
) -> Option<(Isometry3<f64>, f64)> {
    if from_points.len() < 3 || from_points.len() != to_points.len() {
        return None;
    }
    let n = from_points.len() as f64;

    let from_centroid = from_points
        .iter()
        .fold(Vector3::zeros(), |acc, p| acc + p.coords)
        / n;
    let to_centroid = to_points
        .iter()
        .fold(Vector3::zeros(), |acc, p| acc + p.coords)
        / n;

    // Cross-covariance of the centered point sets.
    let mut h = Matrix3::zeros();
    for (p, q) in from_points.iter().zip(to_points.iter()) {
        h += (p.coords - from_centroid) * (q.coords - to_centroid).transpose();
    }

    let svd = h.svd(true, true);
    let u = svd.u?;
    let v = svd.v_t?.transpose();

    let mut rotation = v * u.transpose();
    if rotation.determinant() < 0.0 {
        // Reflection case: flip the axis of least variance.
        let d = Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, -1.0));
        rotation = v * d * u.transpose();
    }

    let translation = to_centroid - rotation * from_centroid;
    let isometry = Isometry3::from_parts(
        Translation3::from(translation),
        UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rotation)),
    );

    let squared_dist_sum: f64 = from_points
        .iter()
        .zip(to_points.iter())
        .map(|(p, q)| (isometry * p - q).norm_squared())
        .sum();
    let rmsd = (squared_dist_sum / n).sqrt();

    Some((isometry, rmsd))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn union_of_bounds_covers_all_inputs() {
        let a = Bounds::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 2.0, 3.0));
        let b = Bounds::new(Point3::new(-1.0, 0.5, 1.0), Point3::new(0.5, 4.0, 2.0));
        let u = union_bounds([a, b]).unwrap();
        assert_eq!(u.min, Point3::new(-1.0, 0.0, 0.0));
        assert_eq!(u.max, Point3::new(1.0, 4.0, 3.0));
        assert_eq!(u.size(), Vector3::new(2.0, 4.0, 3.0));
    }

    #[test]
    fn union_of_no_bounds_is_none() {
        assert!(union_bounds([]).is_none());
    }

    #[test]
    fn align_points_recovers_known_transform() {
        let rotation = Rotation3::from_euler_angles(0.3, -0.7, 1.1);
        let shift = Vector3::new(4.0, -2.0, 9.0);
        let from: Vec<Point3<f64>> = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
            Point3::new(0.0, 0.0, 3.0),
            Point3::new(1.0, 1.0, 1.0),
        ];
        let to: Vec<Point3<f64>> = from.iter().map(|p| rotation * p + shift).collect();

        let (tf, rmsd) = align_points(&from, &to).unwrap();
        assert!(rmsd < 1e-9);
        for (p, q) in from.iter().zip(to.iter()) {
            assert!((tf * p - q).norm() < 1e-9);
        }
    }

    #[test]
    fn align_points_requires_three_pairs() {
        let a = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)];
        let b = a.clone();
        assert!(align_points(&a, &b).is_none());
    }

    #[test]
    fn align_points_rejects_mismatched_lengths() {
        let a = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let b = a[..2].to_vec();
        assert!(align_points(&a, &b).is_none());
    }
}
