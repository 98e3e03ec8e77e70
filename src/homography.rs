use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

use crate::error::{FishMeshError, Result};
use crate::geometry::Point;

/// Relative threshold below which a triangle formed by three box corners is
/// treated as collinear.
const COLLINEAR_TOLERANCE: f64 = 1e-9;

/// 2D projective transform mapping source pixels to destination pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Homography(pub Matrix3<f64>);

impl Homography {
    /// Solve the homography taking each `src[i]` onto `dst[i]`.
    ///
    /// Fails with [`FishMeshError::DegenerateQuadrilateral`] when either set of
    /// points has three collinear (or coincident) members.
    pub fn from_points(src: &[Point; 4], dst: &[Point; 4]) -> Result<Self> {
        if is_degenerate(src) || is_degenerate(dst) {
            return Err(FishMeshError::DegenerateQuadrilateral);
        }

        // Construct the 8x8 matrix A and 8x1 vector b
        let mut a = DMatrix::<f64>::zeros(8, 8);
        let mut b = DVector::<f64>::zeros(8);

        for i in 0..4 {
            let (x, y) = (src[i].x, src[i].y);
            let (u, v) = (dst[i].x, dst[i].y);
            let row1 = [x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y];
            let row2 = [0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y];
            a.set_row(2 * i, &row1.into());
            a.set_row(2 * i + 1, &row2.into());
            b[2 * i] = u;
            b[2 * i + 1] = v;
        }

        // Solve the system
        let x = a
            .svd(true, true)
            .solve(&b, 1e-15)
            .map_err(|_| FishMeshError::DegenerateQuadrilateral)?;
        if x.iter().any(|v| !v.is_finite()) {
            return Err(FishMeshError::DegenerateQuadrilateral);
        }

        let h = Self(Matrix3::new(
            x[0], x[1], x[2], x[3], x[4], x[5], x[6], x[7], 1.0,
        ));
        // A singular matrix would collapse the image onto a line.
        h.inverse()?;
        Ok(h)
    }

    pub fn project(&self, p: &Point) -> Point {
        let v = self.0 * Vector3::new(p.x, p.y, 1.0);
        Point::new(v.x / v.z, v.y / v.z)
    }

    /// Project raw coordinates; the resampling loop calls this per sample.
    #[inline]
    pub fn project_xy(&self, x: f64, y: f64) -> (f64, f64) {
        let m = &self.0;
        let w = m[(2, 0)] * x + m[(2, 1)] * y + m[(2, 2)];
        (
            (m[(0, 0)] * x + m[(0, 1)] * y + m[(0, 2)]) / w,
            (m[(1, 0)] * x + m[(1, 1)] * y + m[(1, 2)]) / w,
        )
    }

    pub fn inverse(&self) -> Result<Self> {
        self.0
            .try_inverse()
            .map(Self)
            .ok_or(FishMeshError::DegenerateQuadrilateral)
    }
}

/// True if any three of the points are (numerically) collinear.
fn is_degenerate(points: &[Point; 4]) -> bool {
    let scale = points
        .iter()
        .flat_map(|p| [p.x.abs(), p.y.abs()])
        .fold(0.0_f64, f64::max)
        .max(1.0);
    let tolerance = COLLINEAR_TOLERANCE * scale * scale;

    const TRIANGLES: [[usize; 3]; 4] = [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]];
    TRIANGLES.iter().any(|&[i, j, k]| {
        let (a, b, c) = (points[i], points[j], points[k]);
        let cross = (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x);
        cross.abs() <= tolerance
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn quad(coords: [(f64, f64); 4]) -> [Point; 4] {
        coords.map(Point::from)
    }

    #[test]
    fn maps_every_corner_onto_its_target() {
        let src = quad([(10.0, 20.0), (90.0, 15.0), (95.0, 85.0), (5.0, 90.0)]);
        let dst = quad([(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0)]);
        let h = Homography::from_points(&src, &dst).unwrap();
        for (s, d) in src.iter().zip(dst.iter()) {
            let p = h.project(s);
            assert_abs_diff_eq!(p.x, d.x, epsilon = 1e-6);
            assert_abs_diff_eq!(p.y, d.y, epsilon = 1e-6);
        }
    }

    #[test]
    fn identical_quads_give_identity() {
        let q = quad([(0.0, 0.0), (640.0, 0.0), (640.0, 480.0), (0.0, 480.0)]);
        let h = Homography::from_points(&q, &q).unwrap();
        assert_abs_diff_eq!(h.0, Matrix3::identity(), epsilon = 1e-9);
    }

    #[test]
    fn inverse_round_trips() {
        let src = quad([(10.0, 20.0), (90.0, 15.0), (95.0, 85.0), (5.0, 90.0)]);
        let dst = quad([(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]);
        let h = Homography::from_points(&src, &dst).unwrap();
        let inv = h.inverse().unwrap();
        let (x, y) = h.project_xy(40.0, 50.0);
        let (bx, by) = inv.project_xy(x, y);
        assert_abs_diff_eq!(bx, 40.0, epsilon = 1e-6);
        assert_abs_diff_eq!(by, 50.0, epsilon = 1e-6);
    }

    #[test]
    fn coincident_corners_are_rejected() {
        let src = quad([(5.0, 5.0); 4]);
        let dst = quad([(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]);
        assert!(matches!(
            Homography::from_points(&src, &dst),
            Err(FishMeshError::DegenerateQuadrilateral)
        ));
    }

    #[test]
    fn collinear_corners_are_rejected() {
        let src = quad([(0.0, 0.0), (10.0, 10.0), (20.0, 20.0), (0.0, 30.0)]);
        let dst = quad([(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]);
        assert!(Homography::from_points(&src, &dst).is_err());
    }
}
