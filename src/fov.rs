//! The size, position and granularity of the Field of View (FOV) in which
//! images are reconstructed.

use float_eq::float_eq;
use parry3d::math::Isometry;
use parry3d::query::{Ray, RayCast};
use parry3d::shape::Cuboid;

use units::{Length, mm_};
use crate::{Point, Vector, Lengthf32};
use crate::index::{BoxDim_u, Index1_u, Index3_u, index1_to_3, voxel_count};
use crate::error::{ReconError, Result};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FOV {
    pub center: Point,
    pub half_width: Vector,
    pub n: BoxDim_u,
    pub voxel_size: Vector,
}

impl FOV {

    /// FOV of the given full size, centred on the origin
    pub fn new(
        full_size: (Length, Length, Length),
        n: (usize, usize, usize),
    ) -> Result<Self> {
        Self::with_center(Point::zero(), full_size, n)
    }

    pub fn with_center(
        center: Point,
        (dx, dy, dz): (Length, Length, Length),
        (nx, ny, nz): (usize, usize, usize),
    ) -> Result<Self> {
        let n = [nx, ny, nz];
        if n.contains(&0) {
            return Err(ReconError::geometry(format!("FOV needs at least one voxel along each axis, got {n:?}")));
        }
        let size = [mm_(dx), mm_(dy), mm_(dz)];
        if !size.iter().all(|s| s.is_finite() && *s > 0.0) {
            return Err(ReconError::geometry(format!("FOV extent must be finite and positive, got {size:?} mm")));
        }
        if !center.is_finite() {
            return Err(ReconError::geometry(format!("FOV centre must be finite, got {:?} mm", center.to_mm())));
        }
        let half_width = Vector::new(dx/2.0, dy/2.0, dz/2.0);
        let voxel_size = Self::voxel_size(n, half_width);
        Ok(Self { center, half_width, n, voxel_size })
    }

    fn voxel_size(n: BoxDim_u, half_width: Vector) -> Vector {
        let full_width = half_width * 2.0;
        Vector::new(full_width[0] / n[0] as f32,
                    full_width[1] / n[1] as f32,
                    full_width[2] / n[2] as f32,
        )
    }

    /// Full physical extent of the FOV
    pub fn size(&self) -> Vector { self.half_width * 2.0 }

    /// Corner of the FOV with the smallest coordinates
    pub fn lower_corner(&self) -> Point { self.center - self.half_width }

    pub fn n_voxels(&self) -> usize { voxel_count(self.n) }

    /// Find centre of voxel with given 3D index
    pub fn voxel_centre(&self, i: Index3_u) -> Point {
        let [lx, ly, lz] = self.lower_corner().to_mm();
        let [sx, sy, sz] = self.voxel_size.to_mm();
        Point::from_mm([lx + (i[0] as Lengthf32 + 0.5) * sx,
                        ly + (i[1] as Lengthf32 + 0.5) * sy,
                        lz + (i[2] as Lengthf32 + 0.5) * sz])
    }

    /// Find centre of voxel with given 1D index
    pub fn voxel_centre1(&self, i: Index1_u) -> Point {
        self.voxel_centre(index1_to_3(i, self.n))
    }

    /// Do `self` and `other` describe the same voxel grid (up to rounding)?
    pub fn same_grid(&self, other: &FOV) -> bool {
        self.n == other.n
            && float_eq!(self.center.to_mm(), other.center.to_mm(), abs_all <= 1e-4)
            && float_eq!(self.half_width.to_mm(), other.half_width.to_mm(), rmax_all <= 1e-6)
    }

    /// Fail with a `GeometryMismatch` naming `what` unless `other` describes
    /// the same voxel grid as `self`.
    pub fn ensure_same_grid(&self, other: &FOV, what: &str) -> Result<()> {
        if self.same_grid(other) { return Ok(()) }
        Err(ReconError::geometry(format!(
            "{what}: grid {:?} voxels, {:?} mm wide at {:?} does not match {:?} voxels, {:?} mm wide at {:?}",
            other.n, other.size().to_mm(), other.center.to_mm(),
            self .n, self .size().to_mm(), self .center.to_mm(),
        )))
    }

    /// The point at which the segment from `p1` to `p2` enters the FOV, if it
    /// does. If `p1` is inside the FOV, it is its own entry point.
    pub fn entry(&self, p1: Point, p2: Point) -> Option<Point> {
        self.distance_to_entry(p1, p2)
            .map(|toi| {
                let direction = (p2 - p1) / mm_((p2 - p1).norm());
                p1 + direction * toi
            })
    }

    /// The portion of the segment from `p1` to `p2` which lies inside the FOV,
    /// as distances (in mm) from `p1` of the points where it enters and
    /// leaves. `None` if the segment misses the FOV.
    pub fn clip(&self, p1: Point, p2: Point) -> Option<(Lengthf32, Lengthf32)> {
        let length = mm_((p2 - p1).norm());
        let enter = self.distance_to_entry(p1, p2)?;
        let leave = length - self.distance_to_entry(p2, p1)?;
        if leave > enter { Some((enter, leave)) } else { None }
    }

    fn distance_to_entry(&self, p1: Point, p2: Point) -> Option<Lengthf32> {
        let lor_length = mm_((p2 - p1).norm());
        if !(lor_length > 0.0) { return None }
        let lor_direction = (p2 - p1) / lor_length;
        let lor = Ray::new(p1.into(), lor_direction.into());
        let [cx, cy, cz] = self.center.to_mm();
        let iso = Isometry::translation(cx, cy, cz);
        Cuboid::new(self.half_width.into())
            .cast_ray(&iso, &lor, lor_length, true)
    }
}

#[cfg(test)]
mod test_voxel_box {
    use super::*;
    use rstest::rstest;
    use units::mm;
    use float_eq::assert_float_eq;

    fn cube(size: f32, n: usize) -> FOV {
        FOV::new((mm(size), mm(size), mm(size)), (n, n, n)).unwrap()
    }

    #[rstest]
    #[case([0,0,0], [-1.0, -1.0, -1.0])]
    #[case([0,0,1], [-1.0, -1.0,  1.0])]
    #[case([0,1,0], [-1.0,  1.0, -1.0])]
    #[case([0,1,1], [-1.0,  1.0,  1.0])]
    #[case([1,0,0], [ 1.0, -1.0, -1.0])]
    #[case([1,0,1], [ 1.0, -1.0,  1.0])]
    #[case([1,1,0], [ 1.0,  1.0, -1.0])]
    #[case([1,1,1], [ 1.0,  1.0,  1.0])]
    fn test_voxel_centre(#[case] index: Index3_u, #[case] expected_position: [Lengthf32; 3]) {
        let fov = cube(4.0, 2);
        let c = fov.voxel_centre(index).to_mm();
        assert_float_eq!(c, expected_position, ulps <= [1, 1, 1]);
    }

    #[test]
    fn voxel_centre_of_displaced_fov() {
        let fov = FOV::with_center(Point::from_mm([100.0, 0.0, -50.0]),
                                   (mm(10.0), mm(20.0), mm(30.0)), (1, 2, 3)).unwrap();
        assert_float_eq!(fov.voxel_centre([0, 1, 2]).to_mm(), [100.0, 5.0, -40.0], abs <= [1e-4; 3]);
        assert_float_eq!(fov.voxel_size.to_mm(), [10.0, 10.0, 10.0], abs <= [1e-4; 3]);
    }

    #[rstest]
    #[case((0.0, 1.0, 1.0), (1, 1, 1))]
    #[case((1.0,-1.0, 1.0), (1, 1, 1))]
    #[case((1.0, 1.0, f32::NAN), (1, 1, 1))]
    #[case((1.0, 1.0, 1.0), (1, 0, 1))]
    fn degenerate_fovs_rejected(#[case] size: (f32, f32, f32), #[case] n: (usize, usize, usize)) {
        let (x, y, z) = size;
        let result = FOV::new((mm(x), mm(y), mm(z)), n);
        assert!(matches!(result, Err(ReconError::GeometryMismatch(_))));
    }

    #[test]
    fn entry_and_clip() {
        let fov = cube(10.0, 5);
        let p1 = Point::from_mm([-20.0, 0.0, 0.0]);
        let p2 = Point::from_mm([ 20.0, 0.0, 0.0]);
        assert_float_eq!(fov.entry(p1, p2).unwrap().to_mm(), [-5.0, 0.0, 0.0], abs <= [1e-4; 3]);
        let (enter, leave) = fov.clip(p1, p2).unwrap();
        assert_float_eq!(enter, 15.0, abs <= 1e-4);
        assert_float_eq!(leave, 25.0, abs <= 1e-4);
    }

    #[test]
    fn clip_segment_ending_inside() {
        let fov = cube(10.0, 5);
        let p1 = Point::from_mm([-20.0, 1.0, 1.0]);
        let p2 = Point::from_mm([  2.0, 1.0, 1.0]);
        let (enter, leave) = fov.clip(p1, p2).unwrap();
        assert_float_eq!(enter, 15.0, abs <= 1e-4);
        assert_float_eq!(leave, 22.0, abs <= 1e-4);
    }

    #[test]
    fn missing_segments() {
        let fov = cube(10.0, 5);
        // Passes beside the box
        assert!(fov.clip(Point::from_mm([-20.0, 8.0, 0.0]), Point::from_mm([20.0, 8.0, 0.0])).is_none());
        // Stops short of the box
        assert!(fov.clip(Point::from_mm([-20.0, 0.0, 0.0]), Point::from_mm([-6.0, 0.0, 0.0])).is_none());
        // Zero length
        let p = Point::from_mm([0.0, 0.0, 0.0]);
        assert!(fov.clip(p, p).is_none());
    }

    #[test]
    fn grid_comparison() {
        let a = cube(10.0, 5);
        let b = cube(10.0, 5);
        let c = cube(10.0, 4);
        let d = cube(12.0, 5);
        assert!(a.ensure_same_grid(&b, "test").is_ok());
        assert!(matches!(a.ensure_same_grid(&c, "test"), Err(ReconError::GeometryMismatch(_))));
        assert!(!a.same_grid(&d));
    }
}
