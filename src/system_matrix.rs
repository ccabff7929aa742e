//! Find the weights and indices of the active voxels along a single Line Of
//! Response LOR.
//!
//! The algorithm is centred around two key simplifications:
//!
//! 1. Express the voxel size in terms of distance along the LOR. This allows
//!    trivial calculation of how far we must move along the LOR before
//!    reaching the next voxel boundary, in any dimension.
//!
//! 2. Only the part of the LOR inside the FOV is walked: the entry and exit
//!    distances come from a ray cast against the FOV box, so the walk starts
//!    in a known voxel and stops at a known distance.

use crate::{Index1_u, LOR, Lengthf32, Weightf32, Intensityf32};
use crate::fov::FOV;
use crate::image::ImageData;
use crate::index::index3_to_1;

// Voxel coordinates closer than this to a voxel boundary are put exactly on it.
const EPS: f32 = 1e-5;

// ----- Storage of system matrix elements. Only one row is relevant at any single time ------
pub type SystemMatrixElement = (Index1_u, Weightf32);

/// Sparse storage of the slice through the system matrix which corresponds
/// to one LOR.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SystemMatrixRow(pub Vec<SystemMatrixElement>);

impl SystemMatrixRow {

    // Allocating these anew for each LOR had a noticeable runtime cost, so we
    // create them up-front and reuse them.
    pub fn buffers(fov: &FOV) -> Self {
        let [nx, ny, nz] = fov.n;
        let max_number_of_coupled_voxels_possible = nx + ny + nz;
        Self(Vec::with_capacity(max_number_of_coupled_voxels_possible))
    }

    pub fn new(lor: &LOR, fov: &FOV) -> Self {
        let mut row = Self::buffers(fov);
        row.fill(lor, fov);
        row
    }

    pub fn iter(&self) -> std::slice::Iter<SystemMatrixElement> { self.0.iter() }
    pub fn clear(&mut self) { self.0.clear(); }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Total length of the LOR inside the FOV
    pub fn total_weight(&self) -> Weightf32 { self.0.iter().map(|(_, w)| w).sum() }

    /// For a single LOR, place the weights and indices of the coupled voxels in
    /// `self`, discarding the previous LOR's values. Using an output parameter
    /// rather than a return value, because this is called in the inner loop.
    pub fn fill(&mut self, lor: &LOR, fov: &FOV) {
        // Throw away previous LOR's values
        self.clear();

        // Analyse points where LOR enters and leaves FOV
        let Some((enter, leave)) = fov.clip(lor.p1, lor.p2) else { return };
        let Some(mut walk) = Walk::new(lor, fov, enter) else { return };

        // How far we have moved along the LOR since p1
        let mut here = enter;

        loop {
            // Which voxel boundary will be hit next, and its position
            let (dimension, boundary_position) = walk.nearest_boundary();

            // The weight is the length of LOR in this voxel
            let there = boundary_position.min(leave);
            let weight = there - here;

            // Store the index and weight of the voxel we have just crossed
            if weight > 0.0 {
                self.0.push((index3_to_1(walk.index, fov.n), weight));
            }

            // Move along LOR until it leaves this voxel
            here = there;
            if here >= leave { break; }

            // If we have traversed the whole FOV, we're finished
            if !walk.cross(dimension) { break; }
        }
    }
}

impl IntoIterator for SystemMatrixRow {
    type Item = SystemMatrixElement;
    type IntoIter = std::vec::IntoIter<Self::Item>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a SystemMatrixRow {
    type Item = SystemMatrixElement;
    type IntoIter = std::iter::Cloned<std::slice::Iter<'a, Self::Item>>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter().cloned()
    }
}

/// Per-axis state of the voxel walk, in distances along the LOR (mm from p1)
struct Walk {
    index: [usize; 3],
    step: [isize; 3],
    next_boundary: [Lengthf32; 3],
    voxel_size: [Lengthf32; 3],
    remaining: [usize; 3],
}

impl Walk {

    fn new(lor: &LOR, fov: &FOV, enter: Lengthf32) -> Option<Self> {
        let p1 = lor.p1.to_mm();
        let p2 = lor.p2.to_mm();
        let delta = [p2[0] - p1[0], p2[1] - p1[1], p2[2] - p1[2]];
        let length = (delta[0]*delta[0] + delta[1]*delta[1] + delta[2]*delta[2]).sqrt();
        if !(length > 0.0) { return None }

        let lower = fov.lower_corner().to_mm();
        let size  = fov.voxel_size.to_mm();

        let mut walk = Walk {
            index: [0; 3],
            step: [0; 3],
            next_boundary: [Lengthf32::INFINITY; 3],
            voxel_size: [Lengthf32::INFINITY; 3],
            remaining: [usize::MAX; 3],
        };

        for d in 0..3 {
            let direction = delta[d] / length;
            let entry = p1[d] + direction * enter;

            // Express entry point in voxel coordinates: floor(position) = index of voxel
            let mut v = (entry - lower[d]) / size[d];

            // Floating-point calculations which should land on a boundary
            // usually miss very slightly: if this error is negative, the floor
            // below will pick the wrong voxel.
            if (v - v.round()).abs() < EPS { v = v.round(); }

            let n = fov.n[d];
            let i = (v.floor().max(0.0) as usize).min(n - 1);
            walk.index[d] = i;

            if direction > 0.0 {
                let per_voxel = size[d] / direction;
                walk.step[d] = 1;
                walk.voxel_size[d] = per_voxel;
                walk.next_boundary[d] = enter + ((i + 1) as f32 - v) * per_voxel;
                walk.remaining[d] = n - i;
            } else if direction < 0.0 {
                let per_voxel = size[d] / -direction;
                walk.step[d] = -1;
                walk.voxel_size[d] = per_voxel;
                walk.next_boundary[d] = enter + (v - i as f32) * per_voxel;
                walk.remaining[d] = i + 1;
            }
            // Axes parallel to the LOR keep infinite boundaries: never crossed
        }
        Some(walk)
    }

    /// Dimension and position of the next boundary. Ties go to x, then y, then z.
    #[inline]
    fn nearest_boundary(&self) -> (usize, Lengthf32) {
        let b = &self.next_boundary;
        let mut d = 0;
        if b[1] < b[d] { d = 1; }
        if b[2] < b[d] { d = 2; }
        (d, b[d])
    }

    /// Move into the next voxel along `d`. `false` if that leaves the FOV.
    #[inline]
    fn cross(&mut self, d: usize) -> bool {
        self.remaining[d] -= 1;
        if self.remaining[d] == 0 { return false }
        self.index[d] = (self.index[d] as isize + self.step[d]) as usize;
        self.next_boundary[d] += self.voxel_size[d];
        true
    }
}

/// Σ image[voxel] * weight, over the voxels coupled to one LOR
#[inline]
pub fn forward_project(system_matrix_row: &SystemMatrixRow, image: &[Intensityf32]) -> Intensityf32 {
    let mut projection = 0.0;
    for (j, w) in system_matrix_row {
        projection += image[j] * w
    }
    projection
}

/// Distribute `value` over the voxels coupled to one LOR
#[inline]
pub fn back_project(backprojection: &mut ImageData, system_matrix_row: &SystemMatrixRow, value: Intensityf32) {
    for (j, w) in system_matrix_row {
        backprojection[j] += value * w;
    }
}
