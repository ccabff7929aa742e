//! Projections on the CPU, parallelized over LORs with rayon.

use ndarray::azip;
use rayon::prelude::*;

use crate::LOR;
use crate::error::{ReconError, Result};
use crate::fov::FOV;
use crate::image::{Image, ImageData};
use crate::system_matrix::{SystemMatrixRow, forward_project, back_project};

use super::ProjectionBackend;

#[derive(Default)]
pub struct CpuBackend {
    /// Minimum number of LORs handled by a single rayon job in backprojections.
    /// `None`: split the LORs evenly across the threads.
    job_size: Option<usize>,
    pool: Option<rayon::ThreadPool>,
}

impl CpuBackend {

    /// `threads`: size of a dedicated thread pool; `None` uses rayon's global pool.
    pub fn new(job_size: Option<usize>, threads: Option<usize>) -> Result<Self> {
        if job_size == Some(0) {
            return Err(ReconError::configuration("job size must be at least 1"));
        }
        let pool = match threads {
            None => None,
            Some(0) => return Err(ReconError::configuration("number of threads must be at least 1")),
            Some(n) => Some(rayon::ThreadPoolBuilder::new()
                            .num_threads(n)
                            .build()
                            .map_err(|e| ReconError::configuration(format!("could not build thread pool: {e}")))?),
        };
        Ok(Self { job_size, pool })
    }

    fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    fn threads(&self) -> usize {
        self.pool.as_ref()
            .map(|pool| pool.current_num_threads())
            .unwrap_or_else(rayon::current_num_threads)
    }

    fn job_size(&self, n_lors: usize) -> usize {
        self.job_size
            .unwrap_or_else(|| n_lors / self.threads())
            .max(1)
    }
}

impl ProjectionBackend for CpuBackend {

    fn name(&self) -> &'static str { "cpu" }

    fn forward(&self, image: &Image, lors: &[LOR]) -> Result<Vec<f32>> {
        let fov = &image.fov;
        Ok(self.install(|| lors
            .par_iter()
            .map_init(|| SystemMatrixRow::buffers(fov),
                      |row, lor| {
                          row.fill(lor, fov);
                          forward_project(row, &image.data)
                      })
            .collect()))
    }

    fn backward(&self, fov: &FOV, lors: &[LOR], values: &[f32]) -> Result<ImageData> {
        if lors.len() != values.len() {
            return Err(ReconError::geometry(format!("{} values for {} LORs", values.len(), lors.len())));
        }
        let job_size = self.job_size(lors.len());

        // Closure preparing the state needed by `fold`: will be called by
        // `fold` at the start of every job that is launched.
        let initial_job_state = || FoldState {
            backprojection: Image::zeros_buffer(*fov),
            system_matrix_row: SystemMatrixRow::buffers(fov),
        };

        Ok(self.install(|| lors
            .par_iter()
            .zip(values.par_iter())
            // Rayon is too eager in spawning small jobs, each of which requires the
            // construction and subsequent combination of expensive accumulators
            // (whole images). So here we try to limit it to one job per thread.
            .with_min_len(job_size)
            .fold(initial_job_state, |mut state, (lor, &value)| {
                if value != 0.0 {
                    state.system_matrix_row.fill(lor, fov);
                    back_project(&mut state.backprojection, &state.system_matrix_row, value);
                }
                state
            })
            // Keep only the backprojection (ignore weights and indices)
            .map(|state| state.backprojection)
            // Sum the backprojections calculated on each job
            .reduce(|| Image::zeros_buffer(*fov), elementwise_add)))
    }
}

// Data needed by each job of the backprojection fold
struct FoldState {
    backprojection: ImageData,
    system_matrix_row: SystemMatrixRow,
}

fn elementwise_add(mut a: ImageData, b: ImageData) -> ImageData {
    azip!((x in &mut a[..], &y in &b[..]) *x += y);
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Point;
    use float_eq::assert_float_eq;
    use rstest::rstest;
    use units::mm;
    use rand::{Rng, SeedableRng};
    use rand_isaac::IsaacRng;

    fn random_lors(n: usize, rng: &mut IsaacRng) -> Vec<LOR> {
        let mut point = || Point::from_mm([rng.gen_range(-80.0..80.0),
                                           rng.gen_range(-80.0..80.0),
                                           rng.gen_range(-80.0..80.0)]);
        (0..n).map(|_| LOR::new(point(), point())).collect()
    }

    // Backprojection must not depend on how the LORs are split into jobs
    #[rstest]
    #[case(None,     None)]
    #[case(Some(1),  None)]
    #[case(Some(7),  Some(2))]
    #[case(Some(500), Some(3))]
    fn job_partitioning_does_not_change_result(#[case] job_size: Option<usize>, #[case] threads: Option<usize>) {
        let fov = FOV::new((mm(100.0), mm(80.0), mm(60.0)), (10, 8, 6)).unwrap();
        let mut rng = IsaacRng::seed_from_u64(42);
        let lors = random_lors(200, &mut rng);
        let values: Vec<f32> = (0..lors.len()).map(|_| rng.gen_range(0.0..2.0)).collect();

        let serial = CpuBackend::new(Some(usize::MAX), Some(1)).unwrap();
        let reference = serial.backward(&fov, &lors, &values).unwrap();

        let backend = CpuBackend::new(job_size, threads).unwrap();
        let result = backend.backward(&fov, &lors, &values).unwrap();
        for (a, b) in result.iter().zip(&reference) {
            assert_float_eq!(*a, *b, abs <= 1e-4, rmax <= 1e-5);
        }
    }

    // ⟨P x, y⟩ = ⟨x, Pᵀ y⟩
    #[test]
    fn forward_and_backward_are_adjoint() {
        let fov = FOV::new((mm(100.0), mm(100.0), mm(100.0)), (9, 9, 9)).unwrap();
        let mut rng = IsaacRng::seed_from_u64(7);
        let lors = random_lors(300, &mut rng);
        let x = Image::new(fov, (0..fov.n_voxels()).map(|_| rng.gen_range(0.0..1.0)).collect()).unwrap();
        let y: Vec<f32> = (0..lors.len()).map(|_| rng.gen_range(0.0..1.0)).collect();

        let backend = CpuBackend::default();
        let px  = backend.forward(&x, &lors).unwrap();
        let pty = backend.backward(&fov, &lors, &y).unwrap();

        let lhs: f64 = px.iter().zip(&y).map(|(a, b)| (a * b) as f64).sum();
        let rhs: f64 = x.data.iter().zip(&pty).map(|(a, b)| (a * b) as f64).sum();
        assert_float_eq!(lhs, rhs, rmax <= 1e-4);
    }

    #[rstest]
    #[case(Some(0), None)]
    #[case(None, Some(0))]
    fn degenerate_settings_rejected(#[case] job_size: Option<usize>, #[case] threads: Option<usize>) {
        assert!(matches!(CpuBackend::new(job_size, threads), Err(ReconError::Configuration(_))));
    }

    #[test]
    fn mismatched_values_rejected() {
        let fov = FOV::new((mm(10.0), mm(10.0), mm(10.0)), (2, 2, 2)).unwrap();
        let lor = LOR::new(Point::from_mm([-9.0, 0.0, 0.0]), Point::from_mm([9.0, 0.0, 0.0]));
        let result = CpuBackend::default().backward(&fov, &[lor], &[1.0, 2.0]);
        assert!(matches!(result, Err(ReconError::GeometryMismatch(_))));
    }
}
