//! Hooks called by [`Mlem`](crate::Mlem) after every iteration.

use std::path::PathBuf;

use log::{debug, warn};

use crate::image::Image;

/// Receives the estimate produced by each iteration (numbered from 1) and
/// returns the image with which the run continues. The returned image must
/// be on the same grid.
pub trait IterationObserver {
    fn observe(&mut self, iteration: usize, image: Image) -> Image;
}

impl<F> IterationObserver for F
where
    F: FnMut(usize, Image) -> Image,
{
    fn observe(&mut self, iteration: usize, image: Image) -> Image { self(iteration, image) }
}

/// Observer which does nothing
#[derive(Clone, Copy, Debug, Default)]
pub struct NoObserver;

impl IterationObserver for NoObserver {
    fn observe(&mut self, _: usize, image: Image) -> Image { image }
}

/// Keeps a copy of the estimate every `every` iterations.
#[derive(Clone, Debug)]
pub struct Snapshots {
    every: usize,
    images: Vec<(usize, Image)>,
}

impl Snapshots {
    pub fn every(n: usize) -> Self { Self { every: n.max(1), images: vec![] } }
    pub fn images(&self) -> &[(usize, Image)] { &self.images }
    pub fn into_images(self) -> Vec<(usize, Image)> { self.images }
}

impl IterationObserver for Snapshots {
    fn observe(&mut self, iteration: usize, image: Image) -> Image {
        if iteration % self.every == 0 {
            self.images.push((iteration, image.clone()));
        }
        image
    }
}

/// Writes the estimate to `{prefix}_{iteration:02}.raw` every `every`
/// iterations. Write failures are logged and do not stop the run.
#[derive(Clone, Debug)]
pub struct RawSnapshots {
    prefix: String,
    every: usize,
    written: Vec<PathBuf>,
}

impl RawSnapshots {
    pub fn new(prefix: impl Into<String>, every: usize) -> Self {
        Self { prefix: prefix.into(), every: every.max(1), written: vec![] }
    }

    pub fn path(&self, iteration: usize) -> PathBuf {
        PathBuf::from(format!("{}_{iteration:02}.raw", self.prefix))
    }

    /// Files successfully written so far
    pub fn written(&self) -> &[PathBuf] { &self.written }
}

impl IterationObserver for RawSnapshots {
    fn observe(&mut self, iteration: usize, image: Image) -> Image {
        if iteration % self.every == 0 {
            let path = self.path(iteration);
            match image.write_to_raw_file(&path) {
                Ok(()) => {
                    debug!("Wrote {}", path.display());
                    self.written.push(path);
                }
                Err(e) => warn!("Could not write snapshot {}: {e}", path.display()),
            }
        }
        image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fov::FOV;
    use units::mm;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

    fn image(value: f32) -> Image {
        Image::uniform(FOV::new((mm(2.0), mm(2.0), mm(2.0)), (2, 2, 2)).unwrap(), value)
    }

    #[test]
    fn closures_are_observers() {
        let mut seen = vec![];
        let mut observer = |k: usize, image: Image| { seen.push(k); image };
        for k in 1..=3 { observer.observe(k, image(1.0)); }
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn snapshots_kept_at_requested_interval() {
        let mut snapshots = Snapshots::every(2);
        for k in 1..=5 { snapshots.observe(k, image(k as f32)); }
        let kept: Vec<_> = snapshots.images().iter().map(|(k, i)| (*k, i[0])).collect();
        assert_eq!(kept, vec![(2, 2.0), (4, 4.0)]);
    }

    #[test]
    fn raw_snapshots_one_file_per_iteration() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("run").to_string_lossy().into_owned();
        let mut snapshots = RawSnapshots::new(prefix, 1);
        for k in 1..=3 { snapshots.observe(k, image(k as f32)); }
        assert_eq!(snapshots.written().len(), 3);
        assert!(dir.path().join("run_01.raw").exists());
        assert!(dir.path().join("run_03.raw").exists());
        let reloaded = Image::from_raw_file(image(0.0).fov, &dir.path().join("run_02.raw")).unwrap();
        assert_eq!(reloaded, image(2.0));
    }

    #[test]
    fn raw_snapshot_failures_do_not_interrupt() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("no/such/dir/run").to_string_lossy().into_owned();
        let mut snapshots = RawSnapshots::new(prefix, 1);
        let returned = snapshots.observe(1, image(7.0));
        assert_eq!(returned, image(7.0));
        assert!(snapshots.written().is_empty());
    }
}
