// ----------------------------------- CLI -----------------------------------
#[derive(clap::Parser, Debug, Clone)]
#[clap(name = "mlem", about = "Reconstruct a synthetic phantom with listmode MLEM")]
pub struct Cli {

    /// TOML file with the grid, backend and iteration settings
    #[clap(short, long, default_value = "mlem.toml")]
    pub config: PathBuf,

    /// Override the number of iterations given in the config file
    #[clap(short, long)]
    pub iterations: Option<usize>,

    /// Override the backend given in the config file: `cpu` or `device`
    #[clap(short, long)]
    pub backend: Option<Backend>,

    /// Write the estimate to `{PREFIX}_{iteration:02}.raw` after every
    /// iteration, overriding the config file
    #[clap(short, long)]
    pub snapshots: Option<String>,

    /// Write the phantom to this file, before reconstruction
    #[clap(long)]
    pub phantom: Option<PathBuf>,

    /// Inner radius of the detector ring
    #[clap(long, default_value = "350 mm")]
    pub r_min: Length,

    /// Radial thickness of the scintillator
    #[clap(long, default_value = "30 mm")]
    pub dr: Length,

    /// Axial length of the detector
    #[clap(long, short = 'l', default_value = "200 mm")]
    pub detector_length: Length,

    /// Size of the detector elements, both axially and around the ring
    #[clap(long, default_value = "20 mm")]
    pub element_size: Length,

    /// Build the sensitivity map from a random sample of this many of the
    /// possible LORs, rather than from all of them
    #[clap(long)]
    pub sensitivity_sample: Option<usize>,

    /// Show per-iteration timings
    #[clap(short, long)]
    pub verbose: bool,
}

fn main() -> Result<(), Box<dyn Error>> {

    let args = Cli::parse();
    setup_logging(args.verbose);

    let mut config = read_config_file(&args.config)?;
    if let Some(n) = args.iterations { config.iterations = n; }
    if let Some(b) = args.backend    { config.backend    = b; }
    if let Some(prefix) = args.snapshots.clone() {
        config.snapshots = Some(SnapshotSettings { prefix, every: 1 });
    }
    info!("Configuration: {config:?}");

    let fov = config.fov()?;
    let (projector, back_projector) = config.projectors()?;
    let backend = projector.backend().clone();

    let ring = Ring::new(args.r_min, args.dr, args.element_size, args.element_size, args.detector_length)?;
    let start = Instant::now();
    let lors = ring.all_lors(&fov);
    info!("{} detector elements, {} LORs through the FOV, in {:.1?}", ring.n_elements(), lors.len(), start.elapsed());

    let start = Instant::now();
    let sensitivity = match args.sensitivity_sample {
        Some(n) if n < lors.len() => {
            let sample: Vec<LOR> = lors.choose_multiple(&mut rand::thread_rng(), n).copied().collect();
            SensitivityMap::from_lors(&*backend, fov, &sample)?
        }
        _ => SensitivityMap::from_lors(&*backend, fov, &lors)?,
    };
    info!("Sensitivity map from {} backend in {:.1?}", backend.name(), start.elapsed());

    let phantom = phantom(fov);
    if let Some(path) = &args.phantom {
        create_parent_dir(path)?;
        phantom.write_to_raw_file(path)?;
        info!("Wrote phantom to {}", path.display());
    }

    // Noiseless data: the projection of the phantom
    let measured = projector.project(&phantom, &lors)?;
    info!("Simulated {:.4e} counts on {} LORs", measured.sum(), measured.len());

    // Voxels which no LOR reaches cannot be reconstructed: start them at zero
    let initial = Image::new(fov, sensitivity.image().data.iter()
                             .map(|&s| if s > 0.0 { 1.0 } else { 0.0 })
                             .collect())?;

    let mlem = Mlem::new(projector, back_projector, sensitivity, config.iterations)?;
    let image = match &config.snapshots {
        Some(SnapshotSettings { prefix, every }) => {
            create_parent_dir(Path::new(prefix))?;
            let mut snapshots = RawSnapshots::new(prefix.clone(), *every);
            let image = mlem.reconstruct_with(&measured, Some(initial), &mut snapshots)?;
            info!("Wrote {} snapshots", snapshots.written().len());
            image
        }
        None => mlem.reconstruct(&measured, Some(initial))?,
    };

    if let Some((voxel, value)) = image.max_voxel() {
        info!("Hottest voxel {voxel:?} at {:?} mm: {value:.3}", fov.voxel_centre(voxel).to_mm());
    }
    let hot_mean = mean_over(&image, in_hot_sphere);
    let background_mean = mean_over(&image, |p| !in_hot_sphere(p) && in_body(p));
    // The sensitivity map is normalized by the number of LORs, so only
    // relative activities are meaningful
    info!("Mean activity: hot sphere {hot_mean:.3e}, background {background_mean:.3e}, contrast {:.2} (true {:.2})",
          hot_mean / background_mean, HOT / BACKGROUND);
    Ok(())
}

fn setup_logging(verbose: bool) {
    let level = if verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
}

fn create_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => create_dir_all(dir),
        _ => Ok(()),
    }
}

// ----- Phantom: hot sphere inside a uniform cylinder -----------------------------
const HOT: f32 = 4.0;
const BACKGROUND: f32 = 1.0;
const BODY_RADIUS: Lengthf32 = 60.0;
const SPHERE_RADIUS: Lengthf32 = 20.0;
const SPHERE_CENTRE: [Lengthf32; 3] = [25.0, 0.0, 0.0];

fn in_body([x, y, _]: [Lengthf32; 3]) -> bool {
    x * x + y * y <= BODY_RADIUS * BODY_RADIUS
}

fn in_hot_sphere(p: [Lengthf32; 3]) -> bool {
    let d2: f32 = p.iter().zip(SPHERE_CENTRE).map(|(a, b)| (a - b) * (a - b)).sum();
    d2 <= SPHERE_RADIUS * SPHERE_RADIUS
}

fn phantom(fov: FOV) -> Image {
    let data = (0..fov.n_voxels())
        .map(|i| fov.voxel_centre1(i).to_mm())
        .map(|p| if in_hot_sphere(p) { HOT } else if in_body(p) { BACKGROUND } else { 0.0 })
        .collect();
    Image { fov, data }
}

fn mean_over(image: &Image, select: impl Fn([Lengthf32; 3]) -> bool) -> f32 {
    let (sum, n) = image.data.iter().enumerate()
        .filter(|&(i, _)| select(image.fov.voxel_centre1(i).to_mm()))
        .fold((0.0, 0), |(sum, n), (_, &v)| (sum + v, n + 1));
    if n == 0 { 0.0 } else { sum / n as f32 }
}

// ----- Imports -----------------------------------------------------------------------------------------
use clap::Parser;
use log::info;
use rand::seq::SliceRandom;

use std::{
    error::Error,
    fs::create_dir_all,
    path::{Path, PathBuf},
    time::Instant,
};

use lmrecon::{
    Backend, FOV, Image, LOR, Length, Lengthf32, Mlem, SensitivityMap,
    config::{read_config_file, SnapshotSettings},
    detector::Ring,
    observer::RawSnapshots,
};
