use crate::coords::Observer;
use crate::pec::PecOptions;
use crate::solver::{PlateSolver, SkyHint};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "drift-guard")]
#[command(about = "Telescope pointing and tracking-error analysis for plate-solved images", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Plate solve an image and report the solution
    Solve {
        /// FITS file to solve
        file: String,

        #[command(flatten)]
        solver: SolverOptions,

        /// Output format (json, table)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Pointing error of a solved image: commanded target vs solved center
    PointingError {
        /// Solved FITS file carrying RA/DEC target headers
        file: String,

        /// Output format (json, table)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Drift between two frames of the same field
    Offset {
        /// First (earlier) FITS file
        first: String,

        /// Second (later) FITS file
        second: String,

        /// Compare plate-solved centers instead of registering pixels
        #[arg(long)]
        from_centers: bool,

        /// Register full frames instead of the central 500x500 crop
        #[arg(long)]
        no_crop: bool,

        /// Sub-pixel refinement factor for registration
        #[arg(long, default_value_t = crate::registration::DEFAULT_UPSAMPLE)]
        upsample: usize,

        /// Tracking rate in arcsec/s (default: 0.9 x sidereal)
        #[arg(long)]
        rate: Option<f64>,

        /// Seconds between frames, used when DATE-OBS is missing
        #[arg(long)]
        delta_t: Option<f64>,

        /// Solved FITS file supplying the WCS for pixel registration
        /// (default: the first frame or its .new sibling)
        #[arg(long)]
        wcs_file: Option<String>,

        /// Output format (json, table)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Build the periodic-error series from a directory of guide images
    PecData {
        /// Directory containing the guide frames
        dir: String,

        #[command(flatten)]
        site: SiteOptions,

        #[command(flatten)]
        sequence: SequenceOptions,

        #[command(flatten)]
        solver: SolverOptions,

        /// Output format (json, csv, table)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Fit the worm-gear sinusoid to the periodic-error series
    PecFit {
        /// Directory containing the guide frames
        dir: String,

        #[command(flatten)]
        site: SiteOptions,

        #[command(flatten)]
        sequence: SequenceOptions,

        #[command(flatten)]
        solver: SolverOptions,

        /// Write a PNG of the samples and fitted curves
        #[arg(long)]
        plot: Option<String>,

        /// Output format (json, table)
        #[arg(short, long, default_value = "table")]
        format: String,
    },
}

#[derive(Parser, Debug, Clone)]
pub struct SolverOptions {
    /// Path to solve-field (default: $SOLVE_FIELD, then "solve-field")
    #[arg(long)]
    pub solver: Option<String>,

    /// CPU seconds handed to the solver (--cpulimit)
    #[arg(long, default_value = "15")]
    pub cpu_limit: u32,

    /// Wall-clock seconds to wait for the solver process
    #[arg(long, default_value = "30")]
    pub timeout: u64,

    /// Downsample factor before source extraction
    #[arg(long, default_value = "4")]
    pub downsample: u32,

    /// RA search hint, degrees
    #[arg(long, allow_hyphen_values = true)]
    pub ra: Option<f64>,

    /// Dec search hint, degrees
    #[arg(long, allow_hyphen_values = true)]
    pub dec: Option<f64>,

    /// Search radius around the hint, degrees
    #[arg(long, default_value = "10.0")]
    pub radius: f64,

    /// Directory for solver temp files (default: a managed scratch dir)
    #[arg(long)]
    pub temp_dir: Option<String>,

    /// Re-solve files astrometry.net already marked solved
    #[arg(long)]
    pub no_skip_solved: bool,
}

impl SolverOptions {
    pub fn to_solver(&self) -> Result<PlateSolver> {
        let mut solver = PlateSolver::new()?
            .with_cpu_limit(self.cpu_limit)
            .with_wait_timeout(Duration::from_secs(self.timeout))
            .with_downsample(self.downsample)
            .with_skip_solved(!self.no_skip_solved);
        if let Some(path) = &self.solver {
            solver = solver.with_path(path);
        }
        if let Some(dir) = &self.temp_dir {
            solver = solver.with_temp_dir(dir);
        }
        Ok(solver)
    }

    /// Search hint, present only when both coordinates were given.
    pub fn hint(&self) -> Option<SkyHint> {
        match (self.ra, self.dec) {
            (Some(ra_deg), Some(dec_deg)) => Some(SkyHint {
                ra_deg,
                dec_deg,
                radius_deg: self.radius,
            }),
            _ => None,
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct SiteOptions {
    /// Observatory latitude, degrees north
    #[arg(long, allow_hyphen_values = true)]
    pub latitude: f64,

    /// Observatory longitude, degrees east
    #[arg(long, allow_hyphen_values = true)]
    pub longitude: f64,
}

impl SiteOptions {
    pub fn observer(&self) -> Observer {
        Observer::new(self.latitude, self.longitude)
    }
}

#[derive(Parser, Debug, Clone)]
pub struct SequenceOptions {
    /// Guide-frame filename prefix
    #[arg(long, default_value = crate::pec::DEFAULT_GUIDE_PREFIX)]
    pub prefix: String,

    /// Reference frame name (default: the latest guide frame)
    #[arg(long)]
    pub ref_image: Option<String>,

    /// Worm-gear period, seconds
    #[arg(long, default_value_t = crate::pec::DEFAULT_GEAR_PERIOD_S)]
    pub gear_period: f64,

    /// Fail on unsolved frames instead of solving them
    #[arg(long)]
    pub no_solve: bool,
}

impl SequenceOptions {
    pub fn to_pec_options(&self) -> PecOptions {
        PecOptions {
            prefix: self.prefix.clone(),
            ref_image: self.ref_image.clone(),
            gear_period_s: self.gear_period,
            solve_missing: !self.no_solve,
        }
    }
}
