//! External plate-solver invocation.
//!
//! Delegates the actual astrometry to astrometry.net's `solve-field`
//! binary: this module only marshals arguments, enforces a wall-clock
//! bound on the child process, and parses what the solver leaves behind.

use crate::coords::Equatorial;
use crate::fits::FitsHeader;
use crate::wcs::WcsInfo;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Sky position hint passed down to the solver to bound its search.
#[derive(Debug, Clone, Copy)]
pub struct SkyHint {
    pub ra_deg: f64,
    pub dec_deg: f64,
    pub radius_deg: f64,
}

/// Result of a successful plate solve.
#[derive(Debug)]
pub struct Solution {
    /// The solved FITS file the solver wrote (`.new`).
    pub solved_path: PathBuf,
    pub header: FitsHeader,
    pub wcs: WcsInfo,
    pub date_obs: Option<DateTime<Utc>>,
    /// Field center as printed on the solver's stdout, when present.
    /// Kept as a cross-check against the header WCS.
    pub stdout_center: Option<Equatorial>,
}

/// Configured `solve-field` invocation.
#[derive(Debug)]
pub struct PlateSolver {
    solve_field_path: String,
    cpu_limit_s: u32,
    wait_timeout: Duration,
    downsample: u32,
    overwrite: bool,
    skip_solved: bool,
    temp_dir: Option<PathBuf>,
    scratch: Option<tempfile::TempDir>,
}

impl PlateSolver {
    /// Solver with the default option set.
    ///
    /// The binary path comes from the `SOLVE_FIELD` environment variable
    /// when set, falling back to `solve-field` on the search path. Solver
    /// temp files go to a managed scratch directory unless
    /// [`with_temp_dir`](Self::with_temp_dir) overrides it.
    pub fn new() -> Result<Self> {
        let scratch = tempfile::Builder::new()
            .prefix("drift-guard-solve")
            .tempdir()
            .context("Failed to create solver scratch directory")?;
        Ok(Self {
            solve_field_path: std::env::var("SOLVE_FIELD")
                .unwrap_or_else(|_| "solve-field".to_string()),
            cpu_limit_s: 15,
            wait_timeout: Duration::from_secs(30),
            downsample: 4,
            overwrite: true,
            skip_solved: true,
            temp_dir: None,
            scratch: Some(scratch),
        })
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.solve_field_path = path.into();
        self
    }

    /// CPU budget handed to the solver itself (`--cpulimit`).
    pub fn with_cpu_limit(mut self, seconds: u32) -> Self {
        self.cpu_limit_s = seconds;
        self
    }

    /// Wall-clock bound on the child process.
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    pub fn with_downsample(mut self, factor: u32) -> Self {
        self.downsample = factor;
        self
    }

    pub fn with_skip_solved(mut self, skip: bool) -> Self {
        self.skip_solved = skip;
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self.scratch = None;
        self
    }

    /// Check whether the configured solver binary can be executed.
    pub fn is_available(&self) -> bool {
        Command::new(&self.solve_field_path)
            .arg("--help")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
    }

    fn effective_temp_dir(&self) -> Option<&Path> {
        self.temp_dir
            .as_deref()
            .or_else(|| self.scratch.as_ref().map(|d| d.path()))
    }

    fn build_args(&self, image: &Path, hint: Option<&SkyHint>) -> Vec<String> {
        let mut args = vec![
            "--guess-scale".to_string(),
            "--cpulimit".to_string(),
            self.cpu_limit_s.to_string(),
            "--no-verify".to_string(),
            "--no-plots".to_string(),
            "--crpix-center".to_string(),
            "--downsample".to_string(),
            self.downsample.to_string(),
        ];
        if self.overwrite {
            args.push("--overwrite".to_string());
        }
        if self.skip_solved {
            args.push("--skip-solved".to_string());
        }
        if let Some(hint) = hint {
            args.push("--ra".to_string());
            args.push(hint.ra_deg.to_string());
            args.push("--dec".to_string());
            args.push(hint.dec_deg.to_string());
            args.push("--radius".to_string());
            args.push(hint.radius_deg.to_string());
        }
        if let Some(dir) = self.effective_temp_dir() {
            args.push("--temp-dir".to_string());
            args.push(dir.display().to_string());
        }
        args.push(image.display().to_string());
        args
    }

    /// Plate solve a FITS image and read back the solution.
    ///
    /// The solver writes a sibling `.new` file carrying the original
    /// header plus the WCS; that file is the source of truth for the
    /// returned solution. A solver exit with no `.new` file is a failure
    /// even when the exit status is zero.
    pub fn solve(&self, image: &Path, hint: Option<&SkyHint>) -> Result<Solution> {
        if !image.exists() {
            bail!("Image does not exist: {}", image.display());
        }

        let args = self.build_args(image, hint);
        tracing::info!("Running {} on {}", self.solve_field_path, image.display());
        tracing::debug!("Command: {} {}", self.solve_field_path, args.join(" "));

        let mut child = Command::new(&self.solve_field_path)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| {
                format!("Failed to execute solver binary: {}", self.solve_field_path)
            })?;

        // Drain the pipes off-thread so a chatty solver can't fill them
        // and stall while we poll for exit.
        let stdout_reader = child.stdout.take().map(spawn_reader);
        let stderr_reader = child.stderr.take().map(spawn_reader);

        let start = Instant::now();
        let status = loop {
            match child.try_wait()? {
                Some(status) => break status,
                None => {
                    if start.elapsed() > self.wait_timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        bail!(
                            "Plate solve timed out after {:.0?} on {}",
                            self.wait_timeout,
                            image.display()
                        );
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
            }
        };

        let stdout = join_reader(stdout_reader);
        let stderr = join_reader(stderr_reader);

        let solved_path = image.with_extension("new");
        if !solved_path.exists() {
            tracing::error!("solve-field failed:\nstdout: {}\nstderr: {}", stdout, stderr);
            bail!(
                "Plate solve produced no solution for {} (status {}): {}",
                image.display(),
                status,
                stderr.trim()
            );
        }

        let stdout_center = parse_field_center(&stdout);
        if let Some(center) = &stdout_center {
            tracing::debug!(
                "Solver reported field center RA {:.4} Dec {:.4}",
                center.ra_deg,
                center.dec_deg
            );
        }

        let header = FitsHeader::read(&solved_path)?;
        let wcs = WcsInfo::from_header(&header)
            .with_context(|| format!("Solved file has no usable WCS: {}", solved_path.display()))?;
        let date_obs = header.date_obs().ok();

        Ok(Solution {
            solved_path,
            header,
            wcs,
            date_obs,
            stdout_center,
        })
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut source: R) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buffer = String::new();
        let _ = source.read_to_string(&mut buffer);
        buffer
    })
}

fn join_reader(handle: Option<std::thread::JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

/// Pull the field center out of solve-field's stdout.
fn parse_field_center(stdout: &str) -> Option<Equatorial> {
    let re = Regex::new(
        r"Field center: \(RA,Dec\) = \(([-+]?[0-9]*\.?[0-9]+),\s*([-+]?[0-9]*\.?[0-9]+)\) deg",
    )
    .ok()?;
    let caps = re.captures(stdout)?;
    let ra = caps.get(1)?.as_str().parse::<f64>().ok()?;
    let dec = caps.get(2)?.as_str().parse::<f64>().ok()?;
    Some(Equatorial::new(ra, dec))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solver() -> PlateSolver {
        PlateSolver::new().unwrap()
    }

    #[test]
    fn test_default_args() {
        let s = solver();
        let args = s.build_args(Path::new("/data/guide_01.fits"), None);
        assert_eq!(args[0], "--guess-scale");
        assert!(args.contains(&"--cpulimit".to_string()));
        assert!(args.contains(&"15".to_string()));
        assert!(args.contains(&"--no-verify".to_string()));
        assert!(args.contains(&"--no-plots".to_string()));
        assert!(args.contains(&"--crpix-center".to_string()));
        assert!(args.contains(&"--downsample".to_string()));
        assert!(args.contains(&"--overwrite".to_string()));
        assert!(args.contains(&"--skip-solved".to_string()));
        assert!(args.contains(&"--temp-dir".to_string()));
        assert_eq!(args.last().unwrap(), "/data/guide_01.fits");
    }

    #[test]
    fn test_hint_args() {
        let s = solver();
        let hint = SkyHint {
            ra_deg: 180.25,
            dec_deg: -32.5,
            radius_deg: 10.0,
        };
        let args = s.build_args(Path::new("img.fits"), Some(&hint));
        let ra_pos = args.iter().position(|a| a == "--ra").unwrap();
        assert_eq!(args[ra_pos + 1], "180.25");
        let dec_pos = args.iter().position(|a| a == "--dec").unwrap();
        assert_eq!(args[dec_pos + 1], "-32.5");
        let radius_pos = args.iter().position(|a| a == "--radius").unwrap();
        assert_eq!(args[radius_pos + 1], "10");
    }

    #[test]
    fn test_skip_solved_opt_out() {
        let s = solver().with_skip_solved(false);
        let args = s.build_args(Path::new("img.fits"), None);
        assert!(!args.contains(&"--skip-solved".to_string()));
    }

    #[test]
    fn test_explicit_temp_dir_replaces_scratch() {
        let s = solver().with_temp_dir("/tmp/pan");
        let args = s.build_args(Path::new("img.fits"), None);
        let pos = args.iter().position(|a| a == "--temp-dir").unwrap();
        assert_eq!(args[pos + 1], "/tmp/pan");
    }

    #[test]
    fn test_missing_binary_not_available() {
        let s = solver().with_path("this-solver-does-not-exist");
        assert!(!s.is_available());
    }

    #[test]
    fn test_solve_missing_image_is_error() {
        let s = solver().with_path("this-solver-does-not-exist");
        let err = s
            .solve(Path::new("/nonexistent/image.fits"), None)
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_parse_field_center() {
        let stdout = "Reading input file 1 of 1\n\
                      Field center: (RA,Dec) = (303.206081, -12.451997) deg\n\
                      Field size: 9.9 x 6.6 deg\n";
        let center = parse_field_center(stdout).unwrap();
        assert!((center.ra_deg - 303.206081).abs() < 1e-9);
        assert!((center.dec_deg - (-12.451997)).abs() < 1e-9);
    }

    #[test]
    fn test_parse_field_center_absent() {
        assert!(parse_field_center("did not solve").is_none());
    }
}
