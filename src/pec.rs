//! Periodic-error measurement.
//!
//! A worm gear imprints a periodic tracking error on every image the
//! mount takes. Given a directory of plate-solved guide frames, this
//! module builds the drift time series (solved field centers against
//! hour angle and elapsed time) and fits the worm-gear sinusoid to it.

use crate::coords::{Equatorial, Observer};
use crate::fits::{mjd, FitsHeader};
use crate::fitting::{fit_quality, FitQuality, LevenbergMarquardt, SineModel};
use crate::solver::{PlateSolver, SkyHint};
use crate::wcs::WcsInfo;
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

pub const DEFAULT_GUIDE_PREFIX: &str = "guide_";

/// Worm period of the common consumer EQ mount, seconds.
pub const DEFAULT_GEAR_PERIOD_S: f64 = 480.0;

/// Search radius handed to the solver when a frame needs solving: the
/// reference center should be within a few degrees of every frame.
pub const HINT_RADIUS_DEG: f64 = 10.0;

/// One guide frame reduced to drift quantities.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PecSample {
    pub file: String,
    pub time: DateTime<Utc>,
    pub mjd: f64,
    /// Seconds since the previous frame (since the reference for the first).
    pub dt_s: f64,
    /// Cumulative seconds since the reference frame.
    pub offset_s: f64,
    pub ha_deg: f64,
    pub ra_deg: f64,
    pub dec_deg: f64,
    /// Frame-to-frame center motion, arcseconds (0 for the first frame).
    pub dra_arcsec: f64,
    pub ddec_arcsec: f64,
    /// Frame-to-frame drift rates, arcseconds per second.
    pub dra_rate: f64,
    pub ddec_rate: f64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PecSeries {
    pub target: String,
    pub gear_period_s: f64,
    pub samples: Vec<PecSample>,
}

impl PecSeries {
    pub fn hour_angles(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.ha_deg).collect()
    }
}

/// Options for series collection.
#[derive(Debug, Clone)]
pub struct PecOptions {
    /// Filename prefix of the guide frames.
    pub prefix: String,
    /// Explicit reference frame name; latest guide frame when unset.
    pub ref_image: Option<String>,
    pub gear_period_s: f64,
    /// Solve frames that carry no WCS yet. When off, an unsolved frame
    /// is an error rather than a silent gap in the series.
    pub solve_missing: bool,
}

impl Default for PecOptions {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_GUIDE_PREFIX.to_string(),
            ref_image: None,
            gear_period_s: DEFAULT_GEAR_PERIOD_S,
            solve_missing: true,
        }
    }
}

/// Build the periodic-error series for a directory of guide frames.
pub fn collect_series(
    dir: &Path,
    observer: &Observer,
    options: &PecOptions,
    solver: &PlateSolver,
) -> Result<PecSeries> {
    if !dir.is_dir() {
        bail!("Not a directory: {}", dir.display());
    }

    let frames = sorted_glob(dir, &format!("{}*.fits", options.prefix))?;
    if frames.is_empty() {
        bail!(
            "No guide images matching {}*.fits in {}",
            options.prefix,
            dir.display()
        );
    }
    tracing::info!("Found {} guide frames in {}", frames.len(), dir.display());

    // Reference frame: explicitly named, or the latest guide frame
    let ref_path = match &options.ref_image {
        Some(name) => dir.join(name),
        None => frames.last().cloned().ok_or_else(|| anyhow!("Empty frame list"))?,
    };
    let (ref_header, ref_wcs) = solved_header(&ref_path, None, options, solver)
        .with_context(|| format!("Reference frame unusable: {}", ref_path.display()))?;
    let t0 = ref_header
        .date_obs()
        .context("Reference frame has no DATE-OBS; cannot anchor the series")?;

    let hint = SkyHint {
        ra_deg: ref_wcs.center.ra_deg,
        dec_deg: ref_wcs.center.dec_deg,
        radius_deg: HINT_RADIUS_DEG,
    };

    // Reduce each frame to (time, solved center)
    let mut reduced: Vec<(String, DateTime<Utc>, Equatorial)> = Vec::new();
    for frame in &frames {
        let (header, wcs) = solved_header(frame, Some(&hint), options, solver)
            .with_context(|| format!("Frame unusable: {}", frame.display()))?;
        let time = match header.date_obs() {
            Ok(t) => t,
            Err(_) => {
                tracing::warn!(
                    "{} has no DATE-OBS, using the reference time",
                    frame.display()
                );
                t0
            }
        };
        let name = frame
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        reduced.push((name, time, wcs.center));
    }

    // Assemble drift quantities
    let mut samples: Vec<PecSample> = Vec::with_capacity(reduced.len());
    for (i, (name, time, center)) in reduced.iter().enumerate() {
        let dt_s = if i == 0 {
            (*time - t0).num_milliseconds() as f64 / 1000.0
        } else {
            (*time - reduced[i - 1].1).num_milliseconds() as f64 / 1000.0
        };
        let offset_s = if i == 0 {
            dt_s
        } else {
            samples[i - 1].offset_s + dt_s
        };

        let (dra_arcsec, ddec_arcsec) = if i == 0 {
            (0.0, 0.0)
        } else {
            let prev: &Equatorial = &reduced[i - 1].2;
            (
                (center.ra_deg - prev.ra_deg) * 3600.0,
                (center.dec_deg - prev.dec_deg) * 3600.0,
            )
        };
        let (dra_rate, ddec_rate) = if dt_s > 0.0 {
            (dra_arcsec / dt_s, ddec_arcsec / dt_s)
        } else {
            (0.0, 0.0)
        };

        samples.push(PecSample {
            file: name.clone(),
            time: *time,
            mjd: mjd(*time),
            dt_s,
            offset_s,
            ha_deg: observer.hour_angle_deg(*time, center),
            ra_deg: center.ra_deg,
            dec_deg: center.dec_deg,
            dra_arcsec,
            ddec_arcsec,
            dra_rate,
            ddec_rate,
        });
    }

    let target = ref_header
        .get("OBJECT")
        .map(|s| s.to_string())
        .or_else(|| {
            dir.file_name()
                .and_then(|n| n.to_str())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| "unknown".to_string());

    Ok(PecSeries {
        target,
        gear_period_s: options.gear_period_s,
        samples,
    })
}

/// Solved header for a frame: a sibling `.new` file when one exists, the
/// frame itself when it already carries a WCS, else a fresh solve.
fn solved_header(
    frame: &Path,
    hint: Option<&SkyHint>,
    options: &PecOptions,
    solver: &PlateSolver,
) -> Result<(FitsHeader, WcsInfo)> {
    let sibling = frame.with_extension("new");
    if sibling.exists() {
        let header = FitsHeader::read(&sibling)?;
        if header.is_solved() {
            let wcs = WcsInfo::from_header(&header)?;
            return Ok((header, wcs));
        }
    }

    let header = FitsHeader::read(frame)?;
    if header.is_solved() {
        let wcs = WcsInfo::from_header(&header)?;
        return Ok((header, wcs));
    }

    if !options.solve_missing {
        bail!("{} is not plate solved and solving is disabled", frame.display());
    }

    tracing::info!("Solving {}", frame.display());
    let solution = solver.solve(frame, hint)?;
    Ok((solution.header, solution.wcs))
}

fn sorted_glob(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full = dir.join(pattern);
    let pattern_str = full
        .to_str()
        .ok_or_else(|| anyhow!("Non-UTF8 path: {}", full.display()))?;
    let mut paths: Vec<PathBuf> = glob::glob(pattern_str)
        .with_context(|| format!("Bad glob pattern: {}", pattern_str))?
        .filter_map(|entry| entry.ok())
        .collect();
    paths.sort();
    Ok(paths)
}

/// Fitted worm-gear sinusoid: amplitude * sin(x * freq + phase) + offset.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct SineParams {
    pub freq: f64,
    pub amplitude: f64,
    pub phase: f64,
    pub offset: f64,
}

impl SineParams {
    fn from_slice(p: &[f64]) -> Self {
        SineParams {
            freq: p[0],
            amplitude: p[1],
            phase: p[2],
            offset: p[3],
        }
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        self.amplitude * (x * self.freq + self.phase).sin() + self.offset
    }

    /// Evaluate on an even grid across [x_min, x_max].
    pub fn curve(&self, x_min: f64, x_max: f64, points: usize) -> Vec<(f64, f64)> {
        let step = if points > 1 {
            (x_max - x_min) / (points - 1) as f64
        } else {
            0.0
        };
        (0..points)
            .map(|i| {
                let x = x_min + step * i as f64;
                (x, self.evaluate(x))
            })
            .collect()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ChannelFit {
    pub params: SineParams,
    pub quality: FitQuality,
    /// Peak-to-peak swing of the fitted curve across the sampled hour
    /// angles, arcseconds (or arcsec/s for the rate channels).
    pub peak_to_peak: f64,
}

/// The four fitted channels: RA/Dec center motion and its rate.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PecFit {
    pub ra_position: ChannelFit,
    pub dec_position: ChannelFit,
    pub ra_rate: ChannelFit,
    pub dec_rate: ChannelFit,
}

/// Fit the worm-gear sinusoid to every channel of the series.
pub fn fit_series(series: &PecSeries) -> Result<PecFit> {
    let xs = series.hour_angles();
    if xs.len() < 4 {
        bail!(
            "PEC series too short to fit: {} samples, need at least 4",
            xs.len()
        );
    }

    let channel = |extract: fn(&PecSample) -> f64, label: &str| -> Result<ChannelFit> {
        let ys: Vec<f64> = series.samples.iter().map(extract).collect();
        fit_channel(&xs, &ys).with_context(|| format!("Fitting {} channel failed", label))
    };

    Ok(PecFit {
        ra_position: channel(|s| s.dra_arcsec, "RA position")?,
        dec_position: channel(|s| s.ddec_arcsec, "Dec position")?,
        ra_rate: channel(|s| s.dra_rate, "RA rate")?,
        dec_rate: channel(|s| s.ddec_rate, "Dec rate")?,
    })
}

fn fit_channel(xs: &[f64], ys: &[f64]) -> Result<ChannelFit> {
    let mean = ys.iter().sum::<f64>() / ys.len() as f64;
    let std = (ys.iter().map(|y| (y - mean).powi(2)).sum::<f64>() / ys.len() as f64).sqrt();

    // Amplitude guess is sized to the observed scatter; frequency 2
    // against hour angle is a workable prior for common worm gears.
    let initial = [2.0, 3.0 * std / 2.0_f64.sqrt(), 0.0, mean];

    let mut optimizer = LevenbergMarquardt::default();
    let fitted = optimizer.fit_unbounded(&SineModel, xs, ys, &initial)?;
    let params = SineParams::from_slice(&fitted);
    let quality = fit_quality(&SineModel, xs, ys, &fitted);

    let (x_min, x_max) = xs
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
            (lo.min(x), hi.max(x))
        });
    let curve = params.curve(x_min, x_max, 1000);
    let (y_min, y_max) = curve
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(_, y)| {
            (lo.min(y), hi.max(y))
        });

    Ok(ChannelFit {
        params,
        quality,
        peak_to_peak: y_max - y_min,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn synthetic_series(n: usize, amplitude: f64, freq: f64) -> PecSeries {
        let t0 = Utc.with_ymd_and_hms(2016, 8, 9, 6, 0, 0).unwrap();
        let samples: Vec<PecSample> = (0..n)
            .map(|i| {
                let ha = -20.0 + i as f64 * 0.5;
                let time = t0 + chrono::Duration::seconds(i as i64 * 120);
                let dra = amplitude * (ha * freq + 0.3).sin() + 0.1;
                PecSample {
                    file: format!("guide_{:03}.fits", i),
                    time,
                    mjd: mjd(time),
                    dt_s: 120.0,
                    offset_s: 120.0 * (i + 1) as f64,
                    ha_deg: ha,
                    ra_deg: 100.0,
                    dec_deg: 20.0,
                    dra_arcsec: dra,
                    ddec_arcsec: 0.5 * (ha * freq).sin(),
                    dra_rate: dra / 120.0,
                    ddec_rate: 0.5 * (ha * freq).sin() / 120.0,
                }
            })
            .collect();
        PecSeries {
            target: "test-field".to_string(),
            gear_period_s: DEFAULT_GEAR_PERIOD_S,
            samples,
        }
    }

    #[test]
    fn test_fit_recovers_series_amplitude() {
        let series = synthetic_series(80, 3.5, 2.0);
        let fit = fit_series(&series).unwrap();
        assert!(
            (fit.ra_position.params.amplitude.abs() - 3.5).abs() < 0.05,
            "amplitude = {}",
            fit.ra_position.params.amplitude
        );
        assert!((fit.ra_position.params.offset - 0.1).abs() < 0.05);
        assert!(fit.ra_position.quality.r_squared > 0.999);
        assert!((fit.ra_position.peak_to_peak - 7.0).abs() < 0.1);
    }

    #[test]
    fn test_fit_rejects_short_series() {
        let series = synthetic_series(3, 3.5, 2.0);
        assert!(fit_series(&series).is_err());
    }

    #[test]
    fn test_sine_params_evaluate() {
        let params = SineParams {
            freq: 2.0,
            amplitude: 3.0,
            phase: 0.5,
            offset: 1.0,
        };
        let x = 0.7;
        assert!((params.evaluate(x) - (3.0 * (x * 2.0 + 0.5).sin() + 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_curve_covers_range() {
        let params = SineParams {
            freq: 1.0,
            amplitude: 1.0,
            phase: 0.0,
            offset: 0.0,
        };
        let curve = params.curve(-10.0, 10.0, 5);
        assert_eq!(curve.len(), 5);
        assert!((curve[0].0 - (-10.0)).abs() < 1e-12);
        assert!((curve[4].0 - 10.0).abs() < 1e-12);
    }
}
