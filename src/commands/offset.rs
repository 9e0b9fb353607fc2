use crate::fits::FitsHeader;
use crate::image_data::FitsImage;
use crate::offset::{center_offset, register_offset, DEFAULT_FRAME_INTERVAL_S};
use crate::registration::measure_translation;
use crate::wcs::WcsInfo;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

/// Full frames are cropped to this central square before registration.
const REGISTRATION_CROP: usize = 500;

/// Measure the drift between two frames of the same field.
#[allow(clippy::too_many_arguments)]
pub fn measure_offset(
    first: &str,
    second: &str,
    from_centers: bool,
    no_crop: bool,
    upsample: usize,
    rate: Option<f64>,
    delta_t: Option<f64>,
    wcs_file: Option<&str>,
    format: &str,
) -> Result<()> {
    let first = Path::new(first);
    let second = Path::new(second);

    if from_centers {
        offset_from_centers(first, second, format)
    } else {
        offset_from_registration(first, second, no_crop, upsample, rate, delta_t, wcs_file, format)
    }
}

fn offset_from_centers(first: &Path, second: &Path, format: &str) -> Result<()> {
    let first_header = solved_header_for(first)?;
    let second_header = solved_header_for(second)?;

    let first_wcs = WcsInfo::from_header(&first_header)?;
    let second_wcs = WcsInfo::from_header(&second_header)?;
    let first_time = first_header.date_obs()?;
    let second_time = second_header.date_obs()?;

    let offset = center_offset(&first_wcs, first_time, &second_wcs, second_time)?;

    match format.to_lowercase().as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&offset)?),
        _ => {
            println!("Center offset over {:.2} min", offset.delta_t_min);
            println!("{:<24} {:>12.3} {:>12.3}", "Delta (arcsec)", offset.ra_delta_arcsec, offset.dec_delta_arcsec);
            println!("{:<24} {:>12.3} {:>12.3}", "Delta (pixels)", offset.delta_ra_pixels, offset.delta_dec_pixels);
            println!("{:<24} {:>12.3} {:>12.3}", "Rate (px/min)", offset.ra_rate_pixels_per_min, offset.dec_rate_pixels_per_min);
            println!("{:<24} {:>12.0} {:>12.0}", "Offset (ms)", offset.ra_offset_ms, offset.dec_offset_ms);
            println!("{:<24} {:>12.4}", "Sidereal factor", offset.sidereal_factor);
            println!("{:<24} {:>12.3}", "Pixel scale", offset.pixel_scale);
            println!("{:<24} {:>12.3}", "Rotation", offset.rotation);
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn offset_from_registration(
    first: &Path,
    second: &Path,
    no_crop: bool,
    upsample: usize,
    rate: Option<f64>,
    delta_t: Option<f64>,
    wcs_file: Option<&str>,
    format: &str,
) -> Result<()> {
    let mut first_image = FitsImage::from_file(first)?;
    let mut second_image = FitsImage::from_file(second)?;
    if !no_crop {
        first_image = first_image.crop_centered(REGISTRATION_CROP);
        second_image = second_image.crop_centered(REGISTRATION_CROP);
    }

    // A flat frame correlates with anything, everywhere
    for (image, path) in [(&first_image, first), (&second_image, second)] {
        let stats = image.calculate_statistics();
        if stats.std_dev == 0.0 {
            bail!("{} has no signal to register (flat frame)", path.display());
        }
        tracing::debug!(
            "{}: median {:.1}, sigma {:.1}",
            path.display(),
            stats.median,
            stats.std_dev
        );
    }

    let shift = measure_translation(&first_image, &second_image, upsample)?;
    tracing::debug!("Measured pixel shift dx {:.3} dy {:.3}", shift.dx, shift.dy);

    let wcs_header = match wcs_file {
        Some(path) => solved_header_for(Path::new(path))?,
        None => solved_header_for(first)
            .context("No WCS for the first frame; solve it or pass --wcs-file")?,
    };
    let wcs = WcsInfo::from_header(&wcs_header)?;

    // An explicit interval wins over the headers
    let delta_t_s = match (delta_t, frame_interval(first, second)) {
        (Some(dt), _) => dt,
        (None, Some(dt)) => dt,
        (None, None) => {
            tracing::warn!(
                "Frames carry no usable DATE-OBS pair; assuming {} s interval",
                DEFAULT_FRAME_INTERVAL_S
            );
            DEFAULT_FRAME_INTERVAL_S
        }
    };

    let offset = register_offset(shift, &wcs, delta_t_s, rate)?;

    match format.to_lowercase().as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&offset)?),
        _ => {
            println!("Registered offset over {:.1} s", offset.delta_t_s);
            println!("{:<24} {:>12.3} {:>12.3}", "Shift (px)", offset.shift.dx, offset.shift.dy);
            println!("{:<24} {:>12.3} {:>12.3}", "Delta (arcsec)", offset.ra_delta_arcsec, offset.dec_delta_arcsec);
            println!("{:<24} {:>12.0} {:>12.0}", "Offset (ms)", offset.ra_offset_ms, offset.dec_offset_ms);
            println!("{:<24} {:>12.5} {:>12.5}", "Drift (arcsec/s)", offset.ra_drift_arcsec_per_sec, offset.dec_drift_arcsec_per_sec);
            println!("{:<24} {:>12.4} {:>12.4}", "Delta rate (sidereal)", offset.ra_delta_rate, offset.dec_delta_rate);
        }
    }

    Ok(())
}

/// Header carrying a plate solution for the frame: the frame itself, or
/// its `.new` sibling from a previous solve.
fn solved_header_for(path: &Path) -> Result<FitsHeader> {
    let header = FitsHeader::read(path)?;
    if header.is_solved() {
        return Ok(header);
    }

    let sibling: PathBuf = path.with_extension("new");
    if sibling.exists() {
        let header = FitsHeader::read(&sibling)?;
        if header.is_solved() {
            return Ok(header);
        }
    }

    bail!(
        "{} is not plate solved (no WCS in the file or a .new sibling)",
        path.display()
    );
}

fn frame_interval(first: &Path, second: &Path) -> Option<f64> {
    let t0 = FitsHeader::read(first).ok()?.date_obs().ok()?;
    let t1 = FitsHeader::read(second).ok()?.date_obs().ok()?;
    let dt = (t1 - t0).num_milliseconds() as f64 / 1000.0;
    if dt > 0.0 {
        Some(dt)
    } else {
        None
    }
}
