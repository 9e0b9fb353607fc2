use crate::registration::PixelShift;
use crate::wcs::WcsInfo;
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};

/// Sidereal tracking rate along RA: 360 degrees per 24 hours.
pub const SIDEREAL_RATE_ARCSEC_PER_SEC: f64 = 15.0;

/// Guide rate most mounts default to, as a fraction of sidereal.
pub const DEFAULT_GUIDE_RATE_FRACTION: f64 = 0.9;

/// Exposure cadence assumed when the frames carry no timestamps.
pub const DEFAULT_FRAME_INTERVAL_S: f64 = 125.0;

fn round4(value: f64) -> f64 {
    (value * 10000.0).round() / 10000.0
}

/// Drift measured by registering two frames against each other.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RegisterOffset {
    /// Raw pixel shift of the second frame relative to the first.
    pub shift: PixelShift,
    /// Drift along RA/Dec, arcseconds.
    pub ra_delta_arcsec: f64,
    pub dec_delta_arcsec: f64,
    /// Equivalent tracking-time error at the given rate, milliseconds.
    pub ra_offset_ms: f64,
    pub dec_offset_ms: f64,
    /// Drift rates over the frame interval, arcseconds per second.
    pub ra_drift_arcsec_per_sec: f64,
    pub dec_drift_arcsec_per_sec: f64,
    /// Tracking-rate correction as a fraction of sidereal.
    pub ra_delta_rate: f64,
    pub dec_delta_rate: f64,
    /// Interval between the two frames, seconds.
    pub delta_t_s: f64,
    /// Tracking rate the timing error is referred to, arcseconds per second.
    pub rate_arcsec_per_sec: f64,
}

/// Convert a measured pixel shift into physical drift quantities.
///
/// `rate` is the mount's tracking rate in arcsec/s; `None` selects the
/// guide rate (0.9 x sidereal). The timing offsets say how many
/// milliseconds of tracking at that rate the drift corresponds to; the
/// delta rates say what fraction of sidereal the tracking rate must
/// change by to null the drift over `delta_t_s`.
pub fn register_offset(
    shift: PixelShift,
    wcs: &WcsInfo,
    delta_t_s: f64,
    rate: Option<f64>,
) -> Result<RegisterOffset> {
    if delta_t_s <= 0.0 {
        bail!("Frame interval must be positive, got {} s", delta_t_s);
    }
    let rate = rate.unwrap_or(DEFAULT_GUIDE_RATE_FRACTION * SIDEREAL_RATE_ARCSEC_PER_SEC);
    if rate <= 0.0 {
        bail!("Tracking rate must be positive, got {} arcsec/s", rate);
    }

    let (d_ra_deg, d_dec_deg) = wcs.pixel_shift_to_sky(shift.dx, shift.dy);
    let ra_delta_arcsec = d_ra_deg * 3600.0;
    let dec_delta_arcsec = d_dec_deg * 3600.0;

    let ra_offset_ms = (ra_delta_arcsec / rate * 1000.0).round();
    let dec_offset_ms = (dec_delta_arcsec / rate * 1000.0).round();

    let ra_drift = ra_delta_arcsec / delta_t_s;
    let dec_drift = dec_delta_arcsec / delta_t_s;

    let sidereal = SIDEREAL_RATE_ARCSEC_PER_SEC;
    let ra_delta_rate = round4(1.0 - (sidereal + ra_drift) / sidereal);
    let dec_delta_rate = round4(1.0 - (sidereal + dec_drift) / sidereal);

    Ok(RegisterOffset {
        shift,
        ra_delta_arcsec,
        dec_delta_arcsec,
        ra_offset_ms,
        dec_offset_ms,
        ra_drift_arcsec_per_sec: ra_drift,
        dec_drift_arcsec_per_sec: dec_drift,
        ra_delta_rate,
        dec_delta_rate,
        delta_t_s,
        rate_arcsec_per_sec: rate,
    })
}

/// Drift derived from the solved field centers of two frames.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CenterOffset {
    /// Plate scale of the first frame, arcsec/pixel.
    pub pixel_scale: f64,
    /// Field rotation of the first frame, degrees.
    pub rotation: f64,
    /// Interval between the frames, minutes.
    pub delta_t_min: f64,
    /// Center motion in degrees.
    pub delta_ra_deg: f64,
    pub delta_dec_deg: f64,
    /// Center motion in arcseconds.
    pub ra_delta_arcsec: f64,
    pub dec_delta_arcsec: f64,
    /// Center motion in pixels at the first frame's plate scale.
    pub delta_ra_pixels: f64,
    pub delta_dec_pixels: f64,
    /// Apparent drift rates, pixels per minute.
    pub ra_rate_pixels_per_min: f64,
    pub dec_rate_pixels_per_min: f64,
    /// Sidereal motion at this plate scale, pixels per minute.
    pub sidereal_pixels_per_min: f64,
    /// Measured RA rate over sidereal.
    pub sidereal_factor: f64,
    /// Equivalent tracking-time error at sidereal, milliseconds.
    pub ra_offset_ms: f64,
    pub dec_offset_ms: f64,
}

/// Compare the plate-solved centers of two frames.
///
/// Uses the first frame's plate scale for the pixel-unit quantities, as
/// the two frames come from the same camera.
pub fn center_offset(
    first: &WcsInfo,
    first_time: DateTime<Utc>,
    second: &WcsInfo,
    second_time: DateTime<Utc>,
) -> Result<CenterOffset> {
    let delta_t_s = (second_time - first_time).num_milliseconds() as f64 / 1000.0;
    if delta_t_s <= 0.0 {
        bail!(
            "Second frame must be later than the first (DATE-OBS delta {} s)",
            delta_t_s
        );
    }
    let delta_t_min = delta_t_s / 60.0;

    let delta_ra_deg = second.center.ra_deg - first.center.ra_deg;
    let delta_dec_deg = second.center.dec_deg - first.center.dec_deg;
    let ra_delta_arcsec = delta_ra_deg * 3600.0;
    let dec_delta_arcsec = delta_dec_deg * 3600.0;

    let delta_ra_pixels = ra_delta_arcsec / first.pixel_scale;
    let delta_dec_pixels = dec_delta_arcsec / first.pixel_scale;

    let ra_rate_pixels_per_min = delta_ra_pixels / delta_t_min;
    let dec_rate_pixels_per_min = delta_dec_pixels / delta_t_min;

    let sidereal_pixels_per_min = SIDEREAL_RATE_ARCSEC_PER_SEC * 60.0 / first.pixel_scale;
    let sidereal_factor = ra_rate_pixels_per_min / sidereal_pixels_per_min;

    let ms_per_arcsec = 1000.0 / SIDEREAL_RATE_ARCSEC_PER_SEC;
    let ra_offset_ms = (ra_delta_arcsec * ms_per_arcsec).round();
    let dec_offset_ms = (dec_delta_arcsec * ms_per_arcsec).round();

    Ok(CenterOffset {
        pixel_scale: first.pixel_scale,
        rotation: first.rotation,
        delta_t_min,
        delta_ra_deg,
        delta_dec_deg,
        ra_delta_arcsec,
        dec_delta_arcsec,
        delta_ra_pixels,
        delta_dec_pixels,
        ra_rate_pixels_per_min,
        dec_rate_pixels_per_min,
        sidereal_pixels_per_min,
        sidereal_factor,
        ra_offset_ms,
        dec_offset_ms,
    })
}
