use crate::coords::Equatorial;
use crate::fits::FitsHeader;
use anyhow::{anyhow, Result};

/// Linear WCS extracted from a plate-solved header.
///
/// Only the flavor astrometry.net writes is handled: a tangent-plane
/// projection with a CD matrix (or the older CDELT/CROTA2 pair). SIP
/// distortion terms are ignored; over the small shifts measured here the
/// linear terms dominate.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WcsInfo {
    /// Field center (CRVAL), degrees.
    pub center: Equatorial,
    /// Reference pixel (CRPIX), 1-indexed per the FITS convention.
    pub crpix1: f64,
    pub crpix2: f64,
    /// CD matrix, degrees per pixel: [[CD1_1, CD1_2], [CD2_1, CD2_2]].
    pub cd: [[f64; 2]; 2],
    /// Plate scale, arcseconds per pixel.
    pub pixel_scale: f64,
    /// Field rotation east of north, degrees.
    pub rotation: f64,
    pub width: Option<i64>,
    pub height: Option<i64>,
}

impl WcsInfo {
    /// Extract the WCS from a solved header.
    ///
    /// A header with no CD matrix (and no CDELT fallback) is an error:
    /// substituting a default transform here would silently turn an
    /// unsolved frame into nonsense offsets downstream.
    pub fn from_header(header: &FitsHeader) -> Result<Self> {
        let ra = header.require_f64("CRVAL1")?;
        let dec = header.require_f64("CRVAL2")?;

        let cd = read_cd_matrix(header)?;

        let det = cd[0][0] * cd[1][1] - cd[0][1] * cd[1][0];
        if det == 0.0 {
            return Err(anyhow!("Degenerate CD matrix in {}", header.filename));
        }
        let pixel_scale = det.abs().sqrt() * 3600.0;
        let rotation = cd[1][0].atan2(cd[0][0]).to_degrees();

        Ok(WcsInfo {
            center: Equatorial::new(ra, dec),
            crpix1: header.opt_f64("CRPIX1").unwrap_or(0.0),
            crpix2: header.opt_f64("CRPIX2").unwrap_or(0.0),
            cd,
            pixel_scale,
            rotation,
            width: header.opt_i64("NAXIS1"),
            height: header.opt_i64("NAXIS2"),
        })
    }

    /// Map a pixel displacement to sky-axis displacements, in degrees.
    ///
    /// `dx`/`dy` follow image axes; the result follows the WCS axes
    /// (intermediate world coordinates along RA and Dec).
    pub fn pixel_shift_to_sky(&self, dx: f64, dy: f64) -> (f64, f64) {
        let d_ra = self.cd[0][0] * dx + self.cd[0][1] * dy;
        let d_dec = self.cd[1][0] * dx + self.cd[1][1] * dy;
        (d_ra, d_dec)
    }
}

fn read_cd_matrix(header: &FitsHeader) -> Result<[[f64; 2]; 2]> {
    if header.get("CD1_1").is_some() {
        return Ok([
            [header.require_f64("CD1_1")?, header.opt_f64("CD1_2").unwrap_or(0.0)],
            [header.opt_f64("CD2_1").unwrap_or(0.0), header.require_f64("CD2_2")?],
        ]);
    }

    // Older headers: per-axis scales plus a rotation angle
    if let (Some(cdelt1), Some(cdelt2)) = (header.opt_f64("CDELT1"), header.opt_f64("CDELT2")) {
        let crota2 = header.opt_f64("CROTA2").unwrap_or(0.0).to_radians();
        let (sin_r, cos_r) = crota2.sin_cos();
        return Ok([
            [cdelt1 * cos_r, -cdelt2 * sin_r],
            [cdelt1 * sin_r, cdelt2 * cos_r],
        ]);
    }

    Err(anyhow!(
        "No WCS transform in {}: missing CD1_1/CD2_2 (or CDELT1/CDELT2)",
        header.filename
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn solved_header(scale_deg: f64, rotation_deg: f64) -> FitsHeader {
        let r = rotation_deg.to_radians();
        let mut keywords = HashMap::new();
        keywords.insert("CRVAL1".to_string(), "303.2060".to_string());
        keywords.insert("CRVAL2".to_string(), "-12.4520".to_string());
        keywords.insert("CRPIX1".to_string(), "1738.0".to_string());
        keywords.insert("CRPIX2".to_string(), "1159.0".to_string());
        keywords.insert("CD1_1".to_string(), format!("{:.12}", scale_deg * r.cos()));
        keywords.insert("CD1_2".to_string(), format!("{:.12}", -scale_deg * r.sin()));
        keywords.insert("CD2_1".to_string(), format!("{:.12}", scale_deg * r.sin()));
        keywords.insert("CD2_2".to_string(), format!("{:.12}", scale_deg * r.cos()));
        keywords.insert("NAXIS1".to_string(), "3476".to_string());
        keywords.insert("NAXIS2".to_string(), "2318".to_string());
        FitsHeader::from_keywords("solved.new", keywords)
    }

    #[test]
    fn test_pixel_scale_and_rotation_from_cd() {
        // 10.3 arcsec/px rotated 15 degrees
        let header = solved_header(10.3 / 3600.0, 15.0);
        let wcs = WcsInfo::from_header(&header).unwrap();
        assert!((wcs.pixel_scale - 10.3).abs() < 1e-6);
        assert!((wcs.rotation - 15.0).abs() < 1e-6);
        assert_eq!(wcs.width, Some(3476));
    }

    #[test]
    fn test_pixel_shift_to_sky_is_cd_multiply() {
        let header = solved_header(10.0 / 3600.0, 0.0);
        let wcs = WcsInfo::from_header(&header).unwrap();
        let (d_ra, d_dec) = wcs.pixel_shift_to_sky(3.0, -2.0);
        assert!((d_ra * 3600.0 - 30.0).abs() < 1e-6);
        assert!((d_dec * 3600.0 + 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_cdelt_crota_fallback() {
        let mut keywords = HashMap::new();
        keywords.insert("CRVAL1".to_string(), "10.0".to_string());
        keywords.insert("CRVAL2".to_string(), "20.0".to_string());
        keywords.insert("CDELT1".to_string(), format!("{:.12}", 2.0 / 3600.0));
        keywords.insert("CDELT2".to_string(), format!("{:.12}", 2.0 / 3600.0));
        let header = FitsHeader::from_keywords("old.fits", keywords);
        let wcs = WcsInfo::from_header(&header).unwrap();
        assert!((wcs.pixel_scale - 2.0).abs() < 1e-6);
        assert!(wcs.rotation.abs() < 1e-9);
    }

    #[test]
    fn test_missing_transform_is_an_error() {
        let mut keywords = HashMap::new();
        keywords.insert("CRVAL1".to_string(), "10.0".to_string());
        keywords.insert("CRVAL2".to_string(), "20.0".to_string());
        let header = FitsHeader::from_keywords("unsolved.fits", keywords);
        let err = WcsInfo::from_header(&header).unwrap_err().to_string();
        assert!(err.contains("CD1_1"));
    }
}
