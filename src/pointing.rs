use crate::coords::Equatorial;
use crate::fits::FitsHeader;
use crate::utils::{parse_dec_degrees, parse_ra_degrees};
use crate::wcs::WcsInfo;
use anyhow::{anyhow, Result};
use std::path::Path;

/// Difference between where the mount was told to point and where the
/// plate solution says the frame actually landed.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PointingError {
    /// Commanded target from the RA/DEC headers.
    pub target: Equatorial,
    /// Plate-solved field center.
    pub center: Equatorial,
    pub separation_deg: f64,
    pub separation_arcmin: f64,
}

/// Pointing error of a solved frame.
///
/// The acquisition layer writes the commanded coordinates into the RA and
/// DEC headers; the plate solution supplies the actual field center.
pub fn pointing_error(path: &Path) -> Result<PointingError> {
    let header = FitsHeader::read(path)?;
    pointing_error_from_header(&header)
}

pub fn pointing_error_from_header(header: &FitsHeader) -> Result<PointingError> {
    let wcs = WcsInfo::from_header(header)?;
    let target = target_from_header(header)?;

    let separation_deg = wcs.center.separation_deg(&target);
    Ok(PointingError {
        target,
        center: wcs.center,
        separation_deg,
        separation_arcmin: separation_deg * 60.0,
    })
}

fn target_from_header(header: &FitsHeader) -> Result<Equatorial> {
    let ra_raw = header
        .get("RA")
        .or_else(|| header.get("OBJCTRA"))
        .ok_or_else(|| anyhow!("Missing RA target header in {}", header.filename))?;
    let dec_raw = header
        .get("DEC")
        .or_else(|| header.get("OBJCTDEC"))
        .ok_or_else(|| anyhow!("Missing DEC target header in {}", header.filename))?;

    let ra = parse_ra_degrees(ra_raw)
        .ok_or_else(|| anyhow!("Unparseable RA target in {}: '{}'", header.filename, ra_raw))?;
    let dec = parse_dec_degrees(dec_raw)
        .ok_or_else(|| anyhow!("Unparseable DEC target in {}: '{}'", header.filename, dec_raw))?;

    Ok(Equatorial::new(ra, dec))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn solved_with_target(target_ra: &str, target_dec: &str) -> FitsHeader {
        let mut keywords = HashMap::new();
        keywords.insert("CRVAL1".to_string(), "180.0".to_string());
        keywords.insert("CRVAL2".to_string(), "0.0".to_string());
        keywords.insert("CD1_1".to_string(), "0.00286".to_string());
        keywords.insert("CD1_2".to_string(), "0.0".to_string());
        keywords.insert("CD2_1".to_string(), "0.0".to_string());
        keywords.insert("CD2_2".to_string(), "0.00286".to_string());
        keywords.insert("RA".to_string(), target_ra.to_string());
        keywords.insert("DEC".to_string(), target_dec.to_string());
        FitsHeader::from_keywords("p.new", keywords)
    }

    #[test]
    fn test_pointing_error_half_degree() {
        let header = solved_with_target("180.5", "0.0");
        let error = pointing_error_from_header(&header).unwrap();
        assert!((error.separation_deg - 0.5).abs() < 1e-9);
        assert!((error.separation_arcmin - 30.0).abs() < 1e-6);
    }

    #[test]
    fn test_pointing_error_sexagesimal_target() {
        // 12h == 180 deg; zero separation from the solved center
        let header = solved_with_target("12 00 00", "0 00 00");
        let error = pointing_error_from_header(&header).unwrap();
        assert!(error.separation_deg.abs() < 1e-9);
    }

    #[test]
    fn test_missing_target_header() {
        let mut keywords = HashMap::new();
        keywords.insert("CRVAL1".to_string(), "180.0".to_string());
        keywords.insert("CRVAL2".to_string(), "0.0".to_string());
        keywords.insert("CD1_1".to_string(), "0.00286".to_string());
        keywords.insert("CD2_2".to_string(), "0.00286".to_string());
        let header = FitsHeader::from_keywords("no_target.new", keywords);
        assert!(pointing_error_from_header(&header).is_err());
    }
}
