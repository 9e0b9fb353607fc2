// End-to-end checks on synthetic data: a drift series with known worm-gear
// parameters must survive the series -> fit round trip, and a known pixel
// shift must survive the registration -> physical-units conversion.
//
// Real guide frames carry noise, seeing jitter, and uneven cadence; the
// noise injected here is far milder. These tests pin the plumbing and the
// unit algebra, not the solver behavior on sky data.

#[cfg(test)]
mod tests {
    use crate::coords::Equatorial;
    use crate::fits::{mjd, FitsHeader};
    use crate::image_data::FitsImage;
    use crate::offset::register_offset;
    use crate::pec::{fit_series, PecSample, PecSeries, DEFAULT_GEAR_PERIOD_S};
    use crate::registration::measure_translation;
    use crate::wcs::WcsInfo;
    use chrono::TimeZone;
    use rand::prelude::*;
    use std::collections::HashMap;

    const TRUE_FREQ: f64 = 2.0;
    const TRUE_AMPLITUDE: f64 = 4.2;
    const TRUE_PHASE: f64 = 0.8;
    const TRUE_OFFSET: f64 = -0.3;

    fn noisy_series(n: usize, noise: f64, seed: u64) -> PecSeries {
        let mut rng = StdRng::seed_from_u64(seed);
        let t0 = chrono::Utc.with_ymd_and_hms(2016, 8, 9, 6, 0, 0).unwrap();

        let samples = (0..n)
            .map(|i| {
                let ha = -25.0 + i as f64 * 0.42;
                let time = t0 + chrono::Duration::seconds(i as i64 * 120);
                let clean = TRUE_AMPLITUDE * (ha * TRUE_FREQ + TRUE_PHASE).sin() + TRUE_OFFSET;
                let dra = clean + rng.gen_range(-noise..noise);
                let ddec = 0.6 * (ha * TRUE_FREQ).cos() + rng.gen_range(-noise..noise);
                PecSample {
                    file: format!("guide_{:03}.fits", i),
                    time,
                    mjd: mjd(time),
                    dt_s: 120.0,
                    offset_s: 120.0 * i as f64,
                    ha_deg: ha,
                    ra_deg: 100.0 + i as f64 * 0.001,
                    dec_deg: 20.0,
                    dra_arcsec: dra,
                    ddec_arcsec: ddec,
                    dra_rate: dra / 120.0,
                    ddec_rate: ddec / 120.0,
                }
            })
            .collect();

        PecSeries {
            target: "synthetic-field".to_string(),
            gear_period_s: DEFAULT_GEAR_PERIOD_S,
            samples,
        }
    }

    #[test]
    fn test_noisy_series_round_trip() {
        let series = noisy_series(120, 0.15, 42);
        let fit = fit_series(&series).unwrap();

        let ra = &fit.ra_position.params;
        assert!((ra.freq - TRUE_FREQ).abs() < 0.01, "freq = {}", ra.freq);
        assert!(
            (ra.amplitude.abs() - TRUE_AMPLITUDE).abs() < 0.1,
            "amplitude = {}",
            ra.amplitude
        );
        assert!((ra.offset - TRUE_OFFSET).abs() < 0.1, "offset = {}", ra.offset);
        assert!(fit.ra_position.quality.r_squared > 0.99);

        // Peak-to-peak of the position channel is twice the amplitude
        assert!(
            (fit.ra_position.peak_to_peak - 2.0 * TRUE_AMPLITUDE).abs() < 0.3,
            "p2p = {}",
            fit.ra_position.peak_to_peak
        );

        // The rate channel is the position channel scaled by the cadence
        assert!(
            (fit.ra_rate.params.amplitude.abs() - TRUE_AMPLITUDE / 120.0).abs() < 0.01,
            "rate amplitude = {}",
            fit.ra_rate.params.amplitude
        );
    }

    #[test]
    fn test_fit_is_stable_across_noise_draws() {
        for seed in [1, 7, 1234] {
            let series = noisy_series(100, 0.2, seed);
            let fit = fit_series(&series).unwrap();
            assert!(
                (fit.ra_position.params.amplitude.abs() - TRUE_AMPLITUDE).abs() < 0.15,
                "seed {}: amplitude = {}",
                seed,
                fit.ra_position.params.amplitude
            );
        }
    }

    fn star_field(w: usize, h: usize, centers: &[(f64, f64)]) -> FitsImage {
        let mut data = vec![300u16; w * h];
        for y in 0..h {
            for x in 0..w {
                let mut value = 0.0;
                for &(cx, cy) in centers {
                    let dx = x as f64 - cx;
                    let dy = y as f64 - cy;
                    value += 15000.0 * (-(dx * dx + dy * dy) / (2.0 * 2.56)).exp();
                }
                data[y * w + x] = (300.0 + value).min(65535.0) as u16;
            }
        }
        FitsImage::from_raw(w, h, data).unwrap()
    }

    fn test_wcs(pixel_scale_arcsec: f64) -> WcsInfo {
        let mut keywords = HashMap::new();
        keywords.insert("CRVAL1".to_string(), "100.0".to_string());
        keywords.insert("CRVAL2".to_string(), "20.0".to_string());
        keywords.insert(
            "CD1_1".to_string(),
            format!("{:.12}", pixel_scale_arcsec / 3600.0),
        );
        keywords.insert("CD1_2".to_string(), "0.0".to_string());
        keywords.insert("CD2_1".to_string(), "0.0".to_string());
        keywords.insert(
            "CD2_2".to_string(),
            format!("{:.12}", pixel_scale_arcsec / 3600.0),
        );
        WcsInfo::from_header(&FitsHeader::from_keywords("synthetic.new", keywords)).unwrap()
    }

    #[test]
    fn test_registration_to_physical_units() {
        let centers = [(40.0, 30.0), (85.0, 70.0), (25.0, 95.0), (100.0, 20.0)];
        let reference = star_field(128, 128, &centers);
        let shifted: Vec<(f64, f64)> = centers.iter().map(|&(x, y)| (x + 2.5, y - 1.25)).collect();
        let moved = star_field(128, 128, &shifted);

        let shift = measure_translation(&reference, &moved, 20).unwrap();
        assert!((shift.dx - 2.5).abs() < 0.1, "dx = {}", shift.dx);
        assert!((shift.dy - (-1.25)).abs() < 0.1, "dy = {}", shift.dy);

        // 2 arcsec/px, sidereal-rate reference
        let wcs = test_wcs(2.0);
        let offset = register_offset(shift, &wcs, 60.0, Some(15.0)).unwrap();

        assert!(
            (offset.ra_delta_arcsec - 5.0).abs() < 0.3,
            "ra arcsec = {}",
            offset.ra_delta_arcsec
        );
        assert!(
            (offset.dec_delta_arcsec - (-2.5)).abs() < 0.3,
            "dec arcsec = {}",
            offset.dec_delta_arcsec
        );
        // 5 arcsec at 15 arcsec/s is a third of a second of tracking
        assert!(
            (offset.ra_offset_ms - 333.0).abs() < 25.0,
            "ra ms = {}",
            offset.ra_offset_ms
        );
    }

    #[test]
    fn test_pointing_error_of_drifted_center() {
        // A solved center 0.2 deg off the commanded target
        let target = Equatorial::new(100.0, 20.0);
        let center = Equatorial::new(100.2, 20.0);
        let separation = target.separation_deg(&center);
        // cos(20 deg) foreshortening along RA
        assert!((separation - 0.2 * 20.0_f64.to_radians().cos()).abs() < 1e-4);
    }
}
