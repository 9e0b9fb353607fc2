//! PEC fit rendering.
//!
//! Draws the drift samples and the fitted worm-gear curves to a PNG so a
//! calibration run leaves something a human can eyeball: position channels
//! in the top panel, rate channels in the bottom one. RA is the red/blue
//! pair (samples/fit), Dec the green pair.

use crate::pec::{ChannelFit, PecFit, PecSample, PecSeries};
use anyhow::{bail, Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use std::path::Path;

const WIDTH: u32 = 900;
const HEIGHT: u32 = 700;
const MARGIN: f32 = 50.0;
const CURVE_POINTS: usize = 1000;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([40, 40, 40]);
const GRID: Rgb<u8> = Rgb([210, 210, 210]);
const RA_SAMPLES: Rgb<u8> = Rgb([220, 60, 60]);
const RA_FIT: Rgb<u8> = Rgb([40, 70, 200]);
const DEC_SAMPLES: Rgb<u8> = Rgb([60, 160, 60]);
const DEC_FIT: Rgb<u8> = Rgb([20, 110, 20]);

/// Render the PEC series and its fit to a PNG file.
pub fn render_pec_plot(series: &PecSeries, fit: &PecFit, path: &Path) -> Result<()> {
    if series.samples.is_empty() {
        bail!("Cannot plot an empty PEC series");
    }

    let mut canvas = RgbImage::from_pixel(WIDTH, HEIGHT, BACKGROUND);

    let panel_height = (HEIGHT as f32 - 3.0 * MARGIN) / 2.0;
    let top = Panel::new(MARGIN, MARGIN, WIDTH as f32 - 2.0 * MARGIN, panel_height);
    let bottom = Panel::new(
        MARGIN,
        2.0 * MARGIN + panel_height,
        WIDTH as f32 - 2.0 * MARGIN,
        panel_height,
    );

    draw_channel_panel(
        &mut canvas,
        top,
        series,
        |s| s.dra_arcsec,
        |s| s.ddec_arcsec,
        &fit.ra_position,
        &fit.dec_position,
    );
    draw_channel_panel(
        &mut canvas,
        bottom,
        series,
        |s| s.dra_rate,
        |s| s.ddec_rate,
        &fit.ra_rate,
        &fit.dec_rate,
    );

    canvas
        .save(path)
        .with_context(|| format!("Failed to write plot: {}", path.display()))?;
    tracing::info!("Wrote PEC plot to {}", path.display());
    Ok(())
}

/// Plot area with data-space bounds.
#[derive(Clone, Copy)]
struct Panel {
    x0: f32,
    y0: f32,
    width: f32,
    height: f32,
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
}

impl Panel {
    fn new(x0: f32, y0: f32, width: f32, height: f32) -> Self {
        Panel {
            x0,
            y0,
            width,
            height,
            x_min: 0.0,
            x_max: 1.0,
            y_min: 0.0,
            y_max: 1.0,
        }
    }

    fn with_bounds(mut self, x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> Self {
        // Avoid a degenerate scale on flat data
        let y_pad = ((y_max - y_min).abs() * 0.1).max(1e-6);
        let x_pad = ((x_max - x_min).abs() * 0.05).max(1e-6);
        self.x_min = x_min - x_pad;
        self.x_max = x_max + x_pad;
        self.y_min = y_min - y_pad;
        self.y_max = y_max + y_pad;
        self
    }

    fn project(&self, x: f64, y: f64) -> (f32, f32) {
        let fx = (x - self.x_min) / (self.x_max - self.x_min);
        let fy = (y - self.y_min) / (self.y_max - self.y_min);
        (
            self.x0 + fx as f32 * self.width,
            // Image y runs down, data y runs up
            self.y0 + (1.0 - fy as f32) * self.height,
        )
    }
}

fn draw_channel_panel(
    canvas: &mut RgbImage,
    panel: Panel,
    series: &PecSeries,
    ra_value: fn(&PecSample) -> f64,
    dec_value: fn(&PecSample) -> f64,
    ra_fit: &ChannelFit,
    dec_fit: &ChannelFit,
) {
    let xs: Vec<f64> = series.samples.iter().map(|s| s.ha_deg).collect();
    let x_min = xs.iter().cloned().fold(f64::INFINITY, f64::min);
    let x_max = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    let ra_curve = ra_fit.params.curve(x_min, x_max, CURVE_POINTS);
    let dec_curve = dec_fit.params.curve(x_min, x_max, CURVE_POINTS);

    let mut y_min = f64::INFINITY;
    let mut y_max = f64::NEG_INFINITY;
    for sample in &series.samples {
        for value in [ra_value(sample), dec_value(sample)] {
            y_min = y_min.min(value);
            y_max = y_max.max(value);
        }
    }
    for &(_, y) in ra_curve.iter().chain(dec_curve.iter()) {
        y_min = y_min.min(y);
        y_max = y_max.max(y);
    }

    let panel = panel.with_bounds(x_min, x_max, y_min, y_max);

    // Frame and zero line
    let corners = [
        panel.project(panel.x_min, panel.y_min),
        panel.project(panel.x_max, panel.y_min),
        panel.project(panel.x_max, panel.y_max),
        panel.project(panel.x_min, panel.y_max),
    ];
    for i in 0..4 {
        draw_line_segment_mut(canvas, corners[i], corners[(i + 1) % 4], AXIS);
    }
    if panel.y_min < 0.0 && panel.y_max > 0.0 {
        let left = panel.project(panel.x_min, 0.0);
        let right = panel.project(panel.x_max, 0.0);
        draw_line_segment_mut(canvas, left, right, GRID);
    }

    draw_polyline(canvas, &panel, &ra_curve, RA_FIT);
    draw_polyline(canvas, &panel, &dec_curve, DEC_FIT);

    for sample in &series.samples {
        let (x, y) = panel.project(sample.ha_deg, ra_value(sample));
        draw_filled_circle_mut(canvas, (x as i32, y as i32), 3, RA_SAMPLES);
        let (x, y) = panel.project(sample.ha_deg, dec_value(sample));
        draw_filled_circle_mut(canvas, (x as i32, y as i32), 2, DEC_SAMPLES);
    }
}

fn draw_polyline(canvas: &mut RgbImage, panel: &Panel, points: &[(f64, f64)], color: Rgb<u8>) {
    for pair in points.windows(2) {
        let from = panel.project(pair[0].0, pair[0].1);
        let to = panel.project(pair[1].0, pair[1].1);
        draw_line_segment_mut(canvas, from, to, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fits::mjd;
    use crate::pec::{fit_series, DEFAULT_GEAR_PERIOD_S};
    use chrono::TimeZone;

    fn synthetic_series() -> PecSeries {
        let t0 = chrono::Utc.with_ymd_and_hms(2016, 8, 9, 6, 0, 0).unwrap();
        let samples = (0..40)
            .map(|i| {
                let ha = -10.0 + i as f64 * 0.5;
                let time = t0 + chrono::Duration::seconds(i as i64 * 120);
                let dra = 3.0 * (ha * 2.0).sin();
                PecSample {
                    file: format!("guide_{:03}.fits", i),
                    time,
                    mjd: mjd(time),
                    dt_s: 120.0,
                    offset_s: 120.0 * i as f64,
                    ha_deg: ha,
                    ra_deg: 100.0,
                    dec_deg: 20.0,
                    dra_arcsec: dra,
                    ddec_arcsec: 0.4 * (ha * 2.0).cos(),
                    dra_rate: dra / 120.0,
                    ddec_rate: 0.4 * (ha * 2.0).cos() / 120.0,
                }
            })
            .collect();
        PecSeries {
            target: "plot-test".to_string(),
            gear_period_s: DEFAULT_GEAR_PERIOD_S,
            samples,
        }
    }

    #[test]
    fn test_render_writes_png() {
        let series = synthetic_series();
        let fit = fit_series(&series).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pec_fit.png");

        render_pec_plot(&series, &fit, &path).unwrap();

        let (width, height) = image::image_dimensions(&path).unwrap();
        assert_eq!(width, WIDTH);
        assert_eq!(height, HEIGHT);
    }

    #[test]
    fn test_render_rejects_empty_series() {
        let mut series = synthetic_series();
        let fit = fit_series(&series).unwrap();
        series.samples.clear();
        let dir = tempfile::tempdir().unwrap();
        assert!(render_pec_plot(&series, &fit, &dir.path().join("x.png")).is_err());
    }
}
