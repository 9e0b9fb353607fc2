use crate::image_data::FitsImage;
use anyhow::{bail, Result};
use rustfft::{num_complex::Complex, FftPlanner};

/// Default sub-pixel refinement factor: shifts resolved to 1/100 pixel.
pub const DEFAULT_UPSAMPLE: usize = 100;

/// Translation of one frame relative to another, in pixels along image axes.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct PixelShift {
    pub dx: f64,
    pub dy: f64,
}

/// Measure the translation of `moved` relative to `reference` by phase
/// correlation.
///
/// The returned shift is the displacement that carries `reference` onto
/// `moved`: if the field drifted 3 pixels in +x between the two frames,
/// `dx` is 3. The integer part comes from the cross-power-spectrum peak;
/// the fractional part from a discrete Fourier transform of the
/// cross-power spectrum upsampled by `upsample` in a small window around
/// that peak. `upsample` of 1 disables the refinement.
pub fn measure_translation(
    reference: &FitsImage,
    moved: &FitsImage,
    upsample: usize,
) -> Result<PixelShift> {
    if reference.width != moved.width || reference.height != moved.height {
        bail!(
            "Images must be the same size to measure a shift: {}x{} vs {}x{}",
            reference.width,
            reference.height,
            moved.width,
            moved.height
        );
    }
    let (w, h) = (reference.width, reference.height);
    if w < 2 || h < 2 {
        bail!("Images too small to register: {}x{}", w, h);
    }

    let mut a = to_complex_demeaned(reference);
    let mut b = to_complex_demeaned(moved);
    fft_2d(&mut a, w, h, false);
    fft_2d(&mut b, w, h, false);

    // Normalized cross-power spectrum: conj(A) * B, phase only
    let cross: Vec<Complex<f64>> = a
        .iter()
        .zip(b.iter())
        .map(|(fa, fb)| {
            let r = fa.conj() * fb;
            let norm = r.norm();
            if norm > 1e-12 {
                r / norm
            } else {
                Complex::new(0.0, 0.0)
            }
        })
        .collect();

    let mut correlation = cross.clone();
    fft_2d(&mut correlation, w, h, true);

    // Coarse peak, wrapped to signed shifts
    let mut peak_idx = 0;
    let mut peak_val = f64::MIN;
    for (i, c) in correlation.iter().enumerate() {
        let mag = c.norm_sqr();
        if mag > peak_val {
            peak_val = mag;
            peak_idx = i;
        }
    }
    let py = (peak_idx / w) as i64;
    let px = (peak_idx % w) as i64;
    let coarse_dy = if py > h as i64 / 2 { py - h as i64 } else { py } as f64;
    let coarse_dx = if px > w as i64 / 2 { px - w as i64 } else { px } as f64;

    if upsample <= 1 {
        return Ok(PixelShift {
            dx: coarse_dx,
            dy: coarse_dy,
        });
    }

    let (fine_dy, fine_dx) = refine_peak(&cross, w, h, coarse_dy, coarse_dx, upsample);
    Ok(PixelShift {
        dx: fine_dx,
        dy: fine_dy,
    })
}

fn to_complex_demeaned(img: &FitsImage) -> Vec<Complex<f64>> {
    let mean =
        img.data.iter().map(|&v| v as f64).sum::<f64>() / (img.width * img.height) as f64;
    img.data
        .iter()
        .map(|&v| Complex::new(v as f64 - mean, 0.0))
        .collect()
}

/// In-place 2-D FFT: rows then columns.
fn fft_2d(data: &mut [Complex<f64>], width: usize, height: usize, inverse: bool) {
    let mut planner = FftPlanner::new();

    let row_fft = if inverse {
        planner.plan_fft_inverse(width)
    } else {
        planner.plan_fft_forward(width)
    };
    for row in data.chunks_exact_mut(width) {
        row_fft.process(row);
    }

    let col_fft = if inverse {
        planner.plan_fft_inverse(height)
    } else {
        planner.plan_fft_forward(height)
    };
    let mut column = vec![Complex::new(0.0, 0.0); height];
    for x in 0..width {
        for (y, c) in column.iter_mut().enumerate() {
            *c = data[y * width + x];
        }
        col_fft.process(&mut column);
        for (y, c) in column.iter().enumerate() {
            data[y * width + x] = *c;
        }
    }
}

/// Signed FFT bin frequency for index `k` of an `n`-point transform.
fn signed_freq(k: usize, n: usize) -> f64 {
    if k < (n + 1) / 2 {
        k as f64
    } else {
        k as f64 - n as f64
    }
}

/// Evaluate the correlation surface on a fine grid around the coarse peak.
///
/// Direct (matrix-multiply) DFT of the cross-power spectrum, separable in
/// the two axes. The window spans +-0.75 px around the coarse peak, which
/// always brackets the true maximum since the coarse estimate is within
/// half a pixel of it.
fn refine_peak(
    cross: &[Complex<f64>],
    w: usize,
    h: usize,
    coarse_dy: f64,
    coarse_dx: f64,
    upsample: usize,
) -> (f64, f64) {
    let half_points = (3 * upsample).div_ceil(4); // 0.75 px at the fine step
    let n = 2 * half_points + 1;
    let step = 1.0 / upsample as f64;

    let ux: Vec<f64> = (0..n)
        .map(|j| coarse_dx + (j as f64 - half_points as f64) * step)
        .collect();
    let uy: Vec<f64> = (0..n)
        .map(|j| coarse_dy + (j as f64 - half_points as f64) * step)
        .collect();

    // Column kernel: e^{2 pi i fx ux / W}
    let two_pi = std::f64::consts::TAU;
    let mut wx = vec![Complex::new(0.0, 0.0); w * n];
    for kx in 0..w {
        let fx = signed_freq(kx, w);
        for (j, &u) in ux.iter().enumerate() {
            wx[kx * n + j] = Complex::from_polar(1.0, two_pi * fx * u / w as f64);
        }
    }

    // Partial transform over x: rows of the spectrum against the column kernel
    let mut partial = vec![Complex::new(0.0, 0.0); h * n];
    for ky in 0..h {
        let row = &cross[ky * w..(ky + 1) * w];
        for (kx, &r) in row.iter().enumerate() {
            if r.norm_sqr() == 0.0 {
                continue;
            }
            let kernel = &wx[kx * n..(kx + 1) * n];
            let out = &mut partial[ky * n..(ky + 1) * n];
            for (o, &k) in out.iter_mut().zip(kernel.iter()) {
                *o += r * k;
            }
        }
    }

    // Finish over y and track the maximum
    let mut best = (coarse_dy, coarse_dx);
    let mut best_mag = f64::MIN;
    let mut row_kernel = vec![Complex::new(0.0, 0.0); h];
    for &u_y in uy.iter() {
        for (ky, k) in row_kernel.iter_mut().enumerate() {
            let fy = signed_freq(ky, h);
            *k = Complex::from_polar(1.0, two_pi * fy * u_y / h as f64);
        }
        for (ix, &u_x) in ux.iter().enumerate() {
            let mut acc = Complex::new(0.0, 0.0);
            for ky in 0..h {
                acc += row_kernel[ky] * partial[ky * n + ix];
            }
            let mag = acc.norm_sqr();
            if mag > best_mag {
                best_mag = mag;
                best = (u_y, u_x);
            }
        }
    }

    best
}
