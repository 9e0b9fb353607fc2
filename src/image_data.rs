use anyhow::{Context, Result};
use fitrs::{Fits, FitsData, FitsDataArray};
use std::path::Path;

#[derive(Debug, Clone, serde::Serialize)]
pub struct ImageStatistics {
    pub width: usize,
    pub height: usize,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

/// FITS image data structure
pub struct FitsImage {
    pub width: usize,
    pub height: usize,
    pub bit_depth: i32,
    pub data: Vec<u16>, // Keep as 16-bit unsigned integers
}

impl FitsImage {
    /// Load FITS image data from file using fitrs
    pub fn from_file(path: &Path) -> Result<Self> {
        let fits = Fits::open(path)
            .with_context(|| format!("Failed to open FITS file: {}", path.display()))?;

        let hdu = fits
            .get(0)
            .ok_or_else(|| anyhow::anyhow!("No primary HDU found in FITS file"))?;

        let width = match hdu.value("NAXIS1") {
            Some(fitrs::HeaderValue::IntegerNumber(n)) => *n as usize,
            Some(_) => return Err(anyhow::anyhow!("NAXIS1 is not an integer")),
            None => return Err(anyhow::anyhow!("Missing NAXIS1 header")),
        };

        let height = match hdu.value("NAXIS2") {
            Some(fitrs::HeaderValue::IntegerNumber(n)) => *n as usize,
            Some(_) => return Err(anyhow::anyhow!("NAXIS2 is not an integer")),
            None => return Err(anyhow::anyhow!("Missing NAXIS2 header")),
        };

        let bit_depth = match hdu.value("BITPIX") {
            Some(fitrs::HeaderValue::IntegerNumber(n)) => *n as i32,
            Some(_) => return Err(anyhow::anyhow!("BITPIX is not an integer")),
            None => return Err(anyhow::anyhow!("Missing BITPIX header")),
        };

        let naxis = match hdu.value("NAXIS") {
            Some(fitrs::HeaderValue::IntegerNumber(n)) => *n as u32,
            Some(_) => return Err(anyhow::anyhow!("NAXIS is not an integer")),
            None => return Err(anyhow::anyhow!("Missing NAXIS header")),
        };

        if naxis < 2 {
            return Err(anyhow::anyhow!(
                "FITS file does not contain 2D image data (NAXIS={})",
                naxis
            ));
        }

        let fits_data = hdu.read_data();

        let data: Vec<u16> = match fits_data {
            FitsData::Characters(_) => {
                return Err(anyhow::anyhow!(
                    "FITS file contains character data, not image data"
                ));
            }
            FitsData::IntegersI32(FitsDataArray { data, .. }) => data
                .into_iter()
                .map(|x| {
                    if let Some(raw_val) = x {
                        // Signed 16-bit data stored with BZERO=32768 ranges
                        // -32768..32767; shift to unsigned 0..65535
                        ((raw_val + 32768).max(0).min(65535)) as u16
                    } else {
                        0u16
                    }
                })
                .collect(),
            FitsData::IntegersU32(FitsDataArray { data, .. }) => data
                .into_iter()
                .map(|x| x.map(|raw_val| raw_val.min(65535) as u16).unwrap_or(0))
                .collect(),
            FitsData::FloatingPoint32(FitsDataArray { data, .. }) => data
                .into_iter()
                .map(|x| x.max(0.0).min(65535.0) as u16)
                .collect(),
            FitsData::FloatingPoint64(FitsDataArray { data, .. }) => data
                .into_iter()
                .map(|x| x.max(0.0).min(65535.0) as u16)
                .collect(),
        };

        if data.len() != width * height {
            return Err(anyhow::anyhow!(
                "Data size mismatch: expected {} pixels, got {}",
                width * height,
                data.len()
            ));
        }

        Ok(FitsImage {
            width,
            height,
            bit_depth,
            data,
        })
    }

    pub fn from_raw(width: usize, height: usize, data: Vec<u16>) -> Result<Self> {
        if data.len() != width * height {
            return Err(anyhow::anyhow!(
                "Data size mismatch: expected {} pixels, got {}",
                width * height,
                data.len()
            ));
        }
        Ok(FitsImage {
            width,
            height,
            bit_depth: 16,
            data,
        })
    }

    /// Central square crop, used to bound registration cost on full frames.
    ///
    /// Returns a copy of self when the image already fits within `size`.
    pub fn crop_centered(&self, size: usize) -> FitsImage {
        if self.width <= size && self.height <= size {
            return FitsImage {
                width: self.width,
                height: self.height,
                bit_depth: self.bit_depth,
                data: self.data.clone(),
            };
        }

        let crop_w = size.min(self.width);
        let crop_h = size.min(self.height);
        let x0 = (self.width - crop_w) / 2;
        let y0 = (self.height - crop_h) / 2;

        let mut data = Vec::with_capacity(crop_w * crop_h);
        for y in y0..y0 + crop_h {
            let row = y * self.width;
            data.extend_from_slice(&self.data[row + x0..row + x0 + crop_w]);
        }

        FitsImage {
            width: crop_w,
            height: crop_h,
            bit_depth: self.bit_depth,
            data,
        }
    }

    /// Calculate basic image statistics
    pub fn calculate_statistics(&self) -> ImageStatistics {
        let mut sorted_data = self.data.clone();
        sorted_data.sort();

        let sum: u64 = self.data.iter().map(|&x| x as u64).sum();
        let mean = sum as f64 / self.data.len() as f64;

        let median = if sorted_data.len() % 2 == 0 {
            let mid = sorted_data.len() / 2;
            (sorted_data[mid - 1] as f64 + sorted_data[mid] as f64) / 2.0
        } else {
            sorted_data[sorted_data.len() / 2] as f64
        };

        let variance: f64 = self
            .data
            .iter()
            .map(|&x| (x as f64 - mean).powi(2))
            .sum::<f64>()
            / (self.data.len().max(2) - 1) as f64;
        let std_dev = variance.sqrt();

        ImageStatistics {
            width: self.width,
            height: self.height,
            mean,
            median,
            std_dev,
            min: sorted_data[0] as f64,
            max: sorted_data[sorted_data.len() - 1] as f64,
        }
    }
}
