pub mod cli;
pub mod commands;
pub mod coords;
pub mod fits;
pub mod fitting;
pub mod image_data;
pub mod offset;
pub mod pec;
pub mod plot;
pub mod pointing;
pub mod registration;
pub mod solver;
pub mod utils;
pub mod wcs;

#[cfg(test)]
mod test_pec_pipeline;

// Re-export commonly used items
pub use coords::{Equatorial, Observer};
pub use image_data::{FitsImage, ImageStatistics};
pub use offset::{center_offset, register_offset, CenterOffset, RegisterOffset};
pub use pec::{collect_series, fit_series, PecFit, PecSeries};
pub use registration::{measure_translation, PixelShift};
pub use solver::{PlateSolver, SkyHint, Solution};
pub use wcs::WcsInfo;
