use crate::cli::SolverOptions;
use anyhow::{bail, Result};
use std::path::Path;

#[derive(Debug, serde::Serialize)]
struct SolveReport {
    file: String,
    solved_file: String,
    ra_center: f64,
    dec_center: f64,
    pixel_scale: f64,
    rotation: f64,
    date_obs: Option<String>,
}

/// Plate solve a single image and print the solution.
pub fn solve_image(file: &str, solver_options: &SolverOptions, format: &str) -> Result<()> {
    let solver = solver_options.to_solver()?;
    if !solver.is_available() {
        bail!("solve-field is not runnable; install astrometry.net or set SOLVE_FIELD");
    }
    let hint = solver_options.hint();
    let solution = solver.solve(Path::new(file), hint.as_ref())?;

    let report = SolveReport {
        file: file.to_string(),
        solved_file: solution.solved_path.display().to_string(),
        ra_center: solution.wcs.center.ra_deg,
        dec_center: solution.wcs.center.dec_deg,
        pixel_scale: solution.wcs.pixel_scale,
        rotation: solution.wcs.rotation,
        date_obs: solution.date_obs.map(|t| t.to_rfc3339()),
    };

    match format.to_lowercase().as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => {
            println!("Solved: {}", report.solved_file);
            println!("{:<16} {:>14.6}", "RA center", report.ra_center);
            println!("{:<16} {:>14.6}", "Dec center", report.dec_center);
            println!("{:<16} {:>14.4}", "Pixel scale", report.pixel_scale);
            println!("{:<16} {:>14.4}", "Rotation", report.rotation);
            if let Some(date_obs) = &report.date_obs {
                println!("{:<16} {:>24}", "DATE-OBS", date_obs);
            }
        }
    }

    Ok(())
}
