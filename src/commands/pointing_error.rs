use crate::pointing;
use anyhow::Result;
use std::path::Path;

/// Report the pointing error of a solved frame.
pub fn pointing_error_report(file: &str, format: &str) -> Result<()> {
    let error = pointing::pointing_error(Path::new(file))?;

    match format.to_lowercase().as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&error)?),
        _ => {
            println!("Pointing error for {}", file);
            println!(
                "{:<16} {:>12.6} {:>12.6}",
                "Target", error.target.ra_deg, error.target.dec_deg
            );
            println!(
                "{:<16} {:>12.6} {:>12.6}",
                "Solved center", error.center.ra_deg, error.center.dec_deg
            );
            println!(
                "{:<16} {:>12.6} deg ({:.2} arcmin)",
                "Separation", error.separation_deg, error.separation_arcmin
            );
        }
    }

    Ok(())
}
