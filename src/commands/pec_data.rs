use crate::cli::{SequenceOptions, SiteOptions, SolverOptions};
use crate::pec::{collect_series, PecSeries};
use crate::utils::truncate_string;
use anyhow::Result;
use std::path::Path;

/// Build and print the periodic-error series for a guide-image directory.
pub fn pec_data(
    dir: &str,
    site: &SiteOptions,
    sequence: &SequenceOptions,
    solver_options: &SolverOptions,
    format: &str,
) -> Result<()> {
    let observer = site.observer();
    let options = sequence.to_pec_options();
    let solver = solver_options.to_solver()?;

    let series = collect_series(Path::new(dir), &observer, &options, &solver)?;

    match format.to_lowercase().as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&series)?),
        "csv" => output_csv(&series),
        _ => output_table(&series),
    }

    Ok(())
}

fn output_table(series: &PecSeries) {
    println!(
        "Periodic-error series for {} (gear period {} s)",
        truncate_string(&series.target, 40),
        series.gear_period_s
    );
    println!(
        "{:<22} {:>9} {:>9} {:>9} {:>8} {:>8} {:>9} {:>9} {:>7} {:>8}",
        "Time", "HA", "RA", "Dec", "dRA\"", "dDec\"", "dRA\"/s", "dDec\"/s", "dt", "offset"
    );
    println!("{:-<108}", "");

    for sample in &series.samples {
        println!(
            "{:<22} {:>+9.3} {:>+9.3} {:>+9.3} {:>+8.3} {:>+8.3} {:>+9.5} {:>+9.5} {:>7.1} {:>8.1}",
            sample.time.format("%Y-%m-%d %H:%M:%S"),
            sample.ha_deg,
            sample.ra_deg,
            sample.dec_deg,
            sample.dra_arcsec,
            sample.ddec_arcsec,
            sample.dra_rate,
            sample.ddec_rate,
            sample.dt_s,
            sample.offset_s,
        );
    }

    println!("\nTotal: {} frames", series.samples.len());
}

fn output_csv(series: &PecSeries) {
    println!("file,time,mjd,ha_deg,ra_deg,dec_deg,dra_arcsec,ddec_arcsec,dra_rate,ddec_rate,dt_s,offset_s");
    for sample in &series.samples {
        println!(
            "{},{},{:.6},{:.4},{:.4},{:.4},{:.4},{:.4},{:.6},{:.6},{:.1},{:.1}",
            sample.file,
            sample.time.to_rfc3339(),
            sample.mjd,
            sample.ha_deg,
            sample.ra_deg,
            sample.dec_deg,
            sample.dra_arcsec,
            sample.ddec_arcsec,
            sample.dra_rate,
            sample.ddec_rate,
            sample.dt_s,
            sample.offset_s,
        );
    }
}
