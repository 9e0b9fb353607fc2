use crate::cli::{SequenceOptions, SiteOptions, SolverOptions};
use crate::pec::{collect_series, fit_series, ChannelFit, PecFit};
use crate::plot::render_pec_plot;
use crate::utils::truncate_string;
use anyhow::Result;
use std::path::Path;

/// Collect the periodic-error series, fit the worm-gear sinusoid, and
/// report the fitted channels.
pub fn pec_fit(
    dir: &str,
    site: &SiteOptions,
    sequence: &SequenceOptions,
    solver_options: &SolverOptions,
    plot: Option<&str>,
    format: &str,
) -> Result<()> {
    let observer = site.observer();
    let options = sequence.to_pec_options();
    let solver = solver_options.to_solver()?;

    let series = collect_series(Path::new(dir), &observer, &options, &solver)?;
    let fit = fit_series(&series)?;

    if let Some(plot_path) = plot {
        render_pec_plot(&series, &fit, Path::new(plot_path))?;
    }

    match format.to_lowercase().as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&fit)?),
        _ => output_table(&series.target, series.samples.len(), &fit),
    }

    Ok(())
}

fn output_table(target: &str, sample_count: usize, fit: &PecFit) {
    println!(
        "PEC fit for {} ({} frames)",
        truncate_string(target, 40),
        sample_count
    );
    println!(
        "{:<14} {:>10} {:>12} {:>10} {:>10} {:>8} {:>10} {:>12}",
        "Channel", "Freq", "Amplitude", "Phase", "Offset", "R^2", "RMSE", "Peak-to-peak"
    );
    println!("{:-<92}", "");

    print_channel("RA position", &fit.ra_position);
    print_channel("Dec position", &fit.dec_position);
    print_channel("RA rate", &fit.ra_rate);
    print_channel("Dec rate", &fit.dec_rate);
}

fn print_channel(label: &str, channel: &ChannelFit) {
    println!(
        "{:<14} {:>10.4} {:>12.4} {:>10.4} {:>10.4} {:>8.4} {:>10.5} {:>12.4}",
        label,
        channel.params.freq,
        channel.params.amplitude,
        channel.params.phase,
        channel.params.offset,
        channel.quality.r_squared,
        channel.quality.rmse,
        channel.peak_to_peak,
    );
}
