use anyhow::Result;
use clap::Parser;
use drift_guard::cli::{Cli, Commands};
use drift_guard::commands;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Solve {
            file,
            solver,
            format,
        } => {
            commands::solve_image(&file, &solver, &format)?;
        }
        Commands::PointingError { file, format } => {
            commands::pointing_error_report(&file, &format)?;
        }
        Commands::Offset {
            first,
            second,
            from_centers,
            no_crop,
            upsample,
            rate,
            delta_t,
            wcs_file,
            format,
        } => {
            commands::measure_offset(
                &first,
                &second,
                from_centers,
                no_crop,
                upsample,
                rate,
                delta_t,
                wcs_file.as_deref(),
                &format,
            )?;
        }
        Commands::PecData {
            dir,
            site,
            sequence,
            solver,
            format,
        } => {
            commands::pec_data(&dir, &site, &sequence, &solver, &format)?;
        }
        Commands::PecFit {
            dir,
            site,
            sequence,
            solver,
            plot,
            format,
        } => {
            commands::pec_fit(&dir, &site, &sequence, &solver, plot.as_deref(), &format)?;
        }
    }

    Ok(())
}
