use clap::Parser;
use env_logger::Env;
use log::{info, warn};

use species_presence::cli::Args;
use species_presence::{batch, crossref, crs, io, AppConfig, Result};

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logger
    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    info!("=== Species Presence in Area of Interest ===");

    if let Some(n_threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .build_global()?;
        info!("Using {} threads", n_threads);
    } else {
        info!("Using all available threads");
    }

    let mut config = AppConfig::from_args(&args)?;

    // Persist a canonical copy of the AOI if needed and work from it
    config.batch.aoi_path = crs::reconcile_aoi(&config.batch.aoi_path, &config.batch.crs)?;
    info!("Area of interest: {}", config.batch.aoi_path.display());

    let result = batch::run(&config.batch)?;

    info!("Species present in the area: {}", result.present_count);
    for name in &result.present_species {
        info!("  {}", name);
    }
    if !result.problematic_files.is_empty() {
        warn!("{} problematic file(s):", result.problematic_files.len());
        for path in &result.problematic_files {
            warn!("  {}", path.display());
        }
    }
    if !result.unprocessed_files.is_empty() {
        warn!(
            "{} raster(s) left unprocessed",
            result.unprocessed_files.len()
        );
    }

    io::write_species_list(&config.output, &result.present_species)?;

    if let Some(database) = &config.database {
        info!("Cross-referencing with {}", database.display());
        let matches =
            crossref::cross_reference(&result.present_species, database, &config.crossref);
        info!("{} database row(s) matched", matches.rows.len());
    }

    info!("=== Done! ===");
    Ok(())
}
