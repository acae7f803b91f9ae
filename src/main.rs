use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;

use holocontours::detection::sampling::PhaseSampler;
use holocontours::logger;
use holocontours::{
    ImageCache, ImageSource, LiveClient, OfflineReader, ReportWriter, Settings,
    build_standard_pipeline,
};
use holocontours::settings::DepthRange;

#[derive(Parser)]
#[command(name = "holocontours")]
#[command(about = "Locate objects in a holographic volume and estimate their depth")]
struct Cli {
    /// Dataset name, resolved under the configured data folder
    #[arg(value_name = "NAME")]
    name: String,

    /// Path to the TOML settings file
    #[arg(value_name = "SETTINGS")]
    settings: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Save debug outputs to directory (must be empty)
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    logger::init_with_level(logger::level_for_verbosity(args.verbose))?;

    let started = Instant::now();
    let settings = Settings::load(&args.settings)?;

    let source: Box<dyn ImageSource> = if settings.source.online {
        let client = LiveClient::new(settings.source.address.clone(), settings.source.timeout())?;
        log::info!(
            "reconstructing on device at {} (timeout {:?})",
            client.address(),
            client.timeout()
        );
        Box::new(client)
    } else {
        Box::new(OfflineReader::new())
    };
    let mut cache = ImageCache::new(source, settings.cache_budget());

    let location = if settings.source.online {
        args.name.clone()
    } else {
        settings.data_folder.join(&args.name).to_string_lossy().into_owned()
    };
    cache
        .open(&location)
        .with_context(|| format!("Cannot open dataset {:?}", args.name))?;

    let mut pipeline = build_standard_pipeline(&settings);
    if let Some(debug_dir) = args.debug_out {
        pipeline = pipeline.with_debug(debug_dir)?;
    }
    let data = pipeline.run(&mut cache, &settings)?;

    let writer = ReportWriter::new(settings.output_folder.join(&args.name))?;
    if let Some(projection) = &data.projection {
        writer.save_image(&projection.values, "maximum.png", true)?;
        writer.save_image(&projection.depths, "depthImage.png", true)?;
        let (width, height) = projection.dimensions();
        writer.save_contour_image(&data.contours, width, height, "contours.png")?;
    }
    writer.save_roi_images(&mut cache, &data.contours, settings.focus.channel)?;

    let mut sampler = PhaseSampler::new(settings.sampling.seed);
    for probe in &settings.sampling.probes {
        let Some(contour) = data.contours.get(probe.contour) else {
            log::warn!(
                "phase probe skipped: only {} contours, asked for index {}",
                data.contours.len(),
                probe.contour
            );
            continue;
        };
        let points = sampler.sample(contour, probe.samples);
        writer.write_samples(contour, &points)?;

        let range = DepthRange::new(probe.start, probe.stop, probe.step);
        let profile =
            PhaseSampler::record_profile(&mut cache, &points, &range, settings.sampling.channel)?;
        writer.write_profile(contour, &profile)?;
    }

    let report = writer.write_report(&data.contours, started.elapsed())?;

    let stats = cache.stats();
    log::info!(
        "cache: {} hits, {} misses, {} evictions ({:.1}% hit rate)",
        stats.hits,
        stats.misses,
        stats.evictions,
        stats.hit_rate() * 100.0
    );

    println!("Contours located: {}", data.contours.len());
    for contour in &data.contours {
        match contour.depth {
            Some(depth) => println!(
                "  #{} at ({}, {}) area {} depth {:.3}",
                contour.id,
                contour.bbox.min_x,
                contour.bbox.min_y,
                contour.area(),
                depth
            ),
            None => println!(
                "  #{} at ({}, {}) area {} depth unknown",
                contour.id,
                contour.bbox.min_x,
                contour.bbox.min_y,
                contour.area()
            ),
        }
    }
    println!("Report written to {}", report.display());

    Ok(())
}
