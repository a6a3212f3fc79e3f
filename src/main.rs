mod cli;

use std::fs::File;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use simplelog::{
    ColorChoice, CombinedLogger, Config, LevelFilter, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

use pdfsnip::panic_handler;
use pdfsnip::settings::Settings;

use crate::cli::{Cli, Commands};

fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let term_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        term_level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];
    if let Some(path) = log_file {
        let file = File::create(path)
            .with_context(|| format!("cannot create log file {}", path.display()))?;
        loggers.push(WriteLogger::new(LevelFilter::Debug, Config::default(), file));
    }
    CombinedLogger::init(loggers)?;
    Ok(())
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_file.as_deref())?;
    panic_handler::initialize_panic_handler();

    info!("Starting pdfsnip {}", env!("CARGO_PKG_VERSION"));
    let settings = Settings::load(cli.config.as_deref());

    run(cli.command, &settings)
}

#[cfg(not(feature = "pdf"))]
fn run(_command: Commands, _settings: &Settings) -> Result<ExitCode> {
    anyhow::bail!("pdfsnip was built without the `pdf` feature; no document backend available")
}

#[cfg(feature = "pdf")]
fn run(command: Commands, settings: &Settings) -> Result<ExitCode> {
    match command {
        Commands::Info { file, json } => commands::info(&file, json),
        Commands::Estimate { file, pages, json } => {
            commands::estimate(&file, pages.as_deref(), json, settings)
        }
        Commands::Preview {
            file,
            page,
            rect,
            zoom,
            display,
            thumbnail,
            json,
        } => commands::preview(
            &file,
            &commands::PreviewArgs {
                page,
                rect,
                zoom,
                display,
                thumbnail,
                json,
            },
            settings,
        ),
        Commands::Extract {
            file,
            crops,
            out_dir,
            pattern,
            json,
        } => commands::extract(file, &crops, out_dir, pattern.as_deref(), json, settings),
        Commands::DumpImages { file, out_dir } => commands::dump_images(file, out_dir, settings),
    }
}

#[cfg(feature = "pdf")]
mod commands {
    use std::path::{Path, PathBuf};
    use std::process::ExitCode;

    use anyhow::{Context, Result, bail};
    use log::debug;

    use pdfsnip::pdf::naming::{document_stem, format_file_size};
    use pdfsnip::pdf::{
        BatchItem, BatchOptions, BatchOutcome, CropExtractor, CropSelectionStore, ExportResponse,
        ExportService, MupdfBackend, NamingPattern, NativeResolutionEstimator, OutputEncoding,
        PageInspector, PageSize, Rect, ScaleEstimate, ViewState, document_summary,
    };
    use pdfsnip::settings::Settings;

    use crate::cli::{CropArg, parse_page_range};

    const THUMBNAIL_SIZE: u32 = 400;

    fn open(file: &Path) -> Result<MupdfBackend> {
        MupdfBackend::open(file).with_context(|| format!("failed to open {}", file.display()))
    }

    fn page_sizes(file: &Path) -> Result<Vec<PageSize>> {
        let backend = open(file)?;
        (0..backend.page_count())
            .map(|page| Ok(backend.page_size(page)?))
            .collect()
    }

    pub fn info(file: &Path, json: bool) -> Result<ExitCode> {
        let backend = open(file)?;
        let summary = document_summary(&backend, file)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            for (label, value) in summary.lines() {
                println!("{label:>10}: {value}");
            }
        }
        Ok(ExitCode::SUCCESS)
    }

    pub fn estimate(
        file: &Path,
        pages: Option<&str>,
        json: bool,
        settings: &Settings,
    ) -> Result<ExitCode> {
        let backend = open(file)?;
        let pages = match pages {
            Some(range) => parse_page_range(range, backend.page_count()).map_err(anyhow::Error::msg)?,
            None => (0..backend.page_count()).collect(),
        };

        let mut estimator = NativeResolutionEstimator::new(settings.estimator_config());
        let estimates: Vec<ScaleEstimate> = pages
            .into_iter()
            .map(|page| estimator.estimate(&backend, page))
            .collect();

        if json {
            println!("{}", serde_json::to_string_pretty(&estimates)?);
            return Ok(ExitCode::SUCCESS);
        }
        for estimate in &estimates {
            let mut notes = Vec::new();
            if estimate.capped {
                notes.push("capped");
            }
            if estimate.fallback {
                notes.push("inspection failed, conservative default");
            }
            let notes = if notes.is_empty() {
                String::new()
            } else {
                format!(" [{}]", notes.join(", "))
            };
            println!(
                "page {:>4}: {:.2}x ({:.0} dpi){notes}",
                estimate.page + 1,
                estimate.scale,
                estimate.dpi()
            );
        }
        Ok(ExitCode::SUCCESS)
    }

    pub struct PreviewArgs {
        pub page: usize,
        pub rect: Rect,
        pub zoom: f32,
        pub display: bool,
        pub thumbnail: Option<PathBuf>,
        pub json: bool,
    }

    pub fn preview(file: &Path, args: &PreviewArgs, settings: &Settings) -> Result<ExitCode> {
        let backend = open(file)?;
        let page = args.page.checked_sub(1).context("page numbers start at 1")?;
        backend.check_page(page)?;
        let size = backend.page_size(page)?;

        let mut store = CropSelectionStore::new(document_stem(file));
        let selection = if args.display {
            store
                .add(args.rect, page, &ViewState::with_zoom(args.zoom), size)
                .cloned()
                .context("selection is under 10x10 display pixels or outside the page")?
        } else {
            store
                .add_page_rect(page, args.rect, size)
                .cloned()
                .context("selection is outside the page")?
        };

        let mut extractor = CropExtractor::new(settings.estimator_config(), settings.extractor_config());
        let preview = extractor.preview_info(&backend, &selection)?;

        if args.json {
            println!("{}", serde_json::to_string_pretty(&preview)?);
        } else {
            let format = match preview.encoding {
                OutputEncoding::Png => "PNG".to_string(),
                OutputEncoding::Jpeg { quality } => format!("JPEG (quality {quality})"),
            };
            println!("  Region: {} on page {}", preview.page_rect, preview.page + 1);
            println!(
                "   Scale: {:.2}x ({:.0} dpi, {})",
                preview.scale, preview.dpi, preview.quality
            );
            println!("  Pixels: {} x {}", preview.pixel_width, preview.pixel_height);
            println!(
                "   Print: {:.2} x {:.2} in",
                preview.physical.width_in, preview.physical.height_in
            );
            println!("  Format: {format}");
            println!("    Size: ~{}", format_file_size(preview.file_size_estimate));
        }

        if let Some(path) = &args.thumbnail {
            let image =
                extractor.preview_thumbnail(&backend, &selection, THUMBNAIL_SIZE, THUMBNAIL_SIZE)?;
            image
                .save(path)
                .with_context(|| format!("cannot write thumbnail {}", path.display()))?;
        }
        Ok(ExitCode::SUCCESS)
    }

    pub fn extract(
        file: PathBuf,
        crops: &[CropArg],
        out_dir: PathBuf,
        pattern: Option<&str>,
        json: bool,
        settings: &Settings,
    ) -> Result<ExitCode> {
        let document = document_stem(&file);
        let sizes = page_sizes(&file)?;
        let mut store = CropSelectionStore::new(document.clone());
        for crop in crops {
            let page = crop.page + 1;
            let size = *sizes
                .get(crop.page)
                .with_context(|| format!("page {page} is out of range ({} pages)", sizes.len()))?;
            store
                .add_page_rect(crop.page, crop.rect, size)
                .with_context(|| format!("crop on page {page} is outside the page"))?;
        }

        let pattern = match pattern {
            Some(text) => text
                .parse::<NamingPattern>()
                .with_context(|| format!("invalid --pattern '{text}'"))?,
            None => settings.naming_pattern.clone(),
        };
        let options = BatchOptions {
            out_dir,
            pattern,
            document,
        };

        let mut service = ExportService::open_pdf(
            file,
            settings.estimator_config(),
            settings.extractor_config(),
        );
        let id = service.export_batch(store.as_slice().to_vec(), options);

        let mut report = None;
        for response in service.wait_for(id) {
            match response {
                ExportResponse::DocumentReady { page_count, .. } => {
                    debug!("document ready, {page_count} pages");
                }
                ExportResponse::BatchProgress {
                    done, total, item, ..
                } if !json => print_item(done, total, &item),
                ExportResponse::BatchDone { report: done, .. } => report = Some(done),
                ExportResponse::Error { error, .. } => bail!("export failed: {error}"),
                _ => {}
            }
        }
        let report = report.context("export worker stopped before finishing")?;

        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!("Exported {}/{}", report.exported, report.total);
        }
        Ok(if report.exported == report.total {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }

    fn print_item(done: usize, total: usize, item: &BatchItem) {
        match &item.outcome {
            BatchOutcome::Exported { result } => println!(
                "[{done}/{total}] {} -> {} ({} x {} px, {:.0} dpi, {})",
                item.label,
                result.path.display(),
                result.pixel_width,
                result.pixel_height,
                result.dpi,
                result.quality
            ),
            BatchOutcome::Failed { error } => {
                println!("[{done}/{total}] {} FAILED: {error}", item.label);
            }
        }
    }

    pub fn dump_images(file: PathBuf, out_dir: PathBuf, settings: &Settings) -> Result<ExitCode> {
        let mut service = ExportService::open_pdf(
            file,
            settings.estimator_config(),
            settings.extractor_config(),
        );
        let id = service.dump_images(out_dir);

        for response in service.wait_for(id) {
            match response {
                ExportResponse::ImagesDumped { paths, .. } => {
                    for path in &paths {
                        println!("{}", path.display());
                    }
                    println!("Wrote {} images", paths.len());
                    return Ok(ExitCode::SUCCESS);
                }
                ExportResponse::Error { error, .. } => bail!("image dump failed: {error}"),
                _ => {}
            }
        }
        bail!("export worker stopped before finishing")
    }
}
