//! Book Capture
//!
//! Captures every page of a book open in the Kindle desktop viewer as PNG
//! images, and turns captured pages into markdown with OCR text and the
//! page images that carry graphics.

mod analysis;
mod automation;
mod calibration;
#[cfg(windows)]
mod capture;
mod error;
mod logger;
mod ocr;
mod paths;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "book-capture", version, about = "Capture and convert Kindle books")]
struct Cli {
    /// Config file (defaults to config.json next to the executable)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Capture all pages of the open book into <BOOK_DIR>/pages
    Capture {
        /// Book folder receiving the pages
        book_dir: PathBuf,
    },
    /// Create <BOOK_DIR>/markdown/<book>.md from the captured pages
    Markdown {
        /// Book folder containing pages/
        book_dir: PathBuf,
    },
    /// Remove text-only images from markdown folders below <PATH>
    Cleanup {
        /// Book folder or parent folder of several books
        path: PathBuf,
    },
    /// Print whether a page image is text, image or mixed
    Classify {
        /// Page image
        image: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    paths::ensure_directories().context("Failed to create log directory")?;
    logger::init(cli.verbose);
    logger::install_panic_hook();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(paths::get_default_config_path);
    let config = automation::load_config(&config_path);

    match cli.command {
        Command::Capture { book_dir } => {
            #[cfg(windows)]
            unsafe {
                windows::Win32::System::WinRT::RoInitialize(
                    windows::Win32::System::WinRT::RO_INIT_MULTITHREADED,
                )?
            };
            let pages_dir = paths::get_pages_dir(&book_dir);
            automation::capture_book(&pages_dir, &config)
        }
        Command::Markdown { book_dir } => {
            let stats = analysis::export_book(&book_dir, &config)?;
            log::info!(
                "{} pages: {} text, {} image, {} mixed",
                stats.pages,
                stats.text_pages,
                stats.image_pages,
                stats.mixed_pages
            );
            Ok(())
        }
        Command::Cleanup { path } => {
            analysis::cleanup_images(&path, config.export.cleanup_min_graphic_height)?;
            Ok(())
        }
        Command::Classify { image } => {
            let engine = ocr::create_engine(&config.ocr).context("OCR is required to classify")?;
            let img = image::open(&image)
                .with_context(|| format!("Failed to open {}", image.display()))?
                .to_rgba8();
            let lines = ocr::OcrEngine::recognize(&engine, &img);
            let kind = analysis::classify_page(&img, &lines, &config.classifier);
            println!("{}", kind);
            Ok(())
        }
    }
}
