//! pdfstamp command-line tool
//!
//! Uploads PDFs, registers signature images, stamps signatures onto pages
//! and flattens documents to page images. Blobs live in a directory tree
//! and document metadata in JSON records beside them.
//!
//! ## Configuration
//!
//! Read from the environment (a `.env` file is honored):
//!
//! - `PDFSTAMP_STORAGE_DIR`: storage root, default `./pdfstamp-data`
//! - `PDFSTAMP_DPI`: flattening resolution, default 200
//! - `PDFIUM_LIBRARY_PATH`: directory holding libpdfium
//!
//! `--storage-dir` and `--dpi` override the environment.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pdfstamp_core::PlacementRequest;
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

mod app;
mod config;
mod records;
mod renderer;

use app::App;
use config::Config;

/// Command-line arguments for pdfstamp
#[derive(Parser, Debug)]
#[command(name = "pdfstamp")]
#[command(about = "Stamp signature images onto PDF documents and flatten them")]
pub struct Cli {
    /// Storage root (overrides PDFSTAMP_STORAGE_DIR)
    #[arg(long, global = true)]
    storage_dir: Option<PathBuf>,

    /// Flattening resolution (overrides PDFSTAMP_DPI)
    #[arg(long, global = true)]
    dpi: Option<u32>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Store a PDF and create its document record
    Upload {
        file: PathBuf,
        #[arg(long)]
        owner: String,
        /// Defaults to the file name without extension
        #[arg(long)]
        title: Option<String>,
    },
    /// Register an owner's signature image (PNG), replacing any earlier one
    Signature {
        image: PathBuf,
        #[arg(long)]
        owner: String,
    },
    /// Stamp the owner's signature onto a page of a document
    Sign {
        id: Uuid,
        #[command(flatten)]
        placement: PlacementArgs,
    },
    /// Rasterize every page of a document
    Flatten {
        id: Uuid,
        /// Flatten the original upload instead of the signed file
        #[arg(long)]
        original: bool,
    },
    /// Print a document record
    Show { id: Uuid },
    /// Print the page count of a document
    Pages { id: Uuid },
    /// Copy the newest file of a document out of storage
    Export { id: Uuid, output: PathBuf },
}

/// Where to put the signature, either as flags or as the editor's JSON body.
#[derive(Args, Debug)]
pub struct PlacementArgs {
    /// Placement JSON as produced by the browser editor
    #[arg(long)]
    request: Option<PathBuf>,

    /// 1-based page number
    #[arg(long, required_unless_present = "request", conflicts_with = "request")]
    page: Option<u32>,

    /// Clockwise rotation in degrees
    #[arg(long, allow_negative_numbers = true, conflicts_with = "request")]
    rotation: Option<f64>,

    /// Width of the page preview the rectangle was drawn on
    #[arg(long, required_unless_present = "request", conflicts_with = "request")]
    viewport_width: Option<f64>,

    /// Height of the page preview the rectangle was drawn on
    #[arg(long, required_unless_present = "request", conflicts_with = "request")]
    viewport_height: Option<f64>,

    #[arg(long, required_unless_present = "request", conflicts_with = "request")]
    x: Option<f64>,

    #[arg(long, required_unless_present = "request", conflicts_with = "request")]
    y: Option<f64>,

    #[arg(long, required_unless_present = "request", conflicts_with = "request")]
    width: Option<f64>,

    #[arg(long, required_unless_present = "request", conflicts_with = "request")]
    height: Option<f64>,
}

impl PlacementArgs {
    pub fn to_request(&self) -> Result<PlacementRequest> {
        if let Some(path) = &self.request {
            let body = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            return Ok(PlacementRequest::from_json(&body)?);
        }

        let request = PlacementRequest {
            page_number: self.page.context("--page is required")?,
            rotation_degrees: self.rotation.unwrap_or(0.0),
            viewport_width: self.viewport_width.context("--viewport-width is required")?,
            viewport_height: self.viewport_height.context("--viewport-height is required")?,
            x: self.x.context("--x is required")?,
            y: self.y.context("--y is required")?,
            width: self.width.context("--width is required")?,
            height: self.height.context("--height is required")?,
        };
        request.validate()?;
        Ok(request)
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("pdfstamp={},pdfstamp_core={}", level, level))
    });

    // Logs on stderr so stdout carries only command output
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::from_env()?.with_overrides(cli.storage_dir.clone(), cli.dpi)?;
    tracing::debug!("Using storage at {}", config.storage_dir.display());

    let app = App::open(&config)?;
    let output = app.run(cli.command)?;
    println!("{}", output);
    Ok(())
}
