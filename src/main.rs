use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use eqpipe::logging;
use eqpipe::{OutputFormat, Pipeline, PipelineSettings};

/// Equalize the color histogram of an image through a three-stage
/// read / process / write pipeline.
#[derive(Parser)]
#[command(version)]
struct Args {
    /// Source image path. Prompted for on stdin when omitted.
    input: Option<PathBuf>,

    /// Destination image path. Prompted for on stdin when omitted.
    output: Option<PathBuf>,

    /// Settings file (JSON). Defaults to settings.json in the user config directory.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of segments the image is streamed in.
    #[arg(long, value_name = "N")]
    segments: Option<usize>,

    /// Artificial delay after each segment, in milliseconds.
    #[arg(long, value_name = "MS")]
    delay_ms: Option<u64>,

    /// Output container format.
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Enable debug logging (overrides RUST_LOG).
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_tracing(args.debug);

    let mut settings = match &args.config {
        Some(path) => PipelineSettings::from_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => PipelineSettings::load(),
    };
    if let Some(segments) = args.segments {
        settings.segment_count = segments;
    }
    if let Some(delay_ms) = args.delay_ms {
        settings.segment_delay_ms = delay_ms;
    }
    if let Some(format) = args.format {
        settings.output_format = format;
    }

    let input = match args.input {
        Some(path) => path,
        None => prompt_path("Enter the path to the source image:")?,
    };
    let output = match args.output {
        Some(path) => path,
        None => prompt_path("Enter the path for the processed image:")?,
    };

    let pipeline = Pipeline::new(settings)?;
    let report = pipeline.run(&input, &output)?;

    for line in report.summary_lines() {
        println!("{}", line);
    }
    println!("Image processing finished.");

    if let Some((stage, error)) = report.root_failure() {
        eprintln!("{}", error.user_message());
        bail!("{} stage failed", stage);
    }
    Ok(())
}

fn prompt_path(question: &str) -> Result<PathBuf> {
    println!("{}", question);
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let trimmed = line.trim();
    if trimmed.is_empty() {
        bail!("no path given");
    }
    Ok(PathBuf::from(trimmed))
}
