//! Curriculum Docs CLI - Command line access to the document operations.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use curriculum_docs_core::{
    DocumentPipeline, MergeFallback, ServiceConfig, UploadedFile, compose, insert_title,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "curriculum-docs")]
#[command(author, version, about = "Syllabus and curriculum document tools", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Insert a title paragraph at the top of a DOCX document
    Title {
        input: PathBuf,

        /// Title text
        #[arg(short, long)]
        title: String,

        /// Output file (default: <input>-titled.docx)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Append one DOCX document onto another, starting on a new page
    Compose {
        main: PathBuf,

        /// Document appended after the main document
        #[arg(short, long)]
        appendix: Option<PathBuf>,

        /// Output file (default: Curriculum_With_Syllabi.docx)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Convert a DOCX document to PDF
    Convert {
        input: PathBuf,

        /// Output file (default: <input>.pdf)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Convert DOCX documents and merge them into one PDF, in the given order
    Merge {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output file
        #[arg(short, long, default_value = "merged_curriculum.pdf")]
        output: PathBuf,

        /// Write only the first document if merging fails
        #[arg(long)]
        allow_first_only: bool,
    },

    /// Check whether the converter is installed
    Health,
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("Failed to write output: {}", path.display()))?;

    // CLI output is intentional
    #[allow(clippy::print_stdout)]
    {
        println!("Saved to: {}", path.display());
    }
    Ok(())
}

/// `<dir>/<stem><suffix>` next to `input`
fn sibling(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    input.with_file_name(format!("{stem}{suffix}"))
}

fn uploaded(path: &Path) -> Result<UploadedFile> {
    let filename = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("document.docx")
        .to_string();
    Ok(UploadedFile::new(filename, read_input(path)?))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before parsing args so env vars are available)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let log_level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    // RUST_LOG takes precedence over -v
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_ascii_lowercase()));

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = if let Some(config_path) = &args.config {
        ServiceConfig::from_file(config_path).context("Failed to load config file")?
    } else {
        ServiceConfig::load()
    };

    match args.command {
        Command::Title {
            input,
            title,
            output,
        } => {
            let docx = read_input(&input)?;
            let titled = insert_title(&docx, &title, &config.title)
                .with_context(|| format!("Failed to insert title into {}", input.display()))?;
            write_output(&output.unwrap_or_else(|| sibling(&input, "-titled.docx")), &titled)?;
        }

        Command::Compose {
            main,
            appendix,
            output,
        } => {
            let main_bytes = read_input(&main)?;
            let appendix_bytes = appendix.as_deref().map(read_input).transpose()?;
            let composed = compose(&main_bytes, appendix_bytes.as_deref())
                .context("Failed to compose documents")?;
            let output = output.unwrap_or_else(|| PathBuf::from("Curriculum_With_Syllabi.docx"));
            write_output(&output, &composed)?;
        }

        Command::Convert { input, output } => {
            let pipeline = DocumentPipeline::new(&config);
            let file = uploaded(&input)?;

            info!("Converting {}", input.display());
            let pdf = pipeline
                .convert(&file)
                .await
                .with_context(|| format!("Failed to convert {}", input.display()))?;
            write_output(&output.unwrap_or_else(|| sibling(&input, ".pdf")), &pdf)?;
        }

        Command::Merge {
            inputs,
            output,
            allow_first_only,
        } => {
            if allow_first_only {
                config.merge.fallback = MergeFallback::FirstDocument;
            }
            let pipeline = DocumentPipeline::new(&config);

            let files = inputs
                .iter()
                .map(PathBuf::as_path)
                .map(uploaded)
                .collect::<Result<Vec<_>>>()?;

            #[allow(clippy::cast_possible_truncation)]
            let pb = ProgressBar::new(files.len() as u64);
            // Template is hardcoded and valid, unwrap is safe
            #[allow(clippy::unwrap_used)]
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
                    .unwrap()
                    .progress_chars("#>-"),
            );

            let progress = pb.clone();
            let pdfs = pipeline
                .convert_all(
                    &files,
                    Some(Box::new(move |done: usize, _total: usize| {
                        progress.set_position(u64::try_from(done).unwrap_or(u64::MAX));
                    })),
                )
                .await
                .context("Failed to convert documents")?;
            pb.finish_with_message("Conversion complete");

            let outcome = pipeline.merge(pdfs).await.context("Failed to merge PDFs")?;
            if outcome.degraded {
                pb.println(format!(
                    "Merging failed; only the first of {} documents was written",
                    outcome.sources
                ));
            }
            write_output(&output, &outcome.pdf)?;
        }

        Command::Health => {
            let status = DocumentPipeline::new(&config).probe().await;

            if !status.available {
                anyhow::bail!(
                    "Converter unavailable: {}",
                    status.error.as_deref().unwrap_or("not found")
                );
            }

            // CLI output is intentional
            #[allow(clippy::print_stdout)]
            {
                println!(
                    "Converter available: {} ({})",
                    status.binary.as_deref().unwrap_or("unknown"),
                    status.version.as_deref().unwrap_or("unknown version")
                );
            }
        }
    }

    Ok(())
}
