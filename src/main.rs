use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::Parser;
use dicom_dictionary_std::tags;
use dicom_object::{FileDicomObject, InMemDicomObject, open_file};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

mod coding;
mod content;
mod filter;
mod report;
mod uid;

use crate::report::SrOptions;
use crate::uid::UidPrefix;

#[derive(Parser)]
#[command(name = "dicom-sr")]
#[command(about = "Convert DICOM image files into Basic Text Structured Reports")]
#[command(version)]
struct Cli {
    /// Input path: DICOM file or directory
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output directory (defaults to the current directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// UID root for generated SOP Instance UIDs
    #[arg(long, default_value = uid::DEFAULT_UID_PREFIX)]
    prefix: UidPrefix,

    /// Process files in parallel (faster for large batches)
    #[arg(long)]
    parallel: bool,

    /// Maximum recursion depth for directory processing
    #[arg(long, default_value = "10")]
    max_depth: usize,

    /// Write a JSON manifest of the run into the output directory
    #[arg(long)]
    manifest: bool,

    /// Increase log verbosity (-v: debug, -vv: trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum OutcomeStatus {
    /// A report was written for this file.
    Converted,
    /// Not an image object; passed through untouched.
    Skipped,
    /// Synthesis or I/O failed; the original file is untouched.
    Failed,
}

#[derive(Serialize)]
struct FileOutcome {
    source: String,
    status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    sop_instance_uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

#[derive(Serialize)]
struct RunSummary {
    generated_at: DateTime<Utc>,
    uid_prefix: String,
    total: usize,
    converted: usize,
    skipped: usize,
    failed: usize,
    files: Vec<FileOutcome>,
}

impl RunSummary {
    fn tally(uid_prefix: &str, files: Vec<FileOutcome>) -> Self {
        let count =
            |status| files.iter().filter(|f| f.status == status).count();
        let (converted, skipped, failed) = (
            count(OutcomeStatus::Converted),
            count(OutcomeStatus::Skipped),
            count(OutcomeStatus::Failed),
        );
        RunSummary {
            generated_at: Utc::now(),
            uid_prefix: uid_prefix.to_owned(),
            total: files.len(),
            converted,
            skipped,
            failed,
            files,
        }
    }

    fn print(&self) {
        println!("\nProcessing summary:");
        println!("   Total files: {}", self.total);
        println!("   Converted:   {}", self.converted);
        println!("   Skipped:     {}", self.skipped);
        println!("   Failed:      {}", self.failed);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let output_dir = match &cli.output {
        Some(path) => path.clone(),
        None => std::env::current_dir().context("cannot resolve the current directory")?,
    };
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("cannot create output directory {}", output_dir.display()))?;

    let files = collect_dicom_files(&cli.input, cli.max_depth)?;
    if files.is_empty() {
        bail!("no DICOM files found under {}", cli.input.display());
    }
    info!(count = files.len(), "collected input files");

    let options = SrOptions {
        uid_prefix: cli.prefix.as_str().to_owned(),
    };

    let progress = ProgressBar::new(files.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap()
            .progress_chars("#>-"),
    );

    let outcomes: Vec<FileOutcome> = if cli.parallel && files.len() > 1 {
        files
            .par_iter()
            .map(|file| {
                let outcome = convert_file(file, &output_dir, &options);
                progress.inc(1);
                outcome
            })
            .collect()
    } else {
        files
            .iter()
            .map(|file| {
                let outcome = convert_file(file, &output_dir, &options);
                progress.inc(1);
                outcome
            })
            .collect()
    };
    progress.finish_and_clear();

    let summary = RunSummary::tally(cli.prefix.as_str(), outcomes);
    summary.print();

    if cli.manifest {
        let manifest_path = output_dir.join("sr_manifest.json");
        fs::write(&manifest_path, serde_json::to_string_pretty(&summary)?)
            .with_context(|| format!("cannot write manifest {}", manifest_path.display()))?;
        info!(path = %manifest_path.display(), "wrote run manifest");
    }

    if summary.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,dicom_sr={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

fn convert_file(path: &Path, output_dir: &Path, options: &SrOptions) -> FileOutcome {
    let source = path.to_string_lossy().into_owned();
    match try_convert(path, output_dir, options) {
        Ok(Some((sop_instance_uid, output))) => {
            debug!(source = %path.display(), uid = %sop_instance_uid, "report written");
            FileOutcome {
                source,
                status: OutcomeStatus::Converted,
                sop_instance_uid: Some(sop_instance_uid),
                output: Some(output.to_string_lossy().into_owned()),
                detail: None,
            }
        }
        Ok(None) => {
            debug!(source = %path.display(), "not an image object, passing through");
            FileOutcome {
                source,
                status: OutcomeStatus::Skipped,
                sop_instance_uid: None,
                output: None,
                detail: None,
            }
        }
        Err(error) => {
            warn!(source = %path.display(), "conversion failed: {error:#}");
            FileOutcome {
                source,
                status: OutcomeStatus::Failed,
                sop_instance_uid: None,
                output: None,
                detail: Some(format!("{error:#}")),
            }
        }
    }
}

/// Convert one file, returning `None` when the object is not an image.
///
/// Failures leave the source file untouched; no partial report is ever
/// visible in the output directory under its final name.
fn try_convert(
    path: &Path,
    output_dir: &Path,
    options: &SrOptions,
) -> Result<Option<(String, PathBuf)>> {
    let obj = open_file(path)
        .with_context(|| format!("failed to open DICOM file {}", path.display()))?;

    if !is_image(&obj) {
        return Ok(None);
    }

    let sr = report::synthesize(&obj, options)
        .with_context(|| format!("failed to synthesize a report for {}", path.display()))?;

    let sop_instance_uid = sr
        .element(tags::SOP_INSTANCE_UID)
        .ok()
        .and_then(|elem| elem.to_str().ok())
        .map(|uid| uid.trim().to_owned())
        .context("synthesized report carries no SOP Instance UID")?;

    let output = output_dir.join(format!("{sop_instance_uid}.dcm"));
    sr.write_to_file(&output)
        .with_context(|| format!("failed to write report {}", output.display()))?;

    Ok(Some((sop_instance_uid, output)))
}

/// The image predicate: only objects carrying pixel data are converted.
fn is_image(obj: &FileDicomObject<InMemDicomObject>) -> bool {
    obj.element(tags::PIXEL_DATA).is_ok()
}

fn collect_dicom_files(input: &Path, max_depth: usize) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if input.is_file() {
        files.push(input.to_path_buf());
    } else if input.is_dir() {
        for entry in WalkDir::new(input)
            .max_depth(max_depth)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_file() {
                let path = entry.path();
                if is_likely_dicom_file(path) {
                    files.push(path.to_path_buf());
                }
            }
        }
        files.sort();
    } else {
        bail!("input path does not exist: {}", input.display());
    }

    Ok(files)
}

fn is_likely_dicom_file(path: &Path) -> bool {
    if let Some(ext) = path.extension() {
        let ext = ext.to_string_lossy().to_lowercase();
        if matches!(ext.as_str(), "dcm" | "dicom" | "ima" | "img") {
            return true;
        }
    }

    // fall back to the DICM magic code after the 128-byte preamble
    if let Ok(mut file) = File::open(path) {
        let mut buffer = [0u8; 132];
        if file.read_exact(&mut buffer).is_ok() {
            return &buffer[128..132] == b"DICM";
        }
    }

    false
}
