//! Batch command - reconcile a directory of documents concurrently.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use docrecon_core::{DocumentPipeline, PdfTextSource, PipelineStage};

use super::{load_config, mime_for_path, open_cache};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Glob pattern of input files, e.g. "inbox/*.pdf"
    #[arg(required = true)]
    pattern: String,

    /// Output directory for per-document JSON results
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Maximum documents processed concurrently
    #[arg(long, default_value = "4")]
    concurrency: usize,

    /// Contact cache file
    #[arg(long)]
    cache_file: Option<PathBuf>,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    if config.our_companies.is_empty() {
        anyhow::bail!(
            "No reference companies configured; pass --config with an our_companies section"
        );
    }

    let files: Vec<PathBuf> = glob::glob(&args.pattern)?
        .filter_map(std::result::Result::ok)
        .collect();
    if files.is_empty() {
        anyhow::bail!("No files match pattern: {}", args.pattern);
    }

    if let Some(dir) = &args.output_dir {
        std::fs::create_dir_all(dir)?;
    }

    let cache = open_cache(&config, args.cache_file.as_ref());
    let pipeline = Arc::new(DocumentPipeline::new(
        config,
        cache,
        Arc::new(PdfTextSource::new()),
        None,
    ));

    let progress = ProgressBar::new(files.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    // Documents are independent; only the contact cache is shared, and the
    // pipeline takes its locks internally.
    let semaphore = Arc::new(tokio::sync::Semaphore::new(args.concurrency.max(1)));
    let mut handles = Vec::with_capacity(files.len());

    for file in files {
        let pipeline = Arc::clone(&pipeline);
        let semaphore = Arc::clone(&semaphore);
        let output_dir = args.output_dir.clone();
        let progress = progress.clone();

        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire().await.expect("semaphore closed");

            let result = async {
                let bytes = std::fs::read(&file)?;
                let outcome = pipeline.process_bytes(&bytes, mime_for_path(&file)).await?;

                if let Some(dir) = &output_dir {
                    let name = file
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "document".to_string());
                    let json = serde_json::to_string_pretty(&outcome.document)?;
                    std::fs::write(dir.join(format!("{}.json", name)), json)?;
                }

                Ok::<PipelineStage, anyhow::Error>(outcome.stage)
            }
            .await;

            progress.inc(1);
            (file, result)
        }));
    }

    let mut processed = 0usize;
    let mut skipped = 0usize;
    let mut failed = 0usize;

    for handle in handles {
        let (file, result) = handle.await?;
        match result {
            Ok(PipelineStage::SkippedNotOurs) => skipped += 1,
            Ok(_) => processed += 1,
            Err(e) => {
                failed += 1;
                warn!("{}: {}", file.display(), e);
            }
        }
    }
    progress.finish_and_clear();

    println!(
        "{} {} processed, {} skipped, {} failed in {:.1}s",
        style("Batch done:").bold(),
        processed,
        skipped,
        failed,
        start.elapsed().as_secs_f32()
    );

    Ok(())
}
