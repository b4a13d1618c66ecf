//! Command handlers: read text, hand URLs to the downloader, print progress

use crate::cli::{FetchArgs, InputArgs, InteractiveArgs};
use imagefetch::batch::{BatchError, BatchResult, Downloader};
use imagefetch::config::Config;
use imagefetch::extract::{Extraction, RejectedUrl, extract};
use imagefetch::progress::ProgressEvent;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tracing::{error, info, warn};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

const PROMPT: &str = "Enter content (or 'quit' to exit): ";

pub async fn fetch(mut config: Config, args: FetchArgs) -> Result<(), AnyError> {
    apply_overrides(&mut config, args.dir, args.max_retries)?;

    let text = read_input(&args.input).await?;
    let downloader = Arc::new(Downloader::from_config(&config)?);

    let report = download_text(&downloader, &text, &config.output.directory, !args.json).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}

pub async fn interactive(mut config: Config, args: InteractiveArgs) -> Result<(), AnyError> {
    apply_overrides(&mut config, args.dir, None)?;

    // One downloader for the whole session so numbering continues across rounds
    let downloader = Arc::new(Downloader::from_config(&config)?);
    let directory = config.output.directory.clone();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    info!(directory = %directory.display(), "Interactive session started");

    loop {
        print!("{}", PROMPT);
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        let line = line.trim();
        if line.eq_ignore_ascii_case("quit") {
            break;
        }
        if line.is_empty() {
            continue;
        }

        if let Err(e) = download_text(&downloader, line, &directory, true).await {
            error!(error = %e, "Batch failed");
            println!("{}", e);
        }
    }

    info!(metrics = ?downloader.metrics().snapshot(), "Interactive session finished");
    Ok(())
}

pub async fn extract_only(args: InputArgs) -> Result<(), AnyError> {
    let text = read_input(&args).await?;
    let extraction = extract(&text);

    print_rejections(&extraction);
    for candidate in &extraction.candidates {
        println!("{}", candidate);
    }
    if extraction.is_empty() {
        println!("No image URLs found");
    }
    Ok(())
}

/// Everything `fetch --json` prints: skipped links plus the batch, if any ran
#[derive(Debug, Serialize)]
struct FetchReport {
    rejected: Vec<RejectedReport>,
    #[serde(flatten)]
    batch: Option<BatchResult>,
}

#[derive(Debug, Serialize)]
struct RejectedReport {
    url: String,
    reason: String,
}

impl From<&RejectedUrl> for RejectedReport {
    fn from(rejected: &RejectedUrl) -> Self {
        Self {
            url: rejected.raw.clone(),
            reason: rejected.reason.to_string(),
        }
    }
}

/// Run one batch for `text`, echoing progress lines to stdout when `echo`
///
/// The report carries no batch when the text holds no downloadable URL.
async fn download_text(
    downloader: &Arc<Downloader>,
    text: &str,
    directory: &Path,
    echo: bool,
) -> Result<FetchReport, BatchError> {
    let extraction = extract(text);
    if echo {
        print_rejections(&extraction);
    } else {
        for rejected in &extraction.rejected {
            warn!(url = %rejected.raw, reason = %rejected.reason, "Skipping invalid URL");
        }
    }

    let rejected = extraction.rejected.iter().map(RejectedReport::from).collect();

    if extraction.is_empty() {
        if echo {
            println!("No image URLs found");
        }
        return Ok(FetchReport {
            rejected,
            batch: None,
        });
    }

    let mut handle = downloader.submit(extraction.candidates, directory.to_path_buf());
    while let Some(event) = handle.next_event().await {
        if echo {
            println!("{}", event);
        }
    }

    Ok(FetchReport {
        rejected,
        batch: Some(handle.wait().await?),
    })
}

fn print_rejections(extraction: &Extraction) {
    for rejected in &extraction.rejected {
        let event = ProgressEvent::Rejected {
            raw: rejected.raw.clone(),
            reason: rejected.reason.to_string(),
        };
        println!("{}", event);
    }
}

fn apply_overrides(
    config: &mut Config,
    dir: Option<PathBuf>,
    max_retries: Option<u32>,
) -> Result<(), AnyError> {
    if let Some(dir) = dir {
        config.output.directory = dir;
    }
    if let Some(max_retries) = max_retries {
        config.download.max_retries = max_retries;
    }
    config.validate()?;
    Ok(())
}

async fn read_input(args: &InputArgs) -> Result<String, AnyError> {
    if let Some(path) = &args.input {
        return Ok(tokio::fs::read_to_string(path).await?);
    }
    if !args.text.is_empty() {
        return Ok(args.text.join(" "));
    }

    let mut text = String::new();
    tokio::io::stdin().read_to_string(&mut text).await?;
    Ok(text)
}
