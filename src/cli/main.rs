//! Design mask CLI tool
//!
//! Command-line interface for deriving background/mask pairs against a
//! filesystem image store.

use super::config::CliConfigBuilder;
use crate::{
    custom_mask::render_preview,
    service::{DesignMaskService, ReplicatedTarget},
    services::{
        png::encode_png, progress::create_cli_progress_reporter, FileSystemImageStore, ImageStore,
    },
    tracing_config::{events, init_cli_tracing, spans},
    types::{CopiedDesign, DesignFileRefs, ImageRef, MaskAdjustment, Rectangle},
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use instant::Instant;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

/// Design-area mask and background derivation
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "design-mask")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Image store directory [default: $DESIGN_MASK_STORE_DIR or the platform data dir]
    #[arg(long, global = true, value_name = "PATH")]
    pub store_dir: Option<PathBuf>,

    /// Number of replication threads (0 = auto-detect)
    #[arg(short, long, global = true, default_value_t = 0)]
    pub threads: usize,

    /// Timeout for fetching http(s) images, in seconds
    #[arg(long, global = true, default_value_t = 30, value_name = "SECONDS")]
    pub timeout: u64,

    /// PNG compression level for written files
    #[arg(long, global = true, value_enum, default_value_t = CliCompression::Default)]
    pub compression: CliCompression,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Emit logs as JSON (requires the tracing-json feature)
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Punch a rectangular design area into an image
    Compose {
        /// Image path, store key or URL
        image: String,

        /// Design area as X,Y,WIDTH,HEIGHT
        #[arg(long, value_name = "X,Y,W,H", allow_hyphen_values = true)]
        rect: Rectangle,
    },

    /// Derive the design area from an operator-supplied mask image
    Custom {
        /// Image path, store key or URL
        image: String,

        /// Custom mask image; dark pixels become the design area
        mask: String,

        /// Mask size as a percentage of its natural size
        #[arg(long)]
        size: Option<f32>,

        /// Horizontal centre as a percentage of the image width
        #[arg(long)]
        x: Option<f32>,

        /// Vertical centre as a percentage of the image height
        #[arg(long)]
        y: Option<f32>,

        /// Overlay opacity for --preview
        #[arg(long)]
        opacity: Option<f32>,

        /// Also write an overlay preview PNG to this path
        #[arg(long, value_name = "PATH")]
        preview: Option<PathBuf>,
    },

    /// Print the design area of a mask image
    Extract {
        /// Mask path, store key or URL
        mask: String,
    },

    /// Clone the design area of a mask onto sibling images
    Replicate {
        /// Seed mask path, store key or URL
        mask: String,

        /// Target images; glob patterns are expanded
        #[arg(required = true)]
        targets: Vec<String>,

        /// Use this design area instead of scanning the seed mask
        #[arg(long, value_name = "X,Y,W,H", allow_hyphen_values = true)]
        rect: Option<Rectangle>,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::Compose { .. } => "compose",
            Self::Custom { .. } => "custom",
            Self::Extract { .. } => "extract",
            Self::Replicate { .. } => "replicate",
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliCompression {
    Default,
    Fast,
    Best,
}

#[derive(Serialize)]
struct DesignOutput<'a> {
    background_ref: &'a ImageRef,
    background_url: Option<String>,
    mask_ref: &'a ImageRef,
    mask_url: Option<String>,
}

#[derive(Serialize)]
struct TargetOutput<'a> {
    target_ref: &'a ImageRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    design: Option<DesignOutput<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<&'static str>,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let session_id =
        init_cli_tracing(cli.verbose, cli.json_logs).context("Failed to initialize tracing")?;
    let command = cli.command.name();
    let span = spans::session(&session_id, command);

    let result = run(cli).instrument(span).await;
    if let Err(e) = &result {
        events::error_with_context(&**e, command);
    }
    result
}

async fn run(cli: Cli) -> Result<()> {
    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;

    let store = FileSystemImageStore::from_config(&config).context("Failed to open image store")?;
    debug!(root = %store.root().display(), "Using image store");

    let service = DesignMaskService::new(store, config).context("Failed to create service")?;

    match &cli.command {
        Command::Compose { image, rect } => {
            let image_ref = ImageRef::from(image.as_str());
            let refs = service
                .create_masked_image(&image_ref, *rect)
                .await
                .with_context(|| format!("Failed to compose design files for {}", image))?;
            print_design(&service, &refs, cli.json)?;
        },

        Command::Custom {
            image,
            mask,
            size,
            x,
            y,
            opacity,
            preview,
        } => {
            let defaults = MaskAdjustment::default();
            let adjustment = MaskAdjustment {
                size_pct: size.unwrap_or(defaults.size_pct),
                x_pct: x.unwrap_or(defaults.x_pct),
                y_pct: y.unwrap_or(defaults.y_pct),
                opacity_pct: opacity.unwrap_or(defaults.opacity_pct),
            };
            adjustment.validate().context("Invalid mask adjustment")?;

            let image_ref = ImageRef::from(image.as_str());
            let mask_ref = ImageRef::from(mask.as_str());

            if let Some(path) = preview {
                write_preview(&service, &image_ref, &mask_ref, &adjustment, path).await?;
            }

            let refs = service
                .create_masked_image_with_custom_mask(&image_ref, &mask_ref, Some(adjustment))
                .await
                .with_context(|| format!("Failed to apply custom mask {} to {}", mask, image))?;
            print_design(&service, &refs, cli.json)?;
        },

        Command::Extract { mask } => {
            let rect = service
                .extract_rectangle_from_mask(&ImageRef::from(mask.as_str()))
                .await
                .with_context(|| format!("Failed to scan mask {}", mask))?;
            print_rectangle(rect, cli.json)?;
        },

        Command::Replicate {
            mask,
            targets,
            rect,
        } => {
            let target_refs = expand_targets(targets)?;
            if target_refs.is_empty() {
                anyhow::bail!("No target images matched");
            }
            info!("Replicating {} onto {} target(s)", mask, target_refs.len());

            let reporter = create_cli_progress_reporter(cli.verbose > 0, target_refs.len());
            let service = service.with_reporter(Arc::from(reporter));

            let cancel = CancellationToken::new();
            let interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted; remaining targets will be skipped");
                    interrupt.cancel();
                }
            });

            let start = Instant::now();
            let replication_span = spans::replication(target_refs.len());

            let mask_ref = ImageRef::from(mask.as_str());
            let outcomes = match rect {
                Some(rect) => {
                    let copied = CopiedDesign {
                        background_ref: mask_ref.clone(),
                        mask_ref,
                        rect: Some(*rect),
                    };
                    service
                        .paste_design_with_cancellation(&copied, &target_refs, &cancel)
                        .instrument(replication_span)
                        .await
                },
                None => {
                    service
                        .replicate_with_cancellation(&mask_ref, &target_refs, &cancel)
                        .instrument(replication_span)
                        .await
                },
            }
            .with_context(|| format!("Failed to replicate design area of {}", mask))?;

            let failed = outcomes.iter().filter(|t| t.result.is_err()).count();
            events::replication_summary(
                outcomes.len() - failed,
                failed,
                start.elapsed().as_millis() as u64,
            );
            print_replication(&service, &outcomes, cli.json)?;

            if failed > 0 {
                anyhow::bail!("{} of {} target(s) failed", failed, outcomes.len());
            }
        },
    }

    Ok(())
}

async fn write_preview<S: ImageStore>(
    service: &DesignMaskService<S>,
    image_ref: &ImageRef,
    mask_ref: &ImageRef,
    adjustment: &MaskAdjustment,
    path: &Path,
) -> Result<()> {
    let start = Instant::now();
    let (source, custom_mask) =
        tokio::try_join!(service.store().load(image_ref), service.store().load(mask_ref))?;
    let preview = render_preview(&source, &custom_mask, adjustment)?;
    let png = encode_png(&preview, service.config().png_compression)?;
    tokio::fs::write(path, png)
        .await
        .with_context(|| format!("Failed to write preview: {}", path.display()))?;

    events::performance_metric("render_preview", start.elapsed().as_millis() as u64);
    events::progress(&format!("Preview written to {}", path.display()), "🖼️");
    Ok(())
}

/// Expand glob patterns; other arguments (paths, keys, URLs) pass through
pub(crate) fn expand_targets(targets: &[String]) -> Result<Vec<ImageRef>> {
    let mut expanded = Vec::new();
    for target in targets {
        let is_pattern = !target.contains("://") && target.contains(['*', '?', '[']);
        if !is_pattern {
            expanded.push(ImageRef::from(target.as_str()));
            continue;
        }

        let mut matches: Vec<PathBuf> = glob::glob(target)
            .with_context(|| format!("Invalid glob pattern: {}", target))?
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(e) => {
                    events::warning_with_recommendation(
                        &format!("Skipping unreadable path: {}", e),
                        "Check file permissions",
                    );
                    None
                },
            })
            .filter(|path| path.is_file())
            .collect();

        if matches.is_empty() {
            warn!("Pattern matched no files: {}", target);
        }
        // Sort for a stable target order
        matches.sort();
        expanded.extend(
            matches
                .into_iter()
                .map(|path| ImageRef::new(path.to_string_lossy().into_owned())),
        );
    }
    Ok(expanded)
}

fn design_output<'a, S: ImageStore>(
    service: &DesignMaskService<S>,
    refs: &'a DesignFileRefs,
) -> DesignOutput<'a> {
    DesignOutput {
        background_ref: &refs.background_ref,
        background_url: service.store().url_for(&refs.background_ref),
        mask_ref: &refs.mask_ref,
        mask_url: service.store().url_for(&refs.mask_ref),
    }
}

fn print_design<S: ImageStore>(
    service: &DesignMaskService<S>,
    refs: &DesignFileRefs,
    json: bool,
) -> Result<()> {
    let output = design_output(service, refs);
    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("background: {}", output.background_url.as_deref().unwrap_or(refs.background_ref.as_str()));
        println!("mask:       {}", output.mask_url.as_deref().unwrap_or(refs.mask_ref.as_str()));
    }
    Ok(())
}

fn print_rectangle(rect: Option<Rectangle>, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&rect)?);
        return Ok(());
    }
    match rect {
        Some(rect) => println!(
            "x={} y={} width={} height={}",
            rect.x, rect.y, rect.width, rect.height
        ),
        None => println!("No design area found"),
    }
    Ok(())
}

fn print_replication<S: ImageStore>(
    service: &DesignMaskService<S>,
    outcomes: &[ReplicatedTarget],
    json: bool,
) -> Result<()> {
    if json {
        let rows: Vec<TargetOutput<'_>> = outcomes
            .iter()
            .map(|t| match &t.result {
                Ok(refs) => TargetOutput {
                    target_ref: &t.target_ref,
                    design: Some(design_output(service, refs)),
                    error: None,
                    error_kind: None,
                },
                Err(e) => TargetOutput {
                    target_ref: &t.target_ref,
                    design: None,
                    error: Some(e.to_string()),
                    error_kind: Some(e.kind()),
                },
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for target in outcomes {
        match &target.result {
            Ok(refs) => println!("✅ {} -> {}", target.target_ref, refs.mask_ref),
            Err(e) => println!("❌ {}: {}", target.target_ref, e),
        }
    }
    let failed = outcomes.iter().filter(|t| t.result.is_err()).count();
    println!(
        "{} succeeded, {} failed",
        outcomes.len() - failed,
        failed
    );
    Ok(())
}
