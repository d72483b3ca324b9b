//! Align a distorted video to its reference and run VMAF.

use std::path::{Path, PathBuf};

use anyhow::Context;
use vidsync_common::clock::RunClock;
use vidsync_common::config::AppConfig;
use vidsync_common::error::VidsyncResult;
use vidsync_core::marker::MarkerReader;
use vidsync_core::pipeline::{
    AlignmentPipeline, PipelineContext, PipelineRun, QualityMetricTool, SyncSettings,
};
use vidsync_media::{
    DirectoryArtifactSink, EasyVmafRunner, FfmpegTrimmer, FfmpegVideoOpener, TesseractRecognizer,
};
use vidsync_model::report::QualityReport;
use vidsync_model::sync::AlignmentOffset;

/// Per-run output locations.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultsLayout {
    pub dir: PathBuf,
    pub trimmed: PathBuf,
    pub log: PathBuf,
    pub events: PathBuf,
    pub result: PathBuf,
}

impl ResultsLayout {
    /// `<output_dir>/vmaf_results_<stem>_<stamp>/` for the distorted input.
    pub fn new(output_dir: &Path, distorted: &Path, stamp: &str) -> Self {
        let dir = output_dir.join(format!("vmaf_results_{}_{stamp}", file_stem(distorted)));
        Self {
            trimmed: dir.join(trimmed_name(distorted)),
            log: dir.join("results.log"),
            events: dir.join("events.jsonl"),
            result: dir.join("pipeline_result.json"),
            dir,
        }
    }

    pub fn create(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string())
}

/// `<stem>-trimmed<.ext>`, keeping the container of the input.
pub fn trimmed_name(distorted: &Path) -> String {
    match distorted.extension() {
        Some(ext) => format!("{}-trimmed.{}", file_stem(distorted), ext.to_string_lossy()),
        None => format!("{}-trimmed", file_stem(distorted)),
    }
}

/// Metric tool used with `--skip-vmaf`.
struct SkippedMetric;

impl QualityMetricTool for SkippedMetric {
    fn compare(
        &self,
        _reference: &Path,
        _distorted: &Path,
        offset: &AlignmentOffset,
    ) -> VidsyncResult<Vec<PathBuf>> {
        tracing::info!(offset_secs = offset.seconds, "VMAF analysis skipped");
        Ok(Vec::new())
    }
}

pub struct AlignArgs {
    pub reference: PathBuf,
    pub distorted: PathBuf,
    pub seek_distorted_secs: f64,
    pub skip_vmaf: bool,
}

pub fn run(
    config: &AppConfig,
    args: AlignArgs,
    layout: &ResultsLayout,
    clock: &RunClock,
) -> anyhow::Result<()> {
    println!("VidSync Alignment");
    println!("{}", "=".repeat(50));
    println!("  Reference: {}", args.reference.display());
    println!("  Distorted: {}", args.distorted.display());
    println!("  Results:   {}", layout.dir.display());
    println!();

    let ctx = PipelineContext::new(&args.reference, &args.distorted, &layout.trimmed)
        .with_buffer(config.sync.buffer_secs)
        .with_seek(args.seek_distorted_secs)
        .with_settings(SyncSettings::from(&config.sync));

    let metric: Box<dyn QualityMetricTool> = if args.skip_vmaf {
        Box::new(SkippedMetric)
    } else {
        Box::new(EasyVmafRunner::from_tools(&config.tools))
    };
    let mut pipeline = AlignmentPipeline::new(
        Box::new(FfmpegVideoOpener::from_tools(&config.tools)),
        MarkerReader::new(Box::new(TesseractRecognizer::from_tools(&config.tools))),
        Box::new(FfmpegTrimmer::from_tools(&config.tools)),
        metric,
    )
    .with_artifacts(Box::new(DirectoryArtifactSink::new(&layout.dir)));

    let run = pipeline.run(&ctx).context("Alignment could not start")?;
    write_outputs(&run, layout)?;

    if run.result.success {
        if let Err(e) = copy_input(&args.distorted, &layout.dir) {
            tracing::warn!(error = %e, "Failed to copy distorted file (continuing anyway)");
        }
        for report in &run.result.report_paths {
            match summarise_report(report) {
                Ok(csv) => tracing::info!(csv = %csv.display(), "VMAF summary written"),
                Err(e) => tracing::warn!(
                    report = %report.display(),
                    error = %e,
                    "Failed to summarise VMAF report (continuing anyway)"
                ),
            }
        }
    }

    print_summary(&run, layout, clock);

    if !run.result.success {
        let message = match (&run.error, &run.result.failure) {
            (Some(err), _) => err.to_string(),
            (None, Some(failure)) => failure.message.clone(),
            (None, None) => "unknown failure".to_string(),
        };
        anyhow::bail!("Alignment failed: {message}");
    }
    Ok(())
}

fn write_outputs(run: &PipelineRun, layout: &ResultsLayout) -> anyhow::Result<()> {
    let events = run.events.to_jsonl()?;
    std::fs::write(&layout.events, events)
        .with_context(|| format!("Failed to write {}", layout.events.display()))?;

    let result = serde_json::to_string_pretty(&run.result)?;
    std::fs::write(&layout.result, result)
        .with_context(|| format!("Failed to write {}", layout.result.display()))?;
    Ok(())
}

/// Copy `input` into `dir` under its own file name.
pub fn copy_input(input: &Path, dir: &Path) -> anyhow::Result<PathBuf> {
    let name = input
        .file_name()
        .with_context(|| format!("No file name: {}", input.display()))?;
    let target = dir.join(name);
    let bytes = std::fs::copy(input, &target)
        .with_context(|| format!("Failed to copy {}", input.display()))?;
    tracing::info!(
        target = %target.display(),
        size_mb = bytes as f64 / (1024.0 * 1024.0),
        "Distorted file copied"
    );
    Ok(target)
}

/// Write `<report stem>_summary.csv` next to `report`.
pub fn summarise_report(report: &Path) -> anyhow::Result<PathBuf> {
    let parsed = QualityReport::load(report)?;
    let csv = report.with_file_name(format!("{}_summary.csv", file_stem(report)));
    std::fs::write(&csv, parsed.to_csv())?;
    if let Some(mean) = parsed.mean_score() {
        tracing::info!(frames = parsed.scores.len(), mean, "VMAF scores");
    }
    Ok(csv)
}

fn print_summary(run: &PipelineRun, layout: &ResultsLayout, clock: &RunClock) {
    let result = &run.result;
    println!();
    println!("Summary:");
    match &result.sync_point {
        Some(sync) => println!(
            "  Sync point: frame {} at {:.3}s ({})",
            sync.frame_index, sync.timestamp_secs, sync.method
        ),
        None => println!("  Sync point: none"),
    }
    if let Some(trim) = &result.trim {
        println!("  Trim start: {}s", trim.seek_arg());
    }
    let offset = &result.alignment_offset;
    match (offset.marker, offset.reference_frame) {
        (Some(marker), Some(frame)) => println!(
            "  Offset:     {:.6}s (marker {marker} at reference frame {frame})",
            offset.seconds
        ),
        (Some(marker), None) => println!(
            "  Offset:     {:.6}s (marker {marker} not found in reference)",
            offset.seconds
        ),
        _ => println!("  Offset:     {:.6}s (no marker read)", offset.seconds),
    }
    for degradation in &result.degradations {
        println!("  [WARN] {}: {}", degradation.stage, degradation.reason);
    }
    for report in &result.report_paths {
        println!("  Report:     {}", report.display());
    }
    if let Some(failure) = &result.failure {
        println!("  [FAIL] {}: {}", failure.stage, failure.message);
    }
    println!();
    println!("  Results directory: {}", layout.dir.display());
    println!("  Log:               {}", layout.log.display());
    if result.trimmed_path.is_some() {
        println!("  Trimmed video:     {}", layout.trimmed.display());
    }
    println!("  Total time:        {:.1}s", clock.elapsed_secs());
}
