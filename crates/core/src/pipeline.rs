//! Alignment pipeline.
//!
//! Runs one (reference, distorted) pair through five stages in strict order:
//!
//! 1. **Sync search**: marker transition, falling back to frame difference
//! 2. **Trim**: stream-copy the distorted input from the sync point plus buffer
//! 3. **Post-trim read**: marker on the first trimmed frame
//! 4. **Reference locate**: find that marker in the reference
//! 5. **Metric invoke**: hand both paths and the offset to the metric tool
//!
//! Trim and metric failures abort the run. Failures in stages 3 and 4
//! degrade the alignment offset to `0.0` and the run continues. Every stage
//! opens its own video handle and drops it before the next stage starts.

use std::path::{Path, PathBuf};

use image::DynamicImage;
use vidsync_common::config::SyncDefaults;
use vidsync_common::error::{VidsyncError, VidsyncResult};
use vidsync_model::event::{EventKind, EventLog, Stage, SyncEvent};
use vidsync_model::sync::{
    AlignmentOffset, Degradation, PipelineResult, StageFailure, SyncMethod, SyncPoint, TrimSpec,
};

use crate::artifacts::{persist, ArtifactSink, NullArtifactSink};
use crate::difference::DifferenceSyncFinder;
use crate::frame::{BrightnessStats, VideoOpener};
use crate::locator::FrameLocator;
use crate::marker::MarkerReader;
use crate::scan::ScanContext;
use crate::transition::{TransitionConfig, TransitionSyncFinder};

/// Stream-copying transcoder used for the trim stage.
pub trait Transcoder {
    /// Write `input` from `trim.start_secs` onward to `output`.
    fn trim(&self, input: &Path, output: &Path, trim: &TrimSpec) -> VidsyncResult<()>;
}

/// External quality-metric tool.
pub trait QualityMetricTool {
    /// Compare `distorted` against `reference` starting at `offset`.
    ///
    /// Returns the paths of the structured reports the tool produced.
    fn compare(
        &self,
        reference: &Path,
        distorted: &Path,
        offset: &AlignmentOffset,
    ) -> VidsyncResult<Vec<PathBuf>>;
}

/// Scan parameters shared by the search stages.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    pub confidence_threshold: f64,
    pub transition_window_secs: f64,
    pub difference_window_secs: f64,
    pub locate_window_secs: f64,
    pub confirm_frames: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from(&SyncDefaults::default())
    }
}

impl From<&SyncDefaults> for SyncSettings {
    fn from(defaults: &SyncDefaults) -> Self {
        Self {
            confidence_threshold: f64::from(defaults.confidence_threshold),
            transition_window_secs: defaults.transition_window_secs,
            difference_window_secs: defaults.difference_window_secs,
            locate_window_secs: defaults.locate_window_secs,
            confirm_frames: defaults.confirm_frames,
        }
    }
}

impl SyncSettings {
    fn transition(&self) -> TransitionConfig {
        TransitionConfig {
            confidence_threshold: self.confidence_threshold,
            window_secs: self.transition_window_secs,
            confirm_frames: self.confirm_frames,
        }
    }
}

/// Inputs of one run. Never mutated by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineContext {
    pub reference_path: PathBuf,
    pub distorted_path: PathBuf,

    /// Where the trim stage writes its output.
    pub trimmed_path: PathBuf,

    pub buffer_secs: f64,
    pub seek_distorted_secs: f64,
    pub settings: SyncSettings,
}

impl PipelineContext {
    pub fn new(
        reference_path: impl Into<PathBuf>,
        distorted_path: impl Into<PathBuf>,
        trimmed_path: impl Into<PathBuf>,
    ) -> Self {
        let settings = SyncSettings::default();
        Self {
            reference_path: reference_path.into(),
            distorted_path: distorted_path.into(),
            trimmed_path: trimmed_path.into(),
            buffer_secs: SyncDefaults::default().buffer_secs,
            seek_distorted_secs: 0.0,
            settings,
        }
    }

    pub fn with_buffer(mut self, buffer_secs: f64) -> Self {
        self.buffer_secs = buffer_secs;
        self
    }

    pub fn with_seek(mut self, seek_distorted_secs: f64) -> Self {
        self.seek_distorted_secs = seek_distorted_secs;
        self
    }

    pub fn with_settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// Outcome of [`AlignmentPipeline::run`].
#[derive(Debug)]
pub struct PipelineRun {
    pub result: PipelineResult,
    pub events: EventLog,

    /// The error that aborted the run, when `result.success` is false.
    pub error: Option<VidsyncError>,
}

/// A stage that could not produce its value but does not abort the run.
#[derive(Debug)]
struct SoftFailure(String);

/// Sync search with fallback: transition first, frame difference otherwise.
///
/// Opens `path` once per search method. Only a failure to open the stream
/// is an error; a transition scan that errors mid-way falls back.
pub fn find_sync_point(
    opener: &dyn VideoOpener,
    scan: &mut ScanContext<'_>,
    path: &Path,
    seek_secs: f64,
    settings: &SyncSettings,
) -> VidsyncResult<SyncPoint> {
    let found = {
        let mut source = opener.open(path)?;
        let info = *source.info();
        tracing::info!(
            path = %path.display(),
            width = info.width,
            height = info.height,
            fps = info.fps(),
            frames = ?info.frame_count,
            "Opened distorted video"
        );
        let finder = TransitionSyncFinder::new(settings.transition());
        match finder.find(source.as_mut(), scan, seek_secs) {
            Ok(found) => found,
            Err(err) => {
                tracing::warn!(error = %err, "Transition search aborted");
                None
            }
        }
    };
    if let Some(sync) = found {
        return Ok(sync);
    }

    tracing::warn!("Could not find sync point automatically, using frame difference fallback");
    let mut source = opener.open(path)?;
    Ok(DifferenceSyncFinder::new(settings.difference_window_secs).find(
        source.as_mut(),
        seek_secs,
        scan.events,
    ))
}

/// Locate `marker` in the video at `path`.
///
/// Returns the alignment offset using the stream's measured frame rate.
pub fn locate_marker(
    opener: &dyn VideoOpener,
    scan: &mut ScanContext<'_>,
    path: &Path,
    marker: u64,
    window_secs: f64,
) -> VidsyncResult<Option<AlignmentOffset>> {
    let mut source = opener.open(path)?;
    let fps = source.info().fps();
    let index = FrameLocator::new(window_secs).locate(source.as_mut(), scan, marker)?;
    Ok(index.map(|index| AlignmentOffset::located(marker, index, fps)))
}

/// Five-stage alignment of a distorted encode to its reference.
pub struct AlignmentPipeline {
    opener: Box<dyn VideoOpener>,
    reader: MarkerReader,
    transcoder: Box<dyn Transcoder>,
    metric: Box<dyn QualityMetricTool>,
    artifacts: Box<dyn ArtifactSink>,
}

impl AlignmentPipeline {
    pub fn new(
        opener: Box<dyn VideoOpener>,
        reader: MarkerReader,
        transcoder: Box<dyn Transcoder>,
        metric: Box<dyn QualityMetricTool>,
    ) -> Self {
        Self {
            opener,
            reader,
            transcoder,
            metric,
            artifacts: Box::new(NullArtifactSink),
        }
    }

    /// Route diagnostic frames to `artifacts`.
    pub fn with_artifacts(mut self, artifacts: Box<dyn ArtifactSink>) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// Run all stages for one input pair.
    ///
    /// A missing input is returned as `Err` before any stage runs. Every
    /// other outcome, including a hard stage failure, is an `Ok` run whose
    /// result and event log describe what happened.
    pub fn run(&mut self, ctx: &PipelineContext) -> VidsyncResult<PipelineRun> {
        for path in [&ctx.reference_path, &ctx.distorted_path] {
            if !self.opener.exists(path) {
                tracing::error!(path = %path.display(), "Input video not found");
                return Err(VidsyncError::FileNotFound { path: path.clone() });
            }
        }

        tracing::info!(
            reference = %ctx.reference_path.display(),
            distorted = %ctx.distorted_path.display(),
            buffer_secs = ctx.buffer_secs,
            seek_secs = ctx.seek_distorted_secs,
            recognizer = self.reader.recognizer_name(),
            "Starting alignment"
        );

        let mut events = EventLog::new();
        let mut result = PipelineResult {
            success: false,
            alignment_offset: AlignmentOffset::default(),
            sync_method: None,
            sync_point: None,
            trim: None,
            trimmed_path: None,
            report_paths: Vec::new(),
            degradations: Vec::new(),
            failure: None,
        };

        let sync = match self.sync_search(ctx, &mut events) {
            Ok(sync) => sync,
            Err(err) => return Ok(abort(result, events, Stage::SyncSearch, err)),
        };
        result.sync_point = Some(sync);
        result.sync_method = Some(sync.method);
        if sync.method == SyncMethod::FallbackDifference {
            degrade(
                &mut result,
                &mut events,
                Stage::SyncSearch,
                "no marker transition found; sync taken from frame difference".to_string(),
            );
        }

        let trim = TrimSpec::from_sync(sync.timestamp_secs, ctx.buffer_secs);
        result.trim = Some(trim);
        if let Err(err) = self.trim_stage(ctx, &trim, &mut events) {
            return Ok(abort(result, events, Stage::Trim, err));
        }
        result.trimmed_path = Some(ctx.trimmed_path.clone());

        let offset = match self.post_trim_read(ctx, &mut events) {
            Ok(marker) => match self.reference_locate(ctx, marker, &mut events) {
                Ok(offset) => offset,
                Err(SoftFailure(reason)) => {
                    degrade(&mut result, &mut events, Stage::ReferenceLocate, reason);
                    AlignmentOffset::degraded(Some(marker))
                }
            },
            Err(SoftFailure(reason)) => {
                degrade(&mut result, &mut events, Stage::PostTrimRead, reason);
                AlignmentOffset::degraded(None)
            }
        };
        result.alignment_offset = offset;

        tracing::info!(offset_secs = offset.seconds, "Invoking quality metric");
        match self
            .metric
            .compare(&ctx.reference_path, &ctx.trimmed_path, &offset)
        {
            Ok(reports) => {
                events.push(SyncEvent::stage(Stage::MetricInvoke, EventKind::StageCompleted));
                result.report_paths = reports;
            }
            Err(err) => return Ok(abort(result, events, Stage::MetricInvoke, err)),
        }

        result.success = true;
        tracing::info!(
            method = %sync.method,
            offset_secs = offset.seconds,
            degradations = result.degradations.len(),
            "Alignment complete"
        );
        Ok(PipelineRun {
            result,
            events,
            error: None,
        })
    }

    fn scan<'a>(&'a mut self, events: &'a mut EventLog) -> (ScanContext<'a>, &'a dyn VideoOpener) {
        (
            ScanContext::new(&mut self.reader, events, self.artifacts.as_ref()),
            self.opener.as_ref(),
        )
    }

    fn sync_search(
        &mut self,
        ctx: &PipelineContext,
        events: &mut EventLog,
    ) -> VidsyncResult<SyncPoint> {
        let (mut scan, opener) = self.scan(events);
        let sync = find_sync_point(
            opener,
            &mut scan,
            &ctx.distorted_path,
            ctx.seek_distorted_secs,
            &ctx.settings,
        )?;
        tracing::info!(
            method = %sync.method,
            frame = sync.frame_index,
            secs = sync.timestamp_secs,
            "Sync point found"
        );
        events.push(SyncEvent::frame(
            Stage::SyncSearch,
            sync.frame_index,
            sync.timestamp_secs,
            None,
            EventKind::StageCompleted,
        ));
        Ok(sync)
    }

    fn trim_stage(
        &self,
        ctx: &PipelineContext,
        trim: &TrimSpec,
        events: &mut EventLog,
    ) -> VidsyncResult<()> {
        tracing::info!(
            start = %trim.seek_arg(),
            output = %ctx.trimmed_path.display(),
            "Trimming distorted video"
        );
        self.transcoder
            .trim(&ctx.distorted_path, &ctx.trimmed_path, trim)?;
        if !self.opener.exists(&ctx.trimmed_path) {
            return Err(VidsyncError::pipeline(format!(
                "trimmed output missing or empty: {}",
                ctx.trimmed_path.display()
            )));
        }
        events.push(SyncEvent::stage(Stage::Trim, EventKind::StageCompleted));
        Ok(())
    }

    fn post_trim_read(
        &mut self,
        ctx: &PipelineContext,
        events: &mut EventLog,
    ) -> Result<u64, SoftFailure> {
        let frame = {
            let mut source = self
                .opener
                .open(&ctx.trimmed_path)
                .map_err(|err| SoftFailure(format!("could not open trimmed video: {err}")))?;
            match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => return Err(SoftFailure("trimmed video has no frames".to_string())),
                Err(err) => {
                    return Err(SoftFailure(format!(
                        "could not read first trimmed frame: {err}"
                    )))
                }
            }
        };

        persist(
            self.artifacts.as_ref(),
            "trimmed_first_frame.png",
            DynamicImage::ImageRgb8(frame.image.clone()),
        );

        let detection = self.reader.detect(&frame.image);
        events.push(SyncEvent::frame(
            Stage::PostTrimRead,
            frame.index,
            frame.timestamp_secs,
            Some(detection),
            EventKind::FrameScanned,
        ));
        if let Some(marker) = detection.marker {
            tracing::info!(marker, confidence = detection.confidence, "First trimmed frame marker");
            return Ok(marker);
        }

        tracing::warn!("Could not detect frame number in first trimmed frame");
        let gray = frame.to_gray();
        let stats = BrightnessStats::of(&gray);
        tracing::info!(
            mean = stats.mean,
            max = stats.max,
            white_pixels = stats.white_pixels,
            total_pixels = stats.total_pixels,
            white_percent = stats.white_percent(),
            "First trimmed frame brightness"
        );
        let gray = DynamicImage::ImageLuma8(gray);
        persist(
            self.artifacts.as_ref(),
            "debug_trimmed_first_frame_gray.png",
            gray.clone(),
        );

        let retry = self.reader.detect(&gray.to_rgb8());
        events.push(SyncEvent::frame(
            Stage::PostTrimRead,
            frame.index,
            frame.timestamp_secs,
            Some(retry),
            EventKind::FrameScanned,
        ));
        // Diagnostic only: the offset never comes from the grayscale read.
        match retry.marker {
            Some(marker) => tracing::info!(
                marker,
                confidence = retry.confidence,
                "Grayscale frame shows a marker the color read missed"
            ),
            None => tracing::info!("Grayscale frame shows no marker either"),
        }
        Err(SoftFailure(
            "no marker on first trimmed frame".to_string(),
        ))
    }

    fn reference_locate(
        &mut self,
        ctx: &PipelineContext,
        marker: u64,
        events: &mut EventLog,
    ) -> Result<AlignmentOffset, SoftFailure> {
        let window = ctx.settings.locate_window_secs;
        let (mut scan, opener) = self.scan(events);
        let located = locate_marker(opener, &mut scan, &ctx.reference_path, marker, window)
            .map_err(|err| SoftFailure(format!("reference scan failed: {err}")))?;
        let offset = located.ok_or_else(|| {
            SoftFailure(format!(
                "marker {marker} not found in first {window}s of reference"
            ))
        })?;
        tracing::info!(
            marker,
            reference_frame = ?offset.reference_frame,
            fps = ?offset.reference_fps,
            offset_secs = offset.seconds,
            "Reference offset computed"
        );
        events.push(SyncEvent::stage(
            Stage::ReferenceLocate,
            EventKind::StageCompleted,
        ));
        Ok(offset)
    }
}

fn degrade(result: &mut PipelineResult, events: &mut EventLog, stage: Stage, reason: String) {
    tracing::warn!(%stage, %reason, "Stage degraded");
    events.push(SyncEvent::stage(
        stage,
        EventKind::Degraded {
            reason: reason.clone(),
        },
    ));
    result.degradations.push(Degradation { stage, reason });
}

fn abort(
    mut result: PipelineResult,
    mut events: EventLog,
    stage: Stage,
    err: VidsyncError,
) -> PipelineRun {
    let message = err.to_string();
    tracing::error!(%stage, error = %message, "Stage failed, aborting");
    events.push(SyncEvent::stage(
        stage,
        EventKind::StageFailed {
            message: message.clone(),
        },
    ));
    result.success = false;
    result.failure = Some(StageFailure { stage, message });
    PipelineRun {
        result,
        events,
        error: Some(err),
    }
}
