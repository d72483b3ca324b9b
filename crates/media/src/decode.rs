//! Frame decoding through an `ffmpeg` rawvideo pipe.
//!
//! The decoder writes packed `rgb24` frames to stdout, `width * height * 3`
//! bytes each. Seeking restarts the decoder at the target timestamp; the
//! child process is killed when the source is dropped.

use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use image::RgbImage;
use vidsync_common::config::ToolPaths;
use vidsync_common::error::{VidsyncError, VidsyncResult};
use vidsync_core::frame::{Frame, FrameSource, VideoInfo, VideoOpener};

use crate::probe::probe_video;
use crate::process::{read_full, spawn_error};

/// Arguments that decode `path` from `start_secs` as raw RGB on stdout.
///
/// Only the first video stream is decoded and rotation metadata is ignored,
/// so every frame has the size `ffprobe` reported for that stream.
pub fn decode_args(path: &Path, start_secs: f64) -> Vec<String> {
    let mut args = vec![
        "-v".to_string(),
        "error".to_string(),
        "-nostdin".to_string(),
        "-noautorotate".to_string(),
    ];
    if start_secs > 0.0 {
        args.push("-ss".to_string());
        args.push(format!("{start_secs:.6}"));
    }
    args.extend([
        "-i".to_string(),
        path.to_string_lossy().into_owned(),
        "-map".to_string(),
        "0:v:0".to_string(),
        "-an".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "rgb24".to_string(),
        "-".to_string(),
    ]);
    args
}

struct Decoder {
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr_task: Option<JoinHandle<String>>,
}

impl Decoder {
    fn spawn(ffmpeg: &str, path: &Path, start_secs: f64) -> VidsyncResult<Self> {
        let args = decode_args(path, start_secs);
        tracing::debug!(?args, "Starting ffmpeg decoder");
        let mut child = Command::new(ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error("ffmpeg", e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| VidsyncError::decode("failed to capture ffmpeg stdout"))?;
        let stderr_task = child.stderr.take().map(|mut stderr| {
            std::thread::spawn(move || {
                let mut output = String::new();
                match stderr.read_to_string(&mut output) {
                    Ok(_) => output,
                    Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
                }
            })
        });

        Ok(Self {
            child,
            stdout: BufReader::new(stdout),
            stderr_task,
        })
    }

    /// Wait for a decoder whose output ended, surfacing a failed exit.
    fn finish(mut self) -> VidsyncResult<()> {
        let status = self
            .child
            .wait()
            .map_err(|e| VidsyncError::decode(format!("failed to wait on ffmpeg: {e}")))?;
        let stderr = self
            .stderr_task
            .take()
            .and_then(|task| task.join().ok())
            .unwrap_or_default();
        if status.success() {
            Ok(())
        } else {
            Err(VidsyncError::external_tool(
                "ffmpeg",
                status,
                String::new(),
                stderr,
            ))
        }
    }
}

impl Drop for Decoder {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// [`FrameSource`] backed by an `ffmpeg` child process.
pub struct FfmpegFrameSource {
    ffmpeg: String,
    path: PathBuf,
    info: VideoInfo,
    decoder: Option<Decoder>,
    position: u64,
    finished: bool,
}

impl FfmpegFrameSource {
    pub fn new(ffmpeg: impl Into<String>, path: impl Into<PathBuf>, info: VideoInfo) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            path: path.into(),
            info,
            decoder: None,
            position: 0,
            finished: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn frame_bytes(&self) -> usize {
        self.info.width as usize * self.info.height as usize * 3
    }
}

impl FrameSource for FfmpegFrameSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn seek(&mut self, index: u64) -> VidsyncResult<()> {
        self.decoder = None;
        self.position = index;
        self.finished = false;
        Ok(())
    }

    fn next_frame(&mut self) -> VidsyncResult<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }
        if self.decoder.is_none() {
            let start = self.info.clock.index_to_secs(self.position);
            self.decoder = Some(Decoder::spawn(&self.ffmpeg, &self.path, start)?);
        }

        let mut buf = vec![0u8; self.frame_bytes()];
        let filled = match self.decoder.as_mut() {
            Some(decoder) => read_full(&mut decoder.stdout, &mut buf)
                .map_err(|e| VidsyncError::decode(format!("failed reading frame: {e}")))?,
            None => 0,
        };

        if filled < buf.len() {
            self.finished = true;
            if filled > 0 {
                tracing::warn!(
                    frame = self.position,
                    bytes = filled,
                    expected = buf.len(),
                    "Discarding truncated frame at end of stream"
                );
            }
            if let Some(decoder) = self.decoder.take() {
                decoder.finish()?;
            }
            return Ok(None);
        }

        let image = RgbImage::from_raw(self.info.width, self.info.height, buf)
            .ok_or_else(|| VidsyncError::decode("frame buffer does not match dimensions"))?;
        let index = self.position;
        self.position += 1;
        Ok(Some(Frame {
            index,
            timestamp_secs: self.info.clock.index_to_secs(index),
            image,
        }))
    }
}

/// Opens [`FfmpegFrameSource`]s, probing each file first.
#[derive(Debug, Clone)]
pub struct FfmpegVideoOpener {
    ffmpeg: String,
    ffprobe: String,
}

impl FfmpegVideoOpener {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    pub fn from_tools(tools: &ToolPaths) -> Self {
        Self::new(tools.ffmpeg.clone(), tools.ffprobe.clone())
    }
}

impl Default for FfmpegVideoOpener {
    fn default() -> Self {
        Self::from_tools(&ToolPaths::default())
    }
}

impl VideoOpener for FfmpegVideoOpener {
    fn open(&self, path: &Path) -> VidsyncResult<Box<dyn FrameSource>> {
        if !self.exists(path) {
            return Err(VidsyncError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let info = probe_video(&self.ffprobe, path)?;
        Ok(Box::new(FfmpegFrameSource::new(
            self.ffmpeg.clone(),
            path,
            info,
        )))
    }
}
