//! Video stream properties via `ffprobe`.

use std::path::Path;
use std::process::Command;

use serde::Deserialize;
use vidsync_common::clock::FrameClock;
use vidsync_common::error::{VidsyncError, VidsyncResult};
use vidsync_core::frame::VideoInfo;

use crate::process::run_captured;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,

    #[serde(default)]
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    #[serde(default)]
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Parse an ffprobe rate such as `"30000/1001"` or `"25"`.
///
/// `"0/0"` and other non-positive rates yield `None`.
pub fn parse_frame_rate(rate: &str) -> Option<f64> {
    let rate = rate.trim();
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

/// Build [`VideoInfo`] from `ffprobe -print_format json -show_streams -show_format`.
pub fn parse_probe_json(json: &str) -> VidsyncResult<VideoInfo> {
    let probe: ProbeOutput = serde_json::from_str(json)?;
    let stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref().map_or(true, |t| t == "video"))
        .ok_or_else(|| VidsyncError::unsupported("input has no video stream"))?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(VidsyncError::decode("video stream has no dimensions")),
    };

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .ok_or_else(|| VidsyncError::decode("video stream has no frame rate"))?;
    let clock = FrameClock::new(fps)?;

    let duration = stream
        .duration
        .as_deref()
        .or_else(|| probe.format.as_ref().and_then(|f| f.duration.as_deref()))
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0);
    let frame_count = stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.trim().parse::<u64>().ok())
        .filter(|n| *n > 0)
        .or_else(|| duration.map(|d| (d * fps).round() as u64));

    Ok(VideoInfo {
        width,
        height,
        clock,
        frame_count,
    })
}

/// Probe the first video stream of `path`.
pub fn probe_video(ffprobe: &str, path: &Path) -> VidsyncResult<VideoInfo> {
    let captured = run_captured(
        Command::new(ffprobe)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_streams",
                "-show_format",
                "-print_format",
                "json",
            ])
            .arg(path),
        "ffprobe",
    )?;
    let info = parse_probe_json(&captured.stdout)?;
    tracing::debug!(
        path = %path.display(),
        width = info.width,
        height = info.height,
        fps = info.fps(),
        frames = ?info.frame_count,
        "Probed video"
    );
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.001);
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("abc"), None);
    }

    #[test]
    fn test_parse_probe_json() {
        let json = r#"{
            "streams": [{
                "codec_type": "video",
                "width": 1920,
                "height": 1080,
                "avg_frame_rate": "30/1",
                "r_frame_rate": "30/1",
                "nb_frames": "300",
                "duration": "10.000000"
            }],
            "format": {"duration": "10.050000"}
        }"#;
        let info = parse_probe_json(json).unwrap();
        assert_eq!((info.width, info.height), (1920, 1080));
        assert_eq!(info.fps(), 30.0);
        assert_eq!(info.frame_count, Some(300));
    }

    #[test]
    fn test_avg_rate_falls_back_to_r_frame_rate() {
        let json = r#"{"streams": [{
            "width": 640, "height": 360,
            "avg_frame_rate": "0/0", "r_frame_rate": "25/1"
        }], "format": {"duration": "4.0"}}"#;
        let info = parse_probe_json(json).unwrap();
        assert_eq!(info.fps(), 25.0);
        assert_eq!(info.frame_count, Some(100));
    }

    #[test]
    fn test_missing_video_stream() {
        let json = r#"{"streams": [{"codec_type": "audio"}]}"#;
        assert!(matches!(
            parse_probe_json(json),
            Err(VidsyncError::Unsupported { .. })
        ));
        assert!(matches!(
            parse_probe_json("{}"),
            Err(VidsyncError::Unsupported { .. })
        ));
    }
}
