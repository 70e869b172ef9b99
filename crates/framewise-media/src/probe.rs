//! Source video properties via FFprobe.
//!
//! Every field of [`VideoProperties`] is optional; anything FFprobe omits or
//! reports as zero stays `None` and the planners fall back to their caps.

use std::ffi::OsString;
use std::path::Path;

use framewise_core::VideoProperties;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::error::{MediaError, Result, ToolStage};
use crate::tool::ToolRunner;

// ============================================================================
// FFprobe Output
// ============================================================================

/// Raw FFprobe stream data.
#[derive(Debug, Deserialize)]
struct FfprobeStream {
	codec_type: String,
	#[serde(default)]
	duration: Option<String>,
	#[serde(default)]
	r_frame_rate: Option<String>,
	#[serde(default)]
	avg_frame_rate: Option<String>,
	#[serde(default)]
	width: Option<u32>,
	#[serde(default)]
	height: Option<u32>,
	#[serde(default)]
	sample_rate: Option<String>,
}

/// Raw FFprobe format data.
#[derive(Debug, Deserialize)]
struct FfprobeFormat {
	#[serde(default)]
	duration: Option<String>,
}

/// Raw FFprobe output.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
	#[serde(default)]
	streams: Vec<FfprobeStream>,
	#[serde(default)]
	format: Option<FfprobeFormat>,
}

// ============================================================================
// Probing
// ============================================================================

/// FFprobe arguments for one input.
#[must_use]
pub fn probe_args(video_path: &Path) -> Vec<OsString> {
	let mut args: Vec<OsString> = [
		"-v",
		"error",
		"-show_entries",
		"stream=codec_type,duration,r_frame_rate,avg_frame_rate,width,height,sample_rate:format=duration",
		"-of",
		"json",
	]
	.iter()
	.map(OsString::from)
	.collect();
	args.push(video_path.as_os_str().to_os_string());
	args
}

/// Read source properties from a video file.
///
/// # Errors
///
/// Returns [`MediaError::VideoNotFound`] for a missing file,
/// [`MediaError::InvalidVideo`] if FFprobe rejects it,
/// [`MediaError::NoVideoStream`] if it has no video track, and
/// [`MediaError::ToolNotFound`] if FFprobe is not installed.
#[instrument(skip_all, fields(video = %video_path.as_ref().display()))]
pub async fn probe_video_properties(
	runner: &ToolRunner,
	video_path: impl AsRef<Path>,
) -> Result<VideoProperties> {
	let video_path = video_path.as_ref();

	if !tokio::fs::try_exists(video_path).await? {
		return Err(MediaError::VideoNotFound(video_path.to_path_buf()));
	}

	let output = match runner.run(ToolStage::Probe, &probe_args(video_path)).await {
		Ok(output) => output,
		Err(MediaError::ToolFailed { diagnostics, .. }) => {
			return Err(MediaError::InvalidVideo {
				path: video_path.to_path_buf(),
				diagnostics,
			});
		}
		Err(e) => return Err(e),
	};

	let properties = parse_probe_output(&output.stdout)?
		.ok_or_else(|| MediaError::NoVideoStream(video_path.to_path_buf()))?;
	debug!(?properties, "Probed video properties");
	Ok(properties)
}

/// Parse FFprobe JSON. Returns `None` when there is no video stream.
///
/// # Errors
///
/// Returns [`MediaError::ProbeParse`] for malformed JSON.
pub fn parse_probe_output(json: &[u8]) -> Result<Option<VideoProperties>> {
	let probe: FfprobeOutput = serde_json::from_slice(json)?;

	let Some(video) = probe.streams.iter().find(|s| s.codec_type == "video") else {
		return Ok(None);
	};
	let audio = probe.streams.iter().find(|s| s.codec_type == "audio");

	// Stream duration first, container duration second
	let duration_seconds = parse_positive(video.duration.as_deref()).or_else(|| {
		probe
			.format
			.as_ref()
			.and_then(|f| parse_positive(f.duration.as_deref()))
	});

	// Average rate is the real cadence for variable-rate sources
	let frame_rate = parse_frame_rate(video.avg_frame_rate.as_deref())
		.or_else(|| parse_frame_rate(video.r_frame_rate.as_deref()));

	let audio_sample_rate = audio
		.and_then(|a| a.sample_rate.as_deref())
		.and_then(|r| r.trim().parse::<u32>().ok())
		.filter(|&r| r > 0);

	Ok(Some(VideoProperties {
		duration_seconds,
		width: video.width.filter(|&w| w > 0),
		height: video.height.filter(|&h| h > 0),
		frame_rate,
		audio_sample_rate,
	}))
}

fn parse_positive(value: Option<&str>) -> Option<f64> {
	value
		.and_then(|v| v.trim().parse::<f64>().ok())
		.filter(|v| v.is_finite() && *v > 0.0)
}

/// Parse FFprobe's rational ("30000/1001") or plain rate.
fn parse_frame_rate(value: Option<&str>) -> Option<f64> {
	let value = value?.trim();
	let rate = match value.split_once('/') {
		Some((num, den)) => {
			let num: f64 = num.parse().ok()?;
			let den: f64 = den.parse().ok()?;
			if den > 0.0 {
				num / den
			} else {
				return None;
			}
		}
		None => value.parse().ok()?,
	};
	(rate.is_finite() && rate > 0.0).then_some(rate)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_full_probe() {
		let json = br#"{
			"streams": [
				{"codec_type": "video", "r_frame_rate": "30000/1001", "avg_frame_rate": "30000/1001",
				 "width": 1920, "height": 1080, "duration": "12.5"},
				{"codec_type": "audio", "sample_rate": "44100", "duration": "12.4"}
			],
			"format": {"duration": "12.6"}
		}"#;
		let props = parse_probe_output(json).unwrap().unwrap();
		assert_eq!(props.width, Some(1920));
		assert_eq!(props.height, Some(1080));
		assert_eq!(props.duration_seconds, Some(12.5));
		assert!((props.frame_rate.unwrap() - 29.97).abs() < 0.01);
		assert_eq!(props.audio_sample_rate, Some(44_100));
	}

	#[test]
	fn test_parse_missing_fields() {
		let json = br#"{
			"streams": [{"codec_type": "video", "avg_frame_rate": "0/0", "r_frame_rate": "25/1"}],
			"format": {"duration": "N/A"}
		}"#;
		let props = parse_probe_output(json).unwrap().unwrap();
		assert_eq!(props.duration_seconds, None);
		assert_eq!(props.width, None);
		assert_eq!(props.frame_rate, Some(25.0));
		assert_eq!(props.audio_sample_rate, None);
	}

	#[test]
	fn test_parse_format_duration_fallback() {
		let json = br#"{"streams": [{"codec_type": "video"}], "format": {"duration": "42.0"}}"#;
		let props = parse_probe_output(json).unwrap().unwrap();
		assert_eq!(props.duration_seconds, Some(42.0));
	}

	#[test]
	fn test_parse_audio_only() {
		let json = br#"{"streams": [{"codec_type": "audio", "sample_rate": "48000"}]}"#;
		assert!(parse_probe_output(json).unwrap().is_none());
	}

	#[test]
	fn test_parse_malformed() {
		assert!(matches!(parse_probe_output(b"not json"), Err(MediaError::ProbeParse(_))));
	}

	#[test]
	fn test_parse_frame_rate() {
		assert_eq!(parse_frame_rate(Some("60")), Some(60.0));
		assert_eq!(parse_frame_rate(Some("24/0")), None);
		assert_eq!(parse_frame_rate(Some("abc")), None);
		assert_eq!(parse_frame_rate(None), None);
	}

	#[test]
	fn test_probe_args_end_with_input() {
		let args = probe_args(Path::new("clip.mp4"));
		assert_eq!(args.last().unwrap(), "clip.mp4");
		assert!(args.iter().any(|a| a == "json"));
	}

	#[tokio::test]
	async fn test_probe_missing_video() {
		let runner = ToolRunner::new("ffprobe");
		let result = probe_video_properties(&runner, "/nonexistent/clip.mp4").await;
		assert!(matches!(result, Err(MediaError::VideoNotFound(_))));
	}
}
