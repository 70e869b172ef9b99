//! Rebuilding a video from an extracted (and possibly edited) frame sequence.
//!
//! Audio is copied from the original when it has any. The output is written
//! to a scratch file beside the destination and only moved into place after
//! it validates, so a failed run never leaves a partial file at `output`.

use std::ffi::OsString;
use std::path::Path;

use framewise_core::format_rate;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{Result, ToolStage};
use crate::extract::FrameExtractionResult;
use crate::scratch::ScratchFile;
use crate::tool::{validate_output, ToolRunner};

/// Configuration for reassembly encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReassemblyConfig {
	/// Video encoder name
	pub video_codec: String,

	/// Constant rate factor
	pub quality_factor: u8,

	/// Audio encoder name
	pub audio_codec: String,
}

impl Default for ReassemblyConfig {
	fn default() -> Self {
		Self {
			video_codec: "libx264".to_string(),
			quality_factor: 18,
			audio_codec: "aac".to_string(),
		}
	}
}

/// FFmpeg arguments that encode `frame_pattern` at `frame_rate` into `output`,
/// taking audio from `original` if it has any.
#[must_use]
pub fn reassemble_args(
	frame_pattern: &Path,
	frame_rate: f64,
	original: &Path,
	output: &Path,
	config: &ReassemblyConfig,
) -> Vec<OsString> {
	let rate = format_rate(frame_rate);
	let mut args: Vec<OsString> = ["-hide_banner", "-nostdin", "-y", "-framerate", rate.as_str(), "-i"]
		.iter()
		.map(OsString::from)
		.collect();
	args.push(frame_pattern.as_os_str().to_os_string());
	args.push("-i".into());
	args.push(original.as_os_str().to_os_string());

	let crf = config.quality_factor.to_string();
	args.extend(
		[
			// Frames are stream 0, the original's audio is optional
			"-map",
			"0:v:0",
			"-map",
			"1:a:0?",
			"-c:v",
			config.video_codec.as_str(),
			"-crf",
			crf.as_str(),
			"-pix_fmt",
			"yuv420p",
			"-c:a",
			config.audio_codec.as_str(),
			"-shortest",
			"-movflags",
			"+faststart",
		]
		.iter()
		.map(OsString::from),
	);
	args.push(output.as_os_str().to_os_string());
	args
}

/// Encode extracted frames back into a video at their extraction rate.
///
/// Returns the size of the written file.
///
/// # Errors
///
/// Returns [`MediaError::ToolFailed`](crate::MediaError::ToolFailed) if
/// FFmpeg rejects the input, [`MediaError::EmptyOutput`](crate::MediaError::EmptyOutput)
/// if it writes nothing, or a cancellation error. No file is left at
/// `output` on failure.
#[instrument(skip_all, fields(frames = frames.total_frames(), output = %output.display()))]
pub async fn reassemble(
	runner: &ToolRunner,
	frames: &FrameExtractionResult,
	original: &Path,
	output: &Path,
	config: &ReassemblyConfig,
) -> Result<u64> {
	let parent = match output.parent() {
		Some(parent) if !parent.as_os_str().is_empty() => parent,
		_ => Path::new("."),
	};
	let suffix = format!(
		".{}",
		output.extension().map_or("mp4".into(), |e| e.to_string_lossy())
	);
	let staging = ScratchFile::create(parent, ".framewise-reassemble-", &suffix)?;

	let args = reassemble_args(
		&frames.frame_pattern(),
		frames.extraction_frame_rate(),
		original,
		staging.path(),
		config,
	);
	let run = runner.run(ToolStage::Reassemble, &args).await?;
	let bytes = validate_output(ToolStage::Reassemble, staging.path(), &run.diagnostics).await?;

	let _ = staging.persist(output)?;
	debug!(bytes, "Reassembled video");
	Ok(bytes)
}
