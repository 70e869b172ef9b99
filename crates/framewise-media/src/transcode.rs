//! Compressed analysis copies built from a [`CompressionPlan`].

use std::ffi::OsString;
use std::path::Path;

use framewise_core::{format_rate, CompressionPlan, CompressionPolicy};
use tracing::{debug, instrument};

use crate::error::{Result, ToolStage};
use crate::tool::{validate_output, ToolRunner};

/// FFmpeg arguments that transcode `input` into `output` according to `plan`.
///
/// The audio map is optional (`0:a:0?`), so sources without audio still
/// transcode. The scale filter only ever shrinks.
#[must_use]
pub fn transcode_args(
	input: &Path,
	output: &Path,
	plan: &CompressionPlan,
	policy: &CompressionPolicy,
) -> Vec<OsString> {
	let mut args: Vec<OsString> = vec!["-hide_banner".into(), "-nostdin".into(), "-y".into(), "-i".into()];
	args.push(input.as_os_str().to_os_string());

	let video = [
		"-map".to_string(),
		"0:v:0".to_string(),
		"-map".to_string(),
		"0:a:0?".to_string(),
		"-c:v".to_string(),
		policy.video_codec.clone(),
		"-crf".to_string(),
		plan.video_quality_factor.to_string(),
		"-preset".to_string(),
		plan.encoding_speed_preset.clone(),
		"-r".to_string(),
		format_rate(plan.target_frame_rate),
		"-vf".to_string(),
		plan.scale_filter(),
		"-pix_fmt".to_string(),
		"yuv420p".to_string(),
	];
	let audio = [
		"-c:a".to_string(),
		policy.audio_codec.clone(),
		"-b:a".to_string(),
		plan.audio_bitrate.clone(),
		"-vbr".to_string(),
		if policy.variable_bitrate { "on" } else { "off" }.to_string(),
		"-ac".to_string(),
		policy.audio_channels.to_string(),
		"-ar".to_string(),
		plan.target_audio_sample_rate.to_string(),
		"-movflags".to_string(),
		"+faststart".to_string(),
	];
	args.extend(video.into_iter().chain(audio).map(OsString::from));
	args.push(output.as_os_str().to_os_string());
	args
}

/// Transcode `input` into `output`. Returns the size of the written file.
///
/// `output` is overwritten. The caller owns it, including on failure.
///
/// # Errors
///
/// Returns [`MediaError::ToolFailed`](crate::MediaError::ToolFailed) if
/// FFmpeg rejects the input, [`MediaError::EmptyOutput`](crate::MediaError::EmptyOutput)
/// if the output is missing or empty, or a cancellation error.
#[instrument(skip_all, fields(input = %input.display(), output = %output.display()))]
pub async fn transcode(
	runner: &ToolRunner,
	input: &Path,
	output: &Path,
	plan: &CompressionPlan,
	policy: &CompressionPolicy,
) -> Result<u64> {
	debug!(?plan, "Transcoding");
	let args = transcode_args(input, output, plan, policy);
	let run = runner.run(ToolStage::Transcode, &args).await?;
	let bytes = validate_output(ToolStage::Transcode, output, &run.diagnostics).await?;
	debug!(bytes, "Transcoded");
	Ok(bytes)
}
