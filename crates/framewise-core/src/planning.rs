//! Deterministic extraction and transcoding targets derived from source properties.
//!
//! Every target obeys the non-upscale policy: a derived resolution or frame
//! rate never exceeds the corresponding source value. Unknown source values
//! fall back to the policy caps.

use serde::{Deserialize, Serialize};

// ============================================================================
// Video Properties
// ============================================================================

/// Source properties reported by the metadata provider. Every field is optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoProperties {
	/// Duration in seconds
	pub duration_seconds: Option<f64>,

	/// Width in pixels
	pub width: Option<u32>,

	/// Height in pixels
	pub height: Option<u32>,

	/// Frames per second
	pub frame_rate: Option<f64>,

	/// Audio sample rate in Hz (`None` when there is no audio track)
	pub audio_sample_rate: Option<u32>,
}

impl VideoProperties {
	/// Duration, if known and positive.
	#[must_use]
	pub fn known_duration(&self) -> Option<f64> {
		positive(self.duration_seconds)
	}

	/// Frame rate, if known and positive.
	#[must_use]
	pub fn known_frame_rate(&self) -> Option<f64> {
		positive(self.frame_rate)
	}

	/// The longer of width and height, if either is known.
	#[must_use]
	pub fn long_edge(&self) -> Option<u32> {
		let edge = self.width.unwrap_or(0).max(self.height.unwrap_or(0));
		(edge > 0).then_some(edge)
	}

	/// Audio sample rate, if known and non-zero.
	#[must_use]
	pub fn known_audio_sample_rate(&self) -> Option<u32> {
		self.audio_sample_rate.filter(|&rate| rate > 0)
	}

	/// Whether the source has an audio track.
	#[must_use]
	pub fn has_audio(&self) -> bool {
		self.known_audio_sample_rate().is_some()
	}
}

fn positive(value: Option<f64>) -> Option<f64> {
	value.filter(|v| v.is_finite() && *v > 0.0)
}

// ============================================================================
// Frame Extraction Rate
// ============================================================================

/// Extraction rate cap for videos up to 30 seconds (and unknown durations).
pub const SHORT_VIDEO_FPS_CAP: f64 = 30.0;
/// Cap for videos longer than 30 s and up to 60 s.
pub const MEDIUM_VIDEO_FPS_CAP: f64 = 15.0;
/// Cap for videos longer than 60 s and up to 120 s.
pub const LONG_VIDEO_FPS_CAP: f64 = 10.0;
/// Cap for videos longer than 120 s.
pub const VERY_LONG_VIDEO_FPS_CAP: f64 = 5.0;

/// Pick the frame extraction rate for a source.
///
/// Longer videos are sampled more sparsely to bound the frame count, and the
/// result never exceeds the source rate. A non-positive `duration_seconds`
/// means unknown; a non-positive `source_frame_rate` means unknown and yields
/// the tier cap.
#[must_use]
pub fn determine_extraction_frame_rate(source_frame_rate: f64, duration_seconds: f64) -> f64 {
	let cap = match duration_seconds {
		d if !(d > 30.0) => SHORT_VIDEO_FPS_CAP,
		d if d <= 60.0 => MEDIUM_VIDEO_FPS_CAP,
		d if d <= 120.0 => LONG_VIDEO_FPS_CAP,
		_ => VERY_LONG_VIDEO_FPS_CAP,
	};

	match positive(Some(source_frame_rate)) {
		Some(source) => source.min(cap),
		None => cap,
	}
}

/// Extraction rate for a probed source.
#[must_use]
pub fn extraction_frame_rate_for(properties: &VideoProperties) -> f64 {
	determine_extraction_frame_rate(
		properties.known_frame_rate().unwrap_or(0.0),
		properties.known_duration().unwrap_or(0.0),
	)
}

// ============================================================================
// Audio Sample Rates
// ============================================================================

/// Sample rates the audio encoder accepts, descending.
pub const SUPPORTED_AUDIO_SAMPLE_RATES: [u32; 5] = [48_000, 24_000, 16_000, 12_000, 8_000];

/// Highest supported sample rate.
pub const MAX_AUDIO_SAMPLE_RATE: u32 = SUPPORTED_AUDIO_SAMPLE_RATES[0];

/// Round a sample rate up to the nearest supported rate.
///
/// Rates above the ladder clamp to its maximum.
#[must_use]
pub fn round_up_sample_rate(source_rate: u32) -> u32 {
	SUPPORTED_AUDIO_SAMPLE_RATES
		.iter()
		.rev()
		.copied()
		.find(|&rate| rate >= source_rate)
		.unwrap_or(MAX_AUDIO_SAMPLE_RATE)
}

// ============================================================================
// Compression Policy
// ============================================================================

/// Default cap on the output long edge in pixels.
pub const MAX_RESOLUTION: u32 = 768;

/// Default cap on the output frame rate.
pub const MAX_FRAME_RATE: f64 = 5.0;

/// Fixed encode settings for analysis copies. Not derived from the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionPolicy {
	/// Largest allowed long edge in pixels
	pub max_long_edge: u32,

	/// Largest allowed frame rate
	pub max_frame_rate: f64,

	/// Video encoder name
	pub video_codec: String,

	/// Constant rate factor (lower = better quality, larger file)
	pub quality_factor: u8,

	/// Encoder speed/efficiency preset
	pub speed_preset: String,

	/// Audio encoder name
	pub audio_codec: String,

	/// Target audio bitrate, e.g. "24k"
	pub audio_bitrate: String,

	/// Output audio channels (1 = mono downmix)
	pub audio_channels: u8,

	/// Whether the audio encoder runs in variable-bitrate mode
	pub variable_bitrate: bool,
}

impl Default for CompressionPolicy {
	fn default() -> Self {
		Self {
			max_long_edge: MAX_RESOLUTION,
			max_frame_rate: MAX_FRAME_RATE,
			video_codec: "libx264".to_string(),
			quality_factor: 30,
			speed_preset: "veryfast".to_string(),
			audio_codec: "libopus".to_string(),
			audio_bitrate: "24k".to_string(),
			audio_channels: 1,
			variable_bitrate: true,
		}
	}
}

// ============================================================================
// Compression Plan
// ============================================================================

/// Transcoding targets for one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionPlan {
	/// Long edge in pixels; the short edge follows the aspect ratio
	pub target_long_edge: u32,

	/// Output frame rate
	pub target_frame_rate: f64,

	/// Output audio sample rate, always a supported rate
	pub target_audio_sample_rate: u32,

	/// Constant rate factor
	pub video_quality_factor: u8,

	/// Encoder speed preset
	pub encoding_speed_preset: String,

	/// Audio bitrate
	pub audio_bitrate: String,
}

impl CompressionPlan {
	/// Derive targets from optional source properties.
	#[must_use]
	pub fn from_properties(properties: Option<&VideoProperties>, policy: &CompressionPolicy) -> Self {
		let target_long_edge = properties
			.and_then(VideoProperties::long_edge)
			.map_or(policy.max_long_edge, |edge| edge.min(policy.max_long_edge));

		let target_frame_rate = properties
			.and_then(VideoProperties::known_frame_rate)
			.map_or(policy.max_frame_rate, |rate| rate.min(policy.max_frame_rate));

		let target_audio_sample_rate = properties
			.and_then(VideoProperties::known_audio_sample_rate)
			.map_or(MAX_AUDIO_SAMPLE_RATE, round_up_sample_rate);

		Self {
			target_long_edge,
			target_frame_rate,
			target_audio_sample_rate,
			video_quality_factor: policy.quality_factor,
			encoding_speed_preset: policy.speed_preset.clone(),
			audio_bitrate: policy.audio_bitrate.clone(),
		}
	}

	/// Scale filter that shrinks the long edge to the target and never enlarges.
	///
	/// Output dimensions are kept even for chroma-subsampled encoders.
	#[must_use]
	pub fn scale_filter(&self) -> String {
		let edge = self.target_long_edge;
		format!(
			"scale=w='min({edge},iw)':h='min({edge},ih)':force_original_aspect_ratio=decrease:force_divisible_by=2"
		)
	}
}

/// Format a frame rate for a command line, without trailing zeros.
#[must_use]
pub fn format_rate(rate: f64) -> String {
	let text = format!("{rate:.3}");
	text.trim_end_matches('0').trim_end_matches('.').to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
	use super::*;

	fn source(width: u32, height: u32, frame_rate: f64, audio: Option<u32>) -> VideoProperties {
		VideoProperties {
			duration_seconds: Some(60.0),
			width: Some(width),
			height: Some(height),
			frame_rate: Some(frame_rate),
			audio_sample_rate: audio,
		}
	}

	#[test]
	fn test_extraction_rate_tiers() {
		assert_eq!(determine_extraction_frame_rate(30.0, 45.0), 15.0);
		assert_eq!(determine_extraction_frame_rate(60.0, 200.0), 5.0);
		assert_eq!(determine_extraction_frame_rate(60.0, 90.0), 10.0);
		assert_eq!(determine_extraction_frame_rate(60.0, 20.0), 30.0);
	}

	#[test]
	fn test_extraction_rate_tier_edges() {
		assert_eq!(determine_extraction_frame_rate(60.0, 30.0), 30.0);
		assert_eq!(determine_extraction_frame_rate(60.0, 60.0), 15.0);
		assert_eq!(determine_extraction_frame_rate(60.0, 120.0), 10.0);
		assert_eq!(determine_extraction_frame_rate(60.0, 120.5), 5.0);
	}

	#[test]
	fn test_extraction_rate_never_upscales() {
		assert_eq!(determine_extraction_frame_rate(3.0, 10.0), 3.0);
		assert_eq!(determine_extraction_frame_rate(2.5, 500.0), 2.5);
	}

	#[test]
	fn test_extraction_rate_unknown_inputs() {
		assert_eq!(determine_extraction_frame_rate(24.0, 0.0), 24.0);
		assert_eq!(determine_extraction_frame_rate(60.0, -1.0), 30.0);
		assert_eq!(determine_extraction_frame_rate(60.0, f64::NAN), 30.0);
		assert_eq!(determine_extraction_frame_rate(0.0, 45.0), 15.0);
		assert_eq!(extraction_frame_rate_for(&VideoProperties::default()), 30.0);
	}

	#[test]
	fn test_round_up_sample_rate() {
		assert_eq!(round_up_sample_rate(44_100), 48_000);
		assert_eq!(round_up_sample_rate(22_050), 24_000);
		assert_eq!(round_up_sample_rate(8_000), 8_000);
		assert_eq!(round_up_sample_rate(96_000), 48_000);
		assert_eq!(round_up_sample_rate(11_025), 12_000);
		assert_eq!(round_up_sample_rate(1), 8_000);
	}

	#[test]
	fn test_plan_without_properties() {
		let plan = CompressionPlan::from_properties(None, &CompressionPolicy::default());
		assert_eq!(plan.target_long_edge, MAX_RESOLUTION);
		assert_eq!(plan.target_frame_rate, MAX_FRAME_RATE);
		assert_eq!(plan.target_audio_sample_rate, 48_000);
		assert_eq!(plan.video_quality_factor, 30);
		assert_eq!(plan.encoding_speed_preset, "veryfast");
		assert_eq!(plan.audio_bitrate, "24k");
	}

	#[test]
	fn test_plan_caps_large_source() {
		let props = source(1920, 1080, 29.97, Some(44_100));
		let plan = CompressionPlan::from_properties(Some(&props), &CompressionPolicy::default());
		assert_eq!(plan.target_long_edge, 768);
		assert_eq!(plan.target_frame_rate, 5.0);
		assert_eq!(plan.target_audio_sample_rate, 48_000);
	}

	#[test]
	fn test_plan_never_upscales_small_source() {
		let props = source(320, 480, 2.0, Some(8_000));
		let plan = CompressionPlan::from_properties(Some(&props), &CompressionPolicy::default());
		assert_eq!(plan.target_long_edge, 480);
		assert_eq!(plan.target_frame_rate, 2.0);
		assert_eq!(plan.target_audio_sample_rate, 8_000);
	}

	#[test]
	fn test_plan_zero_values_are_unknown() {
		let props = VideoProperties {
			width: Some(0),
			height: Some(0),
			frame_rate: Some(0.0),
			audio_sample_rate: Some(0),
			..VideoProperties::default()
		};
		let plan = CompressionPlan::from_properties(Some(&props), &CompressionPolicy::default());
		assert_eq!(plan.target_long_edge, MAX_RESOLUTION);
		assert_eq!(plan.target_frame_rate, MAX_FRAME_RATE);
		assert_eq!(plan.target_audio_sample_rate, MAX_AUDIO_SAMPLE_RATE);
		assert!(!props.has_audio());
		assert!(props.long_edge().is_none());
	}

	#[test]
	fn test_scale_filter() {
		let plan = CompressionPlan::from_properties(None, &CompressionPolicy::default());
		assert_eq!(
			plan.scale_filter(),
			"scale=w='min(768,iw)':h='min(768,ih)':force_original_aspect_ratio=decrease:force_divisible_by=2"
		);
	}

	#[test]
	fn test_format_rate() {
		assert_eq!(format_rate(5.0), "5");
		assert_eq!(format_rate(29.97), "29.97");
		assert_eq!(format_rate(2.5), "2.5");
		assert_eq!(format_rate(23.976_023), "23.976");
	}
}
