//! End-to-end pipeline stages.
//!
//! Two independent flows:
//!
//! - **Enhancement**: probe → extraction rate → extract frames → group scenes
//!   → edit one representative per scene → copy each edit across its scene →
//!   reassemble. The frame directory is released on every exit path.
//! - **Compression**: probe → [`CompressionPlan`] → transcode into a scratch
//!   file the caller owns.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Instant;

use framewise_core::{
	extraction_frame_rate_for, histogram_from_path, CompressionPlan, CompressionPolicy, CoreError,
	FrameGroup, GroupingConfig, GroupingSummary, SceneGrouper, SceneGrouping, VideoProperties,
};
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::error::{MediaError, Result};
use crate::extract::{extract_frames, ExtractionConfig, ImageFormat, MAX_ORDERED_FRAMES};
use crate::probe::probe_video_properties;
use crate::reassemble::{reassemble, ReassemblyConfig};
use crate::scratch::ScratchFile;
use crate::tool::{ToolConfig, ToolRunner};
use crate::transcode::transcode;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for both pipeline flows.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
	/// External tool locations and limits
	pub tools: ToolConfig,

	/// Frame extraction
	pub extraction: ExtractionConfig,

	/// Scene grouping
	pub grouping: GroupingConfig,

	/// Reassembly encoding
	pub reassembly: ReassemblyConfig,

	/// Analysis-copy encoding policy
	pub compression: CompressionPolicy,
}

impl PipelineConfig {
	/// Load a JSON configuration file. Missing fields take their defaults.
	///
	/// # Errors
	///
	/// Returns an I/O error or [`MediaError::Config`].
	pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let text = std::fs::read_to_string(path)?;
		serde_json::from_str(&text).map_err(|source| MediaError::Config {
			path: path.to_path_buf(),
			source,
		})
	}

	fn scratch_root(&self) -> PathBuf {
		self.extraction
			.scratch_root
			.clone()
			.unwrap_or_else(std::env::temp_dir)
	}
}

// ============================================================================
// Frame Editing
// ============================================================================

/// Edits the representative frame of one scene.
///
/// Called once per group, in order. Returning `None` leaves the scene as is.
pub trait FrameEditor {
	/// Produce an edited image for `group.representative_path`.
	fn edit(&self, group: &FrameGroup) -> impl Future<Output = Result<Option<PathBuf>>> + Send;
}

/// Write an edited image over every frame of a scene.
///
/// The edit is resized to the frames' dimensions if needed and encoded once
/// in the frames' format. Returns the number of frames written.
///
/// # Errors
///
/// Returns an image error if the edit cannot be decoded or encoded, or an
/// I/O error if a frame cannot be written.
#[instrument(skip_all, fields(edit = %edited.as_ref().display(), frames = frame_paths.len()))]
pub async fn propagate_edit(
	edited: impl AsRef<Path>,
	frame_paths: &[PathBuf],
	format: ImageFormat,
) -> Result<usize> {
	let edited = edited.as_ref().to_path_buf();
	let frame_paths = frame_paths.to_vec();

	tokio::task::spawn_blocking(move || -> Result<usize> {
		let Some(first) = frame_paths.first() else {
			return Ok(0);
		};
		let (width, height) = image::image_dimensions(first)?;

		let mut image = image::open(&edited)?;
		if (image.width(), image.height()) != (width, height) {
			debug!(width, height, "Resizing edit to frame size");
			image = image.resize_exact(width, height, FilterType::Lanczos3);
		}
		let image = image::DynamicImage::ImageRgb8(image.to_rgb8());

		let mut encoded = std::io::Cursor::new(Vec::new());
		image.write_to(&mut encoded, format.image_format())?;
		let encoded = encoded.into_inner();

		for path in &frame_paths {
			std::fs::write(path, &encoded)?;
		}
		Ok(frame_paths.len())
	})
	.await?
}

// ============================================================================
// Enhancement
// ============================================================================

/// Start and end of one scene, without its frame paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneSpan {
	/// First frame index (inclusive)
	pub start_index: usize,
	/// Last frame index (inclusive)
	pub end_index: usize,
	/// Representative frame index
	pub representative_index: usize,
}

impl From<&FrameGroup> for SceneSpan {
	fn from(group: &FrameGroup) -> Self {
		Self {
			start_index: group.start_index,
			end_index: group.end_index,
			representative_index: group.representative_index,
		}
	}
}

/// Time spent per stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingStats {
	/// Frame extraction (ms)
	pub extraction_time_ms: u64,

	/// Scene grouping (ms)
	pub grouping_time_ms: u64,

	/// Editing and propagation (ms)
	pub editing_time_ms: u64,

	/// Reassembly (ms)
	pub reassembly_time_ms: u64,
}

/// Outcome of [`enhance_video`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancementReport {
	/// Source properties
	pub properties: VideoProperties,

	/// Rate frames were sampled and reassembled at
	pub extraction_frame_rate: f64,

	/// Frames extracted
	pub total_frames: usize,

	/// Scenes in frame order
	pub scenes: Vec<SceneSpan>,

	/// Grouping statistics
	pub summary: GroupingSummary,

	/// Scenes the editor changed
	pub edited_scenes: usize,

	/// Output file
	pub output_path: PathBuf,

	/// Output size in bytes
	pub output_bytes: u64,

	/// Stage timings
	pub stats: ProcessingStats,
}

#[allow(clippy::cast_possible_truncation)]
fn elapsed_ms(start: Instant) -> u64 {
	start.elapsed().as_millis() as u64
}

/// Group frame files on the current thread.
///
/// Stops before the next frame once `cancel_rx` reads `true` or `alive_rx`
/// loses its sender, returning [`CoreError::Cancelled`].
fn group_frames(
	grouper: &SceneGrouper,
	frames: &[PathBuf],
	cancel_rx: Option<&watch::Receiver<bool>>,
	alive_rx: &watch::Receiver<()>,
) -> framewise_core::Result<SceneGrouping> {
	let histogram = grouper.config().histogram;
	grouper.group_with(frames, |path| {
		let cancelled = cancel_rx.is_some_and(|rx| *rx.borrow());
		if cancelled || alive_rx.has_changed().is_err() {
			return Err(CoreError::Cancelled);
		}
		histogram_from_path(path, &histogram)
	})
}

/// Run the enhancement flow for one video.
///
/// # Errors
///
/// Returns the first fatal error from probing, extraction, grouping, editing,
/// or reassembly. Extracted frames are deleted before the error is returned.
#[instrument(skip_all, fields(video = %video_path.as_ref().display()))]
pub async fn enhance_video<E: FrameEditor>(
	video_path: impl AsRef<Path>,
	output_path: impl AsRef<Path>,
	editor: &E,
	config: &PipelineConfig,
	cancel_rx: Option<watch::Receiver<bool>>,
) -> Result<EnhancementReport> {
	let video_path = video_path.as_ref();
	let output_path = output_path.as_ref();
	let ffprobe = ToolRunner::ffprobe(&config.tools).with_cancel_opt(cancel_rx.clone());
	let ffmpeg = ToolRunner::ffmpeg(&config.tools).with_cancel_opt(cancel_rx.clone());
	let grouper = SceneGrouper::new(config.grouping)?;
	let mut stats = ProcessingStats::default();

	let properties = probe_video_properties(&ffprobe, video_path).await?;
	let extraction_frame_rate = extraction_frame_rate_for(&properties);
	if let Some(duration) = properties.known_duration() {
		let expected = duration * extraction_frame_rate;
		#[allow(clippy::cast_precision_loss)]
		let limit = MAX_ORDERED_FRAMES as f64;
		if expected > limit {
			warn!(expected, "Expected frame count exceeds frame index width");
		}
	}
	debug!(?properties, extraction_frame_rate, "Planned extraction");

	let start = Instant::now();
	let mut frames = extract_frames(
		&ffmpeg,
		video_path,
		properties.known_frame_rate(),
		extraction_frame_rate,
		&config.extraction,
	)
	.await?;
	stats.extraction_time_ms = elapsed_ms(start);

	let start = Instant::now();
	let paths = frames.ordered_frame_paths().to_vec();
	// Dropping this future drops the sender, which stops the blocking pass
	let (_alive_tx, alive_rx) = watch::channel(());
	let grouping = match tokio::task::spawn_blocking(move || {
		group_frames(&grouper, &paths, cancel_rx.as_ref(), &alive_rx)
	})
	.await?
	{
		Ok(grouping) => grouping,
		Err(CoreError::Cancelled) => return Err(MediaError::Cancelled),
		Err(e) => return Err(e.into()),
	};
	stats.grouping_time_ms = elapsed_ms(start);
	info!(
		frames = grouping.summary.total_frames,
		scenes = grouping.summary.group_count,
		"Grouped frames into scenes"
	);

	let start = Instant::now();
	let mut edited_scenes = 0;
	for group in &grouping.groups {
		ffmpeg.ensure_not_cancelled()?;
		if let Some(edited) = editor.edit(group).await? {
			let _ = propagate_edit(&edited, &group.frame_paths, frames.format()).await?;
			edited_scenes += 1;
		}
	}
	stats.editing_time_ms = elapsed_ms(start);

	let start = Instant::now();
	let output_bytes = reassemble(&ffmpeg, &frames, video_path, output_path, &config.reassembly).await?;
	stats.reassembly_time_ms = elapsed_ms(start);

	let total_frames = frames.total_frames();
	frames.release_resources()?;

	debug!(?stats, edited_scenes, output_bytes, "Enhancement complete");
	Ok(EnhancementReport {
		properties,
		extraction_frame_rate,
		total_frames,
		scenes: grouping.groups.iter().map(SceneSpan::from).collect(),
		summary: grouping.summary,
		edited_scenes,
		output_path: output_path.to_path_buf(),
		output_bytes,
		stats,
	})
}

// ============================================================================
// Compression
// ============================================================================

/// A compressed copy of a source video. Deleted on drop unless persisted.
#[derive(Debug)]
pub struct CompressedVideo {
	/// The compressed file
	pub file: ScratchFile,

	/// Targets it was encoded with
	pub plan: CompressionPlan,

	/// Source properties, when the probe succeeded
	pub properties: Option<VideoProperties>,

	/// Size in bytes
	pub bytes: u64,
}

impl CompressedVideo {
	/// Path of the compressed file.
	#[must_use]
	pub fn path(&self) -> &Path {
		self.file.path()
	}

	/// Delete the compressed file. Safe to call repeatedly.
	///
	/// # Errors
	///
	/// Returns an I/O error if removal fails on the first call.
	pub fn release(&mut self) -> Result<()> {
		self.file.release()
	}
}

/// Produce a small analysis copy of a video.
///
/// Missing source properties fall back to the policy caps. The result owns
/// its file; on any error the partial file is removed before returning.
///
/// # Errors
///
/// Returns [`MediaError::VideoNotFound`], a transcode failure, or a
/// cancellation error.
#[instrument(skip_all, fields(video = %video_path.as_ref().display()))]
pub async fn compress_for_analysis(
	video_path: impl AsRef<Path>,
	config: &PipelineConfig,
	cancel_rx: Option<watch::Receiver<bool>>,
) -> Result<CompressedVideo> {
	let video_path = video_path.as_ref();
	let ffprobe = ToolRunner::ffprobe(&config.tools).with_cancel_opt(cancel_rx.clone());
	let ffmpeg = ToolRunner::ffmpeg(&config.tools).with_cancel_opt(cancel_rx);

	let properties = match probe_video_properties(&ffprobe, video_path).await {
		Ok(properties) => Some(properties),
		Err(e @ (MediaError::VideoNotFound(_) | MediaError::Cancelled | MediaError::Timeout { .. })) => {
			return Err(e);
		}
		Err(e) => {
			warn!(error = %e, "Probe failed, planning with defaults");
			None
		}
	};

	let plan = CompressionPlan::from_properties(properties.as_ref(), &config.compression);
	debug!(?plan, "Compression plan");

	let file = ScratchFile::create(&config.scratch_root(), "framewise-compressed-", ".mp4")?;
	let bytes = transcode(&ffmpeg, video_path, file.path(), &plan, &config.compression).await?;

	Ok(CompressedVideo {
		file,
		plan,
		properties,
		bytes,
	})
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
	use super::*;
	#[cfg(unix)]
	use crate::testing;
	use image::{ImageBuffer, Rgb, RgbImage};
	#[cfg(unix)]
	use std::time::Duration;

	struct NoopEditor;

	impl FrameEditor for NoopEditor {
		async fn edit(&self, _group: &FrameGroup) -> Result<Option<PathBuf>> {
			Ok(None)
		}
	}

	#[test]
	fn test_pipeline_config_default() {
		let config = PipelineConfig::default();
		assert!((config.grouping.threshold - 0.92).abs() < f64::EPSILON);
		assert_eq!(config.compression.max_long_edge, 768);
		assert_eq!(config.extraction.quality, 2);
		assert_eq!(config.tools.ffmpeg, PathBuf::from("ffmpeg"));
	}

	#[test]
	fn test_pipeline_config_from_partial_json() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("framewise.json");
		std::fs::write(
			&path,
			r#"{"grouping": {"threshold": 0.8}, "tools": {"timeout_secs": 600}, "extraction": {"format": "Png"}}"#,
		)
		.unwrap();

		let config = PipelineConfig::from_json_file(&path).unwrap();
		assert!((config.grouping.threshold - 0.8).abs() < f64::EPSILON);
		assert_eq!(config.grouping.histogram.bins_per_channel, 32);
		assert_eq!(config.tools.timeout_secs, Some(600));
		assert_eq!(config.tools.ffprobe, PathBuf::from("ffprobe"));
		assert_eq!(config.extraction.format, ImageFormat::Png);
	}

	#[test]
	fn test_pipeline_config_invalid_json() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("framewise.json");
		std::fs::write(&path, "{ not json").unwrap();
		assert!(matches!(PipelineConfig::from_json_file(&path), Err(MediaError::Config { .. })));
	}

	#[tokio::test]
	async fn test_propagate_edit_resizes_and_overwrites() {
		let dir = tempfile::tempdir().unwrap();
		let frames: Vec<PathBuf> = (1..=3)
			.map(|i| dir.path().join(format!("frame_{i:06}.png")))
			.collect();
		for path in &frames {
			ImageBuffer::from_pixel(8, 6, Rgb([200_u8, 0, 0])).save(path).unwrap();
		}
		let edited = dir.path().join("edited.png");
		ImageBuffer::from_pixel(4, 3, Rgb([0_u8, 0, 200])).save(&edited).unwrap();

		let written = propagate_edit(&edited, &frames, ImageFormat::Png).await.unwrap();
		assert_eq!(written, 3);
		for path in &frames {
			let frame: RgbImage = image::open(path).unwrap().to_rgb8();
			assert_eq!(frame.dimensions(), (8, 6));
			assert_eq!(frame.get_pixel(4, 3), &Rgb([0, 0, 200]));
		}
	}

	#[tokio::test]
	async fn test_propagate_edit_unreadable() {
		let dir = tempfile::tempdir().unwrap();
		let frame = dir.path().join("frame_000001.png");
		ImageBuffer::from_pixel(2, 2, Rgb([1_u8, 2, 3])).save(&frame).unwrap();
		let result = propagate_edit(dir.path().join("missing.png"), &[frame], ImageFormat::Png).await;
		assert!(result.is_err());
	}

	#[tokio::test]
	async fn test_enhance_missing_video() {
		let result = enhance_video(
			"/nonexistent/clip.mp4",
			"/nonexistent/out.mp4",
			&NoopEditor,
			&PipelineConfig::default(),
			None,
		)
		.await;
		assert!(matches!(result, Err(MediaError::VideoNotFound(_))));
	}

	#[tokio::test]
	async fn test_compress_missing_video() {
		let result = compress_for_analysis("/nonexistent/clip.mp4", &PipelineConfig::default(), None).await;
		assert!(matches!(result, Err(MediaError::VideoNotFound(_))));
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn test_compress_failure_releases_output() {
		let dir = tempfile::tempdir().unwrap();
		let video = dir.path().join("clip.mp4");
		std::fs::write(&video, b"not a video").unwrap();
		let scratch = dir.path().join("scratch");

		let mut config = PipelineConfig::default();
		config.tools.ffprobe = PathBuf::from("false");
		config.tools.ffmpeg = PathBuf::from("false");
		config.extraction.scratch_root = Some(scratch.clone());

		let err = compress_for_analysis(&video, &config, None).await.unwrap_err();
		assert!(err.is_tool_rejection());
		assert_eq!(std::fs::read_dir(&scratch).unwrap().count(), 0);
	}

	#[tokio::test]
	async fn test_compress_cancelled_before_start() {
		let dir = tempfile::tempdir().unwrap();
		let video = dir.path().join("clip.mp4");
		std::fs::write(&video, b"video").unwrap();
		let (_cancel_tx, cancel_rx) = watch::channel(true);

		let result = compress_for_analysis(&video, &PipelineConfig::default(), Some(cancel_rx)).await;
		assert!(matches!(result, Err(MediaError::Cancelled)));
	}

	fn two_color_frames(dir: &Path) -> Vec<PathBuf> {
		[[200_u8, 20, 20], [200, 20, 20], [20, 20, 200], [20, 20, 200]]
			.iter()
			.enumerate()
			.map(|(i, color)| {
				let path = dir.join(format!("frame_{:06}.png", i + 1));
				ImageBuffer::from_pixel(8, 8, Rgb(*color)).save(&path).unwrap();
				path
			})
			.collect()
	}

	#[test]
	fn test_group_frames_runs_to_completion() {
		let dir = tempfile::tempdir().unwrap();
		let frames = two_color_frames(dir.path());
		let grouper = SceneGrouper::new(GroupingConfig::default()).unwrap();
		let (_cancel_tx, cancel_rx) = watch::channel(false);
		let (_alive_tx, alive_rx) = watch::channel(());

		let grouping = group_frames(&grouper, &frames, Some(&cancel_rx), &alive_rx).unwrap();
		assert_eq!(grouping.summary.group_count, 2);
		assert_eq!(grouping.summary.decode_failures, 0);
	}

	#[test]
	fn test_group_frames_stops_on_cancel() {
		let dir = tempfile::tempdir().unwrap();
		let frames = two_color_frames(dir.path());
		let grouper = SceneGrouper::new(GroupingConfig::default()).unwrap();
		let (_cancel_tx, cancel_rx) = watch::channel(true);
		let (_alive_tx, alive_rx) = watch::channel(());

		let result = group_frames(&grouper, &frames, Some(&cancel_rx), &alive_rx);
		assert!(matches!(result, Err(CoreError::Cancelled)));
	}

	#[test]
	fn test_group_frames_stops_when_caller_gone() {
		let dir = tempfile::tempdir().unwrap();
		let frames = two_color_frames(dir.path());
		let grouper = SceneGrouper::new(GroupingConfig::default()).unwrap();
		let (alive_tx, alive_rx) = watch::channel(());
		drop(alive_tx);

		let result = group_frames(&grouper, &frames, None, &alive_rx);
		assert!(matches!(result, Err(CoreError::Cancelled)));
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn test_cancel_mid_compression_releases_output() {
		let dir = tempfile::tempdir().unwrap();
		let video = dir.path().join("clip.mp4");
		std::fs::write(&video, b"video").unwrap();
		let scratch = dir.path().join("scratch");

		let mut config = PipelineConfig::default();
		config.tools.ffprobe = PathBuf::from("false");
		config.tools.ffmpeg = testing::slow_tool(dir.path());
		config.extraction.scratch_root = Some(scratch.clone());
		let (cancel_tx, cancel_rx) = watch::channel(false);

		let compression = compress_for_analysis(&video, &config, Some(cancel_rx));
		let cancel = async {
			tokio::time::sleep(Duration::from_millis(500)).await;
			let live = testing::entry_count(&scratch);
			cancel_tx.send(true).unwrap();
			live
		};
		let (result, live) = tokio::join!(compression, cancel);

		assert_eq!(live, 1);
		assert!(matches!(result, Err(MediaError::Cancelled)));
		assert_eq!(testing::entry_count(&scratch), 0);
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn test_cancel_mid_enhancement_releases_frames() {
		let dir = tempfile::tempdir().unwrap();
		let video = dir.path().join("clip.mp4");
		std::fs::write(&video, b"video").unwrap();
		let scratch = dir.path().join("scratch");

		let mut config = PipelineConfig::default();
		config.tools.ffprobe = testing::fake_tool(
			dir.path(),
			"fake-ffprobe",
			r#"printf '{"streams":[{"codec_type":"video","avg_frame_rate":"10/1","duration":"2"}]}'"#,
		);
		config.tools.ffmpeg = testing::slow_tool(dir.path());
		config.extraction.scratch_root = Some(scratch.clone());
		let (cancel_tx, cancel_rx) = watch::channel(false);

		let output = dir.path().join("out.mp4");
		let enhancement = enhance_video(&video, &output, &NoopEditor, &config, Some(cancel_rx));
		let cancel = async {
			tokio::time::sleep(Duration::from_millis(500)).await;
			let live = testing::entry_count(&scratch);
			cancel_tx.send(true).unwrap();
			live
		};
		let (result, live) = tokio::join!(enhancement, cancel);

		assert_eq!(live, 1);
		assert!(matches!(result, Err(MediaError::Cancelled)));
		assert_eq!(testing::entry_count(&scratch), 0);
		assert!(!output.exists());
	}
}
