//! Frame extraction into an owned scratch directory.
//!
//! FFmpeg writes frames as `frame_NNNNNN.<ext>` with a fixed six-digit
//! index, so sorting file names sorts frames in time. A run that produces
//! more than 999 999 frames overflows that width and the order is no longer
//! reliable; it is logged and flagged on the result, never silently fixed.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use framewise_core::format_rate;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::{MediaError, Result, ToolStage};
use crate::scratch::ScratchDir;
use crate::tool::ToolRunner;

/// Zero-padded width of the frame index in file names.
pub const FRAME_INDEX_WIDTH: usize = 6;

/// Largest frame count whose names still sort in temporal order.
pub const MAX_ORDERED_FRAMES: usize = 999_999;

/// File name prefix of extracted frames.
pub const FRAME_PREFIX: &str = "frame_";

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for frame extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
	/// Output image quality (1-31, lower is better, 2 is recommended)
	pub quality: u32,

	/// Output image format
	pub format: ImageFormat,

	/// Parent for scratch directories (system temp dir when `None`)
	pub scratch_root: Option<PathBuf>,
}

impl Default for ExtractionConfig {
	fn default() -> Self {
		Self {
			quality: 2,
			format: ImageFormat::Jpeg,
			scratch_root: None,
		}
	}
}

/// Output image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ImageFormat {
	/// JPEG format (smaller files, lossy)
	#[default]
	Jpeg,
	/// PNG format (larger files, lossless)
	Png,
}

impl ImageFormat {
	/// Get the file extension for this format.
	#[must_use]
	pub const fn extension(&self) -> &'static str {
		match self {
			Self::Jpeg => "jpg",
			Self::Png => "png",
		}
	}

	/// The matching `image` crate format, for re-encoding edited frames.
	#[must_use]
	pub const fn image_format(&self) -> image::ImageFormat {
		match self {
			Self::Jpeg => image::ImageFormat::Jpeg,
			Self::Png => image::ImageFormat::Png,
		}
	}
}

// ============================================================================
// Extraction Result
// ============================================================================

/// Frames extracted from one video. Owns the directory they live in.
#[derive(Debug)]
pub struct FrameExtractionResult {
	scratch: ScratchDir,
	format: ImageFormat,
	frame_paths: Vec<PathBuf>,
	original_frame_rate: Option<f64>,
	extraction_frame_rate: f64,
	index_width_exceeded: bool,
}

impl FrameExtractionResult {
	/// Directory holding the frames.
	#[must_use]
	pub fn frame_directory(&self) -> &Path {
		self.scratch.path()
	}

	/// Frame files in temporal order.
	#[must_use]
	pub fn ordered_frame_paths(&self) -> &[PathBuf] {
		&self.frame_paths
	}

	/// Source frame rate, if known.
	#[must_use]
	pub const fn original_frame_rate(&self) -> Option<f64> {
		self.original_frame_rate
	}

	/// Rate the frames were sampled at.
	#[must_use]
	pub const fn extraction_frame_rate(&self) -> f64 {
		self.extraction_frame_rate
	}

	/// Number of frames extracted.
	#[must_use]
	pub fn total_frames(&self) -> usize {
		self.frame_paths.len()
	}

	/// Image format of the frames.
	#[must_use]
	pub const fn format(&self) -> ImageFormat {
		self.format
	}

	/// True when more frames exist than the index width can order.
	#[must_use]
	pub const fn index_width_exceeded(&self) -> bool {
		self.index_width_exceeded
	}

	/// FFmpeg input pattern matching the frame files.
	#[must_use]
	pub fn frame_pattern(&self) -> PathBuf {
		frame_pattern(self.scratch.path(), self.format)
	}

	/// Check if the frame directory has been removed.
	#[must_use]
	pub const fn is_released(&self) -> bool {
		self.scratch.is_released()
	}

	/// Delete the frame directory. Safe to call repeatedly; also runs on drop.
	///
	/// # Errors
	///
	/// Returns an I/O error if removal fails on the first call.
	pub fn release_resources(&mut self) -> Result<()> {
		self.scratch.release()
	}
}

// ============================================================================
// Frame Extraction
// ============================================================================

/// `<dir>/frame_%06d.<ext>`.
#[must_use]
pub fn frame_pattern(dir: &Path, format: ImageFormat) -> PathBuf {
	dir.join(format!(
		"{FRAME_PREFIX}%0{FRAME_INDEX_WIDTH}d.{}",
		format.extension()
	))
}

/// FFmpeg arguments that sample `input` at `frame_rate` into `pattern`.
#[must_use]
pub fn extract_frames_args(
	input: &Path,
	frame_rate: f64,
	pattern: &Path,
	quality: u32,
) -> Vec<OsString> {
	let mut args: Vec<OsString> = vec!["-hide_banner".into(), "-nostdin".into(), "-y".into(), "-i".into()];
	args.push(input.as_os_str().to_os_string());
	args.extend(
		[
			"-vf".to_string(),
			format!("fps={}", format_rate(frame_rate)),
			"-q:v".to_string(),
			quality.to_string(),
		]
		.into_iter()
		.map(OsString::from),
	);
	args.push(pattern.as_os_str().to_os_string());
	args
}

/// Extract frames from a video at a fixed rate.
///
/// The returned result owns a fresh scratch directory. On any error the
/// directory is removed before this function returns.
///
/// # Errors
///
/// Returns [`MediaError::VideoNotFound`] for a missing input,
/// [`MediaError::ToolFailed`] if FFmpeg rejects it,
/// [`MediaError::NoFramesExtracted`] if no frames were written,
/// [`MediaError::EmptyOutput`] if a frame file is empty, or
/// [`MediaError::Cancelled`] / [`MediaError::Timeout`].
#[instrument(skip_all, fields(video = %video_path.as_ref().display(), frame_rate = extraction_frame_rate))]
pub async fn extract_frames(
	runner: &ToolRunner,
	video_path: impl AsRef<Path>,
	original_frame_rate: Option<f64>,
	extraction_frame_rate: f64,
	config: &ExtractionConfig,
) -> Result<FrameExtractionResult> {
	let video_path = video_path.as_ref();

	if !tokio::fs::try_exists(video_path).await? {
		return Err(MediaError::VideoNotFound(video_path.to_path_buf()));
	}

	let scratch = ScratchDir::create(config.scratch_root.as_deref(), "framewise-frames-")?;
	let pattern = frame_pattern(scratch.path(), config.format);
	let args = extract_frames_args(video_path, extraction_frame_rate, &pattern, config.quality);

	let output = runner.run(ToolStage::ExtractFrames, &args).await?;

	let frame_paths = match collect_frame_paths(scratch.path(), config.format).await {
		Err(MediaError::EmptyOutput { stage, path, .. }) => {
			return Err(MediaError::EmptyOutput {
				stage,
				path,
				diagnostics: output.diagnostics,
			});
		}
		listed => listed?,
	};
	if frame_paths.is_empty() {
		return Err(MediaError::NoFramesExtracted {
			video: video_path.to_path_buf(),
			diagnostics: output.diagnostics,
		});
	}

	let index_width_exceeded = frame_paths.len() > MAX_ORDERED_FRAMES;
	if index_width_exceeded {
		warn!(
			frames = frame_paths.len(),
			width = FRAME_INDEX_WIDTH,
			"Frame count exceeds index width, file name order may not match time order"
		);
	}

	debug!(count = frame_paths.len(), "Extracted frames");
	Ok(FrameExtractionResult {
		scratch,
		format: config.format,
		frame_paths,
		original_frame_rate,
		extraction_frame_rate,
		index_width_exceeded,
	})
}

/// List frame files in `dir`, sorted by file name.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be read, or
/// [`MediaError::EmptyOutput`] if any frame file is empty.
pub async fn collect_frame_paths(dir: &Path, format: ImageFormat) -> Result<Vec<PathBuf>> {
	let extension = format.extension();
	let mut frames = Vec::new();
	let mut entries = tokio::fs::read_dir(dir).await?;

	while let Some(entry) = entries.next_entry().await? {
		let path = entry.path();
		let name = entry.file_name();
		let name = name.to_string_lossy();
		if !name.starts_with(FRAME_PREFIX) || path.extension().map_or(true, |e| e != extension) {
			continue;
		}
		if entry.metadata().await?.len() == 0 {
			// Reassembly reads frames by pattern, so a gap cannot be skipped
			warn!(frame = %name, "Empty frame file");
			return Err(MediaError::EmptyOutput {
				stage: ToolStage::ExtractFrames,
				path,
				diagnostics: String::new(),
			});
		}
		frames.push(path);
	}

	frames.sort();
	Ok(frames)
}

// ============================================================================
// Tests
// ============================================================================
