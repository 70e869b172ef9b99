//! Error types for media tool operations.

use std::fmt;
use std::path::PathBuf;

use framewise_core::CoreError;

/// The step of the pipeline an external tool was running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStage {
	/// Reading source properties
	Probe,
	/// Writing the frame image sequence
	ExtractFrames,
	/// Rebuilding a video from frames
	Reassemble,
	/// Producing a compressed copy
	Transcode,
}

impl fmt::Display for ToolStage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Probe => "probe",
			Self::ExtractFrames => "frame extraction",
			Self::Reassemble => "reassembly",
			Self::Transcode => "transcode",
		})
	}
}

/// Errors that can occur while driving the external media tool.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
	/// The tool binary is not installed or not executable.
	#[error("{tool} not found. Please install FFmpeg: https://ffmpeg.org/download.html")]
	ToolNotFound {
		/// Program that could not be started
		tool: String,
	},

	/// The tool ran and exited with a failure status.
	#[error("{tool} failed during {stage} (exit code {exit_code:?}): {diagnostics}")]
	ToolFailed {
		/// Program name
		tool: String,
		/// Pipeline step
		stage: ToolStage,
		/// Exit code if the process exited normally
		exit_code: Option<i32>,
		/// Captured stderr tail
		diagnostics: String,
	},

	/// The tool reported success but left no usable output.
	#[error("{stage} produced no usable output at {path}: {diagnostics}")]
	EmptyOutput {
		/// Pipeline step
		stage: ToolStage,
		/// Expected output file
		path: PathBuf,
		/// Captured stderr tail
		diagnostics: String,
	},

	/// Frame extraction succeeded but wrote no frames.
	#[error("No frames extracted from {video}: {diagnostics}")]
	NoFramesExtracted {
		/// Source video
		video: PathBuf,
		/// Captured stderr tail
		diagnostics: String,
	},

	/// Video file not found.
	#[error("Video file not found: {0}")]
	VideoNotFound(PathBuf),

	/// Invalid video file (corrupt or unsupported format).
	#[error("Invalid or unsupported video format: {path}: {diagnostics}")]
	InvalidVideo {
		/// Source video
		path: PathBuf,
		/// Captured stderr tail
		diagnostics: String,
	},

	/// Video has no video streams.
	#[error("Video has no video streams: {0}")]
	NoVideoStream(PathBuf),

	/// Probe output could not be parsed.
	#[error("Failed to parse FFprobe output: {0}")]
	ProbeParse(#[from] serde_json::Error),

	/// Configuration file could not be parsed.
	#[error("Invalid configuration in {path}: {source}")]
	Config {
		/// Configuration file
		path: PathBuf,
		/// Parser error
		#[source]
		source: serde_json::Error,
	},

	/// Grouping or planning error.
	#[error(transparent)]
	Core(#[from] CoreError),

	/// Failed to read or write an image.
	#[error("Image error: {0}")]
	Image(#[from] image::ImageError),

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// A blocking worker task panicked or was aborted.
	#[error("Background task failed: {0}")]
	Join(#[from] tokio::task::JoinError),

	/// Task was cancelled.
	#[error("Operation was cancelled")]
	Cancelled,

	/// Timeout while processing.
	#[error("Operation timed out after {seconds}s")]
	Timeout {
		/// Timeout duration in seconds
		seconds: u64,
	},
}

impl MediaError {
	/// Check if this error is due to a missing tool.
	#[must_use]
	pub const fn is_missing_dependency(&self) -> bool {
		matches!(self, Self::ToolNotFound { .. })
	}

	/// Check if the tool rejected its input.
	#[must_use]
	pub const fn is_tool_rejection(&self) -> bool {
		matches!(self, Self::ToolFailed { .. } | Self::InvalidVideo { .. })
	}

	/// Check if the tool claimed success but produced nothing usable.
	#[must_use]
	pub const fn is_unusable_output(&self) -> bool {
		matches!(self, Self::EmptyOutput { .. } | Self::NoFramesExtracted { .. })
	}

	/// Check if the operation was stopped by the caller or a deadline.
	#[must_use]
	pub const fn is_cancellation(&self) -> bool {
		matches!(self, Self::Timeout { .. } | Self::Cancelled)
	}

	/// Captured tool output, when the error carries any.
	#[must_use]
	pub fn diagnostics(&self) -> Option<&str> {
		match self {
			Self::ToolFailed { diagnostics, .. }
			| Self::EmptyOutput { diagnostics, .. }
			| Self::NoFramesExtracted { diagnostics, .. }
			| Self::InvalidVideo { diagnostics, .. } => Some(diagnostics),
			_ => None,
		}
	}
}

/// Result type alias for media operations.
pub type Result<T> = std::result::Result<T, MediaError>;
