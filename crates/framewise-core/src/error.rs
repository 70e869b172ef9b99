//! Error types for histogram, grouping, and planning operations.

use std::path::PathBuf;

/// Errors raised by the pure scene and planning engine.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
	/// Grouping was asked to run over zero frames.
	#[error("Cannot group an empty frame sequence")]
	EmptyFrameSequence,

	/// Similarity threshold outside `(0, 1]`.
	#[error("Similarity threshold must be in (0, 1], got {0}")]
	InvalidThreshold(f64),

	/// Histogram bucket count outside `1..=256`.
	#[error("Bins per channel must be in 1..=256, got {0}")]
	InvalidBinCount(u32),

	/// The histogram source asked the pass to stop.
	#[error("Grouping was cancelled")]
	Cancelled,

	/// A frame image could not be opened or decoded.
	#[error("Failed to decode frame {path}: {source}")]
	FrameDecode {
		/// Path of the frame that failed
		path: PathBuf,
		/// Decoder error
		#[source]
		source: image::ImageError,
	},
}

impl CoreError {
	/// Check if this error comes from a single unreadable frame.
	///
	/// Grouping recovers from these locally; everything else is a caller mistake.
	#[must_use]
	pub const fn is_frame_local(&self) -> bool {
		matches!(self, Self::FrameDecode { .. })
	}
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
