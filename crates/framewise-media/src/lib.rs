//! # Framewise Media
//!
//! Drives FFmpeg to turn videos into frame sequences and back, and to make
//! small analysis copies.
//!
//! ## Pipelines
//!
//! - [`enhance_video`] - extract frames, group them into scenes, let a
//!   [`FrameEditor`] edit one representative per scene, copy each edit across
//!   its scene, and reassemble the video with the original audio
//! - [`compress_for_analysis`] - transcode a video to a copy that never
//!   exceeds its source in resolution, frame rate, or audio sample rate
//!
//! ## Resources
//!
//! Frame directories and compressed copies are scratch resources owned by
//! the value that returns them. They are deleted on drop, or earlier through
//! an explicit release. Every failure path removes what it created.
//!
//! ## Cancellation
//!
//! Each entry point accepts an optional `watch::Receiver<bool>`. Sending
//! `true` kills the running tool and the call returns
//! [`MediaError::Cancelled`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use framewise_media::{compress_for_analysis, PipelineConfig};
//!
//! # async fn run() -> framewise_media::Result<()> {
//! let config = PipelineConfig::default();
//! let compressed = compress_for_analysis("clip.mov", &config, None).await?;
//! println!("{} bytes at {}", compressed.bytes, compressed.path().display());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod extract;
pub mod pipeline;
pub mod probe;
pub mod reassemble;
pub mod scratch;
pub mod tool;
pub mod transcode;

#[cfg(all(test, unix))]
mod testing;

pub use error::{MediaError, Result, ToolStage};
pub use extract::{
	collect_frame_paths, extract_frames, ExtractionConfig, FrameExtractionResult, ImageFormat,
	FRAME_INDEX_WIDTH, MAX_ORDERED_FRAMES,
};
pub use pipeline::{
	compress_for_analysis, enhance_video, propagate_edit, CompressedVideo, EnhancementReport,
	FrameEditor, PipelineConfig, ProcessingStats, SceneSpan,
};
pub use probe::{parse_probe_output, probe_video_properties};
pub use reassemble::{reassemble, ReassemblyConfig};
pub use scratch::{ScratchDir, ScratchFile};
pub use tool::{check_tool, ToolConfig, ToolOutput, ToolRunner};
pub use transcode::transcode;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
