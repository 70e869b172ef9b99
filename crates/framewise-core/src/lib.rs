//! # Framewise Core
//!
//! Scene segmentation and transcoding-parameter planning for video frames.
//!
//! Expensive per-image analysis (captioning, AI editing) only needs to run
//! once per *scene*, not once per frame. This crate splits an ordered frame
//! sequence into contiguous scene groups, picks one representative frame per
//! group, and derives conservative transcoding targets that never exceed the
//! source.
//!
//! ## Components
//!
//! - [`histogram`] - normalized `B³` RGB histograms and Pearson correlation
//! - [`grouping`] - left-to-right scene grouping with one histogram in memory
//! - [`planning`] - frame extraction rate tiers and compression plans
//!
//! Everything here is synchronous and free of shared state; planners can be
//! called concurrently for any number of videos.
//!
//! ## Example
//!
//! ```rust
//! use framewise_core::{
//!     determine_extraction_frame_rate, round_up_sample_rate, CompressionPlan,
//!     CompressionPolicy, VideoProperties,
//! };
//!
//! // A 45 second, 30 fps clip is sampled at 15 fps
//! assert_eq!(determine_extraction_frame_rate(30.0, 45.0), 15.0);
//!
//! // 44.1 kHz audio rounds up to the next supported rate
//! assert_eq!(round_up_sample_rate(44_100), 48_000);
//!
//! let source = VideoProperties {
//!     width: Some(640),
//!     height: Some(360),
//!     frame_rate: Some(3.0),
//!     ..VideoProperties::default()
//! };
//! let plan = CompressionPlan::from_properties(Some(&source), &CompressionPolicy::default());
//! assert_eq!(plan.target_long_edge, 640);
//! assert_eq!(plan.target_frame_rate, 3.0);
//! ```
//!
//! ## Features
//!
//! - `parallel` - compute per-frame histograms on the rayon pool before the
//!   sequential grouping pass

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod grouping;
pub mod histogram;
pub mod planning;

pub use error::{CoreError, Result};
pub use grouping::{
	build_group, FrameGroup, GroupingConfig, GroupingSummary, SceneGrouper, SceneGrouping,
	DEFAULT_SIMILARITY_THRESHOLD,
};
pub use histogram::{
	compare_histograms, compute_histogram, compute_rgb_histogram, histogram_from_path,
	ColorHistogram, HistogramConfig, DEFAULT_BINS_PER_CHANNEL,
};
pub use planning::{
	determine_extraction_frame_rate, extraction_frame_rate_for, format_rate, round_up_sample_rate,
	CompressionPlan, CompressionPolicy, VideoProperties, MAX_AUDIO_SAMPLE_RATE, MAX_FRAME_RATE,
	MAX_RESOLUTION, SUPPORTED_AUDIO_SAMPLE_RATES,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
