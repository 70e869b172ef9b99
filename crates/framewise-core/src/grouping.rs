//! Scene grouping by histogram correlation between adjacent frames.
//!
//! Frames are visited strictly left to right. Each frame's histogram is
//! compared with the previous frame's only; a correlation below the
//! threshold closes the current group and opens a new one. Only one
//! histogram is retained at a time.
//!
//! A frame that fails to decode is an implicit scene boundary: the group
//! before it is closed, a new group starts at the failed frame, and the next
//! readable frame continues that group without a comparison.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::{CoreError, Result};
use crate::histogram::{compare_histograms, histogram_from_path, ColorHistogram, HistogramConfig};

// ============================================================================
// Configuration
// ============================================================================

/// Default correlation below which adjacent frames belong to different scenes.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.92;

/// Configuration for scene grouping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingConfig {
	/// Correlation threshold in `(0, 1]`; lower correlation = scene change
	pub threshold: f64,

	/// Histogram quantization
	pub histogram: HistogramConfig,
}

impl Default for GroupingConfig {
	fn default() -> Self {
		Self {
			threshold: DEFAULT_SIMILARITY_THRESHOLD,
			histogram: HistogramConfig::default(),
		}
	}
}

impl GroupingConfig {
	/// Check threshold and histogram settings.
	///
	/// # Errors
	///
	/// Returns [`CoreError::InvalidThreshold`] or [`CoreError::InvalidBinCount`].
	pub fn validate(&self) -> Result<()> {
		if !(self.threshold > 0.0 && self.threshold <= 1.0) {
			return Err(CoreError::InvalidThreshold(self.threshold));
		}
		self.histogram.validate()
	}
}

// ============================================================================
// Frame Group
// ============================================================================

/// A contiguous run of visually similar frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameGroup {
	/// First frame index (inclusive)
	pub start_index: usize,

	/// Last frame index (inclusive)
	pub end_index: usize,

	/// Index of the frame standing in for the whole group
	pub representative_index: usize,

	/// Path of the representative frame
	pub representative_path: PathBuf,

	/// Paths of every frame in `start_index..=end_index`
	pub frame_paths: Vec<PathBuf>,

	/// Number of frames in the group
	pub frame_count: usize,
}

impl FrameGroup {
	/// Check if a frame index falls inside this group.
	#[must_use]
	pub const fn contains(&self, index: usize) -> bool {
		index >= self.start_index && index <= self.end_index
	}
}

/// Build the group for `frames[start..=end]`.
///
/// The representative is `start + frame_count / 2`, so even-sized groups
/// pick the frame just past the midpoint. Returns `None` if `start > end` or
/// `end` is out of bounds.
#[must_use]
pub fn build_group<P: AsRef<Path>>(frames: &[P], start: usize, end: usize) -> Option<FrameGroup> {
	if start > end {
		return None;
	}
	let members = frames.get(start..=end)?;
	let frame_count = members.len();
	let representative = members.get(frame_count / 2)?;
	Some(FrameGroup {
		start_index: start,
		end_index: end,
		representative_index: start + frame_count / 2,
		representative_path: representative.as_ref().to_path_buf(),
		frame_paths: members.iter().map(|p| p.as_ref().to_path_buf()).collect(),
		frame_count,
	})
}

// ============================================================================
// Grouping Output
// ============================================================================

/// Counters describing one grouping pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupingSummary {
	/// Frames examined
	pub total_frames: usize,

	/// Groups produced
	pub group_count: usize,

	/// Frames whose histogram could not be computed
	pub decode_failures: usize,
}

impl GroupingSummary {
	/// Groups per frame; `1.0` means no frames were merged.
	#[must_use]
	#[allow(clippy::cast_precision_loss)]
	pub fn reduction_ratio(&self) -> f64 {
		if self.total_frames == 0 {
			return 0.0;
		}
		self.group_count as f64 / self.total_frames as f64
	}
}

/// Result of a grouping pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneGrouping {
	/// Groups in frame order, partitioning `0..total_frames`
	pub groups: Vec<FrameGroup>,

	/// Pass statistics
	pub summary: GroupingSummary,
}

impl SceneGrouping {
	/// Iterate over representative frame paths in order.
	pub fn representatives(&self) -> impl Iterator<Item = &Path> {
		self.groups.iter().map(|g| g.representative_path.as_path())
	}
}

// ============================================================================
// Scene Grouper
// ============================================================================

/// Splits an ordered frame sequence into scene groups.
#[derive(Debug, Clone)]
pub struct SceneGrouper {
	config: GroupingConfig,
}

impl SceneGrouper {
	/// Create a grouper with a validated configuration.
	///
	/// # Errors
	///
	/// Returns [`CoreError::InvalidThreshold`] or [`CoreError::InvalidBinCount`].
	pub fn new(config: GroupingConfig) -> Result<Self> {
		config.validate()?;
		Ok(Self { config })
	}

	/// The active configuration.
	#[must_use]
	pub const fn config(&self) -> &GroupingConfig {
		&self.config
	}

	/// Group frame image files, decoding each one from disk.
	///
	/// # Errors
	///
	/// Returns [`CoreError::EmptyFrameSequence`] when `frames` is empty.
	/// Unreadable frames do not fail the pass.
	pub fn group_paths<P: AsRef<Path>>(&self, frames: &[P]) -> Result<SceneGrouping> {
		let histogram = self.config.histogram;
		self.group_with(frames, |path| histogram_from_path(path, &histogram))
	}

	/// Group frames using a caller-supplied histogram source.
	///
	/// `histogram_of` is called at most once per frame, in order. A
	/// [`CoreError::FrameDecode`] marks a scene boundary; any other error
	/// ends the pass and is returned, which lets the source cancel it.
	///
	/// # Errors
	///
	/// Returns [`CoreError::EmptyFrameSequence`] when `frames` is empty, or the
	/// first error from `histogram_of` that is not frame-local.
	#[instrument(skip_all, fields(num_frames = frames.len(), threshold = self.config.threshold))]
	pub fn group_with<P, F>(&self, frames: &[P], mut histogram_of: F) -> Result<SceneGrouping>
	where
		P: AsRef<Path>,
		F: FnMut(&Path) -> Result<ColorHistogram>,
	{
		if frames.is_empty() {
			return Err(CoreError::EmptyFrameSequence);
		}
		let histograms = frames.iter().map(|frame| histogram_of(frame.as_ref()));
		self.reduce(frames, histograms)
	}

	/// Group frames with histograms computed in parallel.
	///
	/// Produces the same groups as [`Self::group_with`]; only the per-frame
	/// histogram work is spread over the rayon pool, at the cost of holding
	/// all histograms at once. The boundary decision stays sequential.
	///
	/// # Errors
	///
	/// Returns [`CoreError::EmptyFrameSequence`] when `frames` is empty.
	#[cfg(feature = "parallel")]
	#[instrument(skip_all, fields(num_frames = frames.len(), threshold = self.config.threshold))]
	pub fn group_parallel<P, F>(&self, frames: &[P], histogram_of: F) -> Result<SceneGrouping>
	where
		P: AsRef<Path> + Sync,
		F: Fn(&Path) -> Result<ColorHistogram> + Sync,
	{
		use rayon::prelude::*;

		if frames.is_empty() {
			return Err(CoreError::EmptyFrameSequence);
		}
		let histograms: Vec<Result<ColorHistogram>> = frames
			.par_iter()
			.map(|frame| histogram_of(frame.as_ref()))
			.collect();
		self.reduce(frames, histograms.into_iter())
	}

	/// Sequential boundary decision over the ordered histogram stream.
	fn reduce<P, I>(&self, frames: &[P], histograms: I) -> Result<SceneGrouping>
	where
		P: AsRef<Path>,
		I: Iterator<Item = Result<ColorHistogram>>,
	{
		let mut ranges = Vec::new();
		let mut group_start = 0;
		let mut previous: Option<ColorHistogram> = None;
		let mut decode_failures = 0;

		for (index, histogram) in histograms.enumerate() {
			match histogram {
				Ok(current) => {
					if let Some(prev) = previous.as_ref().filter(|_| index > 0) {
						let correlation = compare_histograms(prev, &current);
						if correlation < self.config.threshold {
							debug!(index, correlation, "Scene change");
							ranges.push((group_start, index - 1));
							group_start = index;
						}
					}
					previous = Some(current);
				}
				Err(error) if !error.is_frame_local() => {
					debug!(index, %error, "Grouping stopped");
					return Err(error);
				}
				Err(error) => {
					warn!(index, %error, "Frame histogram failed, treating as scene boundary");
					decode_failures += 1;
					if index > 0 {
						ranges.push((group_start, index - 1));
						group_start = index;
					}
					previous = None;
				}
			}
		}
		ranges.push((group_start, frames.len() - 1));

		let groups: Vec<FrameGroup> = ranges
			.into_iter()
			.filter_map(|(start, end)| build_group(frames, start, end))
			.collect();

		let summary = GroupingSummary {
			total_frames: frames.len(),
			group_count: groups.len(),
			decode_failures,
		};
		debug!(
			groups = summary.group_count,
			decode_failures,
			ratio = summary.reduction_ratio(),
			"Scene grouping complete"
		);

		Ok(SceneGrouping { groups, summary })
	}
}

// ============================================================================
// Tests
// ============================================================================
