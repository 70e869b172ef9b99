//! Color histograms and histogram correlation.
//!
//! A histogram quantizes each 8-bit RGB channel into `B` buckets and counts
//! pixels in one flat buffer of `B³` bins, indexed by `r·B² + g·B + b`.
//! After the pass every bin is divided by the pixel count, so a histogram
//! with at least one pixel sums to 1.
//!
//! ## Similarity
//!
//! Two histograms are compared with the Pearson correlation coefficient over
//! their flattened bins:
//!
//! ```text
//! r = Σ(aᵢ - ā)(bᵢ - b̄) / sqrt(Σ(aᵢ - ā)² · Σ(bᵢ - b̄)²)
//! ```
//!
//! `1.0` means identical distribution shape, `0.0` uncorrelated, negative
//! values an inverse relationship. When the denominator vanishes (both
//! histograms numerically uniform) the score is defined as `1.0`.

use std::borrow::Cow;
use std::path::Path;

use image::{DynamicImage, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{CoreError, Result};

// ============================================================================
// Configuration
// ============================================================================

/// Default number of buckets per color channel (32³ bins).
pub const DEFAULT_BINS_PER_CHANNEL: u32 = 32;

/// Correlation denominators below this are treated as two uniform histograms.
pub const DEGENERATE_DENOMINATOR: f64 = 1e-10;

/// Histogram quantization settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramConfig {
	/// Buckets per color channel, in `1..=256`
	pub bins_per_channel: u32,
}

impl Default for HistogramConfig {
	fn default() -> Self {
		Self {
			bins_per_channel: DEFAULT_BINS_PER_CHANNEL,
		}
	}
}

impl HistogramConfig {
	/// Check the bucket count.
	///
	/// # Errors
	///
	/// Returns [`CoreError::InvalidBinCount`] when the count is outside `1..=256`.
	pub fn validate(&self) -> Result<()> {
		if (1..=256).contains(&self.bins_per_channel) {
			Ok(())
		} else {
			Err(CoreError::InvalidBinCount(self.bins_per_channel))
		}
	}
}

// ============================================================================
// Color Histogram
// ============================================================================

/// A normalized 3D RGB histogram stored as a contiguous `B³` buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorHistogram {
	bins_per_channel: u32,
	bins: Box<[f64]>,
	pixel_count: u64,
}

impl ColorHistogram {
	/// Create an all-zero histogram with `bins_per_channel³` bins.
	///
	/// # Errors
	///
	/// Returns [`CoreError::InvalidBinCount`] when the count is outside `1..=256`.
	pub fn new(bins_per_channel: u32) -> Result<Self> {
		HistogramConfig { bins_per_channel }.validate()?;
		let side = bins_per_channel as usize;
		Ok(Self {
			bins_per_channel,
			bins: vec![0.0; side * side * side].into_boxed_slice(),
			pixel_count: 0,
		})
	}

	/// Buckets per channel.
	#[must_use]
	pub const fn bins_per_channel(&self) -> u32 {
		self.bins_per_channel
	}

	/// The flattened bins.
	#[must_use]
	pub fn bins(&self) -> &[f64] {
		&self.bins
	}

	/// Number of pixels counted before normalization.
	#[must_use]
	pub const fn pixel_count(&self) -> u64 {
		self.pixel_count
	}

	/// True when no pixels were counted (all bins zero).
	#[must_use]
	pub const fn is_empty(&self) -> bool {
		self.pixel_count == 0
	}

	/// Sum of all bins. `1.0 ± ε` for non-empty histograms.
	#[must_use]
	pub fn sum(&self) -> f64 {
		self.bins.iter().sum()
	}

	/// Flat index of a bucket triple.
	#[must_use]
	pub const fn bin_index(&self, r: usize, g: usize, b: usize) -> usize {
		let side = self.bins_per_channel as usize;
		r * side * side + g * side + b
	}
}

// ============================================================================
// Histogram Computation
// ============================================================================

/// Compute the normalized histogram of a decoded image.
///
/// Images with more than 8 bits per channel keep the high byte of each
/// channel (`c >> 8`). Float images are clamped to `[0, 1]` and scaled down.
///
/// # Errors
///
/// Returns [`CoreError::InvalidBinCount`] for an invalid configuration.
pub fn compute_histogram(image: &DynamicImage, config: &HistogramConfig) -> Result<ColorHistogram> {
	compute_rgb_histogram(&truncate_to_rgb8(image), config)
}

/// 8-bit RGB view of any decoded image, truncating deeper channels.
fn truncate_to_rgb8(image: &DynamicImage) -> Cow<'_, RgbImage> {
	match image {
		DynamicImage::ImageRgb8(rgb) => Cow::Borrowed(rgb),
		DynamicImage::ImageLuma16(_)
		| DynamicImage::ImageLumaA16(_)
		| DynamicImage::ImageRgb16(_)
		| DynamicImage::ImageRgba16(_) => {
			// Same depth, so this only drops alpha or spreads luma
			let wide = image.to_rgb16();
			Cow::Owned(RgbImage::from_fn(wide.width(), wide.height(), |x, y| {
				let [r, g, b] = wide.get_pixel(x, y).0;
				Rgb([high_byte(r), high_byte(g), high_byte(b)])
			}))
		}
		DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => {
			let wide = image.to_rgb32f();
			Cow::Owned(RgbImage::from_fn(wide.width(), wide.height(), |x, y| {
				let [r, g, b] = wide.get_pixel(x, y).0;
				Rgb([unit_to_byte(r), unit_to_byte(g), unit_to_byte(b)])
			}))
		}
		_ => Cow::Owned(image.to_rgb8()),
	}
}

#[allow(clippy::cast_possible_truncation)]
const fn high_byte(channel: u16) -> u8 {
	(channel >> 8) as u8
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn unit_to_byte(channel: f32) -> u8 {
	(channel.clamp(0.0, 1.0) * 255.0) as u8
}

/// Compute the normalized histogram of an 8-bit RGB buffer in a single pass.
///
/// # Errors
///
/// Returns [`CoreError::InvalidBinCount`] for an invalid configuration.
#[allow(clippy::cast_precision_loss)]
pub fn compute_rgb_histogram(image: &RgbImage, config: &HistogramConfig) -> Result<ColorHistogram> {
	let mut histogram = ColorHistogram::new(config.bins_per_channel)?;

	let side = config.bins_per_channel as usize;
	let bin_size = 256 / side;
	let last = side - 1;
	let bucket = |channel: u8| (usize::from(channel) / bin_size).min(last);

	for pixel in image.pixels() {
		let [r, g, b] = pixel.0;
		let index = histogram.bin_index(bucket(r), bucket(g), bucket(b));
		histogram.bins[index] += 1.0;
		histogram.pixel_count += 1;
	}

	if histogram.pixel_count > 0 {
		let total = histogram.pixel_count as f64;
		for bin in histogram.bins.iter_mut() {
			*bin /= total;
		}
	}

	Ok(histogram)
}

/// Open an image file and compute its histogram.
///
/// # Errors
///
/// Returns [`CoreError::FrameDecode`] when the file cannot be read or decoded.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn histogram_from_path(path: impl AsRef<Path>, config: &HistogramConfig) -> Result<ColorHistogram> {
	let path = path.as_ref();
	let image = image::open(path).map_err(|source| CoreError::FrameDecode {
		path: path.to_path_buf(),
		source,
	})?;
	compute_histogram(&image, config)
}

// ============================================================================
// Correlation
// ============================================================================

/// Pearson correlation between two histograms, in `[-1, 1]`.
///
/// Both histograms must use the same bins per channel. Comparing different
/// sizes is a caller error: debug builds assert, release builds compare the
/// common prefix and the score is meaningless.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compare_histograms(a: &ColorHistogram, b: &ColorHistogram) -> f64 {
	debug_assert_eq!(
		a.bins_per_channel, b.bins_per_channel,
		"histograms with different bin counts are not comparable"
	);
	let n = a.bins.len().min(b.bins.len());
	if n == 0 {
		return 1.0;
	}
	let (a, b) = (&a.bins[..n], &b.bins[..n]);

	let mean_a = a.iter().sum::<f64>() / n as f64;
	let mean_b = b.iter().sum::<f64>() / n as f64;

	let mut numerator = 0.0;
	let mut var_a = 0.0;
	let mut var_b = 0.0;
	for (x, y) in a.iter().zip(b) {
		let dx = x - mean_a;
		let dy = y - mean_b;
		numerator += dx * dy;
		var_a += dx * dx;
		var_b += dy * dy;
	}

	let denominator = (var_a * var_b).sqrt();
	if denominator < DEGENERATE_DENOMINATOR {
		return 1.0;
	}

	(numerator / denominator).clamp(-1.0, 1.0)
}

// ============================================================================
// Tests
// ============================================================================
