//! Owned temporary artifacts with guaranteed, exactly-once cleanup.
//!
//! [`ScratchDir`] holds extracted frames and [`ScratchFile`] holds a single
//! transcoded output. Both get a unique name at creation and remove their
//! artifact either when [`release`](ScratchDir::release) is called or when
//! dropped, whichever comes first. Dropping covers error returns and
//! cancelled futures. Releasing twice is a no-op.

use std::path::{Path, PathBuf};

use tempfile::{Builder, TempDir, TempPath};
use tracing::{debug, warn};

use crate::error::Result;

// ============================================================================
// Scratch Directory
// ============================================================================

/// A uniquely named temporary directory owned by one pipeline run.
#[derive(Debug)]
pub struct ScratchDir {
	path: PathBuf,
	dir: Option<TempDir>,
}

impl ScratchDir {
	/// Create a directory named `<prefix><random>` under `root`, or the
	/// system temp directory when `root` is `None`.
	///
	/// # Errors
	///
	/// Returns an I/O error if the directory cannot be created.
	pub fn create(root: Option<&Path>, prefix: &str) -> Result<Self> {
		let mut builder = Builder::new();
		let _ = builder.prefix(prefix);
		let dir = match root {
			Some(root) => {
				std::fs::create_dir_all(root)?;
				builder.tempdir_in(root)?
			}
			None => builder.tempdir()?,
		};
		debug!(path = %dir.path().display(), "Created scratch directory");
		Ok(Self {
			path: dir.path().to_path_buf(),
			dir: Some(dir),
		})
	}

	/// Directory path. Still returned after release, but no longer exists.
	#[must_use]
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Check if the directory has been removed.
	#[must_use]
	pub const fn is_released(&self) -> bool {
		self.dir.is_none()
	}

	/// Remove the directory and everything in it. Safe to call repeatedly.
	///
	/// # Errors
	///
	/// Returns an I/O error if removal fails on the first call.
	pub fn release(&mut self) -> Result<()> {
		if let Some(dir) = self.dir.take() {
			dir.close()?;
			debug!(path = %self.path.display(), "Released scratch directory");
		}
		Ok(())
	}
}

impl Drop for ScratchDir {
	fn drop(&mut self) {
		if let Err(e) = self.release() {
			warn!(path = %self.path.display(), error = %e, "Failed to remove scratch directory");
		}
	}
}

// ============================================================================
// Scratch File
// ============================================================================

/// A uniquely named temporary file path owned by one pipeline run.
///
/// No handle is held open, so an external tool can write the path directly.
#[derive(Debug)]
pub struct ScratchFile {
	path: PathBuf,
	file: Option<TempPath>,
}

impl ScratchFile {
	/// Reserve `<prefix><random><suffix>` inside `dir`.
	///
	/// The suffix should carry the extension the tool uses to pick a container.
	///
	/// # Errors
	///
	/// Returns an I/O error if the file cannot be created.
	pub fn create(dir: &Path, prefix: &str, suffix: &str) -> Result<Self> {
		std::fs::create_dir_all(dir)?;
		let file = Builder::new()
			.prefix(prefix)
			.suffix(suffix)
			.tempfile_in(dir)?
			.into_temp_path();
		debug!(path = %file.display(), "Created scratch file");
		Ok(Self {
			path: file.to_path_buf(),
			file: Some(file),
		})
	}

	/// File path. Still returned after release, but no longer exists.
	#[must_use]
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Check if the file has been removed or persisted.
	#[must_use]
	pub const fn is_released(&self) -> bool {
		self.file.is_none()
	}

	/// Delete the file. Safe to call repeatedly.
	///
	/// # Errors
	///
	/// Returns an I/O error if removal fails on the first call.
	pub fn release(&mut self) -> Result<()> {
		if let Some(file) = self.file.take() {
			file.close()?;
			debug!(path = %self.path.display(), "Released scratch file");
		}
		Ok(())
	}

	/// Move the file to `destination` and give up ownership of it.
	///
	/// After this the file is no longer removed on drop.
	///
	/// # Errors
	///
	/// Returns an I/O error if the file was already released or cannot be moved.
	pub fn persist(mut self, destination: &Path) -> Result<PathBuf> {
		let Some(file) = self.file.take() else {
			return Err(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("scratch file {} already released", self.path.display()),
			)
			.into());
		};
		match file.persist(destination) {
			Ok(()) => Ok(destination.to_path_buf()),
			Err(e) => {
				// Put the path back so drop still removes it.
				self.file = Some(e.path);
				Err(e.error.into())
			}
		}
	}
}

impl Drop for ScratchFile {
	fn drop(&mut self) {
		if let Err(e) = self.release() {
			warn!(path = %self.path.display(), error = %e, "Failed to remove scratch file");
		}
	}
}

// ============================================================================
// Tests
// ============================================================================
