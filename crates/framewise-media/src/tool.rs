//! Running the external media tool as a cancellable subprocess.
//!
//! The tool is always invoked with an explicit argument list, never through
//! a shell. Stderr is captured so failures carry the tool's own diagnostics.
//! A run ends in one of four ways:
//!
//! - exit 0: [`ToolOutput`]
//! - non-zero exit: [`MediaError::ToolFailed`]
//! - cancellation signal: the child is killed, [`MediaError::Cancelled`]
//! - deadline: the child is killed, [`MediaError::Timeout`]

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::error::{MediaError, Result, ToolStage};

/// Number of trailing stderr lines kept as diagnostics.
const DIAGNOSTIC_LINES: usize = 40;

// ============================================================================
// Configuration
// ============================================================================

/// Locations of the external tools and run limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
	/// FFmpeg binary (name on PATH or absolute path)
	pub ffmpeg: PathBuf,

	/// FFprobe binary
	pub ffprobe: PathBuf,

	/// Kill any single tool run after this many seconds
	pub timeout_secs: Option<u64>,
}

impl Default for ToolConfig {
	fn default() -> Self {
		Self {
			ffmpeg: PathBuf::from("ffmpeg"),
			ffprobe: PathBuf::from("ffprobe"),
			timeout_secs: None,
		}
	}
}

// ============================================================================
// Tool Detection
// ============================================================================

/// Check that a tool can be started, by running it with `-version`.
///
/// # Errors
///
/// Returns [`MediaError::ToolNotFound`] if the program is missing or fails.
#[instrument(skip_all, fields(tool = %program.as_ref().display()))]
pub async fn check_tool(program: impl AsRef<Path>) -> Result<()> {
	let program = program.as_ref();
	let status = Command::new(program)
		.arg("-version")
		.stdin(Stdio::null())
		.stdout(Stdio::null())
		.stderr(Stdio::null())
		.status()
		.await;

	match status {
		Ok(status) if status.success() => Ok(()),
		_ => Err(MediaError::ToolNotFound {
			tool: program.display().to_string(),
		}),
	}
}

// ============================================================================
// Tool Runner
// ============================================================================

/// Captured output of a successful run.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
	/// Raw stdout
	pub stdout: Vec<u8>,

	/// Trailing stderr lines
	pub diagnostics: String,
}

/// Runs one external program with optional cancellation and deadline.
#[derive(Debug, Clone)]
pub struct ToolRunner {
	program: PathBuf,
	cancel_rx: Option<watch::Receiver<bool>>,
	timeout: Option<Duration>,
}

impl ToolRunner {
	/// Create a runner for a program.
	pub fn new(program: impl Into<PathBuf>) -> Self {
		Self {
			program: program.into(),
			cancel_rx: None,
			timeout: None,
		}
	}

	/// Runner for the configured FFmpeg binary.
	#[must_use]
	pub fn ffmpeg(config: &ToolConfig) -> Self {
		Self::new(&config.ffmpeg).with_timeout_secs(config.timeout_secs)
	}

	/// Runner for the configured FFprobe binary.
	#[must_use]
	pub fn ffprobe(config: &ToolConfig) -> Self {
		Self::new(&config.ffprobe).with_timeout_secs(config.timeout_secs)
	}

	/// Set cancellation signal. Sending `true` kills a running child.
	#[must_use]
	pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
		self.cancel_rx = Some(cancel_rx);
		self
	}

	/// Set an optional cancellation signal.
	#[must_use]
	pub fn with_cancel_opt(mut self, cancel_rx: Option<watch::Receiver<bool>>) -> Self {
		self.cancel_rx = cancel_rx;
		self
	}

	/// Set timeout.
	#[must_use]
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);
		self
	}

	fn with_timeout_secs(mut self, secs: Option<u64>) -> Self {
		self.timeout = secs.map(Duration::from_secs);
		self
	}

	/// The program this runner starts.
	#[must_use]
	pub fn program(&self) -> &Path {
		&self.program
	}

	/// Display name used in errors.
	fn tool_name(&self) -> String {
		self.program
			.file_name()
			.unwrap_or(self.program.as_os_str())
			.to_string_lossy()
			.into_owned()
	}

	/// Check if the caller has already asked to cancel.
	#[must_use]
	pub fn is_cancelled(&self) -> bool {
		self.cancel_rx.as_ref().is_some_and(|rx| *rx.borrow())
	}

	/// Fail fast with [`MediaError::Cancelled`] if cancellation was requested.
	///
	/// # Errors
	///
	/// Returns [`MediaError::Cancelled`].
	pub fn ensure_not_cancelled(&self) -> Result<()> {
		if self.is_cancelled() {
			return Err(MediaError::Cancelled);
		}
		Ok(())
	}

	/// Run the program to completion.
	///
	/// # Errors
	///
	/// Returns [`MediaError::ToolNotFound`] if it cannot be started,
	/// [`MediaError::ToolFailed`] on a non-zero exit, and
	/// [`MediaError::Cancelled`] / [`MediaError::Timeout`] if stopped early.
	#[instrument(skip_all, fields(tool = %self.program.display(), %stage))]
	pub async fn run(&self, stage: ToolStage, args: &[OsString]) -> Result<ToolOutput> {
		self.ensure_not_cancelled()?;
		debug!(args = ?args, "Running tool");

		let child = Command::new(&self.program)
			.args(args)
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true)
			.spawn()
			.map_err(|e| match e.kind() {
				ErrorKind::NotFound | ErrorKind::PermissionDenied => MediaError::ToolNotFound {
					tool: self.tool_name(),
				},
				_ => MediaError::Io(e),
			})?;

		// Dropping this future drops the child, which kills it.
		let completion = child.wait_with_output();
		tokio::pin!(completion);

		let output = tokio::select! {
			output = &mut completion => output?,
			() = cancelled(self.cancel_rx.clone()) => {
				info!("Tool cancelled, killing process");
				return Err(MediaError::Cancelled);
			}
			() = deadline(self.timeout) => {
				let seconds = self.timeout.map_or(0, |t| t.as_secs());
				warn!(seconds, "Tool timed out, killing process");
				return Err(MediaError::Timeout { seconds });
			}
		};

		let diagnostics = diagnostic_tail(&String::from_utf8_lossy(&output.stderr));
		if !output.status.success() {
			return Err(MediaError::ToolFailed {
				tool: self.tool_name(),
				stage,
				exit_code: output.status.code(),
				diagnostics,
			});
		}

		Ok(ToolOutput {
			stdout: output.stdout,
			diagnostics,
		})
	}
}

/// Resolves once the signal reads `true`; never resolves without a signal.
async fn cancelled(cancel_rx: Option<watch::Receiver<bool>>) {
	let Some(mut rx) = cancel_rx else {
		return std::future::pending().await;
	};
	loop {
		if *rx.borrow_and_update() {
			return;
		}
		if rx.changed().await.is_err() {
			// Sender dropped without cancelling.
			return std::future::pending().await;
		}
	}
}

async fn deadline(timeout: Option<Duration>) {
	match timeout {
		Some(timeout) => tokio::time::sleep(timeout).await,
		None => std::future::pending().await,
	}
}

/// Keep the last lines of stderr, trimmed.
#[must_use]
pub fn diagnostic_tail(stderr: &str) -> String {
	let lines: Vec<&str> = stderr.trim().lines().collect();
	let start = lines.len().saturating_sub(DIAGNOSTIC_LINES);
	lines[start..].join("\n")
}

// ============================================================================
// Output Validation
// ============================================================================

/// Check that a tool left a non-empty file behind. Returns its size.
///
/// # Errors
///
/// Returns [`MediaError::EmptyOutput`] if the file is missing or zero bytes.
pub async fn validate_output(stage: ToolStage, path: &Path, diagnostics: &str) -> Result<u64> {
	let empty = || MediaError::EmptyOutput {
		stage,
		path: path.to_path_buf(),
		diagnostics: diagnostics.to_string(),
	};
	match tokio::fs::metadata(path).await {
		Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(meta.len()),
		Ok(_) => Err(empty()),
		Err(e) if e.kind() == ErrorKind::NotFound => Err(empty()),
		Err(e) => Err(MediaError::Io(e)),
	}
}

// ============================================================================
// Tests
// ============================================================================
