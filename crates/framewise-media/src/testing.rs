//! Stand-in executables for unit tests.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Write an executable `sh` script named `name` into `dir`.
pub fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
	let path = dir.join(name);
	std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
	std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
	path
}

/// A tool that runs until it is killed.
pub fn slow_tool(dir: &Path) -> PathBuf {
	fake_tool(dir, "slow-ffmpeg", "exec sleep 30")
}

/// Entries directly inside `dir`.
pub fn entry_count(dir: &Path) -> usize {
	std::fs::read_dir(dir).unwrap().count()
}
