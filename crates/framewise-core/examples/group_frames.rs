//! Scene Grouping Example
//!
//! Groups the images in a directory into scenes and prints one line per
//! scene with its representative frame. Frames are taken in file-name order,
//! which matches temporal order for zero-padded names like `frame_000001.jpg`.
//!
//! Run with: `cargo run --example group_frames -- <frame-dir> [threshold]`

use std::path::PathBuf;

use framewise_core::{GroupingConfig, SceneGrouper};

fn main() -> Result<(), Box<dyn std::error::Error>> {
	let mut args = std::env::args().skip(1);
	let dir = args.next().ok_or("usage: group_frames <frame-dir> [threshold]")?;
	let threshold = match args.next() {
		Some(value) => value.parse()?,
		None => GroupingConfig::default().threshold,
	};

	let mut frames: Vec<PathBuf> = std::fs::read_dir(&dir)?
		.filter_map(|entry| entry.ok().map(|e| e.path()))
		.filter(|path| path.is_file())
		.collect();
	frames.sort();

	println!("=== Scene Grouping ({} frames, threshold {threshold}) ===\n", frames.len());

	let grouper = SceneGrouper::new(GroupingConfig {
		threshold,
		..GroupingConfig::default()
	})?;
	let grouping = grouper.group_paths(&frames)?;

	for (scene, group) in grouping.groups.iter().enumerate() {
		println!(
			"Scene {scene:>3}: frames {:>5}..={:<5} ({:>4} frames) -> {}",
			group.start_index,
			group.end_index,
			group.frame_count,
			group.representative_path.display()
		);
	}

	println!(
		"\n{} scenes, {} unreadable frames, {:.1}% of frames need analysis",
		grouping.summary.group_count,
		grouping.summary.decode_failures,
		grouping.summary.reduction_ratio() * 100.0
	);

	Ok(())
}
