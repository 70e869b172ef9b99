//! End-to-end runs against a real FFmpeg.
//!
//! Each test generates a short synthetic clip and skips itself when FFmpeg,
//! FFprobe, or the x264 encoder is not available.

use std::path::{Path, PathBuf};
use std::process::Command;

use framewise_core::FrameGroup;
use framewise_media::{
	compress_for_analysis, enhance_video, probe_video_properties, FrameEditor, MediaError,
	PipelineConfig, Result, ToolConfig, ToolRunner,
};
use image::{ImageBuffer, Rgb};

fn init_logging() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter("framewise_media=debug")
		.with_test_writer()
		.try_init();
}

fn media_tools_available() -> bool {
	let encoders = Command::new("ffmpeg").args(["-hide_banner", "-encoders"]).output();
	let probe = Command::new("ffprobe").arg("-version").output();
	matches!(
		(encoders, probe),
		(Ok(encoders), Ok(probe))
			if encoders.status.success()
				&& probe.status.success()
				&& String::from_utf8_lossy(&encoders.stdout).contains("libx264")
	)
}

/// One second of red followed by one second of blue, 64x48 at 10 fps.
fn two_scene_clip(dir: &Path) -> PathBuf {
	let path = dir.join("two_scenes.mp4");
	let status = Command::new("ffmpeg")
		.args(["-hide_banner", "-loglevel", "error", "-y"])
		.args(["-f", "lavfi", "-i", "color=c=red:s=64x48:r=10:d=1"])
		.args(["-f", "lavfi", "-i", "color=c=blue:s=64x48:r=10:d=1"])
		.args(["-filter_complex", "[0:v][1:v]concat=n=2:v=1:a=0[v]", "-map", "[v]"])
		.args(["-c:v", "libx264", "-pix_fmt", "yuv420p"])
		.arg(&path)
		.status()
		.unwrap();
	assert!(status.success());
	path
}

/// Replaces every representative with a solid green frame.
struct GreenEditor {
	dir: PathBuf,
}

impl FrameEditor for GreenEditor {
	async fn edit(&self, group: &FrameGroup) -> Result<Option<PathBuf>> {
		let path = self.dir.join(format!("edit_{}.png", group.start_index));
		ImageBuffer::from_pixel(32, 24, Rgb([0_u8, 255, 0])).save(&path)?;
		Ok(Some(path))
	}
}

#[tokio::test]
async fn test_enhance_two_scene_clip() {
	if !media_tools_available() {
		eprintln!("skipping: ffmpeg with libx264 not available");
		return;
	}
	init_logging();

	let dir = tempfile::tempdir().unwrap();
	let clip = two_scene_clip(dir.path());
	let edits = dir.path().join("edits");
	std::fs::create_dir(&edits).unwrap();
	let scratch = dir.path().join("scratch");
	let output = dir.path().join("enhanced.mp4");

	let mut config = PipelineConfig::default();
	config.extraction.scratch_root = Some(scratch.clone());

	let editor = GreenEditor { dir: edits };
	let report = enhance_video(&clip, &output, &editor, &config, None).await.unwrap();

	assert!((report.extraction_frame_rate - 10.0).abs() < 0.01);
	assert!(report.total_frames >= 18);
	assert!(report.summary.group_count >= 2);
	assert!(report.summary.group_count < report.total_frames);
	assert_eq!(report.edited_scenes, report.scenes.len());
	assert_eq!(report.scenes.first().unwrap().start_index, 0);
	assert_eq!(report.scenes.last().unwrap().end_index, report.total_frames - 1);
	assert!(report.output_bytes > 0);

	// Frames were released, the output keeps the source size
	assert_eq!(std::fs::read_dir(&scratch).unwrap().count(), 0);
	let probe = ToolRunner::ffprobe(&ToolConfig::default());
	let properties = probe_video_properties(&probe, &output).await.unwrap();
	assert_eq!(properties.width, Some(64));
	assert_eq!(properties.height, Some(48));
}

#[tokio::test]
async fn test_compress_two_scene_clip() {
	if !media_tools_available() {
		eprintln!("skipping: ffmpeg with libx264 not available");
		return;
	}
	init_logging();

	let dir = tempfile::tempdir().unwrap();
	let clip = two_scene_clip(dir.path());
	let mut config = PipelineConfig::default();
	config.extraction.scratch_root = Some(dir.path().join("scratch"));

	let mut compressed = compress_for_analysis(&clip, &config, None).await.unwrap();
	assert_eq!(compressed.plan.target_long_edge, 64);
	assert!((compressed.plan.target_frame_rate - 5.0).abs() < f64::EPSILON);
	assert!(compressed.bytes > 0);

	let path = compressed.path().to_path_buf();
	assert!(path.exists());
	compressed.release().unwrap();
	assert!(!path.exists());
}

#[tokio::test]
async fn test_enhance_rejects_non_video() {
	if !media_tools_available() {
		eprintln!("skipping: ffmpeg with libx264 not available");
		return;
	}

	let dir = tempfile::tempdir().unwrap();
	let bogus = dir.path().join("notes.mp4");
	std::fs::write(&bogus, b"definitely not a video").unwrap();
	let editor = GreenEditor {
		dir: dir.path().to_path_buf(),
	};

	let err = enhance_video(
		&bogus,
		dir.path().join("out.mp4"),
		&editor,
		&PipelineConfig::default(),
		None,
	)
	.await
	.unwrap_err();
	assert!(matches!(err, MediaError::InvalidVideo { .. }));
	assert!(err.diagnostics().is_some());
}
