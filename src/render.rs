use crate::config::RenderConfig;
use crate::context::Timeline;
use anyhow::{bail, Context, Result};
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// One line of the video concat list: where the frame comes from and how long
/// it holds. The final repeated frame carries no duration.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoEntry {
    pub path: PathBuf,
    pub duration: Option<f64>,
}

/// Resolves a timeline media reference against the places assets actually end
/// up. First match wins: absolute reference, CWD-relative, under the episode
/// root, or the bare file name under `assets/<subdir>/`. An unresolved
/// reference comes back unchanged for the caller to decide.
fn resolve_media_reference(reference: &str, episode_root: &Path, assets_subdir: &str) -> PathBuf {
    let p = Path::new(reference);
    if p.is_absolute() {
        return p.to_path_buf();
    }
    if p.exists() {
        return p.to_path_buf();
    }

    let joined = episode_root.join(p);
    if joined.exists() {
        return joined;
    }

    if let Some(name) = p.file_name() {
        let under_assets = episode_root.join("assets").join(assets_subdir).join(name);
        if under_assets.exists() {
            return under_assets;
        }
    }

    p.to_path_buf()
}

fn absolutize(path: PathBuf) -> PathBuf {
    std::path::absolute(&path).unwrap_or(path)
}

/// Builds the visual sequence. Entries are never dropped: a missing image is
/// logged and handed to ffmpeg anyway, which keeps slot timings intact. The
/// last frame is repeated once with no duration so it does not cut away
/// instantly.
pub fn build_video_sequence(timeline: &Timeline, episode_root: &Path) -> Vec<VideoEntry> {
    let mut entries = Vec::new();

    for clip in &timeline.tracks.video {
        let resolved = resolve_media_reference(&clip.image_file, episode_root, "images");
        if !resolved.exists() {
            warn!("Image file not found: {}", resolved.display());
        }

        entries.push(VideoEntry {
            path: absolutize(resolved),
            duration: Some(clip.end_time_sec - clip.start_time_sec),
        });
    }

    if let Some(last) = entries.last().cloned() {
        entries.push(VideoEntry {
            path: last.path,
            duration: None,
        });
    }

    entries
}

/// Builds the narration sequence. Unlike visuals, a chunk that cannot be
/// found is skipped: feeding ffmpeg a bad audio path fails the whole encode.
pub fn build_audio_sequence(timeline: &Timeline, episode_root: &Path) -> Vec<PathBuf> {
    let mut entries = Vec::new();

    for clip in &timeline.tracks.audio {
        let resolved = resolve_media_reference(&clip.audio_file, episode_root, "audio");
        if !resolved.exists() {
            warn!("Audio file not found: {}", resolved.display());
            continue;
        }
        entries.push(absolutize(resolved));
    }

    entries
}

fn concat_path_line(path: &Path) -> String {
    format!("file '{}'\n", path.to_string_lossy().replace('\\', "/"))
}

pub fn format_video_concat(entries: &[VideoEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&concat_path_line(&entry.path));
        if let Some(duration) = entry.duration {
            out.push_str(&format!("duration {duration}\n"));
        }
    }
    out
}

pub fn format_audio_concat(paths: &[PathBuf]) -> String {
    paths.iter().map(|p| concat_path_line(p)).collect()
}

/// Renders one episode's timeline into `final_video.mp4`.
///
/// The first ffmpeg attempt muxes video and audio; if it exits non-zero the
/// render is retried exactly once without the audio track, since bad audio
/// (undersized clips that slipped past the guard, format mismatches) is the
/// usual culprit and a silent video beats no video. A spawn failure (ffmpeg
/// not installed) is not retried.
pub async fn render_episode(
    episode_id: &str,
    episodes_dir: &Path,
    render: &RenderConfig,
) -> Result<PathBuf> {
    let episode_root = episodes_dir.join(episode_id);
    let timeline_path = episode_root.join("timeline.json");
    if !timeline_path.exists() {
        bail!("Timeline not found at {}", timeline_path.display());
    }

    let content = fs::read_to_string(&timeline_path)
        .with_context(|| format!("Failed to read {}", timeline_path.display()))?;
    let timeline: Timeline = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", timeline_path.display()))?;

    if timeline.tracks.video.is_empty() {
        bail!("No video tracks found.");
    }

    let output_path = episode_root.join("final_video.mp4");
    println!("Rendering {} to {}...", episode_id, output_path.display());

    let video_entries = build_video_sequence(&timeline, &episode_root);
    let audio_entries = build_audio_sequence(&timeline, &episode_root);

    let video_list = episode_root.join("video_concat.txt");
    fs::write(&video_list, format_video_concat(&video_entries))
        .with_context(|| format!("Failed to write {}", video_list.display()))?;

    let audio_list = episode_root.join("audio_concat.txt");
    fs::write(&audio_list, format_audio_concat(&audio_entries))
        .with_context(|| format!("Failed to write {}", audio_list.display()))?;

    let status = run_ffmpeg(&video_list, Some(&audio_list), &output_path, render).await?;
    if status {
        println!("Render complete.");
        return Ok(output_path);
    }

    warn!("FFmpeg failed with audio. Retrying video-only render...");
    let status = run_ffmpeg(&video_list, None, &output_path, render).await?;
    if status {
        println!("Video-only render complete (audio omitted due to errors).");
        return Ok(output_path);
    }

    bail!("FFmpeg video-only render also failed");
}

/// Runs one ffmpeg pass. `Ok(false)` means ffmpeg ran and exited non-zero;
/// a spawn failure is an error in its own right.
async fn run_ffmpeg(
    video_list: &Path,
    audio_list: Option<&Path>,
    output_path: &Path,
    render: &RenderConfig,
) -> Result<bool> {
    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-y")
        .args(["-f", "concat", "-safe", "0", "-i"])
        .arg(video_list);

    if let Some(audio_list) = audio_list {
        cmd.args(["-f", "concat", "-safe", "0", "-i"]).arg(audio_list);
    }

    cmd.args(["-c:v", "libx264", "-r"])
        .arg(render.frame_rate.to_string())
        .arg("-pix_fmt")
        .arg(&render.pixel_format);

    if audio_list.is_some() {
        cmd.args(["-c:a", "aac", "-b:a"]).arg(&render.audio_bitrate);
    }

    cmd.arg("-shortest").arg(output_path);

    info!("Running FFmpeg: {:?}", cmd.as_std());

    let status = cmd
        .status()
        .await
        .context("FFmpeg not found in PATH or failed to spawn")?;
    Ok(status.success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AudioClip, Tracks, VideoClip};

    fn timeline_with(video: Vec<VideoClip>, audio: Vec<AudioClip>) -> Timeline {
        Timeline {
            episode_id: "ep".to_string(),
            frame_rate: Some(30),
            tracks: Tracks { video, audio },
        }
    }

    fn video_clip(image_file: &str, start: f64, end: f64) -> VideoClip {
        VideoClip {
            slot_id: "slot".to_string(),
            image_file: image_file.to_string(),
            start_time_sec: start,
            end_time_sec: end,
            transition_in: None,
            transition_out: None,
        }
    }

    fn audio_clip(audio_file: &str) -> AudioClip {
        AudioClip {
            chunk_id: "chunk".to_string(),
            audio_file: audio_file.to_string(),
            start_time_sec: 0.0,
            end_time_sec: 10.0,
        }
    }

    #[test]
    fn test_bare_filename_resolves_under_assets() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let images = root.join("assets").join("images");
        fs::create_dir_all(&images).unwrap();
        fs::write(images.join("shot.png"), b"img").unwrap();

        let resolved = resolve_media_reference("shot.png", root, "images");
        assert_eq!(resolved, images.join("shot.png"));
    }

    #[test]
    fn test_episode_root_join_preferred_over_assets() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("local")).unwrap();
        fs::write(root.join("local").join("shot.png"), b"img").unwrap();

        let resolved = resolve_media_reference("local/shot.png", root, "images");
        assert_eq!(resolved, root.join("local").join("shot.png"));
    }

    #[test]
    fn test_absolute_reference_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let abs = dir.path().join("anywhere.png");
        let resolved =
            resolve_media_reference(&abs.to_string_lossy(), Path::new("/elsewhere"), "images");
        assert_eq!(resolved, abs);
    }

    #[test]
    fn test_unresolved_reference_is_returned_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_media_reference("ghost.png", dir.path(), "images");
        assert_eq!(resolved, PathBuf::from("ghost.png"));
    }

    #[test]
    fn test_video_sequence_keeps_missing_and_repeats_last() {
        let dir = tempfile::tempdir().unwrap();
        let timeline = timeline_with(
            vec![
                video_clip("missing_a.png", 0.0, 4.0),
                video_clip("missing_b.png", 4.0, 10.0),
            ],
            vec![],
        );

        let entries = build_video_sequence(&timeline, dir.path());
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].duration, Some(4.0));
        assert_eq!(entries[1].duration, Some(6.0));
        assert_eq!(entries[2].duration, None);
        assert_eq!(entries[2].path, entries[1].path);
        assert!(entries[0].path.is_absolute());
    }

    #[test]
    fn test_audio_sequence_skips_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let audio_dir = root.join("assets").join("audio");
        fs::create_dir_all(&audio_dir).unwrap();
        fs::write(audio_dir.join("real.wav"), b"wav").unwrap();

        let timeline = timeline_with(
            vec![],
            vec![audio_clip("real.wav"), audio_clip("phantom.wav")],
        );

        let entries = build_audio_sequence(&timeline, root);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].ends_with("assets/audio/real.wav"));
    }

    #[test]
    fn test_concat_formats() {
        let entries = vec![
            VideoEntry {
                path: PathBuf::from("/a/one.png"),
                duration: Some(2.5),
            },
            VideoEntry {
                path: PathBuf::from("/a/one.png"),
                duration: None,
            },
        ];
        let video = format_video_concat(&entries);
        assert_eq!(video, "file '/a/one.png'\nduration 2.5\nfile '/a/one.png'\n");

        let audio = format_audio_concat(&[PathBuf::from("/a/voice.wav")]);
        assert_eq!(audio, "file '/a/voice.wav'\n");
    }

    #[tokio::test]
    async fn test_render_fails_without_timeline() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("ep")).unwrap();

        let result = render_episode("ep", dir.path(), &RenderConfig::default()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_render_fails_without_video_track() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("ep");
        fs::create_dir_all(&root).unwrap();
        fs::write(
            root.join("timeline.json"),
            r#"{"episode_id": "ep", "tracks": {"video": [], "audio": []}}"#,
        )
        .unwrap();

        let result = render_episode("ep", dir.path(), &RenderConfig::default()).await;
        assert!(result.is_err());
    }
}
