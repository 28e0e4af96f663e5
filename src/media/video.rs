// Video transcoder: download a video and squeeze it under a byte budget.
//
// The download and the encoders are external programs behind `VideoTools`.
// All work happens on fixed file names inside the account directory, which
// may hold leftovers from a crashed run, so every step starts by clearing
// what it is about to write.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

pub const VIDEO_FILE: &str = "video.mp4";
const MAX_AUDIO_BPS: f64 = 128_000.0;
const MIB: f64 = 1024.0 * 1024.0;

/// Target bitrates for the two-pass encode, in kbit/s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bitrates {
    pub video_kbps: f64,
    /// `None` when the source has no audio stream.
    pub audio_kbps: Option<f64>,
}

impl Bitrates {
    pub fn video_arg(&self) -> String {
        format!("{}k", self.video_kbps.round() as i64)
    }

    pub fn audio_arg(&self) -> Option<String> {
        self.audio_kbps.map(|a| format!("{}k", a.round() as i64))
    }
}

/// Bitrates that make a `duration_s`-second video fit in `byte_budget` bytes.
///
/// Audio is capped at 128 kbit/s and subtracted from the total. Returns
/// `None` when nothing is left for the video.
pub fn target_bitrates(byte_budget: u64, duration_s: f64, audio_bps: Option<f64>) -> Option<Bitrates> {
    if !duration_s.is_finite() || duration_s <= 0.0 {
        return None;
    }

    let budget_mib = byte_budget as f64 / MIB;
    let audio_kbps = audio_bps.map(|bps| bps.clamp(0.0, MAX_AUDIO_BPS) / 1000.0);
    // 1.048576 converts MiB-based kbit to the encoder's decimal kbit.
    let video_kbps = (budget_mib * 8192.0) / (1.048576 * duration_s) - audio_kbps.unwrap_or(0.0);

    if !video_kbps.is_finite() || video_kbps <= 0.0 {
        return None;
    }

    Some(Bitrates {
        video_kbps,
        audio_kbps,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// Statistics only, no audio, output discarded.
    First,
    Second,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodeJob {
    pub pass: Pass,
    pub input: PathBuf,
    /// Ignored for the first pass.
    pub output: PathBuf,
    pub passlog_prefix: PathBuf,
    pub bitrates: Bitrates,
}

#[async_trait]
pub trait VideoTools: Send + Sync {
    /// Download `url` to `dest`, preferring formats near `size_hint_mb`.
    async fn download(&self, url: &str, dest: &Path, size_hint_mb: u64) -> Result<()>;

    /// Duration in seconds.
    async fn probe_duration(&self, path: &Path) -> Result<f64>;

    /// Bitrate of the first audio stream in bit/s, `None` without audio.
    async fn probe_audio_bitrate(&self, path: &Path) -> Result<Option<f64>>;

    async fn encode(&self, job: &EncodeJob) -> Result<()>;
}

/// `VideoTools` backed by yt-dlp, ffprobe and ffmpeg.
pub struct ExternalTools {
    pub downloader: String,
    pub ffmpeg: String,
    pub ffprobe: String,
}

impl ExternalTools {
    pub fn new(downloader: &str, ffmpeg: &str, ffprobe: &str) -> Self {
        Self {
            downloader: downloader.to_string(),
            ffmpeg: ffmpeg.to_string(),
            ffprobe: ffprobe.to_string(),
        }
    }

    fn encode_args(job: &EncodeJob) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-y".into(),
            "-i".into(),
            job.input.display().to_string(),
            "-c:v".into(),
            "libx264".into(),
            "-b:v".into(),
            job.bitrates.video_arg(),
        ];

        match job.pass {
            Pass::First => args.extend(["-pass", "1", "-an", "-f", "mp4"].map(String::from)),
            Pass::Second => {
                args.extend(["-pass", "2"].map(String::from));
                match job.bitrates.audio_arg() {
                    Some(audio) => {
                        args.extend(["-c:a", "aac", "-b:a"].map(String::from));
                        args.push(audio);
                    }
                    None => args.push("-an".to_string()),
                }
            }
        }

        args.extend([
            "-passlogfile".to_string(),
            job.passlog_prefix.display().to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
        ]);

        args.push(match job.pass {
            Pass::First => null_device().to_string(),
            Pass::Second => job.output.display().to_string(),
        });

        args
    }
}

#[async_trait]
impl VideoTools for ExternalTools {
    async fn download(&self, url: &str, dest: &Path, size_hint_mb: u64) -> Result<()> {
        let size_sort = format!("filesize~{size_hint_mb}M");
        let dest = dest.display().to_string();
        run_tool(
            &self.downloader,
            &[
                "-o", &dest, "-N", "8", "-f", "b", "-S", &size_sort, "--recode-video", "mp4",
                "--no-playlist", "--max-filesize", "500M", url,
            ],
        )
        .await
        .map(|_| ())
    }

    async fn probe_duration(&self, path: &Path) -> Result<f64> {
        let path = path.display().to_string();
        let out = run_tool(
            &self.ffprobe,
            &["-v", "error", "-show_entries", "format=duration", "-of", "csv=p=0", &path],
        )
        .await?;
        out.trim()
            .parse::<f64>()
            .with_context(|| format!("Unexpected duration \"{}\"", out.trim()))
    }

    async fn probe_audio_bitrate(&self, path: &Path) -> Result<Option<f64>> {
        let path = path.display().to_string();
        let out = run_tool(
            &self.ffprobe,
            &[
                "-v", "error", "-select_streams", "a:0", "-show_entries", "stream=bit_rate", "-of",
                "csv=p=0", &path,
            ],
        )
        .await?;
        parse_audio_bitrate(&out)
    }

    async fn encode(&self, job: &EncodeJob) -> Result<()> {
        let args = Self::encode_args(job);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        run_tool(&self.ffmpeg, &args).await.map(|_| ())
    }
}

/// Read ffprobe's `stream=bit_rate` output. Empty output means there is no
/// audio stream. Anything else that isn't a number (ffprobe prints `N/A`
/// when the stream declares no bit rate) is an error, so the caller gives up
/// on recompressing instead of dropping the soundtrack.
fn parse_audio_bitrate(out: &str) -> Result<Option<f64>> {
    let value = out.trim();
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse::<f64>()
        .map(Some)
        .with_context(|| format!("Unexpected audio bit rate \"{value}\""))
}

/// Run a program to completion and return its stdout.
async fn run_tool(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .with_context(|| format!("Failed to run {program}"))?;

    if !output.status.success() {
        anyhow::bail!(
            "{program} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn null_device() -> &'static str {
    if cfg!(windows) {
        "NUL"
    } else {
        "/dev/null"
    }
}

pub struct Transcoder {
    tools: Arc<dyn VideoTools>,
    work_dir: PathBuf,
}

impl Transcoder {
    pub fn new(tools: Arc<dyn VideoTools>, work_dir: &Path) -> Self {
        Self {
            tools,
            work_dir: work_dir.to_path_buf(),
        }
    }

    pub fn video_path(&self) -> PathBuf {
        self.work_dir.join(VIDEO_FILE)
    }

    fn temp_path(&self) -> PathBuf {
        self.work_dir.join(format!("tmp-{VIDEO_FILE}"))
    }

    fn passlog_prefix(&self) -> PathBuf {
        self.work_dir.join(format!("{VIDEO_FILE}-ffmpeg2pass"))
    }

    /// Download `url` and, if it is larger than `byte_budget`, re-encode it
    /// to fit. Returns the final file's bytes.
    ///
    /// A failed re-encode is only logged: the oversized original is
    /// returned and the caller's size check rejects it.
    pub async fn fetch_and_fit(&self, url: &str, byte_budget: u64) -> Result<Vec<u8>> {
        let video_path = self.video_path();
        remove_quietly(&video_path).await;
        self.clean_artifacts().await;

        let size_hint_mb = (byte_budget as f64 / MIB).floor().max(1.0) as u64;
        info!(url = url, "Downloading video");
        if let Err(e) = self.tools.download(url, &video_path, size_hint_mb).await {
            remove_quietly(&video_path).await;
            return Err(e).context("Video download failed");
        }

        let size = tokio::fs::metadata(&video_path)
            .await
            .with_context(|| format!("Downloaded video missing at {}", video_path.display()))?
            .len();

        if size > byte_budget {
            info!(size = size, budget = byte_budget, "Video too big, recompressing");
            if let Err(e) = self.recompress(byte_budget).await {
                warn!(error = %e, "Unable to recompress video");
            }
        }
        self.clean_artifacts().await;

        let data = tokio::fs::read(&video_path)
            .await
            .with_context(|| format!("Failed to read {}", video_path.display()))?;
        remove_quietly(&video_path).await;

        Ok(data)
    }

    async fn recompress(&self, byte_budget: u64) -> Result<()> {
        let video_path = self.video_path();
        let duration = self.tools.probe_duration(&video_path).await?;
        let audio_bps = self.tools.probe_audio_bitrate(&video_path).await?;

        let bitrates = target_bitrates(byte_budget, duration, audio_bps).ok_or_else(|| {
            anyhow::anyhow!("No positive video bitrate fits {byte_budget} bytes over {duration}s")
        })?;

        let mut job = EncodeJob {
            pass: Pass::First,
            input: video_path.clone(),
            output: self.temp_path(),
            passlog_prefix: self.passlog_prefix(),
            bitrates,
        };
        self.tools.encode(&job).await.context("First encoding pass failed")?;

        job.pass = Pass::Second;
        self.tools.encode(&job).await.context("Second encoding pass failed")?;

        tokio::fs::rename(&job.output, &video_path)
            .await
            .context("Failed to replace video with recompressed file")?;

        Ok(())
    }

    /// Remove pass logs and the temporary output.
    async fn clean_artifacts(&self) {
        remove_quietly(&self.temp_path()).await;

        let prefix = format!("{VIDEO_FILE}-ffmpeg2pass");
        let Ok(mut entries) = tokio::fs::read_dir(&self.work_dir).await else {
            return;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                remove_quietly(&entry.path()).await;
            }
        }
    }
}

async fn remove_quietly(path: &Path) {
    let _ = tokio::fs::remove_file(path).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_bitrates_clamps_audio() {
        let b = target_bitrates(40 * 1024 * 1024, 100.0, Some(160_000.0)).unwrap();
        assert_eq!(b.audio_kbps, Some(128.0));
        assert!((b.video_kbps - 2997.0).abs() < 1e-6);
        assert_eq!(b.video_arg(), "2997k");
        assert_eq!(b.audio_arg().as_deref(), Some("128k"));
    }

    #[test]
    fn test_target_bitrates_without_audio() {
        let b = target_bitrates(40 * 1024 * 1024, 100.0, None).unwrap();
        assert_eq!(b.audio_kbps, None);
        assert!((b.video_kbps - 3125.0).abs() < 1e-6);
    }

    #[test]
    fn test_target_bitrates_infeasible() {
        // An hour of video in 1 MiB leaves nothing once audio is reserved.
        assert!(target_bitrates(1024 * 1024, 3600.0, Some(128_000.0)).is_none());
        assert!(target_bitrates(1024 * 1024, 0.0, None).is_none());
        assert!(target_bitrates(1024 * 1024, f64::NAN, None).is_none());
    }

    fn job(pass: Pass, audio: Option<f64>) -> EncodeJob {
        EncodeJob {
            pass,
            input: PathBuf::from("/w/video.mp4"),
            output: PathBuf::from("/w/tmp-video.mp4"),
            passlog_prefix: PathBuf::from("/w/video.mp4-ffmpeg2pass"),
            bitrates: Bitrates {
                video_kbps: 2997.0,
                audio_kbps: audio,
            },
        }
    }

    #[test]
    fn test_first_pass_args() {
        let args = ExternalTools::encode_args(&job(Pass::First, Some(128.0)));
        assert!(args.windows(2).any(|w| w == ["-pass", "1"]));
        assert!(args.contains(&"-an".to_string()));
        assert!(!args.contains(&"/w/tmp-video.mp4".to_string()));
        assert_eq!(args.last().map(String::as_str), Some(null_device()));
    }

    #[test]
    fn test_second_pass_args() {
        let args = ExternalTools::encode_args(&job(Pass::Second, Some(128.0)));
        assert!(args.windows(2).any(|w| w == ["-pass", "2"]));
        assert!(args.windows(2).any(|w| w == ["-b:a", "128k"]));
        assert!(args.windows(2).any(|w| w == ["-b:v", "2997k"]));
        assert_eq!(args.last().map(String::as_str), Some("/w/tmp-video.mp4"));

        let silent = ExternalTools::encode_args(&job(Pass::Second, None));
        assert!(silent.contains(&"-an".to_string()));
        assert!(!silent.contains(&"-c:a".to_string()));
    }

    #[test]
    fn test_parse_audio_bitrate() {
        assert_eq!(parse_audio_bitrate("160000\n").unwrap(), Some(160_000.0));
        assert_eq!(parse_audio_bitrate("  \n").unwrap(), None);
        assert!(parse_audio_bitrate("N/A\n").is_err());
    }
}
