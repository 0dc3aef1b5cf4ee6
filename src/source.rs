//! Progress sources: where download jobs get their lines from
//!
//! [`ProgressSource`] is the seam between the HTTP layer and the actual
//! downloader. The production implementation is [`YtDlp`], which shells out
//! to the `yt-dlp` binary, streams its stdout line by line into a [`Job`],
//! and scrapes artifact paths out of the output. Tests substitute scripted
//! implementations.

use crate::config::DownloadConfig;
use crate::error::{Error, Result};
use crate::job::Job;
use async_trait::async_trait;
use regex::Regex;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::LazyLock;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use url::Url;

/// Source of media ids and progress lines for download jobs
#[async_trait]
pub trait ProgressSource: Send + Sync {
    /// Resolve a target URL to a stable media id
    ///
    /// Cancellation-safe: dropping the future must not leave work running.
    async fn resolve_id(&self, url: &str) -> Result<String>;

    /// Run the download for `url`, feeding progress lines and artifact paths
    /// into `job`. Returns once the download has terminated either way.
    /// Must not call [`Job::mark_done`]; the caller owns the terminal
    /// transition.
    async fn download(&self, url: &str, job: Arc<Job>) -> Result<()>;
}

/// The yt-dlp subprocess implementation of [`ProgressSource`]
pub struct YtDlp {
    binary: PathBuf,
    out_dir: PathBuf,
    concurrent_fragments: u32,
}

impl YtDlp {
    /// Build from download configuration, locating the binary on PATH if no
    /// explicit path is configured
    pub fn from_config(config: &DownloadConfig) -> Result<Self> {
        let binary = match &config.ytdlp_path {
            Some(path) => path.clone(),
            None => which::which("yt-dlp").map_err(|e| Error::Config {
                message: format!("yt-dlp not found on PATH: {e}"),
                key: Some("download.ytdlp_path".to_string()),
            })?,
        };
        Ok(Self {
            binary,
            out_dir: config.output_dir.clone(),
            concurrent_fragments: config.concurrent_fragments,
        })
    }

    fn build_args(&self, url: &str) -> Vec<String> {
        let mut args = vec![
            url.to_string(),
            "--newline".to_string(),
            "--concurrent-fragments".to_string(),
            self.concurrent_fragments.to_string(),
            "--restrict-filenames".to_string(),
            "--trim-filenames".to_string(),
            "150".to_string(),
            "--embed-subs".to_string(),
            "--write-subs".to_string(),
            "--sub-langs".to_string(),
            "en.*".to_string(),
            "--write-auto-subs".to_string(),
            "--no-playlist".to_string(),
            "--output".to_string(),
            format!(
                "{}/%(id)s/%(title).200B.%(ext)s",
                self.out_dir.to_string_lossy()
            ),
        ];

        // mitele.es streams come down with timestamps ffmpeg mangles on fixup
        if let Ok(parsed) = Url::parse(url) {
            if parsed.host_str().is_some_and(|h| h.ends_with("mitele.es")) {
                args.push("--fixup".to_string());
                args.push("never".to_string());
            }
        }

        args
    }
}

#[async_trait]
impl ProgressSource for YtDlp {
    async fn resolve_id(&self, url: &str) -> Result<String> {
        let output = Command::new(&self.binary)
            .arg(url)
            .args(["-O", "id"])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                Error::ExternalTool(format!("failed to run {}: {e}", self.binary.display()))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Resolve(format!(
                "yt-dlp exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if id.is_empty() {
            return Err(Error::Resolve(format!("yt-dlp produced no id for {url}")));
        }
        Ok(id)
    }

    async fn download(&self, url: &str, job: Arc<Job>) -> Result<()> {
        tracing::info!(id = %job.id(), url = %url, "starting yt-dlp download");
        job.send_log("starting...");

        let args = self.build_args(url);
        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                Error::ExternalTool(format!("failed to spawn {}: {e}", self.binary.display()))
            })?;
        // the process is now running; "starting..." above only means queued
        job.send_log("start");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::ExternalTool("child stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::ExternalTool("child stderr not captured".to_string()))?;

        // drain stderr concurrently so the child never blocks on a full pipe
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let mut reader = BufReader::new(stderr);
            let _ = reader.read_to_string(&mut buf).await;
            buf
        });

        let out_dir = self.out_dir.to_string_lossy().into_owned();
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            job.send_log(strip_stage_prefix(&line));
            match classify_output_line(&line, &out_dir) {
                Some(ArtifactLine::Media(path)) => job.record_media(path),
                Some(ArtifactLine::Subtitle(path)) => job.record_subtitle(path),
                None => {}
            }
        }

        let status = child.wait().await?;
        let stderr_output = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(Error::Download(format!(
                "yt-dlp exited with {status}: {}",
                stderr_output.trim()
            )));
        }

        // marks the job directory as holding finished artifacts
        let marker = self.out_dir.join(job.id()).join("done");
        if let Err(e) = tokio::fs::write(&marker, b"").await {
            tracing::warn!(path = %marker.display(), error = %e, "could not write done marker");
        }

        tracing::info!(id = %job.id(), "yt-dlp download finished");
        Ok(())
    }
}

static STAGE_PREFIX: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^\[\w+\]\s*").ok());

/// Strip the leading `[stage]` tag yt-dlp prefixes most lines with
pub(crate) fn strip_stage_prefix(line: &str) -> String {
    match STAGE_PREFIX.as_ref() {
        Some(re) => re.replace(line, "").into_owned(),
        None => line.to_string(),
    }
}

/// An artifact path scraped from a yt-dlp output line, rebased to the public
/// `/download` prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ArtifactLine {
    /// A media file destination
    Media(String),
    /// A subtitle file destination
    Subtitle(String),
}

/// Scrape an artifact path out of a yt-dlp output line
///
/// Any line mentioning the output directory is a candidate. Subtitle lines
/// are recognized by yt-dlp's "subtitles to:" phrasing. For media lines the
/// extension is cut at the first non-alphanumeric character after the last
/// dot (yt-dlp sometimes quotes or suffixes the path), and the basename is
/// percent-encoded so the result is directly usable as a URL path. Lines
/// that mention the directory but carry no parseable path are logged and
/// skipped.
pub(crate) fn classify_output_line(line: &str, out_dir: &str) -> Option<ArtifactLine> {
    let idx = line.find(out_dir)?;
    let fp = &line[idx..];

    if line.contains("subtitles to:") {
        let rel = fp[out_dir.len()..].trim_start_matches('/');
        return Some(ArtifactLine::Subtitle(format!("/download/{rel}")));
    }

    let Some(dot) = fp.rfind('.').filter(|&d| d >= out_dir.len()) else {
        tracing::warn!(line = %line, "output line mentions the download dir but has no parseable path");
        return None;
    };

    let mut fp = fp.to_string();
    for (i, c) in fp[dot + 1..].char_indices() {
        if !c.is_alphanumeric() {
            fp.truncate(dot + 1 + i);
            break;
        }
    }

    let rel = fp[out_dir.len()..].trim_start_matches('/');
    let path = match rel.rfind('/') {
        Some(pos) => {
            let (dir, base) = (&rel[..pos], &rel[pos + 1..]);
            format!("/download/{dir}/{}", urlencoding::encode(base))
        }
        None => format!("/download/{}", urlencoding::encode(rel)),
    };
    Some(ArtifactLine::Media(path))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DownloadConfig;

    const OUT: &str = "/tmp/yt-dlp";

    #[test]
    fn test_strip_stage_prefix() {
        assert_eq!(strip_stage_prefix("[download]  10.0% of 5MiB"), "10.0% of 5MiB");
        assert_eq!(strip_stage_prefix("[Merger] Merging formats"), "Merging formats");
        assert_eq!(strip_stage_prefix("no prefix here"), "no prefix here");
        assert_eq!(strip_stage_prefix("[brackets] mid [extra]"), "mid [extra]");
    }

    #[test]
    fn test_classify_media_destination_line() {
        let line = "[download] Destination: /tmp/yt-dlp/abc/My_Video.mp4";
        assert_eq!(
            classify_output_line(line, OUT),
            Some(ArtifactLine::Media("/download/abc/My_Video.mp4".to_string()))
        );
    }

    #[test]
    fn test_classify_truncates_extension_garbage() {
        let line = r#"[Merger] Merging formats into "/tmp/yt-dlp/abc/My_Video.mp4""#;
        assert_eq!(
            classify_output_line(line, OUT),
            Some(ArtifactLine::Media("/download/abc/My_Video.mp4".to_string()))
        );
    }

    #[test]
    fn test_classify_escapes_basename() {
        let line = "[download] Destination: /tmp/yt-dlp/abc/a b.mp4";
        assert_eq!(
            classify_output_line(line, OUT),
            Some(ArtifactLine::Media("/download/abc/a%20b.mp4".to_string()))
        );
    }

    #[test]
    fn test_classify_subtitle_line() {
        let line = "[info] Writing video subtitles to: /tmp/yt-dlp/abc/My_Video.en.vtt";
        assert_eq!(
            classify_output_line(line, OUT),
            Some(ArtifactLine::Subtitle(
                "/download/abc/My_Video.en.vtt".to_string()
            ))
        );
    }

    #[test]
    fn test_classify_ignores_unrelated_lines() {
        assert_eq!(classify_output_line("[download]  10.0% of 5MiB", OUT), None);
        assert_eq!(classify_output_line("", OUT), None);
    }

    #[test]
    fn test_classify_skips_pathless_mention() {
        // mentions the dir but nothing dot-separated follows
        assert_eq!(classify_output_line("cleaning /tmp/yt-dlp now", OUT), None);
    }

    #[test]
    fn test_build_args_special_cases_mitele() {
        let source = YtDlp {
            binary: PathBuf::from("yt-dlp"),
            out_dir: PathBuf::from(OUT),
            concurrent_fragments: 2,
        };

        let args = source.build_args("https://www.mitele.es/programas/x");
        assert!(args.windows(2).any(|w| w == ["--fixup", "never"]));

        let args = source.build_args("https://example.com/watch?v=x");
        assert!(!args.contains(&"--fixup".to_string()));
    }

    #[test]
    fn test_build_args_template_and_flags() {
        let source = YtDlp {
            binary: PathBuf::from("yt-dlp"),
            out_dir: PathBuf::from(OUT),
            concurrent_fragments: 4,
        };
        let args = source.build_args("https://example.com/v");

        assert!(args.contains(&"--newline".to_string()));
        assert!(args.contains(&"--no-playlist".to_string()));
        assert!(args
            .windows(2)
            .any(|w| w == ["--concurrent-fragments", "4"]));
        assert!(args.contains(&"/tmp/yt-dlp/%(id)s/%(title).200B.%(ext)s".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_download_emits_start_once_the_process_is_running() {
        let tmp = tempfile::tempdir().unwrap();
        let source = YtDlp {
            binary: PathBuf::from("/bin/echo"),
            out_dir: tmp.path().to_path_buf(),
            concurrent_fragments: 2,
        };

        let job = Arc::new(Job::new("abc"));
        let mut sub = job.subscribe();
        source
            .download("https://example.com/v", Arc::clone(&job))
            .await
            .unwrap();
        job.mark_done();

        let mut lines = Vec::new();
        while let Some(line) = sub.recv().await {
            lines.push(line);
        }

        assert_eq!(lines[0], "starting...");
        assert_eq!(lines[1], "start");
        // echo printed the argument vector back as one more line
        assert!(lines.len() >= 3);
    }

    #[test]
    fn test_from_config_with_explicit_binary() {
        let config = DownloadConfig {
            ytdlp_path: Some(PathBuf::from("/usr/local/bin/yt-dlp")),
            ..DownloadConfig::default()
        };
        let source = YtDlp::from_config(&config).unwrap();
        assert_eq!(source.binary, PathBuf::from("/usr/local/bin/yt-dlp"));
    }
}
