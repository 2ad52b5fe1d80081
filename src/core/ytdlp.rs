//! yt-dlp adapter
//!
//! Playlist listings come from `--flat-playlist -J`, downloads from
//! `--print-json`, so both paths hand back JSON that the metadata helpers
//! below can navigate with dotted key paths.

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use crate::core::config::FetcherConfig;
use crate::core::fetcher::{MediaFetcher, PlaylistSource};
use crate::core::models::{AppError, AppResult, OutputFormat, PlaylistInfo, PlaylistItem};
use crate::utils::validation::playlist_url;

const COMMON_DOWNLOAD_ARGS: &[&str] = &[
    "--add-metadata",
    "--embed-thumbnail",
    "--embed-metadata",
    "--print-json",
    "--no-warnings",
    "--no-playlist",
];

#[derive(Debug, Clone)]
pub struct YtDlp {
    program: String,
    ffmpeg_location: Option<String>,
    sponsorblock_audio: Option<String>,
    sponsorblock_video: Option<String>,
}

impl YtDlp {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ffmpeg_location: None,
            sponsorblock_audio: None,
            sponsorblock_video: None,
        }
    }

    pub fn from_config(config: &FetcherConfig) -> Self {
        Self {
            program: config.ytdlp_path.clone(),
            ffmpeg_location: config.ffmpeg_location.clone(),
            sponsorblock_audio: config.sponsorblock_audio.clone(),
            sponsorblock_video: config.sponsorblock_video.clone(),
        }
    }

    /// `yt-dlp --version`, used as the availability check at daemon startup
    pub async fn version(&self) -> AppResult<String> {
        let output = Command::new(&self.program)
            .arg("--version")
            .output()
            .await
            .map_err(|e| AppError::System(format!("Failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(AppError::System(format!(
                "{} --version exited with {}",
                self.program, output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Argument list for downloading `url` to `destination`
    pub fn download_args(&self, url: &str, destination: &Path, format: OutputFormat) -> Vec<String> {
        let mut args: Vec<String> = match format {
            OutputFormat::Mp3 => ["-x", "--audio-format", "mp3", "--audio-quality", "0"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            OutputFormat::Mp4 => [
                "-f",
                "bestvideo+bestaudio/best",
                "--merge-output-format",
                "mp4",
                "--embed-chapters",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        };

        if let Some(location) = &self.ffmpeg_location {
            args.push("--ffmpeg-location".to_string());
            args.push(location.clone());
        }

        args.extend(COMMON_DOWNLOAD_ARGS.iter().map(|s| s.to_string()));

        let sponsorblock = if format.is_audio() {
            &self.sponsorblock_audio
        } else {
            &self.sponsorblock_video
        };
        if let Some(categories) = sponsorblock.as_deref().filter(|c| !c.trim().is_empty()) {
            args.push("--sponsorblock-remove".to_string());
            args.push(categories.to_string());
        }

        args.push("-o".to_string());
        args.push(destination.to_string_lossy().into_owned());
        args.push(url.to_string());
        args
    }

    async fn run(&self, args: &[String]) -> AppResult<String> {
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|e| AppError::Fetch(format!("Failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::Fetch(format!(
                "exit status {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl PlaylistSource for YtDlp {
    #[instrument(skip(self))]
    async fn fetch_playlist(&self, locator: &str) -> AppResult<PlaylistInfo> {
        let url = playlist_url(locator);
        let args: Vec<String> = [
            "--no-warnings",
            "--flat-playlist",
            "--yes-playlist",
            "-J",
            url.as_str(),
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let stdout = self.run(&args).await?;
        let info = parse_playlist_json(&stdout)?;
        debug!("Listed {} entries for {}", info.entries.len(), info.title);
        Ok(info)
    }
}

#[async_trait]
impl MediaFetcher for YtDlp {
    #[instrument(skip(self, destination))]
    async fn fetch_item(
        &self,
        url: &str,
        destination: &Path,
        format: OutputFormat,
    ) -> AppResult<String> {
        info!("⬇️ Fetching {} as {}", url, format);
        let stdout = self.run(&self.download_args(url, destination, format)).await?;

        if !destination.exists() {
            return Err(AppError::Fetch(format!(
                "{} reported success but {:?} was not written",
                self.program, destination
            )));
        }

        // --print-json emits one object per line; the last one describes the final file
        stdout
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .map(|line| line.to_string())
            .ok_or_else(|| AppError::Fetch("no metadata printed".to_string()))
    }
}

/// Parse the `-J --flat-playlist` output of a playlist
pub fn parse_playlist_json(raw: &str) -> AppResult<PlaylistInfo> {
    let json: Value = serde_json::from_str(raw.trim())?;

    if json.get("_type").and_then(Value::as_str) != Some("playlist") {
        return Err(AppError::Fetch("not a playlist".to_string()));
    }

    let title = json
        .get("title")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Fetch("playlist has no title".to_string()))?;

    let url = json
        .get("webpage_url")
        .and_then(Value::as_str)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| AppError::Fetch("playlist has no url".to_string()))?;

    let thumbnail_url = json
        .get("thumbnails")
        .and_then(Value::as_array)
        .and_then(|thumbs| thumbs.last())
        .and_then(|thumb| thumb.get("url"))
        .or_else(|| json.get("thumbnail"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let entries = json
        .get("entries")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    let title = entry.get("title").and_then(Value::as_str)?;
                    let url = entry.get("url").and_then(Value::as_str)?;
                    if title.is_empty() || url.is_empty() {
                        return None;
                    }
                    Some(PlaylistItem {
                        title: title.to_string(),
                        url: url.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(PlaylistInfo {
        title: title.to_string(),
        url: url.to_string(),
        thumbnail_url,
        entries,
    })
}

/// Navigate a metadata blob by dotted path, e.g. `"requested_downloads.0.filepath"`
pub fn metadata_value(raw: &str, path: &str) -> AppResult<Value> {
    let json: Value = serde_json::from_str(raw.trim())?;
    let mut current = &json;

    for segment in path.split('.').filter(|s| !s.is_empty()) {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        current =
            next.ok_or_else(|| AppError::NotFound(format!("metadata key '{}'", path)))?;
    }

    Ok(current.clone())
}

/// String (or number rendered as string) at a metadata path
pub fn metadata_string(raw: &str, path: &str) -> AppResult<String> {
    match metadata_value(raw, path)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(AppError::NotFound(format!(
            "metadata key '{}' is not a scalar: {}",
            path, other
        ))),
    }
}

/// Title of a fetched item, preferring the untruncated `fulltitle`
pub fn metadata_title(raw: &str) -> AppResult<String> {
    metadata_string(raw, "fulltitle")
        .or_else(|_| metadata_string(raw, "title"))
        .and_then(|title| {
            if title.trim().is_empty() {
                Err(AppError::NotFound("empty title in metadata".to_string()))
            } else {
                Ok(title)
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const PLAYLIST_JSON: &str = r#"{
        "_type": "playlist",
        "title": "Road Trip",
        "webpage_url": "https://www.youtube.com/playlist?list=PL123",
        "thumbnails": [{"url": "https://i/small.jpg"}, {"url": "https://i/large.jpg"}],
        "entries": [
            {"title": "First", "url": "https://www.youtube.com/watch?v=a"},
            {"title": "", "url": "https://www.youtube.com/watch?v=b"},
            {"url": "https://www.youtube.com/watch?v=c"},
            {"title": "Fourth", "url": "https://www.youtube.com/watch?v=d"}
        ]
    }"#;

    #[test]
    fn test_parse_playlist_skips_incomplete_entries() -> AppResult<()> {
        let info = parse_playlist_json(PLAYLIST_JSON)?;

        assert_eq!(info.title, "Road Trip");
        assert_eq!(info.thumbnail_url.as_deref(), Some("https://i/large.jpg"));
        let titles: Vec<&str> = info.entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["First", "Fourth"]);
        Ok(())
    }

    #[test]
    fn test_parse_playlist_rejects_single_video() {
        let raw = r#"{"_type": "video", "title": "x", "webpage_url": "u"}"#;
        assert!(parse_playlist_json(raw).is_err());
        assert!(parse_playlist_json(r#"{"_type": "playlist", "webpage_url": "u"}"#).is_err());
        assert!(parse_playlist_json("not json").is_err());
    }

    #[test]
    fn test_metadata_paths() -> AppResult<()> {
        let raw = r#"{
            "fulltitle": "Full: Title",
            "title": "Short",
            "duration": 212,
            "requested_downloads": [{"filepath": "/tmp/x.mp4"}]
        }"#;

        assert_eq!(metadata_title(raw)?, "Full: Title");
        assert_eq!(metadata_string(raw, "duration")?, "212");
        assert_eq!(
            metadata_string(raw, "requested_downloads.0.filepath")?,
            "/tmp/x.mp4"
        );
        assert!(metadata_string(raw, "requested_downloads.3.filepath").is_err());
        assert!(metadata_string(raw, "requested_downloads").is_err());
        assert!(metadata_value(raw, "nope.deeper").is_err());

        assert_eq!(metadata_title(r#"{"title": "Only"}"#)?, "Only");
        assert!(metadata_title(r#"{"fulltitle": "  "}"#).is_err());
        Ok(())
    }

    #[test]
    fn test_download_args() {
        let mut ytdlp = YtDlp::new("yt-dlp");
        ytdlp.sponsorblock_audio = Some("music_offtopic".to_string());
        let dest = PathBuf::from("/tmp/videoarchiver-download-1.mp3");

        let audio = ytdlp.download_args("https://v", &dest, OutputFormat::Mp3);
        assert_eq!(&audio[..5], &["-x", "--audio-format", "mp3", "--audio-quality", "0"]);
        assert!(audio.contains(&"--print-json".to_string()));
        assert!(audio.contains(&"--sponsorblock-remove".to_string()));
        assert_eq!(audio.last().map(String::as_str), Some("https://v"));

        let video = ytdlp.download_args("https://v", &dest, OutputFormat::Mp4);
        assert!(video.contains(&"bestvideo+bestaudio/best".to_string()));
        assert!(video.contains(&"--embed-chapters".to_string()));
        assert!(!video.contains(&"--sponsorblock-remove".to_string()));
    }
}
