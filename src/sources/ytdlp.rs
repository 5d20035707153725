use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use songbird::input::{HttpRequest, Input};
use std::{collections::HashMap, process::Output, time::Duration};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{MusicSource, SEARCH_PREFIX};
use crate::{
    audio::{
        scheduler::TrackResolver,
        track::{QueuedTrack, Requester, ResolvedTrack},
    },
    error::ResolutionError,
};

/// Metadata lookups and stream resolution through the `yt-dlp` binary.
#[derive(Debug, Clone)]
pub struct YtDlpClient {
    binary: String,
    http: reqwest::Client,
}

/// One line of `yt-dlp -j` output. Only the fields we read.
#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    webpage_url: Option<String>,
    url: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    view_count: Option<u64>,
    #[serde(default)]
    http_headers: HashMap<String, String>,
}

impl YtDlpEntry {
    /// Page URL of the entry. Flat playlist entries only carry `url`.
    fn page_url(&self) -> Option<&str> {
        self.webpage_url.as_deref().or(self.url.as_deref())
    }

    fn duration_secs(&self) -> Option<u64> {
        self.duration.filter(|d| *d >= 0.0).map(|d| d.round() as u64)
    }

    fn into_queued(self, requester: &Requester) -> Option<QueuedTrack> {
        let url = self.page_url()?.to_string();
        let title = self.title.clone().unwrap_or_else(|| url.clone());
        let mut track = QueuedTrack::new(url, title, requester.clone());
        track.duration = self.duration_secs();
        track.view_count = self.view_count;
        Some(track)
    }
}

/// Parses `yt-dlp -j` output, one JSON document per line.
///
/// Entries without any URL (deleted or private playlist items) are skipped.
pub fn parse_entries(stdout: &str, requester: &Requester) -> Result<Vec<QueuedTrack>, ResolutionError> {
    let mut tracks = Vec::new();
    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let entry: YtDlpEntry = serde_json::from_str(line)?;
        match entry.into_queued(requester) {
            Some(track) => tracks.push(track),
            None => debug!("Skipping entry without URL"),
        }
    }
    Ok(tracks)
}

fn header_map(headers: &HashMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => debug!("Ignoring invalid header {}", name),
        }
    }
    map
}

fn is_url(query: &str) -> bool {
    url::Url::parse(query)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

impl YtDlpClient {
    pub fn new(binary: impl Into<String>) -> Result<Self, ResolutionError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ResolutionError::Extraction(e.to_string()))?;
        Ok(Self {
            binary: binary.into(),
            http,
        })
    }

    /// Checks that the binary runs and logs its version.
    pub async fn verify(&self) -> Result<String, ResolutionError> {
        let output = Command::new(&self.binary).arg("--version").output().await?;
        let output = check(output)?;
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!("✅ yt-dlp version: {}", version);
        Ok(version)
    }

    async fn run(&self, args: &[&str], target: &str) -> Result<String, ResolutionError> {
        debug!("yt-dlp {} {}", args.join(" "), target);
        let output = Command::new(&self.binary)
            .args(args)
            .args(["--no-warnings", "--socket-timeout", "30", "--"])
            .arg(target)
            .kill_on_drop(true)
            .output()
            .await?;
        let output = check(output)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn check(output: Output) -> Result<Output, ResolutionError> {
    if output.status.success() {
        return Ok(output);
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let message = stderr.trim().to_string();
    if message.contains("Video unavailable") || message.contains("Private video") {
        Err(ResolutionError::Unavailable(message))
    } else {
        Err(ResolutionError::Extraction(message))
    }
}

#[async_trait]
impl MusicSource for YtDlpClient {
    async fn lookup(&self, query: &str, requester: &Requester) -> Result<Vec<QueuedTrack>, ResolutionError> {
        let target = if is_url(query) {
            query.to_string()
        } else {
            format!("{SEARCH_PREFIX}1:{query}")
        };
        let stdout = self.run(&["-j", "--flat-playlist"], &target).await?;
        let tracks = parse_entries(&stdout, requester)?;
        if tracks.is_empty() {
            return Err(ResolutionError::Unavailable(format!("nothing found for '{query}'")));
        }
        info!("🔍 '{}' matched {} track(s)", query, tracks.len());
        Ok(tracks)
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
        requester: &Requester,
    ) -> Result<Vec<QueuedTrack>, ResolutionError> {
        let target = format!("{SEARCH_PREFIX}{limit}:{query}");
        let stdout = self.run(&["-j", "--flat-playlist"], &target).await?;
        parse_entries(&stdout, requester)
    }

    async fn playlist(&self, url: &str, requester: &Requester) -> Result<Vec<QueuedTrack>, ResolutionError> {
        let stdout = self
            .run(&["-j", "--flat-playlist", "--yes-playlist"], url)
            .await?;
        parse_entries(&stdout, requester)
    }

    fn source_name(&self) -> &'static str {
        "yt-dlp"
    }
}

#[async_trait]
impl TrackResolver for YtDlpClient {
    type Stream = Input;

    async fn resolve(
        &self,
        track: &QueuedTrack,
        seek_offset: u64,
    ) -> Result<ResolvedTrack<Input>, ResolutionError> {
        debug!("🎯 Resolving {} (seek {}s)", track.url, seek_offset);
        let stdout = self
            .run(&["-j", "-f", "bestaudio/best", "--no-playlist"], &track.url)
            .await?;
        let line = stdout
            .lines()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| ResolutionError::Extraction("empty output".to_string()))?;
        let entry: YtDlpEntry = serde_json::from_str(line)?;

        let stream_url = entry
            .url
            .clone()
            .ok_or_else(|| ResolutionError::Unavailable(format!("no stream for {}", track.url)))?;

        let mut refreshed = track.clone();
        if let Some(duration) = entry.duration_secs() {
            refreshed.duration = Some(duration);
        }
        if entry.view_count.is_some() {
            refreshed.view_count = entry.view_count;
        }
        if refreshed.duration.is_none() {
            warn!("⚠️ No duration reported for {}", track.url);
        }

        let request =
            HttpRequest::new_with_headers(self.http.clone(), stream_url, header_map(&entry.http_headers));
        Ok(ResolvedTrack::new(refreshed, Input::from(request)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn requester() -> Requester {
        Requester::new(9u64, "dj")
    }

    #[test]
    fn parses_single_video_output() {
        let stdout = r#"{"webpage_url": "https://www.youtube.com/watch?v=abc", "url": "https://rr1.googlevideo.com/videoplayback?x", "title": "Song", "duration": 212.4, "view_count": 1500}"#;
        let tracks = parse_entries(stdout, &requester()).unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].url, "https://www.youtube.com/watch?v=abc");
        assert_eq!(tracks[0].title, "Song");
        assert_eq!(tracks[0].duration, Some(212));
        assert_eq!(tracks[0].view_count, Some(1500));
        assert_eq!(tracks[0].requester.name, "dj");
    }

    #[test]
    fn parses_flat_playlist_lines() {
        let stdout = concat!(
            r#"{"_type": "url", "url": "https://www.youtube.com/watch?v=1", "title": "One", "duration": 60}"#,
            "\n",
            r#"{"_type": "url", "url": "https://www.youtube.com/watch?v=2", "title": "Two", "duration": null}"#,
            "\n\n",
            r#"{"_type": "url", "title": "[Deleted video]"}"#,
            "\n",
        );
        let tracks = parse_entries(stdout, &requester()).unwrap();
        let titles: Vec<&str> = tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["One", "Two"]);
        assert_eq!(tracks[1].duration, None);
        assert_eq!(tracks[0].view_count, None);
    }

    #[test]
    fn missing_title_falls_back_to_url() {
        let stdout = r#"{"url": "https://example.com/a.mp3"}"#;
        let tracks = parse_entries(stdout, &requester()).unwrap();
        assert_eq!(tracks[0].title, "https://example.com/a.mp3");
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = parse_entries("not json", &requester()).unwrap_err();
        assert!(matches!(err, ResolutionError::Parse(_)));
    }

    #[test]
    fn headers_skip_invalid_entries() {
        let mut headers = HashMap::new();
        headers.insert("User-Agent".to_string(), "Mozilla/5.0".to_string());
        headers.insert("bad header".to_string(), "x".to_string());
        let map = header_map(&headers);
        assert_eq!(map.len(), 1);
        assert_eq!(map["user-agent"], "Mozilla/5.0");
    }

    #[test]
    fn only_http_urls_skip_search() {
        assert!(is_url("https://www.youtube.com/watch?v=abc"));
        assert!(is_url("http://example.com/a.mp3"));
        assert!(!is_url("never gonna give you up"));
        assert!(!is_url("file:///etc/passwd"));
    }
}
