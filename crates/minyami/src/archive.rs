use std::{
    num::NonZeroU32,
    path::{Path, PathBuf},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use reqwest::Url;
use tokio::time::Instant;

use crate::{
    decrypt::Aes128Key,
    error::{MinyamiError, MinyamiResult},
    fetch::Fetcher,
    merge::Merger,
    playlist::{Manifest, PlaylistModel},
    progress::progress_line,
    queue::{ConcurrentRetryQueue, RetryPolicy},
    segment::{Segment, SegmentFileNamer},
    site::{resolve_site, DeriveOptions},
    task::{output_path, FetchDecryptTask},
};

#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// Maximum number of segments processed at the same time.
    pub concurrency: NonZeroU32,
    /// Final output file path.
    pub output: PathBuf,
    /// Directory to store downloaded segments.
    pub temp_dir: PathBuf,
    /// Key supplied by the operator.
    pub key: Option<String>,
    pub retry: RetryPolicy,
    pub task_timeout: Option<Duration>,
    /// Keep downloaded segments after merging.
    pub keep_segments: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        let started_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self {
            concurrency: NonZeroU32::new(5).unwrap_or(NonZeroU32::MIN),
            output: PathBuf::from("./output.mkv"),
            temp_dir: std::env::temp_dir().join(format!("minyami_{started_at}")),
            key: None,
            retry: RetryPolicy::unbounded(),
            task_timeout: None,
            keep_segments: false,
        }
    }
}

impl ArchiveConfig {
    pub fn concurrency(mut self, concurrency: NonZeroU32) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = output.into();
        self
    }

    pub fn temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = temp_dir.into();
        self
    }

    pub fn key(mut self, key: Option<String>) -> Self {
        self.key = key;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn task_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub fn keep_segments(mut self, keep_segments: bool) -> Self {
        self.keep_segments = keep_segments;
        self
    }
}

/// Result of a finished archive run.
#[derive(Debug, Clone)]
pub struct ArchiveReport {
    pub output: PathBuf,
    /// Files handed to the merger, in playlist order.
    pub output_files: Vec<PathBuf>,
    pub finished_segments: usize,
}

/// Downloads every segment of an archived HLS stream and merges them into one file.
pub struct ArchiveDownloader<F, M> {
    config: ArchiveConfig,
    fetcher: F,
    merger: M,
}

impl<F, M> ArchiveDownloader<F, M>
where
    F: Fetcher,
    M: Merger,
{
    pub fn new(config: ArchiveConfig, fetcher: F, merger: M) -> Self {
        Self {
            config,
            fetcher,
            merger,
        }
    }

    pub async fn download(&self, manifest: &Manifest) -> MinyamiResult<ArchiveReport> {
        let started_at = Instant::now();

        let playlist = PlaylistModel::parse(&manifest.text)?;
        let options = DeriveOptions {
            key: self.config.key.clone(),
        };
        let site = resolve_site(manifest, &playlist, &options).await?;
        let key = site.key.as_ref().map(Aes128Key::try_from).transpose()?;

        let segments = build_segments(&playlist, &site.url_prefix, manifest.base_url.as_ref())?;

        tokio::fs::create_dir_all(&self.config.temp_dir).await?;
        let temp_dir = tokio::fs::canonicalize(&self.config.temp_dir).await?;
        tracing::debug!("Temporary path sets to {}", temp_dir.display());

        let output_files: Vec<PathBuf> = segments
            .iter()
            .map(|segment| output_path(&temp_dir, segment, playlist.is_encrypted))
            .collect();

        tracing::info!(
            "Start downloading with {} thread(s).",
            self.config.concurrency.get()
        );
        let task = FetchDecryptTask::new(&self.fetcher, temp_dir.clone(), key);
        let mut queue = ConcurrentRetryQueue::new(segments, self.config.concurrency)
            .with_retry(self.config.retry)
            .with_task_timeout(self.config.task_timeout)
            .with_started_at(started_at);
        queue
            .drive(&task, |segment, state| {
                tracing::info!(
                    "{}",
                    progress_line(
                        &segment.filename,
                        state,
                        playlist.average_duration,
                        state.started_at.elapsed(),
                    )
                );
            })
            .await?;
        let finished_segments = queue.state().finished_segments;

        tracing::info!("All chunks downloaded. Start merging chunks.");
        self.merger
            .merge(&output_files, &self.config.output)
            .await
            .map_err(|e| match e {
                MinyamiError::MergeFailed(_) => e,
                e => MinyamiError::MergeFailed(e.to_string()),
            })?;
        tracing::info!("End of merging.");

        if !self.config.keep_segments && self.merger.consumes_segments() {
            tracing::info!("Starting cleaning temporary files.");
            cleanup(&temp_dir).await?;
        }

        tracing::info!(
            "All finished. Check your file at [{}] .",
            self.config.output.display()
        );
        Ok(ArchiveReport {
            output: self.config.output.clone(),
            output_files,
            finished_segments,
        })
    }
}

/// Segments in playlist order, with their absolute URL.
///
/// With a site prefix the URL is the prefix followed by the raw path. Otherwise
/// relative paths are resolved against the manifest URL.
pub fn build_segments(
    playlist: &PlaylistModel,
    url_prefix: &str,
    base_url: Option<&Url>,
) -> MinyamiResult<Vec<Segment>> {
    let segments = playlist
        .segments
        .iter()
        .map(|raw_path| Segment::new(segment_url(raw_path, url_prefix, base_url)?, raw_path))
        .collect::<MinyamiResult<Vec<_>>>()?;

    // every raw name is known before any duplicate gets renamed
    let mut namer = SegmentFileNamer::new(segments.iter().map(|s| s.filename.as_str()));
    Ok(segments
        .into_iter()
        .map(|mut segment| {
            segment.filename = namer.unique(segment.filename);
            segment
        })
        .collect())
}

fn segment_url(raw_path: &str, url_prefix: &str, base_url: Option<&Url>) -> MinyamiResult<String> {
    if !url_prefix.is_empty() {
        return Ok(format!("{url_prefix}{raw_path}"));
    }

    match base_url {
        Some(base_url) => Ok(base_url.join(raw_path)?.to_string()),
        None => Url::parse(raw_path).map(|url| url.to_string()).map_err(|_| {
            MinyamiError::MalformedPlaylist(format!(
                "relative segment path {raw_path} in a local manifest"
            ))
        }),
    }
}

async fn cleanup(temp_dir: &Path) -> MinyamiResult<()> {
    tokio::fs::remove_dir_all(temp_dir)
        .await
        .map_err(|source| MinyamiError::CleanupFailed {
            path: temp_dir.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playlist(segments: &[&str]) -> PlaylistModel {
        PlaylistModel {
            is_encrypted: false,
            segments: segments.iter().map(|s| s.to_string()).collect(),
            key_uri: None,
            iv: None,
            average_duration: 5.,
        }
    }

    #[test]
    fn test_build_segments_with_prefix() {
        let segments = build_segments(
            &playlist(&["/a/0.ts", "/a/1.ts"]),
            "https://movie.freshlive.tv",
            None,
        )
        .unwrap();
        assert_eq!(
            segments,
            vec![
                Segment {
                    url: "https://movie.freshlive.tv/a/0.ts".to_string(),
                    filename: "0.ts".to_string(),
                },
                Segment {
                    url: "https://movie.freshlive.tv/a/1.ts".to_string(),
                    filename: "1.ts".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_build_segments_relative_to_manifest() {
        let base = Url::parse("https://example.com/vod/index.m3u8").unwrap();
        let segments =
            build_segments(&playlist(&["seg/0.ts", "/root/1.ts"]), "", Some(&base)).unwrap();
        assert_eq!(segments[0].url, "https://example.com/vod/seg/0.ts");
        assert_eq!(segments[1].url, "https://example.com/root/1.ts");
    }

    #[test]
    fn test_build_segments_duplicate_names() {
        let segments = build_segments(
            &playlist(&[
                "https://a.example.com/1/index.ts",
                "https://a.example.com/2/index.ts",
            ]),
            "",
            None,
        )
        .unwrap();
        assert_eq!(segments[0].filename, "index.ts");
        assert_eq!(segments[1].filename, "index_2.ts");
    }

    #[test]
    fn test_build_segments_renamed_name_is_taken() {
        let segments = build_segments(
            &playlist(&["/a/index.ts", "/b/index.ts", "/c/index_2.ts"]),
            "https://example.com",
            None,
        )
        .unwrap();
        let names: Vec<_> = segments.iter().map(|s| s.filename.as_str()).collect();
        assert_eq!(names, vec!["index.ts", "index_3.ts", "index_2.ts"]);
    }

    #[test]
    fn test_build_segments_relative_without_base() {
        let result = build_segments(&playlist(&["0.ts"]), "", None);
        assert!(matches!(result, Err(MinyamiError::MalformedPlaylist(_))));
    }
}
