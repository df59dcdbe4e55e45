use std::{
    num::NonZeroU32,
    path::PathBuf,
    str::FromStr,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use anyhow::{bail, Context};
use fake_user_agent::get_chrome_rua;
use minyami::{
    fetch::HttpFetcher,
    merge::ArchiveMerger,
    playlist::load_manifest,
    queue::RetryPolicy,
    ArchiveConfig, ArchiveDownloader, HttpClient,
};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Client,
};

#[derive(clap::Parser, Debug, Clone)]
#[clap(name = "minyami", version, about)]
pub struct MinyamiArgs {
    /// Debug output
    #[clap(long, alias = "debug")]
    verbose: bool,

    /// Threads limit
    #[clap(long, default_value = "5")]
    threads: NonZeroU32,

    /// Retry limit of each chunk. Retries forever when not set.
    #[clap(long)]
    retries: Option<u32>,

    /// Base delay in milliseconds before retrying a failed chunk.
    ///
    /// Doubles after every failure of the same chunk, up to one minute.
    #[clap(long)]
    retry_backoff: Option<u64>,

    /// Retry limit of the m3u8 file.
    #[clap(long, default_value = "3")]
    manifest_retries: u32,

    /// Timeout seconds for each manifest/chunk request.
    #[clap(long, default_value = "60")]
    timeout: u64,

    /// Output file path
    ///
    /// Chunks are remuxed by mkvmerge when the extension is `.mkv`, concatenated otherwise.
    #[clap(short, long, default_value = "./output.mkv")]
    output: PathBuf,

    /// Temporary file path
    #[clap(long, env = "TEMP")]
    temp_dir: Option<PathBuf>,

    /// Set key manually (Internal use)
    ///
    /// (Optional) Key for decrypt video.
    #[clap(long)]
    key: Option<String>,

    /// Cookies used to download
    #[clap(long)]
    cookies: Option<String>,

    /// HTTP Header used to download
    ///
    /// Custom header. eg. "User-Agent: xxxxx". This option will override --cookies.
    #[clap(short = 'H', long)]
    headers: Vec<String>,

    /// Do not merge m3u8 chunks.
    #[clap(long)]
    no_merge: bool,

    /// Keep temporary files.
    #[clap(short, long)]
    keep: bool,

    /// m3u8 file path
    m3u8: String,
}

impl MinyamiArgs {
    pub fn log_level(&self) -> log::LevelFilter {
        if self.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        }
    }

    fn is_remote(&self) -> bool {
        self.m3u8.starts_with("http://") || self.m3u8.starts_with("https://")
    }

    fn headers(&self) -> anyhow::Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        // cookies of a remote manifest live in the cookie jar instead
        if let Some(cookies) = self.cookies.as_ref().filter(|_| !self.is_remote()) {
            headers.insert(
                reqwest::header::COOKIE,
                HeaderValue::from_str(cookies).context("Invalid cookie")?,
            );
        }

        for header in &self.headers {
            let Some((key, value)) = header.split_once(':') else {
                bail!("Invalid header: {header}");
            };
            headers.insert(
                HeaderName::from_str(key.trim()).context("Invalid header name")?,
                HeaderValue::from_str(value.trim()).context("Invalid header value")?,
            );
        }
        Ok(headers)
    }

    fn client(&self) -> anyhow::Result<HttpClient> {
        let builder = Client::builder()
            .default_headers(self.headers()?)
            .user_agent(get_chrome_rua())
            .timeout(Duration::from_secs(self.timeout));
        let client = HttpClient::new(builder)?;

        if let (Some(cookies), true) = (&self.cookies, self.is_remote()) {
            let cookies = cookies
                .split(';')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();
            client.add_cookies(cookies, self.m3u8.as_str())?;
        }
        Ok(client)
    }

    fn temp_dir(&self) -> anyhow::Result<PathBuf> {
        let temp_path = match &self.temp_dir {
            Some(temp_dir) => {
                if !temp_dir.exists() {
                    bail!("Temporary path directory does not exist.");
                }
                let temp_dir = temp_dir.canonicalize()?;
                log::info!("Temporary path sets to {}", temp_dir.display());
                temp_dir
            }
            None => std::env::temp_dir(),
        };

        let started_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Ok(temp_path.join(format!("minyami_{started_at}")))
    }

    fn retry(&self) -> RetryPolicy {
        let mut retry = RetryPolicy::unbounded();
        if let Some(retries) = self.retries {
            retry = retry.with_max_retries(retries);
        }
        if let Some(backoff) = self.retry_backoff {
            retry = retry.with_backoff(Duration::from_millis(backoff));
        }
        retry
    }

    fn merger(&self) -> ArchiveMerger {
        if self.no_merge {
            ArchiveMerger::skip()
        } else {
            ArchiveMerger::auto(&self.output)
        }
    }

    fn config(&self) -> anyhow::Result<ArchiveConfig> {
        Ok(ArchiveConfig::default()
            .concurrency(self.threads)
            .output(&self.output)
            .temp_dir(self.temp_dir()?)
            .key(self.key.clone())
            .retry(self.retry())
            .keep_segments(self.keep || self.no_merge))
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let client = self.client()?;
        let config = self.config()?;

        let manifest = load_manifest(&client, &self.m3u8, self.manifest_retries).await?;
        let downloader = ArchiveDownloader::new(config, HttpFetcher::new(client), self.merger());
        match downloader.download(&manifest).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_setup_error() => {
                Err(anyhow::Error::new(e).context("Failed to prepare downloading"))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_default_args() {
        let args = MinyamiArgs::parse_from(["minyami", "https://example.com/index.m3u8"]);
        assert_eq!(args.threads.get(), 5);
        assert_eq!(args.output, PathBuf::from("./output.mkv"));
        assert_eq!(args.timeout, 60);
        assert_eq!(args.manifest_retries, 3);
        assert_eq!(args.retry(), RetryPolicy::unbounded());
        assert_eq!(args.log_level(), log::LevelFilter::Info);
        assert!(matches!(args.merger(), ArchiveMerger::MkvMerge(_)));
    }

    #[test]
    fn test_args() {
        let args = MinyamiArgs::parse_from([
            "minyami",
            "--debug",
            "--threads",
            "8",
            "--retries",
            "4",
            "--retry-backoff",
            "500",
            "-o",
            "video.ts",
            "-H",
            "Referer: https://example.com/",
            "--key",
            "0123456789abcdef0123456789abcdef",
            "index.m3u8",
        ]);
        assert_eq!(args.threads.get(), 8);
        assert_eq!(args.log_level(), log::LevelFilter::Debug);
        assert_eq!(
            args.retry(),
            RetryPolicy::unbounded()
                .with_max_retries(4)
                .with_backoff(Duration::from_millis(500))
        );
        assert!(matches!(args.merger(), ArchiveMerger::Concat(_)));

        let headers = args.headers().unwrap();
        assert_eq!(headers["referer"], "https://example.com/");
    }

    #[test]
    fn test_no_merge_keeps_segments() {
        let args = MinyamiArgs::parse_from(["minyami", "--no-merge", "index.m3u8"]);
        assert!(matches!(args.merger(), ArchiveMerger::Skip(_)));
        assert!(args.config().unwrap().keep_segments);
    }

    #[test]
    fn test_invalid_header() {
        let args = MinyamiArgs::parse_from(["minyami", "-H", "no separator", "index.m3u8"]);
        assert!(args.headers().is_err());
    }

    #[test]
    fn test_local_manifest_cookies_are_headers() {
        let args = MinyamiArgs::parse_from(["minyami", "--cookies", "a=b; c=d", "index.m3u8"]);
        assert_eq!(args.headers().unwrap()["cookie"], "a=b; c=d");

        let args = MinyamiArgs::parse_from([
            "minyami",
            "--cookies",
            "a=b",
            "https://example.com/index.m3u8",
        ]);
        assert!(args.headers().unwrap().get("cookie").is_none());
    }
}
