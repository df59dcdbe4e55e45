use std::{
    future::Future,
    path::{Path, PathBuf},
};

use crate::{
    decrypt::{decrypt_file, Aes128Key},
    error::{MinyamiError, MinyamiResult},
    fetch::Fetcher,
    segment::Segment,
};

/// Work performed for every segment drained from the queue.
pub trait SegmentTask: Send + Sync {
    fn run(&self, segment: &Segment) -> impl Future<Output = MinyamiResult<()>> + Send;
}

/// Fetch a segment into the temporary directory, then decrypt it next to
/// the fetched file when the stream is encrypted.
pub struct FetchDecryptTask<F> {
    fetcher: F,
    temp_dir: PathBuf,
    key: Option<Aes128Key>,
}

impl<F> FetchDecryptTask<F>
where
    F: Fetcher,
{
    pub fn new(fetcher: F, temp_dir: impl Into<PathBuf>, key: Option<Aes128Key>) -> Self {
        Self {
            fetcher,
            temp_dir: temp_dir.into(),
            key,
        }
    }
}

impl<F> SegmentTask for FetchDecryptTask<F>
where
    F: Fetcher,
{
    async fn run(&self, segment: &Segment) -> MinyamiResult<()> {
        let filename = &segment.filename;
        let raw_path = self.temp_dir.join(filename);

        log::debug!("Downloading {filename}");
        self.fetcher
            .fetch(&segment.url, &raw_path)
            .await
            .map_err(|e| MinyamiError::Fetch {
                filename: filename.clone(),
                source: Box::new(e),
            })?;
        log::debug!("Downloading {filename} succeed.");

        if let Some(key) = self.key {
            decrypt_file(&raw_path, &decrypted_path(&raw_path), key)
                .await
                .map_err(|e| MinyamiError::Decrypt {
                    filename: filename.clone(),
                    source: Box::new(e),
                })?;
            log::debug!("Decrypting {filename} succeed.");
        }

        Ok(())
    }
}

/// `<file>.decrypt` next to `raw_path`.
pub fn decrypted_path(raw_path: &Path) -> PathBuf {
    let mut path = raw_path.as_os_str().to_owned();
    path.push(".decrypt");
    PathBuf::from(path)
}

/// File merged for `segment`: the decrypted copy for encrypted streams, the
/// fetched file otherwise.
pub fn output_path(temp_dir: &Path, segment: &Segment, encrypted: bool) -> PathBuf {
    let raw_path = temp_dir.join(&segment.filename);
    if encrypted {
        decrypted_path(&raw_path)
    } else {
        raw_path
    }
}
