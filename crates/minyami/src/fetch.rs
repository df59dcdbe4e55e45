use std::{future::Future, path::Path};

use futures::StreamExt;
use tokio::{fs::File, io::AsyncWriteExt};

use crate::{
    error::{MinyamiError, MinyamiResult},
    util::http::HttpClient,
};

/// Transfers the bytes behind an URL into a local file.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str, dest: &Path) -> impl Future<Output = MinyamiResult<()>> + Send;
}

impl<F> Fetcher for &F
where
    F: Fetcher,
{
    fn fetch(&self, url: &str, dest: &Path) -> impl Future<Output = MinyamiResult<()>> + Send {
        (**self).fetch(url, dest)
    }
}

pub struct HttpFetcher {
    client: HttpClient,
}

impl HttpFetcher {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> MinyamiResult<()> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            if let Ok(body) = response.text().await {
                log::debug!("Error body: {body}");
            }
            return Err(MinyamiError::HttpError(status));
        }

        let mut file = File::create(dest).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;

        Ok(())
    }
}
