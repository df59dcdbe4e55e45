use std::{ops::Deref, sync::Arc};

use reqwest::{Client, ClientBuilder, IntoUrl};
use reqwest_cookie_store::{CookieStore, CookieStoreMutex};

use crate::error::MinyamiResult;

/// A [Client] sharing one cookie jar between manifest and segment requests.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    cookies_store: Arc<CookieStoreMutex>,
}

impl HttpClient {
    pub fn new(builder: ClientBuilder) -> MinyamiResult<Self> {
        let cookies_store = Arc::new(CookieStoreMutex::new(CookieStore::default()));
        let client = builder.cookie_provider(cookies_store.clone()).build()?;

        Ok(Self {
            client,
            cookies_store,
        })
    }

    /// Add `Set-Cookie` style cookies for `url`. Invalid cookies are ignored.
    pub fn add_cookies(&self, cookies: Vec<String>, url: impl IntoUrl) -> MinyamiResult<()> {
        let url = url.into_url()?;
        let Ok(mut lock) = self.cookies_store.lock() else {
            log::warn!("Cookie store is poisoned, cookies are ignored.");
            return Ok(());
        };
        for cookie in cookies {
            if let Err(e) = lock.parse(&cookie, &url) {
                log::warn!("Ignored invalid cookie {cookie}: {e}");
            }
        }
        Ok(())
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        let cookies_store = Arc::new(CookieStoreMutex::new(CookieStore::default()));
        let client = Client::builder()
            .cookie_provider(cookies_store.clone())
            .build()
            .unwrap_or_default();

        Self {
            client,
            cookies_store,
        }
    }
}

impl Deref for HttpClient {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}
