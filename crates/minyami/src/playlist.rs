use m3u8_rs::{KeyMethod, Playlist};
use reqwest::Url;

use crate::{
    error::{MinyamiError, MinyamiResult},
    site::RawKeyMaterial,
    util::http::HttpClient,
};

/// Segment list and encryption metadata of a media playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistModel {
    pub is_encrypted: bool,
    /// Raw segment paths in playback order.
    pub segments: Vec<String>,
    pub key_uri: Option<String>,
    pub iv: Option<String>,
    /// Average `#EXTINF` duration in seconds.
    pub average_duration: f32,
}

impl PlaylistModel {
    pub fn parse(manifest: &str) -> MinyamiResult<Self> {
        let playlist = m3u8_rs::parse_playlist_res(manifest.as_bytes()).map_err(|_| {
            MinyamiError::MalformedPlaylist("manifest is not a valid m3u8 file".to_string())
        })?;
        let playlist = match playlist {
            Playlist::MediaPlaylist(pl) => pl,
            Playlist::MasterPlaylist(pl) => {
                return Err(MinyamiError::MalformedPlaylist(format!(
                    "master playlist with {} variant(s) found, a media playlist is required",
                    pl.variants.len()
                )))
            }
        };

        if playlist.segments.is_empty() {
            return Err(MinyamiError::MalformedPlaylist(
                "no segment found in manifest".to_string(),
            ));
        }

        let key = playlist
            .segments
            .iter()
            .filter_map(|s| s.key.as_ref())
            .find(|k| !matches!(k.method, KeyMethod::None));

        let total_duration: f32 = playlist.segments.iter().map(|s| s.duration).sum();
        Ok(Self {
            is_encrypted: key.is_some(),
            segments: playlist.segments.iter().map(|s| s.uri.clone()).collect(),
            key_uri: key.and_then(|k| k.uri.clone()),
            iv: key.and_then(|k| k.iv.clone()),
            average_duration: total_duration / playlist.segments.len() as f32,
        })
    }

    /// Raw key hints of an encrypted playlist.
    ///
    /// Returns `Ok(None)` for clear streams.
    pub fn raw_key(&self) -> MinyamiResult<Option<RawKeyMaterial>> {
        if !self.is_encrypted {
            return Ok(None);
        }

        match (&self.key_uri, &self.iv) {
            (Some(key), Some(iv)) => Ok(Some(RawKeyMaterial {
                key: key.clone(),
                iv: iv.clone(),
            })),
            (None, _) => Err(MinyamiError::MissingKeyMaterial(
                "URI field in key must exist".to_string(),
            )),
            (_, None) => Err(MinyamiError::MissingKeyMaterial(
                "IV field in key must exist".to_string(),
            )),
        }
    }
}

/// Manifest text together with where it came from.
#[derive(Debug, Clone)]
pub struct Manifest {
    /// Path or URL given by the user.
    pub location: String,
    /// Final URL of the manifest when it was fetched over HTTP.
    pub base_url: Option<Url>,
    pub text: String,
}

impl Manifest {
    pub fn new(location: impl Into<String>, base_url: Option<Url>, text: String) -> Self {
        Self {
            location: location.into(),
            base_url,
            text,
        }
    }
}

pub async fn load_manifest(
    client: &HttpClient,
    location: &str,
    total_retry: u32,
) -> MinyamiResult<Manifest> {
    if !(location.starts_with("http://") || location.starts_with("https://")) {
        log::info!("Reading M3U8 file from {location}.");
        let text = tokio::fs::read_to_string(location).await?;
        return Ok(Manifest::new(location, None, text));
    }

    log::info!("Start fetching M3U8 file.");
    let url = Url::parse(location)?;
    let mut retry = total_retry.max(1);
    loop {
        if retry == 0 {
            return Err(MinyamiError::M3u8FetchError);
        }
        retry -= 1;

        let response = match client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(error) => {
                log::warn!("Failed to fetch M3U8 file: {error}");
                continue;
            }
        };
        if !response.status().is_success() {
            log::warn!("Failed to fetch M3U8 file: HTTP {}", response.status());
            continue;
        }

        let final_url = response.url().clone();
        match response.text().await {
            Ok(text) => {
                log::info!("M3U8 file fetched.");
                return Ok(Manifest::new(location, Some(final_url), text));
            }
            Err(error) => log::warn!("Failed to fetch M3U8 file: {error}"),
        }
    }
}
