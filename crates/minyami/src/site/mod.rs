//! Site specific key derivation.
//!
//! Some sites do not publish a plain key URI in their manifests. The key URI
//! instead carries a site specific hint, which is turned into the key, IV and
//! URL prefix actually used for downloading by one of the strategies below.
mod abema;
mod freshtv;

pub use abema::AbemaStrategy;
pub use freshtv::FreshTvStrategy;

use std::future::Future;

use crate::{
    error::{MinyamiError, MinyamiResult},
    playlist::{Manifest, PlaylistModel},
};

/// Key hints as they appear in the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawKeyMaterial {
    pub key: String,
    pub iv: String,
}

/// Options a strategy may consume besides the manifest hints.
#[derive(Debug, Clone, Default)]
pub struct DeriveOptions {
    /// Key supplied by the operator.
    pub key: Option<String>,
}

/// Key, IV and URL prefix used to fetch and decrypt segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveKeyMaterial {
    /// Hex encoded AES-128 key.
    pub key: String,
    /// Hex encoded IV.
    pub iv: String,
    pub url_prefix: String,
}

pub trait KeyDerivation {
    /// Human readable site name.
    fn site(&self) -> &'static str;

    fn derive(
        &self,
        raw: &RawKeyMaterial,
        options: &DeriveOptions,
    ) -> impl Future<Output = MinyamiResult<EffectiveKeyMaterial>> + Send;
}

/// Known key derivation strategies, in selection priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStrategy {
    FreshTv(FreshTvStrategy),
    Abema(AbemaStrategy),
}

impl KeyStrategy {
    /// Select the strategy whose prefix matches the raw key URI. First match wins.
    pub fn select(key_uri: &str) -> Option<Self> {
        if key_uri.starts_with(FreshTvStrategy::KEY_PREFIX) {
            Some(Self::FreshTv(FreshTvStrategy))
        } else if key_uri.starts_with(AbemaStrategy::KEY_PREFIX) {
            Some(Self::Abema(AbemaStrategy))
        } else {
            None
        }
    }
}

impl KeyDerivation for KeyStrategy {
    fn site(&self) -> &'static str {
        match self {
            Self::FreshTv(strategy) => strategy.site(),
            Self::Abema(strategy) => strategy.site(),
        }
    }

    async fn derive(
        &self,
        raw: &RawKeyMaterial,
        options: &DeriveOptions,
    ) -> MinyamiResult<EffectiveKeyMaterial> {
        match self {
            Self::FreshTv(strategy) => strategy.derive(raw, options).await,
            Self::Abema(strategy) => strategy.derive(raw, options).await,
        }
    }
}

/// Outcome of site detection for one manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteResolution {
    /// Absent for clear streams.
    pub key: Option<EffectiveKeyMaterial>,
    pub url_prefix: String,
}

/// Resolve key material and URL prefix for a parsed manifest.
///
/// Encrypted streams must match exactly one known strategy, otherwise the
/// run can not proceed.
pub async fn resolve_site(
    manifest: &Manifest,
    playlist: &PlaylistModel,
    options: &DeriveOptions,
) -> MinyamiResult<SiteResolution> {
    let Some(raw) = playlist.raw_key()? else {
        if manifest.location.contains(FreshTvStrategy::HOST_HINT) {
            log::info!("Site confirmed: {}.", FreshTvStrategy.site());
            return Ok(SiteResolution {
                key: None,
                url_prefix: FreshTvStrategy::URL_PREFIX.to_string(),
            });
        }
        return Ok(SiteResolution::default());
    };

    let strategy = KeyStrategy::select(&raw.key)
        .ok_or_else(|| MinyamiError::UnsupportedSite(raw.key.clone()))?;
    log::info!("Site confirmed: {}.", strategy.site());

    let key = strategy.derive(&raw, options).await?;
    log::info!("Key: {}; IV: {}.", key.key, key.iv);
    Ok(SiteResolution {
        url_prefix: key.url_prefix.clone(),
        key: Some(key),
    })
}

/// Normalize a manifest IV into 32 lowercase hex digits.
pub(crate) fn normalize_iv(iv: &str) -> MinyamiResult<String> {
    let iv = iv
        .strip_prefix("0x")
        .or_else(|| iv.strip_prefix("0X"))
        .unwrap_or(iv);
    if iv.is_empty() || iv.len() > 32 || !iv.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(MinyamiError::InvalidHexKey(iv.to_string()));
    }
    Ok(format!("{:0>32}", iv.to_ascii_lowercase()))
}
