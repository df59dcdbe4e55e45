use super::{normalize_iv, DeriveOptions, EffectiveKeyMaterial, KeyDerivation, RawKeyMaterial};
use crate::error::{MinyamiError, MinyamiResult};

/// FreshTV archives.
///
/// Key URIs look like `abemafresh://abemafresh/<video id>t<key>`, the key is
/// embedded in hex after the last `t`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FreshTvStrategy;

impl FreshTvStrategy {
    pub const KEY_PREFIX: &'static str = "abemafresh";
    pub const URL_PREFIX: &'static str = "https://movie.freshlive.tv";
    /// Clear FreshTV manifests are recognized by their location.
    pub const HOST_HINT: &'static str = "freshlive";

    fn extract_key(key_uri: &str) -> MinyamiResult<String> {
        let payload = key_uri.rsplit('/').next().unwrap_or(key_uri);
        let key = payload.rsplit_once('t').map_or(payload, |(_, key)| key);
        if key.len() != 32 || !key.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(MinyamiError::MissingKeyMaterial(format!(
                "no key found in FreshTV key uri {key_uri}"
            )));
        }
        Ok(key.to_ascii_lowercase())
    }
}

impl KeyDerivation for FreshTvStrategy {
    fn site(&self) -> &'static str {
        "FreshTV"
    }

    async fn derive(
        &self,
        raw: &RawKeyMaterial,
        _options: &DeriveOptions,
    ) -> MinyamiResult<EffectiveKeyMaterial> {
        Ok(EffectiveKeyMaterial {
            key: Self::extract_key(&raw.key)?,
            iv: normalize_iv(&raw.iv)?,
            url_prefix: Self::URL_PREFIX.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_derive() {
        let raw = RawKeyMaterial {
            key: "abemafresh://abemafresh/93615t00112233445566778899AABBCCDDEEFF".to_string(),
            iv: "0x000102030405060708090a0b0c0d0e0f".to_string(),
        };
        let derived = FreshTvStrategy
            .derive(&raw, &DeriveOptions::default())
            .await
            .unwrap();
        assert_eq!(derived.key, "00112233445566778899aabbccddeeff");
        assert_eq!(derived.iv, "000102030405060708090a0b0c0d0e0f");
        assert_eq!(derived.url_prefix, "https://movie.freshlive.tv");
    }

    #[tokio::test]
    async fn test_derive_is_deterministic() {
        let raw = RawKeyMaterial {
            key: "abemafresh://abemafresh/1t0123456789abcdef0123456789abcdef".to_string(),
            iv: "0x01".to_string(),
        };
        let options = DeriveOptions::default();
        let first = FreshTvStrategy.derive(&raw, &options).await.unwrap();
        let second = FreshTvStrategy.derive(&raw, &options).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_derive_without_key() {
        let raw = RawKeyMaterial {
            key: "abemafresh://abemafresh/".to_string(),
            iv: "0x01".to_string(),
        };
        let result = FreshTvStrategy.derive(&raw, &DeriveOptions::default()).await;
        assert!(matches!(result, Err(MinyamiError::MissingKeyMaterial(_))));
    }
}
