use super::{normalize_iv, DeriveOptions, EffectiveKeyMaterial, KeyDerivation, RawKeyMaterial};
use crate::error::{MinyamiError, MinyamiResult};

/// AbemaTV archives.
///
/// No license exchange is performed here and the key URI is never fetched.
/// The operator obtains the content key out of band and passes it in with
/// `--key`; derivation only validates that key and normalizes the IV.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AbemaStrategy;

impl AbemaStrategy {
    pub const KEY_PREFIX: &'static str = "abematv-license";
    pub const URL_PREFIX: &'static str = "https://ds-vod-abematv.akamaized.net";
}

impl KeyDerivation for AbemaStrategy {
    fn site(&self) -> &'static str {
        "AbemaTV"
    }

    async fn derive(
        &self,
        raw: &RawKeyMaterial,
        options: &DeriveOptions,
    ) -> MinyamiResult<EffectiveKeyMaterial> {
        let key = options.key.as_deref().ok_or_else(|| {
            MinyamiError::MissingKeyMaterial(
                "To download AbemaTV, you need to set a key manually".to_string(),
            )
        })?;
        let key = key.trim();
        if key.len() != 32 || !key.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(MinyamiError::InvalidHexKey(key.to_string()));
        }

        Ok(EffectiveKeyMaterial {
            key: key.to_ascii_lowercase(),
            iv: normalize_iv(&raw.iv)?,
            url_prefix: Self::URL_PREFIX.to_string(),
        })
    }
}
