use std::path::Path;

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};

use crate::{
    error::{MinyamiError, MinyamiResult},
    site::EffectiveKeyMaterial,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aes128Key {
    pub key: [u8; 16],
    pub iv: [u8; 16],
}

impl Aes128Key {
    pub fn from_hex(key: &str, iv: &str) -> MinyamiResult<Self> {
        Ok(Self {
            key: decode_block(key)?,
            iv: decode_block(iv)?,
        })
    }

    pub fn decrypt(&self, data: &[u8]) -> MinyamiResult<Vec<u8>> {
        let decryptor = cbc::Decryptor::<aes::Aes128>::new(&self.key.into(), &self.iv.into());
        Ok(decryptor.decrypt_padded_vec_mut::<Pkcs7>(data)?)
    }
}

impl TryFrom<&EffectiveKeyMaterial> for Aes128Key {
    type Error = MinyamiError;

    fn try_from(material: &EffectiveKeyMaterial) -> Result<Self, Self::Error> {
        Self::from_hex(&material.key, &material.iv)
    }
}

fn decode_block(hex_str: &str) -> MinyamiResult<[u8; 16]> {
    let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    hex::decode(hex_str)?
        .try_into()
        .map_err(|_| MinyamiError::InvalidHexKey(hex_str.to_string()))
}

/// Decrypt `src` into `dest` with AES-128-CBC.
pub async fn decrypt_file(src: &Path, dest: &Path, key: Aes128Key) -> MinyamiResult<()> {
    let data = tokio::fs::read(src).await?;
    let decrypted = tokio::task::spawn_blocking(move || key.decrypt(&data)).await??;
    tokio::fs::write(dest, decrypted).await?;
    Ok(())
}
