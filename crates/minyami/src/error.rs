use aes::cipher::block_padding::UnpadError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MinyamiError {
    #[error("Invalid m3u8 file: {0}")]
    MalformedPlaylist(String),

    #[error("Missing key material: {0}")]
    MissingKeyMaterial(String),

    #[error("Unsupported site: {0}")]
    UnsupportedSite(String),

    #[error("HTTP error: {0}")]
    HttpError(reqwest::StatusCode),

    #[error("M3u8 fetch error")]
    M3u8FetchError,

    #[error("Invalid hex key: {0}")]
    InvalidHexKey(String),

    #[error("Pkcs7 unpad error")]
    UnpadError(#[from] UnpadError),

    #[error("Downloading {filename} failed: {source}")]
    Fetch {
        filename: String,
        #[source]
        source: Box<MinyamiError>,
    },

    #[error("Decrypting {filename} failed: {source}")]
    Decrypt {
        filename: String,
        #[source]
        source: Box<MinyamiError>,
    },

    #[error("Processing {filename} timed out")]
    Timeout { filename: String },

    #[error("Processing {filename} failed {attempts} time(s), giving up")]
    RetriesExhausted { filename: String, attempts: u32 },

    #[error("Merge failed: {0}")]
    MergeFailed(String),

    #[error("Failed to clean temporary directory {path}: {source}")]
    CleanupFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error(transparent)]
    HexDecodeError(#[from] hex::FromHexError),

    #[error(transparent)]
    RequestError(#[from] reqwest::Error),

    #[error(transparent)]
    MissingExecutable(#[from] which::Error),

    #[error(transparent)]
    JoinError(#[from] tokio::task::JoinError),
}

impl MinyamiError {
    /// Whether the error aborts the run before any segment is dispatched.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedPlaylist(_) | Self::MissingKeyMaterial(_) | Self::UnsupportedSite(_)
        )
    }
}

pub type MinyamiResult<T> = Result<T, MinyamiError>;
