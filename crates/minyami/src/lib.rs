//! Archive HLS streams into a single file.
//!
//! ```text
//! manifest ──► PlaylistModel ──► resolve_site ──► [Segment] ──► ConcurrentRetryQueue
//!                                     │                               │
//!                             EffectiveKeyMaterial           FetchDecryptTask × N
//!                                                                     │
//!                            output files (playlist order) ◄──────────┘
//!                                     │
//!                                   Merger
//! ```
pub mod archive;
pub mod decrypt;
pub mod error;
pub mod fetch;
pub mod merge;
pub mod playlist;
pub mod progress;
pub mod queue;
pub mod segment;
pub mod site;
pub mod task;
pub mod util;

pub use archive::{ArchiveConfig, ArchiveDownloader, ArchiveReport};
pub use error::{MinyamiError, MinyamiResult};
pub use segment::Segment;
pub use util::http::HttpClient;
