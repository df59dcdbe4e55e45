mod concat;
mod mkvmerge;
mod skip;

pub use concat::ConcatMerger;
pub use mkvmerge::MkvMerger;
pub use skip::SkipMerger;

use crate::error::MinyamiResult;
use std::{
    future::Future,
    path::{Path, PathBuf},
};

pub trait Merger: Send + Sync {
    /// Merge `files` into `output`, in the given order.
    fn merge(
        &self,
        files: &[PathBuf],
        output: &Path,
    ) -> impl Future<Output = MinyamiResult<()>> + Send;

    /// Whether segment files are consumed by this merger and may be removed afterwards.
    fn consumes_segments(&self) -> bool {
        true
    }
}

impl<M> Merger for &M
where
    M: Merger,
{
    fn merge(
        &self,
        files: &[PathBuf],
        output: &Path,
    ) -> impl Future<Output = MinyamiResult<()>> + Send {
        (**self).merge(files, output)
    }

    fn consumes_segments(&self) -> bool {
        (**self).consumes_segments()
    }
}

pub enum ArchiveMerger {
    Concat(ConcatMerger),
    MkvMerge(MkvMerger),
    Skip(SkipMerger),
}

impl ArchiveMerger {
    /// Remux into matroska with mkvmerge for `.mkv` outputs, concat segments otherwise.
    pub fn auto(output: &Path) -> Self {
        let is_mkv = output
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("mkv"));
        if is_mkv {
            Self::mkvmerge()
        } else {
            Self::concat()
        }
    }

    pub fn concat() -> Self {
        Self::Concat(ConcatMerger)
    }

    pub fn mkvmerge() -> Self {
        Self::MkvMerge(MkvMerger)
    }

    pub fn skip() -> Self {
        Self::Skip(SkipMerger)
    }
}

impl Merger for ArchiveMerger {
    async fn merge(&self, files: &[PathBuf], output: &Path) -> MinyamiResult<()> {
        match self {
            Self::Concat(merger) => merger.merge(files, output).await,
            Self::MkvMerge(merger) => merger.merge(files, output).await,
            Self::Skip(merger) => merger.merge(files, output).await,
        }
    }

    fn consumes_segments(&self) -> bool {
        match self {
            Self::Concat(merger) => merger.consumes_segments(),
            Self::MkvMerge(merger) => merger.consumes_segments(),
            Self::Skip(merger) => merger.consumes_segments(),
        }
    }
}
