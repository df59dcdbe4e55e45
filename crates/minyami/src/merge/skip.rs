use std::path::{Path, PathBuf};

use super::Merger;
use crate::error::MinyamiResult;

/// Leave the segments where they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipMerger;

impl Merger for SkipMerger {
    async fn merge(&self, files: &[PathBuf], _output: &Path) -> MinyamiResult<()> {
        log::info!("Skip merging. Please merge video chunks manually.");
        if let Some(dir) = files.first().and_then(|f| f.parent()) {
            log::info!("Temporary files are located at {}", dir.display());
        }
        Ok(())
    }

    fn consumes_segments(&self) -> bool {
        false
    }
}
