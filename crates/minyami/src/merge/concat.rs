use std::path::{Path, PathBuf};

use tokio::{fs::File, io::AsyncWriteExt};

use super::Merger;
use crate::error::MinyamiResult;

/// Concat segment files byte by byte. Suitable for MPEG-TS output.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConcatMerger;

impl Merger for ConcatMerger {
    async fn merge(&self, files: &[PathBuf], output: &Path) -> MinyamiResult<()> {
        let mut output = File::create(output).await?;
        for path in files {
            let mut file = File::open(path).await?;
            tokio::io::copy(&mut file, &mut output).await?;
        }
        output.flush().await?;
        Ok(())
    }
}
