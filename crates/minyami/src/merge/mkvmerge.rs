use std::path::{Path, PathBuf};

use tokio::process::Command;

use super::Merger;
use crate::error::{MinyamiError, MinyamiResult};

/// Remux segments into one matroska file with `mkvmerge` found in `PATH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MkvMerger;

impl Merger for MkvMerger {
    async fn merge(&self, files: &[PathBuf], output: &Path) -> MinyamiResult<()> {
        let status = Command::new(which::which("mkvmerge")?)
            .arg("-q")
            .arg("-o")
            .arg(output)
            .arg("[")
            .args(files)
            .arg("]")
            .status()
            .await?;

        // mkvmerge exits with 1 when it only emitted warnings
        match status.code() {
            Some(0) => Ok(()),
            Some(1) => {
                log::warn!("mkvmerge finished with warnings.");
                Ok(())
            }
            code => Err(MinyamiError::MergeFailed(format!(
                "mkvmerge exited with {code:?}"
            ))),
        }
    }
}
