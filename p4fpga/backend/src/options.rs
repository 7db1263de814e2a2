use bon::Builder;
use p4fpga_utils::{Error, FpgaResult};
use std::path::{Path, PathBuf};

/// Configuration of one backend run.
#[derive(Debug, Default, Clone, Builder)]
pub struct Options {
    /// The program being compiled; its base name names partitions.
    #[builder(into)]
    pub file: PathBuf,
    /// Where every artifact is written.
    #[builder(into)]
    pub output_dir: Option<PathBuf>,
}

impl Options {
    /// The output directory. An empty path counts as missing.
    pub fn output_dir(&self) -> FpgaResult<&Path> {
        match &self.output_dir {
            Some(dir) if !dir.as_os_str().is_empty() => Ok(dir),
            _ => Err(Error::missing_output_path()),
        }
    }
}
