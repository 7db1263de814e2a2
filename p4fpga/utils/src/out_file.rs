use crate::{Error, FpgaResult};
use std::{
    io::{self, BufWriter, Write},
    path::PathBuf,
};

/// Possible choices for output streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFile {
    Null,
    Stdout,
    Stderr,
    File(PathBuf),
}

impl OutputFile {
    pub fn file<P: Into<PathBuf>>(path: P) -> Self {
        OutputFile::File(path.into())
    }

    pub fn as_path_string(&self) -> String {
        match self {
            OutputFile::Null => "<null>".to_string(),
            OutputFile::Stdout => "<stdout>".to_string(),
            OutputFile::Stderr => "<stderr>".to_string(),
            OutputFile::File(path) => path.to_string_lossy().to_string(),
        }
    }

    pub fn isatty(&self) -> bool {
        match self {
            OutputFile::Stdout => atty::is(atty::Stream::Stdout),
            OutputFile::Stderr => atty::is(atty::Stream::Stderr),
            OutputFile::Null | OutputFile::File(_) => false,
        }
    }

    /// Open a writer for this output. Files are created (or truncated).
    pub fn get_write(&self) -> FpgaResult<Box<dyn io::Write>> {
        Ok(match self {
            OutputFile::Stdout => Box::new(BufWriter::new(io::stdout())),
            OutputFile::Stderr => Box::new(BufWriter::new(io::stderr())),
            OutputFile::File(path) => {
                let file = std::fs::File::create(path).map_err(|err| {
                    Error::write_error(format!(
                        "Cannot create {}: {}",
                        path.display(),
                        err
                    ))
                })?;
                Box::new(BufWriter::new(file))
            }
            OutputFile::Null => Box::new(io::sink()),
        })
    }

    /// Write `contents` to this output in one go and flush it.
    pub fn write_all(&self, contents: &str) -> FpgaResult<()> {
        let mut out = self.get_write()?;
        out.write_all(contents.as_bytes())
            .and_then(|_| out.flush())
            .map_err(|err| {
                Error::write_error(format!(
                    "Failed to write {}: {}",
                    self.as_path_string(),
                    err
                ))
            })
    }
}
