//! Shared utilities for the P4FPGA compiler backend.
mod errors;
mod id;
mod namegenerator;
mod out_file;

pub mod math;

pub use errors::{Error, ErrorKind, FpgaResult};
pub use id::{GSym, GetName, Id};
pub use math::bits_needed_for;
pub use namegenerator::NameGenerator;
pub use out_file::OutputFile;
