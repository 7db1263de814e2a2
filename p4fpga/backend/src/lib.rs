//! The P4FPGA backend: lowers an elaborated P4 program to Bluespec.
//!
//! [run_fpga_backend] builds an [FpgaProgram] from the front end's output
//! and writes the generated Bluespec and the C++ simulation model of the
//! match tables. [generate_table_profile] and [generate_partition] serve
//! the profiling and partitioning modes.
mod backend;
mod options;
mod partition;
mod profiler;

pub mod bsv;
pub mod program;
pub mod type_factory;

pub use backend::{
    EmitSummary, generate_partition, generate_table_profile, run_fpga_backend,
};
pub use options::Options;
pub use partition::partition_file_name;
pub use profiler::{PROFILE_FILE, ProfileReport, TableProfile};
pub use program::FpgaProgram;
pub use type_factory::TypeFactory;
