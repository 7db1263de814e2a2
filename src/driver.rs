//! Driver for the P4FPGA compiler.
use crate::cmdline::Opts;
use itertools::Itertools;
use p4fpga_backend::{generate_partition, generate_table_profile, run_fpga_backend};
use p4fpga_ir::{Printer, ReferenceMap, TypeMap, from_json};
use p4fpga_utils::{Error, FpgaResult, OutputFile};

/// Run the compiler from the command line.
pub fn run_compiler() -> FpgaResult<()> {
    let opts = Opts::get_opts();

    env_logger::Builder::new()
        .format_timestamp(None)
        .filter_level(opts.log_level)
        .write_style(if OutputFile::Stderr.isatty() {
            env_logger::WriteStyle::Auto
        } else {
            env_logger::WriteStyle::Never
        })
        .target(env_logger::Target::Stderr)
        .init();

    let toplevel = from_json::load_toplevel(&opts.file)?;
    let ref_map = ReferenceMap::build(toplevel.get_program());
    let type_map = TypeMap::build(toplevel.get_program());
    let options = opts.backend_options();

    let Some(summary) =
        run_fpga_backend(&options, Some(&toplevel), &ref_map, &type_map)?
    else {
        return Ok(());
    };

    if opts.profile {
        generate_table_profile(&options, &toplevel, &ref_map, &type_map)?;
    }
    if let Some(idx) = &opts.partition {
        generate_partition(&options, toplevel.get_program(), idx, &Printer)?;
    }

    if !summary.is_complete() {
        return Err(Error::write_error(format!(
            "Failed to write {}",
            summary
                .failed
                .iter()
                .map(|(path, _)| path.display())
                .join(", ")
        )));
    }
    Ok(())
}
