//! Entry points that turn an elaborated program into files.
use crate::bsv::{BsvProgram, CppProgram};
use crate::options::Options;
use crate::partition::{partition_file_name, write_partition};
use crate::profiler::{PROFILE_FILE, ProfileReport};
use crate::program::FpgaProgram;
use crate::type_factory::TypeFactory;
use p4fpga_ir::{CanonicalPrinter, MainBlock, Program, ReferenceMap, ToplevelBlock, TypeMap};
use p4fpga_utils::{Error, FpgaResult, OutputFile};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Outcome of writing the artifacts. Every artifact is written
/// independently, so some may fail while others succeed.
#[derive(Debug, Default)]
pub struct EmitSummary {
    pub written: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, Error)>,
}

impl EmitSummary {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

fn entry_point(toplevel: &ToplevelBlock) -> FpgaResult<&MainBlock> {
    toplevel
        .get_main()
        .ok_or_else(|| Error::missing_entry_point(ToplevelBlock::MAIN))
}

fn build_model(
    toplevel: &ToplevelBlock,
    ref_map: &ReferenceMap,
    type_map: &TypeMap,
) -> FpgaResult<FpgaProgram> {
    let main = entry_point(toplevel)?;
    type_map.validate().map_err(Error::model_build)?;
    let type_factory = TypeFactory::new(type_map);
    FpgaProgram::build(
        toplevel.get_program(),
        main,
        ref_map,
        type_map,
        &type_factory,
    )
    .map_err(Error::model_build)
}

/// The configured output directory, created if it does not exist yet.
fn prepare_output_dir(options: &Options) -> FpgaResult<&Path> {
    let dir = options.output_dir()?;
    std::fs::create_dir_all(dir).map_err(|err| {
        Error::write_error(format!("Cannot create {}: {}", dir.display(), err))
    })?;
    Ok(dir)
}

/// Build the program model and write every artifact into the output
/// directory. Nothing is written unless the model builds.
///
/// Returns `Ok(None)` when there is no top-level block: the front end has
/// already reported why, and there is nothing to compile.
pub fn run_fpga_backend(
    options: &Options,
    toplevel: Option<&ToplevelBlock>,
    ref_map: &ReferenceMap,
    type_map: &TypeMap,
) -> FpgaResult<Option<EmitSummary>> {
    let Some(toplevel) = toplevel else {
        log::debug!("No top-level block, nothing to compile");
        return Ok(None);
    };
    let program = build_model(toplevel, ref_map, type_map)?;
    let dir = prepare_output_dir(options)?;

    let mut bsv = BsvProgram::new();
    let mut cpp = CppProgram::new();
    program.emit(&mut bsv, &mut cpp);

    let mut summary = EmitSummary::default();
    for builder in bsv.builders().chain(cpp.builders()) {
        let path = dir.join(builder.kind().file_name());
        match OutputFile::file(&path).write_all(&builder.serialize()) {
            Ok(()) => {
                log::info!("Wrote {}", path.display());
                summary.written.push(path);
            }
            Err(err) => {
                log::error!("{}", err);
                summary.failed.push((path, err));
            }
        }
    }
    Ok(Some(summary))
}

/// Build the program model and write its table profile. Returns the path
/// of the report.
pub fn generate_table_profile(
    options: &Options,
    toplevel: &ToplevelBlock,
    ref_map: &ReferenceMap,
    type_map: &TypeMap,
) -> FpgaResult<PathBuf> {
    let program = build_model(toplevel, ref_map, type_map)?;
    let report = ProfileReport::profile(&program);
    let path = prepare_output_dir(options)?.join(PROFILE_FILE);
    OutputFile::file(&path).write_all(&report.to_string())?;
    log::info!(
        "Wrote {} ({} tables)",
        path.display(),
        report.tables.len()
    );
    Ok(path)
}

/// Print `program` as partition `idx` of the source program. Returns the
/// path of the written partition.
pub fn generate_partition(
    options: &Options,
    program: &Program,
    idx: &str,
    printer: &dyn CanonicalPrinter,
) -> FpgaResult<PathBuf> {
    let name = partition_file_name(&options.file, idx)?;
    let path = prepare_output_dir(options)?.join(name);
    let mut out = OutputFile::file(&path).get_write()?;
    write_partition(program, printer, &mut *out)?;
    out.flush()?;
    log::info!("Wrote partition {}", path.display());
    Ok(path)
}
