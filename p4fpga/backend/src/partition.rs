//! Writing a program partition back out as P4.
use p4fpga_ir::{CanonicalPrinter, Program};
use p4fpga_utils::{Error, FpgaResult};
use std::path::Path;

/// `<base name of source><idx>.p4`, e.g. `switch2.p4` for `switch.p4`
/// and partition `2`.
pub fn partition_file_name(source: &Path, idx: &str) -> FpgaResult<String> {
    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            Error::invalid_file(format!(
                "cannot derive a partition name from `{}`",
                source.display()
            ))
        })?;
    Ok(format!("{}{}.p4", stem, idx))
}

/// Print `program` with the front end's canonical printer.
pub fn write_partition(
    program: &Program,
    printer: &dyn CanonicalPrinter,
    out: &mut dyn std::io::Write,
) -> FpgaResult<()> {
    printer.print(program, out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use p4fpga_ir::Printer;

    #[test]
    fn deterministic_names() {
        for _ in 0..2 {
            assert_eq!(
                partition_file_name(Path::new("switch.p4"), "2").unwrap(),
                "switch2.p4"
            );
        }
        assert_eq!(
            partition_file_name(Path::new("/src/l3/router.p4"), "0").unwrap(),
            "router0.p4"
        );
        assert!(partition_file_name(Path::new(""), "0").is_err());
    }

    #[test]
    fn prints_through_the_printer() {
        let mut buf = vec![];
        write_partition(&Program::default(), &Printer, &mut buf).unwrap();
        assert!(String::from_utf8(buf).is_ok());
    }
}
