//! Resource estimates for the match tables of a program.
use crate::program::FpgaProgram;
use p4fpga_ir::MatchKind;
use p4fpga_utils::Id;
use std::fmt;

/// Name of the report file in the output directory.
pub const PROFILE_FILE: &str = "table.prof";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableProfile {
    pub control: Id,
    pub table: Id,
    pub match_kind: MatchKind,
    pub key_width: u64,
    pub entries: u64,
    pub actions: usize,
    pub action_width: u64,
    pub sram_bits: u64,
    pub tcam_bits: u64,
}

/// Per-table resource usage, in pipeline order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProfileReport {
    pub tables: Vec<TableProfile>,
}

impl ProfileReport {
    pub fn profile(program: &FpgaProgram) -> Self {
        let tables = program
            .tables()
            .map(|t| {
                let key_width = t.key_width();
                // Tables whose memory overflows are rejected when built.
                let (sram_bits, tcam_bits) =
                    t.memory_bits().unwrap_or((u64::MAX, u64::MAX));
                TableProfile {
                    control: t.control,
                    table: t.name,
                    match_kind: t.match_kind(),
                    key_width,
                    entries: t.size,
                    actions: t.actions.len(),
                    action_width: t.action_width,
                    sram_bits,
                    tcam_bits,
                }
            })
            .collect();
        ProfileReport { tables }
    }

    pub fn sram_bits(&self) -> u64 {
        self.tables.iter().map(|t| t.sram_bits).fold(0, u64::saturating_add)
    }

    pub fn tcam_bits(&self) -> u64 {
        self.tables.iter().map(|t| t.tcam_bits).fold(0, u64::saturating_add)
    }
}

impl fmt::Display for ProfileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "# control table match key_width entries actions action_width sram_bits tcam_bits"
        )?;
        for t in &self.tables {
            writeln!(
                f,
                "{} {} {} {} {} {} {} {} {}",
                t.control,
                t.table,
                t.match_kind,
                t.key_width,
                t.entries,
                t.actions,
                t.action_width,
                t.sram_bits,
                t.tcam_bits
            )?;
        }
        writeln!(f, "total_tables {}", self.tables.len())?;
        writeln!(f, "total_sram_bits {}", self.sram_bits())?;
        writeln!(f, "total_tcam_bits {}", self.tcam_bits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::tests::{Fixture, ROUTER};

    #[test]
    fn profiles_router() {
        let fx = Fixture::new(ROUTER);
        let report = ProfileReport::profile(&fx.build().unwrap());
        assert_eq!(report.tables.len(), 3);

        let lpm = &report.tables[0];
        assert_eq!(lpm.match_kind, MatchKind::Lpm);
        assert_eq!(lpm.key_width, 32);
        assert_eq!(lpm.entries, 1024);
        assert_eq!(lpm.sram_bits, 1024 * (32 + 42));
        assert_eq!(lpm.tcam_bits, 0);

        let text = report.to_string();
        assert!(text.contains("ingress forward exact 32 512 2 49 "));
        assert!(text.contains("total_tables 3\n"));
    }

    #[test]
    fn empty_report() {
        let text = ProfileReport::default().to_string();
        assert!(text.contains("total_tables 0\n"));
        assert!(text.ends_with("total_tcam_bits 0\n"));
    }
}
