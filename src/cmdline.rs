//! Command line parsing for the P4FPGA compiler.
use argh::FromArgs;
use p4fpga_backend::Options;
use std::path::PathBuf;

#[derive(FromArgs, Debug)]
#[argh(help_triggers("-h", "--help"))]
/// Compile an elaborated P4 program into Bluespec
pub struct Opts {
    /// elaborated program, as JSON
    #[argh(positional)]
    pub file: PathBuf,

    /// directory the generated files are written to
    #[argh(option, short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// original source file; names partition files (defaults to <file>)
    #[argh(option)]
    pub source: Option<PathBuf>,

    /// also write a resource profile of the match tables
    #[argh(switch)]
    pub profile: bool,

    /// also print the program as partition <idx> of the source
    #[argh(option)]
    pub partition: Option<String>,

    /// logging level
    #[argh(option, long = "log", default = "log::LevelFilter::Warn")]
    pub log_level: log::LevelFilter,
}

impl Opts {
    pub fn get_opts() -> Self {
        argh::from_env()
    }

    /// Configuration handed to the backend.
    pub fn backend_options(&self) -> Options {
        Options::builder()
            .file(self.source.clone().unwrap_or_else(|| self.file.clone()))
            .maybe_output_dir(self.output.clone())
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn parse(args: &[&str]) -> Opts {
        Opts::from_args(&["p4fpga"], args).unwrap()
    }

    #[test]
    fn defaults() {
        let opts = parse(&["switch.json"]);
        assert_eq!(opts.log_level, log::LevelFilter::Warn);
        assert!(!opts.profile);
        let options = opts.backend_options();
        assert_eq!(options.file, Path::new("switch.json"));
        assert!(options.output_dir().is_err());
    }

    #[test]
    fn source_names_partitions() {
        let opts = parse(&[
            "switch.json",
            "-o",
            "out",
            "--source",
            "switch.p4",
            "--partition",
            "1",
            "--profile",
            "--log",
            "info",
        ]);
        assert_eq!(opts.partition.as_deref(), Some("1"));
        assert_eq!(opts.log_level, log::LevelFilter::Info);
        let options = opts.backend_options();
        assert_eq!(options.file, Path::new("switch.p4"));
        assert_eq!(options.output_dir().unwrap(), Path::new("out"));
    }
}
