//! Output artifacts of the backend.
//!
//! Every artifact is a [CodeBuilder]: an append-only text buffer tagged with
//! the [ArtifactKind] it produces. [BsvProgram] owns the eight Bluespec
//! artifacts and [CppProgram] the software simulation model; the program
//! model fills all of them in one pass and the driver then writes each one
//! to its fixed file name.
mod code_builder;

pub use code_builder::CodeBuilder;

/// The artifacts produced by one backend run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Parser,
    Deparser,
    Struct,
    Control,
    Union,
    ApiDef,
    ApiDecl,
    ApiTypeDef,
    Simulation,
}

impl ArtifactKind {
    /// The Bluespec artifacts, in the order the driver writes them.
    pub const BSV: [ArtifactKind; 8] = [
        ArtifactKind::Parser,
        ArtifactKind::Deparser,
        ArtifactKind::Struct,
        ArtifactKind::Control,
        ArtifactKind::Union,
        ArtifactKind::ApiDef,
        ArtifactKind::ApiDecl,
        ArtifactKind::ApiTypeDef,
    ];

    /// Fixed output file name of this artifact.
    pub fn file_name(&self) -> &'static str {
        match self {
            ArtifactKind::Parser => "ParserGenerated.bsv",
            ArtifactKind::Deparser => "DeparserGenerated.bsv",
            ArtifactKind::Struct => "StructGenerated.bsv",
            ArtifactKind::Control => "ControlGenerated.bsv",
            ArtifactKind::Union => "UnionGenerated.bsv",
            ArtifactKind::ApiDef => "APIDefGenerated.bsv",
            ArtifactKind::ApiDecl => "APIDeclGenerated.bsv",
            ArtifactKind::ApiTypeDef => "APITypeDefGenerated.bsv",
            ArtifactKind::Simulation => "matchtable_model.cpp",
        }
    }

    /// Packages (or headers, for the simulation model) the artifact
    /// depends on.
    fn imports(&self) -> &'static [&'static str] {
        match self {
            ArtifactKind::Parser => &[
                "DefaultValue",
                "FIFOF",
                "GetPut",
                "StructGenerated",
            ],
            ArtifactKind::Deparser => &[
                "DefaultValue",
                "FIFOF",
                "GetPut",
                "StructGenerated",
            ],
            ArtifactKind::Struct => &["DefaultValue", "Ethernet"],
            ArtifactKind::Control => &[
                "ClientServer",
                "Connectable",
                "FIFOF",
                "GetPut",
                "MatchTable",
                "Pipe",
                "Vector",
                "StructGenerated",
                "UnionGenerated",
                "APITypeDefGenerated",
            ],
            ArtifactKind::Union => &["APITypeDefGenerated"],
            ArtifactKind::ApiDef => &["APIDeclGenerated", "ControlGenerated"],
            ArtifactKind::ApiDecl => &["APITypeDefGenerated", "UnionGenerated"],
            ArtifactKind::ApiTypeDef => &["StructGenerated"],
            ArtifactKind::Simulation => &["cstdint", "cstring", "map", "vector"],
        }
    }

    pub fn is_bsv(&self) -> bool {
        !matches!(self, ArtifactKind::Simulation)
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.file_name())
    }
}

/// The Bluespec half of the output.
#[derive(Debug)]
pub struct BsvProgram {
    builders: Vec<CodeBuilder>,
}

impl Default for BsvProgram {
    fn default() -> Self {
        Self::new()
    }
}

impl BsvProgram {
    pub fn new() -> Self {
        BsvProgram {
            builders: ArtifactKind::BSV.iter().map(|k| CodeBuilder::new(*k)).collect(),
        }
    }

    /// The builder for `kind`. Panics for the simulation artifact, which
    /// lives in [CppProgram].
    pub fn builder(&mut self, kind: ArtifactKind) -> &mut CodeBuilder {
        self.builders
            .iter_mut()
            .find(|b| b.kind() == kind)
            .unwrap_or_else(|| panic!("{} is not a Bluespec artifact", kind))
    }

    pub fn parser_builder(&mut self) -> &mut CodeBuilder {
        self.builder(ArtifactKind::Parser)
    }
    pub fn deparser_builder(&mut self) -> &mut CodeBuilder {
        self.builder(ArtifactKind::Deparser)
    }
    pub fn struct_builder(&mut self) -> &mut CodeBuilder {
        self.builder(ArtifactKind::Struct)
    }
    pub fn control_builder(&mut self) -> &mut CodeBuilder {
        self.builder(ArtifactKind::Control)
    }
    pub fn union_builder(&mut self) -> &mut CodeBuilder {
        self.builder(ArtifactKind::Union)
    }
    pub fn api_def_builder(&mut self) -> &mut CodeBuilder {
        self.builder(ArtifactKind::ApiDef)
    }
    pub fn api_decl_builder(&mut self) -> &mut CodeBuilder {
        self.builder(ArtifactKind::ApiDecl)
    }
    pub fn api_type_def_builder(&mut self) -> &mut CodeBuilder {
        self.builder(ArtifactKind::ApiTypeDef)
    }

    pub fn builders(&self) -> impl Iterator<Item = &CodeBuilder> {
        self.builders.iter()
    }
}

/// The software half of the output.
#[derive(Debug)]
pub struct CppProgram {
    sim: CodeBuilder,
}

impl Default for CppProgram {
    fn default() -> Self {
        Self::new()
    }
}

impl CppProgram {
    pub fn new() -> Self {
        CppProgram {
            sim: CodeBuilder::new(ArtifactKind::Simulation),
        }
    }

    pub fn sim_builder(&mut self) -> &mut CodeBuilder {
        &mut self.sim
    }

    pub fn builders(&self) -> impl Iterator<Item = &CodeBuilder> {
        std::iter::once(&self.sim)
    }
}

/// `ethernet_t` -> `EthernetT`, `ipv4_lpm` -> `Ipv4Lpm`.
pub fn camel_case(name: &str) -> String {
    name.split(['_', '.', '$'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}
