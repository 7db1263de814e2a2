use p4fpga_backend::bsv::ArtifactKind;
use p4fpga_backend::{
    FpgaProgram, Options, TypeFactory, generate_partition,
    generate_table_profile, run_fpga_backend,
};
use p4fpga_ir::{
    Printer, ReferenceMap, ToplevelBlock, TypeMap, from_json::parse_toplevel,
};
use p4fpga_utils::ErrorKind;
use std::fs;
use std::path::Path;

const MINIMAL: &str = include_str!("fixtures/minimal.json");
const ROUTER: &str = include_str!("fixtures/router.json");

struct Input {
    top: ToplevelBlock,
    ref_map: ReferenceMap,
    type_map: TypeMap,
}

fn load(json: &str) -> Input {
    let top = parse_toplevel(json).unwrap();
    Input {
        ref_map: ReferenceMap::build(&top.program),
        type_map: TypeMap::build(&top.program),
        top,
    }
}

fn options(out: &Path) -> Options {
    Options::builder().file("switch.p4").output_dir(out).build()
}

fn file_count(dir: &Path) -> usize {
    fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

/// Type names declared by an artifact: struct, union and enum typedefs
/// and interfaces.
fn declared_type_names(text: &str) -> Vec<&str> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            if let Some(rest) = line.strip_prefix("interface ") {
                // Subinterfaces are `interface Type#(..) name;`.
                rest.strip_suffix(';').filter(|r| !r.contains(' '))
            } else if line.starts_with('}') || line.starts_with("typedef enum") {
                line.split("} ").nth(1).and_then(|r| r.split(' ').next())
            } else {
                None
            }
        })
        .collect()
}

/// Packages named by `import Pkg::*;` lines.
fn imports(text: &str) -> Vec<&str> {
    text.lines()
        .filter_map(|line| line.strip_prefix("import ")?.strip_suffix("::*;"))
        .collect()
}

/// Capitalized identifiers in type positions: struct and union members,
/// method return and parameter types.
fn referenced_type_names(text: &str) -> Vec<&str> {
    let mut types = vec![];
    for line in text.lines().map(str::trim) {
        if line.is_empty()
            || line.contains('=')
            || ["//", "import", "typedef", "}", "interface ", "end", "instance"]
                .iter()
                .any(|p| line.starts_with(p))
        {
            continue;
        }
        if let Some(rest) = line.strip_prefix("method ") {
            let (head, params) = rest.split_once('(').unwrap_or((rest, ""));
            types.extend(head.rsplit_once(' ').map(|(ret, _)| ret));
            let params = params.rsplit_once(')').map_or(params, |(p, _)| p);
            types.extend(
                params
                    .split(',')
                    .filter_map(|p| p.trim().rsplit_once(' ').map(|(ty, _)| ty)),
            );
        } else {
            types.extend(line.rsplit_once(' ').map(|(ty, _)| ty));
        }
    }
    types
        .into_iter()
        .flat_map(|ty| ty.split(|c: char| !c.is_alphanumeric() && c != '_'))
        .filter(|id| id.starts_with(|c: char| c.is_ascii_uppercase()))
        .collect()
}

fn all_kinds() -> Vec<ArtifactKind> {
    ArtifactKind::BSV
        .iter()
        .copied()
        .chain([ArtifactKind::Simulation])
        .collect()
}

#[test]
fn minimal_program_produces_every_artifact() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out");
    let input = load(MINIMAL);
    let summary = run_fpga_backend(
        &options(&out),
        Some(&input.top),
        &input.ref_map,
        &input.type_map,
    )
    .unwrap()
    .unwrap();
    assert!(summary.is_complete());
    assert_eq!(summary.written.len(), 9);
    for kind in all_kinds() {
        let text = fs::read_to_string(out.join(kind.file_name())).unwrap();
        assert!(!text.is_empty(), "{} is empty", kind);
    }

    let prof = generate_table_profile(
        &options(&out),
        &input.top,
        &input.ref_map,
        &input.type_map,
    )
    .unwrap();
    assert_eq!(prof, out.join("table.prof"));
    let report = fs::read_to_string(prof).unwrap();
    assert!(report.contains("total_tables 0\n"));
}

#[test]
fn missing_toplevel_is_a_no_op() {
    let tmp = tempfile::tempdir().unwrap();
    let input = load(MINIMAL);
    let res =
        run_fpga_backend(&options(tmp.path()), None, &input.ref_map, &input.type_map)
            .unwrap();
    assert!(res.is_none());
    assert_eq!(file_count(tmp.path()), 0);
}

#[test]
fn missing_main_writes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out");
    let mut input = load(ROUTER);
    input.top.main = None;
    let err = run_fpga_backend(
        &options(&out),
        Some(&input.top),
        &input.ref_map,
        &input.type_map,
    )
    .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::MissingEntryPoint(name) if *name == "main"));
    assert!(!out.exists());
}

#[test]
fn build_failure_writes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out");
    // A parser without a start state cannot be built.
    let input = load(&MINIMAL.replace("\"start\"", "\"begin\""));
    let err = run_fpga_backend(
        &options(&out),
        Some(&input.top),
        &input.ref_map,
        &input.type_map,
    )
    .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::ModelBuildFailure(_)));
    assert!(!out.exists());
}

#[test]
fn undeclared_parameter_types_write_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out");
    let input = load(&MINIMAL.replace(
        "\"name\": \"headers_t\" } } ]",
        "\"name\": \"hdrs_t\" } } ]",
    ));
    let err = run_fpga_backend(
        &options(&out),
        Some(&input.top),
        &input.ref_map,
        &input.type_map,
    )
    .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::ModelBuildFailure(_)));
    assert!(err.to_string().contains("hdrs_t"), "{}", err);
    assert!(!out.exists());
}

#[test]
fn missing_output_dir_is_an_error() {
    let input = load(MINIMAL);
    let opts = Options::builder().file("switch.p4").build();
    let err = run_fpga_backend(&opts, Some(&input.top), &input.ref_map, &input.type_map)
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::MissingOutputPath));
}

#[test]
fn output_dir_creation_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("nested").join("out");
    let input = load(ROUTER);
    for _ in 0..2 {
        let summary = run_fpga_backend(
            &options(&out),
            Some(&input.top),
            &input.ref_map,
            &input.type_map,
        )
        .unwrap()
        .unwrap();
        assert!(summary.is_complete());
    }
    assert_eq!(file_count(&out), 9);
}

#[test]
fn write_failures_do_not_stop_other_writes() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out");
    // A directory where an artifact should go makes that one write fail.
    fs::create_dir_all(out.join(ArtifactKind::Union.file_name())).unwrap();
    let input = load(ROUTER);
    let summary = run_fpga_backend(
        &options(&out),
        Some(&input.top),
        &input.ref_map,
        &input.type_map,
    )
    .unwrap()
    .unwrap();
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, out.join("UnionGenerated.bsv"));
    assert_eq!(summary.written.len(), 8);
}

#[test]
fn artifacts_only_use_model_type_names() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out");
    let input = load(ROUTER);
    run_fpga_backend(
        &options(&out),
        Some(&input.top),
        &input.ref_map,
        &input.type_map,
    )
    .unwrap()
    .unwrap();

    let tf = TypeFactory::new(&input.type_map);
    let main = input.top.get_main().unwrap();
    let program = FpgaProgram::build(
        &input.top.program,
        main,
        &input.ref_map,
        &input.type_map,
        &tf,
    )
    .unwrap();

    for kind in [
        ArtifactKind::Struct,
        ArtifactKind::Union,
        ArtifactKind::ApiDecl,
        ArtifactKind::ApiTypeDef,
    ] {
        let text = fs::read_to_string(out.join(kind.file_name())).unwrap();
        let names = declared_type_names(&text);
        assert!(!names.is_empty(), "{} declares nothing", kind);
        for name in names {
            assert!(
                program.types().contains(name),
                "{} declares `{}`, unknown to the model",
                kind,
                name
            );
        }
    }

    let builtin = [
        "Bit",
        "Int",
        "Bool",
        "Maybe",
        "PacketInstance",
        "Action",
        "ActionValue",
    ];
    for kind in [
        ArtifactKind::Struct,
        ArtifactKind::Union,
        ArtifactKind::ApiDecl,
        ArtifactKind::ApiTypeDef,
    ] {
        let text = fs::read_to_string(out.join(kind.file_name())).unwrap();
        let mut visible: Vec<String> = declared_type_names(&text)
            .into_iter()
            .map(String::from)
            .collect();
        for pkg in imports(&text) {
            // Library packages are not generated.
            if let Ok(dep) = fs::read_to_string(out.join(format!("{}.bsv", pkg))) {
                visible.extend(declared_type_names(&dep).into_iter().map(String::from));
            }
        }
        let used = referenced_type_names(&text);
        assert!(!used.is_empty(), "{} references nothing", kind);
        for name in used {
            assert!(
                builtin.contains(&name) || visible.iter().any(|v| v == name),
                "{} uses `{}` without declaring or importing it",
                kind,
                name
            );
        }
    }

    let api = fs::read_to_string(out.join("APIDeclGenerated.bsv")).unwrap();
    assert!(api.contains(
        "method Action ipv4_lpm_add_entry(Ipv4LpmReqT key, Ipv4LpmRspT value);"
    ));
    let union = fs::read_to_string(out.join("UnionGenerated.bsv")).unwrap();
    assert!(union.contains("IngressSetNhopParamT SetNhop;"));
    assert!(union.contains("void Drop;"));
}

#[test]
fn partition_names_are_deterministic() {
    let tmp = tempfile::tempdir().unwrap();
    let input = load(ROUTER);
    let opts = options(tmp.path());
    for _ in 0..2 {
        let path =
            generate_partition(&opts, &input.top.program, "2", &Printer).unwrap();
        assert_eq!(path, tmp.path().join("switch2.p4"));
    }
    let text = fs::read_to_string(tmp.path().join("switch2.p4")).unwrap();
    assert!(text.contains("ParserImpl"));
}
