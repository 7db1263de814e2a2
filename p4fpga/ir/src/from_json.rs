use crate::{ToplevelBlock, TypeMap};
use p4fpga_utils::{Error, FpgaResult};
use std::path::Path;

/// Parse an elaborated program from its JSON form. The declared types must
/// form a closed, acyclic universe.
pub fn parse_toplevel(json: &str) -> FpgaResult<ToplevelBlock> {
    let toplevel: ToplevelBlock = serde_json::from_str(json)?;
    TypeMap::build(&toplevel.program).validate()?;
    Ok(toplevel)
}

/// Read and parse the elaborated program stored in `path`.
pub fn load_toplevel(path: &Path) -> FpgaResult<ToplevelBlock> {
    let json = std::fs::read_to_string(path).map_err(|err| {
        Error::invalid_file(format!("{}: {}", path.display(), err))
    })?;
    let toplevel = parse_toplevel(&json).map_err(|err| {
        err.with_post_msg(Some(format!("while reading {}", path.display())))
    })?;
    log::info!(
        "Loaded `{}`: {} types, {} parsers, {} controls, {} deparsers",
        path.display(),
        toplevel.program.types.len(),
        toplevel.program.parsers.len(),
        toplevel.program.controls.len(),
        toplevel.program.deparsers.len(),
    );
    Ok(toplevel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Expr, MatchKind, Stmt, Transition, Type};
    use p4fpga_utils::ErrorKind;

    const ROUTER: &str = r#"{
        "program": {
            "types": [
                { "name": "ethernet_t", "kind": "header", "fields": [
                    { "name": "dstAddr", "type": { "kind": "bits", "width": 48 } },
                    { "name": "etherType", "type": { "kind": "bits", "width": 16 } }
                ] },
                { "name": "headers_t", "kind": "struct", "fields": [
                    { "name": "ethernet", "type": { "kind": "named", "name": "ethernet_t" } }
                ] }
            ],
            "parsers": [ { "name": "ParserImpl",
                "params": [ { "name": "hdr", "type": { "kind": "named", "name": "headers_t" } } ],
                "states": [
                    { "name": "start", "extracts": ["hdr.ethernet"],
                      "transition": { "kind": "select", "keys": ["hdr.ethernet.etherType"],
                        "cases": [ { "value": 2048, "next": "accept" }, { "next": "reject" } ] } }
                ] } ],
            "controls": [ { "name": "ingress",
                "params": [ { "name": "hdr", "type": { "kind": "named", "name": "headers_t" } } ],
                "tables": [ { "name": "dmac",
                    "keys": [ { "field": "hdr.ethernet.dstAddr", "match_kind": "exact" } ],
                    "actions": ["NoAction"] } ],
                "apply": [ { "kind": "if",
                    "cond": { "kind": "is_valid", "path": "hdr.ethernet" },
                    "then": [ { "kind": "apply", "table": "dmac" } ] } ] } ]
        },
        "main": { "parser": "ParserImpl", "pipeline": ["ingress"] }
    }"#;

    #[test]
    fn parses_router() {
        let top = parse_toplevel(ROUTER).unwrap();
        let main = top.get_main().unwrap();
        assert_eq!(main.package, "V1Switch");
        assert_eq!(main.deparser, None);
        let parser = top.program.parser(main.parser).unwrap();
        match &parser.states[0].transition {
            Transition::Select { keys, cases } => {
                assert_eq!(keys[0].to_string(), "hdr.ethernet.etherType");
                assert!(cases[1].is_default());
            }
            t => panic!("unexpected transition {:?}", t),
        }
        let ingress = top.program.control(main.pipeline[0]).unwrap();
        assert_eq!(
            ingress.tables[0].keys[0].match_kind,
            MatchKind::Exact
        );
        assert!(matches!(
            &ingress.apply[0],
            Stmt::If { cond: Expr::IsValid { .. }, otherwise, .. } if otherwise.is_empty()
        ));
        assert_eq!(
            top.program.types[1].fields[0].ty,
            Type::named("ethernet_t")
        );
    }

    #[test]
    fn missing_main_is_not_a_parse_error() {
        let top = parse_toplevel(r#"{ "program": {} }"#).unwrap();
        assert!(top.get_main().is_none());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(parse_toplevel(r#"{ "program": { "types": 3 } }"#).is_err());
    }

    #[test]
    fn rejects_open_type_universe() {
        let json = r#"{ "program": { "types": [
            { "name": "h_t", "kind": "header", "fields": [
                { "name": "f", "type": { "kind": "named", "name": "typo_t" } } ] } ] } }"#;
        let err = parse_toplevel(json).unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::Undefined { name, .. } if *name == "typo_t"
        ));
    }
}
