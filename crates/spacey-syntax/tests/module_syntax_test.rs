//! Module Syntax Integration Tests
//!
//! Parses complete modules that mix fragments, imports and ordinary code.

use spacey_syntax::{
    DeclarationPosition, ExportKind, ImportBinding, ModuleSpecifier, Statement, parse_module,
};

const APP: &str = r#"
module countBlock {
  let i = 0;

  export function count() {
    i++;
    return i;
  }
}

export module uppercaseBlock {
  export function uppercase(string) {
    return string.toUpperCase();
  }
}

import { count } from countBlock;
import { uppercase } from uppercaseBlock;

console.log(count()); // 1
console.log(uppercase("daniel")); // "DANIEL"
"#;

#[test]
fn test_app_module_structure() {
    let module = parse_module(APP).expect("app should parse");

    let kinds: Vec<&str> = module
        .body
        .iter()
        .map(|s| match s {
            Statement::Import(_) => "import",
            Statement::Export(_) => "export",
            Statement::Module(_) => "module",
            Statement::Code(_) => "code",
        })
        .collect();
    assert_eq!(kinds, vec!["module", "module", "import", "import", "code", "code"]);

    let Statement::Import(import) = &module.body[2] else {
        panic!("expected import");
    };
    assert_eq!(import.specifier, ModuleSpecifier::Fragment("countBlock".into()));
    assert_eq!(
        import.bindings,
        vec![ImportBinding::Named {
            imported: "count".into(),
            local: "count".into()
        }]
    );
}

#[test]
fn test_fragment_body_text() {
    let module = parse_module(APP).unwrap();
    let Statement::Module(count_block) = &module.body[0] else {
        panic!("expected fragment");
    };

    let body = module.text(count_block.body_span);
    assert!(body.contains("let i = 0;"));
    assert!(!body.contains("module countBlock"));
    assert!(module.text(count_block.span).starts_with("module countBlock"));

    let Statement::Export(export) = &count_block.body[1] else {
        panic!("expected export");
    };
    assert!(matches!(&export.kind, ExportKind::Declaration { names, .. } if names == &vec!["count"]));
}

#[test]
fn test_deeply_nested_fragments() {
    let source = r#"
        export module outer {
            export module middle {
                export module inner {
                    export const depth = 3;
                }
            }
        }
    "#;
    let module = parse_module(source).unwrap();

    let Statement::Module(outer) = &module.body[0] else {
        panic!("expected outer");
    };
    let Statement::Module(middle) = &outer.body[0] else {
        panic!("expected middle");
    };
    let Statement::Module(inner) = &middle.body[0] else {
        panic!("expected inner");
    };

    assert_eq!(inner.name.as_deref(), Some("inner"));
    assert!(inner.exported);
    assert_eq!(inner.position, DeclarationPosition::Statement);
}

#[test]
fn test_braces_inside_literals() {
    let source = r#"
        module tricky {
            const s = "}";
            const t = `${"{"}}`;
            const r = /}/;
            // }
            /* } */
            export const ok = true;
        }
        export const after = 1;
    "#;
    let module = parse_module(source).unwrap();
    assert_eq!(module.body.len(), 2);
    assert!(matches!(module.body[1], Statement::Export(_)));
}

#[test]
fn test_unterminated_fragment_reports_location() {
    let err = parse_module("module a {\n  let x = 1;\n").unwrap_err();
    assert_eq!(err.line, 3);
    assert!(err.to_string().starts_with("SyntaxError:"));
}

#[test]
fn test_assignments_and_star_forms() {
    let source = r#"
        import * as ns from "./ns.js";
        export * from "./all.js";
        export * as util from "./util.js";
        export const a = 1, b = a * 2;
        let total = 0;
        total += b ** 2;
        function* gen() { yield total; }
    "#;
    let module = parse_module(source).expect("module should parse");

    let Statement::Import(import) = &module.body[0] else {
        panic!("expected import");
    };
    assert_eq!(import.bindings, vec![ImportBinding::Namespace { local: "ns".into() }]);
    assert!(matches!(
        &module.body[1],
        Statement::Export(e) if matches!(&e.kind, ExportKind::All { alias: None, .. })
    ));
    assert!(matches!(
        &module.body[2],
        Statement::Export(e) if matches!(&e.kind, ExportKind::All { alias: Some(alias), .. } if alias == "util")
    ));
    assert!(matches!(
        &module.body[3],
        Statement::Export(e) if matches!(&e.kind, ExportKind::Declaration { names, .. } if names == &vec!["a", "b"])
    ));
}
