// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Fragment extraction
//!
//! Turns a parsed resource into a tree of module bodies: the top-level module
//! plus one body per fragment, each with its own requests, import and export
//! entries, and a scope table of the fragment names visible to it.
//!
//! Fragments declared at statement level are importable by name from their
//! parent body (and, if exported, from other resources). Fragments found
//! anywhere else, such as inside a function or as an anonymous `module { }`
//! expression, are inline values and can only be imported dynamically.

use crate::error::ExtractError;
use crate::key::inline_segment;
use rustc_hash::FxHashMap;
use spacey_syntax::{
    CodeBlock, ExportKind, ImportBinding, ModuleDeclaration, ModuleSpecifier, ParsedModule, Span,
    Statement,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// How a fragment can be reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentForm {
    /// Declared at statement level; importable by name
    TopLevelImportable,
    /// Declared inside other code; a module value, importable only dynamically
    InlineValue,
}

/// What an import binds to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImportName {
    /// A single named export
    Name(String),
    /// The module namespace object
    Namespace,
}

/// `import { import_name as local_name } from request`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEntry {
    /// Module the binding comes from
    pub request: ModuleSpecifier,
    /// Export or namespace being imported
    pub import_name: ImportName,
    /// Binding name inside this module
    pub local_name: String,
}

/// An export of a binding declared in this module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalExport {
    /// Name visible to importers
    pub export_name: String,
    /// Binding name inside this module
    pub local_name: String,
}

/// A re-export of something another module provides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndirectExport {
    /// Name visible to importers
    pub export_name: String,
    /// Module providing the binding
    pub request: ModuleSpecifier,
    /// Export or namespace being re-exported
    pub import_name: ImportName,
}

/// Fragment names declared at statement level of one body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LexicalScope {
    fragments: BTreeMap<String, Vec<String>>,
}

impl LexicalScope {
    /// Path (from the resource root) of the fragment bound to `name`
    pub fn lookup(&self, name: &str) -> Option<&[String]> {
        self.fragments.get(name).map(Vec::as_slice)
    }

    /// Names bound in this scope, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fragments.keys().map(String::as_str)
    }

    /// Whether no fragments are declared
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    fn bind(&mut self, name: &str, path: Vec<String>) -> bool {
        self.fragments.insert(name.to_string(), path).is_none()
    }
}

/// One module body: the top-level module or a fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleBody {
    /// Distinct module requests in source order
    pub requests: Vec<ModuleSpecifier>,
    /// Import bindings
    pub imports: Vec<ImportEntry>,
    /// Exports of local bindings
    pub local_exports: Vec<LocalExport>,
    /// Named re-exports
    pub indirect_exports: Vec<IndirectExport>,
    /// `export * from` requests
    pub star_exports: Vec<ModuleSpecifier>,
    /// Fragments visible to this body by name
    pub scope: LexicalScope,
    /// Source of every statement that is not an import or a fragment declaration
    pub residual: String,
}

impl ModuleBody {
    /// Index of `request` in [`requests`](Self::requests)
    pub fn request_index(&self, request: &ModuleSpecifier) -> Option<usize> {
        self.requests.iter().position(|r| r == request)
    }

    /// Local binding names that are exported
    pub fn exported_locals(&self) -> impl Iterator<Item = &str> {
        self.local_exports.iter().map(|e| e.local_name.as_str())
    }
}

/// A fragment lifted out of its host resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentDeclaration {
    /// Declared name; `None` for anonymous module blocks
    pub name: Option<String>,
    /// Path from the resource root; the last segment is the name or `%n`
    pub path: Vec<String>,
    /// Declared with `export`
    pub exported: bool,
    /// Nesting depth; fragments directly in the resource are at depth 1
    pub depth: usize,
    /// Statement-level or inline
    pub form: FragmentForm,
    /// The fragment's own module body
    pub body: Arc<ModuleBody>,
    /// Span of the declaration in the resource
    pub span: Span,
}

/// Result of extracting one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedModule {
    /// The top-level module body
    pub root: Arc<ModuleBody>,
    /// Every fragment of the resource, parents before children
    pub fragments: Vec<Arc<FragmentDeclaration>>,
    index: FxHashMap<Vec<String>, usize>,
}

impl ExtractedModule {
    fn new(root: Arc<ModuleBody>, fragments: Vec<Arc<FragmentDeclaration>>) -> Self {
        let index = fragments
            .iter()
            .enumerate()
            .map(|(i, fragment)| (fragment.path.clone(), i))
            .collect();
        Self {
            root,
            fragments,
            index,
        }
    }

    /// The fragment at `path`
    pub fn fragment(&self, path: &[String]) -> Option<&Arc<FragmentDeclaration>> {
        self.index.get(path).map(|&i| &self.fragments[i])
    }

    /// The body at `path`; the empty path is the top-level module
    pub fn body(&self, path: &[String]) -> Option<&Arc<ModuleBody>> {
        if path.is_empty() {
            Some(&self.root)
        } else {
            self.fragment(path).map(|fragment| &fragment.body)
        }
    }
}

/// Extract the fragment tree of a parsed resource.
///
/// Fails on duplicate statement-level fragment names or duplicate export
/// names within a body. Never loads anything.
pub fn extract(parsed: &ParsedModule) -> Result<ExtractedModule, ExtractError> {
    let mut extractor = Extractor {
        source: &parsed.source,
        fragments: Vec::new(),
    };
    let root = extractor.body(&parsed.body, &[], 0)?;
    Ok(ExtractedModule::new(root, extractor.fragments))
}

struct Extractor<'a> {
    source: &'a str,
    fragments: Vec<Arc<FragmentDeclaration>>,
}

impl Extractor<'_> {
    fn body(
        &mut self,
        statements: &[Statement],
        path: &[String],
        depth: usize,
    ) -> Result<Arc<ModuleBody>, ExtractError> {
        let mut body = ModuleBody::default();

        for statement in statements {
            if let Statement::Module(ModuleDeclaration { name: Some(name), .. }) = statement {
                if !body.scope.bind(name, child_path(path, name)) {
                    return Err(ExtractError::DuplicateFragmentName {
                        name: name.clone(),
                        scope: describe(path),
                    });
                }
            }
        }

        let mut residual = Vec::new();
        let mut inline_ordinal = 0;

        for statement in statements {
            match statement {
                Statement::Import(import) => {
                    add_request(&mut body, &import.specifier);
                    for binding in &import.bindings {
                        let import_name = match binding {
                            ImportBinding::Default { .. } => ImportName::Name("default".into()),
                            ImportBinding::Named { imported, .. } => ImportName::Name(imported.clone()),
                            ImportBinding::Namespace { .. } => ImportName::Namespace,
                        };
                        body.imports.push(ImportEntry {
                            request: import.specifier.clone(),
                            import_name,
                            local_name: binding.local().to_string(),
                        });
                    }
                }
                Statement::Export(export) => match &export.kind {
                    ExportKind::Named {
                        specifiers,
                        from: None,
                    } => {
                        body.local_exports.extend(specifiers.iter().map(|s| LocalExport {
                            export_name: s.exported.clone(),
                            local_name: s.local.clone(),
                        }));
                    }
                    ExportKind::Named {
                        specifiers,
                        from: Some(from),
                    } => {
                        add_request(&mut body, from);
                        body.indirect_exports.extend(specifiers.iter().map(|s| IndirectExport {
                            export_name: s.exported.clone(),
                            request: from.clone(),
                            import_name: ImportName::Name(s.local.clone()),
                        }));
                    }
                    ExportKind::All { from, alias: None } => {
                        add_request(&mut body, from);
                        body.star_exports.push(from.clone());
                    }
                    ExportKind::All {
                        from,
                        alias: Some(alias),
                    } => {
                        add_request(&mut body, from);
                        body.indirect_exports.push(IndirectExport {
                            export_name: alias.clone(),
                            request: from.clone(),
                            import_name: ImportName::Namespace,
                        });
                    }
                    ExportKind::Declaration { names, code } => {
                        body.local_exports.extend(names.iter().map(|name| LocalExport {
                            export_name: name.clone(),
                            local_name: name.clone(),
                        }));
                        residual.push(code.span);
                        self.inline_modules(code, path, depth, &mut inline_ordinal)?;
                    }
                    ExportKind::Default { local, code } => {
                        body.local_exports.push(LocalExport {
                            export_name: "default".into(),
                            local_name: local.clone(),
                        });
                        residual.push(code.span);
                        self.inline_modules(code, path, depth, &mut inline_ordinal)?;
                    }
                },
                Statement::Module(declaration) => match &declaration.name {
                    Some(name) => {
                        let index = self.fragments.len();
                        let child = child_path(path, name);
                        let fragment_body = self.body(&declaration.body, &child, depth + 1)?;
                        self.fragments.insert(
                            index,
                            Arc::new(FragmentDeclaration {
                                name: Some(name.clone()),
                                path: child,
                                exported: declaration.exported,
                                depth: depth + 1,
                                form: FragmentForm::TopLevelImportable,
                                body: fragment_body,
                                span: declaration.span,
                            }),
                        );
                    }
                    None => {
                        self.inline_module(declaration, path, depth, &mut inline_ordinal)?;
                    }
                },
                Statement::Code(code) => {
                    residual.push(code.span);
                    self.inline_modules(code, path, depth, &mut inline_ordinal)?;
                }
            }
        }

        reexport_imports(&mut body);
        check_duplicate_exports(&body, path)?;

        body.residual = residual
            .iter()
            .map(|span| span.text(self.source))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(Arc::new(body))
    }

    fn inline_modules(
        &mut self,
        code: &CodeBlock,
        path: &[String],
        depth: usize,
        ordinal: &mut usize,
    ) -> Result<(), ExtractError> {
        for declaration in &code.inline_modules {
            self.inline_module(declaration, path, depth, ordinal)?;
        }
        Ok(())
    }

    fn inline_module(
        &mut self,
        declaration: &ModuleDeclaration,
        path: &[String],
        depth: usize,
        ordinal: &mut usize,
    ) -> Result<(), ExtractError> {
        let child = child_path(path, &inline_segment(*ordinal));
        *ordinal += 1;

        let index = self.fragments.len();
        let fragment_body = self.body(&declaration.body, &child, depth + 1)?;
        self.fragments.insert(
            index,
            Arc::new(FragmentDeclaration {
                name: declaration.name.clone(),
                path: child,
                exported: false,
                depth: depth + 1,
                form: FragmentForm::InlineValue,
                body: fragment_body,
                span: declaration.span,
            }),
        );
        Ok(())
    }
}

fn child_path(path: &[String], segment: &str) -> Vec<String> {
    let mut child = path.to_vec();
    child.push(segment.to_string());
    child
}

fn add_request(body: &mut ModuleBody, specifier: &ModuleSpecifier) {
    if !body.requests.contains(specifier) {
        body.requests.push(specifier.clone());
    }
}

/// `import { a } from "m"; export { a }` re-exports `m`'s binding rather than
/// exporting a local one.
fn reexport_imports(body: &mut ModuleBody) {
    let imports: FxHashMap<&str, &ImportEntry> = body
        .imports
        .iter()
        .map(|entry| (entry.local_name.as_str(), entry))
        .collect();

    let mut local_exports = Vec::with_capacity(body.local_exports.len());
    let mut indirect = Vec::new();
    for export in body.local_exports.drain(..) {
        match imports.get(export.local_name.as_str()) {
            Some(import) => indirect.push(IndirectExport {
                export_name: export.export_name,
                request: import.request.clone(),
                import_name: import.import_name.clone(),
            }),
            None => local_exports.push(export),
        }
    }

    body.local_exports = local_exports;
    body.indirect_exports.extend(indirect);
}

fn check_duplicate_exports(body: &ModuleBody, path: &[String]) -> Result<(), ExtractError> {
    let mut seen = HashSet::new();
    let names = body
        .local_exports
        .iter()
        .map(|e| &e.export_name)
        .chain(body.indirect_exports.iter().map(|e| &e.export_name));
    for name in names {
        if !seen.insert(name) {
            return Err(ExtractError::DuplicateExport {
                name: name.clone(),
                scope: describe(path),
            });
        }
    }
    Ok(())
}

fn describe(path: &[String]) -> String {
    if path.is_empty() {
        "the top-level module".to_string()
    } else {
        format!("fragment {}", path.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spacey_syntax::parse_module;

    fn extract_source(source: &str) -> Result<ExtractedModule, ExtractError> {
        extract(&parse_module(source).expect("should parse"))
    }

    fn path(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_top_level_fragments() {
        let extracted = extract_source(
            r#"
            module countBlock {
                let i = 0;
                export function count() { return ++i; }
            }
            export module uppercaseBlock {
                export function uppercase(s) { return s.toUpperCase(); }
            }
            import { count } from countBlock;
            console.log(count());
            "#,
        )
        .unwrap();

        assert_eq!(extracted.fragments.len(), 2);
        let count = extracted.fragment(&path(&["countBlock"])).unwrap();
        assert!(!count.exported);
        assert_eq!(count.depth, 1);
        assert_eq!(count.form, FragmentForm::TopLevelImportable);
        assert_eq!(count.body.local_exports[0].export_name, "count");

        let upper = extracted.fragment(&path(&["uppercaseBlock"])).unwrap();
        assert!(upper.exported);

        let root = &extracted.root;
        assert_eq!(root.scope.lookup("countBlock"), Some(&path(&["countBlock"])[..]));
        assert_eq!(root.requests, vec![ModuleSpecifier::Fragment("countBlock".into())]);
        assert!(root.residual.contains("console.log(count());"));
        assert!(!root.residual.contains("module countBlock"));
        assert!(!root.residual.contains("import"));
    }

    #[test]
    fn test_scope_is_per_body() {
        let extracted = extract_source(
            r#"
            module a {
                module inner {}
            }
            module b {}
            "#,
        )
        .unwrap();

        let a = extracted.fragment(&path(&["a"])).unwrap();
        assert_eq!(a.body.scope.names().collect::<Vec<_>>(), vec!["inner"]);
        assert_eq!(extracted.root.scope.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(extracted.root.scope.lookup("inner").is_none());

        let inner = extracted.fragment(&path(&["a", "inner"])).unwrap();
        assert_eq!(inner.depth, 2);

        // parents come before their children
        let order: Vec<String> = extracted.fragments.iter().map(|f| f.path.join("/")).collect();
        assert_eq!(order, vec!["a", "a/inner", "b"]);
    }

    #[test]
    fn test_inline_fragments() {
        let extracted = extract_source(
            r#"
            function spawn() {
                module worker { export const id = 1; }
                return module { module nested {} };
            }
            export const later = module { };
            "#,
        )
        .unwrap();

        let worker = extracted.fragment(&path(&["%0"])).unwrap();
        assert_eq!(worker.name.as_deref(), Some("worker"));
        assert_eq!(worker.form, FragmentForm::InlineValue);
        assert!(!worker.exported);

        let anonymous = extracted.fragment(&path(&["%1"])).unwrap();
        assert_eq!(anonymous.name, None);

        // statement-level inside an inline module is importable within it
        let nested = extracted.fragment(&path(&["%1", "nested"])).unwrap();
        assert_eq!(nested.form, FragmentForm::TopLevelImportable);
        assert_eq!(nested.depth, 2);

        assert!(extracted.fragment(&path(&["%2"])).is_some());
        assert!(extracted.root.scope.is_empty());
    }

    #[test]
    fn test_duplicate_fragment_names() {
        let err = extract_source("module a {}\nmodule a {}").unwrap_err();
        assert!(matches!(err, ExtractError::DuplicateFragmentName { ref name, .. } if name == "a"));

        // siblings at different levels may share a name
        assert!(extract_source("module a { module a {} }").is_ok());

        let nested = extract_source("module outer { module x {} module x {} }").unwrap_err();
        assert!(matches!(nested, ExtractError::DuplicateFragmentName { ref scope, .. } if scope.contains("outer")));
    }

    #[test]
    fn test_export_entries() {
        let extracted = extract_source(
            r#"
            import { a } from "./a.js";
            import * as ns from "./ns.js";
            export { a, ns as space };
            export { b as c } from "./b.js";
            export * from "./star.js";
            export * as all from "./all.js";
            export default 42;
            export let x = 1;
            "#,
        )
        .unwrap();

        let root = &extracted.root;
        assert_eq!(root.requests.len(), 5);
        assert_eq!(
            root.local_exports,
            vec![
                LocalExport {
                    export_name: "default".into(),
                    local_name: "*default*".into()
                },
                LocalExport {
                    export_name: "x".into(),
                    local_name: "x".into()
                },
            ]
        );

        let names: Vec<(&str, &ImportName)> = root
            .indirect_exports
            .iter()
            .map(|e| (e.export_name.as_str(), &e.import_name))
            .collect();
        assert!(names.contains(&("c", &ImportName::Name("b".into()))));
        assert!(names.contains(&("all", &ImportName::Namespace)));
        assert!(names.contains(&("a", &ImportName::Name("a".into()))));
        assert!(names.contains(&("space", &ImportName::Namespace)));
        assert_eq!(root.star_exports, vec![ModuleSpecifier::Url("./star.js".into())]);
    }

    #[test]
    fn test_duplicate_exports() {
        let err = extract_source("export const a = 1;\nexport { a };").unwrap_err();
        assert!(matches!(err, ExtractError::DuplicateExport { .. }));
    }
}
