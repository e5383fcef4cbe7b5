//! Anchor-and-register merge for route tables
//!
//! Instead of fixed markers, a route file is edited at two anchors: the
//! import list (`use` lines) and the registration line for a controller.
//!
//! ## Components
//! - [`RouteRegistration`]: desired end state for one controller
//! - [`RouteSyntax`]: import / registration matching and rendering seam
//! - [`PhpRouteSyntax`]: line-pattern implementation for Laravel route files
//! - [`merge_route`]: the merge itself, a no-op when nothing differs

use super::document::{TextDocument, indent_of};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const ROUTE_FACADE: &str = "Illuminate\\Support\\Facades\\Route";

/// Namespace segments too generic to disambiguate an alias
const GENERIC_SEGMENTS: &[&str] = &["App", "Http", "Controllers"];

static IMPORT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*use\s+\\?([A-Za-z_][A-Za-z0-9_]*(?:\\[A-Za-z_][A-Za-z0-9_]*)*)(?:\s+as\s+([A-Za-z_][A-Za-z0-9_]*))?\s*;\s*$",
    )
    .expect("import pattern is valid")
});

// =============================================================================
// Type Definitions
// =============================================================================

/// One controller's desired registration in a route file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRegistration {
    /// Fully-qualified controller class, e.g. `App\Http\Controllers\Api\PostController`
    pub controller: String,
    /// Resource URI, e.g. `posts`
    pub uri: String,
    /// Explicit scope tag used first when an alias must be disambiguated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Access-control tags; non-empty wraps a new registration in a guard group
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub middleware: Vec<String>,
}

impl RouteRegistration {
    pub fn new(controller: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            controller: controller.into(),
            uri: uri.into(),
            scope: None,
            middleware: Vec::new(),
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_middleware<I, S>(mut self, middleware: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.middleware = middleware.into_iter().map(Into::into).collect();
        self
    }

    pub fn target(&self) -> &str {
        self.controller.trim_start_matches('\\')
    }
}

/// A parsed import line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportLine {
    pub line: usize,
    pub target: String,
    pub alias: Option<String>,
}

impl ImportLine {
    /// Name the import binds in the file
    pub fn local_name(&self) -> &str {
        self.alias
            .as_deref()
            .unwrap_or_else(|| base_name(&self.target))
    }
}

/// An existing registration found for an alias
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationMatch {
    pub line: usize,
    pub method: String,
    pub uri: String,
}

/// Matching strategy for a route file format
pub trait RouteSyntax {
    /// Content of a file that does not exist yet
    fn skeleton(&self) -> String;

    /// Make `target` importable and return its local alias
    fn ensure_import(&self, doc: &mut TextDocument, target: &str, scope: Option<&str>) -> String;

    fn find_registration(&self, doc: &TextDocument, alias: &str) -> Option<RegistrationMatch>;

    /// Whether a found registration already declares the desired target
    fn matches(&self, found: &RegistrationMatch, registration: &RouteRegistration) -> bool;

    /// The bare registration statement
    fn render_registration(&self, registration: &RouteRegistration, alias: &str) -> String;

    /// Lines appended for a new registration, guard block included
    fn render_block(&self, registration: &RouteRegistration, alias: &str) -> Vec<String>;
}

// =============================================================================
// Merge
// =============================================================================

/// Merge one registration into a route file.
///
/// Returns `None` when the existing content already has the desired end
/// state. A missing file always yields content.
pub fn merge_route<S: RouteSyntax + ?Sized>(
    syntax: &S,
    existing: Option<&str>,
    registration: &RouteRegistration,
) -> Option<String> {
    let original = existing.map(str::to_string).unwrap_or_else(|| syntax.skeleton());
    let mut doc = TextDocument::parse(&original);

    let alias = syntax.ensure_import(&mut doc, registration.target(), registration.scope.as_deref());

    match syntax.find_registration(&doc, &alias) {
        Some(found) if syntax.matches(&found, registration) => {}
        Some(found) => {
            let indent = indent_of(doc.line(found.line)).to_string();
            let replacement = format!("{}{}", indent, syntax.render_registration(registration, &alias));
            tracing::debug!(
                alias = %alias,
                from = %found.uri,
                to = %registration.uri,
                "replacing route registration in place"
            );
            doc.replace_line(found.line, &replacement);
        }
        None => {
            let at = doc.append_position();
            let mut lines = Vec::new();
            if doc.last_non_blank().is_some_and(|idx| idx + 1 == at) {
                lines.push(String::new());
            }
            lines.extend(syntax.render_block(registration, &alias));
            doc.insert_lines(at, &lines);
        }
    }

    let merged = doc.render();
    match existing {
        Some(existing) if existing == merged => None,
        _ => Some(merged),
    }
}

// =============================================================================
// PHP implementation
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct PhpRouteSyntax {
    pub indent_unit: Option<String>,
}

impl PhpRouteSyntax {
    pub fn new() -> Self {
        Self::default()
    }

    fn indent_unit(&self) -> &str {
        self.indent_unit.as_deref().unwrap_or("    ")
    }

    pub fn imports(&self, doc: &TextDocument) -> Vec<ImportLine> {
        doc.lines()
            .enumerate()
            .filter_map(|(line, text)| {
                let caps = IMPORT_LINE.captures(text)?;
                Some(ImportLine {
                    line,
                    target: caps[1].to_string(),
                    alias: caps.get(2).map(|m| m.as_str().to_string()),
                })
            })
            .collect()
    }

    fn render_import(&self, target: &str, alias: &str) -> String {
        if alias == base_name(target) {
            format!("use {};", target)
        } else {
            format!("use {} as {};", target, alias)
        }
    }

    /// Where a new import goes: after the last import, else after `<?php`
    fn import_position(&self, doc: &TextDocument, imports: &[ImportLine]) -> (usize, bool) {
        if let Some(last) = imports.last() {
            return (last.line + 1, false);
        }
        match (0..doc.len()).find(|&idx| doc.line(idx).trim_start().starts_with("<?php")) {
            Some(idx) => (idx + 1, true),
            None => (0, false),
        }
    }
}

impl RouteSyntax for PhpRouteSyntax {
    fn skeleton(&self) -> String {
        format!("<?php\n\nuse {};\n", ROUTE_FACADE)
    }

    fn ensure_import(&self, doc: &mut TextDocument, target: &str, scope: Option<&str>) -> String {
        let imports = self.imports(doc);

        if !imports.iter().any(|imp| imp.local_name() == "Route") {
            let (at, pad) = self.import_position(doc, &imports);
            let mut lines = Vec::new();
            if pad {
                lines.push(String::new());
            }
            lines.push(self.render_import(ROUTE_FACADE, "Route"));
            doc.insert_lines(at, &lines);
            return self.ensure_import(doc, target, scope);
        }

        if let Some(existing) = imports.iter().find(|imp| same_class(&imp.target, target)) {
            let local = existing.local_name();
            let collides = imports.iter().any(|other| {
                other.line != existing.line
                    && same_name(other.local_name(), local)
                    && !same_class(&other.target, target)
            });
            if !collides {
                return local.to_string();
            }

            let taken: Vec<&str> = imports
                .iter()
                .filter(|other| other.line != existing.line)
                .map(ImportLine::local_name)
                .collect();
            let alias = derive_alias(target, scope, &taken);
            let indent = indent_of(doc.line(existing.line)).to_string();
            tracing::debug!(
                controller = target,
                from = local,
                to = %alias,
                "rewriting colliding import alias"
            );
            doc.replace_line(
                existing.line,
                &format!("{}{}", indent, self.render_import(target, &alias)),
            );
            return alias;
        }

        let taken: Vec<&str> = imports.iter().map(ImportLine::local_name).collect();
        let base = base_name(target);
        let alias = if taken.iter().any(|t| same_name(t, base)) {
            derive_alias(target, scope, &taken)
        } else {
            base.to_string()
        };

        let (at, pad) = self.import_position(doc, &imports);
        let mut lines = Vec::new();
        if pad {
            lines.push(String::new());
        }
        lines.push(self.render_import(target, &alias));
        doc.insert_lines(at, &lines);
        alias
    }

    fn find_registration(&self, doc: &TextDocument, alias: &str) -> Option<RegistrationMatch> {
        let pattern = Regex::new(&format!(
            r#"Route::(\w+)\(\s*(?:'([^']*)'|"([^"]*)")\s*,\s*{}::class\s*\)\s*;"#,
            regex::escape(alias)
        ))
        .ok()?;

        doc.lines().enumerate().find_map(|(line, text)| {
            let caps = pattern.captures(text)?;
            let uri = caps.get(2).or_else(|| caps.get(3))?.as_str().to_string();
            Some(RegistrationMatch {
                line,
                method: caps[1].to_string(),
                uri,
            })
        })
    }

    fn matches(&self, found: &RegistrationMatch, registration: &RouteRegistration) -> bool {
        found.method == "apiResource" && found.uri == registration.uri
    }

    fn render_registration(&self, registration: &RouteRegistration, alias: &str) -> String {
        format!("Route::apiResource('{}', {}::class);", registration.uri, alias)
    }

    fn render_block(&self, registration: &RouteRegistration, alias: &str) -> Vec<String> {
        let line = self.render_registration(registration, alias);
        if registration.middleware.is_empty() {
            return vec![line];
        }
        let tags = registration
            .middleware
            .iter()
            .map(|tag| format!("'{}'", tag))
            .collect::<Vec<_>>()
            .join(", ");
        vec![
            format!("Route::middleware([{}])->group(function () {{", tags),
            format!("{}{}", self.indent_unit(), line),
            "});".to_string(),
        ]
    }
}

// =============================================================================
// Alias derivation
// =============================================================================

fn base_name(target: &str) -> &str {
    target.rsplit('\\').next().unwrap_or(target)
}

// PHP class names are case-insensitive
fn same_class(a: &str, b: &str) -> bool {
    a.trim_start_matches('\\')
        .eq_ignore_ascii_case(b.trim_start_matches('\\'))
}

fn same_name(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

fn studly(tag: &str) -> String {
    tag.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// First free alias among: scope tag, nearest specific namespace segment,
/// then a numeric suffix.
pub fn derive_alias(target: &str, scope: Option<&str>, taken: &[&str]) -> String {
    let base = base_name(target);
    let is_free = |candidate: &str| !taken.iter().any(|t| same_name(t, candidate));

    let mut hints = Vec::new();
    if let Some(scope) = scope {
        let tag = studly(scope);
        if !tag.is_empty() {
            hints.push(format!("{}{}", tag, base));
        }
    }
    let segments: Vec<&str> = target.trim_start_matches('\\').split('\\').collect();
    if let Some(segment) = segments
        .iter()
        .rev()
        .skip(1)
        .find(|seg| !GENERIC_SEGMENTS.contains(seg))
    {
        hints.push(format!("{}{}", segment, base));
    }

    if let Some(hint) = hints.into_iter().find(|hint| is_free(hint)) {
        return hint;
    }

    (2..)
        .map(|n| format!("{}{}", base, n))
        .find(|candidate| is_free(candidate))
        .unwrap_or_else(|| base.to_string())
}
