//! Block-replace merge for the seeder aggregator
//!
//! The managed block lives inside `run()` of a PHP seeder class:
//!
//! ```php
//! public function run(): void
//! {
//!     // <ggen:seeders>
//!     $this->call([
//!         UserSeeder::class,
//!         PostSeeder::class,
//!     ]);
//!     // </ggen:seeders>
//! }
//! ```
//!
//! Files written before markers existed are adopted: generated
//! `$this->call(...)` statements are dropped and any other statement in the
//! body is kept, re-indented beneath the new managed block.

use super::document::{TextDocument, indent_of};
use super::region::{ManagedRegion, OwnedStatement};
use crate::error::{ReconcileError, Result};
use crate::ordering::DependencyEntity;

pub const SEEDER_START_MARKER: &str = "// <ggen:seeders>";
pub const SEEDER_END_MARKER: &str = "// </ggen:seeders>";

const RUN_SIGNATURE: &str = "function run(";

#[derive(Debug, Clone)]
pub struct SeederLayout {
    pub namespace: String,
    pub class_name: String,
    pub indent_unit: String,
    region: ManagedRegion,
}

impl Default for SeederLayout {
    fn default() -> Self {
        Self {
            namespace: "Database\\Seeders".to_string(),
            class_name: "DatabaseSeeder".to_string(),
            indent_unit: "    ".to_string(),
            region: ManagedRegion::new(SEEDER_START_MARKER, SEEDER_END_MARKER)
                .with_owned_statement(OwnedStatement::new("$this->call(", ";")),
        }
    }
}

/// Line positions of a function body's braces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FunctionBody {
    signature: usize,
    open: usize,
    close: usize,
}

impl SeederLayout {
    pub fn region(&self) -> &ManagedRegion {
        &self.region
    }

    /// Unindented lines of the managed block, entities in the given order
    pub fn render_block(&self, entities: &[DependencyEntity]) -> Vec<String> {
        if entities.is_empty() {
            return Vec::new();
        }
        let mut lines = Vec::with_capacity(entities.len() + 2);
        lines.push("$this->call([".to_string());
        for entity in entities {
            lines.push(format!("{}{}::class,", self.indent_unit, entity.name));
        }
        lines.push("]);".to_string());
        lines
    }

    /// Minimal seeder class carrying the managed block
    pub fn skeleton(&self, entities: &[DependencyEntity]) -> String {
        let unit = &self.indent_unit;
        let body_indent = format!("{unit}{unit}");
        let mut lines = vec![
            "<?php".to_string(),
            String::new(),
            format!("namespace {};", self.namespace),
            String::new(),
            "use Illuminate\\Database\\Seeder;".to_string(),
            String::new(),
            format!("class {} extends Seeder", self.class_name),
            "{".to_string(),
            format!("{unit}/**"),
            format!("{unit} * Seed the application's database."),
            format!("{unit} */"),
            format!("{unit}public function run(): void"),
            format!("{unit}{{"),
        ];
        lines.extend(self.region.render(&body_indent, &self.render_block(entities)));
        lines.push(format!("{unit}}}"));
        lines.push("}".to_string());
        lines.push(String::new());
        lines.join("\n")
    }

    /// Merge `entities` (already ordered) into the aggregator file.
    ///
    /// Returns `None` when the file already carries exactly this block.
    pub fn merge(
        &self,
        file: &str,
        existing: Option<&str>,
        entities: &[DependencyEntity],
    ) -> Result<Option<String>> {
        let Some(existing) = existing else {
            return Ok(Some(self.skeleton(entities)));
        };

        let block = self.render_block(entities);
        let mut doc = TextDocument::parse(existing);

        if self.region.replace_region(&mut doc, &block).is_none() {
            self.adopt(file, &mut doc, &block)?;
        }

        let merged = doc.render();
        if merged == existing {
            Ok(None)
        } else {
            Ok(Some(merged))
        }
    }

    /// Rebuild an unmarked `run()` body around the managed block
    fn adopt(&self, file: &str, doc: &mut TextDocument, block: &[String]) -> Result<()> {
        let body = find_function_body(doc, RUN_SIGNATURE).ok_or_else(|| {
            ReconcileError::AnchorNotFound {
                file: file.to_string(),
                anchor: RUN_SIGNATURE.to_string(),
            }
        })?;

        let fn_indent = indent_of(doc.line(body.signature)).to_string();
        let body_indent = format!("{}{}", fn_indent, self.indent_unit);

        let mut new_body = self.region.render(&body_indent, block);

        if body.open == body.close {
            // `{}` on one line: split it open around the new body
            let line = doc.line(body.open).to_string();
            let Some(brace) = line.find('{') else {
                return Err(ReconcileError::AnchorNotFound {
                    file: file.to_string(),
                    anchor: RUN_SIGNATURE.to_string(),
                });
            };
            let head = line[..=brace].to_string();
            let tail = line[brace + 1..].trim_start().to_string();
            let mut replacement = vec![head];
            replacement.append(&mut new_body);
            replacement.push(format!("{}{}", fn_indent, tail));
            doc.splice(body.open..body.open + 1, &replacement);
            tracing::debug!(file, "expanded empty run() body for managed block");
            return Ok(());
        }

        let current: Vec<&str> = (body.open + 1..body.close).map(|idx| doc.line(idx)).collect();
        let custom = reindent(&trim_blank_edges(self.region.strip_owned(&current)), &body_indent);
        if !custom.is_empty() {
            new_body.push(String::new());
            new_body.extend(custom);
        }

        tracing::debug!(
            file,
            body_lines = current.len(),
            "adopting unmarked run() body into managed block"
        );
        doc.splice(body.open + 1..body.close, &new_body);
        Ok(())
    }
}

fn find_function_body(doc: &TextDocument, signature: &str) -> Option<FunctionBody> {
    let sig_line = (0..doc.len()).find(|&idx| doc.line(idx).contains(signature))?;

    let mut depth = 0usize;
    let mut open = None;
    for idx in sig_line..doc.len() {
        let line = doc.line(idx);
        let start = if idx == sig_line {
            line.find(signature).unwrap_or(0)
        } else {
            0
        };
        for ch in line[start..].chars() {
            match ch {
                '{' => {
                    if open.is_none() {
                        open = Some(idx);
                    }
                    depth += 1;
                }
                '}' if open.is_some() => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(FunctionBody {
                            signature: sig_line,
                            open: open?,
                            close: idx,
                        });
                    }
                }
                ';' if open.is_none() => return None,
                _ => {}
            }
        }
    }
    None
}

fn trim_blank_edges<'a>(lines: Vec<&'a str>) -> Vec<&'a str> {
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    match (start, end) {
        (Some(start), Some(end)) => lines[start..=end].to_vec(),
        _ => Vec::new(),
    }
}

/// Shift lines so their shallowest line sits at `indent`
fn reindent(lines: &[&str], indent: &str) -> Vec<String> {
    let min = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| indent_of(l).len())
        .min()
        .unwrap_or(0);

    lines
        .iter()
        .map(|line| {
            if line.trim().is_empty() {
                String::new()
            } else {
                let cut = min.min(indent_of(line).len());
                format!("{}{}", indent, &line[cut..])
            }
        })
        .collect()
}
