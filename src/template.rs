//! Fixed-placeholder template rendering
//!
//! Artifact generation substitutes named `{{ placeholder }}` markers from node
//! fields; nothing else. There is no expression language and no untrusted
//! input is concatenated outside a marker. A marker whose name is not in the
//! variable map fails the render, matching the strict behavior expected from
//! the artifact pipeline.

use std::collections::HashMap;

use regex::Regex;
use thiserror::Error;

/// Errors from rendering a template
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Unresolved placeholder: {0}")]
    UnresolvedPlaceholder(String),
}

fn placeholder_re() -> Regex {
    // compiled per render; templates here are small and rendered once per deploy
    Regex::new(r"\{\{\s*(\w+)\s*\}\}").unwrap()
}

/// Render `template`, substituting every `{{ name }}` marker from `vars`.
pub fn render(template: &str, vars: &HashMap<&str, String>) -> Result<String, TemplateError> {
    let re = placeholder_re();
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for caps in re.captures_iter(template) {
        let m = caps.get(0).unwrap();
        let name = caps.get(1).unwrap().as_str();
        let value = vars
            .get(name)
            .ok_or_else(|| TemplateError::UnresolvedPlaceholder(name.to_string()))?;
        out.push_str(&template[last..m.start()]);
        out.push_str(value);
        last = m.end();
    }
    out.push_str(&template[last..]);

    Ok(out)
}
