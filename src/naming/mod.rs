// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Template-driven filename generation
//!
//! The active template always has the shape `{{Date}}-<fragment>-{{OriginalName}}`.
//! Only the fragment is user editable; it may contain literal text and the
//! `{{Service}}` placeholder (any minijinja expression over the three fields works).

use minijinja::{context, Environment, UndefinedBehavior};
use std::path::Path;
use std::sync::RwLock;
use tracing::debug;

use crate::ai::ReceiptInfo;
use crate::{ReceiptError, Result};

/// Fragment used when none is configured
pub const DEFAULT_FRAGMENT: &str = "{{Service}}";

const TEMPLATE_PREFIX: &str = "{{Date}}-";
const TEMPLATE_SUFFIX: &str = "-{{OriginalName}}";

/// A parsed and trial-rendered naming template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    fragment: String,
    source: String,
}

impl Template {
    /// Build the full template around `fragment` and check that it executes
    fn compile(env: &Environment<'static>, fragment: &str) -> Result<Self> {
        let fragment = if fragment.trim().is_empty() {
            DEFAULT_FRAGMENT
        } else {
            fragment
        };
        let source = build_full_template(fragment);

        env.template_from_str(&source)?;

        // Unknown placeholders only surface at render time in strict mode
        let sample = env.render_str(
            &source,
            context! { Date => "20250101", Service => "Service", OriginalName => "original" },
        )?;
        if sample.contains(['/', '\\']) {
            return Err(ReceiptError::Template(format!(
                "template produces a path separator: {}",
                sample
            )));
        }

        Ok(Self {
            fragment: fragment.to_string(),
            source,
        })
    }

    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Deterministic filename generator with an atomically replaceable template
pub struct Namer {
    env: Environment<'static>,
    active: RwLock<Template>,
}

impl Namer {
    /// Create a namer for the given fragment
    pub fn new(fragment: &str) -> Result<Self> {
        let env = naming_environment();
        let template = Template::compile(&env, fragment)?;
        Ok(Self {
            env,
            active: RwLock::new(template),
        })
    }

    fn lock_err() -> ReceiptError {
        ReceiptError::Config("Template lock poisoned".to_string())
    }

    /// Snapshot of the active template
    pub fn template(&self) -> Result<Template> {
        self.active
            .read()
            .map(|t| t.clone())
            .map_err(|_| Self::lock_err())
    }

    /// Compute the new filename for `original_name` from extracted receipt info.
    ///
    /// The original extension is re-appended unchanged, case included.
    pub fn generate(&self, original_name: &str, info: &ReceiptInfo) -> Result<String> {
        let (stem, ext) = split_extension(original_name);
        let service = sanitize_service(&info.service);

        let rendered = {
            let template = self.active.read().map_err(|_| Self::lock_err())?;
            self.env.render_str(
                template.source(),
                context! { Date => &info.date, Service => service, OriginalName => stem },
            )?
        };

        if rendered.contains(['/', '\\']) {
            return Err(ReceiptError::Template(format!(
                "generated name contains a path separator: {}",
                rendered
            )));
        }

        Ok(format!("{}{}", rendered, ext))
    }

    /// Replace the active template, or leave it untouched if `fragment` is invalid
    pub fn update_template(&self, fragment: &str) -> Result<()> {
        let template = Template::compile(&self.env, fragment)?;
        debug!("Template updated: {}", template.source());
        *self.active.write().map_err(|_| Self::lock_err())? = template;
        Ok(())
    }
}

fn naming_environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env
}

/// `{{Date}}-<fragment>-{{OriginalName}}`
pub fn build_full_template(fragment: &str) -> String {
    format!("{}{}{}", TEMPLATE_PREFIX, fragment, TEMPLATE_SUFFIX)
}

/// Check a fragment without touching any namer
pub fn validate_fragment(fragment: &str) -> Result<()> {
    Template::compile(&naming_environment(), fragment).map(|_| ())
}

/// Split `name` into stem and extension (extension keeps its leading dot)
pub fn split_extension(name: &str) -> (&str, &str) {
    match Path::new(name).extension().and_then(|e| e.to_str()) {
        Some(ext) => {
            let cut = name.len() - ext.len() - 1;
            (&name[..cut], &name[cut..])
        }
        None => (name, ""),
    }
}

/// Make a service name safe for use inside a filename
pub fn sanitize_service(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_whitespace = false;

    for c in raw.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                out.push('-');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;

        match c {
            '/' | '\\' | ':' => out.push('-'),
            '*' | '?' | '"' | '<' | '>' | '|' => {}
            _ => out.push(c),
        }
    }

    // Collapse consecutive hyphens
    let mut collapsed = String::with_capacity(out.len());
    for c in out.chars() {
        if c == '-' && collapsed.ends_with('-') {
            continue;
        }
        collapsed.push(c);
    }

    collapsed.trim_matches('-').to_string()
}
