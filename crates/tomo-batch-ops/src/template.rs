//! `{key}` placeholder expansion against a resolved configuration.

use std::collections::BTreeMap;

use thiserror::Error;
use tomo_batch_config::Configuration;

use crate::paths;

/// Derived key naming the directory of the current `file-name`.
pub const FILE_NAME_PARENT: &str = "file_name_parent";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unresolved placeholder '{{{name}}}' in '{template}'")]
    UnresolvedPlaceholder { name: String, template: String },

    #[error("malformed template '{template}' at byte {position}: {reason}")]
    MalformedTemplate {
        template: String,
        position: usize,
        reason: &'static str,
    },
}

/// Values visible to placeholders: configuration keys plus derived keys.
#[derive(Clone, Debug)]
pub struct TemplateContext<'a> {
    config: &'a Configuration,
    derived: BTreeMap<String, String>,
}

impl<'a> TemplateContext<'a> {
    /// Context for templates evaluated on behalf of `file_name`.
    pub fn new(config: &'a Configuration, file_name: &str) -> Self {
        let mut derived = BTreeMap::new();
        derived.insert(
            FILE_NAME_PARENT.to_string(),
            paths::file_name_parent(file_name),
        );
        TemplateContext { config, derived }
    }

    /// Add a derived key. Derived keys shadow configuration keys.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.derived.insert(name.into(), value.into());
        self
    }

    fn lookup(&self, name: &str) -> Option<String> {
        if let Some(value) = self.derived.get(name) {
            return Some(value.clone());
        }
        if let Some(value) = self.config.get(name) {
            return Some(value.to_string());
        }
        let dashed = name.replace('_', "-");
        self.config.get(&dashed).map(ToString::to_string)
    }

    /// Substitute every placeholder in one pass. Substituted text is never
    /// scanned again.
    pub fn expand(&self, template: &str) -> Result<String, TemplateError> {
        let malformed = |position, reason| TemplateError::MalformedTemplate {
            template: template.to_string(),
            position,
            reason,
        };

        let mut out = String::with_capacity(template.len());
        let mut chars = template.char_indices().peekable();
        while let Some((position, ch)) = chars.next() {
            match ch {
                '{' if matches!(chars.peek(), Some((_, '{'))) => {
                    chars.next();
                    out.push('{');
                }
                '}' if matches!(chars.peek(), Some((_, '}'))) => {
                    chars.next();
                    out.push('}');
                }
                '}' => return Err(malformed(position, "unmatched '}'")),
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, inner) in chars.by_ref() {
                        match inner {
                            '}' => {
                                closed = true;
                                break;
                            }
                            '{' => return Err(malformed(position, "nested '{'")),
                            other => name.push(other),
                        }
                    }
                    if !closed {
                        return Err(malformed(position, "unmatched '{'"));
                    }
                    let name = name.trim();
                    if name.is_empty() {
                        return Err(malformed(position, "empty placeholder"));
                    }
                    let value =
                        self.lookup(name)
                            .ok_or_else(|| TemplateError::UnresolvedPlaceholder {
                                name: name.to_string(),
                                template: template.to_string(),
                            })?;
                    out.push_str(&value);
                }
                other => out.push(other),
            }
        }
        Ok(out)
    }
}

/// Expand `template` for `file_name` against `config`.
pub fn expand(
    template: &str,
    config: &Configuration,
    file_name: &str,
) -> Result<String, TemplateError> {
    TemplateContext::new(config, file_name).expand(template)
}
