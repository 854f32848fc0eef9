//! Structured documentation parsing.
//!
//! Capabilities may carry rustdoc-style documentation:
//!
//! ```text
//! Evaluate an arithmetic expression.
//!
//! # Arguments
//!
//! * `expression` - The expression to evaluate,
//!   for example `2 + 2`.
//!
//! # Returns
//!
//! The numeric result.
//! ```
//!
//! [`DocInfo::parse`] extracts the description paragraph, per-argument
//! descriptions and the returns section.

use std::collections::HashMap;

/// Error raised for malformed documentation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum DocParseError {
    /// An argument entry opened a backtick without closing it.
    #[error("line {line}: unterminated parameter name")]
    UnterminatedName {
        /// One-based line number.
        line: usize,
    },
    /// An argument entry has an empty parameter name.
    #[error("line {line}: empty parameter name")]
    EmptyName {
        /// One-based line number.
        line: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum DocSection {
    #[default]
    Description,
    Arguments,
    Returns,
    Other,
}

impl DocSection {
    fn detect(line: &str) -> Option<Self> {
        let heading = line.strip_prefix('#')?.trim_start_matches('#').trim();
        Some(match heading {
            "Arguments" | "Args" | "Parameters" => Self::Arguments,
            "Returns" | "Return" => Self::Returns,
            _ => Self::Other,
        })
    }
}

/// Parsed documentation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocInfo {
    /// Leading description, lines joined with spaces.
    pub description: String,
    /// Per-argument descriptions keyed by parameter name.
    pub params: HashMap<String, String>,
    /// Returns section, if any.
    pub returns: Option<String>,
}

impl DocInfo {
    /// Parse documentation text.
    ///
    /// # Errors
    ///
    /// Returns [`DocParseError`] if an argument entry is malformed.
    pub fn parse(doc: &str) -> Result<Self, DocParseError> {
        let mut info = Self::default();
        let mut section = DocSection::default();
        let mut current_param: Option<String> = None;
        let mut description_lines = Vec::new();

        for (idx, line) in doc.lines().enumerate() {
            let trimmed = line.trim();

            if let Some(next) = DocSection::detect(trimmed) {
                section = next;
                current_param = None;
                continue;
            }

            match section {
                DocSection::Description => {
                    if !trimmed.is_empty() {
                        description_lines.push(trimmed);
                    }
                }
                DocSection::Arguments => {
                    if let Some((name, desc)) = Self::parse_param_line(trimmed, idx + 1)? {
                        info.params.insert(name.clone(), desc);
                        current_param = Some(name);
                    } else if let Some(param) = &current_param
                        && !trimmed.is_empty()
                        && let Some(desc) = info.params.get_mut(param)
                    {
                        if !desc.is_empty() {
                            desc.push(' ');
                        }
                        desc.push_str(trimmed);
                    }
                }
                DocSection::Returns => {
                    if trimmed.is_empty() {
                        continue;
                    }
                    match &mut info.returns {
                        Some(ret) => {
                            ret.push(' ');
                            ret.push_str(trimmed);
                        }
                        None => info.returns = Some(trimmed.to_owned()),
                    }
                }
                DocSection::Other => {}
            }
        }

        info.description = description_lines.join(" ");
        Ok(info)
    }

    /// Description of `name`, if documented and non-empty.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(name)
            .map(String::as_str)
            .filter(|d| !d.is_empty())
    }

    /// Parse ``* `name` - description`` (also `-` bullets and `:` separators).
    fn parse_param_line(
        line: &str,
        line_no: usize,
    ) -> Result<Option<(String, String)>, DocParseError> {
        let Some(rest) = line
            .strip_prefix("* `")
            .or_else(|| line.strip_prefix("- `"))
        else {
            return Ok(None);
        };
        let end = rest
            .find('`')
            .ok_or(DocParseError::UnterminatedName { line: line_no })?;
        let name = rest[..end].trim();
        if name.is_empty() {
            return Err(DocParseError::EmptyName { line: line_no });
        }
        let desc = rest[end + 1..]
            .trim_start()
            .trim_start_matches(['-', ':'])
            .trim();
        Ok(Some((name.to_owned(), desc.to_owned())))
    }
}
