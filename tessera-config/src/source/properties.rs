//! Java-style `.properties` content
//!
//! Supported syntax: `key=value`, `key: value` and `key value` entries,
//! `#` and `!` comment lines, backslash line continuation and the usual
//! escapes (`\t`, `\n`, `\r`, `\uXXXX`, escaped separators). A key that
//! appears more than once keeps its last value.

use super::map::tree_from_pairs;
use super::PropertySource;
use crate::error::SourceError;
use crate::tree::PropertyTree;
use async_trait::async_trait;
use std::path::PathBuf;

/// Parse properties text into ordered key-value pairs
pub fn parse_properties(content: &str) -> Result<Vec<(String, String)>, String> {
    let mut entries: Vec<(String, String)> = Vec::new();
    for (line_number, line) in logical_lines(content) {
        let (key, value) = split_entry(&line);
        let key = unescape(key).map_err(|e| format!("line {}: {}", line_number, e))?;
        let value = unescape(value).map_err(|e| format!("line {}: {}", line_number, e))?;
        match entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => entries.push((key, value)),
        }
    }
    Ok(entries)
}

/// Join continued lines and drop blanks and comments
fn logical_lines(content: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut pending: Option<(usize, String)> = None;

    for (index, raw) in content.lines().enumerate() {
        let trimmed = raw.trim_start();
        let (start, mut current) = match pending.take() {
            Some((start, so_far)) => (start, so_far),
            None => {
                if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
                    continue;
                }
                (index + 1, String::new())
            }
        };

        let trailing = trimmed.chars().rev().take_while(|c| *c == '\\').count();
        if trailing % 2 == 1 {
            current.push_str(&trimmed[..trimmed.len() - 1]);
            pending = Some((start, current));
        } else {
            current.push_str(trimmed);
            out.push((start, current));
        }
    }
    if let Some(last) = pending {
        out.push(last);
    }
    out
}

/// Split on the first unescaped `=`, `:` or whitespace
fn split_entry(line: &str) -> (&str, &str) {
    let mut escaped = false;
    for (index, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => return (&line[..index], line[index + 1..].trim_start()),
            c if c.is_whitespace() => {
                let rest = line[index..].trim_start();
                let rest = rest
                    .strip_prefix('=')
                    .or_else(|| rest.strip_prefix(':'))
                    .unwrap_or(rest);
                return (&line[..index], rest.trim_start());
            }
            _ => {}
        }
    }
    (line, "")
}

fn unescape(raw: &str) -> Result<String, String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{c}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let code = u32::from_str_radix(&hex, 16)
                    .ok()
                    .filter(|_| hex.len() == 4)
                    .and_then(char::from_u32)
                    .ok_or_else(|| format!("malformed \\u escape '\\u{}'", hex))?;
                out.push(code);
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    Ok(out)
}

#[derive(Debug, Clone)]
enum Origin {
    Inline(String),
    File(PathBuf),
}

/// Properties text given inline or read from a file at load time
#[derive(Debug, Clone)]
pub struct PropertiesSource {
    name: String,
    origin: Origin,
    key_delimiter: Option<char>,
    value_delimiter: Option<char>,
}

impl PropertiesSource {
    pub fn inline(
        content: impl Into<String>,
        key_delimiter: Option<char>,
        value_delimiter: Option<char>,
    ) -> Self {
        Self {
            name: "properties".to_string(),
            origin: Origin::Inline(content.into()),
            key_delimiter,
            value_delimiter,
        }
    }

    pub fn file(path: impl Into<PathBuf>, key_delimiter: Option<char>, value_delimiter: Option<char>) -> Self {
        let path = path.into();
        Self {
            name: format!("properties file {}", path.display()),
            origin: Origin::File(path),
            key_delimiter,
            value_delimiter,
        }
    }
}

#[async_trait]
impl PropertySource for PropertiesSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<PropertyTree, SourceError> {
        let content = match &self.origin {
            Origin::Inline(content) => content.clone(),
            Origin::File(path) => {
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| SourceError::Io {
                        path: path.clone(),
                        message: e.to_string(),
                    })?
            }
        };
        let entries = parse_properties(&content).map_err(|message| SourceError::Parse {
            source_name: self.name.clone(),
            message,
        })?;
        Ok(tree_from_pairs(entries, self.key_delimiter, self.value_delimiter))
    }
}
