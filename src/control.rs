//! Debian control paragraphs: blank-line separated stanzas of
//! `Field: value` lines, continuations indented by a space or tab.
//! Field order is preserved so the status database round-trips.

use crate::error::{AResult, AeptError};
use std::fmt;
use std::io::BufRead;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Paragraph {
    fields: Vec<(String, String)>,
}

impl Paragraph {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(field))
            .map(|(_, value)| value.as_str())
    }

    /// First line of a multi-line value, e.g. the short description.
    pub fn get_line(&self, field: &str) -> Option<&str> {
        self.get(field).map(|v| v.lines().next().unwrap_or(""))
    }

    pub fn set(&mut self, field: &str, value: impl Into<String>) {
        let value = value.into();
        for (name, existing) in &mut self.fields {
            if name.eq_ignore_ascii_case(field) {
                *existing = value;
                return;
            }
        }
        self.fields.push((field.to_string(), value));
    }

    pub fn remove(&mut self, field: &str) {
        self.fields.retain(|(name, _)| !name.eq_ignore_ascii_case(field));
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn name(&self) -> AResult<&str> {
        self.get("Package")
            .ok_or_else(|| AeptError::MalformedControl("stanza without a Package field".into()))
    }
}

impl fmt::Display for Paragraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.fields {
            let mut lines = value.lines();
            writeln!(f, "{name}: {}", lines.next().unwrap_or(""))?;
            for cont in lines {
                writeln!(f, " {cont}")?;
            }
        }
        Ok(())
    }
}

/// Parse every paragraph out of a reader. Old packages carry oddly
/// capitalized field names; lookup is case-insensitive so they are kept
/// as written.
pub fn parse_paragraphs<R: BufRead>(reader: R) -> AResult<Vec<Paragraph>> {
    let mut out = Vec::new();
    let mut current = Paragraph::default();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            continue;
        }
        if line.starts_with([' ', '\t']) {
            match current.fields.last_mut() {
                Some((_, value)) => {
                    value.push('\n');
                    value.push_str(line.trim_start());
                }
                None => {
                    return Err(AeptError::MalformedControl(format!(
                        "continuation line with no field: '{line}'"
                    )))
                }
            }
            continue;
        }
        match line.split_once(':') {
            Some((name, value)) => {
                current.fields.push((name.trim().to_string(), value.trim().to_string()));
            }
            None => {
                return Err(AeptError::MalformedControl(format!("not a field line: '{line}'")))
            }
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    Ok(out)
}

pub fn parse_one(text: &str) -> AResult<Paragraph> {
    parse_paragraphs(text.as_bytes())?
        .into_iter()
        .next()
        .ok_or_else(|| AeptError::MalformedControl("empty control file".into()))
}
