// Copyright 2026 The stella-post Authors. All rights reserved.
// Stella Post-Processing Suite - Input Files

//! Metadata from stella input files.
//!
//! stella reads Fortran namelists:
//!
//! ```text
//! &physics_flags
//!   nonlinear = .true.   ! turbulence run
//! /
//! &vmec_parameters
//!   vmec_filename = 'wout_w7x.nc'
//! /
//! ```
//!
//! Only two keys matter here, so the reader collects `key = value` pairs
//! per group and ignores everything else.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::error::{PostError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InputMetadata {
    pub vmec_filename: Option<String>,
    pub nonlinear: bool,
}

pub trait InputMetadataReader {
    fn read(&self, path: &Path) -> Result<InputMetadata>;
}

/// Namelist groups keyed by lowercase group name, then lowercase key.
pub type Namelists = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Clone, Copy, Default)]
pub struct NamelistReader;

impl InputMetadataReader for NamelistReader {
    fn read(&self, path: &Path) -> Result<InputMetadata> {
        let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PostError::NotFound(path.to_path_buf()),
            _ => PostError::io(path, e),
        })?;
        metadata_from_namelists(&parse_namelists(&text), path)
    }
}

pub fn metadata_from_namelists(groups: &Namelists, path: &Path) -> Result<InputMetadata> {
    let nonlinear = match lookup(groups, "nonlinear") {
        Some(raw) => parse_logical(raw).ok_or_else(|| PostError::InputFormat {
            path: path.to_path_buf(),
            reason: format!("nonlinear = {raw} is not a logical"),
        })?,
        None => false,
    };
    let vmec_filename = lookup(groups, "vmec_filename")
        .map(unquote)
        .filter(|name| !name.is_empty());
    Ok(InputMetadata {
        vmec_filename,
        nonlinear,
    })
}

/// First value of `key` in any group.
fn lookup<'a>(groups: &'a Namelists, key: &str) -> Option<&'a str> {
    groups
        .values()
        .find_map(|entries| entries.get(key))
        .map(String::as_str)
}

pub fn parse_namelists(text: &str) -> Namelists {
    let mut groups = Namelists::new();
    let mut current: Option<String> = None;

    for raw_line in text.lines() {
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let mut body = line;
        if let Some(rest) = body.strip_prefix('&') {
            let (name, tail) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            let name = name.to_ascii_lowercase();
            groups.entry(name.clone()).or_default();
            current = Some(name);
            body = tail.trim();
        }

        let Some(group) = current.clone() else {
            continue;
        };
        let closes = body.ends_with('/') && !in_quotes_at_end(body);
        let body = if closes { &body[..body.len() - 1] } else { body };

        let entries = groups.entry(group).or_default();
        for item in split_outside_quotes(body, ',') {
            if let Some((key, value)) = item.split_once('=') {
                entries.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }

        if closes {
            current = None;
        }
    }
    groups
}

fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    for (i, c) in line.char_indices() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), _) if c == q => quote = None,
            (None, '!') => return &line[..i],
            _ => {}
        }
    }
    line
}

fn in_quotes_at_end(text: &str) -> bool {
    let mut quote: Option<char> = None;
    for c in text.chars() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), _) if c == q => quote = None,
            _ => {}
        }
    }
    quote.is_some()
}

fn split_outside_quotes(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), _) if c == q => quote = None,
            (None, _) if c == sep => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn unquote(value: &str) -> String {
    value
        .trim()
        .trim_matches(|c| c == '\'' || c == '"')
        .trim()
        .to_string()
}

/// Fortran logical: `.true.`, `.t.`, `t`, `true` and their false forms.
pub fn parse_logical(value: &str) -> Option<bool> {
    let v = value.trim().trim_matches('.').to_ascii_lowercase();
    match v.as_str() {
        "true" | "t" => Some(true),
        "false" | "f" => Some(false),
        _ => None,
    }
}
