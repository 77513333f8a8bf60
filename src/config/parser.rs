use std::collections::HashMap;
use std::path::Path;

use crate::errors::StoreError;
use tracing::debug;

/// Parse a Java-style `.properties` document.
///
/// Supports `#`/`!` comments, `=`, `:` or whitespace separators, backslash
/// line continuations and the usual escapes (`\t`, `\n`, `\uXXXX`, ...).
/// Later duplicates of a key win.
pub fn parse_properties(content: &str) -> Result<HashMap<String, String>, StoreError> {
    let mut properties = HashMap::new();
    let mut lines = content.lines().enumerate();

    while let Some((index, raw)) = lines.next() {
        let line = raw.trim_start();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }

        let mut logical = line.to_string();
        while ends_with_continuation(&logical) {
            logical.pop();
            match lines.next() {
                Some((_, next)) => logical.push_str(next.trim_start()),
                None => break,
            }
        }

        let (key, value) = split_entry(&logical);
        let key = unescape(key).map_err(|e| {
            StoreError::Config(format!("Invalid key on line {}: {}", index + 1, e))
        })?;
        let value = unescape(value).map_err(|e| {
            StoreError::Config(format!("Invalid value for '{}' on line {}: {}", key, index + 1, e))
        })?;
        properties.insert(key, value);
    }

    Ok(properties)
}

/// Read and parse a `.properties` file. A missing file is a configuration error.
pub fn parse_properties_file(path: &Path) -> Result<HashMap<String, String>, StoreError> {
    if !path.exists() {
        return Err(StoreError::Config(format!("Properties file not found: {}", path.display())));
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        StoreError::Config(format!("Unable to read {}: {}", path.display(), e))
    })?;
    let properties = parse_properties(&content)?;
    debug!(path = %path.display(), entries = properties.len(), "Loaded properties file");
    Ok(properties)
}

fn ends_with_continuation(line: &str) -> bool {
    let trailing = line.chars().rev().take_while(|c| *c == '\\').count();
    trailing % 2 == 1
}

fn split_entry(line: &str) -> (&str, &str) {
    let mut escaped = false;
    let mut key_end = line.len();
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' | ' ' | '\t' | '\x0c' => {
                key_end = i;
                break;
            }
            _ => {}
        }
    }

    let key = &line[..key_end];
    let mut rest = line[key_end..].trim_start_matches([' ', '\t', '\x0c']);
    if let Some(stripped) = rest.strip_prefix(['=', ':']) {
        rest = stripped.trim_start_matches([' ', '\t', '\x0c']);
    }
    (key, rest)
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
            Some('f') => out.push('\x0c'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let code = u32::from_str_radix(&hex, 16)
                    .map_err(|_| format!("malformed \\u escape '\\u{}'", hex))?;
                let decoded = char::from_u32(code)
                    .ok_or_else(|| format!("invalid code point {:#x}", code))?;
                out.push(decoded);
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    Ok(out)
}
