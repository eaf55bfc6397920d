//! Variable substitution in descriptor values.
//!
//! Supported forms: `$NAME`, `${NAME}`, `${NAME:-default}` (unset or empty),
//! `${NAME-default}` (unset only), `${NAME:?message}` / `${NAME?message}`
//! (error when missing) and `$$` for a literal `$`.

use crate::error::{DescriptorError, Result};
use log::warn;
use serde_yaml::Value;

/// Substitutes variables in a single string using `lookup`.
pub fn interpolate<F>(input: &str, lookup: &F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        match chars.peek().copied() {
            Some((_, '$')) => {
                chars.next();
                out.push('$');
            }
            Some((start, '{')) => {
                chars.next();
                let body_start = start + 1;
                let mut end = None;
                for (idx, ch) in chars.by_ref() {
                    if ch == '}' {
                        end = Some(idx);
                        break;
                    }
                }
                let end = end.ok_or_else(|| {
                    DescriptorError::Interpolation(format!("unterminated '${{' in '{}'", input))
                })?;
                out.push_str(&expand_braced(&input[body_start..end], lookup)?);
            }
            Some((start, ch)) if ch == '_' || ch.is_ascii_alphabetic() => {
                let mut end = input.len();
                while let Some(&(idx, ch)) = chars.peek() {
                    if ch == '_' || ch.is_ascii_alphanumeric() {
                        chars.next();
                    } else {
                        end = idx;
                        break;
                    }
                }
                let name = &input[start..end];
                out.push_str(&resolve_or_empty(name, lookup));
            }
            _ => out.push('$'),
        }
    }

    Ok(out)
}

/// Walks a parsed YAML document and interpolates every string scalar.
///
/// Mapping keys are left untouched.
pub fn interpolate_value<F>(value: &mut Value, lookup: &F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        Value::String(s) => {
            *s = interpolate(s, lookup)?;
        }
        Value::Sequence(items) => {
            for item in items {
                interpolate_value(item, lookup)?;
            }
        }
        Value::Mapping(map) => {
            for (_, item) in map.iter_mut() {
                interpolate_value(item, lookup)?;
            }
        }
        Value::Tagged(tagged) => interpolate_value(&mut tagged.value, lookup)?,
        _ => {}
    }
    Ok(())
}

fn expand_braced<F>(body: &str, lookup: &F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let name_len = body
        .find(|c: char| !(c == '_' || c.is_ascii_alphanumeric()))
        .unwrap_or(body.len());
    let name = &body[..name_len];
    if name.is_empty() {
        return Err(DescriptorError::Interpolation(format!(
            "empty variable name in '${{{}}}'",
            body
        )));
    }

    let modifier = &body[name_len..];
    let value = lookup(name);

    if modifier.is_empty() {
        return Ok(resolve_or_empty(name, lookup));
    }
    if let Some(default) = modifier.strip_prefix(":-") {
        return Ok(match value {
            Some(v) if !v.is_empty() => v,
            _ => interpolate(default, lookup)?,
        });
    }
    if let Some(default) = modifier.strip_prefix('-') {
        return Ok(match value {
            Some(v) => v,
            None => interpolate(default, lookup)?,
        });
    }
    if let Some(message) = modifier.strip_prefix(":?") {
        return match value {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(DescriptorError::MissingVariable {
                name: name.to_string(),
                message: message.to_string(),
            }),
        };
    }
    if let Some(message) = modifier.strip_prefix('?') {
        return value.ok_or_else(|| DescriptorError::MissingVariable {
            name: name.to_string(),
            message: message.to_string(),
        });
    }

    Err(DescriptorError::Interpolation(format!(
        "unsupported modifier in '${{{}}}'",
        body
    )))
}

fn resolve_or_empty<F>(name: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).unwrap_or_else(|| {
        warn!(
            "Descriptor: variable '{}' is not set. Defaulting to a blank string.",
            name
        );
        String::new()
    })
}
