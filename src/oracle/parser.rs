//! Oracle response parsing
//!
//! Oracle responses are free text. The parser first tries the whole response
//! as JSON, then falls back to the first syntactically balanced `{...}` or
//! `[...]` block that parses, and finally validates the block against the
//! task schema.

use serde_json::Value;

use super::TaskSchema;
use crate::error::OracleError;

/// Single place where malformed oracle output is handled
pub struct ResponseParser;

impl ResponseParser {
    /// Parse and validate a response for task schema `T`
    pub fn parse<T: TaskSchema>(text: &str) -> Result<T, OracleError> {
        let value = Self::extract_value(text).ok_or_else(|| {
            OracleError::Unparsable(format!(
                "no structured block in {} response ({} chars)",
                T::TASK,
                text.len()
            ))
        })?;

        let parsed: T = serde_json::from_value(value).map_err(|e| OracleError::Schema {
            task: T::TASK.to_string(),
            reason: e.to_string(),
        })?;

        parsed.validate().map_err(|reason| OracleError::Schema {
            task: T::TASK.to_string(),
            reason,
        })?;

        Ok(parsed)
    }

    /// Recover a JSON value from free text
    pub fn extract_value(text: &str) -> Option<Value> {
        let trimmed = text.trim();
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            if value.is_object() || value.is_array() {
                return Some(value);
            }
        }

        let mut search_from = 0;
        while let Some(offset) = trimmed[search_from..].find(|c: char| c == '{' || c == '[') {
            let start = search_from + offset;
            if let Some(end) = Self::balanced_end(&trimmed[start..]) {
                let candidate = &trimmed[start..start + end];
                if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                    return Some(value);
                }
            }
            search_from = start + 1;
        }
        None
    }

    /// Byte length of the balanced block starting at `text[0]`, if it closes.
    ///
    /// Brackets inside string literals are ignored and backslash escapes are
    /// honored.
    fn balanced_end(text: &str) -> Option<usize> {
        let mut stack: Vec<char> = Vec::new();
        let mut in_string = false;
        let mut escaped = false;

        for (i, c) in text.char_indices() {
            if in_string {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    in_string = false;
                }
                continue;
            }

            match c {
                '"' => in_string = true,
                '{' => stack.push('}'),
                '[' => stack.push(']'),
                '}' | ']' => {
                    if stack.pop() != Some(c) {
                        return None;
                    }
                    if stack.is_empty() {
                        return Some(i + c.len_utf8());
                    }
                }
                _ => {}
            }
        }
        None
    }
}
