//! SQL-style `LIKE` pattern compilation.
//!
//! `%` matches any run of characters (including the empty run), `_`
//! matches exactly one character, and `\` escapes the following pattern
//! character — including `\` itself — so it's matched literally. The
//! compiled pattern is anchored: the whole value must match, not a
//! substring. Only strings can match a `Like`/`NotLike` operator; every
//! other JSON type fails without compiling anything.

use regex::Regex;

#[derive(Debug, thiserror::Error)]
pub enum LikeError {
    #[error("invalid LIKE pattern '{pattern}': {source}")]
    Invalid {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A `LIKE` pattern compiled once into an anchored regex for repeated
/// matching.
#[derive(Debug, Clone)]
pub struct CompiledLike {
    regex: Regex,
}

impl CompiledLike {
    pub fn compile(pattern: &str) -> Result<Self, LikeError> {
        let source = translate(pattern);
        let regex = Regex::new(&source).map_err(|source| LikeError::Invalid {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self { regex })
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

/// Translate a `LIKE` pattern into an anchored regex source string.
fn translate(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 2);
    out.push('^');
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => out.push_str(&regex::escape(&escaped.to_string())),
                None => out.push_str(&regex::escape("\\")),
            },
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}

/// Compile and match a pattern in one call. Prefer `CompiledLike::compile`
/// when the same pattern is evaluated against many values.
pub fn matches(value: &str, pattern: &str) -> Result<bool, LikeError> {
    Ok(CompiledLike::compile(pattern)?.is_match(value))
}
