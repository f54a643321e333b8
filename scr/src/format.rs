//! Format templates and the variable scope they are rendered against.
//!
//! Templates follow the familiar `{name}` / `{name:spec}` placeholder
//! syntax with `{{` and `}}` as escapes. Backslash escapes (`\n`, `\t`,
//! `\x41`, `é`, ...) are resolved when a template is parsed from an
//! option value.

use crate::errors::{ConfigurationError, FormatError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A value bound in a [`Scope`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Text value.
    Str(String),
    /// Integer value (indices, chain ids).
    Int(i64),
    /// Raw bytes, used for downloaded content.
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns the value as text, replacing invalid UTF-8.
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            Self::Int(i) => i.to_string(),
            Self::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

/// Variables available to a template.
///
/// The scope is filled progressively as a chain advances through its
/// stages, so later templates see more keys than earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    values: HashMap<String, Value>,
}

impl Scope {
    /// Creates an empty scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a value, replacing any previous binding.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    /// Binds a value if present.
    pub fn insert_opt<V: Into<Value>>(&mut self, name: impl Into<String>, value: Option<V>) {
        if let Some(v) = value {
            self.insert(name, v);
        }
    }

    /// Looks up a value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Returns whether `name` is bound.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Iterates over bound names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Copies every binding of `other` into this scope.
    pub fn extend(&mut self, other: &Self) {
        for (k, v) in &other.values {
            self.values.insert(k.clone(), v.clone());
        }
    }

    /// Converts to a JSON object, used for script bindings and events.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.values).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
    Center,
    AfterSign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Any,
    Str,
    Decimal,
    Hex,
}

/// Parsed `[[fill]align][sign][0][width][.precision][type]` spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Spec {
    fill: Option<char>,
    align: Option<Align>,
    zero: bool,
    width: usize,
    precision: Option<usize>,
    kind: Kind,
}

impl Spec {
    const EMPTY: Self = Self {
        fill: None,
        align: None,
        zero: false,
        width: 0,
        precision: None,
        kind: Kind::Any,
    };

    fn parse(spec: &str) -> Result<Self, String> {
        let chars: Vec<char> = spec.chars().collect();
        let mut out = Self::EMPTY;
        let mut i = 0;
        let align_of = |c: char| match c {
            '<' => Some(Align::Left),
            '>' => Some(Align::Right),
            '^' => Some(Align::Center),
            '=' => Some(Align::AfterSign),
            _ => None,
        };
        if chars.len() >= 2 {
            if let Some(a) = align_of(chars[1]) {
                out.fill = Some(chars[0]);
                out.align = Some(a);
                i = 2;
            }
        }
        if out.align.is_none() {
            if let Some(a) = chars.first().copied().and_then(align_of) {
                out.align = Some(a);
                i = 1;
            }
        }
        if matches!(chars.get(i), Some('+' | '-' | ' ')) {
            i += 1;
        }
        if chars.get(i) == Some(&'0') {
            out.zero = true;
            i += 1;
        }
        let start = i;
        while chars.get(i).is_some_and(char::is_ascii_digit) {
            i += 1;
        }
        if i > start {
            out.width = chars[start..i].iter().collect::<String>().parse().map_err(|_| {
                format!("invalid width in format spec '{spec}'")
            })?;
        }
        if chars.get(i) == Some(&'.') {
            i += 1;
            let start = i;
            while chars.get(i).is_some_and(char::is_ascii_digit) {
                i += 1;
            }
            if i == start {
                return Err(format!("format spec '{spec}' is missing a precision"));
            }
            out.precision = chars[start..i].iter().collect::<String>().parse().ok();
        }
        out.kind = match chars.get(i) {
            None => Kind::Any,
            Some('s') => Kind::Str,
            Some('d') => Kind::Decimal,
            Some('x') => Kind::Hex,
            Some(c) => return Err(format!("unknown format code '{c}' in format spec '{spec}'")),
        };
        if i + usize::from(out.kind != Kind::Any) != chars.len() {
            return Err(format!("invalid format spec '{spec}'"));
        }
        Ok(out)
    }

    fn apply(&self, value: &Value, placeholder: &str, template: &str) -> Result<String, FormatError> {
        let (mut body, numeric) = match (value, self.kind) {
            (Value::Int(i), Kind::Hex) => (format!("{i:x}"), true),
            (Value::Int(i), _) => (i.to_string(), true),
            (_, Kind::Decimal | Kind::Hex) => {
                return Err(FormatError::new(placeholder, template));
            }
            (v, _) => (v.as_text(), false),
        };
        if !numeric {
            if let Some(p) = self.precision {
                body = body.chars().take(p).collect();
            }
        }
        let len = body.chars().count();
        if len >= self.width {
            return Ok(body);
        }
        let pad = self.width - len;
        let fill = self.fill.unwrap_or(if self.zero { '0' } else { ' ' });
        let align = self.align.unwrap_or(match (numeric, self.zero) {
            (true, true) => Align::AfterSign,
            (true, false) => Align::Right,
            (false, _) => Align::Left,
        });
        let padding = |n: usize| std::iter::repeat(fill).take(n).collect::<String>();
        Ok(match align {
            Align::Left => body + &padding(pad),
            Align::Right => padding(pad) + &body,
            Align::Center => {
                let left = pad / 2;
                padding(left) + &body + &padding(pad - left)
            }
            Align::AfterSign => match body.strip_prefix('-') {
                Some(digits) => format!("-{}{digits}", padding(pad)),
                None => padding(pad) + &body,
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Field { name: String, spec: Spec },
}

/// A parsed format template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatTemplate {
    source: String,
    parts: Vec<Part>,
}

impl FormatTemplate {
    /// Parses an option value: resolves backslash escapes, then
    /// placeholders.
    pub fn parse(raw: &str) -> Result<Self, ConfigurationError> {
        let unescaped = unescape(raw)?;
        Self::parse_unescaped(&unescaped)
    }

    /// Parses a template whose backslash escapes were already resolved.
    pub fn parse_unescaped(source: &str) -> Result<Self, ConfigurationError> {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => {
                    return Err(ConfigurationError::new(
                        "single '}' encountered in format string",
                    ))
                }
                '{' => {
                    let mut field = String::new();
                    let mut closed = false;
                    for fc in chars.by_ref() {
                        match fc {
                            '}' => {
                                closed = true;
                                break;
                            }
                            '{' => {
                                return Err(ConfigurationError::new(
                                    "nested placeholders are not supported in format string",
                                ))
                            }
                            _ => field.push(fc),
                        }
                    }
                    if !closed {
                        return Err(ConfigurationError::new(
                            "expected '}' before end of format string",
                        ));
                    }
                    if !literal.is_empty() {
                        parts.push(Part::Literal(std::mem::take(&mut literal)));
                    }
                    parts.push(Self::parse_field(&field)?);
                }
                _ => literal.push(c),
            }
        }
        if !literal.is_empty() {
            parts.push(Part::Literal(literal));
        }
        Ok(Self {
            source: source.to_string(),
            parts,
        })
    }

    fn parse_field(field: &str) -> Result<Part, ConfigurationError> {
        let (name, spec) = match field.split_once(':') {
            Some((n, s)) => (n, s),
            None => (field, ""),
        };
        let name = name.split_once('!').map_or(name, |(n, _)| n).trim();
        if name.is_empty() {
            return Err(ConfigurationError::new(
                "exceeded number of ordered keys in format string",
            ));
        }
        let spec = Spec::parse(spec).map_err(ConfigurationError::new)?;
        Ok(Part::Field {
            name: name.to_string(),
            spec,
        })
    }

    /// The template text after unescaping.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Placeholder names in order of appearance.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|p| match p {
            Part::Field { name, .. } => Some(name.as_str()),
            Part::Literal(_) => None,
        })
    }

    /// Returns whether the template references `name`.
    #[must_use]
    pub fn references(&self, name: &str) -> bool {
        self.keys().any(|k| k == name)
    }

    /// Returns whether the template references any of `names`.
    #[must_use]
    pub fn references_any(&self, names: &[&str]) -> bool {
        self.keys().any(|k| names.contains(&k))
    }

    /// Checks every placeholder against the keys of `known`.
    ///
    /// Returns the first placeholder that is not bound.
    pub fn validate(&self, known: &Scope) -> Result<(), FormatError> {
        match self.keys().find(|k| !known.contains(k)) {
            Some(missing) => Err(FormatError::new(missing, &self.source)),
            None => Ok(()),
        }
    }

    /// Renders the template to text.
    pub fn render(&self, scope: &Scope) -> Result<String, FormatError> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(s) => out.push_str(s),
                Part::Field { name, spec } => out.push_str(&self.render_field(name, spec, scope)?),
            }
        }
        Ok(out)
    }

    /// Renders the template to bytes, passing byte values through
    /// unchanged.
    pub fn render_bytes(&self, scope: &Scope) -> Result<Vec<u8>, FormatError> {
        let mut out = Vec::new();
        for part in &self.parts {
            match part {
                Part::Literal(s) => out.extend_from_slice(s.as_bytes()),
                Part::Field { name, spec } => match scope.get(name) {
                    Some(Value::Bytes(b)) if *spec == Spec::EMPTY => out.extend_from_slice(b),
                    _ => out.extend_from_slice(self.render_field(name, spec, scope)?.as_bytes()),
                },
            }
        }
        Ok(out)
    }

    fn render_field(&self, name: &str, spec: &Spec, scope: &Scope) -> Result<String, FormatError> {
        let value = scope
            .get(name)
            .ok_or_else(|| FormatError::new(name, &self.source))?;
        spec.apply(value, name, &self.source)
    }
}

impl fmt::Display for FormatTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Resolves backslash escapes in an option value.
pub fn unescape(text: &str) -> Result<String, ConfigurationError> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(code) = chars.next() else {
            return Err(ConfigurationError::new("unterminated escape sequence '\\'"));
        };
        match code {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'f' => out.push('\u{0c}'),
            'b' => out.push('\u{08}'),
            'a' => out.push('\u{07}'),
            '\\' | '"' | '\'' => out.push(code),
            'x' => out.push(hex_escape(&mut chars, 2, 'x')?),
            'u' => out.push(hex_escape(&mut chars, 4, 'u')?),
            other => {
                return Err(ConfigurationError::new(format!(
                    "invalid escape code \\{other}"
                )))
            }
        }
    }
    Ok(out)
}

fn hex_escape(chars: &mut std::str::Chars<'_>, len: usize, marker: char) -> Result<char, ConfigurationError> {
    let digits: String = chars.by_ref().take(len).collect();
    let invalid = || ConfigurationError::new(format!("invalid escape code \\{marker}{digits}"));
    if digits.chars().count() != len {
        return Err(invalid());
    }
    u32::from_str_radix(&digits, 16)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(invalid)
}
