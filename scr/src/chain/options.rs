//! Chain option table and value parsing.
//!
//! Raw arguments have the form `name[chain-spec]=value`. This module
//! splits them, looks the name up in the option table and converts the
//! value to a typed [`OptionValue`]. Semantic validation (queries,
//! patterns, formats) is left to the chain builder.

use super::spec::{looks_like_chain_spec, parse_chain_selector, ChainSelector};
use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a value of an option is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// A structural query.
    Query,
    /// A regular expression.
    Pattern,
    /// A format template.
    Format,
    /// A script handed to the script evaluator.
    Script,
    /// A boolean; a missing value means true.
    Bool,
    /// A (possibly negative) integer.
    Int,
    /// A chain-spec naming a set of chains.
    ChainSet,
    /// An encoding label.
    Encoding,
    /// A document duplication policy.
    Dedup,
    /// Free text.
    Text,
}

/// Document duplication policy (`dd=`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    /// Every discovered document is enqueued.
    Allowed,
    /// A document may not be the same as itself or one of its ancestors.
    Nonrecursive,
    /// A document identity is processed at most once per run.
    #[default]
    Unique,
}

impl DedupPolicy {
    /// Parses a policy name, accepting unique prefixes.
    pub fn parse(value: &str) -> Result<Self, ConfigurationError> {
        match_variant(
            value,
            &[
                ("allowed", Self::Allowed),
                ("nonrecursive", Self::Nonrecursive),
                ("unique", Self::Unique),
            ],
        )
        .ok_or_else(|| {
            ConfigurationError::new(format!(
                "unknown document duplication policy '{value}', expected allowed, nonrecursive or unique"
            ))
        })
    }
}

impl fmt::Display for DedupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Allowed => "allowed",
            Self::Nonrecursive => "nonrecursive",
            Self::Unique => "unique",
        })
    }
}

macro_rules! chain_options {
    ($( $variant:ident => $name:literal, $ty:ident; )*) => {
        /// Every per-chain option.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[allow(missing_docs)]
        pub enum ChainOption {
            $( $variant, )*
        }

        impl ChainOption {
            /// All options in table order.
            pub const ALL: &'static [Self] = &[ $( Self::$variant, )* ];

            /// The option name as written on the command line.
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $name, )*
                }
            }

            /// How values of this option are parsed.
            #[must_use]
            pub const fn value_type(self) -> ValueType {
                match self {
                    $( Self::$variant => ValueType::$ty, )*
                }
            }

            /// Looks up an option by name.
            #[must_use]
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $( $name => Some(Self::$variant), )*
                    _ => None,
                }
            }
        }
    };
}

chain_options! {
    Cx => "cx", Query;
    Cr => "cr", Pattern;
    Cf => "cf", Format;
    Cjs => "cjs", Script;
    Cmm => "cmm", Bool;
    Cin => "cin", Bool;
    Cimin => "cimin", Int;
    Cimax => "cimax", Int;
    Cicont => "cicont", Bool;
    Cpf => "cpf", Format;
    Csf => "csf", Format;
    Cwf => "cwf", Format;
    Csin => "csin", Bool;
    Cshf => "cshf", Format;
    Cshif => "cshif", Format;
    Cshp => "cshp", Bool;
    Cfc => "cfc", ChainSet;
    Cff => "cff", Format;
    Cl => "cl", Bool;
    Cesc => "cesc", Text;
    Cienc => "cienc", Encoding;
    Cfienc => "cfienc", Bool;
    Lx => "lx", Query;
    Lr => "lr", Pattern;
    Lf => "lf", Format;
    Ljs => "ljs", Script;
    Lmm => "lmm", Bool;
    Lin => "lin", Bool;
    Lic => "lic", Bool;
    Lam => "lam", Bool;
    Las => "las", Bool;
    Ldf => "ldf", Format;
    Fdf => "fdf", Format;
    Dx => "dx", Query;
    Dr => "dr", Pattern;
    Df => "df", Format;
    Djs => "djs", Script;
    Dmm => "dmm", Bool;
    Din => "din", Bool;
    Dimin => "dimin", Int;
    Dimax => "dimax", Int;
    Doc => "doc", ChainSet;
    Dd => "dd", Dedup;
    Denc => "denc", Encoding;
    Dfenc => "dfenc", Bool;
    Dsch => "dsch", Text;
    Dpsch => "dpsch", Bool;
    Dfsch => "dfsch", Bool;
    Owf => "owf", Bool;
}

impl fmt::Display for ChainOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A parsed option value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionValue {
    /// Text, query, pattern, format or script source.
    Text(String),
    /// Boolean flag.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Set of chains.
    Chains(ChainSelector),
    /// Canonical encoding name.
    Encoding(String),
    /// Duplication policy.
    Dedup(DedupPolicy),
}

/// Converts the raw value of `option` into an [`OptionValue`].
///
/// `value` is `None` when the argument had no `=`.
pub fn parse_option_value(
    option: ChainOption,
    value: Option<&str>,
    argument: &str,
) -> Result<OptionValue, ConfigurationError> {
    let ty = option.value_type();
    if ty == ValueType::Bool {
        return parse_bool(value.unwrap_or(""))
            .map(OptionValue::Bool)
            .map_err(|e| e.with_argument(argument));
    }
    let Some(value) = value else {
        return Err(
            ConfigurationError::new(format!("missing '=' and value for option '{option}'"))
                .with_argument(argument),
        );
    };
    let parsed = match ty {
        ValueType::Int => parse_int(value).map(OptionValue::Int),
        ValueType::ChainSet => parse_chain_selector(value, argument).map(OptionValue::Chains),
        ValueType::Encoding => parse_encoding(value).map(OptionValue::Encoding),
        ValueType::Dedup => DedupPolicy::parse(value).map(OptionValue::Dedup),
        _ => Ok(OptionValue::Text(value.to_string())),
    };
    parsed.map_err(|e| {
        if e.argument.is_some() {
            e
        } else {
            e.with_argument(argument)
        }
    })
}

/// Parses a boolean. The empty string is true.
pub fn parse_bool(value: &str) -> Result<bool, ConfigurationError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "y" | "yes" | "true" | "1" => Ok(true),
        "n" | "no" | "false" | "0" => Ok(false),
        other => Err(ConfigurationError::new(format!(
            "failed to parse '{other}' as a boolean"
        ))),
    }
}

/// Parses an integer.
pub fn parse_int(value: &str) -> Result<i64, ConfigurationError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigurationError::new(format!("failed to parse '{value}' as an integer")))
}

/// Validates an encoding label and returns its canonical name.
pub fn parse_encoding(value: &str) -> Result<String, ConfigurationError> {
    encoding_rs::Encoding::for_label(value.trim().as_bytes())
        .map(|enc| enc.name().to_ascii_lowercase())
        .ok_or_else(|| ConfigurationError::new(format!("unknown encoding '{value}'")))
}

/// Resolves `value` against a variant table.
///
/// An exact match wins, otherwise `value` must be a prefix of exactly
/// one variant name.
pub fn match_variant<T: Copy>(value: &str, variants: &[(&str, T)]) -> Option<T> {
    let value = value.trim().to_ascii_lowercase();
    if value.is_empty() {
        return None;
    }
    if let Some((_, v)) = variants.iter().find(|(name, _)| *name == value) {
        return Some(*v);
    }
    let mut candidates = variants.iter().filter(|(name, _)| name.starts_with(&value));
    match (candidates.next(), candidates.next()) {
        (Some((_, v)), None) => Some(*v),
        _ => None,
    }
}

/// A raw argument split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawArgument<'a> {
    /// The option name.
    pub name: &'a str,
    /// The chain-spec between name and `=`, possibly empty.
    pub spec: &'a str,
    /// The value after `=`, if any.
    pub value: Option<&'a str>,
    /// The whole argument.
    pub text: &'a str,
}

/// Splits `name[chain-spec][=value]`.
pub fn split_argument(text: &str) -> Result<RawArgument<'_>, ConfigurationError> {
    let (key, value) = match text.split_once('=') {
        Some((k, v)) => (k, Some(v)),
        None => (text, None),
    };
    let name_len = key
        .char_indices()
        .find(|(_, c)| !c.is_ascii_alphabetic())
        .map_or(key.len(), |(i, _)| i);
    let (name, spec) = key.split_at(name_len);
    if name.is_empty() || !looks_like_chain_spec(spec) {
        return Err(ConfigurationError::new("unrecognized option").with_argument(text));
    }
    Ok(RawArgument {
        name,
        spec,
        value,
        text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_table_round_trip() {
        for opt in ChainOption::ALL {
            assert_eq!(ChainOption::from_name(opt.name()), Some(*opt));
        }
        assert_eq!(ChainOption::from_name("nope"), None);
        assert_eq!(ChainOption::Cimax.value_type(), ValueType::Int);
    }

    #[test]
    fn test_split_argument() {
        let arg = split_argument("cx1-2=//a/@href").unwrap();
        assert_eq!(arg.name, "cx");
        assert_eq!(arg.spec, "1-2");
        assert_eq!(arg.value, Some("//a/@href"));

        let arg = split_argument("cl").unwrap();
        assert_eq!(arg.name, "cl");
        assert_eq!(arg.spec, "");
        assert_eq!(arg.value, None);

        let arg = split_argument("cpf^0=a=b").unwrap();
        assert_eq!(arg.spec, "^0");
        assert_eq!(arg.value, Some("a=b"));

        assert!(split_argument("cx_foo=1").is_err());
        assert!(split_argument("=1").is_err());
    }

    #[test]
    fn test_bool_values() {
        for yes in ["", "y", "YES", "true", "1"] {
            assert!(parse_bool(yes).unwrap());
        }
        for no in ["n", "No", "false", "0"] {
            assert!(!parse_bool(no).unwrap());
        }
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn test_blank_bool_option_is_true() {
        assert_eq!(
            parse_option_value(ChainOption::Cl, None, "cl").unwrap(),
            OptionValue::Bool(true)
        );
    }

    #[test]
    fn test_value_required_for_non_bool() {
        let err = parse_option_value(ChainOption::Cx, None, "cx").unwrap_err();
        assert_eq!(err.argument.as_deref(), Some("cx"));
    }

    #[test]
    fn test_encoding_labels() {
        assert_eq!(parse_encoding("latin1").unwrap(), "windows-1252");
        assert_eq!(parse_encoding("UTF8").unwrap(), "utf-8");
        assert!(parse_encoding("klingon").is_err());
    }

    #[test]
    fn test_dedup_prefixes() {
        assert_eq!(DedupPolicy::parse("u").unwrap(), DedupPolicy::Unique);
        assert_eq!(DedupPolicy::parse("non").unwrap(), DedupPolicy::Nonrecursive);
        assert_eq!(DedupPolicy::parse("allowed").unwrap(), DedupPolicy::Allowed);
        assert!(DedupPolicy::parse("x").is_err());
    }

    #[test]
    fn test_match_variant_ambiguous_prefix() {
        let table = [("debug", 1), ("default", 2)];
        assert_eq!(match_variant("de", &table), None);
        assert_eq!(match_variant("deb", &table), Some(1));
    }

    #[test]
    fn test_chain_set_value() {
        let v = parse_option_value(ChainOption::Doc, Some("1-2"), "doc=1-2").unwrap();
        match v {
            OptionValue::Chains(sel) => assert!(sel.contains(2)),
            other => panic!("unexpected {other:?}"),
        }
        assert!(parse_option_value(ChainOption::Doc, Some(""), "doc=").is_err());
    }
}
