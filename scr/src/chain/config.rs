//! Flat, unvalidated per-chain configuration.
//!
//! A [`ChainConfig`] holds the merged option bindings of one chain. Every
//! field is optional; built-in defaults are applied when the chain is
//! compiled.

use super::options::{ChainOption, DedupPolicy, OptionValue};
use super::spec::ChainSelector;
use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn text(option: ChainOption, value: OptionValue) -> Result<String, ConfigurationError> {
    match value {
        OptionValue::Text(s) | OptionValue::Encoding(s) => Ok(s),
        other => Err(mismatch(option, &other)),
    }
}

fn boolean(option: ChainOption, value: OptionValue) -> Result<bool, ConfigurationError> {
    match value {
        OptionValue::Bool(b) => Ok(b),
        other => Err(mismatch(option, &other)),
    }
}

fn int(option: ChainOption, value: OptionValue) -> Result<i64, ConfigurationError> {
    match value {
        OptionValue::Int(i) => Ok(i),
        other => Err(mismatch(option, &other)),
    }
}

fn chains(option: ChainOption, value: OptionValue) -> Result<ChainSelector, ConfigurationError> {
    match value {
        OptionValue::Chains(sel) => Ok(sel),
        other => Err(mismatch(option, &other)),
    }
}

fn dedup(option: ChainOption, value: OptionValue) -> Result<DedupPolicy, ConfigurationError> {
    match value {
        OptionValue::Dedup(d) => Ok(d),
        other => Err(mismatch(option, &other)),
    }
}

fn mismatch(option: ChainOption, value: &OptionValue) -> ConfigurationError {
    ConfigurationError::new(format!("invalid value {value:?} for option '{option}'"))
}

macro_rules! chain_config {
    ($( $(#[$doc:meta])* $variant:ident => $field:ident : $ty:ty = $extract:ident; )*) => {
        /// Merged option bindings for one chain.
        #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
        pub struct ChainConfig {
            $(
                $(#[$doc])*
                #[serde(default, skip_serializing_if = "Option::is_none")]
                pub $field: Option<$ty>,
            )*
            #[serde(skip)]
            sources: BTreeMap<ChainOption, String>,
        }

        impl ChainConfig {
            /// Sets `option`, replacing any earlier value.
            pub fn apply(
                &mut self,
                option: ChainOption,
                value: OptionValue,
                argument: &str,
            ) -> Result<(), ConfigurationError> {
                match option {
                    $( ChainOption::$variant => {
                        self.$field = Some($extract(option, value).map_err(|e| e.with_argument(argument))?);
                    } )*
                }
                self.sources.insert(option, argument.to_string());
                Ok(())
            }

            /// Fills every unset field from `defaults`.
            pub fn inherit(&mut self, defaults: &Self) {
                $(
                    if self.$field.is_none() && defaults.$field.is_some() {
                        self.$field = defaults.$field.clone();
                        if let Some(src) = defaults.sources.get(&ChainOption::$variant) {
                            self.sources.insert(ChainOption::$variant, src.clone());
                        }
                    }
                )*
            }

            /// Returns whether `option` has a value.
            #[must_use]
            pub const fn is_set(&self, option: ChainOption) -> bool {
                match option {
                    $( ChainOption::$variant => self.$field.is_some(), )*
                }
            }
        }
    };
}

chain_config! {
    /// Content structural query.
    Cx => cx: String = text;
    /// Content pattern.
    Cr => cr: String = text;
    /// Content format.
    Cf => cf: String = text;
    /// Content script.
    Cjs => cjs: String = text;
    /// Multiple content matches per document.
    Cmm => cmm: bool = boolean;
    /// Prompt before accepting content.
    Cin => cin: bool = boolean;
    /// First content index.
    Cimin => cimin: i64 = int;
    /// Last content index.
    Cimax => cimax: i64 = int;
    /// Do not reset the content index per document.
    Cicont => cicont: bool = boolean;
    /// Print format.
    Cpf => cpf: String = text;
    /// Save path format.
    Csf => csf: String = text;
    /// Write format for saved files.
    Cwf => cwf: String = text;
    /// Prompt before saving to a path.
    Csin => csin: bool = boolean;
    /// Shell command format.
    Cshf => cshf: String = text;
    /// Shell stdin format.
    Cshif => cshif: String = text;
    /// Print shell output.
    Cshp => cshp: bool = boolean;
    /// Chains receiving forwarded content.
    Cfc => cfc: ChainSelector = chains;
    /// Forwarding format.
    Cff => cff: String = text;
    /// Content is a link to the actual content.
    Cl => cl: bool = boolean;
    /// Escape sequence terminating multi-line edits.
    Cesc => cesc: String = text;
    /// Content input encoding.
    Cienc => cienc: String = text;
    /// Force the content input encoding.
    Cfienc => cfienc: bool = boolean;
    /// Label structural query.
    Lx => lx: String = text;
    /// Label pattern.
    Lr => lr: String = text;
    /// Label format.
    Lf => lf: String = text;
    /// Label script.
    Ljs => ljs: String = text;
    /// Multiple label matches per document.
    Lmm => lmm: bool = boolean;
    /// Prompt before accepting labels.
    Lin => lin: bool = boolean;
    /// Match labels inside the content match.
    Lic => lic: bool = boolean;
    /// Allow missing labels.
    Lam => lam: bool = boolean;
    /// Allow slashes in labels.
    Las => las: bool = boolean;
    /// Label default format.
    Ldf => ldf: String = text;
    /// Filename default format.
    Fdf => fdf: String = text;
    /// Document structural query.
    Dx => dx: String = text;
    /// Document pattern.
    Dr => dr: String = text;
    /// Document format.
    Df => df: String = text;
    /// Document script.
    Djs => djs: String = text;
    /// Multiple document matches per document.
    Dmm => dmm: bool = boolean;
    /// Prompt before accepting documents.
    Din => din: bool = boolean;
    /// First document index.
    Dimin => dimin: i64 = int;
    /// Last document index.
    Dimax => dimax: i64 = int;
    /// Chains consuming discovered documents.
    Doc => doc: ChainSelector = chains;
    /// Duplication policy.
    Dd => dd: DedupPolicy = dedup;
    /// Default document encoding.
    Denc => denc: String = text;
    /// Force the document encoding.
    Dfenc => dfenc: bool = boolean;
    /// Default scheme.
    Dsch => dsch: String = text;
    /// Prefer the parent's scheme.
    Dpsch => dpsch: bool = boolean;
    /// Force the default scheme.
    Dfsch => dfsch: bool = boolean;
    /// Overwrite existing files.
    Owf => owf: bool = boolean;
}

impl ChainConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The argument that configured `option`, for error messages.
    #[must_use]
    pub fn source(&self, option: ChainOption) -> Option<&str> {
        self.sources.get(&option).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_and_source() {
        let mut cfg = ChainConfig::new();
        cfg.apply(ChainOption::Cx, OptionValue::Text("a".into()), "cx=a")
            .unwrap();
        cfg.apply(ChainOption::Cimax, OptionValue::Int(3), "cimax=3")
            .unwrap();
        assert_eq!(cfg.cx.as_deref(), Some("a"));
        assert_eq!(cfg.cimax, Some(3));
        assert!(cfg.is_set(ChainOption::Cx));
        assert!(!cfg.is_set(ChainOption::Cr));
        assert_eq!(cfg.source(ChainOption::Cimax), Some("cimax=3"));
    }

    #[test]
    fn test_type_mismatch_is_rejected() {
        let mut cfg = ChainConfig::new();
        let err = cfg
            .apply(ChainOption::Cimax, OptionValue::Bool(true), "cimax")
            .unwrap_err();
        assert_eq!(err.argument.as_deref(), Some("cimax"));
    }

    #[test]
    fn test_inherit_keeps_explicit_values() {
        let mut defaults = ChainConfig::new();
        defaults
            .apply(ChainOption::Cr, OptionValue::Text("x".into()), "cr=x")
            .unwrap();
        defaults
            .apply(ChainOption::Cmm, OptionValue::Bool(false), "cmm=no")
            .unwrap();

        let mut cfg = ChainConfig::new();
        cfg.apply(ChainOption::Cr, OptionValue::Text("y".into()), "cr1=y")
            .unwrap();
        cfg.inherit(&defaults);

        assert_eq!(cfg.cr.as_deref(), Some("y"));
        assert_eq!(cfg.cmm, Some(false));
        assert_eq!(cfg.source(ChainOption::Cmm), Some("cmm=no"));
    }

    #[test]
    fn test_serializes_only_set_fields() {
        let mut cfg = ChainConfig::new();
        cfg.apply(ChainOption::Dd, OptionValue::Dedup(DedupPolicy::Allowed), "dd=a")
            .unwrap();
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json, serde_json::json!({"dd": "allowed"}));
    }
}
