//! Command-line argument parsing.
//!
//! Every argument has the form `name[chain-spec][=value]`. Names are
//! looked up in three tables: global settings (`bfs`, `mt`, `timeout`,
//! `ua`, `uar`, `cookiefile`, `ql`, `v`, `exit`), initial documents (`url`,
//! `file`, `rfile`, `str`, `rstr`) and per-chain options. Global settings
//! take no chain-spec and may be given once.

use crate::chain::options::{match_variant, parse_bool, parse_int, split_argument};
use crate::chain::{Chain, ChainScope, ChainSetBuilder, SchemePolicy};
use crate::config::RunConfig;
use crate::document::{normalize_link, Document, DocumentKind, LinkBase};
use crate::engine::{QueryLanguage, StructuralQuery};
use crate::errors::ConfigurationError;
use crate::observability::Verbosity;
use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;

/// An initial document named on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentArgument {
    /// Document kind.
    pub kind: DocumentKind,
    /// Location, or the text itself for literal kinds.
    pub value: String,
    /// Chains consuming the document.
    pub scope: ChainScope,
}

/// Everything parsed from the command line.
#[derive(Debug, Clone, Default)]
pub struct ScrConfig {
    /// Chain option bindings.
    pub builder: ChainSetBuilder,
    /// Initial documents in argument order.
    pub documents: Vec<DocumentArgument>,
    /// Global settings.
    pub run: RunConfig,
    /// `exit` was given.
    pub exit: bool,
}

impl ScrConfig {
    /// Compiles the chains and resolves the consumers of the initial
    /// documents.
    ///
    /// URL and file locations are normalized with the scheme policy of
    /// their first consumer chain, so `url=example.org` fetches
    /// `https://example.org`.
    pub fn build(
        &self,
        query: &dyn StructuralQuery,
        script_available: bool,
    ) -> Result<(Vec<Chain>, Vec<Document>), ConfigurationError> {
        let chains = self.builder.build(query, script_available)?;
        let documents = self
            .documents
            .iter()
            .map(|d| {
                let consumers: BTreeSet<_> = (0..chains.len()).filter(|id| d.scope.contains(*id)).collect();
                let location = if d.kind.is_literal() {
                    d.value.clone()
                } else {
                    let schemes = consumers
                        .first()
                        .map_or_else(SchemePolicy::default, |id| chains[*id].schemes.clone());
                    let kind = if d.kind == DocumentKind::Url {
                        DocumentKind::Url
                    } else {
                        DocumentKind::File
                    };
                    normalize_link(&d.value, &LinkBase { kind, location: None }, &schemes)
                };
                Document::initial(d.kind, location, consumers)
            })
            .collect();
        Ok((chains, documents))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Global {
    Bfs,
    Mt,
    Timeout,
    Ua,
    Uar,
    CookieFile,
    Ql,
    V,
    Exit,
}

impl Global {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "bfs" => Self::Bfs,
            "mt" => Self::Mt,
            "timeout" => Self::Timeout,
            "ua" => Self::Ua,
            "uar" => Self::Uar,
            "cookiefile" => Self::CookieFile,
            "ql" => Self::Ql,
            "v" => Self::V,
            "exit" => Self::Exit,
            _ => return None,
        })
    }
}

/// Parses the argument list (without the program name).
pub fn parse_args<S: AsRef<str>>(args: &[S]) -> Result<ScrConfig, ConfigurationError> {
    let mut config = ScrConfig::default();
    let mut seen = HashSet::new();
    for arg in args {
        let text = arg.as_ref();
        let raw = split_argument(text)?;

        if let Some(global) = Global::from_name(raw.name) {
            if !raw.spec.trim().is_empty() {
                return Err(ConfigurationError::new(format!(
                    "option '{}' does not take a chain specification",
                    raw.name
                ))
                .with_argument(text));
            }
            if !seen.insert(global) {
                return Err(ConfigurationError::new(format!("{} specified twice", raw.name))
                    .with_argument(text));
            }
            apply_global(&mut config, global, raw.value)
                .map_err(|e| e.with_argument(text))?;
            continue;
        }

        if let Some(kind) = DocumentKind::from_name(raw.name) {
            let Some(value) = raw.value else {
                return Err(ConfigurationError::new(format!(
                    "missing '=' and value for document '{}'",
                    raw.name
                ))
                .with_argument(text));
            };
            let scope = crate::chain::parse_chain_spec(raw.spec, text)?;
            config.builder.reference(&scope);
            config.documents.push(DocumentArgument {
                kind,
                value: value.to_string(),
                scope,
            });
            continue;
        }

        config.builder.push_argument(text)?;
    }
    if seen.contains(&Global::Ua) && config.run.random_user_agent {
        return Err(ConfigurationError::new("the options ua and uar are incompatible"));
    }
    Ok(config)
}

fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, ConfigurationError> {
    value.ok_or_else(|| ConfigurationError::new(format!("missing '=' and value for option '{name}'")))
}

fn apply_global(config: &mut ScrConfig, global: Global, value: Option<&str>) -> Result<(), ConfigurationError> {
    match global {
        Global::Bfs => config.run.bfs = parse_bool(value.unwrap_or(""))?,
        Global::Exit => config.exit = parse_bool(value.unwrap_or(""))?,
        Global::Mt => {
            let workers = parse_int(required(value, "mt")?)?;
            config.run.max_fetch_workers = usize::try_from(workers).map_err(|_| {
                ConfigurationError::new(format!("mt must not be negative, got {workers}"))
            })?;
        }
        Global::Timeout => {
            let raw = required(value, "timeout")?;
            let seconds: f64 = raw
                .trim()
                .parse()
                .map_err(|_| ConfigurationError::new(format!("failed to parse '{raw}' as a number")))?;
            if !seconds.is_finite() || seconds < 0.0 {
                return Err(ConfigurationError::new(format!(
                    "timeout must be a non-negative number, got '{raw}'"
                )));
            }
            config.run.timeout_seconds = seconds;
        }
        Global::Ua => config.run.user_agent = required(value, "ua")?.to_string(),
        Global::Uar => config.run.random_user_agent = parse_bool(value.unwrap_or(""))?,
        Global::CookieFile => {
            config.run.cookie_file = Some(PathBuf::from(required(value, "cookiefile")?));
        }
        Global::Ql => {
            let raw = required(value, "ql")?;
            let variants = QueryLanguage::ALL.map(|l| (l.name(), l));
            config.run.query_language = match_variant(raw, &variants).ok_or_else(|| {
                ConfigurationError::new(format!("unknown query language '{raw}', expected xpath or css"))
            })?;
        }
        Global::V => {
            let raw = required(value, "v")?;
            let variants = Verbosity::ALL.map(|v| (v.name(), v));
            config.run.verbosity = match_variant(raw, &variants).ok_or_else(|| {
                ConfigurationError::new(format!(
                    "unknown verbosity '{raw}', expected error, warn, info or debug"
                ))
            })?;
        }
    }
    Ok(())
}
