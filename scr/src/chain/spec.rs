//! Chain-spec parsing.
//!
//! A chain-spec selects the chains an option applies to. Supported forms
//! are a single id (`3`), an inclusive range (`1-4`), open ranges (`2-`,
//! `-5`), comma separated sets (`0,2-3`) and complements (`^1`, `0-5^2`).
//! An empty spec configures the defaults shared by all chains.

use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Integer id of a chain.
pub type ChainId = usize;

/// One section of a chain-spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RangeItem {
    /// A single chain id.
    Single(ChainId),
    /// An inclusive range of ids.
    Bounded {
        /// First id.
        lo: ChainId,
        /// Last id.
        hi: ChainId,
    },
    /// All ids from `lo` on, including chains that do not exist yet.
    From(ChainId),
}

impl RangeItem {
    /// Returns whether `id` falls inside this section.
    #[must_use]
    pub const fn contains(&self, id: ChainId) -> bool {
        match *self {
            Self::Single(v) => v == id,
            Self::Bounded { lo, hi } => lo <= id && id <= hi,
            Self::From(lo) => lo <= id,
        }
    }

    /// The largest id this section names explicitly.
    #[must_use]
    pub const fn explicit_max(&self) -> ChainId {
        match *self {
            Self::Single(v) | Self::From(v) => v,
            Self::Bounded { hi, .. } => hi,
        }
    }
}

impl fmt::Display for RangeItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(v) => write!(f, "{v}"),
            Self::Bounded { lo, hi } => write!(f, "{lo}-{hi}"),
            Self::From(lo) => write!(f, "{lo}-"),
        }
    }
}

/// A parsed, non-empty chain-spec.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChainSelector {
    include: Vec<RangeItem>,
    exclude: Vec<RangeItem>,
}

impl ChainSelector {
    /// Selects exactly one chain.
    #[must_use]
    pub fn single(id: ChainId) -> Self {
        Self {
            include: vec![RangeItem::Single(id)],
            exclude: Vec::new(),
        }
    }

    /// Selects every chain, present and future.
    #[must_use]
    pub fn all() -> Self {
        Self {
            include: vec![RangeItem::From(0)],
            exclude: Vec::new(),
        }
    }

    /// Returns whether the selector applies to chain `id`.
    #[must_use]
    pub fn contains(&self, id: ChainId) -> bool {
        self.include.iter().any(|r| r.contains(id)) && !self.exclude.iter().any(|r| r.contains(id))
    }

    /// The largest id named anywhere in the spec, excluded ids included.
    #[must_use]
    pub fn explicit_max(&self) -> Option<ChainId> {
        self.include
            .iter()
            .chain(self.exclude.iter())
            .map(RangeItem::explicit_max)
            .max()
    }

    /// Resolves the selector against `chain_count` existing chains.
    #[must_use]
    pub fn resolve(&self, chain_count: usize) -> BTreeSet<ChainId> {
        (0..chain_count).filter(|id| self.contains(*id)).collect()
    }
}

impl fmt::Display for ChainSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |items: &[RangeItem]| {
            items
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",")
        };
        if self.include == [RangeItem::From(0)] && !self.exclude.is_empty() {
            return write!(f, "^{}", join(&self.exclude));
        }
        write!(f, "{}", join(&self.include))?;
        if !self.exclude.is_empty() {
            write!(f, "^{}", join(&self.exclude))?;
        }
        Ok(())
    }
}

/// Where an option binding applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainScope {
    /// The empty spec: a default for every chain.
    Defaults,
    /// An explicit selection.
    Selected(ChainSelector),
}

impl ChainScope {
    /// Returns whether the scope applies to chain `id`.
    #[must_use]
    pub fn contains(&self, id: ChainId) -> bool {
        match self {
            Self::Defaults => true,
            Self::Selected(sel) => sel.contains(id),
        }
    }

    /// Returns whether this is the defaults scope.
    #[must_use]
    pub const fn is_defaults(&self) -> bool {
        matches!(self, Self::Defaults)
    }

    /// The largest explicitly named id.
    #[must_use]
    pub fn explicit_max(&self) -> Option<ChainId> {
        match self {
            Self::Defaults => None,
            Self::Selected(sel) => sel.explicit_max(),
        }
    }
}

/// Parses a chain-spec.
///
/// `argument` is the raw argument used for error messages.
pub fn parse_chain_spec(spec: &str, argument: &str) -> Result<ChainScope, ConfigurationError> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Ok(ChainScope::Defaults);
    }
    let parts: Vec<&str> = spec.split('^').map(str::trim).collect();
    match parts.as_slice() {
        [simple] => Ok(ChainScope::Selected(ChainSelector {
            include: parse_simple(simple, argument)?,
            exclude: Vec::new(),
        })),
        [lhs, rhs] => {
            let include = if lhs.is_empty() {
                vec![RangeItem::From(0)]
            } else {
                parse_simple(lhs, argument)?
            };
            Ok(ChainScope::Selected(ChainSelector {
                include,
                exclude: parse_simple(rhs, argument)?,
            }))
        }
        _ => Err(spec_error(
            "cannot have more than one '^' in chain specification",
            argument,
        )),
    }
}

/// Parses a chain-spec that must select chains explicitly, as used by
/// the values of `doc=` and `cfc=`.
pub fn parse_chain_selector(spec: &str, argument: &str) -> Result<ChainSelector, ConfigurationError> {
    match parse_chain_spec(spec, argument)? {
        ChainScope::Selected(sel) => Ok(sel),
        ChainScope::Defaults => Err(spec_error("empty chain specification", argument)),
    }
}

/// Returns whether `suffix` only contains chain-spec characters.
#[must_use]
pub fn looks_like_chain_spec(suffix: &str) -> bool {
    suffix
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '-' | '^' | ',' | ' '))
}

fn parse_simple(spec: &str, argument: &str) -> Result<Vec<RangeItem>, ConfigurationError> {
    let mut items = Vec::new();
    for section in spec.split(',') {
        let section = section.trim();
        if section.is_empty() {
            return Err(spec_error("invalid empty range in chain specification", argument));
        }
        let bounds: Vec<&str> = section.split('-').map(str::trim).collect();
        match bounds.as_slice() {
            [single] => items.push(RangeItem::Single(parse_id(single, argument)?)),
            ["", ""] => {
                return Err(spec_error(
                    &format!("invalid range '{section}' in chain specification"),
                    argument,
                ))
            }
            [lo, ""] => items.push(RangeItem::From(parse_id(lo, argument)?)),
            [lo, hi] => {
                let lo = if lo.is_empty() { 0 } else { parse_id(lo, argument)? };
                let hi = parse_id(hi, argument)?;
                if lo > hi {
                    return Err(spec_error(
                        &format!("second value must be larger than first for range {section}"),
                        argument,
                    ));
                }
                items.push(RangeItem::Bounded { lo, hi });
            }
            _ => {
                return Err(spec_error(
                    &format!("invalid range '{section}' in chain specification"),
                    argument,
                ))
            }
        }
    }
    Ok(items)
}

fn parse_id(value: &str, argument: &str) -> Result<ChainId, ConfigurationError> {
    value.parse::<ChainId>().map_err(|_| {
        spec_error(
            &format!("failed to parse '{value}' as a chain id"),
            argument,
        )
    })
}

fn spec_error(message: &str, argument: &str) -> ConfigurationError {
    ConfigurationError::new(message).with_argument(argument)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector(spec: &str) -> ChainSelector {
        match parse_chain_spec(spec, "test").unwrap() {
            ChainScope::Selected(sel) => sel,
            ChainScope::Defaults => panic!("expected selection for {spec}"),
        }
    }

    #[test]
    fn test_empty_spec_is_defaults() {
        assert_eq!(parse_chain_spec("", "cx=").unwrap(), ChainScope::Defaults);
        assert_eq!(parse_chain_spec("  ", "cx=").unwrap(), ChainScope::Defaults);
    }

    #[test]
    fn test_single_and_set() {
        let sel = selector("0,2");
        assert_eq!(sel.resolve(4).into_iter().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(sel.explicit_max(), Some(2));
    }

    #[test]
    fn test_ranges() {
        assert_eq!(selector("1-3").resolve(10).len(), 3);
        assert_eq!(
            selector("-2").resolve(10).into_iter().collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        let open = selector("3-");
        assert!(open.contains(3));
        assert!(open.contains(1000));
        assert!(!open.contains(2));
        assert_eq!(open.explicit_max(), Some(3));
    }

    #[test]
    fn test_complement() {
        let sel = selector("^1");
        assert!(sel.contains(0));
        assert!(!sel.contains(1));
        assert!(sel.contains(7));

        let sel = selector("0-4^2,3");
        assert_eq!(
            sel.resolve(10).into_iter().collect::<Vec<_>>(),
            vec![0, 1, 4]
        );
    }

    #[test]
    fn test_malformed_specs() {
        for bad in ["a", "1-a", "3-1", "1^2^3", "1,,2", "-", "1-2-3", "^"] {
            let err = parse_chain_spec(bad, "cx1=foo");
            assert!(err.is_err(), "expected error for '{bad}'");
            assert_eq!(err.unwrap_err().argument.as_deref(), Some("cx1=foo"));
        }
    }

    #[test]
    fn test_display_round_trip() {
        for spec in ["0,2", "1-3", "4-", "^1", "0-4^2"] {
            assert_eq!(selector(spec).to_string(), spec);
        }
    }

    #[test]
    fn test_looks_like_chain_spec() {
        assert!(looks_like_chain_spec(""));
        assert!(looks_like_chain_spec("0-2^1"));
        assert!(!looks_like_chain_spec("in"));
    }
}
