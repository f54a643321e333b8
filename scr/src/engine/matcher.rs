//! The match engine.
//!
//! Each locator runs `Structural -> Pattern -> Script` to produce
//! [`LocatorMatch`]es; the format stage and interaction happen later,
//! once indices are known. The content stage also pairs content matches
//! with labels.

use super::pattern::{apply_pattern, PatternMatch};
use super::query::{StructuralMatch, StructuralQuery};
use super::script::ScriptEvaluator;
use crate::chain::{Chain, Locator, LocatorKind};
use crate::errors::{FormatError, MatchError};
use crate::format::{Scope, Value};
use std::sync::Arc;
use tracing::warn;

/// The intermediate and final results of one locator match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocatorMatch {
    /// Value produced by the structural query.
    pub structural: Option<String>,
    /// Markup of the structural node.
    pub fragment: Option<String>,
    /// Pattern match and its groups.
    pub pattern: Option<PatternMatch>,
    /// Script result.
    pub script: Option<String>,
    /// Format result.
    pub formatted: Option<String>,
    /// Value after the last stage that ran.
    pub result: String,
}

impl LocatorMatch {
    /// A match that is the whole input.
    #[must_use]
    pub fn whole(text: &str) -> Self {
        Self {
            fragment: Some(text.to_string()),
            result: text.to_string(),
            ..Self::default()
        }
    }

    fn from_structural(m: StructuralMatch) -> Self {
        Self {
            result: m.text.clone(),
            structural: Some(m.text),
            fragment: Some(m.fragment),
            ..Self::default()
        }
    }

    /// A match carrying only a final value, as produced by default
    /// formats and edits.
    #[must_use]
    pub fn literal(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            formatted: Some(value.clone()),
            result: value,
            ..Self::default()
        }
    }

    /// The shape of matches a locator can produce, with empty values.
    #[must_use]
    pub fn shape(locator: &Locator) -> Self {
        Self {
            structural: locator.query.as_ref().map(|_| String::new()),
            fragment: None,
            pattern: locator.pattern.as_ref().map(super::pattern::group_shape),
            script: locator.script.as_ref().map(|_| String::new()),
            formatted: locator.format.as_ref().map(|_| String::new()),
            result: String::new(),
        }
    }

    /// Binds the match under `kind`'s placeholder names.
    ///
    /// Positional groups go in before named groups so a named group can
    /// shadow a positional name.
    pub fn bind(&self, kind: LocatorKind, scope: &mut Scope) {
        let p = kind.prefix();
        scope.insert_opt(format!("{p}x"), self.structural.clone());
        scope.insert_opt(format!("{p}r"), self.pattern.as_ref().map(|m| m.whole.clone()));
        scope.insert_opt(format!("{p}f"), self.formatted.clone());
        scope.insert_opt(format!("{p}js"), self.script.clone());
        scope.insert(kind.final_key(), self.result.clone());
        if let Some(ref pm) = self.pattern {
            scope.insert(format!("{p}g0"), pm.whole.clone());
            for (i, g) in pm.groups.iter().enumerate() {
                scope.insert(format!("{p}g{}", i + 1), g.clone());
            }
            for (name, value) in &pm.named {
                scope.insert(name.clone(), value.clone());
            }
        }
    }

    /// Applies the locator's format against `scope`.
    pub fn apply_format(&mut self, locator: &Locator, scope: &Scope) -> Result<(), FormatError> {
        if let Some(ref format) = locator.format {
            let value = format.render(scope)?;
            self.formatted = Some(value.clone());
            self.result = value;
        }
        Ok(())
    }
}

/// A content match and its label, before indices are assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentMatch {
    /// The content locator match.
    pub content: LocatorMatch,
    /// The paired label, if any.
    pub label: Option<LocatorMatch>,
}

/// Content matches found in one document.
#[derive(Debug, Clone, Default)]
pub struct ContentCandidates {
    /// Matches in document order.
    pub matches: Vec<ContentMatch>,
    /// Content matches dropped for lack of a label.
    pub missing_labels: usize,
}

/// Structural content nodes of a document and its document-wide labels.
#[derive(Debug, Clone, Default)]
pub struct ContentPlan {
    /// Content nodes in document order, before the pattern and script
    /// stages.
    pub nodes: Vec<LocatorMatch>,
    /// Labels matched against the whole document.
    pub labels: Vec<LocatorMatch>,
}

/// Variables available to every template of a chain.
#[derive(Debug, Clone)]
pub struct GeneralScope<'a> {
    /// Encoding of the document.
    pub encoding: &'a str,
    /// Location of the document.
    pub location: &'a str,
    /// Document index.
    pub di: i64,
    /// Content index, once assigned.
    pub ci: Option<i64>,
}

impl GeneralScope<'_> {
    /// Builds the base scope for `chain`.
    #[must_use]
    pub fn to_scope(&self, chain: &Chain) -> Scope {
        let mut scope = Scope::new();
        scope.insert("cenc", self.encoding);
        scope.insert("cesc", chain.escape_sequence.as_str());
        scope.insert("dl", self.location);
        scope.insert("chain", chain.id);
        scope.insert("di", self.di);
        scope.insert_opt("ci", self.ci);
        scope
    }
}

/// Binds `fn`, `fb` and `fe` for `filename`.
pub fn bind_filename(filename: &str, scope: &mut Scope) {
    let (base, ext) = match filename.rfind('.') {
        Some(idx) if idx > 0 => filename.split_at(idx),
        _ => (filename, ""),
    };
    scope.insert("fn", filename);
    scope.insert("fb", base);
    scope.insert("fe", ext);
}

/// Binds the content value `c`.
pub fn bind_content(content: Value, scope: &mut Scope) {
    scope.insert("c", content);
}

/// Runs locators against document text.
#[derive(Debug, Clone)]
pub struct Matcher {
    query: Arc<dyn StructuralQuery>,
    script: Option<Arc<dyn ScriptEvaluator>>,
}

impl Matcher {
    /// Creates a matcher.
    #[must_use]
    pub fn new(query: Arc<dyn StructuralQuery>, script: Option<Arc<dyn ScriptEvaluator>>) -> Self {
        Self { query, script }
    }

    /// Runs the structural stage against a whole document.
    pub fn structural(
        &self,
        locator: &Locator,
        text: &str,
        location: &str,
    ) -> Result<Vec<LocatorMatch>, MatchError> {
        let Some(ref query) = locator.query else {
            return Ok(vec![LocatorMatch::whole(text)]);
        };
        let mut found = self
            .query
            .select(query, text)
            .map_err(|e| MatchError::new(e.message, location))?;
        if !locator.multimatch {
            found.truncate(1);
        }
        Ok(found.into_iter().map(LocatorMatch::from_structural).collect())
    }

    fn structural_in_fragment(
        &self,
        locator: &Locator,
        fragment: &str,
        location: &str,
    ) -> Result<Vec<LocatorMatch>, MatchError> {
        let Some(ref query) = locator.query else {
            return Ok(vec![LocatorMatch::whole(fragment)]);
        };
        let mut found = self
            .query
            .select_in_fragment(query, fragment)
            .map_err(|e| MatchError::new(e.message, location))?;
        if !locator.multimatch {
            found.truncate(1);
        }
        Ok(found.into_iter().map(LocatorMatch::from_structural).collect())
    }

    /// Runs the pattern stage.
    #[must_use]
    pub fn pattern(locator: &Locator, input: Vec<LocatorMatch>, multimatch: bool) -> Vec<LocatorMatch> {
        let Some(ref regex) = locator.pattern else {
            return input;
        };
        let mut out = Vec::new();
        for lm in input {
            for pm in apply_pattern(regex, &lm.result, multimatch) {
                let mut m = lm.clone();
                m.result = pm.whole.clone();
                m.pattern = Some(pm);
                out.push(m);
            }
        }
        out
    }

    /// Runs the script stage.
    ///
    /// A failing script is logged and drops the match it ran on.
    pub async fn script(
        &self,
        locator: &Locator,
        input: Vec<LocatorMatch>,
        base: &Scope,
        multimatch: bool,
    ) -> Vec<LocatorMatch> {
        let (Some(script), Some(evaluator)) = (locator.script.as_ref(), self.script.as_ref()) else {
            return input;
        };
        let mut out = Vec::new();
        for lm in input {
            let mut scope = base.clone();
            lm.bind(locator.kind, &mut scope);
            let results = match evaluator.evaluate(script, &scope).await {
                Ok(results) => results,
                Err(e) => {
                    warn!(locator = %locator.kind.prefix(), error = %e, "script evaluation failed");
                    continue;
                }
            };
            let take = if multimatch { results.len() } else { 1 };
            for r in results.into_iter().take(take) {
                let mut m = lm.clone();
                m.script = Some(r.clone());
                m.result = r;
                out.push(m);
            }
        }
        out
    }

    async fn locate(
        &self,
        locator: &Locator,
        structural: Vec<LocatorMatch>,
        base: &Scope,
        multimatch: bool,
    ) -> Vec<LocatorMatch> {
        let matches = Self::pattern(locator, structural, multimatch);
        self.script(locator, matches, base, multimatch).await
    }

    /// Runs the structural content stage and the document-wide label
    /// stage. The remaining content stages run per node in
    /// [`Matcher::expand_node`], so nodes past the last content index are
    /// never evaluated.
    pub async fn content_plan(
        &self,
        chain: &Chain,
        text: &str,
        location: &str,
        base: &Scope,
    ) -> Result<ContentPlan, MatchError> {
        let nodes = self.structural(&chain.content, text, location)?;
        let label = &chain.label;
        let mut labels = Vec::new();
        if chain.has_label_matching && !chain.labels_inside_content {
            let label_nodes = self.structural(label, text, location)?;
            labels = self.locate(label, label_nodes, base, label.multimatch).await;
        }
        Ok(ContentPlan { nodes, labels })
    }

    /// Runs the pattern and script stages on the content node at `index`
    /// and pairs the results with labels.
    #[allow(clippy::too_many_arguments)]
    pub async fn expand_node(
        &self,
        chain: &Chain,
        labels: &[LocatorMatch],
        index: usize,
        node: LocatorMatch,
        location: &str,
        base: &Scope,
    ) -> Result<ContentCandidates, MatchError> {
        let label = &chain.label;
        let mut inner_labels = Vec::new();
        if chain.labels_inside_content && label.query.is_some() {
            let fragment = node.fragment.clone().unwrap_or_default();
            let nodes = self.structural_in_fragment(label, &fragment, location)?;
            inner_labels = self.locate(label, nodes, base, label.multimatch).await;
        }
        let contents = self
            .locate(&chain.content, vec![node], base, chain.content.multimatch)
            .await;

        let mut out = ContentCandidates::default();
        for content in contents {
            let paired = if chain.labels_inside_content {
                let candidates = if label.query.is_some() {
                    inner_labels.clone()
                } else {
                    let whole = LocatorMatch::whole(&content.result);
                    self.locate(label, vec![whole], base, false).await
                };
                candidates.into_iter().next()
            } else if !chain.has_label_matching {
                None
            } else if !label.multimatch {
                labels.first().cloned()
            } else {
                labels.get(index).cloned()
            };
            if chain.has_label_matching && paired.is_none() && !chain.label_allow_missing {
                out.missing_labels += 1;
                continue;
            }
            out.matches.push(ContentMatch {
                content,
                label: paired,
            });
        }
        Ok(out)
    }

    /// Finds every content match of `chain` in a document and pairs them
    /// with labels.
    pub async fn content_matches(
        &self,
        chain: &Chain,
        text: &str,
        location: &str,
        base: &Scope,
    ) -> Result<ContentCandidates, MatchError> {
        let ContentPlan { nodes, labels } = self.content_plan(chain, text, location, base).await?;
        let mut out = ContentCandidates::default();
        for (index, node) in nodes.into_iter().enumerate() {
            let expanded = self
                .expand_node(chain, &labels, index, node, location, base)
                .await?;
            out.matches.extend(expanded.matches);
            out.missing_labels += expanded.missing_labels;
        }
        Ok(out)
    }

    /// Finds the document matches of `chain`, before formatting.
    pub async fn document_matches(
        &self,
        chain: &Chain,
        text: &str,
        location: &str,
        base: &Scope,
    ) -> Result<Vec<LocatorMatch>, MatchError> {
        let nodes = self.structural(&chain.document, text, location)?;
        Ok(self
            .locate(&chain.document, nodes, base, chain.document.multimatch)
            .await)
    }
}
