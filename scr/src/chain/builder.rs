//! Chain set construction.
//!
//! [`ChainSetBuilder`] collects option bindings in command-line order,
//! merges them per chain and compiles the result into immutable
//! [`Chain`]s. All validation happens here, before any document is
//! fetched.

use super::config::ChainConfig;
use super::options::{parse_option_value, split_argument, ChainOption, OptionValue};
use super::spec::{parse_chain_spec, ChainId, ChainScope, ChainSelector};
use super::{
    Chain, EncodingPolicy, IndexBounds, Locator, LocatorKind, OutputFormats, SchemePolicy,
    DEFAULT_CFF, DEFAULT_CPF, DEFAULT_CWF, DEFAULT_ENCODING, DEFAULT_ESCAPE_SEQUENCE,
    DEFAULT_SCHEME,
};
use crate::engine::matcher::{bind_content, bind_filename, GeneralScope, LocatorMatch};
use crate::engine::pattern::compile_pattern;
use crate::engine::query::StructuralQuery;
use crate::errors::ConfigurationError;
use crate::format::{FormatTemplate, Scope, Value};
use std::collections::BTreeSet;
use tracing::debug;

#[derive(Debug, Clone)]
struct Binding {
    scope: ChainScope,
    option: ChainOption,
    value: OptionValue,
    argument: String,
}

/// Collects option bindings and builds the chain set.
#[derive(Debug, Clone, Default)]
pub struct ChainSetBuilder {
    bindings: Vec<Binding>,
    max_referenced: Option<ChainId>,
}

impl ChainSetBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder from chain option arguments.
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Result<Self, ConfigurationError> {
        let mut builder = Self::new();
        for arg in args {
            builder.push_argument(arg.as_ref())?;
        }
        Ok(builder)
    }

    /// Parses and records one `name[chain-spec]=value` argument.
    pub fn push_argument(&mut self, text: &str) -> Result<(), ConfigurationError> {
        let raw = split_argument(text)?;
        let option = ChainOption::from_name(raw.name).ok_or_else(|| {
            ConfigurationError::new(format!("unknown option '{}'", raw.name)).with_argument(text)
        })?;
        let scope = parse_chain_spec(raw.spec, text)?;
        let value = parse_option_value(option, raw.value, text)?;
        self.bind(scope, option, value, text);
        Ok(())
    }

    /// Records a binding.
    pub fn bind(
        &mut self,
        scope: ChainScope,
        option: ChainOption,
        value: OptionValue,
        argument: impl Into<String>,
    ) {
        self.reference(&scope);
        if let OptionValue::Chains(ref sel) = value {
            self.reference_selector(sel);
        }
        self.bindings.push(Binding {
            scope,
            option,
            value,
            argument: argument.into(),
        });
    }

    /// Notes chain ids named outside of option bindings, such as by
    /// initial documents.
    pub fn reference(&mut self, scope: &ChainScope) {
        if let Some(max) = scope.explicit_max() {
            self.max_referenced = Some(self.max_referenced.map_or(max, |m| m.max(max)));
        }
    }

    fn reference_selector(&mut self, sel: &ChainSelector) {
        self.reference(&ChainScope::Selected(sel.clone()));
    }

    /// Number of chains: one more than the largest id named anywhere.
    #[must_use]
    pub fn chain_count(&self) -> usize {
        self.max_referenced.map_or(1, |m| m + 1)
    }

    /// Merges the bindings of every chain.
    ///
    /// For each option the last explicit binding selecting the chain
    /// wins, then the last default binding.
    pub fn resolve(&self) -> Result<Vec<ChainConfig>, ConfigurationError> {
        let mut defaults = ChainConfig::new();
        for b in self.bindings.iter().filter(|b| b.scope.is_defaults()) {
            defaults.apply(b.option, b.value.clone(), &b.argument)?;
        }
        (0..self.chain_count())
            .map(|id| {
                let mut cfg = ChainConfig::new();
                for b in &self.bindings {
                    if !b.scope.is_defaults() && b.scope.contains(id) {
                        cfg.apply(b.option, b.value.clone(), &b.argument)?;
                    }
                }
                cfg.inherit(&defaults);
                Ok(cfg)
            })
            .collect()
    }

    /// Validates and compiles every chain.
    pub fn build(
        &self,
        query: &dyn StructuralQuery,
        script_available: bool,
    ) -> Result<Vec<Chain>, ConfigurationError> {
        let configs = self.resolve()?;
        let count = configs.len();
        let mut chains = Vec::with_capacity(count);
        for (id, cfg) in configs.iter().enumerate() {
            let chain = ChainCompiler {
                id,
                cfg,
                count,
                query,
                script_available,
            }
            .compile()?;
            chains.push(chain);
        }

        for chain in &chains {
            let targeted = chains.iter().any(|other| {
                other.id != chain.id
                    && (other.document_chains.contains(&chain.id)
                        || other.forward_chains.contains(&chain.id))
            });
            if !chain.has_content_matching && !chain.has_document_matching && !targeted {
                return Err(ConfigurationError::new(
                    "chain is unused, it has neither document nor content matching",
                )
                .with_chain(chain.id));
            }
        }
        debug!(chains = chains.len(), "built chain set");
        Ok(chains)
    }
}

struct ChainCompiler<'a> {
    id: ChainId,
    cfg: &'a ChainConfig,
    count: usize,
    query: &'a dyn StructuralQuery,
    script_available: bool,
}

impl ChainCompiler<'_> {
    fn error(&self, message: impl Into<String>, option: Option<ChainOption>) -> ConfigurationError {
        let err = ConfigurationError::new(message).with_chain(self.id);
        match option.and_then(|o| self.cfg.source(o)) {
            Some(arg) => err.with_argument(arg),
            None => err,
        }
    }

    fn attach(&self, err: ConfigurationError, option: ChainOption) -> ConfigurationError {
        let err = if err.chain.is_none() {
            err.with_chain(self.id)
        } else {
            err
        };
        match (err.argument.is_none(), self.cfg.source(option)) {
            (true, Some(arg)) => err.with_argument(arg),
            _ => err,
        }
    }

    fn template(&self, value: Option<&String>, option: ChainOption) -> Result<Option<FormatTemplate>, ConfigurationError> {
        value
            .filter(|v| !v.is_empty())
            .map(|v| FormatTemplate::parse(v).map_err(|e| self.attach(e, option)))
            .transpose()
    }

    #[allow(clippy::too_many_arguments)]
    fn locator(
        &self,
        kind: LocatorKind,
        options: [ChainOption; 4],
        values: [Option<&String>; 4],
        multimatch: Option<bool>,
        interactive: Option<bool>,
    ) -> Result<Locator, ConfigurationError> {
        let [q_opt, r_opt, f_opt, js_opt] = options;
        let [query, pattern, format, script] = values.map(|v| v.filter(|s| !s.is_empty()));
        if let Some(q) = query {
            self.query.validate(q).map_err(|e| self.attach(e, q_opt))?;
        }
        let pattern = pattern
            .map(|p| compile_pattern(p).map_err(|e| self.attach(e, r_opt)))
            .transpose()?;
        if script.is_some() && !self.script_available {
            return Err(self.error("no script evaluator is available", Some(js_opt)));
        }
        Ok(Locator {
            kind,
            query: query.cloned(),
            pattern,
            script: script.cloned(),
            format: self.template(format, f_opt)?,
            multimatch: multimatch.unwrap_or(true),
            interactive: interactive.unwrap_or(false),
        })
    }

    fn selector(&self, sel: Option<&ChainSelector>) -> BTreeSet<ChainId> {
        sel.map(|s| s.resolve(self.count)).unwrap_or_default()
    }

    fn compile(&self) -> Result<Chain, ConfigurationError> {
        use ChainOption as O;
        let c = self.cfg;

        let content = self.locator(
            LocatorKind::Content,
            [O::Cx, O::Cr, O::Cf, O::Cjs],
            [c.cx.as_ref(), c.cr.as_ref(), c.cf.as_ref(), c.cjs.as_ref()],
            c.cmm,
            c.cin,
        )?;
        let label = self.locator(
            LocatorKind::Label,
            [O::Lx, O::Lr, O::Lf, O::Ljs],
            [c.lx.as_ref(), c.lr.as_ref(), c.lf.as_ref(), c.ljs.as_ref()],
            c.lmm,
            c.lin,
        )?;
        let document = self.locator(
            LocatorKind::Document,
            [O::Dx, O::Dr, O::Df, O::Djs],
            [c.dx.as_ref(), c.dr.as_ref(), c.df.as_ref(), c.djs.as_ref()],
            c.dmm,
            c.din,
        )?;

        let content_indices = IndexBounds {
            min: c.cimin.unwrap_or(1),
            max: c.cimax,
        };
        let document_indices = IndexBounds {
            min: c.dimin.unwrap_or(1),
            max: c.dimax,
        };
        if document_indices.max.is_some_and(|max| document_indices.min > max) {
            return Err(self.error("dimin can't exceed dimax", Some(O::Dimin)));
        }
        if content_indices.max.is_some_and(|max| content_indices.min > max) {
            return Err(self.error("cimin can't exceed cimax", Some(O::Cimin)));
        }

        if c.csf.as_deref() == Some("") && c.csin != Some(true) {
            return Err(self.error("csf must not be empty", Some(O::Csf)));
        }
        if c.cwf.is_some() && c.csf.is_none() {
            return Err(self.error("cannot specify cwf without csf", Some(O::Cwf)));
        }
        if c.cshif.is_some() && c.cshf.is_none() {
            return Err(self.error("cannot specify cshif without cshf", Some(O::Cshif)));
        }

        let has_label_matching = label.is_active();
        let has_document_matching = document.is_active();
        let save_interactive = c.csin.unwrap_or(false);
        let has_output = c.cpf.is_some()
            || c.csf.is_some()
            || save_interactive
            || c.cshf.is_some()
            || c.cfc.is_some();
        let has_content_matching = has_label_matching || content.is_active() || has_output;

        let labels_inside_content = c.lic.unwrap_or(false);
        if labels_inside_content && !has_label_matching {
            return Err(self.error("cannot specify lic without lx or lr", Some(O::Lic)));
        }

        let forced_scheme = c.dfsch.unwrap_or(false);
        if forced_scheme && c.dpsch == Some(true) {
            return Err(self.error("conflicting scheme options dfsch and dpsch", Some(O::Dfsch)));
        }

        let default_print = if has_content_matching && !has_output {
            Some(FormatTemplate::parse(DEFAULT_CPF)?)
        } else {
            None
        };
        let save = match self.template(c.csf.as_ref(), O::Csf)? {
            Some(t) => Some(t),
            None if save_interactive => Some(FormatTemplate::parse_unescaped("")?),
            None => None,
        };
        let write = match c.cwf {
            Some(_) => self.template(c.cwf.as_ref(), O::Cwf)?,
            None if save.is_some() => Some(FormatTemplate::parse(DEFAULT_CWF)?),
            None => None,
        };
        let output = OutputFormats {
            print: self.template(c.cpf.as_ref(), O::Cpf)?.or(default_print),
            save,
            write,
            shell: self.template(c.cshf.as_ref(), O::Cshf)?,
            shell_stdin: self.template(c.cshif.as_ref(), O::Cshif)?,
            shell_print: c.cshp.unwrap_or(false),
            overwrite: c.owf.unwrap_or(true),
            save_interactive,
        };

        let need_content = output.references_any(&["c"]);
        let need_label = output.references_any(&["l"]);
        let need_filename = output.references_any(&["fn", "fb", "fe"]);
        let label_allow_missing = c.lam.unwrap_or(false) || !has_label_matching;

        let mut chain = Chain {
            id: self.id,
            has_content_matching,
            has_label_matching,
            has_document_matching,
            content_indices,
            content_index_continuous: c.cicont.unwrap_or(false),
            document_indices,
            content_is_link: c.cl.unwrap_or(false),
            output,
            forward_chains: self.selector(c.cfc.as_ref()),
            forward_format: match self.template(c.cff.as_ref(), O::Cff)? {
                Some(t) => t,
                None => FormatTemplate::parse(DEFAULT_CFF)?,
            },
            document_chains: match c.doc {
                Some(ref sel) => sel.resolve(self.count),
                None => BTreeSet::from([self.id]),
            },
            dedup: c.dd.unwrap_or_default(),
            schemes: SchemePolicy {
                default: c.dsch.clone().unwrap_or_else(|| DEFAULT_SCHEME.to_string()),
                prefer_parent: !forced_scheme && c.dpsch.unwrap_or(c.dsch.is_none()),
                forced: forced_scheme,
            },
            document_encoding: EncodingPolicy {
                default: c.denc.clone().unwrap_or_else(|| DEFAULT_ENCODING.to_string()),
                forced: c.dfenc.unwrap_or(false),
            },
            content_encoding: EncodingPolicy {
                default: c.cienc.clone().unwrap_or_else(|| DEFAULT_ENCODING.to_string()),
                forced: c.cfienc.unwrap_or(false),
            },
            labels_inside_content,
            label_allow_missing,
            label_allow_slashes: c.las.unwrap_or(false),
            label_default_format: None,
            filename_default_format: None,
            escape_sequence: c
                .cesc
                .clone()
                .unwrap_or_else(|| DEFAULT_ESCAPE_SEQUENCE.to_string()),
            need_content,
            need_label,
            need_filename,
            content,
            label,
            document,
        };

        chain.filename_default_format = match self.template(c.fdf.as_ref(), O::Fdf)? {
            Some(t) => Some(t),
            None if need_filename => Some(FormatTemplate::parse_unescaped(&format!(
                "{}.dat",
                default_label_format(&chain)
            ))?),
            None => None,
        };
        chain.label_default_format = match self.template(c.ldf.as_ref(), O::Ldf)? {
            Some(t) => Some(t),
            None if label_allow_missing && need_label => {
                Some(FormatTemplate::parse_unescaped(&default_label_format(&chain))?)
            }
            None => None,
        };

        self.validate_formats(&chain)?;
        Ok(chain)
    }

    fn validate_formats(&self, chain: &Chain) -> Result<(), ConfigurationError> {
        use ChainOption as O;
        let content_scope = dummy_content_scope(chain, true);
        let mut output_scope = content_scope.clone();
        bind_content(Value::Str(String::new()), &mut output_scope);
        if chain.content_is_link {
            bind_filename("", &mut output_scope);
        }
        let mut document_scope = GeneralScope {
            encoding: "",
            location: "",
            di: 0,
            ci: None,
        }
        .to_scope(chain);
        LocatorMatch::shape(&chain.document).bind(LocatorKind::Document, &mut document_scope);

        let checks: [(Option<&FormatTemplate>, &Scope, ChainOption); 11] = [
            (chain.content.format.as_ref(), &content_scope, O::Cf),
            (chain.label.format.as_ref(), &content_scope, O::Lf),
            (chain.document.format.as_ref(), &document_scope, O::Df),
            (chain.output.print.as_ref(), &output_scope, O::Cpf),
            (chain.output.save.as_ref(), &output_scope, O::Csf),
            (chain.output.write.as_ref(), &output_scope, O::Cwf),
            (chain.output.shell.as_ref(), &output_scope, O::Cshf),
            (chain.output.shell_stdin.as_ref(), &output_scope, O::Cshif),
            (Some(&chain.forward_format), &output_scope, O::Cff),
            (chain.filename_default_format.as_ref(), &content_scope, O::Fdf),
            (
                chain.label_default_format.as_ref(),
                &dummy_content_scope(chain, false),
                O::Ldf,
            ),
        ];
        for (template, scope, option) in checks {
            if let Some(t) = template {
                t.validate(scope)
                    .map_err(|e| self.error(e.to_string(), Some(option)))?;
            }
        }
        Ok(())
    }
}

/// Scope shape seen by content-stage templates.
fn dummy_content_scope(chain: &Chain, with_label: bool) -> Scope {
    let mut scope = GeneralScope {
        encoding: "",
        location: "",
        di: 0,
        ci: Some(0),
    }
    .to_scope(chain);
    LocatorMatch::shape(&chain.document).bind(LocatorKind::Document, &mut scope);
    if with_label {
        if chain.has_label_matching {
            LocatorMatch::shape(&chain.label).bind(LocatorKind::Label, &mut scope);
        } else if chain.label_default_format.is_some() {
            LocatorMatch::literal("").bind(LocatorKind::Label, &mut scope);
        }
    }
    LocatorMatch::shape(&chain.content).bind(LocatorKind::Content, &mut scope);
    scope
}

/// `dl_` followed by zero-padded indices, depending on what varies.
fn default_label_format(chain: &Chain) -> String {
    let di_digits = chain.document_indices.digits();
    let ci_digits = chain.content_indices.digits();
    let mut form = String::from("dl_");
    if chain.content_index_continuous {
        form.push_str(&format!("{{ci:0{ci_digits}}}"));
    } else if chain.content.multimatch {
        if chain.has_document_matching {
            form.push_str(&format!("{{di:0{di_digits}}}_{{ci:0{ci_digits}}}"));
        } else {
            form.push_str(&format!("{{ci:0{ci_digits}}}"));
        }
    } else if chain.has_document_matching {
        form.push_str(&format!("{{di:0{di_digits}}}"));
    }
    form
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::DedupPolicy;
    use crate::engine::query::CssQueryEngine;
    use pretty_assertions::assert_eq;

    fn build(args: &[&str]) -> Result<Vec<Chain>, ConfigurationError> {
        ChainSetBuilder::from_args(args)?.build(&CssQueryEngine::new(), false)
    }

    #[test]
    fn test_single_default_chain() {
        let chains = build(&["cx=p::text"]).unwrap();
        assert_eq!(chains.len(), 1);
        let chain = &chains[0];
        assert!(chain.has_content_matching);
        assert!(!chain.has_document_matching);
        assert_eq!(chain.output.print.as_ref().unwrap().source(), "{c}\n");
        assert_eq!(chain.document_chains, BTreeSet::from([0]));
        assert_eq!(chain.dedup, DedupPolicy::Unique);
        assert!(chain.need_content);
    }

    #[test]
    fn test_chain_count_from_selectors_and_values() {
        let chains = build(&["cx=p", "dx0=a::attr(href)", "doc0=2"]).unwrap();
        assert_eq!(chains.len(), 3);
        assert_eq!(chains[0].document_chains, BTreeSet::from([2]));
    }

    #[test]
    fn test_last_explicit_binding_wins_over_defaults() {
        let builder =
            ChainSetBuilder::from_args(&["cr1=x", "cr=d1", "cr0-1=y", "cr=d2", "cx2=p"]).unwrap();
        let configs = builder.resolve().unwrap();
        assert_eq!(configs[0].cr.as_deref(), Some("y"));
        assert_eq!(configs[1].cr.as_deref(), Some("y"));
        assert_eq!(configs[2].cr.as_deref(), Some("d2"));
    }

    #[test]
    fn test_resolve_rejects_mistyped_binding() {
        let mut builder = ChainSetBuilder::new();
        builder.bind(ChainScope::Defaults, ChainOption::Cimax, OptionValue::Bool(true), "cimax");
        let err = builder.resolve().unwrap_err();
        assert_eq!(err.argument.as_deref(), Some("cimax"));
        assert!(builder.build(&CssQueryEngine::new(), false).is_err());
    }

    #[test]
    fn test_open_range_applies_to_later_chains() {
        let builder = ChainSetBuilder::from_args(&["cmm1-=no", "cx3=p"]).unwrap();
        let configs = builder.resolve().unwrap();
        assert_eq!(configs[0].cmm, None);
        assert_eq!(configs[3].cmm, Some(false));
    }

    #[test]
    fn test_invalid_regex_names_argument() {
        let err = build(&["cr=("]).unwrap_err();
        assert!(err.message.starts_with("invalid regex"));
        assert_eq!(err.argument.as_deref(), Some("cr=("));
        assert_eq!(err.chain, Some(0));
    }

    #[test]
    fn test_invalid_query() {
        assert!(build(&["cx=a["]).is_err());
    }

    #[test]
    fn test_index_bounds_validation() {
        assert!(build(&["cx=p", "dimin=3", "dimax=2"]).is_err());
        assert!(build(&["cx=p", "cimin=3", "cimax=2"]).is_err());
        assert!(build(&["cx=p", "cimin=2", "cimax=2"]).is_ok());
    }

    #[test]
    fn test_output_dependencies() {
        let err = build(&["cx=p", "cwf={c}"]).unwrap_err();
        assert!(err.message.contains("cwf without csf"));
        let err = build(&["cx=p", "cshif={c}"]).unwrap_err();
        assert!(err.message.contains("cshif without cshf"));
        assert!(build(&["cx=p", "csf="]).is_err());
    }

    #[test]
    fn test_save_gets_default_write_format() {
        let chains = build(&["cx=p", "csf=out/{ci}.txt"]).unwrap();
        let chain = &chains[0];
        assert!(chain.output.print.is_none());
        assert_eq!(chain.output.write.as_ref().unwrap().source(), "{c}");
    }

    #[test]
    fn test_interactive_save_without_path() {
        let chains = build(&["cx=p", "csin"]).unwrap();
        let output = &chains[0].output;
        assert!(output.save_interactive);
        assert_eq!(output.save.as_ref().unwrap().source(), "");
        assert!(output.print.is_none());
        assert!(chains[0].need_content);
        assert!(build(&["cx=p", "csf=", "csin"]).is_ok());
        assert!(build(&["cx=p", "csf="]).is_err());
    }

    #[test]
    fn test_lic_requires_label_matching() {
        let err = build(&["cx=p", "lic"]).unwrap_err();
        assert!(err.message.contains("lic without lx or lr"));
        assert!(build(&["cx=li", "lx=span", "lic"]).is_ok());
    }

    #[test]
    fn test_conflicting_schemes() {
        assert!(build(&["dx=a", "dfsch", "dpsch=yes"]).is_err());
        let chains = build(&["dx=a", "dsch=http"]).unwrap();
        assert!(!chains[0].schemes.prefer_parent);
        let chains = build(&["dx=a"]).unwrap();
        assert!(chains[0].schemes.prefer_parent);
    }

    #[test]
    fn test_script_requires_evaluator() {
        let err = build(&["cjs=return 1"]).unwrap_err();
        assert_eq!(err.argument.as_deref(), Some("cjs=return 1"));
        let chains = ChainSetBuilder::from_args(&["cjs=return 1"])
            .unwrap()
            .build(&CssQueryEngine::new(), true)
            .unwrap();
        assert!(chains[0].content.script.is_some());
    }

    #[test]
    fn test_unused_chain() {
        let err = build(&["cx1=p"]).unwrap_err();
        assert_eq!(err.chain, Some(0));
        assert!(err.message.contains("unused"));
        // a chain only receiving documents from another one is in use
        assert!(build(&["dx0=a", "doc0=1", "cx1=p"]).is_ok());
    }

    #[test]
    fn test_unavailable_placeholder() {
        let err = build(&["cx=p", "cf={cm}{nope}"]).unwrap_err();
        assert!(err.message.contains("'{nope}'"));
        assert_eq!(err.argument.as_deref(), Some("cf={cm}{nope}"));
        // filename keys only exist for content links
        assert!(build(&["cx=a", "cpf={fn}"]).is_err());
        assert!(build(&["cx=a", "cl", "cpf={fn}"]).is_ok());
        // named groups are bound
        assert!(build(&["cr=(?P<year>\\d+)", "cpf={year} {cg1}\\n"]).is_ok());
        // the content index does not exist for document formats
        assert!(build(&["dx=a", "df={ci}"]).is_err());
    }

    #[test]
    fn test_default_label_format() {
        let chains = build(&["cx=p", "dx=a", "csf={l}.txt"]).unwrap();
        assert_eq!(
            chains[0].label_default_format.as_ref().unwrap().source(),
            "dl_{di:03}_{ci:03}"
        );
        let chains = build(&["cx=a", "cl", "cmm=no", "cimax=20", "csf={fn}"]).unwrap();
        assert_eq!(
            chains[0].filename_default_format.as_ref().unwrap().source(),
            "dl_.dat"
        );
    }

    #[test]
    fn test_unknown_option() {
        let err = ChainSetBuilder::from_args(&["cq=1"]).unwrap_err();
        assert_eq!(err.argument.as_deref(), Some("cq=1"));
    }

    #[test]
    fn test_forwarding_makes_content_active() {
        let chains = build(&["cfc=1", "cx1=p"]).unwrap();
        assert!(chains[0].has_content_matching);
        assert!(chains[0].output.print.is_none());
        assert_eq!(chains[0].forward_chains, BTreeSet::from([1]));
        assert_eq!(chains[0].forward_format.source(), "{c}");
    }
}
