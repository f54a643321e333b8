//! Content match finalization.
//!
//! Once a content match has an index it is formatted, labelled,
//! confirmed, resolved (content links are fetched), written to the
//! outputs and finally forwarded.

use super::controller::{Decision, Pending, Run, Visit};
use super::forward::forward_document;
use crate::chain::{Chain, ChainId, DedupPolicy, LocatorKind};
use crate::document::{normalize_link, Document, DocumentKind, NodeId};
use crate::engine::matcher::{bind_content, bind_filename};
use crate::engine::{ContentMatch, ContentPlan, LocatorMatch, PromptKind};
use crate::errors::{FetchError, FormatError, MatchError, ScrError};
use crate::events::EventKind;
use crate::fetch::{filename_from_url, FetchRequest, FetchedDocument};
use crate::format::{Scope, Value};
use crate::index::{IndexGrant, IndexKind};
use serde_json::json;
use std::path::Path;
use tracing::{debug, warn};

/// What the controller does after a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Flow {
    /// Keep going.
    Continue,
    /// Stop the chain for the current document.
    SkipChain,
    /// Stop every chain for the current document.
    SkipDocument,
}

/// Every output of one content match, rendered up front so a template
/// failure produces no partial output.
#[derive(Debug, Default)]
pub(super) struct RenderedOutputs {
    pub(super) print: Option<Vec<u8>>,
    pub(super) save: Option<(String, Vec<u8>)>,
    pub(super) shell: Option<(String, Option<Vec<u8>>)>,
    pub(super) forward: Option<String>,
}

/// A content match that passed every prompt, waiting for its outputs.
///
/// Content links are fetched through the pool; the match is completed
/// when the fetch comes back.
#[derive(Debug)]
pub(super) struct PendingContent {
    chain: ChainId,
    di: i64,
    ci: i64,
    scope: Scope,
    link: Option<String>,
    link_kind: DocumentKind,
    label: Option<String>,
    source: Document,
    source_id: NodeId,
}

/// Renders the output and forwarding templates of `chain`.
pub(super) fn render_outputs(chain: &Chain, scope: &Scope) -> Result<RenderedOutputs, FormatError> {
    let out = &chain.output;
    let print = out.print.as_ref().map(|t| t.render_bytes(scope)).transpose()?;
    let save = match out.save {
        Some(ref path) => {
            let data = match out.write {
                Some(ref w) => w.render_bytes(scope)?,
                None => Vec::new(),
            };
            Some((path.render(scope)?, data))
        }
        None => None,
    };
    let shell = match out.shell {
        Some(ref cmd) => {
            let stdin = out.shell_stdin.as_ref().map(|t| t.render_bytes(scope)).transpose()?;
            Some((cmd.render(scope)?, stdin))
        }
        None => None,
    };
    let forward = if chain.forwards_content() {
        Some(chain.forward_format.render(scope)?)
    } else {
        None
    };
    Ok(RenderedOutputs {
        print,
        save,
        shell,
        forward,
    })
}

/// Filename of a content link when the fetch suggested none.
fn link_filename(link: &str, kind: DocumentKind) -> Option<String> {
    if kind == DocumentKind::File {
        return Path::new(link)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
    }
    filename_from_url(link)
}

impl Run<'_> {
    /// Assigns content indices to the matches of `chain` and finalizes
    /// them in document order.
    ///
    /// A content node only reaches the pattern and script stages while
    /// the chain still has a content index left.
    pub(super) async fn visit_contents(
        &mut self,
        chain: &Chain,
        di: i64,
        base: &Scope,
        visit: &mut Visit<'_>,
    ) -> Result<Flow, ScrError> {
        if !self.registry.has_next(chain.id, IndexKind::Content) {
            return Ok(Flow::Continue);
        }
        let location = visit.doc.location.clone();
        let ContentPlan { nodes, labels } = match self
            .matcher
            .content_plan(chain, &visit.text, &location, base)
            .await
        {
            Ok(plan) => plan,
            Err(e) => {
                self.match_failure(chain, visit, &e).await;
                return Ok(Flow::Continue);
            }
        };

        let mut missing_labels = 0;
        let mut flow = Flow::Continue;
        'nodes: for (index, node) in nodes.into_iter().enumerate() {
            if self.crawler.cancellation.is_cancelled() {
                flow = Flow::SkipDocument;
                break;
            }
            if !self.registry.has_next(chain.id, IndexKind::Content) {
                debug!(chain = chain.id, "content index exhausted");
                break;
            }
            let candidates = match self
                .matcher
                .expand_node(chain, &labels, index, node, &location, base)
                .await
            {
                Ok(candidates) => candidates,
                Err(e) => {
                    self.match_failure(chain, visit, &e).await;
                    break;
                }
            };
            missing_labels += candidates.missing_labels;
            for candidate in candidates.matches {
                let ci = match self.registry.next_index(chain.id, IndexKind::Content) {
                    IndexGrant::Issued(ci) => ci,
                    IndexGrant::Exhausted => {
                        debug!(chain = chain.id, "content index exhausted");
                        break 'nodes;
                    }
                };
                flow = self.finalize_content(chain, di, ci, candidate, base, visit).await?;
                if flow != Flow::Continue {
                    break 'nodes;
                }
            }
        }

        if missing_labels > 0 {
            debug!(chain = chain.id, count = missing_labels, "content without label dropped");
            self.skip_event(
                chain,
                &visit.doc.location,
                json!({"reason": "missing label", "count": missing_labels}),
            )
            .await;
        }
        Ok(flow)
    }

    async fn match_failure(&self, chain: &Chain, visit: &Visit<'_>, error: &MatchError) {
        warn!(chain = chain.id, location = %visit.doc.location, error = %error, "content matching failed");
        self.skip_event(
            chain,
            &visit.doc.location,
            json!({"reason": "match", "error": error.to_string()}),
        )
        .await;
    }

    pub(super) async fn skip_event(&self, chain: &Chain, location: &str, data: serde_json::Value) {
        self.emit(
            self.event(EventKind::MatchSkipped)
                .with_chain(chain.id)
                .with_location(location)
                .with_data(data),
        )
        .await;
    }

    /// Formats, labels and confirms one content match, then hands it to
    /// [`Run::complete_content`], directly or once its content link has
    /// been fetched by the pool.
    #[allow(clippy::too_many_lines)]
    async fn finalize_content(
        &mut self,
        chain: &Chain,
        di: i64,
        ci: i64,
        candidate: ContentMatch,
        base: &Scope,
        visit: &mut Visit<'_>,
    ) -> Result<Flow, ScrError> {
        let location = visit.doc.location.clone();
        let ContentMatch { mut content, label } = candidate;
        let context = chain.index_context(di, ci);
        let mut scope = base.clone();
        scope.insert("ci", ci);
        content.bind(LocatorKind::Content, &mut scope);

        let mut label = match label {
            Some(mut l) => {
                l.bind(LocatorKind::Label, &mut scope);
                if let Err(e) = l.apply_format(&chain.label, &scope) {
                    self.format_failure(chain, &location, &e).await;
                    return Ok(Flow::Continue);
                }
                Some(l)
            }
            None => match chain.label_default_format {
                Some(ref ldf) => match ldf.render(&scope) {
                    Ok(value) => Some(LocatorMatch::literal(value)),
                    Err(e) => {
                        self.format_failure(chain, &location, &e).await;
                        return Ok(Flow::Continue);
                    }
                },
                None => None,
            },
        };
        if let Some(ref l) = label {
            l.bind(LocatorKind::Label, &mut scope);
        }
        if let Err(e) = content.apply_format(&chain.content, &scope) {
            self.format_failure(chain, &location, &e).await;
            return Ok(Flow::Continue);
        }

        let mut link = chain
            .content_is_link
            .then(|| normalize_link(&content.result, &visit.doc.link_base, &chain.schemes));
        if chain.content.interactive {
            let (value, multiline) = match link {
                Some(ref link) => (link.clone(), false),
                None => (content.result.clone(), true),
            };
            match self
                .confirm(PromptKind::Content, chain, &location, &value, context.clone(), multiline)
                .await?
            {
                Decision::Keep(None) => {}
                Decision::Keep(Some(edited)) if link.is_some() => link = Some(edited),
                Decision::Keep(Some(edited)) => content = LocatorMatch::literal(edited),
                Decision::Drop => {
                    debug!(chain = chain.id, ci, "content rejected");
                    self.skip_event(chain, &location, json!({"reason": "rejected", "ci": ci}))
                        .await;
                    return Ok(Flow::Continue);
                }
                Decision::SkipChain => return Ok(Flow::SkipChain),
                Decision::SkipDocument => return Ok(Flow::SkipDocument),
            }
        }

        if chain.label.interactive {
            if let Some(ref l) = label {
                match self
                    .confirm(PromptKind::Label, chain, &location, &l.result, context.clone(), false)
                    .await?
                {
                    Decision::Keep(None) => {}
                    Decision::Keep(Some(edited)) => label = Some(LocatorMatch::literal(edited)),
                    Decision::Drop => {
                        self.skip_event(chain, &location, json!({"reason": "rejected label", "ci": ci}))
                            .await;
                        return Ok(Flow::Continue);
                    }
                    Decision::SkipChain => return Ok(Flow::SkipChain),
                    Decision::SkipDocument => return Ok(Flow::SkipDocument),
                }
            }
        }
        if let Some(ref l) = label {
            if !chain.is_valid_label(&l.result) {
                warn!(chain = chain.id, label = %l.result, "label contains a path separator, match skipped");
                self.skip_event(chain, &location, json!({"reason": "label", "label": l.result}))
                    .await;
                return Ok(Flow::Continue);
            }
            l.bind(LocatorKind::Label, &mut scope);
        }
        content.bind(LocatorKind::Content, &mut scope);
        if link.is_none() {
            bind_content(Value::Str(content.result.clone()), &mut scope);
        }

        let fetch_content = link.is_some()
            && (chain.need_content
                || (chain.forwards_content() && chain.forward_format.references("c")));
        let link_kind = visit.doc.link_base.kind;
        let pending = PendingContent {
            chain: chain.id,
            di,
            ci,
            scope,
            link,
            link_kind,
            label: label.map(|l| l.result),
            source: visit.doc.clone(),
            source_id: visit.id,
        };
        if !fetch_content {
            return self.settle(pending, None, visit).await;
        }

        let request = FetchRequest::link(link_kind, pending.link.clone().unwrap_or_default());
        if self.pool.is_inline() {
            let fetched = self.pool.fetch_direct(&request).await;
            return self.settle(pending, Some(fetched), visit).await;
        }
        let ticket = self.pool.submit(request);
        debug!(chain = chain.id, ci, ticket, "content link submitted");
        self.pending.insert(ticket, Pending::Content(Box::new(pending)));
        Ok(Flow::Continue)
    }

    async fn settle(
        &mut self,
        pending: PendingContent,
        fetched: Option<Result<FetchedDocument, FetchError>>,
        visit: &mut Visit<'_>,
    ) -> Result<Flow, ScrError> {
        let (flow, forwarded) = self.complete_content(pending, fetched).await?;
        visit.discovered.extend(forwarded);
        Ok(flow)
    }

    /// Binds the fetched content link, renders and writes the outputs and
    /// forwards the content.
    ///
    /// Returns the flow requested at the save path prompt and the
    /// forwarded document, if any.
    #[allow(clippy::too_many_lines)]
    pub(super) async fn complete_content(
        &mut self,
        pending: PendingContent,
        fetched: Option<Result<FetchedDocument, FetchError>>,
    ) -> Result<(Flow, Option<(Document, DedupPolicy)>), ScrError> {
        let crawler = self.crawler;
        let chain = &crawler.chains[pending.chain];
        let PendingContent {
            di,
            ci,
            mut scope,
            link,
            link_kind,
            label,
            source,
            source_id,
            ..
        } = pending;
        let location = source.location.as_str();

        if let Some(link) = link {
            let mut filename = None;
            match fetched {
                Some(Ok(fetched)) => {
                    let encoding = chain
                        .content_encoding
                        .resolve(fetched.declared_encoding.as_deref());
                    scope.insert("cenc", encoding);
                    filename = fetched.filename;
                    bind_content(Value::Bytes(fetched.bytes), &mut scope);
                }
                Some(Err(e)) => {
                    self.fetch_failure(Some(chain.id), &e).await;
                    return Ok((Flow::Continue, None));
                }
                None => bind_content(Value::Str(link.clone()), &mut scope),
            }
            if chain.need_filename {
                let name = match filename.or_else(|| link_filename(&link, link_kind)) {
                    Some(name) => name,
                    None => match chain.filename_default_format {
                        Some(ref fdf) => match fdf.render(&scope) {
                            Ok(name) => name,
                            Err(e) => {
                                self.format_failure(chain, location, &e).await;
                                return Ok((Flow::Continue, None));
                            }
                        },
                        None => String::new(),
                    },
                };
                bind_filename(&name, &mut scope);
            }
        }

        let mut rendered = match render_outputs(chain, &scope) {
            Ok(rendered) => rendered,
            Err(e) => {
                self.format_failure(chain, location, &e).await;
                return Ok((Flow::Continue, None));
            }
        };
        if chain.output.save_interactive {
            if let Some((ref mut path, _)) = rendered.save {
                let context = chain.index_context(di, ci);
                match self
                    .confirm(PromptKind::SavePath, chain, location, path.as_str(), context, false)
                    .await?
                {
                    Decision::Keep(None) => {}
                    Decision::Keep(Some(edited)) => *path = edited,
                    Decision::Drop => {
                        self.skip_event(chain, location, json!({"reason": "rejected save path", "ci": ci}))
                            .await;
                        return Ok((Flow::Continue, None));
                    }
                    Decision::SkipChain => return Ok((Flow::SkipChain, None)),
                    Decision::SkipDocument => return Ok((Flow::SkipDocument, None)),
                }
            }
        }
        if rendered.save.as_ref().is_some_and(|(path, _)| path.trim().is_empty()) {
            warn!(chain = chain.id, ci, "empty save path, content not saved");
            self.summary.output_failures += 1;
            rendered.save = None;
        }
        self.write_outputs(chain, rendered.print, rendered.save, rendered.shell)
            .await;

        let mut forwarded = None;
        if let Some(text) = rendered.forward {
            let doc = forward_document(text, chain, &source, source_id);
            debug!(chain = chain.id, targets = ?chain.forward_chains, "content forwarded");
            self.summary.contents_forwarded += 1;
            self.emit(
                self.event(EventKind::ContentForwarded)
                    .with_chain(chain.id)
                    .with_location(location)
                    .with_data(json!({"di": di, "ci": ci, "targets": chain.forward_chains})),
            )
            .await;
            forwarded = Some((doc, chain.dedup));
        }

        self.summary.contents_finalized += 1;
        debug!(chain = chain.id, location = %location, di, ci, "content finalized");
        self.emit(
            self.event(EventKind::ContentFinalized)
                .with_chain(chain.id)
                .with_location(location)
                .with_data(json!({
                    "di": di,
                    "ci": ci,
                    "label": label,
                })),
        )
        .await;
        Ok((Flow::Continue, forwarded))
    }

    async fn write_outputs(
        &mut self,
        chain: &Chain,
        print: Option<Vec<u8>>,
        save: Option<(String, Vec<u8>)>,
        shell: Option<(String, Option<Vec<u8>>)>,
    ) {
        let sink = &self.crawler.output;
        let mut failures = Vec::new();
        if let Some(data) = print {
            if let Err(e) = sink.print(&data).await {
                failures.push(e);
            }
        }
        if let Some((path, data)) = save {
            if let Err(e) = sink.save(Path::new(&path), &data, chain.output.overwrite).await {
                failures.push(e);
            }
        }
        if let Some((command, stdin)) = shell {
            if let Err(e) = sink
                .shell(&command, stdin.as_deref(), chain.output.shell_print)
                .await
            {
                failures.push(e);
            }
        }
        for e in failures {
            warn!(chain = chain.id, error = %e, "output failed");
            self.summary.output_failures += 1;
        }
    }
}
