//! The traversal controller.
//!
//! [`Crawler::run`] owns every piece of mutable run state: the frontier,
//! the index registry, the dedup arena and the table of pending fetches.
//! Only fetches leave the controller task.

use super::content::{Flow, PendingContent};
use super::frontier::Frontier;
use crate::cancellation::CancellationToken;
use crate::chain::{Chain, ChainId, DedupPolicy, LocatorKind, DEFAULT_ENCODING};
use crate::config::RunConfig;
use crate::document::{normalize_link, Document, DocumentKind, LinkBase, NodeId};
use crate::engine::{
    AutoAccept, GeneralScope, Interaction, Matcher, Prompt, PromptKind,
    PromptResponse, ScriptEvaluator, StructuralQuery,
};
use crate::errors::{ConfigurationError, FetchError, FormatError, ScrError};
use crate::events::{EventKind, EventSink, NoOpEventSink, ScrEvent};
use crate::fetch::{encoding, DocumentFetcher, FetchPool, FetchRequest, FetchTicket, FetchedDocument, Fetcher};
use crate::index::{IndexGrant, IndexKind, IndexRegistry};
use crate::observability::SpanTimer;
use crate::output::{OutputSink, StandardOutputSink};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Counts reported when a run ends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Documents fetched and matched.
    pub documents_fetched: usize,
    /// Documents dropped because no chain needed them.
    pub documents_skipped: usize,
    /// Content matches that reached the outputs.
    pub contents_finalized: usize,
    /// Content matches forwarded as virtual documents.
    pub contents_forwarded: usize,
    /// Failed document and content link fetches.
    pub fetch_failures: usize,
    /// Matches dropped because a template could not be rendered.
    pub format_failures: usize,
    /// Failed prints, saves and shell commands.
    pub output_failures: usize,
    /// The run stopped early on cancellation or abort.
    pub cancelled: bool,
}

impl RunSummary {
    /// Returns whether any recoverable error occurred.
    #[must_use]
    pub const fn has_failures(&self) -> bool {
        self.fetch_failures + self.format_failures + self.output_failures > 0
    }

    /// Process exit status for the run.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        if self.has_failures() {
            1
        } else {
            0
        }
    }
}

/// Runs chains over a document graph.
#[derive(Debug)]
pub struct Crawler {
    pub(super) chains: Vec<Chain>,
    pub(super) config: RunConfig,
    pub(super) fetcher: Arc<dyn Fetcher>,
    pub(super) interaction: Arc<dyn Interaction>,
    pub(super) output: Arc<dyn OutputSink>,
    pub(super) events: Arc<dyn EventSink>,
    pub(super) cancellation: Arc<CancellationToken>,
    query: Arc<dyn StructuralQuery>,
    script: Option<Arc<dyn ScriptEvaluator>>,
}

impl Crawler {
    /// Creates a crawler with the shipped collaborators.
    ///
    /// The default fetcher has no HTTP client; see
    /// [`Crawler::with_fetcher`]. Queries run in the language named by
    /// `config`.
    #[must_use]
    pub fn new(chains: Vec<Chain>, config: RunConfig) -> Self {
        let query = config.query_language.engine();
        Self {
            chains,
            config,
            fetcher: Arc::new(DocumentFetcher::default()),
            interaction: Arc::new(AutoAccept),
            output: Arc::new(StandardOutputSink::new()),
            events: Arc::new(NoOpEventSink),
            cancellation: Arc::new(CancellationToken::new()),
            query,
            script: None,
        }
    }

    /// Sets the fetcher.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Sets the prompt used by interactive locators.
    #[must_use]
    pub fn with_interaction(mut self, interaction: Arc<dyn Interaction>) -> Self {
        self.interaction = interaction;
        self
    }

    /// Sets where finalized content goes.
    #[must_use]
    pub fn with_output(mut self, output: Arc<dyn OutputSink>) -> Self {
        self.output = output;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Shares a cancellation token with the caller.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancellation = token;
        self
    }

    /// Sets the structural query engine.
    #[must_use]
    pub fn with_query_engine(mut self, query: Arc<dyn StructuralQuery>) -> Self {
        self.query = query;
        self
    }

    /// Sets the script evaluator.
    #[must_use]
    pub fn with_script_evaluator(mut self, script: Arc<dyn ScriptEvaluator>) -> Self {
        self.script = Some(script);
        self
    }

    /// The compiled chains.
    #[must_use]
    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    /// The cancellation token of the crawler.
    #[must_use]
    pub fn cancellation(&self) -> Arc<CancellationToken> {
        Arc::clone(&self.cancellation)
    }

    /// Runs every chain starting from `initial`.
    ///
    /// Failing to fetch an initial document is fatal. Everything that
    /// goes wrong with discovered documents and single matches is logged,
    /// counted in the summary and skipped.
    pub async fn run(&self, initial: Vec<Document>) -> Result<RunSummary, ScrError> {
        if self.chains.is_empty() {
            return Err(ConfigurationError::new("no chains configured").into());
        }
        if initial.is_empty() {
            return Err(ConfigurationError::new("no initial documents").into());
        }

        let timer = SpanTimer::start("run");
        let mut run = Run::new(self);
        info!(
            run_id = %run.run_id,
            chains = self.chains.len(),
            documents = initial.len(),
            workers = self.config.max_fetch_workers,
            "run started"
        );
        run.emit(run.event(EventKind::RunStarted).with_data(json!({
            "chains": self.chains.len(),
            "documents": initial.len(),
            "bfs": self.config.bfs,
        })))
        .await;

        let mut ids = Vec::with_capacity(initial.len());
        for mut doc in initial {
            doc.consumers.retain(|c| *c < self.chains.len());
            if let Some(first) = doc.consumers.first() {
                doc.encoding = self.chains[*first].document_encoding.clone();
            }
            if let Some(id) = run.frontier.admit(doc, DedupPolicy::Allowed) {
                ids.push(id);
            }
        }
        run.frontier.enqueue(&ids);

        let outcome = run.drive().await;
        run.pool.shutdown();
        run.pending.clear();
        match outcome {
            Ok(()) => {}
            Err(ScrError::InteractionAbort(reason)) => {
                info!(reason = %reason, "run aborted");
                run.summary.cancelled = true;
            }
            Err(e) => {
                error!(error = %e, "run failed");
                return Err(e);
            }
        }

        let summary = run.summary.clone();
        info!(
            duration_ms = timer.elapsed_ms(),
            fetched = summary.documents_fetched,
            finalized = summary.contents_finalized,
            "run completed"
        );
        run.emit(
            run.event(EventKind::RunCompleted)
                .with_data(serde_json::to_value(&summary).unwrap_or_default()),
        )
        .await;
        Ok(summary)
    }
}

/// A document being matched by its consumer chains.
#[derive(Debug)]
pub(super) struct Visit<'d> {
    pub(super) id: NodeId,
    pub(super) doc: &'d Document,
    pub(super) text: String,
    pub(super) encoding: String,
    /// Undecoded bytes and declared encoding of an initial document,
    /// kept so every consumer chain decodes it with its own policy.
    pub(super) raw: Option<(Vec<u8>, Option<String>)>,
    pub(super) discovered: Vec<(Document, DedupPolicy)>,
    pub(super) skip_document: bool,
}

/// The outcome of a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Decision {
    /// Keep the match, optionally with an edited value.
    Keep(Option<String>),
    /// Drop the match.
    Drop,
    /// Stop the chain for this document.
    SkipChain,
    /// Stop every chain for this document.
    SkipDocument,
}

/// A fetch waiting in the pool.
#[derive(Debug)]
pub(super) enum Pending {
    /// A document to match once fetched.
    Document(NodeId, Document),
    /// A content match waiting for its content link.
    Content(Box<PendingContent>),
}

/// Mutable state of one run.
pub(super) struct Run<'a> {
    pub(super) crawler: &'a Crawler,
    pub(super) run_id: Uuid,
    pub(super) matcher: Matcher,
    pub(super) frontier: Frontier,
    pub(super) registry: IndexRegistry,
    pub(super) pool: FetchPool,
    pub(super) pending: HashMap<FetchTicket, Pending>,
    pub(super) exhausted: Vec<bool>,
    pub(super) summary: RunSummary,
}

impl<'a> Run<'a> {
    fn new(crawler: &'a Crawler) -> Self {
        Self {
            crawler,
            run_id: Uuid::now_v7(),
            matcher: Matcher::new(Arc::clone(&crawler.query), crawler.script.clone()),
            frontier: Frontier::new(crawler.config.order()),
            registry: IndexRegistry::new(&crawler.chains),
            pool: FetchPool::new(Arc::clone(&crawler.fetcher), crawler.config.max_fetch_workers),
            pending: HashMap::new(),
            exhausted: vec![false; crawler.chains.len()],
            summary: RunSummary::default(),
        }
    }

    pub(super) fn event(&self, kind: EventKind) -> ScrEvent {
        ScrEvent::new(kind, self.run_id)
    }

    pub(super) async fn emit(&self, event: ScrEvent) {
        self.crawler.events.emit(&event).await;
    }

    /// Returns whether `chain` can still do anything.
    fn chain_active(&self, chain: ChainId) -> bool {
        let Some(c) = self.crawler.chains.get(chain) else {
            return false;
        };
        if !self.registry.has_next(chain, IndexKind::Document) {
            return false;
        }
        let content = c.has_content_matching
            && (!c.content_index_continuous || self.registry.has_next(chain, IndexKind::Content));
        content || c.has_document_matching
    }

    async fn refresh_exhaustion(&mut self) {
        for id in 0..self.exhausted.len() {
            if self.exhausted[id] || self.chain_active(id) {
                continue;
            }
            self.exhausted[id] = true;
            info!(chain = id, "chain exhausted");
            self.emit(self.event(EventKind::ChainExhausted).with_chain(id)).await;
        }
    }

    fn next_document(&mut self) -> Option<(NodeId, Document)> {
        while let Some((id, doc)) = self.frontier.pop() {
            if doc.consumers.iter().any(|&c| self.chain_active(c)) {
                return Some((id, doc));
            }
            self.summary.documents_skipped += 1;
            debug!(location = %doc.location, "no chain needs the document, skipped");
        }
        None
    }

    async fn drive(&mut self) -> Result<(), ScrError> {
        loop {
            if self.crawler.cancellation.is_cancelled() {
                self.summary.cancelled = true;
                info!(reason = ?self.crawler.cancellation.reason(), "run cancelled");
                return Ok(());
            }
            if self.exhausted.iter().all(|e| *e) {
                self.pending.retain(|_, p| matches!(p, Pending::Content(_)));
                if self.pending.is_empty() {
                    debug!("every chain is exhausted");
                    return Ok(());
                }
            }

            if self.pool.is_inline() {
                let Some((id, doc)) = self.next_document() else {
                    return Ok(());
                };
                let request = FetchRequest::for_document(&doc);
                let fetched = tokio::select! {
                    fetched = self.pool.fetch_direct(&request) => fetched,
                    () = self.crawler.cancellation.cancelled() => continue,
                };
                self.process(id, doc, fetched).await?;
                continue;
            }

            while self.pool.has_capacity() && !self.exhausted.iter().all(|e| *e) {
                let Some((id, doc)) = self.next_document() else {
                    break;
                };
                let ticket = self.pool.submit(FetchRequest::for_document(&doc));
                self.pending.insert(ticket, Pending::Document(id, doc));
            }
            if self.pool.in_flight() == 0 {
                return Ok(());
            }
            let completion = tokio::select! {
                completion = self.pool.next_completion() => completion,
                () = self.crawler.cancellation.cancelled() => continue,
            };
            let Some(completion) = completion else {
                continue;
            };
            match self.pending.remove(&completion.ticket) {
                Some(Pending::Document(id, doc)) => self.process(id, doc, completion.result).await?,
                Some(Pending::Content(content)) => {
                    // Prompt flow no longer applies, the source document was already visited.
                    let (_, forwarded) = self.complete_content(*content, Some(completion.result)).await?;
                    self.enqueue_discovered(forwarded.into_iter().collect()).await;
                    self.refresh_exhaustion().await;
                }
                None => {}
            }
        }
    }

    async fn process(
        &mut self,
        id: NodeId,
        doc: Document,
        fetched: Result<FetchedDocument, FetchError>,
    ) -> Result<(), ScrError> {
        let fetched = match fetched {
            Ok(fetched) => fetched,
            Err(e) if doc.origin_chain.is_none() => {
                error!(location = %doc.location, error = %e, "failed to fetch initial document");
                return Err(e.into());
            }
            Err(e) => {
                self.fetch_failure(doc.origin_chain, &e).await;
                return Ok(());
            }
        };
        self.summary.documents_fetched += 1;

        let (text, encoding) = if doc.literal.is_some() {
            (
                String::from_utf8_lossy(&fetched.bytes).into_owned(),
                DEFAULT_ENCODING.to_string(),
            )
        } else {
            let encoding = doc.encoding.resolve(fetched.declared_encoding.as_deref());
            (encoding::decode(&fetched.bytes, &encoding).into_owned(), encoding)
        };
        if doc.kind != DocumentKind::Virtual {
            debug!(location = %doc.location, bytes = fetched.bytes.len(), encoding = %encoding, depth = doc.depth, "document fetched");
            self.emit(
                self.event(EventKind::DocumentFetched)
                    .with_location(doc.location.as_str())
                    .with_data(json!({
                        "bytes": fetched.bytes.len(),
                        "encoding": encoding,
                        "depth": doc.depth,
                    })),
            )
            .await;
        }

        let raw = (doc.origin_chain.is_none() && doc.literal.is_none() && doc.consumers.len() > 1)
            .then(|| (fetched.bytes, fetched.declared_encoding));
        let mut visit = Visit {
            id,
            doc: &doc,
            text,
            encoding,
            raw,
            discovered: Vec::new(),
            skip_document: false,
        };
        for &chain in &doc.consumers {
            if visit.skip_document || self.crawler.cancellation.is_cancelled() {
                break;
            }
            if self.chain_active(chain) {
                self.visit_chain(chain, &mut visit).await?;
            }
        }
        let discovered = std::mem::take(&mut visit.discovered);
        self.enqueue_discovered(discovered).await;
        self.refresh_exhaustion().await;
        Ok(())
    }

    async fn visit_chain(&mut self, chain_id: ChainId, visit: &mut Visit<'_>) -> Result<(), ScrError> {
        let crawler = self.crawler;
        let chain = &crawler.chains[chain_id];
        let di = match self.registry.next_index(chain_id, IndexKind::Document) {
            IndexGrant::Issued(di) => di,
            IndexGrant::Exhausted => return Ok(()),
        };
        if !chain.content_index_continuous {
            self.registry.reset(chain_id, IndexKind::Content);
        }
        if let Some((ref bytes, ref declared)) = visit.raw {
            let encoding = chain.document_encoding.resolve(declared.as_deref());
            if encoding != visit.encoding {
                debug!(chain = chain_id, encoding = %encoding, "document decoded again for chain");
                visit.text = encoding::decode(bytes, &encoding).into_owned();
                visit.encoding = encoding;
            }
        }
        debug!(chain = chain_id, location = %visit.doc.location, di, "evaluating chain");

        if chain.has_content_matching {
            let mut base = GeneralScope {
                encoding: &visit.encoding,
                location: &visit.doc.location,
                di,
                ci: None,
            }
            .to_scope(chain);
            if let Some(ref lm) = visit.doc.locator_match {
                lm.bind(LocatorKind::Document, &mut base);
            }
            match self.visit_contents(chain, di, &base, visit).await? {
                Flow::Continue => {}
                Flow::SkipChain => return Ok(()),
                Flow::SkipDocument => {
                    visit.skip_document = true;
                    return Ok(());
                }
            }
        }

        if chain.has_document_matching && self.registry.has_next(chain_id, IndexKind::Document) {
            self.visit_documents(chain, di, visit).await?;
        }
        Ok(())
    }

    async fn visit_documents(&mut self, chain: &Chain, di: i64, visit: &mut Visit<'_>) -> Result<(), ScrError> {
        let base = GeneralScope {
            encoding: &visit.encoding,
            location: &visit.doc.location,
            di,
            ci: None,
        }
        .to_scope(chain);
        let matches = match self
            .matcher
            .document_matches(chain, &visit.text, &visit.doc.location, &base)
            .await
        {
            Ok(matches) => matches,
            Err(e) => {
                warn!(chain = chain.id, location = %visit.doc.location, error = %e, "document matching failed");
                self.emit(
                    self.event(EventKind::MatchSkipped)
                        .with_chain(chain.id)
                        .with_location(visit.doc.location.as_str())
                        .with_data(json!({"reason": "match", "error": e.to_string()})),
                )
                .await;
                return Ok(());
            }
        };

        let link_kind = visit.doc.link_base.kind;
        for mut lm in matches {
            let mut scope = base.clone();
            lm.bind(LocatorKind::Document, &mut scope);
            if let Err(e) = lm.apply_format(&chain.document, &scope) {
                self.format_failure(chain, &visit.doc.location, &e).await;
                continue;
            }
            let mut link = normalize_link(&lm.result, &visit.doc.link_base, &chain.schemes);
            if link.is_empty() {
                continue;
            }
            if chain.document.interactive {
                match self
                    .confirm(PromptKind::Document, chain, &visit.doc.location, &link, String::new(), false)
                    .await?
                {
                    Decision::Keep(None) => {}
                    Decision::Keep(Some(edited)) => link = edited,
                    Decision::Drop => continue,
                    Decision::SkipChain => return Ok(()),
                    Decision::SkipDocument => {
                        visit.skip_document = true;
                        return Ok(());
                    }
                }
            }
            let doc = Document {
                kind: link_kind,
                link_base: LinkBase::for_document(link_kind, &link),
                location: link,
                literal: None,
                encoding: chain.document_encoding.clone(),
                origin_chain: Some(chain.id),
                consumers: chain.document_chains.clone(),
                parent: Some(visit.id),
                depth: visit.doc.depth + 1,
                locator_match: Some(lm),
            };
            visit.discovered.push((doc, chain.dedup));
        }
        Ok(())
    }

    async fn enqueue_discovered(&mut self, discovered: Vec<(Document, DedupPolicy)>) {
        let mut batch = Vec::with_capacity(discovered.len());
        for (doc, policy) in discovered {
            let report = (doc.kind != DocumentKind::Virtual).then(|| (doc.location.clone(), doc.origin_chain, doc.depth));
            match self.frontier.admit(doc, policy) {
                Some(id) => {
                    batch.push(id);
                    if let Some((location, chain, depth)) = report {
                        debug!(location = %location, depth, "document discovered");
                        let mut event = self
                            .event(EventKind::DocumentDiscovered)
                            .with_location(location)
                            .with_data(json!({"depth": depth}));
                        if let Some(chain) = chain {
                            event = event.with_chain(chain);
                        }
                        self.emit(event).await;
                    }
                }
                None => {
                    if let Some((location, _, _)) = report {
                        debug!(location = %location, ?policy, "duplicate document dropped");
                    }
                }
            }
        }
        self.frontier.enqueue(&batch);
    }

    /// Puts a prompt to the user.
    pub(super) async fn confirm(
        &self,
        kind: PromptKind,
        chain: &Chain,
        location: &str,
        value: &str,
        context: String,
        multiline: bool,
    ) -> Result<Decision, ScrError> {
        let prompt = Prompt {
            kind,
            chain: chain.id,
            location: location.to_string(),
            value: value.to_string(),
            context,
            escape_sequence: chain.escape_sequence.clone(),
            multiline,
        };
        Ok(match self.crawler.interaction.ask(&prompt).await? {
            PromptResponse::Accept => Decision::Keep(None),
            PromptResponse::Edit(value) => Decision::Keep(Some(value)),
            PromptResponse::Reject => Decision::Drop,
            PromptResponse::SkipChain => Decision::SkipChain,
            PromptResponse::SkipDocument => Decision::SkipDocument,
            PromptResponse::Abort => {
                return Err(ScrError::InteractionAbort(format!(
                    "aborted at {}",
                    prompt.message()
                )))
            }
        })
    }

    pub(super) async fn format_failure(&mut self, chain: &Chain, location: &str, error: &FormatError) {
        warn!(chain = chain.id, location = %location, error = %error, "match skipped");
        self.summary.format_failures += 1;
        self.emit(
            self.event(EventKind::MatchSkipped)
                .with_chain(chain.id)
                .with_location(location)
                .with_data(json!({"reason": "format", "error": error.to_string()})),
        )
        .await;
    }

    pub(super) async fn fetch_failure(&mut self, chain: Option<ChainId>, error: &FetchError) {
        warn!(location = %error.location, error = %error, "fetch failed, skipped");
        self.summary.fetch_failures += 1;
        let mut event = self
            .event(EventKind::FetchFailed)
            .with_location(error.location.as_str())
            .with_data(json!(error.to_dict()));
        if let Some(chain) = chain {
            event = event.with_chain(chain);
        }
        self.emit(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_exit_code() {
        let mut summary = RunSummary::default();
        assert_eq!(summary.exit_code(), 0);
        summary.cancelled = true;
        assert_eq!(summary.exit_code(), 0);
        summary.output_failures = 1;
        assert!(summary.has_failures());
        assert_eq!(summary.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_run_requires_documents() {
        let err = Crawler::new(Vec::new(), RunConfig::default())
            .run(Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ScrError::Configuration(_)));
    }
}
