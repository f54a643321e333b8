//! Fake collaborators for testing.
//!
//! Every fake is cheap to clone and clones share state, so a test keeps
//! one handle for assertions and hands another to the crawler.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::engine::{Interaction, Prompt, PromptResponse, ScriptEvaluator};
use crate::errors::{FetchError, FetchErrorKind, MatchError, ScrError};
use crate::fetch::{FetchRequest, FetchedDocument, Fetcher, HttpClient, HttpResponse};
use crate::format::Scope;
use crate::output::OutputSink;

#[derive(Debug, Clone, Default)]
struct StaticPage {
    bytes: Vec<u8>,
    failure: Option<FetchErrorKind>,
    delay: Option<Duration>,
    encoding: Option<String>,
    filename: Option<String>,
}

#[derive(Debug, Default)]
struct FetcherState {
    pages: HashMap<String, StaticPage>,
    counts: HashMap<String, usize>,
    order: Vec<String>,
}

/// An in-memory site keyed by location.
///
/// Literal requests return their literal; unknown locations fail with
/// [`FetchErrorKind::NotFound`].
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    state: Arc<Mutex<FetcherState>>,
}

impl StaticFetcher {
    /// Creates an empty site.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn page(self, location: &str, update: impl FnOnce(&mut StaticPage)) -> Self {
        update(self.state.lock().pages.entry(location.to_string()).or_default());
        self
    }

    /// Serves `content` at `location`.
    #[must_use]
    pub fn with_document(self, location: &str, content: impl Into<Vec<u8>>) -> Self {
        let bytes = content.into();
        self.page(location, |p| p.bytes = bytes)
    }

    /// Fails every fetch of `location` with `kind`.
    #[must_use]
    pub fn with_failure(self, location: &str, kind: FetchErrorKind) -> Self {
        self.page(location, |p| p.failure = Some(kind))
    }

    /// Delays every fetch of `location`.
    #[must_use]
    pub fn with_delay(self, location: &str, delay: Duration) -> Self {
        self.page(location, |p| p.delay = Some(delay))
    }

    /// Declares an encoding for `location`.
    #[must_use]
    pub fn with_encoding(self, location: &str, encoding: &str) -> Self {
        let encoding = encoding.to_string();
        self.page(location, |p| p.encoding = Some(encoding))
    }

    /// Suggests a filename for `location`.
    #[must_use]
    pub fn with_filename(self, location: &str, filename: &str) -> Self {
        let filename = filename.to_string();
        self.page(location, |p| p.filename = Some(filename))
    }

    /// Number of fetches of `location`.
    #[must_use]
    pub fn fetch_count(&self, location: &str) -> usize {
        self.state.lock().counts.get(location).copied().unwrap_or(0)
    }

    /// Non-literal locations in the order they were fetched.
    #[must_use]
    pub fn fetched(&self) -> Vec<String> {
        self.state.lock().order.clone()
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedDocument, FetchError> {
        let location = request.location.as_str();
        if let Some(ref literal) = request.literal {
            return Ok(FetchedDocument {
                bytes: literal.clone().into_bytes(),
                final_location: location.to_string(),
                ..FetchedDocument::default()
            });
        }
        let page = {
            let mut state = self.state.lock();
            *state.counts.entry(location.to_string()).or_default() += 1;
            state.order.push(location.to_string());
            state.pages.get(location).cloned()
        };
        let Some(page) = page else {
            return Err(FetchError::not_found(location));
        };
        if let Some(delay) = page.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(kind) = page.failure {
            return Err(FetchError::new(kind, location));
        }
        Ok(FetchedDocument {
            bytes: page.bytes,
            declared_encoding: page.encoding,
            final_location: location.to_string(),
            filename: page.filename,
        })
    }
}

/// An HTTP client answering from a fixed table.
///
/// Unknown URLs fail with [`FetchErrorKind::Connection`].
#[derive(Debug, Clone, Default)]
pub struct StaticHttpClient {
    pages: Arc<Mutex<HashMap<String, HttpResponse>>>,
}

impl StaticHttpClient {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers `url` with `status` and `body`.
    #[must_use]
    pub fn with_page(self, url: &str, status: u16, body: &[u8]) -> Self {
        self.pages.lock().insert(
            url.to_string(),
            HttpResponse {
                status,
                bytes: body.to_vec(),
                final_url: url.to_string(),
                ..HttpResponse::default()
            },
        );
        self
    }

    /// Sets the `Content-Type` header of `url`.
    #[must_use]
    pub fn with_content_type(self, url: &str, content_type: &str) -> Self {
        if let Some(page) = self.pages.lock().get_mut(url) {
            page.content_type = Some(content_type.to_string());
        }
        self
    }
}

#[async_trait]
impl HttpClient for StaticHttpClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        self.pages
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::new(FetchErrorKind::Connection, url))
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    results: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
    calls: Vec<(String, Scope)>,
}

/// A script evaluator with canned results.
///
/// A script without a canned result that names a bound variable returns
/// that variable; anything else returns no results.
#[derive(Debug, Clone, Default)]
pub struct FakeScriptEvaluator {
    state: Arc<Mutex<ScriptState>>,
}

impl FakeScriptEvaluator {
    /// Creates an evaluator with no canned results.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `results` for `script`.
    #[must_use]
    pub fn with_result(self, script: &str, results: &[&str]) -> Self {
        self.state.lock().results.insert(
            script.to_string(),
            results.iter().map(ToString::to_string).collect(),
        );
        self
    }

    /// Fails every evaluation of `script`.
    #[must_use]
    pub fn failing(self, script: &str) -> Self {
        self.state.lock().failing.insert(script.to_string());
        self
    }

    /// Every evaluation so far with the scope it saw.
    #[must_use]
    pub fn calls(&self) -> Vec<(String, Scope)> {
        self.state.lock().calls.clone()
    }
}

#[async_trait]
impl ScriptEvaluator for FakeScriptEvaluator {
    async fn evaluate(&self, script: &str, scope: &Scope) -> Result<Vec<String>, MatchError> {
        let mut state = self.state.lock();
        state.calls.push((script.to_string(), scope.clone()));
        if state.failing.contains(script) {
            return Err(MatchError::new(format!("script '{script}' failed"), ""));
        }
        if let Some(results) = state.results.get(script) {
            return Ok(results.clone());
        }
        Ok(scope.get(script).map(|v| vec![v.as_text()]).unwrap_or_default())
    }
}

#[derive(Debug, Default)]
struct InteractionState {
    responses: VecDeque<PromptResponse>,
    prompts: Vec<Prompt>,
}

/// Answers prompts from a queue, accepting once it runs dry.
#[derive(Debug, Clone, Default)]
pub struct ScriptedInteraction {
    state: Arc<Mutex<InteractionState>>,
}

impl ScriptedInteraction {
    /// Creates an interaction that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `response` after those already queued.
    #[must_use]
    pub fn then(self, response: PromptResponse) -> Self {
        self.state.lock().responses.push_back(response);
        self
    }

    /// Every prompt asked so far.
    #[must_use]
    pub fn prompts(&self) -> Vec<Prompt> {
        self.state.lock().prompts.clone()
    }
}

#[async_trait]
impl Interaction for ScriptedInteraction {
    async fn ask(&self, prompt: &Prompt) -> Result<PromptResponse, ScrError> {
        let mut state = self.state.lock();
        state.prompts.push(prompt.clone());
        Ok(state.responses.pop_front().unwrap_or(PromptResponse::Accept))
    }
}

/// A shell command run by [`CollectingOutputSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommand {
    /// The command line.
    pub command: String,
    /// Data fed to its stdin.
    pub stdin: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
struct OutputState {
    printed: Vec<u8>,
    files: BTreeMap<PathBuf, Vec<u8>>,
    commands: Vec<RecordedCommand>,
    failing_commands: bool,
}

/// Keeps every output in memory.
#[derive(Debug, Clone, Default)]
pub struct CollectingOutputSink {
    state: Arc<Mutex<OutputState>>,
}

impl CollectingOutputSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every shell command fail.
    #[must_use]
    pub fn with_failing_commands(self) -> Self {
        self.state.lock().failing_commands = true;
        self
    }

    /// Everything printed, decoded lossily.
    #[must_use]
    pub fn printed(&self) -> String {
        String::from_utf8_lossy(&self.state.lock().printed).into_owned()
    }

    /// Printed lines.
    #[must_use]
    pub fn printed_lines(&self) -> Vec<String> {
        self.printed().lines().map(ToString::to_string).collect()
    }

    /// Contents of a saved file.
    #[must_use]
    pub fn saved(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.state.lock().files.get(path.as_ref()).cloned()
    }

    /// Paths of every saved file, sorted.
    #[must_use]
    pub fn saved_paths(&self) -> Vec<PathBuf> {
        self.state.lock().files.keys().cloned().collect()
    }

    /// Shell commands in the order they ran.
    #[must_use]
    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.state.lock().commands.clone()
    }
}

#[async_trait]
impl OutputSink for CollectingOutputSink {
    async fn print(&self, data: &[u8]) -> Result<(), ScrError> {
        self.state.lock().printed.extend_from_slice(data);
        Ok(())
    }

    async fn save(&self, path: &Path, data: &[u8], overwrite: bool) -> Result<(), ScrError> {
        let mut state = self.state.lock();
        if !overwrite && state.files.contains_key(path) {
            return Err(ScrError::Output(format!("file '{}' already exists", path.display())));
        }
        state.files.insert(path.to_path_buf(), data.to_vec());
        Ok(())
    }

    async fn shell(&self, command: &str, stdin: Option<&[u8]>, _print_output: bool) -> Result<(), ScrError> {
        let mut state = self.state.lock();
        state.commands.push(RecordedCommand {
            command: command.to_string(),
            stdin: stdin.map(<[u8]>::to_vec),
        });
        if state.failing_commands {
            return Err(ScrError::Output(format!("command '{command}' failed")));
        }
        Ok(())
    }
}
