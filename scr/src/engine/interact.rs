//! Interactive confirmation of matches.

use crate::chain::options::match_variant;
use crate::errors::ScrError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};

/// Which locator a prompt is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    /// A content match or content link.
    Content,
    /// A content label.
    Label,
    /// A discovered document.
    Document,
    /// The path content is about to be saved to.
    SavePath,
}

impl fmt::Display for PromptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Content => "content",
            Self::Label => "label",
            Self::Document => "document",
            Self::SavePath => "save path",
        })
    }
}

/// A question put to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    /// What is being confirmed.
    pub kind: PromptKind,
    /// The chain the match belongs to.
    pub chain: usize,
    /// Location of the document the match came from.
    pub location: String,
    /// The value to accept, reject or edit.
    pub value: String,
    /// Index context such as `(di=1, ci=3)`.
    pub context: String,
    /// Sequence terminating a multi-line edit.
    pub escape_sequence: String,
    /// Whether an edit may span multiple lines.
    pub multiline: bool,
}

impl Prompt {
    /// Renders the question line.
    #[must_use]
    pub fn message(&self) -> String {
        match self.kind {
            PromptKind::Content if self.multiline => format!(
                "accept content match from \"{}\"{}",
                self.location, self.context
            ),
            PromptKind::Content => format!(
                "\"{}\"{}: accept content link \"{}\"",
                self.location, self.context, self.value
            ),
            PromptKind::Label => format!(
                "\"{}\"{}: accept content label \"{}\"",
                self.location, self.context, self.value
            ),
            PromptKind::Document => format!("accept matched document \"{}\"", self.value),
            PromptKind::SavePath => format!(
                "\"{}\"{}: accept save path \"{}\"",
                self.location, self.context, self.value
            ),
        }
    }
}

/// The answer to a [`Prompt`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromptResponse {
    /// Keep the match.
    Accept,
    /// Drop the match.
    Reject,
    /// Keep the match with a replacement value.
    Edit(String),
    /// Stop the chain for the current document.
    SkipChain,
    /// Stop content and document handling for the current document.
    SkipDocument,
    /// Terminate the run.
    Abort,
}

/// Asks the user to confirm matches.
#[async_trait]
pub trait Interaction: Send + Sync + Debug {
    /// Answers `prompt`.
    async fn ask(&self, prompt: &Prompt) -> Result<PromptResponse, ScrError>;
}

/// Accepts every prompt. Used when no terminal is available.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoAccept;

#[async_trait]
impl Interaction for AutoAccept {
    async fn ask(&self, _prompt: &Prompt) -> Result<PromptResponse, ScrError> {
        Ok(PromptResponse::Accept)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Answer {
    Yes,
    No,
    Edit,
    ChainSkip,
    DocSkip,
    Abort,
}

fn parse_answer(text: &str) -> Option<Answer> {
    if text.trim().is_empty() {
        return Some(Answer::Yes);
    }
    match_variant(
        text,
        &[
            ("yes", Answer::Yes),
            ("no", Answer::No),
            ("edit", Answer::Edit),
            ("chainskip", Answer::ChainSkip),
            ("docskip", Answer::DocSkip),
            ("abort", Answer::Abort),
        ],
    )
}

/// Extracts a multi-line edit terminated by `\n<escape>`.
fn take_until_escape(buffer: &str, escape: &str) -> Option<String> {
    buffer
        .find(&format!("\n{escape}"))
        .map(|idx| buffer[..idx].to_string())
}

/// Prompts on the controlling terminal through `dialoguer`.
#[cfg(feature = "terminal")]
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalInteraction;

#[cfg(feature = "terminal")]
impl TerminalInteraction {
    /// Creates the terminal prompt.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn read_line(prompt: &str) -> Result<String, ScrError> {
        dialoguer::Input::<String>::new()
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()
            .map_err(|e| ScrError::InteractionAbort(e.to_string()))
    }

    fn ask_blocking(prompt: &Prompt) -> Result<PromptResponse, ScrError> {
        let question = format!("{} [Yes/no/edit/chainskip/docskip/abort]", prompt.message());
        let answer = loop {
            if let Some(answer) = parse_answer(&Self::read_line(&question)?) {
                break answer;
            }
        };
        Ok(match answer {
            Answer::Yes => PromptResponse::Accept,
            Answer::No => PromptResponse::Reject,
            Answer::ChainSkip => PromptResponse::SkipChain,
            Answer::DocSkip => PromptResponse::SkipDocument,
            Answer::Abort => PromptResponse::Abort,
            Answer::Edit if prompt.multiline => {
                eprintln!(
                    "enter new {} (terminate with a newline followed by the string \"{}\"):",
                    prompt.kind, prompt.escape_sequence
                );
                let mut buffer = String::new();
                loop {
                    buffer.push_str(&Self::read_line("")?);
                    buffer.push('\n');
                    if let Some(value) = take_until_escape(&buffer, &prompt.escape_sequence) {
                        break PromptResponse::Edit(value);
                    }
                }
            }
            Answer::Edit => PromptResponse::Edit(Self::read_line(&format!("enter new {}", prompt.kind))?),
        })
    }
}

#[cfg(feature = "terminal")]
#[async_trait]
impl Interaction for TerminalInteraction {
    async fn ask(&self, prompt: &Prompt) -> Result<PromptResponse, ScrError> {
        let prompt = prompt.clone();
        tokio::task::spawn_blocking(move || Self::ask_blocking(&prompt))
            .await
            .map_err(|e| ScrError::InteractionAbort(e.to_string()))?
    }
}
