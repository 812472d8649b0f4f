//! Message types
//!
//! Defines transcript entries, their authors and the structured card payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique, time-ordered identifier of a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Author {
    /// Message typed by the visitor
    User,
    /// Message produced by the backend assistant (or the widget itself)
    Assistant,
}

/// Summary card content
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SummaryPayload {
    pub title: String,
    pub body: String,
    /// Best-guess cover image of the page the summary is about
    pub cover_image: Option<String>,
    /// URL of the page that was summarized
    pub source_url: Option<String>,
}

/// One entry of an articles card
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArticleItem {
    pub title: String,
    /// All authors joined with ", "
    pub author: String,
    pub url: String,
    pub summary: String,
    pub quote: String,
    pub image_url: Option<String>,
}

/// Kind of transcript entry. Structured payloads only exist on the kinds that carry them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    PlainText,
    SummaryCard(SummaryPayload),
    ArticlesCard(Vec<ArticleItem>),
    InfoNote,
    QuickActions,
    WelcomeBanner,
}

impl MessageKind {
    /// Onboarding entries are presentation-only and dropped on the first user message
    pub fn is_onboarding(&self) -> bool {
        matches!(self, MessageKind::QuickActions | MessageKind::WelcomeBanner)
    }

    pub fn label(&self) -> &'static str {
        match self {
            MessageKind::PlainText => "text",
            MessageKind::SummaryCard(_) => "summary",
            MessageKind::ArticlesCard(_) => "articles",
            MessageKind::InfoNote => "info",
            MessageKind::QuickActions => "actions",
            MessageKind::WelcomeBanner => "welcome",
        }
    }
}

/// A single transcript entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    /// Accumulated plain text; only grows while the message is the active stream target
    pub text: String,
    pub author: Author,
    pub timestamp: DateTime<Utc>,
    pub kind: MessageKind,
}

impl Message {
    /// Create a new message
    pub fn new(author: Author, kind: MessageKind, text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            text: text.into(),
            author,
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Author::User, MessageKind::PlainText, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Author::Assistant, MessageKind::PlainText, text)
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(Author::Assistant, MessageKind::InfoNote, text)
    }

    pub fn summary(payload: SummaryPayload) -> Self {
        Self::new(Author::Assistant, MessageKind::SummaryCard(payload), "")
    }

    pub fn articles(items: Vec<ArticleItem>) -> Self {
        Self::new(Author::Assistant, MessageKind::ArticlesCard(items), "")
    }

    pub fn welcome(text: impl Into<String>) -> Self {
        Self::new(Author::Assistant, MessageKind::WelcomeBanner, text)
    }

    pub fn quick_actions() -> Self {
        Self::new(Author::Assistant, MessageKind::QuickActions, "")
    }

    pub fn is_user(&self) -> bool {
        self.author == Author::User
    }

    pub fn summary_payload(&self) -> Option<&SummaryPayload> {
        match &self.kind {
            MessageKind::SummaryCard(payload) => Some(payload),
            _ => None,
        }
    }

    pub fn articles_payload(&self) -> Option<&[ArticleItem]> {
        match &self.kind {
            MessageKind::ArticlesCard(items) => Some(items),
            _ => None,
        }
    }
}
