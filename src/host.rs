//! Host environment capability
//!
//! Everything the widget reads from or sends to the embedding page goes
//! through [`HostEnvironment`]. Browser bindings implement it in production;
//! [`StaticPage`] is an in-memory document snapshot.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

/// Name of the event the host page's highlight renderer listens for
pub const HIGHLIGHTS_APPLY_EVENT: &str = "noah:highlights-apply";

/// Errors raised by host side effects
#[derive(Debug, Error)]
pub enum HostError {
    #[error("No listener for {0}")]
    NoListener(&'static str),
    #[error("Dispatch failed: {0}")]
    Dispatch(String),
}

/// Instruction for the host page to highlight spans of the current document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightSignal {
    pub page_url: String,
    /// Opaque spans, passed through from the backend unchanged
    pub spans: Vec<Value>,
}

/// An image element of the page with its rendered size in logical pixels
#[derive(Debug, Clone, PartialEq)]
pub struct PageImage {
    pub src: String,
    pub width: f64,
    pub height: f64,
}

/// Ambient page state and side channels provided by the embedding page
pub trait HostEnvironment: Send + Sync {
    fn current_url(&self) -> String;
    fn document_title(&self) -> String;
    /// Current user text selection, if any
    fn selected_text(&self) -> Option<String>;
    /// Source of an image the page explicitly tagged as the article cover
    fn tagged_cover_image(&self) -> Option<String>;
    /// Content of a `<meta property=...>` tag
    fn meta_property(&self, property: &str) -> Option<String>;
    /// Image elements in document order
    fn images(&self) -> Vec<PageImage>;
    fn broadcast_highlights(&self, signal: &HighlightSignal) -> Result<(), HostError>;
}

/// In-memory snapshot of a page
#[derive(Debug, Clone)]
pub struct StaticPage {
    pub url: String,
    pub title: String,
    pub selection: Option<String>,
    pub tagged_cover: Option<String>,
    pub meta: Vec<(String, String)>,
    pub images: Vec<PageImage>,
    highlights: broadcast::Sender<HighlightSignal>,
}

impl StaticPage {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        let (highlights, _) = broadcast::channel(16);
        Self {
            url: url.into(),
            title: title.into(),
            selection: None,
            tagged_cover: None,
            meta: Vec::new(),
            images: Vec::new(),
            highlights,
        }
    }

    pub fn with_selection(mut self, selection: impl Into<String>) -> Self {
        self.selection = Some(selection.into());
        self
    }

    pub fn with_tagged_cover(mut self, src: impl Into<String>) -> Self {
        self.tagged_cover = Some(src.into());
        self
    }

    pub fn with_meta(mut self, property: impl Into<String>, content: impl Into<String>) -> Self {
        self.meta.push((property.into(), content.into()));
        self
    }

    pub fn with_image(mut self, src: impl Into<String>, width: f64, height: f64) -> Self {
        self.images.push(PageImage {
            src: src.into(),
            width,
            height,
        });
        self
    }

    /// Listen for highlight signals, as the page's highlight renderer would
    pub fn subscribe_highlights(&self) -> broadcast::Receiver<HighlightSignal> {
        self.highlights.subscribe()
    }
}

impl HostEnvironment for StaticPage {
    fn current_url(&self) -> String {
        self.url.clone()
    }

    fn document_title(&self) -> String {
        self.title.clone()
    }

    fn selected_text(&self) -> Option<String> {
        self.selection.clone()
    }

    fn tagged_cover_image(&self) -> Option<String> {
        self.tagged_cover.clone()
    }

    fn meta_property(&self, property: &str) -> Option<String> {
        self.meta
            .iter()
            .find(|(name, _)| name == property)
            .map(|(_, content)| content.clone())
    }

    fn images(&self) -> Vec<PageImage> {
        self.images.clone()
    }

    fn broadcast_highlights(&self, signal: &HighlightSignal) -> Result<(), HostError> {
        self.highlights
            .send(signal.clone())
            .map(|_| ())
            .map_err(|_| HostError::NoListener(HIGHLIGHTS_APPLY_EVENT))
    }
}
