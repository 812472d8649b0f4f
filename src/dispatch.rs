//! UI-item dispatch
//!
//! Maps structured stream payloads to transcript entries or host side effects.
//! Every field is read tolerantly: missing values fall back, nothing here fails.

use serde_json::Value;

use crate::context::best_cover_image;
use crate::host::{HighlightSignal, HostEnvironment};
use crate::transcript::Transcript;
use crate::types::message::{ArticleItem, Message, MessageId, SummaryPayload};

pub const UNKNOWN_ITEM_TEXT: &str = "Received UI content.";
pub const HIGHLIGHT_FAILURE_TEXT: &str = "I couldn't apply highlights on this page.";

/// What handling a UI item did
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// A new transcript entry was appended
    Appended(MessageId),
    /// A highlight signal was sent to the host page
    Broadcast,
    /// Empty payload, nothing to do
    Skipped,
}

/// A `ui_items` payload split into its item type and data
#[derive(Debug, Clone, PartialEq)]
pub struct UiItem {
    pub item_type: String,
    pub data: Value,
}

impl UiItem {
    pub fn from_payload(payload: &Value) -> Self {
        Self {
            item_type: payload
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            data: payload.get("data").cloned().unwrap_or(Value::Null),
        }
    }
}

/// Handle one UI item against the transcript
pub fn handle(
    item_type: &str,
    data: &Value,
    host: &dyn HostEnvironment,
    transcript: &mut Transcript,
) -> DispatchOutcome {
    match item_type {
        "summary" => match summary_payload(data, host) {
            Some(payload) => {
                DispatchOutcome::Appended(transcript.append(Message::summary(payload)))
            }
            None => DispatchOutcome::Skipped,
        },
        "articles" => {
            let items = article_items(data);
            if items.is_empty() {
                return DispatchOutcome::Skipped;
            }
            DispatchOutcome::Appended(transcript.append(Message::articles(items)))
        }
        "highlights" => {
            let signal = HighlightSignal {
                page_url: host.current_url(),
                spans: data.as_array().cloned().unwrap_or_default(),
            };
            match host.broadcast_highlights(&signal) {
                Ok(()) => {
                    tracing::debug!(spans = signal.spans.len(), "Broadcast highlight signal");
                    DispatchOutcome::Broadcast
                }
                Err(e) => {
                    tracing::warn!("Failed to apply highlights: {}", e);
                    let note = Message::info(HIGHLIGHT_FAILURE_TEXT);
                    DispatchOutcome::Appended(transcript.append(note))
                }
            }
        }
        other => {
            tracing::info!(item_type = other, "Unrecognized UI item type");
            DispatchOutcome::Appended(transcript.append(Message::info(UNKNOWN_ITEM_TEXT)))
        }
    }
}

fn summary_payload(data: &Value, host: &dyn HostEnvironment) -> Option<SummaryPayload> {
    let raw = match data {
        Value::Array(list) => list.first()?,
        other => other,
    };
    if is_empty_scalar(raw) {
        return None;
    }

    Some(SummaryPayload {
        title: field_text(raw, "title").unwrap_or_default(),
        body: field_text(raw, "summary")
            .or_else(|| field_text(raw, "answer"))
            .unwrap_or_default(),
        cover_image: best_cover_image(host),
        source_url: Some(host.current_url()),
    })
}

/// Null, `false`, zero and the empty string carry no payload
fn is_empty_scalar(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => true,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        _ => false,
    }
}

fn article_items(data: &Value) -> Vec<ArticleItem> {
    data.as_array()
        .map(|list| list.iter().map(article_item).collect())
        .unwrap_or_default()
}

fn article_item(raw: &Value) -> ArticleItem {
    let author = match raw.get("author") {
        Some(Value::Array(names)) => Some(
            names
                .iter()
                .map(|n| scalar_text(n).unwrap_or_default())
                .collect::<Vec<_>>()
                .join(", "),
        ),
        _ => field_text(raw, "author"),
    };

    ArticleItem {
        title: field_text(raw, "title").unwrap_or_default(),
        author: author
            .or_else(|| field_text(raw, "byline"))
            .unwrap_or_default(),
        url: field_text(raw, "url")
            .or_else(|| field_text(raw, "link"))
            .unwrap_or_default(),
        summary: field_text(raw, "summary")
            .or_else(|| field_text(raw, "excerpt"))
            .or_else(|| field_text(raw, "description"))
            .unwrap_or_default(),
        quote: field_text(raw, "quote").unwrap_or_default(),
        image_url: field_text(raw, "imageUrl")
            .or_else(|| field_text(raw, "image"))
            .or_else(|| field_text(raw, "coverImage")),
    }
}

/// A present, non-null field rendered as text. Empty strings count as present.
fn field_text(raw: &Value, key: &str) -> Option<String> {
    raw.get(key).and_then(scalar_text)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::StaticPage;
    use crate::types::message::MessageKind;
    use serde_json::json;

    fn page() -> StaticPage {
        StaticPage::new("https://example.com/story", "Story").with_meta("og:image", "og.png")
    }

    #[test]
    fn test_summary_object() {
        let mut t = Transcript::new();
        let outcome = handle("summary", &json!({"title": "T", "summary": "S"}), &page(), &mut t);

        assert!(matches!(outcome, DispatchOutcome::Appended(_)));
        assert_eq!(t.len(), 1);
        let payload = t.messages()[0].summary_payload().unwrap();
        assert_eq!(payload.title, "T");
        assert_eq!(payload.body, "S");
        assert_eq!(payload.cover_image.as_deref(), Some("og.png"));
        assert_eq!(payload.source_url.as_deref(), Some("https://example.com/story"));
    }

    #[test]
    fn test_summary_from_array_and_answer_fallback() {
        let mut t = Transcript::new();
        handle("summary", &json!([{"answer": "A"}, {"summary": "ignored"}]), &page(), &mut t);

        let payload = t.messages()[0].summary_payload().unwrap();
        assert_eq!(payload.title, "");
        assert_eq!(payload.body, "A");
    }

    #[test]
    fn test_empty_summary_is_noop() {
        let mut t = Transcript::new();
        assert_eq!(handle("summary", &Value::Null, &page(), &mut t), DispatchOutcome::Skipped);
        assert_eq!(handle("summary", &json!([]), &page(), &mut t), DispatchOutcome::Skipped);
        for falsy in [json!(""), json!(0), json!(false), json!([null]), json!([""])] {
            assert_eq!(
                handle("summary", &falsy, &page(), &mut t),
                DispatchOutcome::Skipped,
                "{}",
                falsy
            );
        }
        assert!(t.is_empty());
    }

    #[test]
    fn test_ui_item_without_data_is_unknown_note() {
        let mut t = Transcript::new();
        let item = UiItem::from_payload(&Value::Null);
        handle(&item.item_type, &item.data, &page(), &mut t);

        assert_eq!(t.len(), 1);
        assert_eq!(t.messages()[0].text, UNKNOWN_ITEM_TEXT);
    }

    #[test]
    fn test_articles_with_fallbacks() {
        let mut t = Transcript::new();
        handle("articles", &json!([{"title": "A1", "link": "u1"}]), &page(), &mut t);

        assert_eq!(t.len(), 1);
        let items = t.messages()[0].articles_payload().unwrap();
        assert_eq!(
            items,
            &[ArticleItem {
                title: "A1".into(),
                author: "".into(),
                url: "u1".into(),
                summary: "".into(),
                quote: "".into(),
                image_url: None,
            }]
        );
    }

    #[test]
    fn test_articles_author_and_field_variants() {
        let mut t = Transcript::new();
        let data = json!([
            {"title": "A", "author": ["Ann", "Bo"], "url": "ua", "excerpt": "e", "image": "i.png"},
            {"title": "B", "byline": "Cy", "description": "d", "coverImage": "c.png", "quote": "q"},
            {"author": "Di", "summary": "s", "imageUrl": "x.png"},
        ]);
        handle("articles", &data, &page(), &mut t);

        assert_eq!(t.len(), 1, "articles stay in a single message");
        let items = t.messages()[0].articles_payload().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].author, "Ann, Bo");
        assert_eq!(items[0].summary, "e");
        assert_eq!(items[0].image_url.as_deref(), Some("i.png"));
        assert_eq!(items[1].author, "Cy");
        assert_eq!(items[1].summary, "d");
        assert_eq!(items[1].quote, "q");
        assert_eq!(items[1].image_url.as_deref(), Some("c.png"));
        assert_eq!(items[2].title, "");
        assert_eq!(items[2].author, "Di");
        assert_eq!(items[2].image_url.as_deref(), Some("x.png"));
    }

    #[test]
    fn test_empty_articles_is_noop() {
        let mut t = Transcript::new();
        assert_eq!(handle("articles", &json!([]), &page(), &mut t), DispatchOutcome::Skipped);
        assert_eq!(
            handle("articles", &json!({"title": "not a list"}), &page(), &mut t),
            DispatchOutcome::Skipped
        );
        assert!(t.is_empty());
    }

    #[test]
    fn test_highlights_broadcast() {
        let page = page();
        let mut rx = page.subscribe_highlights();
        let mut t = Transcript::new();

        let outcome = handle("highlights", &json!([{"text": "key"}]), &page, &mut t);

        assert_eq!(outcome, DispatchOutcome::Broadcast);
        assert!(t.is_empty());
        let signal = rx.try_recv().unwrap();
        assert_eq!(signal.page_url, "https://example.com/story");
        assert_eq!(signal.spans, vec![json!({"text": "key"})]);
    }

    #[test]
    fn test_highlights_failure_becomes_info_note() {
        let mut t = Transcript::new();
        let outcome = handle("highlights", &json!("garbage"), &page(), &mut t);

        assert!(matches!(outcome, DispatchOutcome::Appended(_)));
        assert_eq!(t.messages()[0].kind, MessageKind::InfoNote);
        assert_eq!(t.messages()[0].text, HIGHLIGHT_FAILURE_TEXT);
    }

    #[test]
    fn test_unknown_item_type() {
        let mut t = Transcript::new();
        handle("chart", &json!({"points": [1, 2]}), &page(), &mut t);

        assert_eq!(t.len(), 1);
        assert_eq!(t.messages()[0].kind, MessageKind::InfoNote);
        assert_eq!(t.messages()[0].text, UNKNOWN_ITEM_TEXT);
    }

    #[test]
    fn test_ui_item_from_payload() {
        let item = UiItem::from_payload(&json!({"type": "summary", "data": {"title": "T"}}));
        assert_eq!(item.item_type, "summary");
        assert_eq!(item.data, json!({"title": "T"}));

        let bare = UiItem::from_payload(&json!("oops"));
        assert_eq!(bare.item_type, "");
        assert_eq!(bare.data, Value::Null);
    }
}
