//! Page-context extraction
//!
//! Reads the host page to enrich outgoing queries and summary cards.

use crate::host::HostEnvironment;

/// Smallest rendered size for an image to count as a cover candidate
const MIN_COVER_WIDTH: f64 = 500.0;
const MIN_COVER_HEIGHT: f64 = 250.0;

/// Describe the current page: URL, title and the quoted selection if there is one.
pub fn extract_context(host: &dyn HostEnvironment) -> String {
    let mut context = format!(
        "Current page: {}\nPage title: {}",
        host.current_url(),
        host.document_title()
    );
    if let Some(selection) = host.selected_text().filter(|s| !s.is_empty()) {
        context.push_str(&format!("\nSelected text: \"{}\"", selection));
    }
    context
}

/// The query sent to the backend: user text followed by the page-context block.
pub fn contextual_query(text: &str, host: &dyn HostEnvironment) -> String {
    format!("{}\n\nPage Context:\n{}", text, extract_context(host))
}

/// Best guess at the page's cover image.
///
/// First match wins: an explicitly tagged cover, the Open-Graph image, then
/// the first image rendered at least 500x250.
pub fn best_cover_image(host: &dyn HostEnvironment) -> Option<String> {
    if let Some(src) = host.tagged_cover_image().filter(|s| !s.is_empty()) {
        return Some(src);
    }

    if let Some(og) = host.meta_property("og:image").filter(|s| !s.is_empty()) {
        return Some(og);
    }

    host.images()
        .into_iter()
        .find(|img| {
            img.width >= MIN_COVER_WIDTH && img.height >= MIN_COVER_HEIGHT && !img.src.is_empty()
        })
        .map(|img| img.src)
}
