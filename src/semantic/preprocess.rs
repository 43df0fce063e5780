//! Text preparation for embedding input and result display.
//!
//! - `searchable_text`: title, description, category label and year joined
//!   with spaces, blank fields skipped
//! - `truncate_description`: shorten long descriptions for search results

use crate::catalog::ContentItem;

/// Ellipsis suffix when content is truncated
const TRUNCATION_SUFFIX: &str = "...";

/// Build the text that represents an item in embedding space.
pub fn searchable_text(item: &ContentItem) -> String {
    let year = item.year.map(|year| year.to_string());

    [
        Some(item.title.as_str()),
        Some(item.description.as_str()),
        Some(item.category.as_str()),
        year.as_deref(),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join(" ")
}

/// Keep at most `max_chars` characters, appending an ellipsis if anything
/// was cut. Counts characters, never splits a UTF-8 sequence.
pub fn truncate_description(description: &str, max_chars: usize) -> String {
    match description.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &description[..cut], TRUNCATION_SUFFIX),
        None => description.to_string(),
    }
}
