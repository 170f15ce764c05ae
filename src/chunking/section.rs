//! Retrievable sections emitted by the chunking engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One chunk of a document, ready to be embedded and indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    /// Stable identifier derived from the file name and sequence number.
    pub id: String,
    /// Chunk text (paragraph run or table markup with context).
    pub content: String,
    /// Document title; the file name.
    pub title: String,
    /// Source file name.
    pub filename: String,
    /// Owning folder.
    pub folder: String,
    /// Year metadata, possibly empty.
    pub year: String,
    /// Category label, empty unless set by the caller.
    pub category: String,
    /// Page label carried into the index; mirrors the section id.
    pub page: String,
    /// Page where the chunk starts.
    pub page_number: u32,
    /// URI of the source file.
    pub file_uri: String,
    /// Access groups allowed to read the source file.
    pub group_ids: BTreeSet<String>,
}

/// Build a section id: characters outside `[0-9a-zA-Z_-]` become `_`, leading `_` are trimmed.
///
/// ```
/// use docsync::chunking::sanitize_id;
/// assert_eq!(sanitize_id("Plan 2024.pdf-3"), "Plan_2024_pdf-3");
/// assert_eq!(sanitize_id("(draft) memo.docx-1"), "draft__memo_docx-1");
/// ```
pub fn sanitize_id(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    replaced.trim_start_matches('_').to_string()
}

/// Id of the `sequence`-th section of `filename`.
pub fn section_id(filename: &str, sequence: usize) -> String {
    sanitize_id(&format!("{filename}-{sequence}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_and_trims() {
        assert_eq!(sanitize_id("__a b"), "a_b");
        assert_eq!(sanitize_id("Año.pdf-1"), "A_o_pdf-1");
        assert_eq!(section_id("Informe final.docx", 12), "Informe_final_docx-12");
    }

    #[test]
    fn ids_are_stable() {
        assert_eq!(section_id("a.pdf", 1), section_id("a.pdf", 1));
        assert_ne!(section_id("a.pdf", 1), section_id("a.pdf", 2));
    }
}
