//! Helpers for building point ids, payloads, and filters.

use serde_json::{Value, json};
use uuid::Uuid;

use super::types::{CONTENT_VECTOR, SearchDocument, TITLE_VECTOR};

/// Namespace for section point ids.
const SECTION_NAMESPACE: Uuid = Uuid::from_u128(0x6f3c_2a1e_9b4d_4e57_8a21_5c0d_7e9f_1b24);

/// Deterministic point id for a section id, so re-indexing overwrites in place.
pub fn point_id(section_id: &str) -> Uuid {
    Uuid::new_v5(&SECTION_NAMESPACE, section_id.as_bytes())
}

/// Serialize a document as a Qdrant point with named vectors.
pub(crate) fn build_point(document: &SearchDocument) -> Value {
    json!({
        "id": point_id(&document.id).to_string(),
        "vector": {
            TITLE_VECTOR: document.title_vector,
            CONTENT_VECTOR: document.content_vector,
        },
        "payload": {
            "id": document.id,
            "title": document.title,
            "content": document.content,
            "category": document.category,
            "page": document.page,
            "pageNumber": document.page_number,
            "fileUri": document.file_uri,
            "folder": document.folder,
            "year": document.year,
            "groupIds": document.group_ids,
        }
    })
}

/// Filter matching every point of a document title.
pub(crate) fn title_filter(title: &str) -> Value {
    json!({
        "must": [
            { "key": "title", "match": { "value": title } }
        ]
    })
}

/// Convert a point id returned by Qdrant into its string form.
pub(crate) fn stringify_point_id(id: Value) -> String {
    match id {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_ids_are_deterministic_per_section() {
        assert_eq!(point_id("a_pdf-1"), point_id("a_pdf-1"));
        assert_ne!(point_id("a_pdf-1"), point_id("a_pdf-2"));
        assert_eq!(point_id("a_pdf-1").get_version_num(), 5);
    }

    #[test]
    fn build_point_uses_named_vectors() {
        let document = SearchDocument {
            id: "a_pdf-1".into(),
            title: "a.pdf".into(),
            content: "body".into(),
            category: String::new(),
            page: "a_pdf-1".into(),
            page_number: 4,
            file_uri: "file:///a.pdf".into(),
            folder: "docs".into(),
            year: "2024".into(),
            group_ids: vec!["staff".into()],
            title_vector: vec![1.0],
            content_vector: vec![0.5],
        };
        let point = build_point(&document);
        assert_eq!(point["vector"]["title_vector"], json!([1.0]));
        assert_eq!(point["vector"]["content_vector"], json!([0.5]));
        assert_eq!(point["payload"]["title"], "a.pdf");
        assert_eq!(point["payload"]["groupIds"], json!(["staff"]));
        assert_eq!(point["id"], point_id("a_pdf-1").to_string());
    }

    #[test]
    fn stringify_handles_numbers_and_strings() {
        assert_eq!(stringify_point_id(json!(7)), "7");
        assert_eq!(stringify_point_id(json!("abc")), "abc");
    }
}
