//! Typed layout extraction result.
//!
//! Offsets and lengths count Unicode scalar values into [`ExtractionResult::content`]. Unknown
//! fields in the service payload are ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ExtractionError;

/// A contiguous range of the extracted content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// Start offset in characters.
    pub offset: usize,
    /// Length in characters.
    pub length: usize,
}

impl Span {
    /// Create a span from offset and length.
    pub const fn new(offset: usize, length: usize) -> Self {
        Self { offset, length }
    }

    /// Exclusive end offset.
    pub const fn end(&self) -> usize {
        self.offset.saturating_add(self.length)
    }

    /// Whether `position` falls inside the span.
    pub const fn contains(&self, position: usize) -> bool {
        position >= self.offset && position < self.end()
    }

    /// Whether the two spans share at least one character.
    pub const fn overlaps(&self, other: &Span) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

/// Page location of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingRegion {
    /// One-based page number.
    pub page_number: u32,
}

/// One page of the analyzed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// One-based page number.
    pub page_number: u32,
    /// Spans of the page content.
    #[serde(default)]
    pub spans: Vec<Span>,
}

/// A paragraph of running text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paragraph {
    /// Semantic role such as `title` or `pageHeader`, when reported.
    #[serde(default)]
    pub role: Option<String>,
    /// Paragraph text.
    pub content: String,
    /// Spans covered by the paragraph.
    #[serde(default)]
    pub spans: Vec<Span>,
    /// Page locations.
    #[serde(default)]
    pub bounding_regions: Vec<BoundingRegion>,
}

impl Paragraph {
    /// Page the paragraph starts on, defaulting to 1.
    pub fn page_number(&self) -> u32 {
        first_page(&self.bounding_regions)
    }
}

/// A cell of a detected table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    /// Cell kind, e.g. `content`, `columnHeader`, `rowHeader`.
    #[serde(default)]
    pub kind: Option<String>,
    /// Zero-based row index.
    pub row_index: usize,
    /// Zero-based column index.
    pub column_index: usize,
    /// Rows spanned by the cell.
    #[serde(default = "one")]
    pub row_span: usize,
    /// Columns spanned by the cell.
    #[serde(default = "one")]
    pub column_span: usize,
    /// Cell text.
    #[serde(default)]
    pub content: String,
    /// Spans covered by the cell.
    #[serde(default)]
    pub spans: Vec<Span>,
    /// Page locations.
    #[serde(default)]
    pub bounding_regions: Vec<BoundingRegion>,
}

impl Cell {
    /// Whether the cell is a column or row header.
    pub fn is_header(&self) -> bool {
        matches!(self.kind.as_deref(), Some("columnHeader" | "rowHeader"))
    }
}

/// A detected table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    /// Number of rows.
    pub row_count: usize,
    /// Number of columns.
    pub column_count: usize,
    /// Cells in service order.
    #[serde(default)]
    pub cells: Vec<Cell>,
    /// Spans covered by the table as a whole.
    #[serde(default)]
    pub spans: Vec<Span>,
    /// Page locations.
    #[serde(default)]
    pub bounding_regions: Vec<BoundingRegion>,
}

impl Table {
    /// Smallest span covering every cell and table span, if the table has any.
    pub fn extent(&self) -> Option<Span> {
        let spans = self
            .spans
            .iter()
            .chain(self.cells.iter().flat_map(|cell| cell.spans.iter()));
        let (start, end) = spans.fold(None, |acc: Option<(usize, usize)>, span| match acc {
            None => Some((span.offset, span.end())),
            Some((start, end)) => Some((start.min(span.offset), end.max(span.end()))),
        })?;
        Some(Span::new(start, end - start))
    }

    /// Page of the first cell, falling back to the table's own region, then 1.
    pub fn page_number(&self) -> u32 {
        self.cells
            .first()
            .and_then(|cell| cell.bounding_regions.first())
            .or_else(|| self.bounding_regions.first())
            .map(|region| region.page_number)
            .unwrap_or(1)
    }

    /// Offset of the first character of the first cell.
    pub fn first_cell_offset(&self) -> Option<usize> {
        self.cells
            .first()
            .and_then(|cell| cell.spans.first())
            .map(|span| span.offset)
    }

    /// End offset of the last cell.
    pub fn last_cell_end(&self) -> Option<usize> {
        self.cells
            .last()
            .and_then(|cell| cell.spans.last())
            .map(Span::end)
    }
}

/// Layout analysis of one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    /// Service API version that produced the result.
    #[serde(default)]
    pub api_version: Option<String>,
    /// Full text of the document.
    #[serde(default)]
    pub content: String,
    /// Pages in order.
    #[serde(default)]
    pub pages: Vec<Page>,
    /// Paragraphs in document order.
    #[serde(default)]
    pub paragraphs: Vec<Paragraph>,
    /// Tables in document order.
    #[serde(default)]
    pub tables: Vec<Table>,
}

impl ExtractionResult {
    /// Parse a cached or freshly polled payload.
    ///
    /// Accepts either the full operation body (`{"status": ..., "analyzeResult": {...}}`) or
    /// the bare analysis object.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ExtractionError> {
        let value: Value = serde_json::from_slice(bytes).map_err(ExtractionError::Malformed)?;
        Self::from_value(value)
    }

    /// Parse an already decoded payload, see [`ExtractionResult::from_json`].
    pub fn from_value(mut value: Value) -> Result<Self, ExtractionError> {
        if let Some(inner) = value.get_mut("analyzeResult") {
            value = inner.take();
        }
        if !value.is_object() {
            return Err(ExtractionError::Malformed(serde::de::Error::custom(
                "extraction payload is not a JSON object",
            )));
        }
        let result: Self = serde_json::from_value(value).map_err(ExtractionError::Malformed)?;
        result.check_spans()?;
        Ok(result)
    }

    /// Every span must stay inside `content`.
    fn check_spans(&self) -> Result<(), ExtractionError> {
        let limit = self.content.chars().count();
        let spans = self
            .pages
            .iter()
            .flat_map(|page| page.spans.iter())
            .chain(self.paragraphs.iter().flat_map(|paragraph| paragraph.spans.iter()))
            .chain(self.tables.iter().flat_map(|table| {
                table
                    .spans
                    .iter()
                    .chain(table.cells.iter().flat_map(|cell| cell.spans.iter()))
            }));
        for span in spans {
            match span.offset.checked_add(span.length) {
                Some(end) if end <= limit => {}
                _ => {
                    return Err(ExtractionError::Malformed(serde::de::Error::custom(format!(
                        "span {}+{} exceeds content length {limit}",
                        span.offset, span.length
                    ))));
                }
            }
        }
        Ok(())
    }

    /// Number of pages reported by the analysis.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

fn first_page(regions: &[BoundingRegion]) -> u32 {
    regions.first().map(|region| region.page_number).unwrap_or(1)
}

const fn one() -> usize {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn span_predicates() {
        let span = Span::new(10, 5);
        assert_eq!(span.end(), 15);
        assert!(span.contains(10));
        assert!(span.contains(14));
        assert!(!span.contains(15));
        assert!(span.overlaps(&Span::new(14, 10)));
        assert!(!span.overlaps(&Span::new(15, 3)));
        assert!(!span.overlaps(&Span::new(0, 10)));
        assert_eq!(Span::new(usize::MAX - 1, 5).end(), usize::MAX);
    }

    #[test]
    fn from_json_accepts_wrapped_and_bare_payloads() {
        let bare = json!({
            "apiVersion": "2023-07-31",
            "content": "Hello",
            "pages": [{"pageNumber": 1, "spans": [{"offset": 0, "length": 5}]}],
            "paragraphs": [{
                "content": "Hello",
                "spans": [{"offset": 0, "length": 5}],
                "boundingRegions": [{"pageNumber": 1, "polygon": [0, 0]}]
            }],
            "styles": []
        });
        let wrapped = json!({"status": "succeeded", "analyzeResult": bare.clone()});

        let from_bare = ExtractionResult::from_json(bare.to_string().as_bytes()).expect("bare");
        let from_wrapped =
            ExtractionResult::from_json(wrapped.to_string().as_bytes()).expect("wrapped");
        assert_eq!(from_bare, from_wrapped);
        assert_eq!(from_bare.paragraphs[0].page_number(), 1);
        assert_eq!(from_bare.page_count(), 1);
    }

    #[test]
    fn from_json_rejects_non_objects() {
        assert!(matches!(
            ExtractionResult::from_json(b"[1, 2]"),
            Err(ExtractionError::Malformed(_))
        ));
        assert!(matches!(
            ExtractionResult::from_json(b"not json"),
            Err(ExtractionError::Malformed(_))
        ));
    }

    #[test]
    fn from_value_rejects_spans_outside_content() {
        let overflowing = json!({
            "content": "City",
            "tables": [{
                "rowCount": 1,
                "columnCount": 1,
                "cells": [{"rowIndex": 0, "columnIndex": 0, "content": "City",
                           "spans": [{"offset": u64::MAX - 1, "length": 5}]}]
            }]
        });
        let past_end = json!({
            "content": "City",
            "paragraphs": [{"content": "City", "spans": [{"offset": 2, "length": 3}]}]
        });
        let exact = json!({
            "content": "City",
            "paragraphs": [{"content": "City", "spans": [{"offset": 0, "length": 4}]}]
        });

        assert!(matches!(
            ExtractionResult::from_value(overflowing),
            Err(ExtractionError::Malformed(_))
        ));
        assert!(matches!(
            ExtractionResult::from_value(past_end),
            Err(ExtractionError::Malformed(_))
        ));
        assert!(ExtractionResult::from_value(exact).is_ok());
    }

    #[test]
    fn table_extent_covers_cells_and_defaults_spans() {
        let table: Table = serde_json::from_value(json!({
            "rowCount": 1,
            "columnCount": 2,
            "cells": [
                {"kind": "columnHeader", "rowIndex": 0, "columnIndex": 0, "content": "A",
                 "spans": [{"offset": 100, "length": 1}],
                 "boundingRegions": [{"pageNumber": 3}]},
                {"rowIndex": 0, "columnIndex": 1, "content": "B",
                 "spans": [{"offset": 150, "length": 50}]}
            ]
        }))
        .expect("table");

        assert_eq!(table.extent(), Some(Span::new(100, 100)));
        assert_eq!(table.page_number(), 3);
        assert!(table.cells[0].is_header());
        assert!(!table.cells[1].is_header());
        assert_eq!(table.cells[1].row_span, 1);
        assert_eq!(table.first_cell_offset(), Some(100));
        assert_eq!(table.last_cell_end(), Some(200));
    }
}
