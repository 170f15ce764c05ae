//! Table-aware, token-budgeted chunking of an extraction result.

use crate::config::Config;
use crate::extraction::{ExtractionResult, Paragraph, Span};
use crate::sync::FileDescriptor;

use super::ChunkingError;
use super::section::{Section, section_id};
use super::table::{context_after, context_before, render_table};
use super::tokenizer::{TokenCounter, build_token_counter};

/// Empirical tokens-per-word ratio used to turn the token overlap into a word count.
pub const TOKENS_PER_WORD: f64 = 0.75;

/// Documents above this page count are processed but flagged in the logs.
pub const LARGE_DOCUMENT_PAGES: usize = 100;

/// Budgets applied while chunking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkingOptions {
    /// Token budget per paragraph chunk.
    pub token_limit: usize,
    /// Overlap budget: characters of table context, and tokens carried between chunks.
    pub token_overlap: usize,
    /// Trailing chunks must have more characters than this to be kept.
    pub min_chunk_size: usize,
    /// Ratio used to convert `token_overlap` into carried words.
    pub tokens_per_word: f64,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            token_limit: 2048,
            token_overlap: 200,
            min_chunk_size: 100,
            tokens_per_word: TOKENS_PER_WORD,
        }
    }
}

impl ChunkingOptions {
    /// Read the budgets from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            token_limit: config.chunk_token_limit,
            token_overlap: config.chunk_token_overlap,
            min_chunk_size: config.chunk_min_size,
            tokens_per_word: TOKENS_PER_WORD,
        }
    }

    /// Number of trailing words carried into the next chunk.
    pub fn overlap_words(&self) -> usize {
        (self.token_overlap as f64 / self.tokens_per_word).round() as usize
    }
}

/// Splits extraction results into [`Section`]s.
///
/// Tables are emitted first, each with up to `token_overlap` characters of surrounding text.
/// Paragraphs outside tables are then accumulated until the token budget is reached.
pub struct ChunkingEngine {
    options: ChunkingOptions,
    counter: TokenCounter,
}

impl std::fmt::Debug for ChunkingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkingEngine")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

struct SectionBuilder<'a> {
    document: &'a FileDescriptor,
    sequence: usize,
    sections: Vec<Section>,
}

impl SectionBuilder<'_> {
    fn push(&mut self, content: String, page_number: u32) {
        self.sequence += 1;
        let id = section_id(&self.document.name, self.sequence);
        self.sections.push(Section {
            page: id.clone(),
            id,
            content,
            title: self.document.name.clone(),
            filename: self.document.name.clone(),
            folder: self.document.folder.clone(),
            year: self.document.year.clone(),
            category: String::new(),
            page_number,
            file_uri: self.document.uri.clone(),
            group_ids: self.document.group_ids.clone(),
        });
    }
}

impl ChunkingEngine {
    /// Create an engine with explicit options and token counter.
    pub fn new(options: ChunkingOptions, counter: TokenCounter) -> Result<Self, ChunkingError> {
        if options.token_limit == 0 {
            return Err(ChunkingError::InvalidTokenLimit);
        }
        if !(options.tokens_per_word > 0.0) {
            return Err(ChunkingError::InvalidTokensPerWord(options.tokens_per_word));
        }
        Ok(Self { options, counter })
    }

    /// Create an engine using the tokenizer of the configured embedding model.
    pub fn from_config(config: &Config) -> Result<Self, ChunkingError> {
        let (provider, model) = config.require_embedding()?;
        let counter = build_token_counter(provider, model)?;
        Self::new(ChunkingOptions::from_config(config), counter)
    }

    /// Active options.
    pub fn options(&self) -> &ChunkingOptions {
        &self.options
    }

    /// Chunk `result`, attributing every section to `document`.
    ///
    /// An empty vector is a valid outcome for short documents without tables.
    pub fn chunk(&self, document: &FileDescriptor, result: &ExtractionResult) -> Vec<Section> {
        if result.page_count() > LARGE_DOCUMENT_PAGES {
            tracing::warn!(
                document = %document.name,
                pages = result.page_count(),
                "Document exceeds {LARGE_DOCUMENT_PAGES} pages; consider splitting it"
            );
        }

        let content: Vec<char> = result.content.chars().collect();
        let extents: Vec<Span> = result.tables.iter().filter_map(|table| table.extent()).collect();
        let mut builder = SectionBuilder {
            document,
            sequence: 0,
            sections: Vec::new(),
        };

        for table in &result.tables {
            let markup = render_table(table);
            let before = context_before(&content, table, &extents, self.options.token_overlap);
            let after = context_after(&content, table, &extents, self.options.token_overlap);
            let page = table.page_number();
            tracing::debug!(
                document = %document.name,
                page,
                before = before.chars().count(),
                after = after.chars().count(),
                "Recognized table"
            );
            builder.push(format!("{before}\n{markup}\n{after}"), page);
        }
        let tables = builder.sections.len();

        self.chunk_paragraphs(&result.paragraphs, &extents, &mut builder);

        tracing::debug!(
            document = %document.name,
            tables,
            paragraphs = builder.sections.len() - tables,
            "Chunked document"
        );
        builder.sections
    }

    fn chunk_paragraphs(
        &self,
        paragraphs: &[Paragraph],
        extents: &[Span],
        builder: &mut SectionBuilder<'_>,
    ) {
        let mut buffer = String::new();
        let mut page = 1;

        for paragraph in paragraphs {
            if in_table(paragraph, extents) {
                continue;
            }
            page = paragraph.page_number();

            let joined = join(&buffer, &paragraph.content);
            if (self.counter)(&joined) < self.options.token_limit {
                buffer = joined;
                continue;
            }

            if !buffer.trim().is_empty() {
                let seed = tail_words(&buffer, self.options.overlap_words());
                builder.push(std::mem::take(&mut buffer), page);
                buffer = join(&seed, &paragraph.content);
            } else {
                buffer = paragraph.content.clone();
            }
        }

        if buffer.trim().chars().count() > self.options.min_chunk_size {
            builder.push(buffer, page);
        }
    }
}

fn in_table(paragraph: &Paragraph, extents: &[Span]) -> bool {
    paragraph
        .spans
        .iter()
        .any(|span| extents.iter().any(|extent| extent.overlaps(span)))
}

fn join(buffer: &str, paragraph: &str) -> String {
    if buffer.is_empty() {
        paragraph.to_string()
    } else {
        format!("{buffer}\n{paragraph}")
    }
}

fn tail_words(text: &str, count: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    words[words.len().saturating_sub(count)..].join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::tokenizer::whitespace_counter;
    use serde_json::json;
    use std::collections::BTreeSet;
    use time::macros::datetime;

    fn document() -> FileDescriptor {
        FileDescriptor::new(
            "file:///lib/Annual Report.pdf",
            "Annual Report.pdf",
            "lib",
            datetime!(2024-01-15 00:00 UTC),
            "3",
            BTreeSet::from(["finance".to_string()]),
        )
    }

    fn engine(token_limit: usize, token_overlap: usize, min_chunk_size: usize) -> ChunkingEngine {
        ChunkingEngine::new(
            ChunkingOptions {
                token_limit,
                token_overlap,
                min_chunk_size,
                tokens_per_word: TOKENS_PER_WORD,
            },
            whitespace_counter(),
        )
        .expect("engine")
    }

    fn paragraph(content: &str, offset: usize, page: u32) -> serde_json::Value {
        json!({
            "content": content,
            "spans": [{"offset": offset, "length": content.chars().count()}],
            "boundingRegions": [{"pageNumber": page}]
        })
    }

    #[test]
    fn tables_are_isolated_from_paragraph_chunks() {
        let content = format!(
            "{}{}{}{}{}{}{}",
            "a".repeat(50),
            "B".repeat(40),
            "c".repeat(10),
            "T".repeat(100),
            "d".repeat(10),
            "E".repeat(50),
            "f".repeat(40)
        );
        let result = ExtractionResult::from_value(json!({
            "content": content,
            "paragraphs": [
                paragraph(&"B".repeat(40), 50, 1),
                paragraph(&"T".repeat(50), 100, 2),
                paragraph(&"E".repeat(50), 210, 2)
            ],
            "tables": [{
                "rowCount": 1,
                "columnCount": 2,
                "cells": [
                    {"rowIndex": 0, "columnIndex": 0, "content": "T".repeat(50),
                     "spans": [{"offset": 100, "length": 50}],
                     "boundingRegions": [{"pageNumber": 2}]},
                    {"rowIndex": 0, "columnIndex": 1, "content": "T".repeat(50),
                     "spans": [{"offset": 150, "length": 50}]}
                ]
            }]
        }))
        .expect("result");

        let sections = engine(2048, 200, 10).chunk(&document(), &result);
        assert_eq!(sections.len(), 2);

        let table = &sections[0];
        assert_eq!(table.page_number, 2);
        assert!(table.content.starts_with(&format!("{}{}{}\n<table>", "a".repeat(50), "B".repeat(40), "c".repeat(10))));
        assert!(table.content.ends_with(&format!("</table>\n{}{}{}", "d".repeat(10), "E".repeat(50), "f".repeat(40))));

        let text = &sections[1];
        assert_eq!(text.content, format!("{}\n{}", "B".repeat(40), "E".repeat(50)));
        assert!(!text.content.contains('T'));
    }

    #[test]
    fn splits_on_token_budget_and_seeds_overlap() {
        let result = ExtractionResult::from_value(json!({
            "content": "a1 a2 a3 a4\nb1 b2 b3 b4\nc1 c2 c3 c4",
            "paragraphs": [
                paragraph("a1 a2 a3 a4", 0, 1),
                paragraph("b1 b2 b3 b4", 12, 1),
                paragraph("c1 c2 c3 c4", 24, 2)
            ]
        }))
        .expect("result");

        // overlap of 3 tokens carries round(3 / 0.75) = 4 words.
        let sections = engine(10, 3, 5).chunk(&document(), &result);

        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].content, "a1 a2 a3 a4\nb1 b2 b3 b4");
        assert_eq!(sections[0].page_number, 2);
        assert_eq!(sections[1].content, "b1 b2 b3 b4\nc1 c2 c3 c4");
    }

    #[test]
    fn short_trailing_buffer_is_discarded() {
        let result = ExtractionResult::from_value(json!({
            "content": "Just a short note.",
            "paragraphs": [paragraph("Just a short note.", 0, 1)]
        }))
        .expect("result");

        assert!(engine(2048, 200, 100).chunk(&document(), &result).is_empty());
    }

    #[test]
    fn tables_without_paragraphs_yield_one_section_each() {
        let cell = |offset: usize| {
            json!({"rowIndex": 0, "columnIndex": 0, "content": "x",
                   "spans": [{"offset": offset, "length": 1}]})
        };
        let result = ExtractionResult::from_value(json!({
            "content": "x y",
            "tables": [
                {"rowCount": 1, "columnCount": 1, "cells": [cell(0)]},
                {"rowCount": 1, "columnCount": 1, "cells": [cell(2)]}
            ]
        }))
        .expect("result");

        let sections = engine(2048, 200, 100).chunk(&document(), &result);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].page_number, 1);
        assert!(sections.iter().all(|s| s.content.contains("<td>x</td>")));
    }

    #[test]
    fn section_ids_and_metadata_are_stable() {
        let result = ExtractionResult::from_value(json!({
            "content": "word ".repeat(40),
            "paragraphs": [paragraph(&"word ".repeat(40), 0, 1)]
        }))
        .expect("result");
        let engine = engine(2048, 200, 10);

        let first = engine.chunk(&document(), &result);
        let second = engine.chunk(&document(), &result);
        assert_eq!(first, second);
        assert_eq!(first[0].id, "Annual_Report_pdf-1");
        assert_eq!(first[0].page, first[0].id);
        assert_eq!(first[0].title, "Annual Report.pdf");
        assert!(first[0].group_ids.contains("finance"));
    }

    #[test]
    fn rejects_zero_token_limit() {
        let error = ChunkingEngine::new(
            ChunkingOptions {
                token_limit: 0,
                ..ChunkingOptions::default()
            },
            whitespace_counter(),
        )
        .expect_err("invalid");
        assert!(matches!(error, ChunkingError::InvalidTokenLimit));
    }

    #[test]
    fn overlap_words_uses_tokens_per_word_ratio() {
        assert_eq!(ChunkingOptions::default().overlap_words(), 267);
    }
}
