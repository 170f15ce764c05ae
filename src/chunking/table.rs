//! Table rendering and surrounding-context extraction.

use crate::extraction::{Span, Table};

/// Render a table as compact HTML-like markup, one `<tr>` per row.
///
/// Header cells become `<th>`, everything else `<td>`. Spans larger than one are kept as
/// `colSpan`/`rowSpan` attributes.
pub fn render_table(table: &Table) -> String {
    let mut markup = String::from("<table>");
    for row in 0..table.row_count {
        let mut cells: Vec<_> = table
            .cells
            .iter()
            .filter(|cell| cell.row_index == row)
            .collect();
        cells.sort_by_key(|cell| cell.column_index);

        markup.push_str("<tr>");
        for cell in cells {
            let tag = if cell.is_header() { "th" } else { "td" };
            let mut attributes = String::new();
            if cell.column_span > 1 {
                attributes.push_str(&format!(" colSpan={}", cell.column_span));
            }
            if cell.row_span > 1 {
                attributes.push_str(&format!(" rowSpan={}", cell.row_span));
            }
            markup.push_str(&format!(
                "<{tag}{attributes}>{}</{tag}>",
                escape_html(&cell.content)
            ));
        }
        markup.push_str(" </tr>");
    }
    markup.push_str("</table>");
    markup
}

/// Up to `window` characters immediately before the table's first cell, skipping table text.
pub fn context_before(content: &[char], table: &Table, extents: &[Span], window: usize) -> String {
    let Some(first) = table.first_cell_offset() else {
        return String::new();
    };
    let end = first.min(content.len());
    let start = end.saturating_sub(window);
    collect_outside_tables(content, start, end, extents)
}

/// Up to `window` characters immediately after the table's last cell, skipping table text.
pub fn context_after(content: &[char], table: &Table, extents: &[Span], window: usize) -> String {
    let Some(last) = table.last_cell_end() else {
        return String::new();
    };
    let start = last.min(content.len());
    let end = start.saturating_add(window).min(content.len());
    collect_outside_tables(content, start, end, extents)
}

fn collect_outside_tables(content: &[char], start: usize, end: usize, extents: &[Span]) -> String {
    let text: String = (start..end)
        .filter(|index| !extents.iter().any(|extent| extent.contains(*index)))
        .map(|index| content[index])
        .collect();
    text.trim().to_string()
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
