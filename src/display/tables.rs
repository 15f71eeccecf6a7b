//! Table formatting utilities for structured output.

use comfy_table::{Attribute, Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use crate::engine::ResolvedHit;
use crate::vector::IndexInfo;

/// Builder for creating formatted tables.
pub struct TableBuilder {
    table: Table,
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TableBuilder {
    /// Create a new table builder.
    pub fn new() -> Self {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.apply_modifier(UTF8_ROUND_CORNERS);
        Self { table }
    }

    /// Set the table headers.
    pub fn set_headers(mut self, headers: Vec<&str>) -> Self {
        let header_cells: Vec<Cell> = headers
            .into_iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect();
        self.table.set_header(header_cells);
        self
    }

    /// Add a row to the table.
    pub fn add_row(mut self, row: Vec<String>) -> Self {
        self.table.add_row(row);
        self
    }

    /// Build and return the formatted table.
    pub fn build(self) -> String {
        self.table.to_string()
    }
}

/// Ranked search hits with their titles and links.
pub fn create_results_table(hits: &[ResolvedHit<'_>]) -> String {
    hits.iter()
        .enumerate()
        .fold(
            TableBuilder::new().set_headers(vec!["#", "Distance", "Id", "Title", "Link"]),
            |table, (rank, hit)| {
                table.add_row(vec![
                    (rank + 1).to_string(),
                    format!("{:.4}", hit.distance),
                    hit.id.to_string(),
                    hit.document.title.clone(),
                    hit.document.link.clone().unwrap_or_default(),
                ])
            },
        )
        .build()
}

/// Key/value summary of a loaded index.
pub fn create_info_table(info: &IndexInfo) -> String {
    let mut table = TableBuilder::new()
        .set_headers(vec!["Property", "Value"])
        .add_row(vec!["Variant".into(), info.variant.to_string()])
        .add_row(vec!["Metric".into(), info.metric.to_string()])
        .add_row(vec!["Dimension".into(), info.dimension.to_string()])
        .add_row(vec!["Documents".into(), info.documents.to_string()]);

    if let Some(partitions) = info.partitions {
        table = table.add_row(vec!["Partitions".into(), partitions.to_string()]);
    }
    if let Some(probes) = info.probes {
        table = table.add_row(vec!["Probes".into(), probes.to_string()]);
    }
    if let Some(largest) = info.largest_partition {
        table = table.add_row(vec!["Largest partition".into(), largest.to_string()]);
    }
    if let Some(seed) = info.seed {
        table = table.add_row(vec!["Seed".into(), seed.to_string()]);
    }

    table
        .add_row(vec!["Model".into(), info.model.clone()])
        .add_row(vec!["Corpus fingerprint".into(), info.corpus_fingerprint.clone()])
        .build()
}
