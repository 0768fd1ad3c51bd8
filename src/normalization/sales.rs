use indexmap::IndexMap;

use super::{clean_text, coerce_sales, coerce_year};
use crate::model::{SalesKey, SalesRecord};
use crate::source::RawSalesRow;

/// Normalize a single raw sales row. Platform is not carried over.
pub fn clean_sales_row(raw: &RawSalesRow) -> SalesRecord {
    SalesRecord {
        name: clean_text(&raw.name),
        year: coerce_year(&raw.year),
        genre: clean_text(&raw.genre),
        publisher: clean_text(&raw.publisher),
        na_sales: coerce_sales(&raw.na_sales),
        eu_sales: coerce_sales(&raw.eu_sales),
        jp_sales: coerce_sales(&raw.jp_sales),
        other_sales: coerce_sales(&raw.other_sales),
        global_sales: coerce_sales(&raw.global_sales),
    }
}

/// Collapses rows sharing (name, year, genre, publisher) by summing their
/// figures. Groups keep the order in which their key was first seen.
#[derive(Debug, Default)]
pub struct SalesAggregator {
    groups: IndexMap<SalesKey, SalesRecord>,
    rows_seen: u64,
}

impl SalesAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, raw: &RawSalesRow) {
        self.rows_seen += 1;
        let row = clean_sales_row(raw);
        self.groups
            .entry(row.key())
            .and_modify(|existing| existing.absorb(&row))
            .or_insert(row);
    }

    pub fn rows_seen(&self) -> u64 {
        self.rows_seen
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn finish(self) -> Vec<SalesRecord> {
        self.groups.into_values().collect()
    }
}

/// Clean and aggregate a complete raw sales row set.
pub fn clean_sales<'a, I>(rows: I) -> Vec<SalesRecord>
where
    I: IntoIterator<Item = &'a RawSalesRow>,
{
    let mut agg = SalesAggregator::new();
    for raw in rows {
        agg.push(raw);
    }
    agg.finish()
}
