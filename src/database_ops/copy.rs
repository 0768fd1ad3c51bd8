//! CSV encoding of row chunks for `COPY ... FROM STDIN (FORMAT csv)`.
//! Every non-numeric field is quoted.

use csv::{QuoteStyle, Writer, WriterBuilder};

use crate::error::ImportError;
use crate::model::{ReviewRecord, SalesRecord};

fn writer(rows: usize) -> Writer<Vec<u8>> {
    WriterBuilder::new()
        .has_headers(false)
        .quote_style(QuoteStyle::NonNumeric)
        .from_writer(Vec::with_capacity(rows * 96))
}

fn finish(w: Writer<Vec<u8>>, table: &'static str) -> Result<Vec<u8>, ImportError> {
    w.into_inner()
        .map_err(|e| ImportError::encode(table, e.into_error()))
}

fn opt_to_field(v: Option<i32>) -> String {
    v.map(|n| n.to_string()).unwrap_or_default()
}

pub fn encode_sales(rows: &[SalesRecord]) -> Result<Vec<u8>, ImportError> {
    let mut w = writer(rows.len());
    for r in rows {
        w.write_record([
            r.name.clone(),
            r.year.to_string(),
            r.genre.clone(),
            r.publisher.clone(),
            r.na_sales.to_string(),
            r.eu_sales.to_string(),
            r.jp_sales.to_string(),
            r.other_sales.to_string(),
            r.global_sales.to_string(),
        ])
        .map_err(|e| ImportError::encode("sales", e))?;
    }
    finish(w, "sales")
}

pub fn encode_reviews(rows: &[ReviewRecord]) -> Result<Vec<u8>, ImportError> {
    let mut w = writer(rows.len());
    for r in rows {
        w.write_record([
            opt_to_field(r.app_id),
            r.app_name.clone(),
            r.review_text.clone(),
            r.review_score.to_string(),
            opt_to_field(r.review_votes),
        ])
        .map_err(|e| ImportError::encode("reviews", e))?;
    }
    finish(w, "reviews")
}
