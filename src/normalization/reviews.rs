use super::{parse_i32, parse_int};
use crate::model::ReviewRecord;
use crate::source::RawReviewRow;

/// Review texts that carry no review content.
pub const SENTINEL_TEXTS: [&str; 3] = ["", ".", "Early Access Review"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReviewFilter {
    /// Drop rows whose source `app_id` is below this (or missing/unparseable).
    pub min_app_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewRejection {
    BelowMinAppId,
    SentinelText,
}

/// Exact match only; padded or whitespace-only text is a real review.
pub fn is_sentinel_text(text: &str) -> bool {
    SENTINEL_TEXTS.contains(&text)
}

/// Double single quotes so stored text matches what earlier loads produced.
pub fn escape_quotes(text: &str) -> String {
    text.replace('\'', "''")
}

/// Normalize one review row, or say why it was filtered out. `app_id` on the
/// result is left for identity resolution.
pub fn clean_review(raw: &RawReviewRow, filter: &ReviewFilter) -> Result<ReviewRecord, ReviewRejection> {
    if let Some(min) = filter.min_app_id {
        let source_id = raw.app_id.as_deref().and_then(parse_int);
        if !matches!(source_id, Some(id) if id >= min) {
            return Err(ReviewRejection::BelowMinAppId);
        }
    }
    if is_sentinel_text(&raw.review_text) {
        return Err(ReviewRejection::SentinelText);
    }
    Ok(ReviewRecord {
        app_id: None,
        app_name: raw.app_name.trim().to_string(),
        review_text: escape_quotes(&raw.review_text),
        review_score: parse_i32(&raw.review_score).unwrap_or(0),
        review_votes: raw.review_votes.as_deref().and_then(parse_i32),
    })
}

/// Cleaned reviews of one chunk plus filter counts.
#[derive(Debug, Default)]
pub struct ReviewBatch {
    pub rows: Vec<ReviewRecord>,
    pub sentinel: u64,
    pub below_min_app_id: u64,
}

pub fn clean_reviews<'a, I>(rows: I, filter: &ReviewFilter) -> ReviewBatch
where
    I: IntoIterator<Item = &'a RawReviewRow>,
{
    let mut batch = ReviewBatch::default();
    for raw in rows {
        match clean_review(raw, filter) {
            Ok(r) => batch.rows.push(r),
            Err(ReviewRejection::SentinelText) => batch.sentinel += 1,
            Err(ReviewRejection::BelowMinAppId) => batch.below_min_app_id += 1,
        }
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(app_id: Option<&str>, name: &str, text: &str) -> RawReviewRow {
        RawReviewRow {
            app_id: app_id.map(str::to_string),
            app_name: name.into(),
            review_text: text.into(),
            review_score: "1".into(),
            review_votes: Some("0".into()),
        }
    }

    #[test]
    fn sentinel_texts_are_dropped() {
        let rows = vec![
            raw(None, "Zelda", ""),
            raw(None, "Zelda", "."),
            raw(None, "Zelda", "Early Access Review"),
            raw(None, "Zelda", "Great game"),
        ];
        let batch = clean_reviews(&rows, &ReviewFilter::default());
        assert_eq!(batch.sentinel, 3);
        assert_eq!(batch.rows.len(), 1);
        assert_eq!(batch.rows[0].review_text, "Great game");
    }

    #[test]
    fn padded_sentinels_and_blank_text_are_kept() {
        let rows = vec![
            raw(None, "Zelda", "   "),
            raw(None, "Zelda", " . "),
            raw(None, "Zelda", "Early Access Review "),
        ];
        let batch = clean_reviews(&rows, &ReviewFilter::default());
        assert_eq!(batch.sentinel, 0);
        let texts: Vec<&str> = batch.rows.iter().map(|r| r.review_text.as_str()).collect();
        assert_eq!(texts, vec!["   ", " . ", "Early Access Review "]);
    }

    #[test]
    fn text_is_kept_verbatim_except_doubled_quotes() {
        let r = clean_review(
            &raw(None, "  Portal 2 ", " It's  a 'classic'. "),
            &ReviewFilter::default(),
        )
        .unwrap();
        assert_eq!(r.app_name, "Portal 2");
        assert_eq!(r.review_text, " It''s  a ''classic''. ");
        assert_eq!(r.app_id, None);
    }

    #[test]
    fn early_access_with_extra_words_is_a_real_review() {
        let r = clean_review(
            &raw(None, "Rust", "Early Access Review, still fun"),
            &ReviewFilter::default(),
        );
        assert!(r.is_ok());
    }

    #[test]
    fn min_app_id_filter() {
        let filter = ReviewFilter {
            min_app_id: Some(10),
        };
        assert_eq!(
            clean_review(&raw(Some("9"), "A", "ok"), &filter),
            Err(ReviewRejection::BelowMinAppId)
        );
        assert_eq!(
            clean_review(&raw(None, "A", "ok"), &filter),
            Err(ReviewRejection::BelowMinAppId)
        );
        assert!(clean_review(&raw(Some("10"), "A", "ok"), &filter).is_ok());
        assert!(clean_review(&raw(Some("220.0"), "A", "ok"), &filter).is_ok());
    }

    #[test]
    fn numeric_columns_are_coerced() {
        let mut row = raw(None, "Zelda", "Great game");
        row.review_score = "-1".into();
        row.review_votes = Some("n/a".into());
        let r = clean_review(&row, &ReviewFilter::default()).unwrap();
        assert_eq!(r.review_score, -1);
        assert_eq!(r.review_votes, None);

        row.review_score = "bad".into();
        row.review_votes = None;
        let r = clean_review(&row, &ReviewFilter::default()).unwrap();
        assert_eq!(r.review_score, 0);
        assert_eq!(r.review_votes, None);
    }
}
