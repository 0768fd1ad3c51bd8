//! Chunked CSV reading for the two datasets.
//!
//! A chunk holding a malformed record is discarded as a whole; reading resumes
//! with the next chunk. I/O failures and header problems end the run.

use csv::{ReaderBuilder, StringRecord};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use crate::error::ImportError;

/// Raw sales row, cell text as found in the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawSalesRow {
    pub name: String,
    pub year: String,
    pub genre: String,
    pub publisher: String,
    pub na_sales: String,
    pub eu_sales: String,
    pub jp_sales: String,
    pub other_sales: String,
    pub global_sales: String,
}

/// Raw review row. `app_id` and `review_votes` are absent when the file has
/// no such column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawReviewRow {
    pub app_id: Option<String>,
    pub app_name: String,
    pub review_text: String,
    pub review_score: String,
    pub review_votes: Option<String>,
}

fn position(headers: &StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim().trim_start_matches('\u{feff}').eq_ignore_ascii_case(name))
}

fn required(headers: &StringRecord, name: &'static str, path: &Path) -> Result<usize, ImportError> {
    position(headers, name).ok_or_else(|| ImportError::MissingColumn {
        path: path.to_path_buf(),
        column: name,
    })
}

fn cell(rec: &StringRecord, idx: usize) -> String {
    rec.get(idx).unwrap_or_default().to_string()
}

#[derive(Debug, Clone, Copy)]
pub struct SalesColumns {
    name: usize,
    year: usize,
    genre: usize,
    publisher: usize,
    na_sales: usize,
    eu_sales: usize,
    jp_sales: usize,
    other_sales: usize,
    global_sales: usize,
}

impl SalesColumns {
    pub fn resolve(headers: &StringRecord, path: &Path) -> Result<Self, ImportError> {
        Ok(Self {
            name: required(headers, "Name", path)?,
            year: required(headers, "Year", path)?,
            genre: required(headers, "Genre", path)?,
            publisher: required(headers, "Publisher", path)?,
            na_sales: required(headers, "NA_Sales", path)?,
            eu_sales: required(headers, "EU_Sales", path)?,
            jp_sales: required(headers, "JP_Sales", path)?,
            other_sales: required(headers, "Other_Sales", path)?,
            global_sales: required(headers, "Global_Sales", path)?,
        })
    }

    pub fn extract(&self, rec: &StringRecord) -> RawSalesRow {
        RawSalesRow {
            name: cell(rec, self.name),
            year: cell(rec, self.year),
            genre: cell(rec, self.genre),
            publisher: cell(rec, self.publisher),
            na_sales: cell(rec, self.na_sales),
            eu_sales: cell(rec, self.eu_sales),
            jp_sales: cell(rec, self.jp_sales),
            other_sales: cell(rec, self.other_sales),
            global_sales: cell(rec, self.global_sales),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReviewColumns {
    app_id: Option<usize>,
    app_name: usize,
    review_text: usize,
    review_score: usize,
    review_votes: Option<usize>,
}

impl ReviewColumns {
    pub fn resolve(headers: &StringRecord, path: &Path) -> Result<Self, ImportError> {
        Ok(Self {
            app_id: position(headers, "app_id"),
            app_name: required(headers, "app_name", path)?,
            review_text: required(headers, "review_text", path)?,
            review_score: required(headers, "review_score", path)?,
            review_votes: position(headers, "review_votes"),
        })
    }

    pub fn has_app_id(&self) -> bool {
        self.app_id.is_some()
    }

    pub fn extract(&self, rec: &StringRecord) -> RawReviewRow {
        RawReviewRow {
            app_id: self.app_id.map(|i| cell(rec, i)),
            app_name: cell(rec, self.app_name),
            review_text: cell(rec, self.review_text),
            review_score: cell(rec, self.review_score),
            review_votes: self.review_votes.map(|i| cell(rec, i)),
        }
    }
}

/// One step of a chunked read.
#[derive(Debug)]
pub enum Chunk {
    Records(Vec<StringRecord>),
    /// The chunk contained a record the parser rejected; its rows are dropped.
    Malformed { index: usize, error: csv::Error },
}

pub struct ChunkedCsv<R: Read> {
    reader: csv::Reader<R>,
    path: PathBuf,
    chunk_size: usize,
    chunks_read: usize,
    exhausted: bool,
}

impl ChunkedCsv<BufReader<File>> {
    pub fn open(path: &Path, chunk_size: usize) -> Result<Self, ImportError> {
        let file = File::open(path).map_err(|source| ImportError::SourceIo {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_reader(
            BufReader::with_capacity(8 << 20, file),
            path,
            chunk_size,
        ))
    }
}

impl<R: Read> ChunkedCsv<R> {
    pub fn from_reader(reader: R, path: &Path, chunk_size: usize) -> Self {
        let reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .trim(csv::Trim::None)
            .from_reader(reader);
        Self {
            reader,
            path: path.to_path_buf(),
            chunk_size: chunk_size.max(1),
            chunks_read: 0,
            exhausted: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn headers(&mut self) -> Result<StringRecord, ImportError> {
        self.reader
            .headers()
            .cloned()
            .map_err(|source| ImportError::Csv {
                path: self.path.clone(),
                source,
            })
    }

    /// Read the next chunk of up to `chunk_size` records; `None` at end of input.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>, ImportError> {
        if self.exhausted {
            return Ok(None);
        }
        let index = self.chunks_read;
        let mut records = Vec::with_capacity(self.chunk_size.min(4096));
        let mut first_error: Option<csv::Error> = None;
        let mut consumed = 0usize;

        while consumed < self.chunk_size {
            let mut rec = StringRecord::new();
            match self.reader.read_record(&mut rec) {
                Ok(true) => {
                    consumed += 1;
                    if first_error.is_none() {
                        records.push(rec);
                    }
                }
                Ok(false) => {
                    self.exhausted = true;
                    break;
                }
                Err(err) if err.is_io_error() => {
                    return Err(ImportError::Csv {
                        path: self.path.clone(),
                        source: err,
                    });
                }
                Err(err) => {
                    consumed += 1;
                    if first_error.is_none() {
                        first_error = Some(err);
                        records.clear();
                    }
                }
            }
        }

        if consumed == 0 {
            return Ok(None);
        }
        self.chunks_read += 1;
        Ok(Some(match first_error {
            Some(error) => Chunk::Malformed { index, error },
            None => Chunk::Records(records),
        }))
    }
}
