//! Encoding-tolerant CSV reading.
//!
//! Source files arrive in whatever encoding the exporting tool used. Each
//! file is decoded with an ordered list of candidate encodings, first success
//! wins, and then parsed in flexible mode so ragged rows survive:
//!
//! - rows wider than the header get placeholder column names
//!   (`unnamed_col_0`, `unnamed_col_1`, ...)
//! - rows narrower than the header are padded with empty fields
//!
//! Nothing is dropped or truncated at this layer.

use super::error::DataError;
use csv::StringRecord;
use std::borrow::Cow;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Text encodings tried when reading a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    /// Strict UTF-8; a leading byte-order mark is stripped.
    Utf8,
    /// Windows-1252 (the usual "ANSI" export encoding).
    Windows1252,
    /// ISO-8859-1; maps every byte, so it never fails.
    Latin1,
}

impl TextEncoding {
    pub const FALLBACK_ORDER: [TextEncoding; 3] = [
        TextEncoding::Utf8,
        TextEncoding::Windows1252,
        TextEncoding::Latin1,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Windows1252 => "windows-1252",
            TextEncoding::Latin1 => "iso-8859-1",
        }
    }

    /// Decode `bytes`, or `None` if they are not valid in this encoding.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Option<Cow<'a, str>> {
        match self {
            TextEncoding::Utf8 => {
                let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
                std::str::from_utf8(body).ok().map(Cow::Borrowed)
            }
            TextEncoding::Windows1252 => encoding_rs::WINDOWS_1252
                .decode_without_bom_handling_and_without_replacement(bytes),
            TextEncoding::Latin1 => Some(Cow::Owned(bytes.iter().map(|&b| b as char).collect())),
        }
    }
}

/// A parsed CSV table, rectangular after placeholder naming and padding.
#[derive(Debug, Clone)]
pub struct DecodedTable {
    pub encoding: TextEncoding,
    pub headers: StringRecord,
    pub rows: Vec<StringRecord>,
    /// Number of synthesized `unnamed_col_*` headers.
    pub placeholder_columns: usize,
    /// Number of rows that were shorter than the header.
    pub padded_rows: usize,
}

impl DecodedTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Indices of `names`, or `SchemaMismatch` listing every absent column.
    pub fn require_columns(&self, names: &[&str], context: &str) -> Result<Vec<usize>, DataError> {
        let mut indices = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        for name in names {
            match self.column_index(name) {
                Some(idx) => indices.push(idx),
                None => missing.push(*name),
            }
        }
        if missing.is_empty() {
            Ok(indices)
        } else {
            Err(DataError::schema(
                context,
                format!("missing required columns {missing:?}"),
            ))
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Read and decode a CSV file with encoding fallback.
pub fn read_table(path: &Path) -> Result<DecodedTable, DataError> {
    let bytes = fs::read(path).map_err(|e| DataError::io(path, e))?;
    decode_table(&bytes).ok_or_else(|| DataError::EncodingFailure {
        path: path.to_path_buf(),
        tried: TextEncoding::FALLBACK_ORDER
            .iter()
            .map(|e| e.label())
            .collect::<Vec<_>>()
            .join(", "),
    })
}

/// Decode in-memory bytes, trying each encoding in [`TextEncoding::FALLBACK_ORDER`].
pub fn decode_table(bytes: &[u8]) -> Option<DecodedTable> {
    for encoding in TextEncoding::FALLBACK_ORDER {
        let Some(text) = encoding.decode(bytes) else {
            debug!(encoding = encoding.label(), "decode failed, trying next encoding");
            continue;
        };
        match parse_flexible(&text) {
            Ok((headers, rows, placeholder_columns, padded_rows)) => {
                return Some(DecodedTable {
                    encoding,
                    headers,
                    rows,
                    placeholder_columns,
                    padded_rows,
                });
            }
            Err(e) => {
                debug!(encoding = encoding.label(), error = %e, "csv parse failed, trying next encoding");
            }
        }
    }
    None
}

type Parsed = (StringRecord, Vec<StringRecord>, usize, usize);

fn parse_flexible(text: &str) -> Result<Parsed, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut records = reader.records();
    let mut headers = match records.next() {
        Some(header) => header?
            .iter()
            .map(|h| h.trim().to_string())
            .collect::<StringRecord>(),
        None => StringRecord::new(),
    };
    let mut rows = records.collect::<Result<Vec<_>, _>>()?;

    let declared = headers.len();
    let widest = rows.iter().map(StringRecord::len).max().unwrap_or(declared);
    let placeholder_columns = widest.saturating_sub(declared);
    for i in 0..placeholder_columns {
        headers.push_field(&format!("unnamed_col_{i}"));
    }

    let width = headers.len();
    let mut padded_rows = 0;
    for row in &mut rows {
        if row.len() < width {
            padded_rows += 1;
            while row.len() < width {
                row.push_field("");
            }
        }
    }

    Ok((headers, rows, placeholder_columns, padded_rows))
}
