//! Streaming reader for multi-table annotated CSV results.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use tokio::io::{AsyncRead, BufReader};

use super::decode::{
    build_record_plan, build_slice_plan, FromRow, RecordPlan, SliceElement, SlicePlan,
};
use super::tokenizer::{is_blank, Tokenizer};
use crate::error::{Error, Result};

/// Schema of one column of the current section.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Column {
    /// Column name from the header row.
    pub name: String,
    /// Raw type from the `#datatype` annotation; empty when the annotation
    /// was absent. Unrecognized types decode as strings.
    pub data_type: String,
    /// Whether the column is part of the group key (`#group`).
    pub group: bool,
    /// Default substituted for empty cells (`#default`).
    pub default: String,
}

#[derive(Debug, PartialEq, Eq)]
enum State {
    BeforeFirstSection,
    InSection,
    Between,
    End,
}

/// Reader over an annotated CSV stream as returned by the query endpoint.
///
/// The stream consists of sections (tables): an optional block of
/// annotation rows (`#datatype`, `#group`, `#default`), a header row, then
/// data rows, terminated by a blank line. [`next_section`] advances table
/// by table, [`next_row`] row by row; the current row is decoded with
/// [`decode`] or [`decode_slice`] before the next advance overwrites it.
///
/// Errors are sticky: after the first failure both advance methods keep
/// returning `false` and [`err`] reports what happened.
///
/// [`next_section`]: Reader::next_section
/// [`next_row`]: Reader::next_row
/// [`decode`]: Reader::decode
/// [`decode_slice`]: Reader::decode_slice
/// [`err`]: Reader::err
pub struct Reader<R> {
    tok: Tokenizer<BufReader<R>>,
    state: State,
    cols: Vec<Column>,
    name_index: HashMap<String, usize>,
    row: Vec<String>,
    row_line: u64,
    current_line: u64,
    section_width: usize,
    pending: Option<(Vec<String>, u64)>,
    err: Option<Error>,
    plan: Option<(TypeId, Box<dyn Any + Send>)>,
}

impl<R: AsyncRead + Unpin> Reader<R> {
    /// Create a reader over a raw byte stream.
    pub fn new(reader: R) -> Self {
        Self {
            tok: Tokenizer::new(BufReader::new(reader)),
            state: State::BeforeFirstSection,
            cols: Vec::new(),
            name_index: HashMap::new(),
            row: Vec::new(),
            row_line: 0,
            current_line: 0,
            section_width: 0,
            pending: None,
            err: None,
            plan: None,
        }
    }

    /// Advance to the next section, parsing its annotations and header.
    /// Returns `false` at end of stream or on error.
    pub async fn next_section(&mut self) -> bool {
        if self.err.is_some() || self.state == State::End {
            return false;
        }
        match self.read_section().await {
            Ok(found) => {
                self.state = if found { State::InSection } else { State::End };
                found
            }
            Err(e) => {
                self.err = Some(e);
                false
            }
        }
    }

    /// Advance to the next data row of the current section. Returns `false`
    /// at the section end (blank line or a new annotation block) or on
    /// error.
    pub async fn next_row(&mut self) -> bool {
        if self.err.is_some() || self.state != State::InSection {
            return false;
        }
        match self.read_row().await {
            Ok(has_row) => has_row,
            Err(e) => {
                self.err = Some(e);
                false
            }
        }
    }

    /// Schema of the current section.
    pub fn columns(&self) -> &[Column] {
        &self.cols
    }

    /// Index of the named column in [`columns`](Reader::columns); on
    /// duplicate names, the first occurrence wins.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.name_index.get(name).copied()
    }

    /// Raw cells of the current row, aligned with
    /// [`columns`](Reader::columns).
    pub fn row(&self) -> &[String] {
        &self.row
    }

    /// The sticky first error, if any.
    pub fn err(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    /// Decode the current row into a record type.
    ///
    /// Note that decoding succeeds even when some record fields have no
    /// matching column in the current section: those fields keep their zero
    /// value. Columns not bound by any field are ignored.
    pub fn decode<T: FromRow>(&mut self) -> Result<T> {
        self.ensure_row()?;
        let key = TypeId::of::<T>();
        if self.plan.as_ref().map(|(k, _)| *k) != Some(key) {
            let plan = build_record_plan::<T>(&self.cols)?;
            self.plan = Some((key, Box::new(plan)));
        }
        let plan = self
            .plan
            .as_ref()
            .and_then(|(_, p)| p.downcast_ref::<RecordPlan<T>>())
            .ok_or_else(|| Error::DecodeSetup("decode plan type mismatch".to_string()))?;
        plan.decode(&self.cols, &self.row, self.row_line)
    }

    /// Decode the current row into a positional sequence of `String` or
    /// [`Value`](crate::Value) elements. The vector is resized to the
    /// column count, reusing its storage. Decoding into strings never
    /// fails.
    pub fn decode_slice<E: SliceElement>(&mut self, out: &mut Vec<E>) -> Result<()> {
        self.ensure_row()?;
        let key = TypeId::of::<Vec<E>>();
        if self.plan.as_ref().map(|(k, _)| *k) != Some(key) {
            let plan = build_slice_plan::<E>(&self.cols)?;
            self.plan = Some((key, Box::new(plan)));
        }
        let plan = self
            .plan
            .as_ref()
            .and_then(|(_, p)| p.downcast_ref::<SlicePlan>())
            .ok_or_else(|| Error::DecodeSetup("decode plan type mismatch".to_string()))?;
        plan.decode(&self.cols, &self.row, self.row_line, out)
    }

    /// Release the underlying stream.
    pub fn close(self) {}

    fn ensure_row(&self) -> Result<()> {
        if self.state != State::InSection || self.row.is_empty() {
            return Err(Error::DecodeSetup("no current row to decode".to_string()));
        }
        Ok(())
    }

    async fn take_row(&mut self) -> Result<Option<Vec<String>>> {
        if let Some((row, line)) = self.pending.take() {
            self.current_line = line;
            return Ok(Some(row));
        }
        let row = self.tok.next_row().await?;
        self.current_line = self.tok.row_line();
        Ok(row)
    }

    fn check_width(&self, row: &[String]) -> Result<()> {
        if row.len() != self.section_width {
            return Err(Error::Schema {
                line: self.current_line,
                message: format!(
                    "expected {} fields in row, got {}",
                    self.section_width,
                    row.len()
                ),
            });
        }
        Ok(())
    }

    async fn read_section(&mut self) -> Result<bool> {
        // skim whatever is left of the current section
        if self.state == State::InSection {
            loop {
                let row = match self.take_row().await? {
                    Some(row) => row,
                    None => break,
                };
                if is_blank(&row) {
                    break;
                }
                if row[0].starts_with('#') {
                    self.pending = Some((row, self.current_line));
                    break;
                }
                self.check_width(&row)?;
            }
        }

        // skip blank separator rows, then gather the annotation block
        let mut row = loop {
            match self.take_row().await? {
                None => return Ok(false),
                Some(row) if is_blank(&row) => continue,
                Some(row) => break row,
            }
        };
        self.section_width = row.len();

        let mut datatypes: Vec<String> = Vec::new();
        let mut groups: Vec<String> = Vec::new();
        let mut defaults: Vec<String> = Vec::new();
        while row[0].starts_with('#') {
            self.check_width(&row)?;
            match row[0].as_str() {
                "#datatype" => datatypes = row[1..].to_vec(),
                "#group" => groups = row[1..].to_vec(),
                "#default" => defaults = row[1..].to_vec(),
                _ => {} // unknown annotations are ignored
            }
            row = match self.take_row().await? {
                Some(next) if !is_blank(&next) => next,
                _ => {
                    return Err(Error::Schema {
                        line: self.current_line,
                        message: "missing header row after annotations".to_string(),
                    })
                }
            };
        }

        // `row` is the header; cell 0 is the record indicator slot
        self.check_width(&row)?;
        self.cols = row
            .iter()
            .skip(1)
            .enumerate()
            .map(|(i, name)| Column {
                name: name.clone(),
                data_type: datatypes.get(i).cloned().unwrap_or_default(),
                group: groups.get(i).map(|g| g == "true").unwrap_or(false),
                default: defaults.get(i).cloned().unwrap_or_default(),
            })
            .collect();
        self.name_index.clear();
        for (i, col) in self.cols.iter().enumerate() {
            self.name_index.entry(col.name.clone()).or_insert(i);
        }
        self.row.clear();
        self.plan = None;
        Ok(true)
    }

    async fn read_row(&mut self) -> Result<bool> {
        let mut row = match self.take_row().await? {
            Some(row) => row,
            None => {
                self.state = State::End;
                return Ok(false);
            }
        };
        if is_blank(&row) {
            self.state = State::Between;
            return Ok(false);
        }
        if row[0].starts_with('#') {
            // next section starts without a separating blank line
            self.pending = Some((row, self.current_line));
            self.state = State::Between;
            return Ok(false);
        }
        self.check_width(&row)?;
        row.remove(0);
        self.row = row;
        self.row_line = self.current_line;
        Ok(true)
    }
}
