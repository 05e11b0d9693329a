//! Streaming CSV row tokenizer.
//!
//! Splits a byte stream into logical CSV rows: comma-separated fields,
//! LF or CRLF terminators, RFC 4180 quoting with `""` escapes and embedded
//! newlines inside quotes. Blank lines come out as a one-element row holding
//! an empty string, distinct from end of stream.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::{Error, Result};

pub(crate) struct Tokenizer<R> {
    reader: R,
    /// 1-based number of the next line to be read.
    line: u64,
    /// Line on which the most recently returned row began.
    row_line: u64,
    eof: bool,
}

impl<R: AsyncBufRead + Unpin> Tokenizer<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            reader,
            line: 1,
            row_line: 0,
            eof: false,
        }
    }

    /// Line on which the row returned by the last `next_row` call started.
    pub(crate) fn row_line(&self) -> u64 {
        self.row_line
    }

    /// Read the next logical row. Returns `None` at end of stream.
    pub(crate) async fn next_row(&mut self) -> Result<Option<Vec<String>>> {
        if self.eof {
            return Ok(None);
        }
        self.row_line = self.line;

        let mut fields: Vec<String> = Vec::new();
        let mut field: Vec<u8> = Vec::new();
        let mut any_input = false;
        let mut in_quotes = false;
        let mut quoted_field = false;

        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                self.eof = true;
                if in_quotes {
                    return Err(Error::Schema {
                        line: self.row_line,
                        message: "unterminated quoted field".to_string(),
                    });
                }
                if !any_input {
                    return Ok(None);
                }
                fields.push(take_field(&mut field, self.row_line)?);
                return Ok(Some(fields));
            }

            let mut consumed = 0;
            let mut row_done = false;
            for (i, &b) in buf.iter().enumerate() {
                consumed = i + 1;
                any_input = true;
                if in_quotes {
                    match b {
                        b'"' => {
                            // closing quote, or first half of an escaped one;
                            // decided when the next byte arrives
                            in_quotes = false;
                        }
                        b'\n' => {
                            self.line += 1;
                            field.push(b);
                        }
                        _ => field.push(b),
                    }
                    continue;
                }
                match b {
                    b'"' if quoted_field => {
                        // "" inside a quoted field is a literal quote
                        field.push(b'"');
                        in_quotes = true;
                    }
                    b'"' if field.is_empty() => {
                        quoted_field = true;
                        in_quotes = true;
                    }
                    b'"' => {
                        return Err(Error::Schema {
                            line: self.row_line,
                            message: "unexpected quote in unquoted field".to_string(),
                        });
                    }
                    b',' => {
                        fields.push(take_field(&mut field, self.row_line)?);
                        quoted_field = false;
                    }
                    b'\n' => {
                        self.line += 1;
                        // tolerate CRLF
                        if field.last() == Some(&b'\r') && !quoted_field {
                            field.pop();
                        }
                        fields.push(take_field(&mut field, self.row_line)?);
                        row_done = true;
                        break;
                    }
                    _ if quoted_field => {
                        // only a CR belonging to a CRLF terminator may follow
                        // a closing quote
                        if b != b'\r' {
                            return Err(Error::Schema {
                                line: self.row_line,
                                message: "unexpected data after closing quote".to_string(),
                            });
                        }
                    }
                    _ => field.push(b),
                }
            }
            self.reader.consume(consumed);
            if row_done {
                return Ok(Some(fields));
            }
        }
    }
}

fn take_field(field: &mut Vec<u8>, line: u64) -> Result<String> {
    let bytes = std::mem::take(field);
    String::from_utf8(bytes).map_err(|_| Error::Schema {
        line,
        message: "invalid UTF-8 in field".to_string(),
    })
}

/// Whether a tokenizer row is a blank line (a single empty field).
pub(crate) fn is_blank(row: &[String]) -> bool {
    row.len() == 1 && row[0].is_empty()
}
