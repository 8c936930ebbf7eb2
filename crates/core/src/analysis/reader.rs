use std::io::BufRead;

use tracing::{trace, warn};

use crate::analysis::{TraceError, TraceResult};
use crate::model::{RecordKind, TraceRecord, FIELD_DELIMITER};

/// Pulls one `TraceRecord` per physical log line.
///
/// The only retained state is the line counter used in diagnostics. Blank
/// lines (left behind by concurrent writers) are skipped, never treated as
/// end-of-stream.
pub struct EventReader<R> {
    inner: R,
    line_number: usize,
    partial: bool,
    buf: String,
}

impl<R: BufRead> EventReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, line_number: 0, partial: false, buf: String::new() }
    }

    /// In partial mode an unterminated final line that does not parse is
    /// treated as end-of-stream instead of a corrupt record.
    pub fn partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }

    /// Number of the last physical line read (1-based).
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Read the next record; `Ok(None)` marks end-of-stream.
    pub fn read(&mut self) -> TraceResult<Option<TraceRecord>> {
        loop {
            self.buf.clear();
            if self.inner.read_line(&mut self.buf)? == 0 {
                return Ok(None);
            }
            self.line_number += 1;

            let terminated = self.buf.ends_with('\n');
            let text = self.buf.trim_end_matches(['\n', '\r']);
            if text.trim().is_empty() {
                continue;
            }

            return match parse_record(self.line_number, text) {
                Ok(record) => {
                    trace!(line = self.line_number, ?record, "read record");
                    Ok(Some(record))
                }
                Err(err) if self.partial && !terminated => {
                    warn!(line = self.line_number, error = %err, "dropping truncated last line");
                    Ok(None)
                }
                Err(err) => Err(err),
            };
        }
    }
}

/// Parse a single log line (without its line break).
pub fn parse_record(line: usize, text: &str) -> TraceResult<TraceRecord> {
    let malformed = |reason: &str| TraceError::MalformedRecord {
        line,
        content: text.to_string(),
        reason: reason.to_string(),
    };

    let fields: Vec<&str> = text.split(FIELD_DELIMITER).collect();
    if !(3..=4).contains(&fields.len()) {
        return Err(malformed("expected 3 or 4 fields"));
    }

    let depth: u32 = fields[0].parse().map_err(|_| malformed("depth is not a non-negative integer"))?;
    let kind = RecordKind::parse(fields[1]).ok_or_else(|| malformed("unknown record kind"))?;
    if fields.len() != kind.field_count() {
        return Err(malformed(&format!(
            "{} records need {} fields",
            kind.as_str(),
            kind.field_count()
        )));
    }

    let record = match kind {
        RecordKind::Result => TraceRecord::Result {
            depth,
            module: fields[2].to_string(),
            source: fields[3].to_string(),
        },
        RecordKind::Exception => TraceRecord::Exception { depth, message: fields[2].to_string() },
        RecordKind::Call => {
            let from_list = match fields[3] {
                "None" => None,
                rendered => Some(parse_name_list(rendered).map_err(|source| {
                    TraceError::NameList { line, text: rendered.to_string(), source }
                })?),
            };
            TraceRecord::Call { depth, name: fields[2].to_string(), from_list }
        }
    };
    Ok(record)
}

/// Convert a tuple-style rendering such as `('a', 'b')` or `('*',)` into a
/// list of names. List renderings (`['a']`) are accepted as well.
pub fn parse_name_list(rendered: &str) -> Result<Vec<String>, serde_json::Error> {
    let json = rendered.replace('(', "[").replace(",)", "]").replace(')', "]").replace('\'', "\"");
    serde_json::from_str(&json)
}
