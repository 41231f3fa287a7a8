//! Frame parser — raw serial bytes to validated readings.
//!
//! The device emits line-terminated ASCII records, one reading per line,
//! numeric fields separated by commas. Chunks arrive at arbitrary
//! boundaries, so a partial line is buffered until a terminator is seen.
//! A line that fails to parse is discarded and reported (non-fatal);
//! parsing resumes at the next terminator. The parser holds no state
//! beyond the current partial-line buffer.

use serde::{Deserialize, Serialize};

use crate::errors::FrameError;
use crate::ids::DeviceId;
use crate::reading::Reading;

/// Default bound on an unterminated line before it is dropped.
pub const DEFAULT_MAX_LINE_LEN: usize = 512;

/// Parser tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameParserConfig {
    /// Declared field count. `None` accepts any non-zero count.
    #[serde(default)]
    pub expected_fields: Option<usize>,
    /// Maximum unterminated line length before the buffer is dropped with
    /// a [`FrameError::Overflow`].
    #[serde(default = "default_max_line_len")]
    pub max_line_len: usize,
}

fn default_max_line_len() -> usize {
    DEFAULT_MAX_LINE_LEN
}

impl Default for FrameParserConfig {
    fn default() -> Self {
        Self {
            expected_fields: None,
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }
}

/// One result from feeding bytes to the parser, in input order.
#[derive(Clone, Debug, PartialEq)]
pub enum FrameOutcome {
    /// A validated reading.
    Reading(Reading),
    /// A discarded line (or overflowed buffer). Logged by the caller;
    /// never fatal.
    Error(FrameError),
}

/// Incremental line-oriented parser over the serial byte stream.
pub struct FrameParser {
    device_id: DeviceId,
    config: FrameParserConfig,
    buf: Vec<u8>,
    /// Set after an overflow: discard bytes until the next terminator.
    skipping: bool,
}

impl FrameParser {
    /// Create a parser producing readings attributed to `device_id`.
    #[must_use]
    pub fn new(device_id: DeviceId, config: FrameParserConfig) -> Self {
        Self {
            device_id,
            config,
            buf: Vec::new(),
            skipping: false,
        }
    }

    /// Feed a chunk of bytes, returning outcomes in input order.
    ///
    /// Readings never merge across lines and never reorder: each `\n`
    /// (or `\r\n`) terminates exactly one record.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<FrameOutcome> {
        let mut out = Vec::new();
        for &byte in chunk {
            if byte == b'\n' {
                if self.skipping {
                    // Tail of an overflowed line; already reported.
                    self.skipping = false;
                    continue;
                }
                let line = std::mem::take(&mut self.buf);
                if let Some(outcome) = self.parse_line(&line) {
                    out.push(outcome);
                }
            } else if self.skipping {
                // Discard until the next terminator.
            } else {
                self.buf.push(byte);
                if self.buf.len() > self.config.max_line_len {
                    let dropped = self.buf.len();
                    self.buf.clear();
                    self.skipping = true;
                    out.push(FrameOutcome::Error(FrameError::Overflow {
                        max_len: self.config.max_line_len,
                        dropped,
                    }));
                }
            }
        }
        out
    }

    /// Bytes currently buffered awaiting a terminator.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    fn parse_line(&self, line: &[u8]) -> Option<FrameOutcome> {
        let text = String::from_utf8_lossy(line);
        let text = text.trim_end_matches('\r');
        if text.trim().is_empty() {
            // Blank lines between records are tolerated silently.
            return None;
        }

        let fields: Vec<&str> = text.split(',').collect();
        if let Some(expected) = self.config.expected_fields {
            if fields.len() != expected {
                return Some(FrameOutcome::Error(FrameError::FieldCount {
                    expected,
                    actual: fields.len(),
                }));
            }
        }

        let mut values = Vec::with_capacity(fields.len());
        for (index, field) in fields.iter().enumerate() {
            match field.trim().parse::<f64>() {
                Ok(v) => values.push(v),
                Err(_) => {
                    return Some(FrameOutcome::Error(FrameError::NonNumeric {
                        index,
                        text: (*field).to_owned(),
                    }));
                }
            }
        }

        Some(FrameOutcome::Reading(Reading::now(
            self.device_id.clone(),
            values,
        )))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn parser() -> FrameParser {
        FrameParser::new(DeviceId::from("dev-test"), FrameParserConfig::default())
    }

    fn parser_with(config: FrameParserConfig) -> FrameParser {
        FrameParser::new(DeviceId::from("dev-test"), config)
    }

    fn readings(outcomes: &[FrameOutcome]) -> Vec<Vec<f64>> {
        outcomes
            .iter()
            .filter_map(|o| match o {
                FrameOutcome::Reading(r) => Some(r.values.clone()),
                FrameOutcome::Error(_) => None,
            })
            .collect()
    }

    fn errors(outcomes: &[FrameOutcome]) -> Vec<FrameError> {
        outcomes
            .iter()
            .filter_map(|o| match o {
                FrameOutcome::Error(e) => Some(e.clone()),
                FrameOutcome::Reading(_) => None,
            })
            .collect()
    }

    #[test]
    fn single_line() {
        let mut p = parser();
        let out = p.push(b"23.5,61.2\n");
        assert_eq!(readings(&out), vec![vec![23.5, 61.2]]);
        assert!(errors(&out).is_empty());
    }

    #[test]
    fn bad_line_discarded_good_lines_kept() {
        // Middle line malformed; neighbors still parse.
        let mut p = parser();
        let out = p.push(b"23.5,61.2\n12x,9\n24.0,60.9\n");
        assert_eq!(readings(&out), vec![vec![23.5, 61.2], vec![24.0, 60.9]]);
        let errs = errors(&out);
        assert_eq!(errs.len(), 1);
        assert_matches!(errs[0], FrameError::NonNumeric { index: 0, .. });
    }

    #[test]
    fn order_and_count_preserved() {
        let mut p = parser();
        let mut input = Vec::new();
        for i in 0..50 {
            input.extend_from_slice(format!("{i}.0,{i}.5\n").as_bytes());
        }
        let out = p.push(&input);
        let got = readings(&out);
        assert_eq!(got.len(), 50);
        for (i, values) in got.iter().enumerate() {
            assert_eq!(values[0], i as f64);
        }
    }

    #[test]
    fn partial_line_across_chunks() {
        let mut p = parser();
        assert!(p.push(b"23.5,").is_empty());
        assert_eq!(p.pending(), 5);
        let out = p.push(b"61.2\n");
        assert_eq!(readings(&out), vec![vec![23.5, 61.2]]);
        assert_eq!(p.pending(), 0);
    }

    #[test]
    fn byte_at_a_time() {
        let mut p = parser();
        let mut all = Vec::new();
        for &b in b"1.0,2.0\n3.0,4.0\n" {
            all.extend(p.push(&[b]));
        }
        assert_eq!(readings(&all), vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
    }

    #[test]
    fn crlf_terminator_tolerated() {
        let mut p = parser();
        let out = p.push(b"23.5,61.2\r\n");
        assert_eq!(readings(&out), vec![vec![23.5, 61.2]]);
    }

    #[test]
    fn blank_lines_skipped_silently() {
        let mut p = parser();
        let out = p.push(b"\n1.0\n\n2.0\n");
        assert_eq!(readings(&out), vec![vec![1.0], vec![2.0]]);
        assert!(errors(&out).is_empty());
    }

    #[test]
    fn field_count_mismatch_is_one_error() {
        let mut p = parser_with(FrameParserConfig {
            expected_fields: Some(2),
            ..FrameParserConfig::default()
        });
        let out = p.push(b"1.0,2.0,3.0\n");
        assert!(readings(&out).is_empty());
        let errs = errors(&out);
        assert_eq!(errs.len(), 1);
        assert_eq!(
            errs[0],
            FrameError::FieldCount {
                expected: 2,
                actual: 3
            }
        );
    }

    #[test]
    fn field_count_match_accepted() {
        let mut p = parser_with(FrameParserConfig {
            expected_fields: Some(3),
            ..FrameParserConfig::default()
        });
        let out = p.push(b"1,2,3\n");
        assert_eq!(readings(&out), vec![vec![1.0, 2.0, 3.0]]);
    }

    #[test]
    fn non_numeric_field_reports_index() {
        let mut p = parser();
        let out = p.push(b"1.0,abc,3.0\n");
        let errs = errors(&out);
        assert_eq!(errs.len(), 1);
        assert_eq!(
            errs[0],
            FrameError::NonNumeric {
                index: 1,
                text: "abc".into()
            }
        );
    }

    #[test]
    fn overflow_drops_buffer_and_resumes() {
        let mut p = parser_with(FrameParserConfig {
            expected_fields: None,
            max_line_len: 8,
        });
        // 12 bytes without a terminator, then a clean record.
        let out = p.push(b"111111111111\n5.0\n");
        let errs = errors(&out);
        assert_eq!(errs.len(), 1);
        assert!(errs[0].is_overflow());
        assert_eq!(readings(&out), vec![vec![5.0]]);
    }

    #[test]
    fn overflow_reported_once_per_runaway_line() {
        let mut p = parser_with(FrameParserConfig {
            expected_fields: None,
            max_line_len: 4,
        });
        // One very long unterminated line, fed in pieces.
        let mut all = Vec::new();
        all.extend(p.push(b"aaaaaaaa"));
        all.extend(p.push(b"bbbbbbbb"));
        all.extend(p.push(b"\n1.5\n"));
        let errs = errors(&all);
        assert_eq!(errs.len(), 1);
        assert_eq!(readings(&all), vec![vec![1.5]]);
    }

    #[test]
    fn whitespace_around_fields_tolerated() {
        let mut p = parser();
        let out = p.push(b" 23.5 , 61.2 \n");
        assert_eq!(readings(&out), vec![vec![23.5, 61.2]]);
    }

    #[test]
    fn negative_and_integer_fields() {
        let mut p = parser();
        let out = p.push(b"-3.5,42\n");
        assert_eq!(readings(&out), vec![vec![-3.5, 42.0]]);
    }

    #[test]
    fn readings_carry_device_id() {
        let mut p = FrameParser::new(DeviceId::from("dev-42"), FrameParserConfig::default());
        let out = p.push(b"1.0\n");
        match &out[0] {
            FrameOutcome::Reading(r) => assert_eq!(r.device_id.as_str(), "dev-42"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn no_terminator_no_output() {
        let mut p = parser();
        assert!(p.push(b"23.5,61.2").is_empty());
        assert_eq!(p.pending(), 9);
    }
}
