//! CSV record parsing.
//!
//! The board prints `temperature,pH,quality` data lines interleaved with debug
//! chatter such as `Voltage: 2.31`. Debug lines always contain a colon, which is
//! how they are told apart from data.

use crate::RawReading;

/// Why a line produced no reading without being an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Blank line or an expired read
    Empty,
    /// Board debug output
    Diagnostic,
    /// Wrong number of comma-separated fields
    FieldCount(usize),
}

/// Result of parsing one line.
#[derive(Clone, Debug, PartialEq)]
pub enum ParseOutcome {
    Reading(RawReading),
    /// Silently ignored line
    Skipped(SkipReason),
    /// Three fields, but one is not a number; reported and counted
    Malformed { token: String },
}

/// Parse a raw line into a reading.
///
/// Rules apply in order: empty, contains `:`, field count, numeric fields.
/// A record is either complete or absent.
pub fn parse(line: &str) -> ParseOutcome {
    let line = line.trim();
    if line.is_empty() {
        return ParseOutcome::Skipped(SkipReason::Empty);
    }
    if line.contains(':') {
        return ParseOutcome::Skipped(SkipReason::Diagnostic);
    }

    let tokens: Vec<&str> = line.split(',').map(str::trim).collect();
    if tokens.len() != 3 {
        return ParseOutcome::Skipped(SkipReason::FieldCount(tokens.len()));
    }

    let mut values = [0.0f64; 3];
    for (slot, token) in values.iter_mut().zip(&tokens) {
        match token.parse::<f64>() {
            Ok(v) => *slot = v,
            Err(_) => {
                return ParseOutcome::Malformed {
                    token: (*token).to_string(),
                }
            }
        }
    }

    ParseOutcome::Reading(RawReading {
        temperature: values[0],
        ph: values[1],
        quality: values[2],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_data_line() {
        assert_eq!(
            parse("25.0,7.2,45.0"),
            ParseOutcome::Reading(RawReading {
                temperature: 25.0,
                ph: 7.2,
                quality: 45.0
            })
        );
        // Whitespace around fields is tolerated
        assert!(matches!(parse(" 21.5 , 6.9 ,12 \r"), ParseOutcome::Reading(_)));
    }

    #[test]
    fn skips_empty_and_diagnostic_lines() {
        assert_eq!(parse(""), ParseOutcome::Skipped(SkipReason::Empty));
        assert_eq!(parse("   "), ParseOutcome::Skipped(SkipReason::Empty));
        assert_eq!(
            parse("pH Voltage: 2.53"),
            ParseOutcome::Skipped(SkipReason::Diagnostic)
        );
        // A colon wins even when the field count would match
        assert_eq!(
            parse("25.0,7:2,45.0"),
            ParseOutcome::Skipped(SkipReason::Diagnostic)
        );
    }

    #[test]
    fn skips_wrong_field_count() {
        assert_eq!(
            parse("25.0,7.2"),
            ParseOutcome::Skipped(SkipReason::FieldCount(2))
        );
        assert_eq!(
            parse("25.0,7.2,45.0,1"),
            ParseOutcome::Skipped(SkipReason::FieldCount(4))
        );
    }

    #[test]
    fn reports_non_numeric_token() {
        assert_eq!(
            parse("25.0,abc,45.0"),
            ParseOutcome::Malformed {
                token: "abc".to_string()
            }
        );
        assert_eq!(
            parse("25.0,,45.0"),
            ParseOutcome::Malformed {
                token: String::new()
            }
        );
    }
}
