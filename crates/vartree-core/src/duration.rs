// vartree
// SPDX-License-Identifier: MPL-2.0

//! Parses the `wait` duration strings used by `poll` requests
//! (spec.md §4.2, §6). Follows the original implementation's grammar
//! (Go's `time.ParseDuration`): one or more `<integer><unit>` pairs
//! concatenated and summed, units `ns|us|ms|s|m|h` (SPEC_FULL.md,
//! "Supplemented from original_source").

use std::time::Duration;

use vartree_types::VartreeError;

/// Parses a duration string such as `"30s"`, `"1m30s"`, or `"0s"`.
pub fn parse_wait(input: &str) -> Result<Duration, VartreeError> {
    if input.is_empty() {
        return Err(VartreeError::BadRequest("empty duration".to_owned()));
    }

    let mut total = Duration::ZERO;
    let mut chars = input.char_indices().peekable();
    let mut any_component = false;

    while chars.peek().is_some() {
        let start = chars.peek().unwrap().0;
        let mut end = input.len();
        while let Some(&(idx, c)) = chars.peek() {
            if c.is_ascii_digit() || c == '.' {
                chars.next();
            } else {
                end = idx;
                break;
            }
        }
        if start == end {
            return Err(VartreeError::BadRequest(format!(
                "invalid duration {input:?}: expected a number"
            )));
        }
        let number: f64 = input[start..end].parse().map_err(|_| {
            VartreeError::BadRequest(format!("invalid duration {input:?}: bad number"))
        })?;

        let unit_start = end;
        let mut unit_end = input.len();
        while let Some(&(idx, c)) = chars.peek() {
            if c.is_ascii_digit() || c == '.' {
                unit_end = idx;
                break;
            }
            chars.next();
            unit_end = idx + c.len_utf8();
        }
        let unit = &input[unit_start..unit_end];
        let nanos_per_unit: f64 = match unit {
            "ns" => 1.0,
            "us" | "\u{b5}s" => 1_000.0,
            "ms" => 1_000_000.0,
            "s" => 1_000_000_000.0,
            "m" => 60_000_000_000.0,
            "h" => 3_600_000_000_000.0,
            other => {
                return Err(VartreeError::BadRequest(format!(
                    "invalid duration {input:?}: unknown unit {other:?}"
                )))
            }
        };
        total += Duration::from_nanos((number * nanos_per_unit).round() as u64);
        any_component = true;
    }

    if !any_component {
        return Err(VartreeError::BadRequest(format!(
            "invalid duration {input:?}"
        )));
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_seconds() {
        assert_eq!(parse_wait("30s").unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn parses_zero() {
        assert_eq!(parse_wait("0s").unwrap(), Duration::ZERO);
    }

    #[test]
    fn parses_compound_durations() {
        assert_eq!(
            parse_wait("1m30s").unwrap(),
            Duration::from_secs(90),
            "compound durations sum each component, matching the original parser"
        );
    }

    #[test]
    fn rejects_unknown_unit() {
        assert!(parse_wait("5x").is_err());
    }

    #[test]
    fn rejects_empty() {
        assert!(parse_wait("").is_err());
    }
}
