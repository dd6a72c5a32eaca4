use crate::error::ScenarioError;

/// Parse a task offset into milliseconds.
///
/// A plain number is seconds and may be fractional, as may `s`. The `ms`,
/// `m` and `h` suffixes take integers. Fractions below a millisecond are
/// truncated.
pub fn parse_duration_ms(input: &str) -> Result<i32, ScenarioError> {
    let trimmed = input.trim();
    let invalid = || ScenarioError::InvalidDuration(input.to_string());

    let millis: f64 = if let Some(n) = trimmed.strip_suffix("ms") {
        parse_int(n).ok_or_else(invalid)? as f64
    } else if let Some(n) = trimmed.strip_suffix('s') {
        if !ends_numeric(n) {
            return Err(invalid());
        }
        parse_float(n).ok_or_else(invalid)? * 1000.0
    } else if let Some(n) = trimmed.strip_suffix('m') {
        parse_int(n).ok_or_else(invalid)? as f64 * 60_000.0
    } else if let Some(n) = trimmed.strip_suffix('h') {
        parse_int(n).ok_or_else(invalid)? as f64 * 3_600_000.0
    } else if ends_numeric(trimmed) {
        parse_float(trimmed).ok_or_else(invalid)? * 1000.0
    } else {
        return Err(invalid());
    };

    let millis = millis.trunc();
    if millis < i32::MIN as f64 || millis > i32::MAX as f64 {
        return Err(invalid());
    }
    Ok(millis as i32)
}

fn ends_numeric(s: &str) -> bool {
    s.chars()
        .last()
        .map(|c| c.is_ascii_digit() || c == '.')
        .unwrap_or(false)
}

fn parse_int(s: &str) -> Option<i64> {
    s.parse().ok()
}

fn parse_float(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|f| f.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_table() {
        let cases = [
            ("42s", 42_000),
            ("42ms", 42),
            ("42m", 2_520_000),
            ("42h", 151_200_000),
            ("42", 42_000),
            ("1.5s", 1_500),
            ("0.25", 250),
            (" 10s ", 10_000),
        ];
        for (input, expected) in cases {
            assert_eq!(parse_duration_ms(input).unwrap(), expected, "input {}", input);
        }
    }

    #[test]
    fn test_invalid_durations() {
        for input in ["42ns", "42db", "", "s", "1.5m", "abc", "1000h"] {
            assert!(
                matches!(parse_duration_ms(input), Err(ScenarioError::InvalidDuration(_))),
                "input {:?} should fail",
                input
            );
        }
    }
}
