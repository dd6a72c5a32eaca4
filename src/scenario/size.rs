use crate::error::ScenarioError;

const KB: i64 = 1000;
const KIB: i64 = 1024;

/// Parse a memory size such as `512MiB`, `2G` or `42` into bytes.
///
/// Units are case-insensitive. Binary units (`KiB`, `MiB`, `GiB`) are powers
/// of 1024, all others are powers of 1000. No unit or `B` means bytes.
pub fn parse_size(input: &str) -> Result<i64, ScenarioError> {
    let trimmed = input.trim();
    let invalid = || ScenarioError::InvalidSize(input.to_string());

    let (number, multiplier) = split_unit(trimmed).ok_or_else(invalid)?;

    number
        .parse::<i64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(invalid)
}

fn split_unit(s: &str) -> Option<(&str, i64)> {
    const UNITS: [(&str, i64); 10] = [
        ("GIB", KIB * KIB * KIB),
        ("MIB", KIB * KIB),
        ("KIB", KIB),
        ("GB", KB * KB * KB),
        ("MB", KB * KB),
        ("KB", KB),
        ("G", KB * KB * KB),
        ("M", KB * KB),
        ("K", KB),
        ("B", 1),
    ];

    let upper = s.to_ascii_uppercase();
    for (unit, multiplier) in UNITS {
        if upper.ends_with(unit) {
            // to_ascii_uppercase keeps byte offsets intact
            return s.get(..s.len() - unit.len()).map(|n| (n, multiplier));
        }
    }
    Some((s, 1))
}
