use std::time::Duration;

use crate::config::ConfigError;

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(NANOS_PER_MICRO),
        "ms" => Some(NANOS_PER_MILLI),
        "s" => Some(NANOS_PER_SEC),
        "m" => Some(60 * NANOS_PER_SEC),
        "h" => Some(3_600 * NANOS_PER_SEC),
        _ => None,
    }
}

/// Parse a polling interval such as `30s`, `1m`, `2h30m` or `1.5h`.
///
/// The grammar is a sequence of decimal numbers each followed by a unit
/// (`ns`, `us`/`µs`, `ms`, `s`, `m`, `h`). A bare `0` is accepted. Negative
/// values are rejected.
///
/// ```
/// use gather::util::parse_interval;
/// use std::time::Duration;
///
/// assert_eq!(parse_interval("2h30m").unwrap(), Duration::from_secs(9_000));
/// assert!(parse_interval("soon").is_err());
/// ```
pub fn parse_interval(input: &str) -> Result<Duration, ConfigError> {
    let invalid = || {
        ConfigError::InvalidInterval(format!("{:?} (use a duration like 30s, 1m or 2h30m)", input))
    };

    let s = input.trim();
    let s = s.strip_prefix('+').unwrap_or(s);
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() || s.starts_with('-') {
        return Err(invalid());
    }

    let mut total: u128 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let int_len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let (int_part, after_int) = rest.split_at(int_len);

        let (frac_part, after_number) = match after_int.strip_prefix('.') {
            Some(after_dot) => {
                let frac_len = after_dot
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(after_dot.len());
                after_dot.split_at(frac_len)
            }
            None => ("", after_int),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }

        let unit_len = after_number
            .find(|c: char| c == '.' || c.is_ascii_digit())
            .unwrap_or(after_number.len());
        let (unit, remaining) = after_number.split_at(unit_len);
        let scale = unit_nanos(unit).ok_or_else(invalid)?;

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| invalid())?
        };
        let mut span = whole.checked_mul(scale).ok_or_else(invalid)?;

        // Digits past nanosecond precision cannot contribute
        let frac_digits = &frac_part[..frac_part.len().min(18)];
        if !frac_digits.is_empty() {
            let numerator: u128 = frac_digits.parse().map_err(|_| invalid())?;
            let denominator = 10u128.pow(frac_digits.len() as u32);
            span = span
                .checked_add(numerator * scale / denominator)
                .ok_or_else(invalid)?;
        }

        total = total.checked_add(span).ok_or_else(invalid)?;
        rest = remaining;
    }

    let nanos = u64::try_from(total).map_err(|_| invalid())?;
    Ok(Duration::from_nanos(nanos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_single_units() {
        assert_eq!(parse_interval("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_interval("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_interval("2h").unwrap(), Duration::from_secs(7_200));
        assert_eq!(parse_interval("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_interval("300us").unwrap(), Duration::from_micros(300));
        assert_eq!(parse_interval("300µs").unwrap(), Duration::from_micros(300));
        assert_eq!(parse_interval("7ns").unwrap(), Duration::from_nanos(7));
    }

    #[test]
    fn test_compound_and_fractional() {
        assert_eq!(parse_interval("2h30m").unwrap(), Duration::from_secs(9_000));
        assert_eq!(parse_interval("1h0m0s").unwrap(), Duration::from_secs(3_600));
        assert_eq!(parse_interval("1.5s").unwrap(), Duration::from_millis(1_500));
        assert_eq!(parse_interval(".5m").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_interval("5.s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_interval("1m30.25s").unwrap(), Duration::from_millis(90_250));
    }

    #[test]
    fn test_zero_and_sign() {
        assert_eq!(parse_interval("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_interval("+1s").unwrap(), Duration::from_secs(1));
        assert_eq!(parse_interval(" 1m ").unwrap(), Duration::from_secs(60));
    }

    #[test]
    fn test_invalid_intervals() {
        for input in ["", "soon", "10", "10x", "-5s", ".s", "1..5s", "s", "1h-30m", "1 h"] {
            let err = parse_interval(input).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidInterval(_)),
                "{input:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_overflow_is_rejected() {
        assert!(parse_interval("99999999999999999999999h").is_err());
        assert!(parse_interval("9999999999h").is_err());
    }

    proptest! {
        #[test]
        fn prop_compound_parts_add_up(h in 0u64..1_000, m in 0u64..60, s in 0u64..60) {
            let parsed = parse_interval(&format!("{h}h{m}m{s}s")).unwrap();
            prop_assert_eq!(parsed, Duration::from_secs(h * 3_600 + m * 60 + s));
        }
    }
}
