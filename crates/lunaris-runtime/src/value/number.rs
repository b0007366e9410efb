//! Number parsing and formatting
//!
//! Both directions are locale-independent.

/// Integral values below this magnitude print without exponent or fraction
const PLAIN_INTEGER_LIMIT: f64 = 1e15;

/// Format a number the way scripts see it
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if n.fract() == 0.0 {
        if n.abs() < PLAIN_INTEGER_LIMIT {
            return format!("{:.0}", n);
        }
        let formatted = format!("{:e}", n);
        return match formatted.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
            _ => formatted,
        };
    }
    format!("{}", n)
}

/// Parse a numeric string: decimal (optional exponent) or `0x` hexadecimal.
///
/// Leading and trailing whitespace is ignored. `inf`/`nan` spellings are
/// rejected.
pub fn parse_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    let (negative, body) = match trimmed.as_bytes().first()? {
        b'-' => (true, &trimmed[1..]),
        b'+' => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let magnitude = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        parse_hex(hex)?
    } else {
        parse_decimal(body)?
    };

    Some(if negative { -magnitude } else { magnitude })
}

fn parse_hex(digits: &str) -> Option<f64> {
    if digits.is_empty() {
        return None;
    }
    digits.chars().try_fold(0.0f64, |acc, c| {
        c.to_digit(16).map(|d| acc * 16.0 + d as f64)
    })
}

fn parse_decimal(body: &str) -> Option<f64> {
    let valid = body
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'));
    let first_ok = body
        .bytes()
        .next()
        .is_some_and(|b| b.is_ascii_digit() || b == b'.');
    if !valid || !first_ok || !body.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    body.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(3.0, "3")]
    #[case(-0.5, "-0.5")]
    #[case(1e20, "1e+20")]
    #[case(2.5e-3, "0.0025")]
    #[case(f64::INFINITY, "inf")]
    #[case(f64::NEG_INFINITY, "-inf")]
    fn test_format(#[case] n: f64, #[case] expected: &str) {
        assert_eq!(format_number(n), expected);
    }

    #[test]
    fn test_format_nan() {
        assert_eq!(format_number(f64::NAN), "nan");
    }

    #[rstest]
    #[case("42", Some(42.0))]
    #[case("-7", Some(-7.0))]
    #[case(".5", Some(0.5))]
    #[case("1e3", Some(1000.0))]
    #[case(" 0x10 ", Some(16.0))]
    #[case("-0xff", Some(-255.0))]
    #[case("", None)]
    #[case("   ", None)]
    #[case("0x", None)]
    #[case("1e", None)]
    #[case("nan", None)]
    #[case("infinity", None)]
    #[case("12abc", None)]
    fn test_parse(#[case] input: &str, #[case] expected: Option<f64>) {
        assert_eq!(parse_number(input), expected);
    }
}
