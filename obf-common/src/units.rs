//! OSM tag value parsing
//!
//! Tag values in the wild carry units and noise (`"50 mph"`, `"3.5 t"`,
//! `"6'6\""`). Every parser reads the number the value starts with and
//! applies the unit conversion implied by the rest of the string.

/// Speed assigned to `maxspeed=none`, in m/s.
pub const UNLIMITED_SPEED_MPS: f64 = 40.0;

const KMH_PER_MPS: f64 = 3.6;
const MPH_FACTOR: f64 = 1.6;
const FOOT_METERS: f64 = 0.3048;
const INCH_METERS: f64 = 0.0254;
const POUND_TONS: f64 = 0.4535 / 1000.0;

/// The number `value` starts with, ignoring surrounding whitespace.
///
/// A leading `-` is accepted when `allow_sign` is set, a decimal point when
/// `allow_dot` is set. Text before the number makes the value unparseable.
pub fn first_number(value: &str, allow_sign: bool, allow_dot: bool) -> Option<&str> {
    let value = value.trim();
    let bytes = value.as_bytes();
    let digits = if allow_sign && bytes.first() == Some(&b'-') { 1 } else { 0 };
    if !bytes.get(digits).is_some_and(u8::is_ascii_digit) {
        return None;
    }

    let mut end = digits + 1;
    let mut seen_dot = false;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => {}
            b'.' if allow_dot && !seen_dot => seen_dot = true,
            _ => break,
        }
        end += 1;
    }
    // "12." is not a float for str::parse
    if bytes[end - 1] == b'.' {
        end -= 1;
    }
    Some(&value[..end])
}

/// Parse a speed, returning metres per second.
///
/// Values are km/h unless they mention `mph`.
pub fn parse_speed(value: &str) -> Option<f64> {
    if value == "none" {
        return Some(UNLIMITED_SPEED_MPS);
    }
    let kmh: f64 = first_number(value, false, true)?.parse().ok()?;
    let mut mps = kmh / KMH_PER_MPS;
    if value.contains("mph") {
        mps *= MPH_FACTOR;
    }
    Some(mps)
}

/// Parse a length, returning metres.
///
/// Handles metres, `ft` and the feet'inches" notation.
pub fn parse_length(value: &str) -> Option<f64> {
    let number = first_number(value, false, true)?;
    let magnitude: f64 = number.parse().ok()?;

    if let Some(quote) = value.find('\'') {
        let inches = first_number(&value[quote + 1..], false, true)
            .and_then(|n| n.parse::<f64>().ok())
            .unwrap_or(0.0);
        return Some(magnitude * FOOT_METERS + inches * INCH_METERS);
    }
    if value.contains("ft") {
        return Some(magnitude * FOOT_METERS);
    }
    Some(magnitude)
}

/// Parse a weight, returning metric tons.
pub fn parse_weight(value: &str) -> Option<f64> {
    let tons: f64 = first_number(value, false, true)?.parse().ok()?;
    if value.contains("lbs") {
        return Some(tons * POUND_TONS);
    }
    Some(tons)
}

/// Signed decimal number the string starts with.
pub fn parse_float(value: &str) -> Option<f64> {
    first_number(value, true, true)?.parse().ok()
}

/// Signed integer the string starts with.
pub fn parse_int(value: &str) -> Option<i32> {
    first_number(value, true, false)?.parse().ok()
}

/// `"true"` in any case is true, any other non-empty string is false.
pub fn parse_bool(value: &str) -> Option<bool> {
    if value.is_empty() {
        return None;
    }
    Some(value.eq_ignore_ascii_case("true"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_first_number() {
        assert_eq!(first_number(" 45 km/h", false, true), Some("45"));
        assert_eq!(first_number("abc 45 km/h", false, true), None);
        assert_eq!(first_number("-12.5x", true, true), Some("-12.5"));
        assert_eq!(first_number("-12.5x", false, true), None);
        assert_eq!(first_number("3.5.1", false, true), Some("3.5"));
        assert_eq!(first_number("7.", false, true), Some("7"));
        assert_eq!(first_number("12.75", true, false), Some("12"));
        assert_eq!(first_number("none", true, true), None);
    }

    #[test]
    fn test_parse_speed() {
        assert!(close(parse_speed("45").unwrap(), 12.5));
        assert!(close(parse_speed("30 mph").unwrap(), 30.0 / 3.6 * 1.6));
        assert_eq!(parse_speed("none"), Some(UNLIMITED_SPEED_MPS));
        assert_eq!(parse_speed("walk"), None);
        assert_eq!(parse_speed("abc 45"), None);
    }

    #[test]
    fn test_parse_length() {
        assert!(close(parse_length("3.5").unwrap(), 3.5));
        assert!(close(parse_length("10 ft").unwrap(), 3.048));
        assert!(close(parse_length("6'6\"").unwrap(), 6.0 * 0.3048 + 6.0 * 0.0254));
        assert!(close(parse_length("12'").unwrap(), 12.0 * 0.3048));
        assert_eq!(parse_length("default"), None);
    }

    #[test]
    fn test_parse_weight() {
        assert!(close(parse_weight("7.5").unwrap(), 7.5));
        assert!(close(parse_weight("2000 lbs").unwrap(), 2000.0 * 0.4535 / 1000.0));
    }

    #[test]
    fn test_parse_numbers_and_bools() {
        assert_eq!(parse_int("-1"), Some(-1));
        assert_eq!(parse_int("2;3"), Some(2));
        assert_eq!(parse_float("-0.25 s"), Some(-0.25));
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("yes"), Some(false));
        assert_eq!(parse_bool(""), None);
    }

    proptest::proptest! {
        #[test]
        fn prop_integer_speeds_convert_from_kmh(kmh in 0u32..400) {
            let parsed = parse_speed(&format!("{kmh} km/h")).unwrap();
            proptest::prop_assert!(close(parsed, kmh as f64 / 3.6));
        }

        #[test]
        fn prop_parse_int_reads_signed_values(v in i32::MIN + 1..i32::MAX) {
            proptest::prop_assert_eq!(parse_int(&v.to_string()), Some(v));
        }
    }
}
