pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", &s[..max_len - 3])
    }
}

/// Parse a right ascension header value into degrees.
///
/// Accepts plain degrees ("173.624") or sexagesimal hours
/// ("11 34 29.8" / "11:34:29.8"), which some acquisition layers write.
pub fn parse_ra_degrees(s: &str) -> Option<f64> {
    let s = s.trim();
    if let Ok(deg) = s.parse::<f64>() {
        return Some(deg);
    }
    parse_sexagesimal(s).map(|hours| hours * 15.0)
}

/// Parse a declination header value into degrees.
///
/// Accepts plain degrees ("-32.519") or sexagesimal degrees ("-32 31 09").
pub fn parse_dec_degrees(s: &str) -> Option<f64> {
    let s = s.trim();
    if let Ok(deg) = s.parse::<f64>() {
        return Some(deg);
    }
    parse_sexagesimal(s)
}

/// Parse "D M S" or "D:M:S" into a decimal value in the leading unit.
fn parse_sexagesimal(s: &str) -> Option<f64> {
    let parts: Vec<&str> = s.split(&[' ', ':'][..]).filter(|p| !p.is_empty()).collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }

    let negative = parts[0].starts_with('-');
    let whole: f64 = parts[0].parse().ok()?;
    let minutes: f64 = if parts.len() > 1 { parts[1].parse().ok()? } else { 0.0 };
    let seconds: f64 = if parts.len() > 2 { parts[2].parse().ok()? } else { 0.0 };

    if !(0.0..60.0).contains(&minutes) || !(0.0..60.0).contains(&seconds) {
        return None;
    }

    let magnitude = whole.abs() + minutes / 60.0 + seconds / 3600.0;
    Some(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_string_short() {
        assert_eq!(truncate_string("hello", 10), "hello");
        assert_eq!(truncate_string("test", 4), "test");
        assert_eq!(truncate_string("", 10), "");
    }

    #[test]
    fn test_truncate_string_long() {
        assert_eq!(truncate_string("hello world", 8), "hello...");
        assert_eq!(truncate_string("1234567890", 5), "12...");
    }

    #[test]
    fn test_parse_ra_decimal_degrees() {
        assert_eq!(parse_ra_degrees("173.624"), Some(173.624));
        assert_eq!(parse_ra_degrees(" 0.0 "), Some(0.0));
    }

    #[test]
    fn test_parse_ra_sexagesimal_hours() {
        let ra = parse_ra_degrees("11 34 30").unwrap();
        assert!((ra - 173.625).abs() < 1e-9);
        let ra = parse_ra_degrees("11:34:30").unwrap();
        assert!((ra - 173.625).abs() < 1e-9);
    }

    #[test]
    fn test_parse_dec_sexagesimal_negative() {
        let dec = parse_dec_degrees("-32 31 12").unwrap();
        assert!((dec - (-32.52)).abs() < 1e-9);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_ra_degrees("north"), None);
        assert_eq!(parse_dec_degrees("12 99 00"), None);
        assert_eq!(parse_dec_degrees(""), None);
    }
}
