use crate::value_objects::node::{Node, DATE_FORMAT};
use chrono::NaiveDate;

/// Resolves an unquoted scalar to its typed node.
pub fn resolve_plain(raw: &str) -> Node {
    match raw {
        "" | "~" | "null" | "Null" | "NULL" => return Node::Null,
        "true" | "True" | "TRUE" => return Node::Bool(true),
        "false" | "False" | "FALSE" => return Node::Bool(false),
        ".inf" | ".Inf" | ".INF" | "+.inf" | "+.Inf" | "+.INF" => {
            return Node::Float(f64::INFINITY)
        }
        "-.inf" | "-.Inf" | "-.INF" => return Node::Float(f64::NEG_INFINITY),
        ".nan" | ".NaN" | ".NAN" => return Node::Float(f64::NAN),
        _ => {}
    }

    if let Some(node) = resolve_int(raw) {
        return node;
    }
    if looks_like_float(raw) {
        if let Ok(v) = raw.parse::<f64>() {
            return Node::Float(v);
        }
    }
    if looks_like_date(raw) {
        if let Ok(date) = NaiveDate::parse_from_str(raw, DATE_FORMAT) {
            return Node::Date(date);
        }
    }
    Node::Str(raw.to_string())
}

fn resolve_int(raw: &str) -> Option<Node> {
    let (negative, body) = match raw.as_bytes().first()? {
        b'-' => (true, &raw[1..]),
        b'+' => (false, &raw[1..]),
        _ => (false, raw),
    };
    if body.is_empty() {
        return None;
    }

    let (digits, radix) = if let Some(hex) = body.strip_prefix("0x") {
        (hex, 16)
    } else if let Some(oct) = body.strip_prefix("0o") {
        (oct, 8)
    } else {
        (body, 10)
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }

    let signed = if negative {
        format!("-{digits}")
    } else {
        digits.to_string()
    };
    match i64::from_str_radix(&signed, radix) {
        Ok(v) => Some(Node::Int(v)),
        // Decimal literals past i64 still read as numbers.
        Err(_) if radix == 10 => raw.parse::<f64>().ok().map(Node::Float),
        Err(_) => None,
    }
}

/// `[-+]?(\.[0-9]+|[0-9]+(\.[0-9]*)?)([eE][-+]?[0-9]+)?`
fn looks_like_float(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'-') | Some(b'+')) {
        i += 1;
    }

    let int_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let int_digits = i - int_start;

    let mut frac_digits = 0;
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        let frac_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        frac_digits = i - frac_start;
    }
    if int_digits == 0 && frac_digits == 0 {
        return false;
    }

    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        i += 1;
        if i < bytes.len() && (bytes[i] == b'-' || bytes[i] == b'+') {
            i += 1;
        }
        let exp_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == exp_start {
            return false;
        }
    }
    i == bytes.len()
}

fn looks_like_date(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(idx, b)| idx == 4 || idx == 7 || b.is_ascii_digit())
}

/// True when `s` can be written without quotes and reads back as the same string.
pub fn is_plain_safe(s: &str) -> bool {
    if s.is_empty() || s.trim() != s {
        return false;
    }
    if !matches!(resolve_plain(s), Node::Str(_)) {
        return false;
    }
    let first = s.chars().next().unwrap_or(' ');
    if "-?:,[]{}#&*!|>'\"%@`".contains(first) {
        return false;
    }
    if s.starts_with("...") || s.ends_with(':') || s.contains(": ") || s.contains(" #") {
        return false;
    }
    !s.chars()
        .any(|c| c.is_control() || matches!(c, ',' | '[' | ']' | '{' | '}'))
}

pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

pub fn format_float(v: f64) -> String {
    if v.is_nan() {
        ".nan".to_string()
    } else if v.is_infinite() {
        let text = if v > 0.0 { ".inf" } else { "-.inf" };
        text.to_string()
    } else {
        format!("{v:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::{format_float, is_plain_safe, quote, resolve_plain};
    use crate::value_objects::node::Node;
    use chrono::NaiveDate;

    #[test]
    fn resolves_core_scalar_types() {
        assert_eq!(resolve_plain("~"), Node::Null);
        assert_eq!(resolve_plain("False"), Node::Bool(false));
        assert_eq!(resolve_plain("100000000"), Node::Int(100_000_000));
        assert_eq!(resolve_plain("-5"), Node::Int(-5));
        assert_eq!(resolve_plain("0x1F"), Node::Int(31));
        assert_eq!(resolve_plain("0.0005"), Node::Float(0.0005));
        assert_eq!(resolve_plain("1e-3"), Node::Float(0.001));
        assert_eq!(resolve_plain("-.inf"), Node::Float(f64::NEG_INFINITY));
        assert_eq!(
            resolve_plain("2008-01-01"),
            Node::Date(NaiveDate::from_ymd_opt(2008, 1, 1).expect("date"))
        );
        assert_eq!(resolve_plain("csi300"), Node::from("csi300"));
        assert_eq!(resolve_plain("SH000300"), Node::from("SH000300"));
        assert_eq!(resolve_plain("1e"), Node::from("1e"));
        assert_eq!(resolve_plain("."), Node::from("."));
        assert_eq!(resolve_plain("inf"), Node::from("inf"));
    }

    #[test]
    fn invalid_calendar_dates_stay_strings() {
        assert_eq!(resolve_plain("2020-13-45"), Node::from("2020-13-45"));
    }

    #[test]
    fn plain_safety_guards_type_changes() {
        assert!(is_plain_safe("qlib.contrib.model.pytorch_hats"));
        assert!(!is_plain_safe("Ref($close, -2)"));
        assert!(!is_plain_safe("true"));
        assert!(!is_plain_safe("2017-01-01"));
        assert!(!is_plain_safe("12"));
        assert!(!is_plain_safe(""));
        assert!(!is_plain_safe("- item"));
        assert!(!is_plain_safe("a: b"));
        assert_eq!(quote("a\"b\n"), "\"a\\\"b\\n\"");
    }

    #[test]
    fn floats_format_back_as_floats() {
        for v in [1.0, 0.0005, 1e-7, 1e20, -3.25] {
            let text = format_float(v);
            assert_eq!(resolve_plain(&text), Node::Float(v), "{text}");
        }
        assert_eq!(format_float(f64::INFINITY), ".inf");
    }
}
