//! Field cleaning for values coming out of spreadsheet exports.
//!
//! None of these functions fail: the worst case for any input is `None`.

const SENTINELS: [&str; 3] = ["", "NULL", "null"];
const QUOTE: char = '"';

fn is_sentinel(value: &str) -> bool {
    SENTINELS.contains(&value)
}

/// Trim, strip any number of wrapping quote layers, and map sentinel values to `None`.
///
/// A value that is only a sentinel once its quotes are removed (`"NULL"`, `""""`)
/// is also `None`; an empty string is never returned.
pub fn clean_value(raw: Option<&str>) -> Option<String> {
    let mut current = raw?.trim();
    loop {
        if is_sentinel(current) {
            return None;
        }
        match current
            .strip_prefix(QUOTE)
            .and_then(|inner| inner.strip_suffix(QUOTE))
        {
            Some(inner) => current = inner.trim(),
            None => return Some(current.to_string()),
        }
    }
}

/// Reformat a ten-digit phone number as `(AAA) BBB-CCCC`.
///
/// Anything with a different digit count is passed through as cleaned, never rejected.
pub fn normalize_phone(raw: Option<&str>) -> Option<String> {
    let cleaned = clean_value(raw)?;
    let digits: String = cleaned.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == 10 {
        Some(format!(
            "({}) {}-{}",
            &digits[0..3],
            &digits[3..6],
            &digits[6..10]
        ))
    } else {
        Some(cleaned)
    }
}

pub fn first_email(raw: Option<&str>) -> Option<String> {
    let cleaned = clean_value(raw)?;
    cleaned
        .split(',')
        .find_map(|candidate| clean_value(Some(candidate)))
}

/// Leading integer of the field, clamped at zero. Unparseable input counts as 0.
pub fn parse_count(raw: Option<&str>) -> u32 {
    let Some(cleaned) = clean_value(raw) else {
        return 0;
    };
    let (negative, rest) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.strip_prefix('+').unwrap_or(&cleaned)),
    };
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if negative || digits.is_empty() {
        return 0;
    }
    digits.parse().unwrap_or(u32::MAX)
}

pub fn full_name(first: Option<&str>, last: Option<&str>) -> Option<String> {
    let joined = [clean_value(first), clean_value(last)]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
    clean_value(Some(joined.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_become_absent() {
        for raw in [Some("NULL"), Some("null"), Some(""), None, Some("   "), Some("\"NULL\""), Some("\"\"")] {
            assert_eq!(clean_value(raw), None, "{raw:?}");
        }
    }

    #[test]
    fn ordinary_values_are_trimmed_and_unquoted() {
        assert_eq!(clean_value(Some("  Acme Inc ")).as_deref(), Some("Acme Inc"));
        assert_eq!(clean_value(Some("\"\"Acme Inc\"\"")).as_deref(), Some("Acme Inc"));
        assert_eq!(clean_value(Some(" \" Acme \" ")).as_deref(), Some("Acme"));
        assert_eq!(clean_value(Some("Nullable LLC")).as_deref(), Some("Nullable LLC"));
        assert_eq!(clean_value(Some("O'Brien & Sons")).as_deref(), Some("O'Brien & Sons"));
    }

    #[test]
    fn inner_quotes_survive_cleaning() {
        for raw in ["\"Acme\" Holdings", "The Best \"Co\"", "12\" Pipe Supply"] {
            assert_eq!(clean_value(Some(raw)).as_deref(), Some(raw), "{raw}");
        }
        assert_eq!(
            clean_value(Some("\"\"Acme\" Holdings\"")).as_deref(),
            Some("\"Acme\" Holdings")
        );
        assert_eq!(clean_value(Some("\"")).as_deref(), Some("\""));
    }

    #[test]
    fn ten_digit_phones_are_reformatted() {
        for raw in ["7182585250", "718-258-5250", "(718) 258 5250", " 718.258.5250 "] {
            assert_eq!(normalize_phone(Some(raw)).as_deref(), Some("(718) 258-5250"), "{raw}");
        }
    }

    #[test]
    fn other_phones_pass_through_trimmed() {
        assert_eq!(normalize_phone(Some(" +1 718 258 5250 ")).as_deref(), Some("+1 718 258 5250"));
        assert_eq!(normalize_phone(Some("ext 12")).as_deref(), Some("ext 12"));
        assert_eq!(normalize_phone(Some("NULL")), None);
    }

    #[test]
    fn first_email_skips_sentinels() {
        assert_eq!(
            first_email(Some("NULL, jane@acme.test, other@acme.test")).as_deref(),
            Some("jane@acme.test")
        );
        assert_eq!(first_email(Some(" , ")), None);
    }

    #[test]
    fn counts_take_leading_integer() {
        assert_eq!(parse_count(Some("12")), 12);
        assert_eq!(parse_count(Some(" 3 buildings")), 3);
        assert_eq!(parse_count(Some("-4")), 0);
        assert_eq!(parse_count(Some("n/a")), 0);
        assert_eq!(parse_count(None), 0);
    }

    #[test]
    fn full_name_joins_present_parts() {
        assert_eq!(full_name(Some("Jane"), Some("Doe")).as_deref(), Some("Jane Doe"));
        assert_eq!(full_name(Some("NULL"), Some("Doe")).as_deref(), Some("Doe"));
        assert_eq!(full_name(None, Some("")), None);
    }
}
