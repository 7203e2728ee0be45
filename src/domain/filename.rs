//! Suggested download names built from `${token}` patterns.
//!
//! `date`, `datetime` and `time` expand to the default medium style
//! (`Oct 17, 2026`, `3:04:05 PM`) with commas dropped and whitespace folded
//! into underscores. Any other token is read as a `time` format description
//! such as `[year]-[month]-[day]`; a token without any date or time component
//! is not a format and is kept verbatim.
//!
//! Timestamps are rendered in the offset they carry. The system clock hands
//! out UTC.

use time::{OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description};
use tracing::error;

const DATE_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[month repr:short] [day padding:none], [year]");
const TIME_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[hour repr:12 padding:none]:[minute]:[second] [period]");
const DATETIME_FORMAT: &[BorrowedFormatItem<'static>] = format_description!(
    "[month repr:short] [day padding:none], [year] [hour repr:12 padding:none]:[minute]:[second] [period]"
);

/// Expand the tokens of `pattern` against `timestamp` and make sure the result
/// carries `suffix` exactly once.
pub fn format_file_name(pattern: &str, suffix: &str, timestamp: OffsetDateTime) -> String {
    let expanded = expand_tokens(pattern, timestamp);
    let suffix = suffix.trim_start_matches('.');
    if suffix.is_empty() {
        return expanded;
    }

    let dotted = format!(".{}", suffix.to_lowercase());
    if expanded.to_lowercase().ends_with(&dotted) {
        expanded
    } else {
        format!("{expanded}.{suffix}")
    }
}

/// Strip commas and collapse every whitespace run into a single underscore.
pub fn clean_up_name(original: &str) -> String {
    let mut output = String::with_capacity(original.len());
    let mut in_whitespace = false;
    for ch in original.chars() {
        if ch == ',' {
            continue;
        }
        if ch.is_whitespace() {
            if !in_whitespace {
                output.push('_');
                in_whitespace = true;
            }
        } else {
            output.push(ch);
            in_whitespace = false;
        }
    }
    output
}

fn expand_tokens(pattern: &str, timestamp: OffsetDateTime) -> String {
    let mut output = String::with_capacity(pattern.len());
    let mut rest = pattern;

    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        // a token holds at least one character, so the closing brace is searched after it
        let Some(first) = after.chars().next() else {
            break;
        };
        let Some(offset) = after[first.len_utf8()..].find('}') else {
            break;
        };
        let end = first.len_utf8() + offset;

        output.push_str(&rest[..start]);
        let token = &after[..end];
        match replacement(token, timestamp) {
            Some(value) => output.push_str(&value),
            None => {
                output.push_str("${");
                output.push_str(token);
                output.push('}');
            }
        }
        rest = &after[end + 1..];
    }

    output.push_str(rest);
    output
}

fn replacement(token: &str, timestamp: OffsetDateTime) -> Option<String> {
    let builtin = match token.to_lowercase().as_str() {
        "date" => Some(DATE_FORMAT),
        "datetime" => Some(DATETIME_FORMAT),
        "time" => Some(TIME_FORMAT),
        _ => None,
    };

    if let Some(format) = builtin {
        return match timestamp.format(format) {
            Ok(value) => Some(clean_up_name(&value)),
            Err(err) => {
                error!(
                    target = "pressroom::filename",
                    token,
                    error = %err,
                    "Unable to format timestamp"
                );
                None
            }
        };
    }

    let custom = match time::format_description::parse_borrowed::<2>(token) {
        Ok(items) if has_component(&items) => items,
        Ok(_) => {
            error!(
                target = "pressroom::filename",
                token,
                "Pattern has no date or time component"
            );
            return None;
        }
        Err(err) => {
            error!(
                target = "pressroom::filename",
                token,
                error = %err,
                "Unable to format timestamp according to pattern"
            );
            return None;
        }
    };

    match timestamp.format(custom.as_slice()) {
        Ok(value) => Some(value),
        Err(err) => {
            error!(
                target = "pressroom::filename",
                token,
                error = %err,
                "Unable to format timestamp according to pattern"
            );
            None
        }
    }
}

fn has_component(items: &[BorrowedFormatItem<'_>]) -> bool {
    items.iter().any(|item| match item {
        BorrowedFormatItem::Component(_) => true,
        BorrowedFormatItem::Compound(inner) | BorrowedFormatItem::First(inner) => {
            has_component(inner)
        }
        BorrowedFormatItem::Optional(inner) => has_component(std::slice::from_ref(*inner)),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    const REFERENCE: OffsetDateTime = datetime!(2026-10-17 15:04:05 UTC);

    #[test]
    fn date_token_is_cleaned_and_suffixed() {
        let name = format_file_name("report_${date}", "pdf", REFERENCE);
        assert_eq!(name, "report_Oct_17_2026.pdf");
        assert!(!name.contains(','));
        assert!(!name.contains(char::is_whitespace));
        assert!(!name.contains("__"));
    }

    #[test]
    fn builtin_tokens_are_case_insensitive() {
        assert_eq!(
            format_file_name("${DateTime}", "pdf", REFERENCE),
            "Oct_17_2026_3:04:05_PM.pdf"
        );
        assert_eq!(format_file_name("${TIME}", "", REFERENCE), "3:04:05_PM");
    }

    #[test]
    fn custom_token_uses_format_description() {
        assert_eq!(
            format_file_name("map-${[year][month][day]}", "png", REFERENCE),
            "map-20261017.png"
        );
    }

    #[test]
    fn invalid_custom_token_is_left_verbatim() {
        assert_eq!(
            format_file_name("out-${[bogus]}", "pdf", REFERENCE),
            "out-${[bogus]}.pdf"
        );
    }

    #[test]
    fn tokens_without_components_stay_literal() {
        assert_eq!(format_file_name("a_${foo}", "pdf", REFERENCE), "a_${foo}.pdf");
        assert_eq!(
            format_file_name("a_${yyyyMMdd}", "pdf", REFERENCE),
            "a_${yyyyMMdd}.pdf"
        );
    }

    #[test]
    fn timestamps_keep_their_own_offset() {
        let local = datetime!(2026-10-17 17:04:05 +02:00);
        assert_eq!(format_file_name("${time}", "", local), "5:04:05_PM");
        assert_eq!(
            format_file_name("${[hour]h[offset_hour sign:mandatory]}", "", local),
            "17h+02"
        );
    }

    #[test]
    fn existing_suffix_is_matched_case_insensitively() {
        assert_eq!(format_file_name("out.PDF", "pdf", REFERENCE), "out.PDF");
        assert_eq!(format_file_name("out.pdf", ".PDF", REFERENCE), "out.pdf");
    }

    #[test]
    fn leading_dots_are_stripped_from_suffix() {
        assert_eq!(format_file_name("out", "..pdf", REFERENCE), "out.pdf");
    }

    #[test]
    fn empty_suffix_appends_nothing() {
        assert_eq!(format_file_name("printout", "", REFERENCE), "printout");
        assert_eq!(format_file_name("printout", "...", REFERENCE), "printout");
    }

    #[test]
    fn unterminated_and_empty_tokens_stay_literal() {
        assert_eq!(format_file_name("a_${date", "pdf", REFERENCE), "a_${date.pdf");
        assert_eq!(format_file_name("a_${", "pdf", REFERENCE), "a_${.pdf");
    }

    #[test]
    fn repeated_tokens_are_all_expanded() {
        assert_eq!(
            format_file_name("${date}-${date}", "pdf", REFERENCE),
            "Oct_17_2026-Oct_17_2026.pdf"
        );
    }

    #[test]
    fn clean_up_collapses_whitespace_runs() {
        assert_eq!(clean_up_name("Oct 17,  2026\t PM"), "Oct_17_2026_PM");
        assert_eq!(clean_up_name(" a , b "), "_a_b_");
    }
}
