//! Duplicate-candidate keys
//!
//! Two books are duplicate candidates when their normalized title (plus
//! subtitle) and their normalized author set agree. The resulting
//! `dup_key` is persisted in `duplicate_review`, so any change to the
//! normalization here orphans existing review decisions.

use std::cmp::Ordering;

use crate::text::collapse_whitespace;

/// Drop a trailing "." after a volume number ("part ii.", "vol 3.")
fn strip_numeral_dot(input: &str) -> &str {
    let Some(body) = input.strip_suffix('.') else {
        return input;
    };
    let word_start = body
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_alphanumeric() || *c == '_')
        .last()
        .map(|(i, _)| i);
    let Some(start) = word_start else {
        return input;
    };
    let word = &body[start..];
    let roman = word.chars().all(|c| "ivxlcdm".contains(c.to_ascii_lowercase()));
    let digits = word.chars().all(|c| c.is_ascii_digit());
    if roman || digits {
        body
    } else {
        input
    }
}

/// Key fragment for a single author
pub fn author_key_part(author_id: i64, sort_name: Option<&str>) -> String {
    let normalized = collapse_whitespace(&sort_name.unwrap_or("").to_lowercase());
    if normalized.is_empty() {
        format!("author#{}", author_id)
    } else {
        normalized
    }
}

/// Key for an author set: fragments sorted bytewise, joined by `;`
pub fn authors_key(mut parts: Vec<String>) -> String {
    parts.sort();
    parts.join(";")
}

/// Key for a title and optional subtitle
pub fn title_key(title: &str, subtitle: Option<&str>) -> String {
    let mut raw = title.to_string();
    let subtitle = subtitle.unwrap_or("").trim();
    if !subtitle.is_empty() {
        raw.push_str("||");
        raw.push_str(subtitle);
    }
    let collapsed = collapse_whitespace(&raw.to_lowercase());
    strip_numeral_dot(&collapsed).to_string()
}

/// Full duplicate key, `title_key|authors_key`
pub fn dup_key(title: &str, subtitle: Option<&str>, author_parts: Vec<String>) -> String {
    format!("{}|{}", title_key(title, subtitle), authors_key(author_parts))
}

/// "Title: Subtitle", or the bare title
pub fn format_title_display(title: &str, subtitle: Option<&str>) -> String {
    match subtitle.map(str::trim) {
        Some(sub) if !sub.is_empty() => format!("{}: {}", title, sub),
        _ => title.to_string(),
    }
}

/// Author label for the report: sort name, name, "Last, First", or a placeholder
pub fn format_author_label(
    sort_name: Option<&str>,
    name: Option<&str>,
    first_name: Option<&str>,
    last_name: Option<&str>,
) -> String {
    let clean = |v: Option<&str>| v.unwrap_or("").trim().to_string();
    let (sort_name, name, first, last) = (clean(sort_name), clean(name), clean(first_name), clean(last_name));
    if !sort_name.is_empty() {
        sort_name
    } else if !name.is_empty() {
        name
    } else if !last.is_empty() && !first.is_empty() {
        format!("{}, {}", last, first)
    } else if !last.is_empty() {
        last
    } else if !first.is_empty() {
        first
    } else {
        "(unknown author)".to_string()
    }
}

/// Review status stored per duplicate group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewStatus {
    New,
    Ignore,
    Confirmed,
}

impl ReviewStatus {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_uppercase().as_str() {
            "NEW" => Some(Self::New),
            "IGNORE" => Some(Self::Ignore),
            "CONFIRMED" => Some(Self::Confirmed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Ignore => "IGNORE",
            Self::Confirmed => "CONFIRMED",
        }
    }
}

/// Report filter; unknown values fall back to `NEW`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    All,
    Only(ReviewStatus),
}

impl StatusFilter {
    pub fn parse(input: Option<&str>) -> Self {
        match input.map(|s| s.trim().to_ascii_uppercase()) {
            Some(s) if s == "ALL" => Self::All,
            Some(s) => ReviewStatus::parse(&s).map_or(Self::Only(ReviewStatus::New), Self::Only),
            None => Self::Only(ReviewStatus::New),
        }
    }

    pub fn matches(&self, status: ReviewStatus) -> bool {
        match self {
            Self::All => true,
            Self::Only(wanted) => *wanted == status,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::Only(status) => status.as_str(),
        }
    }
}

/// Report order: groups of three or more first, then the newest year in the
/// group ascending (no year counts as 0), then the key.
pub fn compare_groups(
    (a_size, a_year, a_key): (usize, i64, &str),
    (b_size, b_year, b_key): (usize, i64, &str),
) -> Ordering {
    let bucket = |size: usize| if size >= 3 { 0 } else { 1 };
    bucket(a_size)
        .cmp(&bucket(b_size))
        .then(a_year.cmp(&b_year))
        .then_with(|| a_key.cmp(b_key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_key_normalizes_case_and_spacing() {
        assert_eq!(title_key("  The   Hobbit ", None), "the hobbit");
        assert_eq!(title_key("Dune", Some("  ")), "dune");
        assert_eq!(title_key("Dune", Some("Messiah")), "dune||messiah");
    }

    #[test]
    fn test_title_key_strips_numeral_dot() {
        assert_eq!(title_key("Collected Works II.", None), "collected works ii");
        assert_eq!(title_key("Volume 3.", None), "volume 3");
        // Ordinary words keep their full stop
        assert_eq!(title_key("The End.", None), "the end.");
    }

    #[test]
    fn test_author_key_part() {
        assert_eq!(author_key_part(7, Some("  Jókai,   MÓR ")), "jókai, mór");
        assert_eq!(author_key_part(7, Some("   ")), "author#7");
        assert_eq!(author_key_part(9, None), "author#9");
    }

    #[test]
    fn test_dup_key_is_order_independent() {
        let a = dup_key("Good Omens", None, vec!["pratchett, terry".into(), "gaiman, neil".into()]);
        let b = dup_key("GOOD  omens", None, vec!["gaiman, neil".into(), "pratchett, terry".into()]);
        assert_eq!(a, b);
        assert_eq!(a, "good omens|gaiman, neil;pratchett, terry");
    }

    #[test]
    fn test_author_label_fallbacks() {
        assert_eq!(format_author_label(Some("Le Guin, Ursula"), Some("x"), None, None), "Le Guin, Ursula");
        assert_eq!(format_author_label(None, Some("Homer"), None, None), "Homer");
        assert_eq!(format_author_label(None, None, Some("Ursula"), Some("Le Guin")), "Le Guin, Ursula");
        assert_eq!(format_author_label(None, None, Some("Plato"), None), "Plato");
        assert_eq!(format_author_label(None, Some(" "), None, None), "(unknown author)");
    }

    #[test]
    fn test_status_filter_parse() {
        assert_eq!(StatusFilter::parse(None), StatusFilter::Only(ReviewStatus::New));
        assert_eq!(StatusFilter::parse(Some("all")), StatusFilter::All);
        assert_eq!(StatusFilter::parse(Some("ignore")), StatusFilter::Only(ReviewStatus::Ignore));
        assert_eq!(StatusFilter::parse(Some("bogus")), StatusFilter::Only(ReviewStatus::New));
    }

    #[test]
    fn test_group_ordering() {
        let mut groups = vec![(2usize, 1990i64, "b"), (3, 2005, "z"), (2, 0, "c"), (2, 1990, "a")];
        groups.sort_by(|a, b| compare_groups(*a, *b));
        assert_eq!(groups, vec![(3, 2005, "z"), (2, 0, "c"), (2, 1990, "a"), (2, 1990, "b")]);
    }
}
