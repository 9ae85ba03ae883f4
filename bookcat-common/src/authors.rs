//! Author-name parsing and formatting
//!
//! Authors are entered as free text ("Jókai Mór", "Tolkien, J. R. R.",
//! "Ursula K. Le Guin"). Western names put the family name last, Hungarian
//! names put it first; a comma always means "Last, First".

use crate::text::collapse_whitespace;

/// Result of parsing a free-text author name
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedName {
    pub first: String,
    pub last: String,
    /// Legacy sort form, "Last First" without a comma
    pub sort: String,
}

/// Parse free text into first/last name parts.
///
/// With `is_hungarian` and no comma the first token is the family name,
/// otherwise the last token is.
pub fn parse_free_text(input: &str, is_hungarian: bool) -> ParsedName {
    let s = collapse_whitespace(input);
    if s.is_empty() {
        return ParsedName::default();
    }

    let (first, last) = if let Some((last, first)) = s.split_once(',') {
        (first.trim().to_string(), last.trim().to_string())
    } else {
        let mut parts: Vec<&str> = s.split(' ').collect();
        if parts.len() == 1 {
            (String::new(), parts[0].to_string())
        } else if is_hungarian {
            let last = parts.remove(0).to_string();
            (parts.join(" "), last)
        } else {
            let last = parts.pop().unwrap_or_default().to_string();
            (parts.join(" "), last)
        }
    };

    let sort = format!("{} {}", last, first).trim().to_string();
    ParsedName { first, last, sort }
}

/// Display form: "Last First" for Hungarian authors, "First Last" otherwise
pub fn format_display(first: Option<&str>, last: Option<&str>, is_hungarian: bool) -> String {
    let first = first.unwrap_or("").trim();
    let last = last.unwrap_or("").trim();
    if first.is_empty() && last.is_empty() {
        return String::new();
    }
    if is_hungarian {
        format!("{} {}", last, first).trim().to_string()
    } else {
        format!("{} {}", first, last).trim().to_string()
    }
}

/// Sort form: "Last, First", or whichever part exists
pub fn format_sort(first: Option<&str>, last: Option<&str>) -> String {
    let first = first.unwrap_or("").trim();
    let last = last.unwrap_or("").trim();
    match (first.is_empty(), last.is_empty()) {
        (true, true) => String::new(),
        (true, false) => last.to_string(),
        (false, true) => first.to_string(),
        (false, false) => format!("{}, {}", last, first),
    }
}

/// Whether a free-text name should be treated as "no author at all"
pub fn is_blank_author(input: &str) -> bool {
    matches!(input.trim(), "" | "," | ";")
}

/// Split an author list into individual names.
///
/// Semicolons always separate authors. Without them, commas are ambiguous:
/// a single comma is one "Last, First" name, an even number of pieces pairs
/// up into "Last, First" names, anything else is a plain comma list.
pub fn split_author_list(input: &str) -> Vec<String> {
    let s = input.trim();
    if s.is_empty() {
        return Vec::new();
    }

    let parts: Vec<String> = if s.contains(';') {
        s.split(';').map(str::to_string).collect()
    } else {
        let comma_count = s.matches(',').count();
        if comma_count == 0 {
            vec![s.to_string()]
        } else {
            let pieces: Vec<&str> = s
                .split(',')
                .map(str::trim)
                .filter(|p| !is_blank_author(p))
                .collect();
            if comma_count == 1 && pieces.len() >= 2 {
                vec![format!("{}, {}", pieces[0], pieces[1])]
            } else if pieces.len() >= 2 && pieces.len() % 2 == 0 {
                pieces
                    .chunks(2)
                    .map(|pair| format!("{}, {}", pair[0], pair[1]))
                    .collect()
            } else {
                pieces.into_iter().map(str::to_string).collect()
            }
        }
    };

    parts
        .iter()
        .map(|p| collapse_whitespace(p))
        .filter(|name| !is_blank_author(name))
        .collect()
}

/// All the spellings a free-text name may already be stored under
///
/// Built for both the requested order and the flipped one, so stored data
/// with Hungarian/Western order mixed up still matches.
#[derive(Debug, Clone)]
pub struct AuthorCandidates {
    pub is_hungarian: bool,
    pub parsed: ParsedName,
    pub display: String,
    pub sort: String,
    pub sort_legacy: String,
    pub name_comma: String,
    pub first_last: String,
    pub last_first: String,
    pub alt_display: String,
    pub alt_sort: String,
    pub alt_sort_legacy: String,
    pub alt_name_comma: String,
    pub alt_first_last: String,
    pub alt_last_first: String,
}

impl AuthorCandidates {
    /// Build candidates; `force_hungarian` overrides the comma heuristic
    pub fn new(free_text: &str, force_hungarian: Option<bool>) -> Option<Self> {
        let text = collapse_whitespace(free_text);
        if text.is_empty() {
            return None;
        }
        let is_hungarian = force_hungarian.unwrap_or_else(|| text.contains(','));
        let parsed = parse_free_text(&text, is_hungarian);
        let alt = parse_free_text(&text, !is_hungarian);

        let join = |a: &str, sep: &str, b: &str| format!("{}{}{}", a, sep, b).trim().to_string();

        Some(Self {
            is_hungarian,
            display: format_display(Some(&parsed.first), Some(&parsed.last), is_hungarian),
            sort: format_sort(Some(&parsed.first), Some(&parsed.last)),
            sort_legacy: join(&parsed.last, " ", &parsed.first),
            name_comma: join(&parsed.last, ", ", &parsed.first),
            first_last: join(&parsed.first, " ", &parsed.last),
            last_first: join(&parsed.last, " ", &parsed.first),
            alt_display: format_display(Some(&alt.first), Some(&alt.last), !is_hungarian),
            alt_sort: format_sort(Some(&alt.first), Some(&alt.last)),
            alt_sort_legacy: join(&alt.last, " ", &alt.first),
            alt_name_comma: join(&alt.last, ", ", &alt.first),
            alt_first_last: join(&alt.first, " ", &alt.last),
            alt_last_first: join(&alt.last, " ", &alt.first),
            parsed,
        })
    }

    /// The flipped parse differs from the primary one in sort columns
    pub fn alt_sort_differs(&self) -> bool {
        !self.alt_sort.is_empty()
            && (self.alt_sort != self.sort || self.alt_sort_legacy != self.sort_legacy)
    }

    /// The flipped parse differs from the primary one in name columns
    pub fn alt_name_differs(&self) -> bool {
        !self.alt_display.is_empty()
            && (self.alt_display != self.display || self.alt_name_comma != self.name_comma)
    }
}
