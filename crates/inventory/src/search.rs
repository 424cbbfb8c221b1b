//! Item text search: exact match, per-token wildcard match and phonetic
//! (soundex) match.
//!
//! The in-memory store evaluates [`ItemSearch::matches`] directly; the Postgres
//! store builds the equivalent SQL from [`ItemSearch::terms`] and the raw text.

use crate::Item;

/// Tokens shorter than this are ignored for wildcard matching.
const MIN_TERM_LEN: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSearch {
    raw: String,
    lowered: String,
    terms: Vec<String>,
    phonetic: Option<String>,
}

impl ItemSearch {
    /// Returns `None` for blank input (no search requested).
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let lowered = raw.to_lowercase();
        let terms = lowered
            .split_whitespace()
            .filter(|t| t.chars().count() >= MIN_TERM_LEN)
            .map(str::to_string)
            .collect();
        Some(Self {
            raw: raw.to_string(),
            lowered,
            terms,
            phonetic: soundex(raw),
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Lowercased tokens used for wildcard matching.
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn phonetic(&self) -> Option<&str> {
        self.phonetic.as_deref()
    }

    pub fn matches(&self, item: &Item) -> bool {
        let exact = [Some(&item.name), Some(&item.sku), item.brand.as_ref()]
            .into_iter()
            .flatten()
            .any(|v| v.to_lowercase() == self.lowered);
        if exact {
            return true;
        }

        if self.terms.iter().any(|t| contains_text(item, t)) {
            return true;
        }

        match self.phonetic.as_deref() {
            Some(code) => {
                soundex(&item.name).as_deref() == Some(code)
                    || soundex(&item.sku).as_deref() == Some(code)
            }
            None => false,
        }
    }
}

/// Case-insensitive substring match over the item's descriptive fields.
pub fn contains_text(item: &Item, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    [
        Some(&item.name),
        Some(&item.sku),
        item.description.as_ref(),
        item.brand.as_ref(),
        item.category.as_ref(),
    ]
    .into_iter()
    .flatten()
    .any(|v| v.to_lowercase().contains(&needle))
}

/// American soundex code (letter + three digits), `None` without letters.
pub fn soundex(input: &str) -> Option<String> {
    let mut letters = input
        .chars()
        .filter(char::is_ascii_alphabetic)
        .map(|c| c.to_ascii_uppercase());

    let first = letters.next()?;
    let mut out = String::with_capacity(4);
    out.push(first);
    let mut last = digit(first);

    for c in letters {
        match digit(c) {
            Some(d) if Some(d) != last => {
                out.push(d);
                if out.len() == 4 {
                    break;
                }
                last = Some(d);
            }
            Some(_) => {}
            // H and W do not separate equal codes; vowels do.
            None if matches!(c, 'H' | 'W') => {}
            None => last = None,
        }
    }

    while out.len() < 4 {
        out.push('0');
    }
    Some(out)
}

fn digit(c: char) -> Option<char> {
    match c {
        'B' | 'F' | 'P' | 'V' => Some('1'),
        'C' | 'G' | 'J' | 'K' | 'Q' | 'S' | 'X' | 'Z' => Some('2'),
        'D' | 'T' => Some('3'),
        'L' => Some('4'),
        'M' | 'N' => Some('5'),
        'R' => Some('6'),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ItemDraft;
    use chrono::Utc;

    fn item(name: &str, sku: &str, brand: Option<&str>) -> Item {
        Item::create(
            ItemDraft {
                sku: sku.to_string(),
                name: name.to_string(),
                description: Some("heavy duty".to_string()),
                category: Some("Tools".to_string()),
                brand: brand.map(str::to_string),
                unit_of_measure: "pcs".to_string(),
                minimum_stock_level: 0,
                maximum_stock_level: None,
                is_active: None,
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn soundex_reference_values() {
        assert_eq!(soundex("Robert").as_deref(), Some("R163"));
        assert_eq!(soundex("Rupert").as_deref(), Some("R163"));
        assert_eq!(soundex("Ashcraft").as_deref(), Some("A261"));
        assert_eq!(soundex("Tymczak").as_deref(), Some("T522"));
        assert_eq!(soundex("Pfister").as_deref(), Some("P236"));
        assert_eq!(soundex("Lee").as_deref(), Some("L000"));
        assert_eq!(soundex("123"), None);
    }

    #[test]
    fn blank_search_is_none() {
        assert!(ItemSearch::parse("   ").is_none());
    }

    #[test]
    fn short_tokens_are_dropped() {
        let s = ItemSearch::parse("a drill").unwrap();
        assert_eq!(s.terms(), &["drill".to_string()]);
    }

    #[test]
    fn matches_exact_wildcard_and_phonetic() {
        let drill = item("Hammer Drill", "HD-100", Some("Makita"));

        assert!(ItemSearch::parse("makita").unwrap().matches(&drill));
        assert!(ItemSearch::parse("dri").unwrap().matches(&drill));
        assert!(ItemSearch::parse("duty").unwrap().matches(&drill));
        assert!(ItemSearch::parse("Hamer Dril").unwrap().matches(&drill));
        assert!(!ItemSearch::parse("zzz").unwrap().matches(&drill));
    }

    #[test]
    fn contains_text_checks_category() {
        let drill = item("Hammer Drill", "HD-100", None);
        assert!(contains_text(&drill, "TOOL"));
        assert!(!contains_text(&drill, "garden"));
    }
}
