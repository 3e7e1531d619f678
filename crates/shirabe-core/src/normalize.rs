//! Title normalization applied before comparing titles from different sites.
//!
//! Catalog sites disagree on width, case, numerals and punctuation
//! ("Mob Psycho 100 Ⅱ", "mob psycho 100 II", "Mob Psycho 100: 2"). Folding
//! those differences away lets the proximity score measure the words that
//! actually differ.

use unicode_normalization::UnicodeNormalization;

/// Standalone roman numerals worth folding. "x" is left alone ("Spy x Family").
const ROMAN_NUMERALS: &[(&str, &str)] = &[
    ("viii", "8"),
    ("vii", "7"),
    ("iii", "3"),
    ("vi", "6"),
    ("iv", "4"),
    ("ix", "9"),
    ("ii", "2"),
    ("v", "5"),
];

/// Normalize a title for comparison.
///
/// NFKC + lowercase, typographic substitutions, roman numerals and ordinals
/// to digits, punctuation to spaces, whitespace collapsed.
pub fn normalize(title: &str) -> String {
    let folded: String = title.nfkc().collect::<String>().to_lowercase();
    let substituted = substitute(&folded);
    let words: Vec<String> = substituted
        .split(|c: char| c.is_whitespace() || is_separator(c))
        .filter(|w| !w.is_empty())
        .map(fold_word)
        .filter(|w| !w.is_empty())
        .collect();
    words.join(" ")
}

fn substitute(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\u{00D7}' => out.push_str(" x "),
            '\u{2019}' | '\u{2018}' | '\u{02BC}' => out.push('\''),
            '&' => out.push_str(" and "),
            '\u{00E6}' => out.push_str("ae"),
            '\u{00DF}' => out.push_str("ss"),
            c => out.push(c),
        }
    }
    out
}

/// Punctuation that separates words rather than sitting inside one.
fn is_separator(c: char) -> bool {
    c.is_ascii_punctuation() && c != '\''
}

fn fold_word(word: &str) -> String {
    let word = word.trim_matches('\'');
    if let Some(&(_, digits)) = ROMAN_NUMERALS.iter().find(|(roman, _)| *roman == word) {
        return digits.to_string();
    }
    if let Some(number) = strip_ordinal(word) {
        return number.to_string();
    }
    word.replace('\'', "")
}

/// "2nd" → "2". Anything else → `None`.
fn strip_ordinal(word: &str) -> Option<&str> {
    ["st", "nd", "rd", "th"]
        .iter()
        .find_map(|suffix| word.strip_suffix(suffix))
        .filter(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}
