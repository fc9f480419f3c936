//! Turkish-aware text normalization.
//!
//! Two entry points with one shared contract: both are deterministic and
//! idempotent, so normalizing already-normalized text is a no-op.
//!
//! - [`clean_extracted`] repairs raw PDF text: soft hyphens, bullet glyphs,
//!   zero-width characters, and end-of-line hyphenation are removed and
//!   line breaks are collapsed into spaces.
//! - [`fold`] lowers the text into the ASCII search alphabet: Turkish
//!   characters map to their ASCII equivalents, combining marks are
//!   stripped after NFKD, and everything outside the kept character set
//!   becomes whitespace.

use regex::Regex;
use std::sync::OnceLock;
use unicode_normalization::UnicodeNormalization;

fn hyphen_join_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\w)-\n(\w)").expect("valid hyphen join pattern"))
}

fn keep_class_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Characters meaningful to the domain survive folding: percent signs,
    // fractions, section references like "31/2", decimal grades.
    RE.get_or_init(|| Regex::new(r"[^\w\s%/\.\-\(\),:]").expect("valid keep class pattern"))
}

fn whitespace_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace pattern"))
}

/// Repair raw text recovered from a PDF page.
pub fn clean_extracted(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '\u{00ad}' | '\u{200b}' | '\u{2022}' | '\u{f0b7}'))
        .collect();

    // Re-join words hyphenated across a line break before flattening lines.
    let joined = hyphen_join_regex().replace_all(&cleaned, "$1$2");
    let flat = joined.replace('\r', "\n").replace('\n', " ");
    whitespace_regex().replace_all(&flat, " ").trim().to_string()
}

/// Fold one character of the Turkish alphabet to its ASCII equivalent.
fn fold_char(c: char) -> char {
    match c {
        'ç' => 'c',
        'ğ' => 'g',
        'ı' => 'i',
        'ö' => 'o',
        'ş' => 's',
        'ü' => 'u',
        'Ç' => 'C',
        'Ğ' => 'G',
        'İ' => 'I',
        'Ö' => 'O',
        'Ş' => 'S',
        'Ü' => 'U',
        other => other,
    }
}

/// Lowercase ASCII folding of Turkish text, suitable for tokenization.
pub fn fold(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let lowered: String = text
        .chars()
        .map(fold_char)
        .flat_map(|c| c.to_lowercase())
        .collect();

    // NFKD then drop combining marks, so decomposed diacritics fold too.
    let stripped: String = lowered
        .nfkd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .collect();

    let kept = keep_class_regex().replace_all(&stripped, " ");
    whitespace_regex().replace_all(&kept, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_maps_turkish_characters() {
        assert_eq!(fold("Bütünleme Sınavı"), "butunleme sinavi");
        assert_eq!(fold("ÇĞİÖŞÜ çğıöşü"), "cgiosu cgiosu");
    }

    #[test]
    fn fold_keeps_domain_punctuation() {
        assert_eq!(fold("%50 (final)"), "%50 (final)");
        assert_eq!(fold("Madde 31/2"), "madde 31/2");
    }

    #[test]
    fn fold_is_idempotent() {
        let once = fold("Geçme Notu %60'tır!");
        assert_eq!(fold(&once), once);
    }

    #[test]
    fn clean_joins_hyphenated_line_breaks() {
        assert_eq!(
            clean_extracted("devam-\nsizlik durumu"),
            "devamsizlik durumu"
        );
    }

    #[test]
    fn clean_strips_bullets_and_soft_hyphens() {
        assert_eq!(
            clean_extracted("• kayıt\u{00ad} yenileme\u{200b}"),
            "kayıt yenileme"
        );
    }

    #[test]
    fn clean_is_idempotent() {
        let once = clean_extracted("satır bir\nsatır  iki\r\nsatır üç");
        assert_eq!(clean_extracted(&once), once);
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(fold(""), "");
        assert_eq!(clean_extracted(""), "");
    }
}
