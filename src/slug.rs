//! URL-safe slug generation for destination rows.
//!
//! Slugs are normalized to lowercase ASCII, length-capped, and always
//! suffixed with the payload's generated id so that two records with the
//! same title still land on distinct slugs, even across repeated runs.

/// Maximum length of the normalized part, before the id suffix.
pub const SLUG_MAX_LEN: usize = 75;

/// Lowercase, transliterate Turkish/Latin diacritics, replace everything
/// else with single hyphens.
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_hyphen = true; // suppress leading hyphen
    for c in input.chars() {
        let mapped = transliterate(c);
        match mapped {
            Some(ch) => {
                out.push(ch);
                last_hyphen = false;
            }
            None => {
                if !last_hyphen {
                    out.push('-');
                    last_hyphen = true;
                }
            }
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Compose the final destination slug: normalized `text`, capped, suffixed
/// with the generated id. Falls back to the bare id when nothing usable
/// remains after normalization.
pub fn unique_slug(text: &str, id: &str) -> String {
    let mut base = slugify(text);
    if base.len() > SLUG_MAX_LEN {
        let mut cut = SLUG_MAX_LEN;
        while !base.is_char_boundary(cut) {
            cut -= 1;
        }
        base.truncate(cut);
        while base.ends_with('-') {
            base.pop();
        }
    }
    if base.is_empty() {
        id.to_string()
    } else {
        format!("{base}-{id}")
    }
}

fn transliterate(c: char) -> Option<char> {
    let lower = c.to_lowercase().next().unwrap_or(c);
    match lower {
        'a'..='z' | '0'..='9' => Some(lower),
        'ç' => Some('c'),
        'ğ' => Some('g'),
        'ı' | 'î' | 'í' | 'ì' => Some('i'),
        'ö' | 'ô' | 'ó' => Some('o'),
        'ş' => Some('s'),
        'ü' | 'û' | 'ú' => Some('u'),
        'â' | 'á' | 'à' | 'ä' => Some('a'),
        'é' | 'è' | 'ê' | 'ë' => Some('e'),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_url_safe(slug: &str) -> bool {
        slug.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    }

    #[test]
    fn transliterates_turkish_and_strips_punctuation() {
        let s = slugify("'Hücre' Operasyonunda 10 Suç Örgütü Çökertildi.");
        assert_eq!(s, "hucre-operasyonunda-10-suc-orgutu-cokertildi");
        assert!(is_url_safe(&s));
    }

    #[test]
    fn identical_titles_get_distinct_slugs() {
        let a = unique_slug("Aynı Başlık", "abc123def456gh78");
        let b = unique_slug("Aynı Başlık", "zzz999yyy888xx77");
        assert_ne!(a, b);
        assert!(a.starts_with("ayni-baslik-"));
        assert!(is_url_safe(&a) && is_url_safe(&b));
    }

    #[test]
    fn long_titles_are_capped_before_the_suffix() {
        let long = "çok ".repeat(40);
        let s = unique_slug(&long, "abc123def456gh78");
        let base = s.strip_suffix("-abc123def456gh78").unwrap();
        assert!(base.len() <= SLUG_MAX_LEN);
        assert!(!base.ends_with('-'));
    }

    #[test]
    fn empty_text_falls_back_to_the_id() {
        assert_eq!(unique_slug("!!!", "abc123def456gh78"), "abc123def456gh78");
    }
}
