//! Title cleaning for display and list titles.

/// Pictographic symbols (emoji blocks and their modifiers). Letters with
/// diacritics are deliberately outside every range here.
fn is_pictographic(c: char) -> bool {
    matches!(u32::from(c),
        0x2600..=0x26FF        // misc symbols
        | 0x2700..=0x27BF      // dingbats
        | 0x2B00..=0x2BFF      // arrows, stars
        | 0xFE0E..=0xFE0F      // variation selectors
        | 0x1F000..=0x1F0FF    // mahjong/domino/cards
        | 0x1F1E6..=0x1F1FF    // regional indicators
        | 0x1F300..=0x1F5FF
        | 0x1F600..=0x1F64F
        | 0x1F680..=0x1F6FF
        | 0x1F900..=0x1F9FF
        | 0x1FA70..=0x1FAFF
        | 0x200D..=0x200D      // zero-width joiner
    )
}

/// Strip leading/trailing pictographs and whitespace, then a single trailing
/// period. Interior punctuation and emojis are kept as-is.
pub fn clean_title(raw: &str) -> String {
    let stripped = raw.trim_matches(|c: char| c.is_whitespace() || is_pictographic(c));
    let dotless = stripped.strip_suffix('.').unwrap_or(stripped);
    dotless.trim_end().to_string()
}
