use std::path::PathBuf;
use std::time::Duration;

use crate::util::env as env_util;

/// Default number of source rows pulled per cursor page.
pub const DEFAULT_READ_COUNT: usize = 1000;
/// Default ceiling of in-flight per-record pipelines before a drain.
pub const DEFAULT_BATCH_CEILING: usize = 512;
/// Display titles longer than this many characters are swapped for the
/// generated list title.
pub const DEFAULT_TITLE_MAX_CHARS: usize = 60;
/// Brand slug that routes eligible records to the column table.
pub const DEFAULT_COLUMN_BRAND_SLUG: &str = "yakin-plan";
/// Legacy slug marking infographic content; exempt from brand mapping.
pub const INFOGRAPHIC_SENTINEL_SLUG: &str = "infografik";

/// Run-wide tuning knobs and editorial policy, loaded once from the
/// environment and carried inside the pipeline context.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub read_count: usize,
    pub batch_ceiling: usize,
    pub enrich_timeout: Duration,
    /// When a column author has no fuzzy-matched destination writer: create
    /// one (true) or log and leave the writer reference null (false).
    pub auto_create_missing_identities: bool,
    pub cache_path: PathBuf,
    pub brands_export: PathBuf,
    pub categories_export: PathBuf,
    pub title_max_chars: usize,
    pub column_brand_slug: String,
    /// Authors whose yakin-plan pieces become columns instead of articles.
    pub column_authors: Vec<String>,
    /// (brand slug, author full name) pairs that are always skipped.
    pub excluded_pairs: Vec<(String, String)>,
}

impl MigrationConfig {
    pub fn from_env() -> Self {
        Self {
            read_count: env_util::env_parse("READ_COUNT", DEFAULT_READ_COUNT),
            batch_ceiling: env_util::env_parse("BATCH_CEILING", DEFAULT_BATCH_CEILING),
            enrich_timeout: Duration::from_secs(env_util::env_parse("ENRICH_TIMEOUT_SECS", 30u64)),
            auto_create_missing_identities: env_util::env_flag(
                "AUTO_CREATE_MISSING_IDENTITIES",
                false,
            ),
            cache_path: env_util::env_opt("ENRICHMENT_CACHE_PATH")
                .unwrap_or_else(|| "metadata.json".into())
                .into(),
            brands_export: env_util::env_opt("BRANDS_EXPORT_PATH")
                .unwrap_or_else(|| "brands.json".into())
                .into(),
            categories_export: env_util::env_opt("CATEGORIES_EXPORT_PATH")
                .unwrap_or_else(|| "categories.json".into())
                .into(),
            title_max_chars: env_util::env_parse("TITLE_MAX_CHARS", DEFAULT_TITLE_MAX_CHARS),
            column_brand_slug: env_util::env_opt("COLUMN_BRAND_SLUG")
                .unwrap_or_else(|| DEFAULT_COLUMN_BRAND_SLUG.into()),
            column_authors: parse_name_list(env_util::env_opt("COLUMN_AUTHORS")),
            excluded_pairs: parse_pair_list(env_util::env_opt("EXCLUDED_BRAND_AUTHORS")),
        }
    }

    pub fn is_excluded(&self, brand_slug: &str, author_name: &str) -> bool {
        self.excluded_pairs
            .iter()
            .any(|(b, a)| b == brand_slug && a.eq_ignore_ascii_case(author_name))
    }

    pub fn is_column_author(&self, author_name: &str) -> bool {
        self.column_authors
            .iter()
            .any(|a| a.eq_ignore_ascii_case(author_name))
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            read_count: DEFAULT_READ_COUNT,
            batch_ceiling: DEFAULT_BATCH_CEILING,
            enrich_timeout: Duration::from_secs(30),
            auto_create_missing_identities: false,
            cache_path: "metadata.json".into(),
            brands_export: "brands.json".into(),
            categories_export: "categories.json".into(),
            title_max_chars: DEFAULT_TITLE_MAX_CHARS,
            column_brand_slug: DEFAULT_COLUMN_BRAND_SLUG.into(),
            column_authors: Vec::new(),
            excluded_pairs: Vec::new(),
        }
    }
}

/// `COLUMN_AUTHORS="Ada Yılmaz,Deniz Kaya"`
fn parse_name_list(raw: Option<String>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

/// `EXCLUDED_BRAND_AUTHORS="magazin:Ada Yılmaz,spor:Deniz Kaya"`
fn parse_pair_list(raw: Option<String>) -> Vec<(String, String)> {
    raw.map(|s| {
        s.split(',')
            .filter_map(|p| {
                let (brand, author) = p.split_once(':')?;
                let brand = brand.trim();
                let author = author.trim();
                if brand.is_empty() || author.is_empty() {
                    return None;
                }
                Some((brand.to_string(), author.to_string()))
            })
            .collect()
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pair_list() {
        let pairs = parse_pair_list(Some("magazin:Ada Yılmaz, spor:Deniz Kaya".into()));
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0], ("magazin".to_string(), "Ada Yılmaz".to_string()));
    }

    #[test]
    fn exclusion_check_is_case_insensitive_on_author() {
        let cfg = MigrationConfig {
            excluded_pairs: vec![("magazin".into(), "Ada Yilmaz".into())],
            ..Default::default()
        };
        assert!(cfg.is_excluded("magazin", "ada yilmaz"));
        assert!(!cfg.is_excluded("spor", "Ada Yilmaz"));
    }
}
