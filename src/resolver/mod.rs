//! Reference-data resolution: authors -> editors, columnists -> writers,
//! legacy brand/category ids -> destination brands.
//!
//! Everything here is loaded once before the cursor starts streaming and is
//! read-only during processing. Resolution gaps are per-entity and
//! non-fatal; records referencing an unresolved entity are skipped later.

pub mod name_index;

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use sqlx::Row;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::{MigrationConfig, INFOGRAPHIC_SENTINEL_SLUG};
use crate::db::Db;
use crate::model::{DestBrand, Editor, Writer};
use name_index::NameIndex;

/// Source author joined with its user profile.
#[derive(Debug, Clone)]
struct SourceAuthor {
    id: i64,
    full_name: String,
    email: Option<String>,
    user_email: Option<String>,
}

/// Source author id -> best-matching destination editor. Authors without a
/// match are simply absent.
pub struct AuthorIndex {
    map: HashMap<i64, Editor>,
}

impl AuthorIndex {
    pub fn resolve(&self, author_id: i64) -> Option<&Editor> {
        self.map.get(&author_id)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn build(authors: Vec<SourceAuthor>, editors: Vec<Editor>) -> Self {
        let by_email: HashMap<String, Editor> = editors
            .iter()
            .filter_map(|e| {
                e.email
                    .as_deref()
                    .map(|m| (m.to_lowercase(), e.clone()))
            })
            .collect();
        let name_index: NameIndex<Editor> = NameIndex::build(
            editors
                .into_iter()
                .map(|e| (e.full_name.clone(), e)),
        );

        let mut map = HashMap::new();
        for author in authors {
            let email_hit = [&author.email, &author.user_email]
                .into_iter()
                .flatten()
                .find_map(|m| by_email.get(&m.to_lowercase()));
            let matched = email_hit.or_else(|| name_index.best_match(&author.full_name));
            match matched {
                Some(editor) => {
                    map.insert(author.id, editor.clone());
                }
                None => {
                    warn!(
                        author_id = author.id,
                        author = %author.full_name,
                        "author has no matching editor; records will be skipped"
                    );
                }
            }
        }
        Self { map }
    }
}

/// One row of the precomputed legacy brand/category export. Only entries
/// with a non-empty `mapped` slug participate in resolution.
#[derive(Debug, Clone, Deserialize)]
struct LegacyTaxonomyRow {
    id: i64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    mapped: Option<String>,
}

/// Source brand/category id -> destination brand, plus the set of legacy ids
/// that target the infographic sentinel (exempt from brand mapping).
pub struct BrandMap {
    brands: HashMap<i64, DestBrand>,
    categories: HashMap<i64, DestBrand>,
    infographic_ids: HashSet<i64>,
}

impl BrandMap {
    /// Brand id takes precedence over category id, as in the source system.
    pub fn resolve(&self, brand_id: Option<i64>, category_id: Option<i64>) -> Option<&DestBrand> {
        brand_id
            .and_then(|id| self.brands.get(&id))
            .or_else(|| category_id.and_then(|id| self.categories.get(&id)))
    }

    pub fn is_infographic(&self, brand_id: Option<i64>, category_id: Option<i64>) -> bool {
        brand_id
            .map(|id| self.infographic_ids.contains(&id))
            .unwrap_or(false)
            || category_id
                .map(|id| self.infographic_ids.contains(&id))
                .unwrap_or(false)
    }

    fn build(
        legacy_brands: Vec<LegacyTaxonomyRow>,
        legacy_categories: Vec<LegacyTaxonomyRow>,
        dest_brands: &[DestBrand],
    ) -> Self {
        let by_slug: HashMap<&str, &DestBrand> =
            dest_brands.iter().map(|b| (b.slug.as_str(), b)).collect();

        let mut out = Self {
            brands: HashMap::new(),
            categories: HashMap::new(),
            infographic_ids: HashSet::new(),
        };
        for (kind, rows) in [("brand", legacy_brands), ("category", legacy_categories)] {
            for row in rows {
                let Some(mapped) = row.mapped.as_deref().filter(|m| !m.trim().is_empty()) else {
                    continue;
                };
                if mapped == INFOGRAPHIC_SENTINEL_SLUG {
                    out.infographic_ids.insert(row.id);
                    continue;
                }
                match by_slug.get(mapped) {
                    Some(brand) => {
                        let target = if kind == "brand" {
                            &mut out.brands
                        } else {
                            &mut out.categories
                        };
                        target.insert(row.id, (*brand).clone());
                    }
                    None => {
                        warn!(
                            kind,
                            legacy_id = row.id,
                            legacy_name = row.name.as_deref().unwrap_or(""),
                            mapped,
                            "no destination brand for mapped slug; dropping"
                        );
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
impl AuthorIndex {
    pub(crate) fn from_entries(entries: Vec<(i64, Editor)>) -> Self {
        Self {
            map: entries.into_iter().collect(),
        }
    }
}

#[cfg(test)]
impl BrandMap {
    pub(crate) fn from_parts(
        brands: Vec<(i64, DestBrand)>,
        categories: Vec<(i64, DestBrand)>,
        infographic_ids: Vec<i64>,
    ) -> Self {
        Self {
            brands: brands.into_iter().collect(),
            categories: categories.into_iter().collect(),
            infographic_ids: infographic_ids.into_iter().collect(),
        }
    }
}

pub struct ReferenceData {
    pub authors: AuthorIndex,
    pub brands: BrandMap,
}

/// Load everything the classifier needs to resolve identities. Invoked once
/// before streaming begins; never creates destination rows.
pub async fn resolve(source: &Db, dest: &Db, cfg: &MigrationConfig) -> Result<ReferenceData> {
    let authors = load_source_authors(source).await?;
    let editors = load_editors(dest).await?;
    info!(
        authors = authors.len(),
        editors = editors.len(),
        "resolving authors against editors"
    );
    let author_index = AuthorIndex::build(authors, editors);
    info!(resolved = author_index.len(), "author resolution done");

    let legacy_brands = load_legacy_export(&cfg.brands_export).await?;
    let legacy_categories = load_legacy_export(&cfg.categories_export).await?;
    let dest_brands = load_dest_brands(dest).await?;
    let brand_map = BrandMap::build(legacy_brands, legacy_categories, &dest_brands);
    info!(
        brands = brand_map.brands.len(),
        categories = brand_map.categories.len(),
        infographic_ids = brand_map.infographic_ids.len(),
        "brand mapping built"
    );

    Ok(ReferenceData {
        authors: author_index,
        brands: brand_map,
    })
}

async fn load_source_authors(source: &Db) -> Result<Vec<SourceAuthor>> {
    let rows = sqlx::query(
        r#"SELECT author.id, author.full_name, author.email, u.email AS user_email
           FROM author LEFT JOIN "user" AS u ON author.user_id = u.id"#,
    )
    .persistent(false)
    .fetch_all(&source.pool)
    .await
    .context("loading source authors")?;

    Ok(rows
        .iter()
        .map(|r| SourceAuthor {
            id: r.get::<i32, _>("id") as i64,
            full_name: r
                .try_get::<Option<String>, _>("full_name")
                .ok()
                .flatten()
                .unwrap_or_default(),
            email: r.try_get("email").ok().flatten(),
            user_email: r.try_get("user_email").ok().flatten(),
        })
        .collect())
}

async fn load_editors(dest: &Db) -> Result<Vec<Editor>> {
    let rows = sqlx::query("SELECT id, fullname, email FROM editors")
        .persistent(false)
        .fetch_all(&dest.pool)
        .await
        .context("loading destination editors")?;
    Ok(rows
        .iter()
        .map(|r| Editor {
            id: r.get("id"),
            full_name: r
                .try_get::<Option<String>, _>("fullname")
                .ok()
                .flatten()
                .unwrap_or_default(),
            email: r.try_get("email").ok().flatten(),
        })
        .collect())
}

async fn load_dest_brands(dest: &Db) -> Result<Vec<DestBrand>> {
    let rows = sqlx::query("SELECT id, slug, name FROM brands WHERE deleted_at IS NULL")
        .persistent(false)
        .fetch_all(&dest.pool)
        .await
        .context("loading destination brands")?;
    Ok(rows
        .iter()
        .map(|r| DestBrand {
            id: r.get("id"),
            slug: r.get("slug"),
            name: r
                .try_get::<Option<String>, _>("name")
                .ok()
                .flatten()
                .unwrap_or_default(),
        })
        .collect())
}

async fn load_legacy_export(path: &Path) -> Result<Vec<LegacyTaxonomyRow>> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading legacy export {}", path.display()))?;
    let rows: Vec<LegacyTaxonomyRow> = serde_json::from_slice(&bytes)
        .with_context(|| format!("parsing legacy export {}", path.display()))?;
    Ok(rows)
}

/// Maps a column author's name to a destination writer id. The classifier
/// calls this only for the column branch.
#[async_trait]
pub trait WriterResolver: Send + Sync {
    async fn writer_id(&self, full_name: &str) -> Result<Option<String>>;
}

/// Fuzzy-matching writer directory over the destination `writers` table.
/// When `auto_create` is on, a missing writer is inserted on first use;
/// otherwise the gap is logged and the column keeps a null writer reference.
pub struct PgWriterDirectory {
    db: Db,
    index: NameIndex<Writer>,
    auto_create: bool,
    created: Mutex<HashMap<String, String>>,
}

impl PgWriterDirectory {
    pub async fn load(dest: &Db, auto_create: bool) -> Result<Self> {
        let rows = sqlx::query("SELECT id, fullname FROM writers")
            .persistent(false)
            .fetch_all(&dest.pool)
            .await
            .context("loading destination writers")?;
        let writers: Vec<Writer> = rows
            .iter()
            .map(|r| Writer {
                id: r.get("id"),
                full_name: r
                    .try_get::<Option<String>, _>("fullname")
                    .ok()
                    .flatten()
                    .unwrap_or_default(),
            })
            .collect();
        info!(writers = writers.len(), auto_create, "writer directory loaded");
        Ok(Self {
            db: dest.clone(),
            index: NameIndex::build(writers.into_iter().map(|w| (w.full_name.clone(), w))),
            auto_create,
            created: Mutex::new(HashMap::new()),
        })
    }

    async fn create_writer(&self, full_name: &str) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now();
        sqlx::query(
            "INSERT INTO writers(id, fullname, is_active, created_at, updated_at) VALUES ($1,$2,$3,$4,$5)",
        )
        .persistent(false)
        .bind(&id)
        .bind(full_name)
        .bind(true)
        .bind(now)
        .bind(now)
        .execute(&self.db.pool)
        .await
        .context("creating destination writer")?;
        info!(writer = %full_name, writer_id = %id, "created missing writer");
        Ok(id)
    }
}

#[async_trait]
impl WriterResolver for PgWriterDirectory {
    async fn writer_id(&self, full_name: &str) -> Result<Option<String>> {
        if let Some(writer) = self.index.best_match(full_name) {
            return Ok(Some(writer.id.clone()));
        }
        if !self.auto_create {
            warn!(writer = %full_name, "no matching writer; column keeps null writer reference");
            return Ok(None);
        }
        // One insert per distinct name per run, even across concurrent
        // pipelines.
        let mut created = self.created.lock().await;
        if let Some(id) = created.get(full_name) {
            return Ok(Some(id.clone()));
        }
        let id = self.create_writer(full_name).await?;
        created.insert(full_name.to_string(), id.clone());
        Ok(Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn editor(id: &str, name: &str, email: Option<&str>) -> Editor {
        Editor {
            id: id.into(),
            full_name: name.into(),
            email: email.map(String::from),
        }
    }

    #[test]
    fn email_match_wins_over_fuzzy_name() {
        let authors = vec![
            SourceAuthor {
                id: 1,
                full_name: "Ayşe Demir".into(),
                email: Some("ayse@legacy.example".into()),
                user_email: None,
            },
            SourceAuthor {
                id: 2,
                full_name: "Mehmet Yildirim".into(),
                email: None,
                user_email: Some("MEHMET@legacy.example".into()),
            },
            SourceAuthor {
                id: 3,
                full_name: "Tanınmayan Kişi".into(),
                email: None,
                user_email: None,
            },
        ];
        let editors = vec![
            editor("e1", "A. Demir", Some("ayse@legacy.example")),
            editor("e2", "Mehmet Yıldırım", Some("mehmet@legacy.example")),
        ];
        let idx = AuthorIndex::build(authors, editors);
        assert_eq!(idx.resolve(1).unwrap().id, "e1");
        assert_eq!(idx.resolve(2).unwrap().id, "e2");
        assert!(idx.resolve(3).is_none());
        assert_eq!(idx.len(), 2);
    }

    #[test]
    fn fuzzy_fallback_requires_a_close_name() {
        let authors = vec![SourceAuthor {
            id: 9,
            full_name: "Elif Sahin".into(),
            email: None,
            user_email: None,
        }];
        let editors = vec![editor("e9", "Elif Şahin", None)];
        let idx = AuthorIndex::build(authors, editors);
        assert_eq!(idx.resolve(9).unwrap().id, "e9");
    }

    fn legacy(id: i64, mapped: Option<&str>) -> LegacyTaxonomyRow {
        LegacyTaxonomyRow {
            id,
            name: None,
            mapped: mapped.map(String::from),
        }
    }

    fn dest(slug: &str) -> DestBrand {
        DestBrand {
            id: format!("dest-{slug}"),
            slug: slug.into(),
            name: slug.to_uppercase(),
        }
    }

    #[test]
    fn brand_map_intersects_by_exact_slug() {
        let map = BrandMap::build(
            vec![
                legacy(1, Some("gundem")),
                legacy(2, Some("kayip-slug")),
                legacy(3, None),
            ],
            vec![legacy(40, Some("spor"))],
            &[dest("gundem"), dest("spor")],
        );
        assert_eq!(map.resolve(Some(1), None).unwrap().slug, "gundem");
        assert!(map.resolve(Some(2), None).is_none());
        assert!(map.resolve(Some(3), None).is_none());
        // category fallback when the brand id is unmapped
        assert_eq!(map.resolve(Some(2), Some(40)).unwrap().slug, "spor");
    }

    #[test]
    fn sentinel_entries_are_tracked_but_never_mapped() {
        let map = BrandMap::build(
            vec![legacy(7, Some("infografik"))],
            vec![],
            &[dest("gundem")],
        );
        assert!(map.resolve(Some(7), None).is_none());
        assert!(map.is_infographic(Some(7), None));
        assert!(!map.is_infographic(Some(8), None));
    }
}
