use anyhow::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use rand::Rng;
use serde::Deserialize;
use serde_json::Value;
use sqlx::{postgres::PgRow, Row};

/// One legacy content item, exactly as read from the source cursor.
/// Immutable once built; the pipeline never writes back to the source.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub id: i64,
    pub title: String,
    pub message: Option<String>,
    pub content_data: Option<Value>,
    pub video: Option<VideoDescriptor>,
    pub images: Vec<ImageRef>,
    pub brand_id: Option<i64>,
    pub category_id: Option<i64>,
    pub author_id: i64,
    pub slug: Option<String>,
    pub seo: Option<Value>,
    pub premium: bool,
    pub stat_views: i64,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoDescriptor {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub playlist: Option<String>,
}

impl VideoDescriptor {
    /// URL handed to the media prober; the playlist rendition is preferred.
    pub fn probe_url(&self) -> Option<&str> {
        self.playlist.as_deref().or(self.url.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageRef {
    #[serde(default)]
    pub url: String,
}

impl SourceRecord {
    /// Map one cursor row; the JSONB columns (video, images, seo) are
    /// tolerated as malformed (treated as absent) rather than failing the row.
    pub fn from_row(row: &PgRow) -> Result<Self> {
        let video: Option<Value> = row.try_get("video").unwrap_or(None);
        let images: Option<Value> = row.try_get("images").unwrap_or(None);

        Ok(Self {
            id: row.try_get::<i32, _>("id")? as i64,
            title: row.try_get::<Option<String>, _>("title")?.unwrap_or_default(),
            message: row.try_get("message")?,
            content_data: row.try_get("content_data")?,
            video: video.and_then(|v| serde_json::from_value::<VideoDescriptor>(v).ok()),
            images: images
                .and_then(|v| serde_json::from_value::<Vec<ImageRef>>(v).ok())
                .unwrap_or_default(),
            brand_id: row
                .try_get::<Option<i32>, _>("brand_id")?
                .map(|v| v as i64),
            category_id: row
                .try_get::<Option<i32>, _>("category_id")?
                .map(|v| v as i64),
            author_id: row.try_get::<i32, _>("author_id")? as i64,
            slug: row.try_get("slug")?,
            seo: row.try_get("seo")?,
            premium: row.try_get::<Option<bool>, _>("premium")?.unwrap_or(false),
            stat_views: row
                .try_get::<Option<i32>, _>("stat_views")?
                .unwrap_or(0) as i64,
            published_at: naive_utc(row.try_get("published_at")?),
            created_at: naive_utc(row.try_get("created_at")?),
            updated_at: naive_utc(row.try_get("updated_at")?),
        })
    }

    /// Raw text the title policy starts from: the headline, else the message.
    pub fn title_source(&self) -> &str {
        if !self.title.trim().is_empty() {
            &self.title
        } else {
            self.message.as_deref().unwrap_or_default()
        }
    }

    /// Thumbnail variants expected by every destination table; each points at
    /// the first image until real crops exist.
    pub fn thumbnails(&self) -> Value {
        let url = self.images.first().map(|i| i.url.as_str()).unwrap_or("");
        serde_json::json!({
            "original": url,
            "3x2": url,
            "4x3": url,
            "9x16": url,
        })
    }
}

fn naive_utc(ts: Option<NaiveDateTime>) -> Option<DateTime<Utc>> {
    ts.map(|t| t.and_utc())
}

/// Destination-side editor (authors map onto these).
#[derive(Debug, Clone)]
pub struct Editor {
    pub id: String,
    pub full_name: String,
    pub email: Option<String>,
}

/// Destination-side column writer.
#[derive(Debug, Clone)]
pub struct Writer {
    pub id: String,
    pub full_name: String,
}

/// Destination-side brand row.
#[derive(Debug, Clone)]
pub struct DestBrand {
    pub id: String,
    pub slug: String,
    pub name: String,
}

/// Fields shared by every destination entity type.
#[derive(Debug, Clone)]
pub struct PayloadCore {
    /// Freshly generated 16-char base-36 id.
    pub id: String,
    /// Normalized slug, already suffixed with `id`.
    pub slug: String,
    pub title: String,
    pub description: String,
    /// None only for infographics (sentinel brands carry no mapping).
    pub brand_id: Option<String>,
    pub seo: Value,
    pub thumbnails: Value,
    pub status: String,
    pub is_premium: bool,
    pub number_of_views: i64,
    /// Source record id; the sole deduplication key across runs.
    pub import_id: String,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ArticlePayload {
    pub core: PayloadCore,
    pub content: String,
    pub editor_id: String,
}

#[derive(Debug, Clone)]
pub struct VideoArticlePayload {
    pub core: PayloadCore,
    pub content: Option<String>,
    pub video_url: String,
    pub editor_id: String,
}

#[derive(Debug, Clone)]
pub struct ShortPayload {
    pub core: PayloadCore,
    pub url: String,
    pub editor_id: String,
}

#[derive(Debug, Clone)]
pub struct ColumnPayload {
    pub core: PayloadCore,
    pub content: String,
    /// Null when no destination writer matched and auto-creation is off.
    pub writer_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InfographicPayload {
    pub core: PayloadCore,
    pub images: Value,
}

/// Closed sum over the destination shapes; the writer dispatches on this
/// exhaustively, one table per variant.
#[derive(Debug, Clone)]
pub enum DestinationPayload {
    Article(ArticlePayload),
    VideoArticle(VideoArticlePayload),
    Short(ShortPayload),
    Column(ColumnPayload),
    Infographic(InfographicPayload),
}

impl DestinationPayload {
    pub fn core(&self) -> &PayloadCore {
        match self {
            DestinationPayload::Article(p) => &p.core,
            DestinationPayload::VideoArticle(p) => &p.core,
            DestinationPayload::Short(p) => &p.core,
            DestinationPayload::Column(p) => &p.core,
            DestinationPayload::Infographic(p) => &p.core,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DestinationPayload::Article(_) => "article",
            DestinationPayload::VideoArticle(_) => "video_article",
            DestinationPayload::Short(_) => "short",
            DestinationPayload::Column(_) => "column",
            DestinationPayload::Infographic(_) => "infographic",
        }
    }
}

/// Outcome of one idempotent write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    Inserted(String),
    AlreadyExists,
}

/// Why a record produced no destination rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Author has no mapped editor, or neither brand nor category resolves.
    MissingIdentity,
    /// Fixed (brand slug, author) business override.
    EditorialExclusion,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::MissingIdentity => "editor or brand missing",
            SkipReason::EditorialExclusion => "editorial exclusion",
        }
    }
}

/// Per-record result surfaced to the run statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Written { inserted: usize, duplicates: usize },
    Skipped(SkipReason),
    /// Rule fell through every branch; the record contributes nothing.
    Nothing,
}

const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const ID_LEN: usize = 16;

/// Generate a destination content id: 16 base-36 characters, matching the
/// id shape of the existing destination rows.
pub fn content_id() -> String {
    let mut rng = rand::thread_rng();
    (0..ID_LEN)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    pub(crate) fn sample_record() -> SourceRecord {
        SourceRecord {
            id: 42,
            title: "Başlık".into(),
            message: Some("Açıklama".into()),
            content_data: None,
            video: None,
            images: vec![ImageRef {
                url: "https://cdn.example/a.jpg".into(),
            }],
            brand_id: Some(7),
            category_id: None,
            author_id: 3,
            slug: Some("baslik".into()),
            seo: None,
            premium: false,
            stat_views: 10,
            published_at: None,
            created_at: None,
            updated_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::sample_record;
    use super::*;

    #[test]
    fn content_ids_are_lowercase_base36_and_distinct() {
        let a = content_id();
        let b = content_id();
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert_ne!(a, b);
    }

    #[test]
    fn title_source_falls_back_to_message() {
        let rec = sample_record();
        assert_eq!(rec.title_source(), "Başlık");

        let mut untitled = sample_record();
        untitled.title = "  ".into();
        untitled.message = Some("Mesaj metni".into());
        assert_eq!(untitled.title_source(), "Mesaj metni");
    }

    #[test]
    fn thumbnails_use_first_image_for_every_variant() {
        let rec = sample_record();
        let t = rec.thumbnails();
        assert_eq!(t["original"], "https://cdn.example/a.jpg");
        assert_eq!(t["9x16"], "https://cdn.example/a.jpg");
    }
}
