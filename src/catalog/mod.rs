//! Catalog scraping: series ID to an ordered list of downloadable volumes.
//!
//! Scraping is two requests deep. The catalog page `/c/{id}.htm` carries the
//! series title, the author list, and a reference to a `book_data.php`
//! endpoint; that endpoint returns one `"volinfo=..."` record per volume.
//!
//! # Example
//!
//! ```no_run
//! use mox_core::catalog::CatalogScraper;
//! use mox_core::session::{MoxSession, SessionSettings};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = MoxSession::new(SessionSettings::default())?;
//! let series = CatalogScraper::new(session).fetch_series(1234).await?;
//! for volume in series.volumes() {
//!     println!("{} {}", volume.id(), volume.name());
//! }
//! # Ok(())
//! # }
//! ```

mod error;
pub mod parse;

use std::fmt;
use std::str::FromStr;

use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::session::MoxSession;

pub use error::CatalogError;

/// Tag placed in front of every downloaded filename.
pub const SITE_TAG: &str = "Mox";

/// Index of the volume ID inside a `volinfo` record.
const VOLUME_ID_FIELD: usize = 0;

/// Index of the volume name inside a `volinfo` record.
const VOLUME_NAME_FIELD: usize = 5;

/// Downloadable file format of a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetFormat {
    /// Kindle `.mobi`.
    Mobi,
    /// Kobo `.kepub.epub`.
    #[default]
    Epub,
}

impl AssetFormat {
    /// Both formats, in path-flag order.
    pub const ALL: [Self; 2] = [Self::Mobi, Self::Epub];

    /// Digit used for this format in download paths.
    #[must_use]
    pub fn flag(self) -> u8 {
        match self {
            Self::Mobi => 1,
            Self::Epub => 2,
        }
    }

    /// File extension written for this format (without leading dot).
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mobi => "mobi",
            Self::Epub => "kepub.epub",
        }
    }
}

impl fmt::Display for AssetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mobi => "mobi",
            Self::Epub => "epub",
        })
    }
}

impl FromStr for AssetFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mobi" => Ok(Self::Mobi),
            "epub" | "kepub" => Ok(Self::Epub),
            other => Err(format!("unknown format '{other}': expected epub or mobi")),
        }
    }
}

/// Account access tier selecting which download path variant is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessTier {
    /// First tier.
    Vip,
    /// Second tier.
    #[default]
    Vip2,
}

impl AccessTier {
    /// Both tiers, in path-flag order.
    pub const ALL: [Self; 2] = [Self::Vip, Self::Vip2];

    /// Digit used for this tier in download paths.
    #[must_use]
    pub fn flag(self) -> u8 {
        match self {
            Self::Vip => 0,
            Self::Vip2 => 1,
        }
    }
}

impl fmt::Display for AccessTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vip => "vip",
            Self::Vip2 => "vip2",
        })
    }
}

impl FromStr for AccessTier {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "vip" | "vip1" => Ok(Self::Vip),
            "vip2" => Ok(Self::Vip2),
            other => Err(format!("unknown tier '{other}': expected vip or vip2")),
        }
    }
}

/// Builds the site-relative download path of one volume asset.
///
/// `down/{series}/{volume}/{tier}/{format}/1-0/`
#[must_use]
pub fn asset_path(series_id: u64, volume_id: &str, format: AssetFormat, tier: AccessTier) -> String {
    format!(
        "down/{series_id}/{volume_id}/{}/{}/1-0/",
        tier.flag(),
        format.flag()
    )
}

/// One downloadable volume of a series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeRef {
    series_id: u64,
    fields: Vec<String>,
}

impl VolumeRef {
    /// Builds a volume from one comma-separated `volinfo` record.
    ///
    /// All fields are kept positionally; field 0 is the ID and field 5 the
    /// name.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::MalformedVolumeRecord`] if the record has
    /// fewer than six fields.
    pub fn from_record(series_id: u64, record: &str) -> Result<Self, CatalogError> {
        let fields: Vec<String> = record.split(',').map(str::to_string).collect();
        let expected = VOLUME_NAME_FIELD + 1;
        if fields.len() < expected {
            return Err(CatalogError::MalformedVolumeRecord {
                record: record.to_string(),
                expected,
                found: fields.len(),
            });
        }
        Ok(Self { series_id, fields })
    }

    /// Series this volume belongs to.
    #[must_use]
    pub fn series_id(&self) -> u64 {
        self.series_id
    }

    /// Volume identifier used in download paths.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.fields[VOLUME_ID_FIELD]
    }

    /// Human-readable volume name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.fields[VOLUME_NAME_FIELD]
    }

    /// Every field of the source record, in order.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Download path for the given format and tier.
    #[must_use]
    pub fn asset_path(&self, format: AssetFormat, tier: AccessTier) -> String {
        asset_path(self.series_id, self.id(), format, tier)
    }

    /// All four path variants: mobi/VIP, mobi/VIP2, epub/VIP, epub/VIP2.
    #[must_use]
    pub fn path_variants(&self) -> [(AssetFormat, AccessTier, String); 4] {
        let variant = |format, tier| (format, tier, self.asset_path(format, tier));
        [
            variant(AssetFormat::Mobi, AccessTier::Vip),
            variant(AssetFormat::Mobi, AccessTier::Vip2),
            variant(AssetFormat::Epub, AccessTier::Vip),
            variant(AssetFormat::Epub, AccessTier::Vip2),
        ]
    }
}

/// A scraped series. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesInfo {
    id: u64,
    title: String,
    authors: Vec<String>,
    volumes: Vec<VolumeRef>,
}

impl SeriesInfo {
    /// Assembles a series record.
    #[must_use]
    pub fn new(id: u64, title: String, authors: Vec<String>, volumes: Vec<VolumeRef>) -> Self {
        Self {
            id,
            title,
            authors,
            volumes,
        }
    }

    /// Numeric series identifier.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Display title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Authors, possibly empty.
    #[must_use]
    pub fn authors(&self) -> &[String] {
        &self.authors
    }

    /// Volumes in metadata-block order.
    #[must_use]
    pub fn volumes(&self) -> &[VolumeRef] {
        &self.volumes
    }
}

/// Scrapes series metadata through a [`MoxSession`].
#[derive(Debug, Clone)]
pub struct CatalogScraper {
    session: MoxSession,
}

impl CatalogScraper {
    /// Creates a scraper that issues its requests through `session`.
    #[must_use]
    pub fn new(session: MoxSession) -> Self {
        Self { session }
    }

    /// Fetches the catalog page and metadata block of one series.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::UnexpectedStatus`] if the catalog page answers with
    ///   anything other than 200 or 404
    /// - [`CatalogError::BookDataNotFound`] if the page has no metadata
    ///   reference (no second request is made)
    /// - [`CatalogError::VolInfoNotFound`] if the metadata block is empty
    /// - [`CatalogError::MalformedVolumeRecord`] for a record lacking fields
    /// - [`CatalogError::Request`] / [`CatalogError::MalformedResponse`] for
    ///   transport or body failures
    #[instrument(skip(self))]
    pub async fn fetch_series(&self, series_id: u64) -> Result<SeriesInfo, CatalogError> {
        let catalog_url = self.session.url_for(&format!("c/{series_id}.htm"));
        let response = self
            .session
            .get(&catalog_url)
            .await
            .map_err(|e| CatalogError::request(&catalog_url, e))?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::NOT_FOUND {
            return Err(CatalogError::unexpected_status(
                &catalog_url,
                status.as_u16(),
            ));
        }
        if status == StatusCode::NOT_FOUND {
            debug!(url = %catalog_url, "catalog page returned 404, parsing anyway");
        }

        let html = response
            .text()
            .await
            .map_err(|e| CatalogError::malformed_response(&catalog_url, e))?;

        let title = parse::extract_title(&html);
        let authors = parse::extract_authors(&html);
        let book_data_path =
            parse::find_book_data_path(&html).ok_or(CatalogError::BookDataNotFound { series_id })?;

        let book_data_url = self.session.url_for(book_data_path);
        debug!(url = %book_data_url, "fetching volume metadata");
        let body = self
            .session
            .get(&book_data_url)
            .await
            .map_err(|e| CatalogError::request(&book_data_url, e))?
            .text()
            .await
            .map_err(|e| CatalogError::malformed_response(&book_data_url, e))?;

        let records = parse::extract_volinfo_records(&body);
        if records.is_empty() {
            return Err(CatalogError::VolInfoNotFound { url: book_data_url });
        }

        let volumes = records
            .into_iter()
            .map(|record| VolumeRef::from_record(series_id, record))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            series_id,
            title = %title,
            authors = authors.len(),
            volumes = volumes.len(),
            "series scraped"
        );

        Ok(SeriesInfo::new(series_id, title, authors, volumes))
    }
}
