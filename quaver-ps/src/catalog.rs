//! Catalog client for the upstream music service
//!
//! Fetches the paged home-page feed (`GET {base}/music/homePage`), wraps the
//! service's response envelope, and classifies each raw module into a typed
//! layout variant. The rest of the daemon consumes only the flattened track
//! list; module structure is kept for clients that render the feed.

use crate::error::{Error, Result};
use quaver_common::Track;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Envelope every catalog endpoint wraps its payload in. `code` 200 means
/// success regardless of the HTTP status.
#[derive(Debug, Clone, Deserialize)]
pub struct BaseResponse<T> {
    pub code: i32,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
}

/// One page of records plus its paging coordinates. Pages start at 1.
#[derive(Debug, Clone, Deserialize)]
pub struct PagedData<T> {
    #[serde(default = "Vec::new")]
    pub records: Vec<T>,
    pub current: u32,
    pub size: u32,
    pub total: u64,
}

impl<T> PagedData<T> {
    /// True when no page follows this one.
    pub fn is_last_page(&self) -> bool {
        (self.current as u64) * (self.size as u64) >= self.total
    }
}

/// Home-page module exactly as the catalog serves it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawModule {
    pub module_config_id: i64,
    pub module_name: String,
    pub style: i32,
    #[serde(default)]
    pub music_info_list: Vec<CatalogTrack>,
}

/// Track entry exactly as the catalog serves it.
///
/// The `id` here is the catalog's own identifier; local row ids are assigned
/// by the track store and never taken from the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogTrack {
    pub id: i64,
    pub music_name: String,
    pub author: String,
    #[serde(default)]
    pub album: Option<String>,
    /// Duration in milliseconds
    #[serde(default)]
    pub duration: u64,
    pub music_url: String,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub lyric_url: Option<String>,
    #[serde(default)]
    pub is_liked: bool,
    #[serde(default)]
    pub play_count: u64,
    #[serde(default)]
    pub add_time: Option<i64>,
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default)]
    pub file_size: u64,
}

impl CatalogTrack {
    /// Convert to the local track shape, dropping the catalog id.
    pub fn into_track(self) -> Track {
        Track {
            id: None,
            name: self.music_name,
            author: self.author,
            url: self.music_url,
            cover_url: self.cover_url,
            lyric_url: self.lyric_url,
            duration_ms: self.duration,
            file_size: self.file_size,
            play_count: self.play_count.min(u32::MAX as u64) as u32,
            liked: self.is_liked,
            created_at: None,
        }
    }
}

/// Home-page module classified by its layout style.
#[derive(Debug, Clone)]
pub enum CatalogModule {
    /// Style 1: rotating banner
    Banner { name: String, tracks: Vec<Track> },
    /// Style 2: horizontally scrolling card row
    HorizontalCard { name: String, tracks: Vec<Track> },
    /// Style 3: single-column list
    OneColumn { name: String, tracks: Vec<Track> },
    /// Style 4: two-column grid
    TwoColumn { name: String, tracks: Vec<Track> },
}

impl CatalogModule {
    /// Classify a raw module; modules with a style this build does not know
    /// are logged and skipped.
    pub fn classify(raw: RawModule) -> Option<Self> {
        let name = raw.module_name;
        let tracks: Vec<Track> = raw
            .music_info_list
            .into_iter()
            .map(CatalogTrack::into_track)
            .collect();
        match raw.style {
            1 => Some(CatalogModule::Banner { name, tracks }),
            2 => Some(CatalogModule::HorizontalCard { name, tracks }),
            3 => Some(CatalogModule::OneColumn { name, tracks }),
            4 => Some(CatalogModule::TwoColumn { name, tracks }),
            other => {
                warn!("Skipping module \"{}\" with unknown style {}", name, other);
                None
            }
        }
    }

    pub fn name(&self) -> &str {
        match self {
            CatalogModule::Banner { name, .. }
            | CatalogModule::HorizontalCard { name, .. }
            | CatalogModule::OneColumn { name, .. }
            | CatalogModule::TwoColumn { name, .. } => name,
        }
    }

    pub fn tracks(&self) -> &[Track] {
        match self {
            CatalogModule::Banner { tracks, .. }
            | CatalogModule::HorizontalCard { tracks, .. }
            | CatalogModule::OneColumn { tracks, .. }
            | CatalogModule::TwoColumn { tracks, .. } => tracks,
        }
    }

    fn into_tracks(self) -> Vec<Track> {
        match self {
            CatalogModule::Banner { tracks, .. }
            | CatalogModule::HorizontalCard { tracks, .. }
            | CatalogModule::OneColumn { tracks, .. }
            | CatalogModule::TwoColumn { tracks, .. } => tracks,
        }
    }
}

/// Flatten classified modules to one track list, in module order.
pub fn collect_tracks(modules: Vec<CatalogModule>) -> Vec<Track> {
    modules
        .into_iter()
        .flat_map(CatalogModule::into_tracks)
        .collect()
}

/// HTTP client for the catalog's home-page feed
pub struct CatalogClient {
    base_url: String,
    http: reqwest::Client,
    page_size: u32,
}

impl CatalogClient {
    pub fn new(base_url: &str, page_size: u32) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Catalog(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            page_size,
        })
    }

    /// Fetch one feed page. Pages start at 1.
    pub async fn fetch_page(&self, page: u32) -> Result<PagedData<RawModule>> {
        let url = format!(
            "{}/music/homePage?current={}&size={}",
            self.base_url, page, self.page_size
        );
        debug!("Fetching catalog page: {}", url);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Catalog(format!("catalog request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Catalog(format!(
                "catalog returned HTTP {}",
                status.as_u16()
            )));
        }

        let body: BaseResponse<PagedData<RawModule>> = response
            .json()
            .await
            .map_err(|e| Error::Catalog(format!("catalog response did not parse: {}", e)))?;

        if body.code != 200 {
            let msg = body.msg.unwrap_or_else(|| "unknown error".to_string());
            return Err(Error::Catalog(format!(
                "catalog error {}: {}",
                body.code, msg
            )));
        }

        body.data
            .ok_or_else(|| Error::Catalog("catalog response had no data".to_string()))
    }

    /// Fetch and classify every page of the feed.
    pub async fn load_all_modules(&self) -> Result<Vec<CatalogModule>> {
        let mut modules = Vec::new();
        let mut page = 1u32;
        loop {
            let data = self.fetch_page(page).await?;
            let last = data.is_last_page();
            let fetched = data.records.len();
            modules.extend(data.records.into_iter().filter_map(CatalogModule::classify));
            debug!(
                "Catalog page {}: {} raw modules, {} classified so far",
                page,
                fetched,
                modules.len()
            );
            // An empty page ends the walk even if the total claims more
            if last || fetched == 0 {
                break;
            }
            page += 1;
        }
        info!("Loaded {} catalog modules", modules.len());
        Ok(modules)
    }

    /// Full refresh: every track on every page, flattened in module order.
    pub async fn load_all_tracks(&self) -> Result<Vec<Track>> {
        Ok(collect_tracks(self.load_all_modules().await?))
    }
}
