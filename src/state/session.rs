use anyhow::{bail, Result};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::chart::{project_all, ChartAdapter};
use crate::data::cache::KvCache;
use crate::data::manifold::ManifoldClient;
use crate::data::smoothing::smooth;
use crate::data::types::{bets_to_series, Bet, MarketMetadata, SeriesPoint, TimeRange};
use crate::state::annotations::{AnnotationEdit, AnnotationStore};
use crate::state::codec::{self, UrlState, ViewportZoom};

/// Everything a user interaction can ask the core to do.
#[derive(Debug, Clone)]
pub enum UiEvent {
    AddAnnotation {
        date: i64,
        y_value: f64,
        content: String,
        source: String,
    },
    EditAnnotation {
        index: usize,
        edit: AnnotationEdit,
    },
    RemoveAnnotation {
        index: usize,
    },
    SelectMarket {
        input: String,
    },
    SetZoom {
        zoom: ViewportZoom,
    },
    SetTimeRange {
        range: TimeRange,
    },
    /// Bust the frozen trade history for the active market and refetch.
    RefreshMarket,
}

/// What a handled event changed, so the caller knows what to refresh.
#[derive(Debug, Default, PartialEq)]
pub struct StateDelta {
    pub series_redrawn: bool,
    pub overlays_redrawn: bool,
    /// Current shareable query string, present whenever it changed.
    pub share_query: Option<String>,
}

/// Explicit per-session state; there are no ambient globals.
#[derive(Debug, Default)]
pub struct SessionState {
    pub slug: Option<String>,
    pub metadata: Option<MarketMetadata>,
    pub series: Vec<SeriesPoint>,
    pub annotations: AnnotationStore,
    pub zoom: Option<ViewportZoom>,
    pub zoom_touched: bool,
}

/// Single-threaded event-driven core: owns the authoritative state and
/// drives the chart adapter, the persistent cache, and the shareable URL
/// from every mutation.
pub struct Session<C: ChartAdapter> {
    client: ManifoldClient,
    cache: KvCache,
    chart: C,
    window_ms: i64,
    state: SessionState,
    /// Slug of the most recent market selection; a fetch resolving for any
    /// other slug is stale and gets discarded.
    requested_slug: Option<String>,
}

impl<C: ChartAdapter> Session<C> {
    pub fn new(client: ManifoldClient, cache: KvCache, chart: C, window_ms: i64) -> Self {
        Self {
            client,
            cache,
            chart,
            window_ms,
            state: SessionState::default(),
            requested_slug: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn share_query(&self) -> Option<String> {
        let slug = self.state.slug.as_deref()?;
        Some(codec::compose_query(
            slug,
            self.state.annotations.list(),
            self.state.zoom.as_ref(),
            self.state.zoom_touched,
        ))
    }

    /// Open a session from a pasted shareable URL query string.
    pub async fn open_from_query(&mut self, query: &str) -> Result<StateDelta> {
        let url_state = codec::parse_query(query);
        let Some(slug) = url_state.market.clone() else {
            bail!("query string has no market component");
        };
        self.select_market(&slug, url_state).await
    }

    pub async fn handle(&mut self, event: UiEvent) -> Result<StateDelta> {
        match event {
            UiEvent::AddAnnotation {
                date,
                y_value,
                content,
                source,
            } => {
                self.require_market()?;
                let index = self.state.annotations.add(date, y_value, content, source);
                debug!("added annotation at index {}", index);
                Ok(self.after_annotation_mutation())
            }
            UiEvent::EditAnnotation { index, edit } => {
                self.require_market()?;
                self.state.annotations.update(index, edit)?;
                Ok(self.after_annotation_mutation())
            }
            UiEvent::RemoveAnnotation { index } => {
                self.require_market()?;
                self.state.annotations.remove(index)?;
                Ok(self.after_annotation_mutation())
            }
            UiEvent::SelectMarket { input } => {
                let slug = extract_slug(&input);
                self.select_market(&slug, UrlState::default()).await
            }
            UiEvent::SetZoom { zoom } => {
                self.require_market()?;
                self.state.zoom = Some(zoom);
                self.state.zoom_touched = true;
                self.persist_zoom();
                Ok(StateDelta {
                    share_query: self.share_query(),
                    ..StateDelta::default()
                })
            }
            UiEvent::SetTimeRange { range } => {
                self.require_market()?;
                if let Some((min, max)) = range.bounds(&self.state.series) {
                    self.chart.set_x_window(min, max);
                }
                Ok(StateDelta::default())
            }
            UiEvent::RefreshMarket => {
                let Some(slug) = self.state.slug.clone() else {
                    bail!("no active market to refresh");
                };
                if let Err(e) = self.cache.bust_bets(&slug) {
                    warn!("cache bust for {} failed: {}", slug, e);
                }
                self.select_market(&slug, UrlState::default()).await
            }
        }
    }

    fn require_market(&self) -> Result<()> {
        if self.state.slug.is_none() {
            bail!("no market selected");
        }
        Ok(())
    }

    /// Fetch and install a market. On fetch failure the previous state is
    /// left exactly as it was; nothing renders partially.
    async fn select_market(&mut self, slug: &str, url_state: UrlState) -> Result<StateDelta> {
        self.requested_slug = Some(slug.to_string());

        let (bets, metadata) = self.client.fetch_history(slug, &self.cache).await?;

        if !self.commit_fetch(slug, bets, metadata, url_state) {
            return Ok(StateDelta::default());
        }

        let title = self
            .state
            .metadata
            .as_ref()
            .map(|m| m.question.clone())
            .unwrap_or_else(|| slug.to_string());
        self.chart.render(&self.state.series, &title);
        self.chart
            .set_overlays(&project_all(self.state.annotations.list()));
        if let Some(zoom) = &self.state.zoom {
            self.chart.set_x_window(zoom.x_min as i64, zoom.x_max as i64);
        }

        Ok(StateDelta {
            series_redrawn: true,
            overlays_redrawn: true,
            share_query: self.share_query(),
        })
    }

    /// Install a completed fetch, unless a later market selection has made
    /// it stale. Returns whether the result was committed.
    fn commit_fetch(
        &mut self,
        slug: &str,
        bets: Vec<Bet>,
        metadata: MarketMetadata,
        url_state: UrlState,
    ) -> bool {
        if self.requested_slug.as_deref() != Some(slug) {
            info!("discarding stale fetch result for {}", slug);
            return false;
        }

        self.state.series = smooth(&bets_to_series(&bets), self.window_ms);
        self.state.metadata = Some(metadata);
        self.state.annotations =
            AnnotationStore::initialize(slug, url_state.annotations.as_deref(), &self.cache);

        // Zoom follows the same precedence as annotations: URL, then the
        // cached viewport for this slug, then full-range default. Only a
        // URL-carried zoom counts as touched; a cache-seeded one is not
        // re-shared until the user moves it again.
        if let Some(zoom) = url_state.zoom {
            self.state.zoom = Some(zoom);
            self.state.zoom_touched = true;
        } else {
            self.state.zoom = self
                .cache
                .get(&KvCache::zoom_key(slug))
                .and_then(|raw| codec::decode_zoom(&raw));
            self.state.zoom_touched = false;
        }

        self.state.slug = Some(slug.to_string());
        true
    }

    /// Shared tail of every annotation mutation: redraw overlays, persist
    /// the token, and refresh the shareable query. There is no separate
    /// save action; mutations are synchronously durable, and a failed
    /// cache write only degrades persistence for the session.
    fn after_annotation_mutation(&mut self) -> StateDelta {
        self.chart
            .set_overlays(&project_all(self.state.annotations.list()));

        if let Some(slug) = &self.state.slug {
            let token = codec::encode_annotations(self.state.annotations.list());
            if let Err(e) = self.cache.set(&KvCache::annotations_key(slug), &token) {
                warn!("annotation persistence degraded for {}: {}", slug, e);
            }
        }

        StateDelta {
            overlays_redrawn: true,
            share_query: self.share_query(),
            ..StateDelta::default()
        }
    }

    fn persist_zoom(&self) {
        let (Some(slug), Some(zoom)) = (&self.state.slug, &self.state.zoom) else {
            return;
        };
        // Cache stores the raw JSON form; the percent layer is URL-only.
        let raw = serde_json::to_string(zoom).unwrap_or_default();
        if let Err(e) = self.cache.set(&KvCache::zoom_key(slug), &raw) {
            warn!("zoom persistence degraded for {}: {}", slug, e);
        }
    }
}

/// Accept a pasted market URL or a bare slug. URLs yield their last
/// non-empty path segment; anything that does not look like a URL is
/// taken literally.
pub fn extract_slug(input: &str) -> String {
    let input = input.trim();
    let looks_like_url = Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://")
        .map(|re| re.is_match(input))
        .unwrap_or(false);
    if !looks_like_url {
        return input.to_string();
    }

    let path = input
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(input);
    let path = path.split(|c| c == '?' || c == '#').next().unwrap_or(path);
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or(input)
        .to_string()
}
