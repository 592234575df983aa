use anyhow::Result;
use axum::{extract::{Query, State}, http::StatusCode, response::{IntoResponse, Response}, routing::get, Json, Router};
use mixer_core::search::{search, JsonlPageSource, MixerSearcher, PageSource, ScoringConfig, SearchResults};
use mixer_core::IndexStore;
use serde::{Deserialize, Serialize};
use std::num::IntErrorKind;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer, AllowOrigin};
use tower_http::trace::TraceLayer;

pub const DEFAULT_URL_BASE: &str = "https://en.wikipedia.org/wiki/";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Store written by `indexer import`
    pub db: PathBuf,
    /// Corpus data file used for titles, snippets and categories
    pub data: PathBuf,
    pub url_base: String,
    pub scoring: ScoringConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMethod {
    Mixer,
    MixerPr,
}

impl FromStr for SearchMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mixer" => Ok(SearchMethod::Mixer),
            "mixerpr" => Ok(SearchMethod::MixerPr),
            _ => Err("Invalid parameter `method`. Available methods are `mixer` and `mixerpr`.".into()),
        }
    }
}

#[derive(Deserialize)]
pub struct QueryParams {
    pub method: Option<String>,
    pub keyword: Option<String>,
    pub page: Option<String>,
}

#[derive(Serialize)]
pub struct Envelope<T> {
    pub error: bool,
    pub data: T,
}

#[derive(Serialize)]
pub struct QueryData {
    #[serde(flatten)]
    pub results: SearchResults,
    /// Milliseconds spent ranking and rendering
    #[serde(rename = "elapsedTime")]
    pub elapsed_time: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub mixer: Arc<MixerSearcher>,
    pub mixer_pr: Arc<MixerSearcher>,
    pub pages: Arc<dyn PageSource>,
    pub url_base: Arc<str>,
}

impl AppState {
    pub fn open(config: &ServerConfig) -> Result<Self> {
        let store = IndexStore::open_existing(&config.db)?;
        let pages = JsonlPageSource::load(&config.data)?;
        Self::from_parts(store, Arc::new(pages), &config.url_base, &config.scoring)
    }

    pub fn from_parts(store: IndexStore, pages: Arc<dyn PageSource>, url_base: &str, scoring: &ScoringConfig) -> Result<Self> {
        Ok(Self {
            mixer: Arc::new(MixerSearcher::new(store.clone(), scoring.clone(), false)?),
            mixer_pr: Arc::new(MixerSearcher::new(store, scoring.clone(), true)?),
            pages,
            url_base: Arc::from(url_base),
        })
    }

    fn searcher(&self, method: SearchMethod) -> Arc<MixerSearcher> {
        match method {
            SearchMethod::Mixer => self.mixer.clone(),
            SearchMethod::MixerPr => self.mixer_pr.clone(),
        }
    }
}

pub fn build_app(config: &ServerConfig) -> Result<Router> {
    let state = AppState::open(config)?;
    Ok(router(state))
}

pub fn router(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/query", get(query_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn reject(reason: impl Into<String>) -> Response {
    (StatusCode::BAD_REQUEST, Json(Envelope { error: true, data: reason.into() })).into_response()
}

/// Value of a query parameter, treating blank as missing.
fn present(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Requested page number. Overflowing numbers saturate so they clamp to the
/// last or first page; anything else unparsable reads as the first page.
fn page_number(value: Option<String>) -> i64 {
    let Some(raw) = present(value) else { return 1 };
    match raw.parse::<i64>() {
        Ok(page) => page,
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => i64::MAX,
            IntErrorKind::NegOverflow => i64::MIN,
            _ => 1,
        },
    }
}

pub async fn query_handler(State(state): State<AppState>, Query(params): Query<QueryParams>) -> Response {
    let Some(method) = present(params.method) else {
        return reject("Parameter `method` missing.");
    };
    let Some(keyword) = present(params.keyword) else {
        return reject("Parameter `keyword` missing.");
    };
    let method = match method.parse::<SearchMethod>() {
        Ok(method) => method,
        Err(reason) => return reject(reason),
    };
    let page = page_number(params.page);

    let searcher = state.searcher(method);
    let pages = state.pages.clone();
    let url_base = state.url_base.clone();
    let task = tokio::task::spawn_blocking(move || {
        let start = std::time::Instant::now();
        let results = search(searcher.as_ref(), pages.as_ref(), &keyword, page, &url_base);
        (results, start.elapsed())
    });

    match task.await {
        Ok((results, elapsed)) => {
            tracing::info!(?method, hits = results.hits, page = ?results.page_no, elapsed_ms = elapsed.as_millis() as u64, "query served");
            let data = QueryData { results, elapsed_time: elapsed.as_millis() as u64 };
            Json(Envelope { error: false, data }).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "query task failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(Envelope { error: true, data: "Internal error." })).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_numbers_saturate_on_overflow() {
        assert_eq!(page_number(Some(" 3 ".into())), 3);
        assert_eq!(page_number(Some("99999999999999999999".into())), i64::MAX);
        assert_eq!(page_number(Some("-99999999999999999999".into())), i64::MIN);
        assert_eq!(page_number(Some("abc".into())), 1);
        assert_eq!(page_number(Some("".into())), 1);
        assert_eq!(page_number(None), 1);
    }
}
