//! Fetch functions - walk the paginated DVF mutation listing

use crate::geo::bbox::BoundingBox;
use crate::ingestion::error::{IngestError, Result};
use crate::ingestion::retry::{FailureKind, RetryDecision, RetryPolicy, Sleeper, TokioSleeper};
use crate::ingestion::types::{MutationLocation, Page, PageRequest, RawTransaction};
use crate::ingestion::utils::{coerce_amount, coerce_year, http_client, text, text_list};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_DVF_API_URL: &str = "https://apidf-preprod.cerema.fr/dvf_opendata/mutations/";

/// Transactional data source (allows mocking)
#[async_trait]
pub trait DvfSource: Send + Sync {
    async fn get_page(&self, request: &PageRequest) -> Result<Page>;
    async fn get_mutation(&self, mutation_id: &str) -> Result<RawTransaction>;
}

/// HTTP client for the DVF open-data API
pub struct DvfClient {
    http: Client,
    base_url: String,
}

impl DvfClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url: format!("{}/", base_url.trim_end_matches('/')),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<T> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        decode_response(status, url, &body)
    }
}

/// Map an API response onto a decoded payload or a classified error.
/// 403 means the box was refused, 404 means nothing exists at `url`.
fn decode_response<T: serde::de::DeserializeOwned>(
    status: StatusCode,
    url: &str,
    body: &[u8],
) -> Result<T> {
    match status {
        StatusCode::FORBIDDEN => Err(IngestError::AreaTooLarge(
            String::from_utf8_lossy(body).into_owned(),
        )),
        StatusCode::NOT_FOUND => Err(IngestError::NotFound(url.to_string())),
        s if !s.is_success() => Err(IngestError::Http {
            status: s.as_u16(),
            url: url.to_string(),
        }),
        _ => Ok(serde_json::from_slice(body)?),
    }
}

#[async_trait]
impl DvfSource for DvfClient {
    async fn get_page(&self, request: &PageRequest) -> Result<Page> {
        let builder = match request {
            PageRequest::Initial { url, params } => self.http.get(url).query(params),
            PageRequest::Next(url) => self.http.get(url),
        };
        self.get_json(builder, request.url()).await
    }

    async fn get_mutation(&self, mutation_id: &str) -> Result<RawTransaction> {
        check_mutation_id(mutation_id)?;
        let url = format!("{}{}/", self.base_url, mutation_id);
        self.get_json(self.http.get(&url), &url).await
    }
}

/// Mutation ids become a URL path segment, so only `[A-Za-z0-9_-]` is accepted
fn check_mutation_id(mutation_id: &str) -> Result<()> {
    if mutation_id.is_empty() {
        return Err(IngestError::Validation(
            "mutation ID cannot be empty".to_string(),
        ));
    }
    if !mutation_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(IngestError::Validation(format!(
            "invalid mutation ID: {:?}",
            mutation_id
        )));
    }
    Ok(())
}

/// Query filters applied to the initial listing request
#[derive(Debug, Clone, PartialEq)]
pub struct FetchFilters {
    /// Excludes erroneous micro-transactions
    pub min_value: u32,
    pub min_built_area: u32,
    pub ordering: String,
}

impl Default for FetchFilters {
    fn default() -> Self {
        Self {
            min_value: 10_000,
            min_built_area: 10,
            ordering: "-anneemut,-datemut".to_string(),
        }
    }
}

impl FetchFilters {
    pub fn query_params(&self, bbox: &BoundingBox, min_year: i32) -> Vec<(String, String)> {
        vec![
            ("in_bbox".to_string(), bbox.to_string()),
            ("anneemut_min".to_string(), min_year.to_string()),
            ("fields".to_string(), "all".to_string()),
            ("format".to_string(), "json".to_string()),
            ("valeurfonc_min".to_string(), self.min_value.to_string()),
            ("sbati_min".to_string(), self.min_built_area.to_string()),
            ("ordering".to_string(), self.ordering.clone()),
        ]
    }
}

/// Paginated fetcher with bounded retry
pub struct DvfFetcher<S, Z = TokioSleeper> {
    source: S,
    sleeper: Z,
    policy: RetryPolicy,
    base_url: String,
    filters: FetchFilters,
}

impl DvfFetcher<DvfClient, TokioSleeper> {
    /// Fetcher over the live HTTP API
    pub fn from_client(client: DvfClient, policy: RetryPolicy, filters: FetchFilters) -> Self {
        let base_url = client.base_url().to_string();
        DvfFetcher::new(client, TokioSleeper, base_url, policy, filters)
    }
}

impl<S: DvfSource, Z: Sleeper> DvfFetcher<S, Z> {
    pub fn new(
        source: S,
        sleeper: Z,
        base_url: impl Into<String>,
        policy: RetryPolicy,
        filters: FetchFilters,
    ) -> Self {
        Self {
            source,
            sleeper,
            policy,
            base_url: base_url.into(),
            filters,
        }
    }

    /// Fetch every page of mutations inside `bbox` from `min_year` on.
    /// All-or-nothing: a fatal failure on any page discards accumulated pages.
    pub async fn fetch_all(&self, bbox: &BoundingBox, min_year: i32) -> Result<Vec<RawTransaction>> {
        bbox.validate()?;
        if min_year <= 0 {
            return Err(IngestError::Validation(format!(
                "minimum year must be positive, got {}",
                min_year
            )));
        }

        let mut request = PageRequest::Initial {
            url: self.base_url.clone(),
            params: self.filters.query_params(bbox, min_year),
        };
        let mut results = Vec::new();
        let mut page_count = 0usize;

        loop {
            info!("Fetching DVF data page {}...", page_count + 1);
            let page = self
                .with_retry("DVF page", || self.source.get_page(&request))
                .await?;

            page_count += 1;
            info!(
                "Fetched {} entries from page {}",
                page.results.len(),
                page_count
            );
            results.extend(page.results);

            match page.next.filter(|next| !next.is_empty()) {
                Some(next) => request = PageRequest::Next(next),
                None => break,
            }
        }

        info!(
            "Completed fetching {} pages, total entries: {}",
            page_count,
            results.len()
        );
        Ok(results)
    }

    /// Look up a single mutation; `Ok(None)` when the API has no such record
    pub async fn fetch_mutation(&self, mutation_id: &str) -> Result<Option<MutationLocation>> {
        let mutation_id = mutation_id.trim();
        check_mutation_id(mutation_id)?;

        info!("Looking up location info for mutation {}", mutation_id);
        match self
            .with_retry("mutation lookup", || self.source.get_mutation(mutation_id))
            .await
        {
            Ok(raw) => Ok(Some(mutation_location(&raw))),
            Err(e) if e.is_not_found() => {
                warn!("Mutation {} not found", mutation_id);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Run `op` until it succeeds or the retry policy gives up
    async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut failures = 0u32;
        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let kind = match err.failure_kind() {
                Some(kind) => kind,
                None => return Err(err),
            };
            failures += 1;

            match self.policy.should_retry(failures, kind) {
                RetryDecision::Retry(delay) => {
                    warn!(
                        "{} failed: {}. Retrying in {:?}... ({} left)",
                        what,
                        err,
                        delay,
                        self.policy.max_attempts() - failures
                    );
                    self.sleeper.sleep(delay).await;
                }
                RetryDecision::GiveUp if kind == FailureKind::Transient => {
                    return Err(IngestError::RetriesExhausted {
                        attempts: failures,
                        source: Box::new(err),
                    });
                }
                RetryDecision::GiveUp => return Err(err),
            }
        }
    }
}

fn mutation_location(raw: &RawTransaction) -> MutationLocation {
    MutationLocation {
        mutation_id: text(raw.get("idmutation")),
        parcel_ids: text_list(raw.get("l_idpar")),
        mutated_parcel_ids: text_list(raw.get("l_idparmut")),
        cadastral_sections: text_list(raw.get("l_section")),
        mutation_date: text(raw.get("datemut")),
        mutation_year: raw.get("anneemut").and_then(|v| coerce_year(Some(v)).ok()),
        department_code: text(raw.get("coddep")),
        insee_codes: text_list(raw.get("l_codinsee")),
        property_type: text(raw.get("libtypbien")),
        land_value: raw.get("valeurfonc").and_then(|v| coerce_amount(Some(v)).ok()),
        built_area: raw.get("sbati").and_then(|v| coerce_amount(Some(v)).ok()),
        land_area: raw.get("sterr").and_then(|v| coerce_amount(Some(v)).ok()),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted source: replays queued responses and records every request
    #[derive(Default)]
    pub struct ScriptedSource {
        pages: Mutex<VecDeque<Result<Page>>>,
        mutations: Mutex<VecDeque<Result<RawTransaction>>>,
        pub requests: Mutex<Vec<PageRequest>>,
    }

    impl ScriptedSource {
        pub fn with_pages(pages: Vec<Result<Page>>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
                ..Default::default()
            }
        }

        pub fn with_mutations(mutations: Vec<Result<RawTransaction>>) -> Self {
            Self {
                mutations: Mutex::new(mutations.into()),
                ..Default::default()
            }
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl DvfSource for ScriptedSource {
        async fn get_page(&self, request: &PageRequest) -> Result<Page> {
            self.requests.lock().unwrap().push(request.clone());
            self.pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(IngestError::Validation("script exhausted".into())))
        }

        async fn get_mutation(&self, mutation_id: &str) -> Result<RawTransaction> {
            self.requests
                .lock()
                .unwrap()
                .push(PageRequest::Next(mutation_id.to_string()));
            self.mutations
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(IngestError::Validation("script exhausted".into())))
        }
    }

    /// Records requested delays instead of waiting
    #[derive(Default)]
    pub struct RecordingSleeper {
        pub delays: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, delay: Duration) {
            self.delays.lock().unwrap().push(delay);
        }
    }

    pub fn page(ids: &[&str], next: Option<&str>) -> Result<Page> {
        Ok(Page {
            results: ids
                .iter()
                .map(|id| RawTransaction::from(serde_json::json!({ "idmutation": id })))
                .collect(),
            next: next.map(str::to_string),
        })
    }

    pub fn server_error() -> Result<Page> {
        Err(IngestError::Http {
            status: 503,
            url: "http://dvf.test/mutations/".into(),
        })
    }

    pub fn fetcher<S: DvfSource>(source: S) -> DvfFetcher<S, RecordingSleeper> {
        DvfFetcher::new(
            source,
            RecordingSleeper::default(),
            "http://dvf.test/mutations/",
            RetryPolicy::default(),
            FetchFilters::default(),
        )
    }

    pub fn bbox() -> BoundingBox {
        BoundingBox {
            lon_min: 2.3497,
            lat_min: 48.8541,
            lon_max: 2.3547,
            lat_max: 48.8591,
        }
    }
}
