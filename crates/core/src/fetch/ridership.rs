//! Paginated ridership fetching

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tracing::debug;

use super::error::{FetchError, FetchResult};
use crate::record::RidershipRecord;

/// Default ridership dataset endpoint (MTA Bus Hourly Ridership)
pub const DEFAULT_RIDERSHIP_URL: &str = "https://data.ny.gov/resource/kv7t-n8in.json";

/// Rows requested per page
pub const DEFAULT_PAGE_SIZE: usize = 50_000;

/// Parameters of a single page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest<'a> {
    pub route: &'a str,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub offset: usize,
    pub limit: usize,
}

impl PageRequest<'_> {
    /// Row filter restricting the query to one route and the inclusive day range
    pub fn where_clause(&self) -> String {
        format!(
            "transit_timestamp between '{}T00:00:00.000' and '{}T23:59:59.000' AND bus_route='{}'",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d"),
            self.route.replace('\'', "''"),
        )
    }
}

/// A source of ridership pages
pub trait RidershipSource: Send + Sync {
    /// Fetch one page of records. An empty page means there is nothing further.
    fn fetch_page(&self, request: &PageRequest<'_>) -> FetchResult<Vec<RidershipRecord>>;
}

/// Lazy sequence of pages for one route and one period.
///
/// Terminates after the first empty page or after yielding an error.
pub struct RidershipPages<'a> {
    source: &'a dyn RidershipSource,
    route: &'a str,
    start: NaiveDate,
    end: NaiveDate,
    page_size: usize,
    offset: usize,
    finished: bool,
}

impl<'a> RidershipPages<'a> {
    pub fn new(
        source: &'a dyn RidershipSource,
        route: &'a str,
        start: NaiveDate,
        end: NaiveDate,
        page_size: usize,
    ) -> Self {
        Self {
            source,
            route,
            start,
            end,
            page_size: page_size.max(1),
            offset: 0,
            finished: false,
        }
    }
}

impl Iterator for RidershipPages<'_> {
    type Item = FetchResult<Vec<RidershipRecord>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let request = PageRequest {
            route: self.route,
            start: self.start,
            end: self.end,
            offset: self.offset,
            limit: self.page_size,
        };

        match self.source.fetch_page(&request) {
            Ok(page) if page.is_empty() => {
                self.finished = true;
                None
            }
            Ok(page) => {
                debug!(
                    route = self.route,
                    offset = self.offset,
                    rows = page.len(),
                    "Fetched ridership page"
                );
                self.offset += self.page_size;
                Some(Ok(page))
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

impl std::iter::FusedIterator for RidershipPages<'_> {}

impl<T: RidershipSource + ?Sized> RidershipSource for Arc<T> {
    fn fetch_page(&self, request: &PageRequest<'_>) -> FetchResult<Vec<RidershipRecord>> {
        (**self).fetch_page(request)
    }
}

/// Downloads every record of a route and period, pacing consecutive routes.
pub struct RemoteFetcher {
    source: Box<dyn RidershipSource>,
    page_size: usize,
    route_pause: Duration,
    last_route_at: Option<Instant>,
}

impl RemoteFetcher {
    pub fn new(source: Box<dyn RidershipSource>) -> Self {
        Self {
            source,
            page_size: DEFAULT_PAGE_SIZE,
            route_pause: Duration::from_secs(1),
            last_route_at: None,
        }
    }

    /// Set the number of rows requested per page
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the fixed pause between consecutive route requests
    pub fn with_route_pause(mut self, pause: Duration) -> Self {
        self.route_pause = pause;
        self
    }

    /// Page lazily through one route and period
    pub fn pages<'p>(
        &'p self,
        route: &'p str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> RidershipPages<'p> {
        RidershipPages::new(self.source.as_ref(), route, start, end, self.page_size)
    }

    /// Fetch all records for one route and period.
    ///
    /// Any page failure aborts the whole fetch; partial pages are discarded.
    pub fn fetch(
        &mut self,
        route: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> FetchResult<Vec<RidershipRecord>> {
        self.wait_for_turn();
        let result = self
            .pages(route, start, end)
            .collect::<FetchResult<Vec<_>>>()
            .map(|pages| pages.into_iter().flatten().collect());
        self.last_route_at = Some(Instant::now());
        result
    }

    /// Fetch several routes for one period and concatenate them in route order
    pub fn fetch_routes(
        &mut self,
        routes: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> FetchResult<Vec<RidershipRecord>> {
        let mut records = Vec::new();
        for route in routes {
            let fetched = self.fetch(route, start, end)?;
            debug!(route = %route, %start, %end, rows = fetched.len(), "Fetched route");
            records.extend(fetched);
        }
        Ok(records)
    }

    fn wait_for_turn(&self) {
        if let Some(last) = self.last_route_at {
            let elapsed = last.elapsed();
            if elapsed < self.route_pause {
                std::thread::sleep(self.route_pause - elapsed);
            }
        }
    }
}

/// Ridership source backed by the Socrata HTTP API
#[cfg(feature = "http-source")]
pub struct HttpRidershipSource {
    client: reqwest::blocking::Client,
    base_url: String,
    app_token: Option<String>,
}

#[cfg(feature = "http-source")]
impl HttpRidershipSource {
    /// Create a source for the given endpoint with a per-request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> FetchResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Request(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            app_token: None,
        })
    }

    /// Send an application token with every request
    pub fn with_app_token(mut self, token: Option<String>) -> Self {
        self.app_token = token.filter(|t| !t.is_empty());
        self
    }
}

#[cfg(feature = "http-source")]
impl RidershipSource for HttpRidershipSource {
    fn fetch_page(&self, request: &PageRequest<'_>) -> FetchResult<Vec<RidershipRecord>> {
        let params = [
            (
                "$select",
                "transit_timestamp,bus_route,ridership,transfers".to_string(),
            ),
            ("$where", request.where_clause()),
            ("$limit", request.limit.to_string()),
            ("$offset", request.offset.to_string()),
        ];

        let mut builder = self.client.get(&self.base_url).query(&params);
        if let Some(ref token) = self.app_token {
            builder = builder.header("X-App-Token", token);
        }

        let response = builder
            .send()
            .map_err(|e| FetchError::from_reqwest(&self.base_url, e))?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                status: response.status().as_u16(),
                url: self.base_url.clone(),
            });
        }

        response
            .json::<Vec<RidershipRecord>>()
            .map_err(|e| FetchError::decode(&self.base_url, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serves pre-built pages in order and records the offsets requested
    struct ScriptedSource {
        pages: Vec<FetchResult<Vec<RidershipRecord>>>,
        offsets: Mutex<Vec<usize>>,
    }

    impl ScriptedSource {
        fn new(pages: Vec<FetchResult<Vec<RidershipRecord>>>) -> Self {
            Self {
                pages,
                offsets: Mutex::new(Vec::new()),
            }
        }
    }

    impl RidershipSource for ScriptedSource {
        fn fetch_page(&self, request: &PageRequest<'_>) -> FetchResult<Vec<RidershipRecord>> {
            let mut offsets = self.offsets.lock().unwrap();
            let call = offsets.len();
            offsets.push(request.offset);
            self.pages.get(call).cloned().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn record(hour: u32) -> RidershipRecord {
        RidershipRecord {
            transit_timestamp: NaiveDate::from_ymd_opt(2024, 3, 4)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
            route: "M15".to_string(),
            ridership: 10 + hour,
            transfers: 1,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_pages_stop_at_empty_page() {
        let source = ScriptedSource::new(vec![
            Ok(vec![record(1), record(2)]),
            Ok(vec![record(3)]),
            Ok(Vec::new()),
            Ok(vec![record(4)]),
        ]);

        let pages: Vec<_> = RidershipPages::new(&source, "M15", day(4), day(10), 2).collect();
        assert_eq!(pages.len(), 2);
        assert_eq!(*source.offsets.lock().unwrap(), vec![0, 2, 4]);
    }

    #[test]
    fn test_fetch_aborts_on_error() {
        let source = ScriptedSource::new(vec![
            Ok(vec![record(1)]),
            Err(FetchError::Status {
                status: 500,
                url: "test".to_string(),
            }),
            Ok(vec![record(2)]),
        ]);

        let source = Arc::new(source);
        let mut fetcher = RemoteFetcher::new(Box::new(source.clone()))
            .with_page_size(1)
            .with_route_pause(Duration::ZERO);
        let result = fetcher.fetch("M15", day(4), day(10));
        assert!(matches!(result, Err(FetchError::Status { status: 500, .. })));
        // No request is made after the failing page
        assert_eq!(source.offsets.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_fetch_concatenates_pages() {
        let source = ScriptedSource::new(vec![
            Ok(vec![record(1), record(2)]),
            Ok(vec![record(3)]),
        ]);

        let mut fetcher = RemoteFetcher::new(Box::new(source))
            .with_page_size(2)
            .with_route_pause(Duration::ZERO);
        let records = fetcher.fetch("M15", day(4), day(10)).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].ridership, 13);
    }

    #[test]
    fn test_empty_result_is_valid() {
        let source = ScriptedSource::new(Vec::new());
        let source = Arc::new(source);
        let mut fetcher =
            RemoteFetcher::new(Box::new(source.clone())).with_route_pause(Duration::ZERO);
        let routes = vec!["M15".to_string(), "B46".to_string()];
        let records = fetcher.fetch_routes(&routes, day(4), day(10)).unwrap();
        assert!(records.is_empty());
        // One request per route, each answered by an empty first page
        assert_eq!(*source.offsets.lock().unwrap(), vec![0, 0]);
    }

    #[test]
    fn test_where_clause() {
        let request = PageRequest {
            route: "M15",
            start: day(4),
            end: day(10),
            offset: 0,
            limit: 50_000,
        };
        assert_eq!(
            request.where_clause(),
            "transit_timestamp between '2024-03-04T00:00:00.000' and \
             '2024-03-10T23:59:59.000' AND bus_route='M15'"
        );
    }
}
