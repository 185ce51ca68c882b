//! Pipeline configuration types

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::{PipelineError, PipelineResult};
use crate::consolidate::FINAL_DATASET_NAME;
use crate::enrich::Jurisdiction;
use crate::fetch::Location;
use crate::fetch::ridership::{DEFAULT_PAGE_SIZE, DEFAULT_RIDERSHIP_URL};
use crate::fetch::weather::DEFAULT_WEATHER_URL;
use crate::store::ProgressStore;

/// Main pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Calendar years to extract
    pub years: Vec<i32>,
    /// Route codes to extract
    pub routes: Vec<String>,
    /// Root directory for staging files and the final dataset
    pub base_path: PathBuf,
    /// Staging directory name under `base_path`
    pub staging_dir: String,
    /// Final dataset directory name under `base_path`
    pub final_dataset: String,
    /// Ridership API settings
    pub ridership: RidershipApiConfig,
    /// Weather API settings
    pub weather: WeatherApiConfig,
    /// Holiday calendar settings
    pub holidays: HolidayConfig,
    /// Report the plan without fetching or writing
    pub dry_run: bool,
    /// Resume from the progress checkpoint
    pub resume: bool,
    /// Remove the staging directory after a successful consolidation
    pub clean_staging: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            years: Vec::new(),
            routes: Vec::new(),
            base_path: PathBuf::from("data"),
            staging_dir: "_tmp".to_string(),
            final_dataset: FINAL_DATASET_NAME.to_string(),
            ridership: RidershipApiConfig::default(),
            weather: WeatherApiConfig::default(),
            holidays: HolidayConfig::default(),
            dry_run: false,
            resume: true,
            clean_staging: false,
        }
    }
}

impl PipelineConfig {
    /// Create a new pipeline config
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration file in TOML format
    pub fn from_toml_file(path: &Path) -> PipelineResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::io_with_path(path, "reading configuration", e))?;
        Self::from_toml_str(&content).map_err(|e| match e {
            PipelineError::ConfigParse { message, .. } => PipelineError::ConfigParse {
                path: Some(path.to_path_buf()),
                message,
            },
            other => other,
        })
    }

    /// Parse a TOML configuration
    pub fn from_toml_str(content: &str) -> PipelineResult<Self> {
        toml::from_str(content).map_err(|e| PipelineError::ConfigParse {
            path: None,
            message: e.to_string(),
        })
    }

    /// Set the years to extract
    pub fn with_years(mut self, years: Vec<i32>) -> Self {
        self.years = years;
        self
    }

    /// Set the routes to extract
    pub fn with_routes<S: Into<String>>(mut self, routes: impl IntoIterator<Item = S>) -> Self {
        self.routes = routes.into_iter().map(Into::into).collect();
        self
    }

    /// Set the base directory
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = path.into();
        self
    }

    /// Set the ridership page size
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.ridership.page_size = page_size;
        self
    }

    /// Set the pause between route requests
    pub fn with_route_pause(mut self, pause: Duration) -> Self {
        self.ridership.route_pause_ms = pause.as_millis() as u64;
        self
    }

    /// Set the ridership API application token
    pub fn with_app_token(mut self, token: Option<String>) -> Self {
        self.ridership.app_token = token;
        self
    }

    /// Enable or disable the weather join
    pub fn with_weather_enabled(mut self, enabled: bool) -> Self {
        self.weather.enabled = enabled;
        self
    }

    /// Enable dry-run mode
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Enable resume from checkpoint
    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    /// Remove staged artifacts after consolidation
    pub fn with_clean_staging(mut self, clean: bool) -> Self {
        self.clean_staging = clean;
        self
    }

    /// Directory holding weekly artifacts and the checkpoint
    pub fn staging_path(&self) -> PathBuf {
        self.base_path.join(&self.staging_dir)
    }

    /// Checkpoint file path
    pub fn progress_path(&self) -> PathBuf {
        ProgressStore::in_dir(&self.staging_path()).path().to_path_buf()
    }

    /// Final dataset directory
    pub fn final_dataset_path(&self) -> PathBuf {
        self.base_path.join(&self.final_dataset)
    }

    /// Years in processing order (ascending, without duplicates)
    pub fn effective_years(&self) -> Vec<i32> {
        let mut years = self.years.clone();
        years.sort_unstable();
        years.dedup();
        years
    }

    /// Routes in request order, keeping only the first occurrence of each
    pub fn effective_routes(&self) -> Vec<String> {
        let mut seen = std::collections::BTreeSet::new();
        self.routes
            .iter()
            .filter(|r| seen.insert(r.as_str()))
            .cloned()
            .collect()
    }

    /// Holiday jurisdiction
    pub fn jurisdiction(&self) -> Result<Jurisdiction, String> {
        Jurisdiction::from_codes(&self.holidays.country, self.holidays.subdivision.as_deref())
    }

    /// Fingerprint of the planned work.
    ///
    /// Resuming is only valid while the years and routes are unchanged,
    /// since global unit indices and artifact contents depend on both.
    pub fn plan_fingerprint(&self) -> String {
        let mut routes = self.effective_routes();
        routes.sort();

        let mut hasher = Sha256::new();
        for year in self.effective_years() {
            hasher.update(year.to_le_bytes());
        }
        hasher.update(b"|");
        for route in &routes {
            hasher.update(route.as_bytes());
            hasher.update(b",");
        }
        format!("{:x}", hasher.finalize())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.years.is_empty() {
            return Err("At least one year is required".to_string());
        }
        if let Some(year) = self.years.iter().find(|y| !(1900..=2200).contains(*y)) {
            return Err(format!("Year {year} is out of range (1900-2200)"));
        }

        if self.routes.is_empty() {
            return Err("At least one route is required".to_string());
        }
        if self.routes.iter().any(|r| r.trim().is_empty()) {
            return Err("Route codes must not be empty".to_string());
        }

        if self.staging_dir.trim().is_empty() || self.final_dataset.trim().is_empty() {
            return Err("Staging and final dataset names must not be empty".to_string());
        }
        if self.staging_dir == self.final_dataset {
            return Err("Staging directory and final dataset must differ".to_string());
        }

        if self.ridership.page_size == 0 {
            return Err("Page size must be greater than zero".to_string());
        }
        if self.ridership.timeout_secs == 0 {
            return Err("Ridership request timeout must be greater than zero".to_string());
        }

        if self.weather.enabled {
            if !(-90.0..=90.0).contains(&self.weather.latitude) {
                return Err(format!("Latitude {} is out of range", self.weather.latitude));
            }
            if !(-180.0..=180.0).contains(&self.weather.longitude) {
                return Err(format!("Longitude {} is out of range", self.weather.longitude));
            }
        }

        self.jurisdiction()?;
        Ok(())
    }
}

/// Ridership API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RidershipApiConfig {
    /// Dataset endpoint
    pub url: String,
    /// Rows per page
    pub page_size: usize,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Pause between route requests in milliseconds
    pub route_pause_ms: u64,
    /// Application token sent as `X-App-Token`
    #[serde(skip_serializing)]
    pub app_token: Option<String>,
}

impl Default for RidershipApiConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_RIDERSHIP_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            timeout_secs: 300,
            route_pause_ms: 1000,
            app_token: None,
        }
    }
}

impl RidershipApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn route_pause(&self) -> Duration {
        Duration::from_millis(self.route_pause_ms)
    }
}

/// Weather API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherApiConfig {
    /// Join hourly weather onto records
    pub enabled: bool,
    /// Archive endpoint
    pub url: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for WeatherApiConfig {
    fn default() -> Self {
        let location = Location::default();
        Self {
            enabled: true,
            url: DEFAULT_WEATHER_URL.to_string(),
            latitude: location.latitude,
            longitude: location.longitude,
            timeout_secs: 60,
        }
    }
}

impl WeatherApiConfig {
    pub fn location(&self) -> Location {
        Location {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Holiday calendar settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HolidayConfig {
    /// ISO country code
    pub country: String,
    /// Subdivision code within the country
    pub subdivision: Option<String>,
}

impl Default for HolidayConfig {
    fn default() -> Self {
        Self {
            country: "US".to_string(),
            subdivision: Some("NY".to_string()),
        }
    }
}
