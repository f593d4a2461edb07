//! # CDS Download
//!
//! Retrieves ERA5 / ERA5-Land fields from the Copernicus Climate Data Store.
//! A request is submitted as a job, polled at a fixed interval until it
//! succeeds or fails, and its result asset is streamed to disk through a
//! `.partial` file that is renamed once complete.
//!
//! Credentials come from `CDSAPI_URL` / `CDSAPI_KEY`, falling back to the
//! `url:` / `key:` lines of `~/.cdsapirc`.

use crate::error::{Nc2ShetranError, Result};
use crate::filters::BoundingBox;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

pub const DEFAULT_CDS_URL: &str = "https://cds.climate.copernicus.eu/api";
pub const DEFAULT_DATASET: &str = "reanalysis-era5-land";
const RC_FILE: &str = ".cdsapirc";

/// Evaporation fields of ERA5-Land, named by their short names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvaporationVariable {
    #[serde(rename = "pev")]
    PotentialEvaporation,
    #[serde(rename = "e")]
    TotalEvaporation,
    #[serde(rename = "evabs")]
    BareSoilEvaporation,
    #[serde(rename = "evaow")]
    OpenWaterEvaporation,
    #[serde(rename = "evavt")]
    VegetationTranspiration,
    #[serde(rename = "evatc")]
    TopOfCanopyEvaporation,
}

impl EvaporationVariable {
    pub const ALL: [EvaporationVariable; 6] = [
        EvaporationVariable::PotentialEvaporation,
        EvaporationVariable::TotalEvaporation,
        EvaporationVariable::BareSoilEvaporation,
        EvaporationVariable::OpenWaterEvaporation,
        EvaporationVariable::VegetationTranspiration,
        EvaporationVariable::TopOfCanopyEvaporation,
    ];

    /// Variable name inside the downloaded NetCDF file
    pub fn short_name(&self) -> &'static str {
        match self {
            EvaporationVariable::PotentialEvaporation => "pev",
            EvaporationVariable::TotalEvaporation => "e",
            EvaporationVariable::BareSoilEvaporation => "evabs",
            EvaporationVariable::OpenWaterEvaporation => "evaow",
            EvaporationVariable::VegetationTranspiration => "evavt",
            EvaporationVariable::TopOfCanopyEvaporation => "evatc",
        }
    }

    /// Variable name used in CDS requests
    pub fn cds_name(&self) -> &'static str {
        match self {
            EvaporationVariable::PotentialEvaporation => "potential_evaporation",
            EvaporationVariable::TotalEvaporation => "total_evaporation",
            EvaporationVariable::BareSoilEvaporation => "evaporation_from_bare_soil",
            EvaporationVariable::OpenWaterEvaporation => {
                "evaporation_from_open_water_surfaces_excluding_oceans"
            }
            EvaporationVariable::VegetationTranspiration => {
                "evaporation_from_vegetation_transpiration"
            }
            EvaporationVariable::TopOfCanopyEvaporation => "evaporation_from_the_top_of_canopy",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            EvaporationVariable::PotentialEvaporation => "potential evaporation",
            EvaporationVariable::TotalEvaporation => "total evaporation",
            EvaporationVariable::BareSoilEvaporation => "bare soil evaporation",
            EvaporationVariable::OpenWaterEvaporation => "open water evaporation",
            EvaporationVariable::VegetationTranspiration => "vegetation transpiration",
            EvaporationVariable::TopOfCanopyEvaporation => "top of canopy evaporation",
        }
    }
}

impl fmt::Display for EvaporationVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for EvaporationVariable {
    type Err = Nc2ShetranError;

    fn from_str(s: &str) -> Result<Self> {
        EvaporationVariable::ALL
            .into_iter()
            .find(|v| v.short_name() == s || v.cds_name() == s)
            .ok_or_else(|| {
                Nc2ShetranError::Config(format!(
                    "Unknown evaporation variable '{}' (expected one of {})",
                    s,
                    EvaporationVariable::ALL
                        .iter()
                        .map(|v| v.short_name())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })
    }
}

/// A CDS retrieval request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadConfig {
    #[serde(default = "default_dataset")]
    pub dataset: String,
    #[serde(default = "default_variables")]
    pub variables: Vec<EvaporationVariable>,
    pub years: Vec<u16>,
    #[serde(default = "default_months")]
    pub months: Vec<u8>,
    #[serde(default = "default_days")]
    pub days: Vec<u8>,
    /// Hours of the day (UTC) to retrieve
    #[serde(default = "default_hours")]
    pub hours: Vec<u8>,
    pub area: BoundingBox,
    /// Where the file is saved; the job's input path when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_dataset() -> String {
    DEFAULT_DATASET.to_string()
}

fn default_variables() -> Vec<EvaporationVariable> {
    EvaporationVariable::ALL.to_vec()
}

fn default_months() -> Vec<u8> {
    (1..=12).collect()
}

fn default_days() -> Vec<u8> {
    (1..=31).collect()
}

fn default_hours() -> Vec<u8> {
    vec![0]
}

fn default_poll_interval() -> u64 {
    10
}

fn default_timeout() -> u64 {
    6 * 60 * 60
}

impl DownloadConfig {
    /// Every evaporation variable, every day at 00:00, for the given area and years
    pub fn for_area(area: BoundingBox, years: Vec<u16>) -> Self {
        Self {
            dataset: default_dataset(),
            variables: default_variables(),
            years,
            months: default_months(),
            days: default_days(),
            hours: default_hours(),
            area,
            target: None,
            poll_interval_secs: default_poll_interval(),
            timeout_secs: default_timeout(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(Nc2ShetranError::Config(msg));
        if self.dataset.trim().is_empty() {
            return fail("Download dataset is empty".to_string());
        }
        if self.variables.is_empty() {
            return fail("Download needs at least one variable".to_string());
        }
        if self.years.is_empty() {
            return fail("Download needs at least one year".to_string());
        }
        if let Some(y) = self.years.iter().find(|y| !(1940..=2100).contains(*y)) {
            return fail(format!("Year {} is outside 1940..=2100", y));
        }
        if self.months.is_empty() || self.months.iter().any(|m| !(1..=12).contains(m)) {
            return fail(format!("Months must lie within 1..=12, got {:?}", self.months));
        }
        if self.days.is_empty() || self.days.iter().any(|d| !(1..=31).contains(d)) {
            return fail(format!("Days must lie within 1..=31, got {:?}", self.days));
        }
        if self.hours.is_empty() || self.hours.iter().any(|h| *h > 23) {
            return fail(format!("Hours must lie within 0..=23, got {:?}", self.hours));
        }
        if self.poll_interval_secs == 0 {
            return fail("Poll interval must be at least one second".to_string());
        }
        if self.timeout_secs < self.poll_interval_secs {
            return fail(format!(
                "Timeout ({}s) is shorter than the poll interval ({}s)",
                self.timeout_secs, self.poll_interval_secs
            ));
        }
        self.area.validate()
    }

    /// JSON inputs of the retrieval job
    pub fn request_body(&self) -> Value {
        json!({
            "variable": self.variables.iter().map(|v| v.cds_name()).collect::<Vec<_>>(),
            "year": self.years.iter().map(|y| y.to_string()).collect::<Vec<_>>(),
            "month": self.months.iter().map(|m| format!("{:02}", m)).collect::<Vec<_>>(),
            "day": self.days.iter().map(|d| format!("{:02}", d)).collect::<Vec<_>>(),
            "time": self.hours.iter().map(|h| format!("{:02}:00", h)).collect::<Vec<_>>(),
            "area": self.area.to_cds_area(),
            "data_format": "netcdf",
            "download_format": "unarchived",
        })
    }
}

/// API endpoint and personal access token
#[derive(Clone, PartialEq)]
pub struct CdsCredentials {
    pub url: String,
    pub key: String,
}

impl fmt::Debug for CdsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CdsCredentials")
            .field("url", &self.url)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Reads the `url:` and `key:` entries of a `.cdsapirc` file
pub fn parse_cdsapirc(content: &str) -> (Option<String>, Option<String>) {
    let mut url = None;
    let mut key = None;
    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            let value = value.trim().to_string();
            match name.trim() {
                "url" => url = Some(value),
                "key" => key = Some(value),
                _ => {}
            }
        }
    }
    (url, key)
}

fn rc_path() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(|home| PathBuf::from(home).join(RC_FILE))
}

impl CdsCredentials {
    /// Environment variables first, then `~/.cdsapirc`
    pub fn load() -> Result<Self> {
        let rc = rc_path();
        let rc_content = rc.as_ref().and_then(|p| std::fs::read_to_string(p).ok());
        Self::resolve(
            std::env::var("CDSAPI_URL").ok(),
            std::env::var("CDSAPI_KEY").ok(),
            rc_content.as_deref(),
        )
        .map_err(|_| {
            Nc2ShetranError::CredentialsMissing(
                rc.map(|p| p.display().to_string())
                    .unwrap_or_else(|| format!("~/{}", RC_FILE)),
            )
        })
    }

    /// Combines the sources; each field prefers the environment
    pub fn resolve(
        env_url: Option<String>,
        env_key: Option<String>,
        rc_content: Option<&str>,
    ) -> Result<Self> {
        let (rc_url, rc_key) = rc_content.map(parse_cdsapirc).unwrap_or((None, None));
        let key = env_key
            .filter(|k| !k.trim().is_empty())
            .or(rc_key)
            .ok_or_else(|| Nc2ShetranError::CredentialsMissing(RC_FILE.to_string()))?;
        let url = env_url
            .filter(|u| !u.trim().is_empty())
            .or(rc_url)
            .unwrap_or_else(|| DEFAULT_CDS_URL.to_string());
        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            key,
        })
    }
}

/// Lifecycle state of a retrieval job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Accepted,
    Running,
    Successful,
    Failed,
    Dismissed,
    #[serde(other)]
    Unknown,
}

impl JobState {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            JobState::Successful | JobState::Failed | JobState::Dismissed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobStatus {
    #[serde(rename = "jobID")]
    pub job_id: String,
    pub status: JobState,
}

/// Downloadable result of a finished job
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Asset {
    pub href: String,
    #[serde(rename = "file:size", default)]
    pub size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct JobResults {
    asset: AssetWrapper,
}

#[derive(Debug, Deserialize)]
struct AssetWrapper {
    value: Asset,
}

/// Asynchronous client for the CDS retrieve API
pub struct CdsClient {
    client: Client,
    credentials: CdsCredentials,
    poll_interval: Duration,
    timeout: Duration,
}

impl CdsClient {
    pub fn new(credentials: CdsCredentials, config: &DownloadConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            credentials,
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/retrieve/v1/{}", self.credentials.url, path)
    }

    /// Submits a retrieval job
    pub async fn submit(&self, dataset: &str, request: &Value) -> Result<JobStatus> {
        let url = self.endpoint(&format!("processes/{}/execution", dataset));
        debug!("Submitting CDS request to {}", url);
        let response = self
            .client
            .post(&url)
            .header("PRIVATE-TOKEN", &self.credentials.key)
            .json(&json!({ "inputs": request }))
            .send()
            .await?;
        let status: JobStatus = checked(response).await?.json().await?;
        info!("CDS job {} is {:?}", status.job_id, status.status);
        Ok(status)
    }

    pub async fn status(&self, job_id: &str) -> Result<JobStatus> {
        let response = self
            .client
            .get(self.endpoint(&format!("jobs/{}", job_id)))
            .header("PRIVATE-TOKEN", &self.credentials.key)
            .send()
            .await?;
        Ok(checked(response).await?.json().await?)
    }

    /// Polls a job until it finishes, failing on anything but success
    pub async fn wait(&self, job_id: &str) -> Result<()> {
        let started = tokio::time::Instant::now();
        let mut last = None;
        loop {
            let status = self.status(job_id).await?;
            if last != Some(status.status) {
                info!("CDS job {} is {:?}", job_id, status.status);
                last = Some(status.status);
            }
            if status.status.is_finished() {
                if status.status == JobState::Successful {
                    return Ok(());
                }
                return Err(Nc2ShetranError::Download(format!(
                    "job {} ended as {:?}",
                    job_id, status.status
                )));
            }
            if status.status == JobState::Unknown {
                warn!("CDS job {} reported an unknown state", job_id);
            }
            if started.elapsed() >= self.timeout {
                return Err(Nc2ShetranError::Download(format!(
                    "job {} did not finish within {}s",
                    job_id,
                    self.timeout.as_secs()
                )));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    pub async fn result_asset(&self, job_id: &str) -> Result<Asset> {
        let response = self
            .client
            .get(self.endpoint(&format!("jobs/{}/results", job_id)))
            .header("PRIVATE-TOKEN", &self.credentials.key)
            .send()
            .await?;
        let results: JobResults = checked(response).await?.json().await?;
        Ok(results.asset.value)
    }

    /// Streams an asset to `target` through a `.partial` file; returns the byte count
    pub async fn download_asset(&self, asset: &Asset, target: &Path) -> Result<u64> {
        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let partial = partial_path(target);
        let mut response = checked(self.client.get(&asset.href).send().await?).await?;
        let total = asset.size.or(response.content_length());

        let pb = match total {
            Some(len) => ProgressBar::new(len),
            None => ProgressBar::new_spinner(),
        };
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner} [{elapsed_precise}] [{bar:40}] {bytes}/{total_bytes} ({bytes_per_sec})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
        );

        let streamed = stream_to_file(&mut response, &partial, &pb).await;
        pb.finish_and_clear();
        let written = match streamed {
            Ok(written) => written,
            Err(e) => {
                fs::remove_file(&partial).await.ok();
                return Err(e);
            }
        };

        if let Some(expected) = total {
            if written != expected {
                fs::remove_file(&partial).await.ok();
                return Err(Nc2ShetranError::Download(format!(
                    "size mismatch: expected {} bytes, got {}",
                    expected, written
                )));
            }
        }
        fs::rename(&partial, target).await?;
        info!("Downloaded {} bytes to {}", written, target.display());
        Ok(written)
    }

    /// Submits, waits for and downloads one request
    pub async fn retrieve(&self, config: &DownloadConfig, target: &Path) -> Result<PathBuf> {
        let job = self.submit(&config.dataset, &config.request_body()).await?;
        if job.status != JobState::Successful {
            self.wait(&job.job_id).await?;
        }
        let asset = self.result_asset(&job.job_id).await?;
        self.download_asset(&asset, target).await?;
        Ok(target.to_path_buf())
    }
}

async fn stream_to_file(response: &mut Response, path: &Path, pb: &ProgressBar) -> Result<u64> {
    let mut file = fs::File::create(path).await?;
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        pb.set_position(written);
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

async fn checked(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Nc2ShetranError::Download(format!(
        "CDS returned {}: {}",
        status,
        body.trim()
    )))
}

/// Downloads `config` to `target` unless the file already exists and `force` is false
pub async fn run_download(config: &DownloadConfig, target: &str, force: bool) -> Result<PathBuf> {
    config.validate()?;
    let target = PathBuf::from(target);
    if target.exists() && !force {
        info!(
            "{} already exists, skipping download",
            target.display()
        );
        return Ok(target);
    }
    info!(
        "Requesting {} variables from {} for {} years",
        config.variables.len(),
        config.dataset,
        config.years.len()
    );
    let credentials = CdsCredentials::load()?;
    let client = CdsClient::new(credentials, config)?;
    client.retrieve(config, &target).await
}
