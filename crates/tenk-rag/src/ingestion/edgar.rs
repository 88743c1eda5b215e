//! SEC EDGAR client for downloading 10-K filings

use chrono::{Datelike, NaiveDate};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::pipeline::BatchReport;
use crate::config::EdgarConfig;
use crate::error::{Error, Result};

/// One 10-K listed in a company's submissions feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilingInfo {
    /// Accession number without dashes
    pub accession: String,
    /// Primary HTML document name
    pub primary_document: String,
    /// Date the filing was submitted
    pub filing_date: NaiveDate,
}

impl FilingInfo {
    /// Filing year
    pub fn year(&self) -> i32 {
        self.filing_date.year()
    }

    /// `{TICKER}_{year}_10K_{accession}.{htm|html}`
    pub fn local_filename(&self, ticker: &str) -> String {
        let ext = if self.primary_document.to_ascii_lowercase().ends_with(".html") {
            "html"
        } else {
            "htm"
        };
        format!(
            "{}_{}_10K_{}.{}",
            ticker.to_uppercase(),
            self.year(),
            self.accession,
            ext
        )
    }
}

#[derive(Debug, Deserialize)]
struct TickerEntry {
    cik_str: u64,
    ticker: String,
}

#[derive(Debug, Deserialize)]
struct Submissions {
    filings: SubmissionFilings,
}

#[derive(Debug, Deserialize)]
struct SubmissionFilings {
    recent: RecentFilings,
}

/// Column-oriented `filings.recent` block of the submissions API
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecentFilings {
    pub form: Vec<String>,
    pub accession_number: Vec<String>,
    pub primary_document: Vec<String>,
    pub filing_date: Vec<String>,
}

impl RecentFilings {
    /// HTML 10-K filings whose filing year is in `years`
    pub fn ten_k_filings(&self, years: &[i32]) -> Vec<FilingInfo> {
        let rows = self
            .form
            .iter()
            .zip(&self.accession_number)
            .zip(&self.primary_document)
            .zip(&self.filing_date);

        rows.filter(|(((form, _), _), _)| form.as_str() == "10-K")
            .filter_map(|(((_, accession), document), date)| {
                let filing_date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
                if !years.contains(&filing_date.year()) {
                    return None;
                }
                let lower = document.to_ascii_lowercase();
                if !(lower.ends_with(".htm") || lower.ends_with(".html")) {
                    return None;
                }
                Some(FilingInfo {
                    accession: accession.replace('-', ""),
                    primary_document: document.clone(),
                    filing_date,
                })
            })
            .collect()
    }
}

/// EDGAR HTTP client; SEC requires a descriptive User-Agent on every request
pub struct EdgarClient {
    client: Client,
    config: EdgarConfig,
}

impl EdgarClient {
    /// Create a client from configuration
    pub fn new(config: &EdgarConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Edgar(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Error::Edgar(format!("HTTP {} for {}", response.status(), url)));
        }
        Ok(response.json().await?)
    }

    /// Resolve a ticker to its CIK
    pub async fn lookup_cik(&self, ticker: &str) -> Result<u64> {
        let url = format!("{}/files/company_tickers.json", self.config.www_url);
        let entries: HashMap<String, TickerEntry> = self.get_json(&url).await?;
        entries
            .values()
            .find(|entry| entry.ticker.eq_ignore_ascii_case(ticker))
            .map(|entry| entry.cik_str)
            .ok_or_else(|| Error::Edgar(format!("Ticker not found: {}", ticker)))
    }

    /// List HTML 10-K filings for a CIK within the configured years
    pub async fn list_10k_filings(&self, cik: u64) -> Result<Vec<FilingInfo>> {
        let url = format!("{}/submissions/CIK{:010}.json", self.config.data_url, cik);
        let submissions: Submissions = self.get_json(&url).await?;
        Ok(submissions.filings.recent.ten_k_filings(&self.config.years))
    }

    /// Download one filing into `{raw_dir}/{TICKER}/`
    pub async fn download(
        &self,
        ticker: &str,
        cik: u64,
        filing: &FilingInfo,
        raw_dir: &Path,
    ) -> Result<PathBuf> {
        let url = format!(
            "{}/Archives/edgar/data/{}/{}/{}",
            self.config.www_url, cik, filing.accession, filing.primary_document
        );
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Error::Edgar(format!("HTTP {} for {}", response.status(), url)));
        }
        let body = response.bytes().await?;

        let dir = raw_dir.join(ticker.to_uppercase());
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(filing.local_filename(ticker));
        tokio::fs::write(&path, &body).await?;
        Ok(path)
    }

    /// Download every configured ticker's filings, skipping failures
    pub async fn fetch_all(&self, raw_dir: &Path) -> BatchReport {
        let mut report = BatchReport::default();

        for ticker in &self.config.tickers {
            info!("Fetching 10-Ks for {}", ticker);
            let cik = match self.lookup_cik(ticker).await {
                Ok(cik) => cik,
                Err(e) => {
                    warn!("Skipping {}: {}", ticker, e);
                    report.failed += 1;
                    continue;
                }
            };
            let filings = match self.list_10k_filings(cik).await {
                Ok(filings) => filings,
                Err(e) => {
                    warn!("Failed to list filings for {} (CIK {}): {}", ticker, cik, e);
                    report.failed += 1;
                    continue;
                }
            };
            info!("Found {} 10-K filings for {} (CIK {:010})", filings.len(), ticker, cik);

            for filing in &filings {
                match self.download(ticker, cik, filing, raw_dir).await {
                    Ok(path) => {
                        info!("Saved {}", path.display());
                        report.processed += 1;
                        report.outputs.push(path);
                    }
                    Err(e) => {
                        warn!("Failed to download {} {}: {}", ticker, filing.accession, e);
                        report.failed += 1;
                    }
                }
            }
        }

        report.outputs.sort();
        report
    }
}
