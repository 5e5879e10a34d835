use crate::models::{Edition, RawApplicantRow};
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{info, warn};

/// Cells in a results row, in page order.
const RESULT_COLUMNS: usize = 7;

#[derive(Debug, Clone, PartialEq)]
pub struct CareerLink {
    pub name: String,
    pub url: Url,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedTable {
    pub rows: Vec<RawApplicantRow>,
    pub skipped: usize,
}

#[derive(Debug)]
pub struct EditionScrape {
    pub edition: Edition,
    /// One entry per career on the index page; empty when the page had no table.
    pub tables: Vec<(String, Vec<RawApplicantRow>)>,
    pub skipped_rows: usize,
}

pub struct AdmissionScraper {
    client: reqwest::Client,
}

impl AdmissionScraper {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }

    pub async fn scrape_edition(&self, index_url: &str) -> Result<EditionScrape> {
        let edition = edition_from_url(index_url)?;
        let base = Url::parse(index_url).with_context(|| format!("Invalid URL: {}", index_url))?;
        info!(edition = %edition, url = index_url, "fetching career index");

        let index = self.fetch(index_url).await?;
        let careers = parse_career_index(&index, &base)?;
        info!(edition = %edition, careers = careers.len(), "career index parsed");

        let mut tables = Vec::with_capacity(careers.len());
        let mut skipped_rows = 0;
        for career in careers {
            let parsed = match self.fetch(career.url.as_str()).await {
                Ok(page) => parse_results_table(&page)?.unwrap_or_else(|| {
                    warn!(career = %career.name, url = %career.url, "no results table found");
                    ParsedTable::default()
                }),
                Err(err) => {
                    warn!(career = %career.name, error = %err, "failed to fetch career results");
                    ParsedTable::default()
                }
            };
            info!(career = %career.name, applicants = parsed.rows.len(), "career scraped");
            skipped_rows += parsed.skipped;
            tables.push((career.name, parsed.rows));
        }

        Ok(EditionScrape {
            edition,
            tables,
            skipped_rows,
        })
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch URL: {}", url))?;

        if !response.status().is_success() {
            return Err(anyhow!("HTTP request failed with status: {}", response.status()));
        }

        // The result pages do not always declare their charset; they are UTF-8.
        let body = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read response body from: {}", url))?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

/// `https://host/Website20251/A.html` belongs to edition 2025-1.
pub fn edition_from_url(url: &str) -> Result<Edition> {
    let pattern = Regex::new(r"Website(\d{4})(\d)")?;
    let caps = pattern
        .captures(url)
        .ok_or_else(|| anyhow!("No edition marker in URL: {}", url))?;
    Ok(Edition::new(caps[1].parse()?, caps[2].parse()?))
}

/// Career names and result-page links from the first table of an edition
/// index. The first row holds headers and the first link is not a career.
pub fn parse_career_index(content: &str, base: &Url) -> Result<Vec<CareerLink>> {
    let document = Html::parse_document(content);
    let Some(table) = document.select(&selector("table")?).next() else {
        return Err(anyhow!("No career table in edition index {}", base));
    };

    let cell = selector("td")?;
    let names: Vec<String> = table
        .select(&selector("tr")?)
        .skip(1)
        .filter_map(|row| row.select(&cell).next())
        .map(|td| cell_text(&td))
        .collect();

    let mut links = Vec::new();
    for anchor in table.select(&selector("a")?).skip(1) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let href = href.trim().trim_start_matches("./");
        links.push(
            base.join(href)
                .with_context(|| format!("Invalid career link: {}", href))?,
        );
    }

    if names.len() != links.len() {
        warn!(
            names = names.len(),
            links = links.len(),
            "career names and links differ in count"
        );
    }

    Ok(names
        .into_iter()
        .zip(links)
        .map(|(name, url)| CareerLink { name, url })
        .collect())
}

/// Rows of the first table on a career results page, or `None` when the page
/// has no table. Rows too short to hold a result are counted and skipped.
pub fn parse_results_table(content: &str) -> Result<Option<ParsedTable>> {
    let document = Html::parse_document(content);
    let Some(table) = document.select(&selector("table")?).next() else {
        return Ok(None);
    };

    let cell = selector("td")?;
    let mut parsed = ParsedTable::default();
    for row in table.select(&selector("tr")?).skip(1) {
        let cells: Vec<String> = row.select(&cell).map(|td| cell_text(&td)).collect();
        // second-choice column is missing on some editions
        if cells.len() < RESULT_COLUMNS - 1 {
            parsed.skipped += 1;
            continue;
        }
        let mut cells = cells.into_iter();
        let mut next = || cells.next().unwrap_or_default();
        parsed.rows.push(RawApplicantRow {
            id: next(),
            full_name: Some(next()),
            career: next(),
            score: next(),
            slot: next(),
            remark: next(),
            second_choice_career: next(),
        });
    }
    Ok(Some(parsed))
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid selector '{}': {:?}", css, e))
}

fn cell_text(cell: &ElementRef) -> String {
    cell.text().collect::<String>().trim().to_string()
}
