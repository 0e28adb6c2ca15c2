use crate::db::{Database, NewChartEntry};
use crate::fetcher::FetchSummary;
use crate::http::{HttpClient, HttpError};
use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};

/// Chart id of the weekly singles top 100 in the page URL.
const SINGLES_CHART_ID: &str = "7501";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopEntry {
    pub title: String,
    pub artist: String,
}

pub trait ChartSource {
    fn chart_page(&self, date: NaiveDate) -> Result<String, HttpError>;
}

pub struct OfficialCharts {
    http: HttpClient,
    base_url: String,
}

impl OfficialCharts {
    pub fn new(http: HttpClient, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn page_url(&self, date: NaiveDate) -> String {
        format!(
            "{}/{}/{}/",
            self.base_url,
            date.format("%Y%m%d"),
            SINGLES_CHART_ID
        )
    }
}

impl ChartSource for OfficialCharts {
    fn chart_page(&self, date: NaiveDate) -> Result<String, HttpError> {
        self.http.get_text(&self.page_url(date), &[])
    }
}

/// CSS selectors locating the number-one title and artist on a chart page.
pub struct ChartMarkup {
    title: Selector,
    artist: Selector,
}

impl ChartMarkup {
    pub fn new(title_selector: &str, artist_selector: &str) -> Result<Self> {
        Ok(Self {
            title: parse_selector(title_selector)?,
            artist: parse_selector(artist_selector)?,
        })
    }

    pub fn top_entry(&self, html: &str) -> Option<TopEntry> {
        let document = Html::parse_document(html);
        let title = first_text(&document, &self.title)?;
        let artist = first_text(&document, &self.artist)?;

        Some(TopEntry { title, artist })
    }
}

fn parse_selector(raw: &str) -> Result<Selector> {
    Selector::parse(raw).map_err(|error| anyhow!("Invalid CSS selector {raw}: {error:?}"))
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Scrapes the number-one single for every weather date that has no chart row yet.
/// Pages without the expected markup are skipped and retried on the next run.
pub fn scrape_and_store_charts(
    source: &impl ChartSource,
    markup: &ChartMarkup,
    database: &Database,
    cap: usize,
) -> Result<FetchSummary> {
    let mut summary = FetchSummary::new(cap);
    let dates = database.weather_dates()?;

    if dates.is_empty() {
        warn!("weather table has no dates; run the weather fetcher first");
        return Ok(summary);
    }

    for date in dates {
        if summary.cap_reached() {
            break;
        }

        if database.has_chart_for(date)? {
            summary.skipped += 1;
            continue;
        }

        let html = match source.chart_page(date) {
            Ok(html) => html,
            Err(HttpError::Status { status, .. }) => {
                debug!(date = %date, status, "chart page unavailable");
                summary.skipped += 1;
                continue;
            }
            Err(error) => {
                return Err(error).with_context(|| format!("Chart page request failed: {date}"));
            }
        };

        let Some(entry) = markup.top_entry(&html) else {
            debug!(date = %date, "chart markup not found");
            summary.skipped += 1;
            continue;
        };

        let inserted = database.insert_chart_entry(&NewChartEntry {
            date,
            position: 1,
            song_title: entry.title,
            artist: entry.artist,
        })?;

        if inserted {
            summary.inserted += 1;
        } else {
            summary.skipped += 1;
        }
    }

    info!(
        inserted = summary.inserted,
        skipped = summary.skipped,
        "chart scrape finished"
    );

    Ok(summary)
}
