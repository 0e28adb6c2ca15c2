use crate::db::{Database, NewWeatherDay};
use crate::fetcher::FetchSummary;
use crate::http::{HttpClient, HttpError};
use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, error, info};
use url::Url;

#[derive(Debug, Default, Deserialize)]
pub struct TimelineResponse {
    #[serde(default)]
    pub days: Vec<DailyRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DailyRecord {
    pub datetime: Option<String>,
    pub temp: Option<f64>,
    pub conditions: Option<String>,
    pub sunrise: Option<String>,
    pub sunset: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WeatherRequest {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub city: String,
    pub country: String,
}

impl WeatherRequest {
    pub fn location(&self) -> String {
        format!("{}, {}", self.city, self.country)
    }
}

pub trait WeatherSource {
    fn daily_history(
        &self,
        location: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyRecord>, HttpError>;
}

/// Visual Crossing timeline API, one call for the whole range.
pub struct VisualCrossing {
    http: HttpClient,
    base_url: String,
    api_key: String,
}

impl VisualCrossing {
    pub fn new(http: HttpClient, base_url: &str, api_key: String) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn timeline_url(
        &self,
        location: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Url, HttpError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|error| HttpError::Url(error.to_string()))?;

        url.path_segments_mut()
            .map_err(|_| HttpError::Url(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .push(location)
            .push(&start.format("%Y-%m-%d").to_string())
            .push(&end.format("%Y-%m-%d").to_string());

        Ok(url)
    }
}

impl WeatherSource for VisualCrossing {
    fn daily_history(
        &self,
        location: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyRecord>, HttpError> {
        let url = self.timeline_url(location, start, end)?;
        let query = [
            ("unitGroup", "metric".to_string()),
            ("contentType", "json".to_string()),
            ("include", "days".to_string()),
            ("key", self.api_key.clone()),
        ];

        let response: TimelineResponse = self.http.get_json(url.as_str(), &query, None)?;
        Ok(response.days)
    }
}

pub fn fetch_and_store_weather(
    source: &impl WeatherSource,
    database: &mut Database,
    request: &WeatherRequest,
    cap: usize,
) -> Result<FetchSummary> {
    if request.end < request.start {
        bail!(
            "End date {} is before start date {}",
            request.end,
            request.start
        );
    }

    let mut summary = FetchSummary::new(cap);
    let location = request.location();

    let days = match source.daily_history(&location, request.start, request.end) {
        Ok(days) => days,
        Err(HttpError::Status { status, body }) => {
            error!(status, body = %body, location = %location, "weather provider returned an error");
            return Ok(summary);
        }
        Err(error) => return Err(error).context("Weather history request failed"),
    };

    for day in days {
        if summary.cap_reached() {
            break;
        }

        let Some(date) = day
            .datetime
            .as_deref()
            .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
        else {
            debug!(datetime = ?day.datetime, "weather day without a usable date");
            summary.skipped += 1;
            continue;
        };

        if database.has_weather_for(date, &request.city)? {
            summary.skipped += 1;
            continue;
        }

        let inserted = database.insert_weather_day(&NewWeatherDay {
            date,
            city: request.city.clone(),
            temperature: day.temp,
            conditions: day.conditions,
            sunrise: day.sunrise,
            sunset: day.sunset,
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
        location = %location,
        "weather fetch finished"
    );

    Ok(summary)
}
