use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Invalid header value: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),
    #[error("Invalid URL: {0}")]
    Url(String),
}

impl HttpError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Blocking client shared by every fetcher. One request at a time, no retries.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(timeout_seconds: u64, user_agent: &str) -> Result<Self, HttpError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .default_headers(headers)
            .build()?;

        Ok(Self { client })
    }

    pub fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        bearer: Option<&str>,
    ) -> Result<T, HttpError> {
        let mut request = self
            .client
            .get(url)
            .query(query)
            .header(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let body = send(request)?;
        Ok(serde_json::from_str(&body)?)
    }

    pub fn get_text(&self, url: &str, query: &[(&str, String)]) -> Result<String, HttpError> {
        send(self.client.get(url).query(query))
    }

    pub fn post_form_basic<T: DeserializeOwned>(
        &self,
        url: &str,
        username: &str,
        password: &str,
        form: &[(&str, &str)],
    ) -> Result<T, HttpError> {
        let request = self
            .client
            .post(url)
            .basic_auth(username, Some(password))
            .form(form);

        let body = send(request)?;
        Ok(serde_json::from_str(&body)?)
    }
}

fn send(request: RequestBuilder) -> Result<String, HttpError> {
    let response = request.send()?;
    let status: StatusCode = response.status();
    let body = response.text()?;

    if !status.is_success() {
        return Err(HttpError::Status {
            status: status.as_u16(),
            body: truncate_body(&body),
        });
    }

    Ok(body)
}

fn truncate_body(body: &str) -> String {
    const MAX_CHARS: usize = 300;

    if body.chars().count() <= MAX_CHARS {
        body.to_string()
    } else {
        let head = body.chars().take(MAX_CHARS).collect::<String>();
        format!("{head}...")
    }
}
