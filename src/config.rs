use anyhow::{Context, Result, anyhow, bail};
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const APP_DIR: &str = ".weathertunes";
const CONFIG_FILE: &str = "config.json";
const THEMES_FILE: &str = "themes.json";
pub const DEFAULT_MAX_NEW_ROWS: usize = 25;
pub const MIN_HTTP_TIMEOUT_SECONDS: u64 = 5;

pub const ENV_WEATHER_API_KEY: &str = "WEATHERTUNES_WEATHER_API_KEY";
pub const ENV_SPOTIFY_CLIENT_ID: &str = "WEATHERTUNES_SPOTIFY_CLIENT_ID";
pub const ENV_SPOTIFY_CLIENT_SECRET: &str = "WEATHERTUNES_SPOTIFY_CLIENT_SECRET";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub db_path: PathBuf,
    pub output_dir: PathBuf,
    pub themes_path: PathBuf,
    pub max_new_rows: usize,
    pub http_timeout_seconds: u64,
    pub user_agent: String,
    pub weather_base_url: String,
    pub weather_api_key: Option<String>,
    pub default_city: String,
    pub default_country: String,
    pub charts_base_url: String,
    pub chart_title_selector: String,
    pub chart_artist_selector: String,
    pub spotify_accounts_url: String,
    pub spotify_api_url: String,
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
    pub spotify_market: String,
    pub search_queries: Vec<String>,
    pub search_limit: u32,
    pub max_track_pages: usize,
}

impl Default for Config {
    fn default() -> Self {
        let root = default_root_dir();

        Self {
            db_path: PathBuf::from("final_project.db"),
            output_dir: PathBuf::from("plots"),
            themes_path: root.join(THEMES_FILE),
            max_new_rows: DEFAULT_MAX_NEW_ROWS,
            http_timeout_seconds: 15,
            user_agent: "Mozilla/5.0".to_string(),
            weather_base_url:
                "https://weather.visualcrossing.com/VisualCrossingWebServices/rest/services/timeline"
                    .to_string(),
            weather_api_key: None,
            default_city: "London".to_string(),
            default_country: "United Kingdom".to_string(),
            charts_base_url: "https://www.officialcharts.com/charts/singles-chart".to_string(),
            chart_title_selector: "a.chart-name".to_string(),
            chart_artist_selector: "a.chart-artist".to_string(),
            spotify_accounts_url: "https://accounts.spotify.com".to_string(),
            spotify_api_url: "https://api.spotify.com/v1".to_string(),
            spotify_client_id: None,
            spotify_client_secret: None,
            spotify_market: "US".to_string(),
            search_queries: ["global", "study", "summer", "holiday", "winter"]
                .into_iter()
                .map(ToOwned::to_owned)
                .collect(),
            search_limit: 20,
            max_track_pages: 10,
        }
    }
}

impl Config {
    pub fn root_dir() -> Result<PathBuf> {
        Ok(default_root_dir())
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(default_root_dir().join(CONFIG_FILE))
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;
        set_mode_600(&config_path)?;

        Ok(())
    }

    pub fn ensure_bootstrap_files(&self) -> Result<()> {
        let root = Self::root_dir()?;
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create root directory: {}", root.display()))?;

        if !self.themes_path.exists() {
            if let Some(parent) = self.themes_path.parent() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create themes directory: {}", parent.display())
                })?;
            }

            fs::write(&self.themes_path, include_str!("../assets/themes.json")).with_context(
                || {
                    format!(
                        "Failed to create default themes file: {}",
                        self.themes_path.display()
                    )
                },
            )?;
        }

        Ok(())
    }

    pub fn http_timeout(&self) -> u64 {
        self.http_timeout_seconds.max(MIN_HTTP_TIMEOUT_SECONDS)
    }

    pub fn weather_api_key(&self) -> Option<String> {
        resolve_secret(ENV_WEATHER_API_KEY, self.weather_api_key.as_deref())
    }

    pub fn spotify_credentials(&self) -> Option<(String, String)> {
        let client_id = resolve_secret(ENV_SPOTIFY_CLIENT_ID, self.spotify_client_id.as_deref())?;
        let client_secret = resolve_secret(
            ENV_SPOTIFY_CLIENT_SECRET,
            self.spotify_client_secret.as_deref(),
        )?;

        Some((client_id, client_secret))
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match normalize_config_key(key) {
            "db_path" => self.db_path = expand_home(value),
            "output_dir" => self.output_dir = expand_home(value),
            "themes_path" => self.themes_path = expand_home(value),
            "max_new_rows" => {
                let parsed = value
                    .parse::<usize>()
                    .map_err(|_| anyhow!("max_new_rows must be a number"))?;
                if parsed == 0 {
                    bail!("max_new_rows must be at least 1");
                }
                self.max_new_rows = parsed;
            }
            "http_timeout_seconds" => {
                self.http_timeout_seconds = value
                    .parse::<u64>()
                    .map_err(|_| anyhow!("http_timeout_seconds must be a number"))?
                    .max(MIN_HTTP_TIMEOUT_SECONDS);
            }
            "user_agent" => self.user_agent = value.trim().to_string(),
            "weather_base_url" => self.weather_base_url = trim_url(value),
            "weather_api_key" => self.weather_api_key = non_empty(value),
            "default_city" => self.default_city = value.trim().to_string(),
            "default_country" => self.default_country = value.trim().to_string(),
            "charts_base_url" => self.charts_base_url = trim_url(value),
            "chart_title_selector" => self.chart_title_selector = value.trim().to_string(),
            "chart_artist_selector" => self.chart_artist_selector = value.trim().to_string(),
            "spotify_accounts_url" => self.spotify_accounts_url = trim_url(value),
            "spotify_api_url" => self.spotify_api_url = trim_url(value),
            "spotify_client_id" => self.spotify_client_id = non_empty(value),
            "spotify_client_secret" => self.spotify_client_secret = non_empty(value),
            "spotify_market" => self.spotify_market = value.trim().to_uppercase(),
            "search_queries" => {
                let queries = value
                    .split(',')
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(ToOwned::to_owned)
                    .collect::<Vec<_>>();

                if queries.is_empty() {
                    bail!("search_queries requires at least one query");
                }
                self.search_queries = queries;
            }
            "search_limit" => {
                self.search_limit = value
                    .parse::<u32>()
                    .map_err(|_| anyhow!("search_limit must be a number"))?
                    .clamp(1, 50);
            }
            "max_track_pages" => {
                self.max_track_pages = value
                    .parse::<usize>()
                    .map_err(|_| anyhow!("max_track_pages must be a number"))?
                    .max(1);
            }
            _ => {
                bail!(
                    "Unsupported config key: {key}. Supported keys: db_path|db.path, output_dir|output.dir, themes_path|themes.path, max_new_rows|run.max_new_rows, http_timeout_seconds|http.timeout_seconds, user_agent|http.user_agent, weather_base_url|weather.base_url, weather_api_key|weather.api_key, default_city|weather.city, default_country|weather.country, charts_base_url|charts.base_url, chart_title_selector|charts.title_selector, chart_artist_selector|charts.artist_selector, spotify_accounts_url|spotify.accounts_url, spotify_api_url|spotify.api_url, spotify_client_id|spotify.client_id, spotify_client_secret|spotify.client_secret, spotify_market|spotify.market, search_queries|spotify.search_queries, search_limit|spotify.search_limit, max_track_pages|spotify.max_track_pages"
                );
            }
        }

        Ok(())
    }

    pub fn get_value(&self, key: &str) -> Option<String> {
        match normalize_config_key(key) {
            "db_path" => Some(self.db_path.display().to_string()),
            "output_dir" => Some(self.output_dir.display().to_string()),
            "themes_path" => Some(self.themes_path.display().to_string()),
            "max_new_rows" => Some(self.max_new_rows.to_string()),
            "http_timeout_seconds" => Some(self.http_timeout_seconds.to_string()),
            "user_agent" => Some(self.user_agent.clone()),
            "weather_base_url" => Some(self.weather_base_url.clone()),
            "weather_api_key" => Some(mask_secret(self.weather_api_key.as_deref())),
            "default_city" => Some(self.default_city.clone()),
            "default_country" => Some(self.default_country.clone()),
            "charts_base_url" => Some(self.charts_base_url.clone()),
            "chart_title_selector" => Some(self.chart_title_selector.clone()),
            "chart_artist_selector" => Some(self.chart_artist_selector.clone()),
            "spotify_accounts_url" => Some(self.spotify_accounts_url.clone()),
            "spotify_api_url" => Some(self.spotify_api_url.clone()),
            "spotify_client_id" => Some(mask_secret(self.spotify_client_id.as_deref())),
            "spotify_client_secret" => Some(mask_secret(self.spotify_client_secret.as_deref())),
            "spotify_market" => Some(self.spotify_market.clone()),
            "search_queries" => Some(self.search_queries.join(",")),
            "search_limit" => Some(self.search_limit.to_string()),
            "max_track_pages" => Some(self.max_track_pages.to_string()),
            _ => None,
        }
    }
}

pub fn is_secret_key(key: &str) -> bool {
    matches!(
        normalize_config_key(key),
        "weather_api_key" | "spotify_client_id" | "spotify_client_secret"
    )
}

fn normalize_config_key(key: &str) -> &str {
    match key {
        "db_path" | "db.path" => "db_path",
        "output_dir" | "output.dir" => "output_dir",
        "themes_path" | "themes.path" => "themes_path",
        "max_new_rows" | "run.max_new_rows" => "max_new_rows",
        "http_timeout_seconds" | "http.timeout_seconds" => "http_timeout_seconds",
        "user_agent" | "http.user_agent" => "user_agent",
        "weather_base_url" | "weather.base_url" => "weather_base_url",
        "weather_api_key" | "weather.api_key" => "weather_api_key",
        "default_city" | "weather.city" => "default_city",
        "default_country" | "weather.country" => "default_country",
        "charts_base_url" | "charts.base_url" => "charts_base_url",
        "chart_title_selector" | "charts.title_selector" => "chart_title_selector",
        "chart_artist_selector" | "charts.artist_selector" => "chart_artist_selector",
        "spotify_accounts_url" | "spotify.accounts_url" => "spotify_accounts_url",
        "spotify_api_url" | "spotify.api_url" => "spotify_api_url",
        "spotify_client_id" | "spotify.client_id" => "spotify_client_id",
        "spotify_client_secret" | "spotify.client_secret" => "spotify_client_secret",
        "spotify_market" | "spotify.market" => "spotify_market",
        "search_queries" | "spotify.search_queries" => "search_queries",
        "search_limit" | "spotify.search_limit" => "search_limit",
        "max_track_pages" | "spotify.max_track_pages" => "max_track_pages",
        _ => key,
    }
}

fn resolve_secret(env_key: &str, configured: Option<&str>) -> Option<String> {
    std::env::var(env_key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .or_else(|| {
            configured
                .filter(|value| !value.trim().is_empty())
                .map(ToOwned::to_owned)
        })
}

fn mask_secret(value: Option<&str>) -> String {
    value
        .map(|_| "***set***".to_string())
        .unwrap_or_else(|| "not_set".to_string())
}

fn non_empty(value: &str) -> Option<String> {
    (!value.trim().is_empty()).then(|| value.trim().to_string())
}

fn trim_url(value: &str) -> String {
    value.trim().trim_end_matches('/').to_string()
}

pub fn expand_home(raw: &str) -> PathBuf {
    raw.strip_prefix("~/")
        .and_then(|stripped| home_dir().map(|home| home.join(stripped)))
        .unwrap_or_else(|| PathBuf::from(raw))
}

fn default_root_dir() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn set_mode_600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to set file permissions: {}", path.display()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Config, is_secret_key};

    #[test]
    fn set_value_accepts_dotted_aliases() {
        let mut config = Config::default();

        config.set_value("run.max_new_rows", "10").unwrap();
        config.set_value("spotify.search_queries", "rain, , snow").unwrap();
        config.set_value("weather.base_url", "http://localhost:9000/").unwrap();

        assert_eq!(config.max_new_rows, 10);
        assert_eq!(config.search_queries, vec!["rain", "snow"]);
        assert_eq!(config.weather_base_url, "http://localhost:9000");
    }

    #[test]
    fn set_value_rejects_zero_cap_and_unknown_keys() {
        let mut config = Config::default();

        assert!(config.set_value("max_new_rows", "0").is_err());
        assert!(config.set_value("polling_seconds", "300").is_err());
        assert_eq!(config.max_new_rows, 25);
    }

    #[test]
    fn secrets_are_masked_on_read() {
        let mut config = Config::default();
        config.set_value("spotify.client_secret", "abc123").unwrap();

        assert_eq!(
            config.get_value("spotify_client_secret").as_deref(),
            Some("***set***")
        );
        assert_eq!(
            config.get_value("weather.api_key").as_deref(),
            Some("not_set")
        );
        assert!(is_secret_key("weather.api_key"));
        assert!(!is_secret_key("db.path"));
    }

    #[test]
    fn timeout_has_a_floor() {
        let mut config = Config::default();
        config.http_timeout_seconds = 1;

        assert_eq!(config.http_timeout(), 5);
    }
}
