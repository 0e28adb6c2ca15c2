mod analyzer;
mod cli;
mod config;
mod db;
mod fetcher;
mod http;

use crate::analyzer::VizTarget;
use crate::cli::{Cli, Commands, ConfigCommands, PlaylistCommands, VizCommands};
use crate::config::{
    Config, ENV_SPOTIFY_CLIENT_ID, ENV_SPOTIFY_CLIENT_SECRET, ENV_WEATHER_API_KEY, is_secret_key,
};
use crate::db::Database;
use crate::fetcher::charts::{ChartMarkup, OfficialCharts, scrape_and_store_charts};
use crate::fetcher::playlists::{
    FeaturedOptions, SearchOptions, discover_playlists, sync_featured_playlists,
};
use crate::fetcher::spotify::SpotifyClient;
use crate::fetcher::weather::{VisualCrossing, WeatherRequest, fetch_and_store_weather};
use crate::http::HttpClient;
use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_target(false)
        .compact()
        .init();

    let Cli { db, command } = Cli::parse();

    match command {
        Commands::Config { command } => handle_config_command(command),
        Commands::Status => handle_status(&load_config(db)?),
        Commands::Weather {
            start,
            end,
            city,
            country,
            max_new,
        } => {
            let config = load_config(db)?;
            let request = WeatherRequest {
                start: parse_date(&start)?,
                end: parse_date(&end)?,
                city: city.unwrap_or_else(|| config.default_city.clone()),
                country: country.unwrap_or_else(|| config.default_country.clone()),
            };
            handle_weather(&config, &request, max_new)
        }
        Commands::Charts { max_new } => handle_charts(&load_config(db)?, max_new),
        Commands::Playlists { command } => handle_playlists_command(&load_config(db)?, command),
        Commands::Viz { command } => handle_viz_command(&load_config(db)?, command),
    }
}

fn handle_config_command(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Set { key, value } => {
            let mut config = load_or_default_config()?;
            config.set_value(&key, &value)?;
            config.ensure_bootstrap_files()?;
            config.save()?;

            let masked = if is_secret_key(&key) {
                "***hidden***".to_string()
            } else {
                value
            };
            println!("Config saved: {key} = {masked}");
            Ok(())
        }
        ConfigCommands::Get { key } => {
            let config = load_or_default_config()?;
            let value = config
                .get_value(&key)
                .with_context(|| format!("Unsupported config key: {key}"))?;

            println!("{value}");
            Ok(())
        }
    }
}

fn handle_status(config: &Config) -> Result<()> {
    let database = Database::open(&config.db_path)?;

    println!("weathertunes status");
    println!("- database: {}", config.db_path.display());
    println!("- output_dir: {}", config.output_dir.display());
    println!(
        "- weather_api_key: {}",
        configured(config.weather_api_key().is_some())
    );
    println!(
        "- spotify_credentials: {}",
        configured(config.spotify_credentials().is_some())
    );

    for (table, count) in database.table_counts()? {
        println!("- {table}: {count} rows");
    }

    Ok(())
}

fn handle_weather(config: &Config, request: &WeatherRequest, max_new: Option<usize>) -> Result<()> {
    let api_key = config.weather_api_key().with_context(|| {
        format!(
            "Weather API key missing. Set {ENV_WEATHER_API_KEY} or run `weathertunes config set weather.api_key <key>`"
        )
    })?;
    let source = VisualCrossing::new(http_client(config)?, &config.weather_base_url, api_key);
    let mut database = Database::open(&config.db_path)?;

    let summary = fetch_and_store_weather(
        &source,
        &mut database,
        request,
        max_new.unwrap_or(config.max_new_rows),
    )?;

    println!("weather ({}): {summary}", request.location());
    Ok(())
}

fn handle_charts(config: &Config, max_new: Option<usize>) -> Result<()> {
    let markup = ChartMarkup::new(&config.chart_title_selector, &config.chart_artist_selector)?;
    let source = OfficialCharts::new(http_client(config)?, &config.charts_base_url);
    let database = Database::open(&config.db_path)?;

    let summary = scrape_and_store_charts(
        &source,
        &markup,
        &database,
        max_new.unwrap_or(config.max_new_rows),
    )?;

    println!("charts: {summary}");
    Ok(())
}

fn handle_playlists_command(config: &Config, command: PlaylistCommands) -> Result<()> {
    let (client_id, client_secret) = config.spotify_credentials().with_context(|| {
        format!(
            "Spotify credentials missing. Set {ENV_SPOTIFY_CLIENT_ID} and {ENV_SPOTIFY_CLIENT_SECRET} or the spotify.client_id / spotify.client_secret config keys"
        )
    })?;
    let client = SpotifyClient::connect(
        http_client(config)?,
        &config.spotify_accounts_url,
        &config.spotify_api_url,
        &config.spotify_market,
        &client_id,
        &client_secret,
    )?;
    let mut database = Database::open(&config.db_path)?;

    match command {
        PlaylistCommands::Search {
            max_new_playlists,
            approx_created,
        } => {
            let options = SearchOptions {
                queries: config.search_queries.clone(),
                limit: config.search_limit,
                max_new_playlists: max_new_playlists.unwrap_or(config.max_new_rows),
                approx_created,
            };
            let summary = discover_playlists(&client, &database, &options)?;
            println!("playlists search: {summary}");
        }
        PlaylistCommands::Featured {
            max_new_tracks,
            limit,
        } => {
            let options = FeaturedOptions {
                limit,
                max_new_tracks: max_new_tracks.unwrap_or(config.max_new_rows),
                max_track_pages: config.max_track_pages,
            };
            let summary = sync_featured_playlists(&client, &mut database, &options)?;
            println!("playlists featured: {summary}");
        }
    }

    Ok(())
}

fn handle_viz_command(config: &Config, command: VizCommands) -> Result<()> {
    let Some(database) = Database::open_read_only(&config.db_path)? else {
        println!(
            "Nothing to plot: no initialized database at {}",
            config.db_path.display()
        );
        return Ok(());
    };
    let target = |csv: Option<PathBuf>| VizTarget {
        output_dir: config.output_dir.clone(),
        csv,
    };

    let written = match command {
        VizCommands::TemperatureThemes { months, csv } => {
            analyzer::temperature_themes(&database, &target(csv), months)?
        }
        VizCommands::ChartLongevity { csv } => {
            analyzer::chart_longevity(&database, &target(csv))?
        }
        VizCommands::ThemeMonths { since, csv } => {
            validate_month(&since)?;
            let rules = analyzer::load_theme_rules(&config.themes_path)?;
            analyzer::theme_months(&database, &target(csv), &rules, &since)?
        }
        VizCommands::SunsetThemes { csv } => {
            let rules = analyzer::load_theme_rules(&config.themes_path)?;
            analyzer::sunset_themes(&database, &target(csv), &rules)?
        }
    };

    match written {
        Some(path) => println!("Plot written: {}", path.display()),
        None => println!("Nothing to plot"),
    }

    Ok(())
}

fn http_client(config: &Config) -> Result<HttpClient> {
    HttpClient::new(config.http_timeout(), &config.user_agent)
        .context("Failed to build HTTP client")
}

fn parse_date(input: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .with_context(|| format!("Invalid date format: {input}. Example: 2024-01-31"))
}

fn validate_month(input: &str) -> Result<()> {
    let parsed = NaiveDate::parse_from_str(&format!("{input}-01"), "%Y-%m-%d");

    if input.len() != 7 || parsed.is_err() {
        bail!("Invalid month format: {input}. Example: 2023-01");
    }
    Ok(())
}

fn configured(present: bool) -> &'static str {
    if present { "configured" } else { "missing" }
}

fn load_or_default_config() -> Result<Config> {
    if Config::config_path()?.exists() {
        return Config::load();
    }

    let config = Config::default();
    config.ensure_bootstrap_files()?;
    config.save()?;
    Ok(config)
}

fn load_config(db_override: Option<PathBuf>) -> Result<Config> {
    let mut config = load_or_default_config()?;

    if let Some(path) = db_override {
        config.db_path = path;
    }

    Ok(config)
}
