use crate::analyzer::{DEFAULT_RECENT_MONTHS, DEFAULT_SINCE_MONTH};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "weathertunes",
    about = "Weather, singles chart and playlist ETL into SQLite"
)]
pub struct Cli {
    /// SQLite database file; overrides `db_path` from the config file.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Download daily weather history into the database.
    Weather {
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        country: Option<String>,
        #[arg(long)]
        max_new: Option<usize>,
    },
    /// Scrape the number-one single for every stored weather date.
    Charts {
        #[arg(long)]
        max_new: Option<usize>,
    },
    Playlists {
        #[command(subcommand)]
        command: PlaylistCommands,
    },
    Viz {
        #[command(subcommand)]
        command: VizCommands,
    },
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    Status,
}

#[derive(Debug, Subcommand)]
pub enum PlaylistCommands {
    /// Discover playlists by keyword search (metadata only).
    Search {
        #[arg(long)]
        max_new_playlists: Option<usize>,
        /// Derive a creation month from the earliest visible track.
        #[arg(long, default_value_t = false)]
        approx_created: bool,
    },
    /// Sync featured playlists with their tracks and audio features.
    Featured {
        #[arg(long)]
        max_new_tracks: Option<usize>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

#[derive(Debug, Subcommand)]
pub enum VizCommands {
    TemperatureThemes {
        #[arg(long, default_value_t = DEFAULT_RECENT_MONTHS)]
        months: usize,
        #[arg(long, num_args = 0..=1, default_missing_value = "temperature_themes.csv")]
        csv: Option<PathBuf>,
    },
    ChartLongevity {
        #[arg(long, num_args = 0..=1, default_missing_value = "weather_topsong.csv")]
        csv: Option<PathBuf>,
    },
    ThemeMonths {
        #[arg(long, default_value = DEFAULT_SINCE_MONTH)]
        since: String,
        #[arg(long, num_args = 0..=1, default_missing_value = "theme_months.csv")]
        csv: Option<PathBuf>,
    },
    SunsetThemes {
        #[arg(long, num_args = 0..=1, default_missing_value = "theme_by_month.csv")]
        csv: Option<PathBuf>,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    Set { key: String, value: String },
    Get { key: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_weather_with_global_db() {
        let cli = Cli::try_parse_from([
            "weathertunes",
            "weather",
            "--start",
            "2024-01-01",
            "--end",
            "2024-01-31",
            "--max-new",
            "10",
            "--db",
            "other.db",
        ])
        .unwrap();

        assert_eq!(cli.db, Some(PathBuf::from("other.db")));
        assert!(matches!(
            cli.command,
            Commands::Weather {
                max_new: Some(10),
                ..
            }
        ));
    }

    #[test]
    fn viz_csv_flag_takes_optional_path() {
        let bare = Cli::try_parse_from(["weathertunes", "viz", "chart-longevity", "--csv"]).unwrap();
        let named =
            Cli::try_parse_from(["weathertunes", "viz", "sunset-themes", "--csv", "out.csv"])
                .unwrap();
        let absent = Cli::try_parse_from(["weathertunes", "viz", "theme-months"]).unwrap();

        assert!(matches!(
            bare.command,
            Commands::Viz {
                command: VizCommands::ChartLongevity { csv: Some(path) }
            } if path == PathBuf::from("weather_topsong.csv")
        ));
        assert!(matches!(
            named.command,
            Commands::Viz {
                command: VizCommands::SunsetThemes { csv: Some(path) }
            } if path == PathBuf::from("out.csv")
        ));
        assert!(matches!(
            absent.command,
            Commands::Viz {
                command: VizCommands::ThemeMonths { since, csv: None }
            } if since == "2023-01"
        ));
    }
}
