pub mod aggregate;
pub mod export;
pub mod plot;
pub mod theme;

use crate::analyzer::theme::{Season, ThemeRules};
use crate::db::Database;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_RECENT_MONTHS: usize = 24;
pub const DEFAULT_SINCE_MONTH: &str = "2023-01";
pub const LONGEVITY_TOP_SONGS: usize = 10;

/// Where a visualization writes its artifacts.
#[derive(Debug, Clone)]
pub struct VizTarget {
    pub output_dir: PathBuf,
    pub csv: Option<PathBuf>,
}

impl VizTarget {
    fn plot_path(&self, file_name: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!(
                "Failed to create output directory: {}",
                self.output_dir.display()
            )
        })?;

        Ok(self.output_dir.join(file_name))
    }

    fn export<T: serde::Serialize>(&self, rows: &[T]) -> Result<()> {
        if let Some(path) = &self.csv {
            export::write_csv(path, rows)?;
            info!(path = %path.display(), rows = rows.len(), "csv snapshot written");
        }
        Ok(())
    }
}

/// Monthly temperature against winter/summer playlist counts, most recent `months` only.
pub fn temperature_themes(
    database: &Database,
    target: &VizTarget,
    months: usize,
) -> Result<Option<PathBuf>> {
    let temperatures = aggregate::monthly_temperature(&database.weather_samples()?);
    let counts =
        aggregate::theme_counts_by_month(&database.playlist_months()?, &ThemeRules::two_season());
    let rows = aggregate::most_recent(
        aggregate::merge_temperature_themes(&temperatures, &counts),
        months,
    );

    if rows.is_empty() {
        info!("temperature-themes: nothing to plot");
        return Ok(None);
    }

    target.export(&rows)?;
    let path = target.plot_path("temperature_themes.svg")?;
    plot::temperature_themes(&path, &rows)?;
    info!(path = %path.display(), months = rows.len(), "plot written");

    Ok(Some(path))
}

pub fn chart_longevity(database: &Database, target: &VizTarget) -> Result<Option<PathBuf>> {
    let mut stats =
        aggregate::song_longevity(&database.number_one_entries()?, &database.weather_samples()?);
    stats.truncate(LONGEVITY_TOP_SONGS);

    if stats.is_empty() {
        info!("chart-longevity: nothing to plot");
        return Ok(None);
    }

    target.export(&stats)?;
    let path = target.plot_path("chart_longevity.svg")?;
    plot::chart_longevity(&path, &stats)?;
    info!(path = %path.display(), songs = stats.len(), "plot written");

    Ok(Some(path))
}

pub fn theme_months(
    database: &Database,
    target: &VizTarget,
    rules: &ThemeRules,
    since: &str,
) -> Result<Option<PathBuf>> {
    let counts = aggregate::theme_counts_by_month(&database.playlist_months()?, rules);
    let rows = aggregate::theme_rows_since(&counts, since);

    if rows.is_empty() {
        info!(since, "theme-months: nothing to plot");
        return Ok(None);
    }

    target.export(&rows)?;
    let path = target.plot_path("theme_months.svg")?;
    plot::theme_months(&path, &rows)?;
    info!(path = %path.display(), months = rows.len(), "plot written");

    Ok(Some(path))
}

/// Theme counts grouped by how late the sun sets; spring is folded into the fallback.
pub fn sunset_themes(
    database: &Database,
    target: &VizTarget,
    rules: &ThemeRules,
) -> Result<Option<PathBuf>> {
    let sunsets = aggregate::monthly_sunset(&database.weather_samples()?);
    let rules = rules.clone().without(Season::Spring);
    let counts = aggregate::theme_counts_by_month(&database.playlist_months()?, &rules);

    if sunsets.is_empty() {
        info!("sunset-themes: nothing to plot");
        return Ok(None);
    }

    let rows = aggregate::sunset_theme_bins(&sunsets, &counts);
    target.export(&rows)?;
    let path = target.plot_path("sunset_themes.svg")?;
    plot::sunset_themes(&path, &rows)?;
    info!(path = %path.display(), "plot written");

    Ok(Some(path))
}

/// Loads keyword rules from `path`, or the built-in four-season rules when the file is absent.
pub fn load_theme_rules(path: &Path) -> Result<ThemeRules> {
    if path.exists() {
        ThemeRules::load(path)
    } else {
        Ok(ThemeRules::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewChartEntry, NewWeatherDay, PlaylistMetaInput};
    use chrono::{NaiveDate, TimeZone, Utc};
    use tempfile::TempDir;

    fn seeded() -> (TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let mut database = Database::open(&dir.path().join("viz.db")).unwrap();

        for (date, temperature, sunset) in [
            ("2023-12-20", 4.0, "15:53:00"),
            ("2023-12-21", 6.0, "15:54:00"),
            ("2024-06-20", 20.0, "21:21:00"),
        ] {
            let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
            database
                .insert_weather_day(&NewWeatherDay {
                    date,
                    city: "London".to_string(),
                    temperature: Some(temperature),
                    conditions: Some("Clear".to_string()),
                    sunrise: None,
                    sunset: Some(sunset.to_string()),
                })
                .unwrap();
            database
                .insert_chart_entry(&NewChartEntry {
                    date,
                    position: 1,
                    song_title: "Lovin On Me".to_string(),
                    artist: "Jack Harlow".to_string(),
                })
                .unwrap();
        }

        for (id, name, month) in [("p1", "Christmas Hits", 12), ("p2", "Beach Days", 6)] {
            let year = if month == 12 { 2023 } else { 2024 };
            database
                .upsert_playlist_meta(&PlaylistMetaInput {
                    spotify_id: id.to_string(),
                    name: Some(name.to_string()),
                    approx_created_at: Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single(),
                    ..PlaylistMetaInput::default()
                })
                .unwrap();
        }

        (dir, database)
    }

    fn target(dir: &TempDir, csv: Option<&str>) -> VizTarget {
        VizTarget {
            output_dir: dir.path().join("plots"),
            csv: csv.map(|name| dir.path().join(name)),
        }
    }

    #[test]
    fn empty_database_has_nothing_to_plot() {
        let dir = tempfile::tempdir().unwrap();
        let database = Database::open(&dir.path().join("empty.db")).unwrap();
        let target = target(&dir, Some("out.csv"));

        assert!(temperature_themes(&database, &target, 24).unwrap().is_none());
        assert!(chart_longevity(&database, &target).unwrap().is_none());
        assert!(
            theme_months(&database, &target, &ThemeRules::default(), "2023-01")
                .unwrap()
                .is_none()
        );
        assert!(
            sunset_themes(&database, &target, &ThemeRules::default())
                .unwrap()
                .is_none()
        );
        assert!(!dir.path().join("out.csv").exists());
        assert!(!dir.path().join("plots").exists());
    }

    #[test]
    fn temperature_themes_writes_plot_and_snapshot() {
        let (dir, database) = seeded();
        let target = target(&dir, Some("temperature.csv"));

        let path = temperature_themes(&database, &target, 24).unwrap().unwrap();

        assert!(path.ends_with("temperature_themes.svg"));
        assert!(path.exists());
        let csv = fs::read_to_string(dir.path().join("temperature.csv")).unwrap();
        assert!(csv.contains("2023-12,5.0,1,0"));
        assert!(csv.contains("2024-06,20.0,0,1"));
    }

    #[test]
    fn plots_render_from_a_read_only_connection() {
        let (dir, database) = seeded();
        drop(database);
        let database = Database::open_read_only(&dir.path().join("viz.db"))
            .unwrap()
            .unwrap();

        let path = temperature_themes(&database, &target(&dir, None), 24).unwrap();

        assert!(path.is_some_and(|path| path.exists()));
    }

    #[test]
    fn month_without_readings_exports_an_empty_temperature() {
        let (dir, mut database) = seeded();
        database
            .insert_weather_day(&NewWeatherDay {
                date: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
                city: "London".to_string(),
                temperature: None,
                conditions: None,
                sunrise: None,
                sunset: None,
            })
            .unwrap();

        temperature_themes(&database, &target(&dir, Some("temperature.csv")), 24)
            .unwrap()
            .unwrap();

        let csv = fs::read_to_string(dir.path().join("temperature.csv")).unwrap();
        assert!(csv.contains("2024-07,,0,0"));
    }

    #[test]
    fn chart_longevity_groups_number_ones() {
        let (dir, database) = seeded();
        let target = target(&dir, Some("weather_topsong.csv"));

        chart_longevity(&database, &target).unwrap().unwrap();

        let csv = fs::read_to_string(dir.path().join("weather_topsong.csv")).unwrap();
        let lines = csv.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("Lovin On Me,Jack Harlow,3,10.0,"));
    }

    #[test]
    fn theme_months_and_sunset_themes_render() {
        let (dir, database) = seeded();
        let rules = ThemeRules::default();

        let months = theme_months(&database, &target(&dir, None), &rules, "2023-01").unwrap();
        let sunsets = sunset_themes(&database, &target(&dir, Some("theme_by_month.csv")), &rules)
            .unwrap();

        assert!(months.is_some_and(|path| path.exists()));
        assert!(sunsets.is_some_and(|path| path.exists()));
        let csv = fs::read_to_string(dir.path().join("theme_by_month.csv")).unwrap();
        assert!(csv.contains("Early Sunset (Short Days),1,0,0,0"));
        assert!(csv.contains("Late Sunset (Long Days),0,1,0,0"));
    }

    #[test]
    fn missing_rules_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let rules = load_theme_rules(&dir.path().join("absent.json")).unwrap();

        assert_eq!(rules.classify("Snow Day"), Some(Season::Winter));
    }
}
