pub mod queries;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct NewWeatherDay {
    pub date: NaiveDate,
    pub city: String,
    pub temperature: Option<f64>,
    pub conditions: Option<String>,
    pub sunrise: Option<String>,
    pub sunset: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChartEntry {
    pub date: NaiveDate,
    pub position: i64,
    pub song_title: String,
    pub artist: String,
}

#[derive(Debug, Clone, Default)]
pub struct PlaylistMetaInput {
    pub spotify_id: String,
    pub name: Option<String>,
    pub description: String,
    pub tracks_total: Option<i64>,
    pub owner_name: String,
    pub approx_created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct TrackInput {
    pub spotify_id: String,
    pub name: Option<String>,
    pub popularity: Option<i64>,
    pub valence: Option<f64>,
    pub energy: Option<f64>,
    pub added_at: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaylistSyncOutcome {
    pub playlist_inserted: bool,
    pub new_tracks: usize,
    pub new_links: usize,
    pub skipped_tracks: usize,
}

#[derive(Debug, Clone)]
pub struct WeatherSample {
    pub date: NaiveDate,
    pub temperature: Option<f64>,
    pub sunset: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PlaylistMonthRow {
    pub name: Option<String>,
    pub month_added: String,
}

#[derive(Debug, Clone)]
pub struct ChartRow {
    pub date: NaiveDate,
    pub position: i64,
    pub song_title: String,
    pub artist: String,
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create DB directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite DB: {}", path.display()))?;

        let database = Self { conn };
        database.init_schema()?;

        Ok(database)
    }

    /// Opens an existing database without creating the file or any table.
    /// Returns `None` when the file is absent or the schema was never initialized.
    pub fn open_read_only(path: &Path) -> Result<Option<Self>> {
        if !path.is_file() {
            return Ok(None);
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Failed to open SQLite DB read-only: {}", path.display()))?;

        let database = Self { conn };
        if database.missing_tables()?.is_empty() {
            Ok(Some(database))
        } else {
            Ok(None)
        }
    }

    pub fn missing_tables(&self) -> Result<Vec<&'static str>> {
        let mut missing = Vec::new();

        for table in queries::TABLES {
            let found = self
                .conn
                .query_row(
                    "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    params![table],
                    |_| Ok(()),
                )
                .optional()
                .with_context(|| format!("Failed to inspect schema for {table}"))?;

            if found.is_none() {
                missing.push(table);
            }
        }

        Ok(missing)
    }

    pub fn init_schema(&self) -> Result<()> {
        queries::schema_statements()
            .iter()
            .try_for_each(|statement| {
                self.conn
                    .execute(statement, [])
                    .context("Failed to initialize schema")
                    .map(|_| ())
            })
    }

    pub fn has_weather_for(&self, date: NaiveDate, city: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM weather w
                 JOIN locations l ON l.location_id = w.location_id
                 WHERE w.date = ?1 AND l.name = ?2",
                params![date, city],
                |_| Ok(()),
            )
            .optional()
            .context("Failed to check weather row")?;

        Ok(found.is_some())
    }

    /// Inserts a day with its location and description lookups in one transaction.
    /// Returns `false` when the (date, location) row already exists.
    pub fn insert_weather_day(&mut self, day: &NewWeatherDay) -> Result<bool> {
        let transaction = self
            .conn
            .transaction()
            .context("Failed to start transaction")?;

        let location_id = lookup_or_insert(
            &transaction,
            "SELECT location_id FROM locations WHERE name = ?1",
            "INSERT INTO locations (name) VALUES (?1)",
            &day.city,
        )?;

        let description_id = day
            .conditions
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(|text| {
                lookup_or_insert(
                    &transaction,
                    "SELECT description_id FROM weather_descriptions WHERE text = ?1",
                    "INSERT INTO weather_descriptions (text) VALUES (?1)",
                    text,
                )
            })
            .transpose()?;

        let inserted = transaction
            .execute(
                "INSERT OR IGNORE INTO weather (date, location_id, temperature, description_id, sunrise, sunset)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    day.date,
                    location_id,
                    day.temperature,
                    description_id,
                    day.sunrise,
                    day.sunset
                ],
            )
            .context("Failed to insert weather day")?;

        transaction
            .commit()
            .context("Failed to commit weather day")?;

        Ok(inserted > 0)
    }

    pub fn weather_dates(&self) -> Result<Vec<NaiveDate>> {
        let mut statement = self
            .conn
            .prepare("SELECT DISTINCT date FROM weather ORDER BY date ASC")?;

        let rows = statement
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query weather dates")?;

        Ok(rows)
    }

    pub fn has_chart_for(&self, date: NaiveDate) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM charts WHERE date = ?1",
                params![date],
                |_| Ok(()),
            )
            .optional()
            .context("Failed to check chart row")?;

        Ok(found.is_some())
    }

    pub fn insert_chart_entry(&self, entry: &NewChartEntry) -> Result<bool> {
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO charts (date, position, song_title, artist) VALUES (?1, ?2, ?3, ?4)",
                params![entry.date, entry.position, entry.song_title, entry.artist],
            )
            .context("Failed to insert chart entry")?;

        Ok(inserted > 0)
    }

    pub fn upsert_playlist_meta(&self, playlist: &PlaylistMetaInput) -> Result<bool> {
        upsert_playlist_meta(&self.conn, playlist)
    }

    /// Fills `approx_created_at` and `month_added` only where they are still NULL.
    pub fn backfill_playlist_created(
        &self,
        spotify_id: &str,
        created_at: DateTime<Utc>,
    ) -> Result<bool> {
        backfill_playlist_created(&self.conn, spotify_id, created_at)
    }

    /// Writes one playlist, its tracks and links atomically. At most `track_budget` new
    /// tracks are inserted; tracks already stored are linked without audio features.
    pub fn sync_playlist_tracks(
        &mut self,
        playlist: &PlaylistMetaInput,
        tracks: &[TrackInput],
        track_budget: usize,
    ) -> Result<PlaylistSyncOutcome> {
        let transaction = self
            .conn
            .transaction()
            .context("Failed to start transaction")?;

        let mut outcome = PlaylistSyncOutcome {
            playlist_inserted: upsert_playlist_meta(&transaction, playlist)?,
            ..PlaylistSyncOutcome::default()
        };

        if let Some(created_at) = playlist.approx_created_at {
            backfill_playlist_created(&transaction, &playlist.spotify_id, created_at)?;
        }

        for track in tracks {
            if !track_exists(&transaction, &track.spotify_id)? {
                if outcome.new_tracks >= track_budget {
                    continue;
                }

                if !upsert_track(&transaction, track)? {
                    outcome.skipped_tracks += 1;
                    continue;
                }
                outcome.new_tracks += 1;
            }

            let linked = transaction
                .execute(
                    "INSERT OR IGNORE INTO spotify_playlist_tracks (playlist_spotify_id, track_spotify_id, added_at)
                     VALUES (?1, ?2, ?3)",
                    params![playlist.spotify_id, track.spotify_id, track.added_at],
                )
                .context("Failed to link playlist track")?;
            outcome.new_links += linked;
        }

        transaction
            .commit()
            .context("Failed to commit playlist tracks")?;

        Ok(outcome)
    }

    pub fn track_ids(&self) -> Result<HashSet<String>> {
        let mut statement = self.conn.prepare("SELECT spotify_id FROM spotify_tracks")?;

        let ids = statement
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()
            .context("Failed to query track ids")?;

        Ok(ids)
    }

    pub fn weather_samples(&self) -> Result<Vec<WeatherSample>> {
        let mut statement = self
            .conn
            .prepare("SELECT date, temperature, sunset FROM weather ORDER BY date ASC")?;

        let rows = statement
            .query_map([], |row| {
                Ok(WeatherSample {
                    date: row.get(0)?,
                    temperature: row.get(1)?,
                    sunset: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query weather samples")?;

        Ok(rows)
    }

    pub fn playlist_months(&self) -> Result<Vec<PlaylistMonthRow>> {
        let mut statement = self.conn.prepare(
            "SELECT name, month_added FROM spotify_playlists_meta
             WHERE month_added IS NOT NULL
             ORDER BY month_added ASC",
        )?;

        let rows = statement
            .query_map([], |row| {
                Ok(PlaylistMonthRow {
                    name: row.get(0)?,
                    month_added: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query playlist months")?;

        Ok(rows)
    }

    pub fn number_one_entries(&self) -> Result<Vec<ChartRow>> {
        let mut statement = self.conn.prepare(
            "SELECT date, position, song_title, artist FROM charts
             WHERE position = 1
             ORDER BY date ASC",
        )?;

        let rows = statement
            .query_map([], |row| {
                Ok(ChartRow {
                    date: row.get(0)?,
                    position: row.get(1)?,
                    song_title: row.get(2)?,
                    artist: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query chart entries")?;

        Ok(rows)
    }

    pub fn table_counts(&self) -> Result<Vec<(&'static str, i64)>> {
        queries::TABLES
            .iter()
            .map(|table| {
                self.conn
                    .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                        row.get::<_, i64>(0)
                    })
                    .with_context(|| format!("Failed to count rows in {table}"))
                    .map(|count| (*table, count))
            })
            .collect()
    }
}

fn lookup_or_insert(conn: &Connection, select: &str, insert: &str, value: &str) -> Result<i64> {
    let existing = conn
        .query_row(select, params![value], |row| row.get::<_, i64>(0))
        .optional()
        .context("Failed to look up lookup-table row")?;

    match existing {
        Some(id) => Ok(id),
        None => {
            conn.execute(insert, params![value])
                .context("Failed to insert lookup-table row")?;
            Ok(conn.last_insert_rowid())
        }
    }
}

fn upsert_playlist_meta(conn: &Connection, playlist: &PlaylistMetaInput) -> Result<bool> {
    let approx_created_at = playlist.approx_created_at.map(|created| created.to_rfc3339());
    let month_added = playlist.approx_created_at.map(|created| month_key(&created));

    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO spotify_playlists_meta
                (spotify_id, name, description, tracks_total, owner_name, approx_created_at, month_added)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                playlist.spotify_id,
                playlist.name,
                playlist.description,
                playlist.tracks_total,
                playlist.owner_name,
                approx_created_at,
                month_added
            ],
        )
        .context("Failed to upsert playlist metadata")?;

    Ok(inserted > 0)
}

fn backfill_playlist_created(
    conn: &Connection,
    spotify_id: &str,
    created_at: DateTime<Utc>,
) -> Result<bool> {
    let updated = conn
        .execute(
            "UPDATE spotify_playlists_meta
             SET approx_created_at = COALESCE(approx_created_at, ?2),
                 month_added = COALESCE(month_added, ?3)
             WHERE spotify_id = ?1 AND (approx_created_at IS NULL OR month_added IS NULL)",
            params![spotify_id, created_at.to_rfc3339(), month_key(&created_at)],
        )
        .context("Failed to back-fill playlist creation date")?;

    Ok(updated > 0)
}

fn track_exists(conn: &Connection, spotify_id: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM spotify_tracks WHERE spotify_id = ?1",
            params![spotify_id],
            |_| Ok(()),
        )
        .optional()
        .context("Failed to look up track")?;

    Ok(found.is_some())
}

/// Tracks without both audio features are never persisted.
fn upsert_track(conn: &Connection, track: &TrackInput) -> Result<bool> {
    let (Some(valence), Some(energy)) = (track.valence, track.energy) else {
        return Ok(false);
    };

    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO spotify_tracks (spotify_id, name, popularity, valence, energy)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![track.spotify_id, track.name, track.popularity, valence, energy],
        )
        .context("Failed to upsert track")?;

    Ok(inserted > 0)
}

pub fn month_key(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y-%m").to_string()
}
