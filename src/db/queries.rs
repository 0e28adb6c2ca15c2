pub const CREATE_LOCATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS locations (
  location_id INTEGER PRIMARY KEY AUTOINCREMENT,
  name        TEXT NOT NULL UNIQUE
);
"#;

pub const CREATE_WEATHER_DESCRIPTIONS: &str = r#"
CREATE TABLE IF NOT EXISTS weather_descriptions (
  description_id INTEGER PRIMARY KEY AUTOINCREMENT,
  text           TEXT NOT NULL UNIQUE
);
"#;

pub const CREATE_WEATHER: &str = r#"
CREATE TABLE IF NOT EXISTS weather (
  weather_id     INTEGER PRIMARY KEY AUTOINCREMENT,
  date           TEXT NOT NULL,
  location_id    INTEGER NOT NULL REFERENCES locations(location_id),
  temperature    REAL,
  description_id INTEGER REFERENCES weather_descriptions(description_id),
  sunrise        TEXT,
  sunset         TEXT,
  UNIQUE(date, location_id)
);
"#;

pub const CREATE_CHARTS: &str = r#"
CREATE TABLE IF NOT EXISTS charts (
  chart_id   INTEGER PRIMARY KEY AUTOINCREMENT,
  date       TEXT NOT NULL UNIQUE,
  position   INTEGER NOT NULL DEFAULT 1,
  song_title TEXT NOT NULL,
  artist     TEXT NOT NULL
);
"#;

pub const CREATE_PLAYLISTS_META: &str = r#"
CREATE TABLE IF NOT EXISTS spotify_playlists_meta (
  id                INTEGER PRIMARY KEY AUTOINCREMENT,
  spotify_id        TEXT NOT NULL UNIQUE,
  name              TEXT,
  description       TEXT,
  tracks_total      INTEGER,
  owner_name        TEXT,
  approx_created_at TEXT,
  month_added       TEXT
);
"#;

pub const CREATE_TRACKS: &str = r#"
CREATE TABLE IF NOT EXISTS spotify_tracks (
  id         INTEGER PRIMARY KEY AUTOINCREMENT,
  spotify_id TEXT NOT NULL UNIQUE,
  name       TEXT,
  popularity INTEGER,
  valence    REAL NOT NULL,
  energy     REAL NOT NULL
);
"#;

pub const CREATE_PLAYLIST_TRACKS: &str = r#"
CREATE TABLE IF NOT EXISTS spotify_playlist_tracks (
  id                  INTEGER PRIMARY KEY AUTOINCREMENT,
  playlist_spotify_id TEXT NOT NULL,
  track_spotify_id    TEXT NOT NULL,
  added_at            TEXT,
  UNIQUE(playlist_spotify_id, track_spotify_id)
);
"#;

pub const INDEX_WEATHER_DATE: &str =
    "CREATE INDEX IF NOT EXISTS idx_weather_date ON weather(date);";

pub const INDEX_PLAYLISTS_MONTH: &str =
    "CREATE INDEX IF NOT EXISTS idx_playlists_month ON spotify_playlists_meta(month_added);";

/// Tables reported by `status`, in creation order.
pub const TABLES: [&str; 7] = [
    "locations",
    "weather_descriptions",
    "weather",
    "charts",
    "spotify_playlists_meta",
    "spotify_tracks",
    "spotify_playlist_tracks",
];

pub fn schema_statements() -> Vec<&'static str> {
    vec![
        CREATE_LOCATIONS,
        CREATE_WEATHER_DESCRIPTIONS,
        CREATE_WEATHER,
        CREATE_CHARTS,
        CREATE_PLAYLISTS_META,
        CREATE_TRACKS,
        CREATE_PLAYLIST_TRACKS,
        INDEX_WEATHER_DATE,
        INDEX_PLAYLISTS_MONTH,
    ]
}
