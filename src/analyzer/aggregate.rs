use crate::analyzer::theme::{Season, ThemeRules};
use crate::db::{ChartRow, PlaylistMonthRow, WeatherSample};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

const LABEL_MAX_CHARS: usize = 25;
const LABEL_KEEP_CHARS: usize = 22;

/// Playlist counts keyed by `YYYY-MM`, then by season.
pub type ThemeCounts = BTreeMap<String, BTreeMap<Season, u32>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyTemperature {
    pub month: String,
    pub avg_temp: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySunset {
    pub month: String,
    pub avg_sunset_minutes: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemperatureThemeRow {
    pub month: String,
    pub avg_temp: Option<f64>,
    pub winter: u32,
    pub summer: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthThemeRow {
    pub month: String,
    pub calendar_season: Option<Season>,
    pub winter: u32,
    pub summer: u32,
    pub spring: u32,
    pub fall: u32,
    pub other: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SongStat {
    pub song_title: String,
    pub artist: String,
    pub days_at_one: u32,
    pub avg_temp_at_one: Option<f64>,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SunsetBin {
    Early,
    Medium,
    Late,
}

impl SunsetBin {
    pub const ALL: [Self; 3] = [Self::Early, Self::Medium, Self::Late];

    pub fn label(self) -> &'static str {
        match self {
            Self::Early => "Early Sunset (Short Days)",
            Self::Medium => "Medium Sunset",
            Self::Late => "Late Sunset (Long Days)",
        }
    }

    /// Right-inclusive bins over minutes after midnight: (0,1000], (1000,1100], (1100,1400].
    pub fn from_minutes(minutes: f64) -> Option<Self> {
        match minutes {
            m if m > 0.0 && m <= 1000.0 => Some(Self::Early),
            m if m > 1000.0 && m <= 1100.0 => Some(Self::Medium),
            m if m > 1100.0 && m <= 1400.0 => Some(Self::Late),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SunsetThemeRow {
    pub sunset_bin: String,
    pub winter: u32,
    pub summer: u32,
    pub fall: u32,
    pub other: u32,
}

pub fn month_of(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

/// Every month with a weather row is kept; months without any temperature average to `None`.
pub fn monthly_temperature(samples: &[WeatherSample]) -> Vec<MonthlyTemperature> {
    monthly_mean(
        samples
            .iter()
            .map(|sample| (month_of(sample.date), sample.temperature)),
    )
    .into_iter()
    .map(|(month, avg_temp)| MonthlyTemperature { month, avg_temp })
    .collect()
}

pub fn monthly_sunset(samples: &[WeatherSample]) -> Vec<MonthlySunset> {
    monthly_mean(samples.iter().map(|sample| {
        let minutes = sample.sunset.as_deref().and_then(sunset_minutes);
        (month_of(sample.date), minutes.map(f64::from))
    }))
    .into_iter()
    .filter_map(|(month, mean)| {
        mean.map(|avg_sunset_minutes| MonthlySunset {
            month,
            avg_sunset_minutes,
        })
    })
    .collect()
}

/// `HH:MM[:SS]` to minutes after midnight; seconds are dropped.
pub fn sunset_minutes(raw: &str) -> Option<u32> {
    let mut parts = raw.trim().split(':');
    let hours = parts.next()?.parse::<u32>().ok()?;
    let minutes = parts.next()?.parse::<u32>().ok()?;

    if let Some(seconds) = parts.next() {
        seconds.parse::<u32>().ok()?;
    }
    if parts.next().is_some() || hours > 23 || minutes > 59 {
        return None;
    }

    Some(hours * 60 + minutes)
}

fn monthly_mean(
    values: impl Iterator<Item = (String, Option<f64>)>,
) -> BTreeMap<String, Option<f64>> {
    values
        .fold(BTreeMap::new(), |mut acc, (month, value)| {
            let entry: &mut (f64, u32) = acc.entry(month).or_insert((0.0, 0));
            if let Some(value) = value {
                entry.0 += value;
                entry.1 += 1;
            }
            acc
        })
        .into_iter()
        .map(|(month, (sum, count))| (month, (count > 0).then(|| sum / f64::from(count))))
        .collect()
}

/// Names the rules cannot classify are dropped.
pub fn theme_counts_by_month(playlists: &[PlaylistMonthRow], rules: &ThemeRules) -> ThemeCounts {
    playlists.iter().fold(ThemeCounts::new(), |mut acc, playlist| {
        let season = playlist
            .name
            .as_deref()
            .and_then(|name| rules.classify(name));

        if let Some(season) = season {
            *acc.entry(playlist.month_added.clone())
                .or_default()
                .entry(season)
                .or_insert(0) += 1;
        }
        acc
    })
}

fn count_for(counts: &ThemeCounts, month: &str, season: Season) -> u32 {
    counts
        .get(month)
        .and_then(|seasons| seasons.get(&season))
        .copied()
        .unwrap_or_default()
}

/// Left join on month: every weather month is kept, missing counts become zero.
pub fn merge_temperature_themes(
    temperatures: &[MonthlyTemperature],
    counts: &ThemeCounts,
) -> Vec<TemperatureThemeRow> {
    temperatures
        .iter()
        .map(|row| TemperatureThemeRow {
            month: row.month.clone(),
            avg_temp: row.avg_temp,
            winter: count_for(counts, &row.month, Season::Winter),
            summer: count_for(counts, &row.month, Season::Summer),
        })
        .collect()
}

/// Keeps the last `months` rows of a month-ascending series.
pub fn most_recent<T>(mut rows: Vec<T>, months: usize) -> Vec<T> {
    let skip = rows.len().saturating_sub(months);
    rows.drain(..skip);
    rows
}

pub fn theme_rows_since(counts: &ThemeCounts, since: &str) -> Vec<MonthThemeRow> {
    counts
        .keys()
        .filter(|month| month.as_str() >= since)
        .map(|month| MonthThemeRow {
            month: month.clone(),
            calendar_season: Season::from_month_key(month),
            winter: count_for(counts, month, Season::Winter),
            summer: count_for(counts, month, Season::Summer),
            spring: count_for(counts, month, Season::Spring),
            fall: count_for(counts, month, Season::Fall),
            other: count_for(counts, month, Season::Other),
        })
        .collect()
}

/// Days at number one per song, with the mean temperature of those days.
pub fn song_longevity(charts: &[ChartRow], weather: &[WeatherSample]) -> Vec<SongStat> {
    let daily_temperature = weather
        .iter()
        .filter_map(|sample| sample.temperature.map(|temp| (sample.date, temp)))
        .fold(HashMap::new(), |mut acc, (date, temp)| {
            let entry: &mut (f64, u32) = acc.entry(date).or_insert((0.0, 0));
            entry.0 += temp;
            entry.1 += 1;
            acc
        });

    let grouped = charts
        .iter()
        .filter(|entry| entry.position == 1)
        .fold(BTreeMap::new(), |mut acc, entry| {
            let stat: &mut (u32, f64, u32) = acc
                .entry((entry.song_title.clone(), entry.artist.clone()))
                .or_insert((0, 0.0, 0));
            stat.0 += 1;
            if let Some((sum, count)) = daily_temperature.get(&entry.date) {
                stat.1 += sum / f64::from(*count);
                stat.2 += 1;
            }
            acc
        });

    let mut stats = grouped
        .into_iter()
        .map(|((song_title, artist), (days, temp_sum, temp_days))| SongStat {
            label: short_label(&song_title, &artist),
            song_title,
            artist,
            days_at_one: days,
            avg_temp_at_one: (temp_days > 0).then(|| temp_sum / f64::from(temp_days)),
        })
        .collect::<Vec<_>>();

    stats.sort_by(|left, right| {
        right
            .days_at_one
            .cmp(&left.days_at_one)
            .then_with(|| left.song_title.cmp(&right.song_title))
    });
    stats
}

pub fn short_label(title: &str, artist: &str) -> String {
    let label = format!("{title} - {artist}");

    if label.chars().count() <= LABEL_MAX_CHARS {
        label
    } else {
        let head = label.chars().take(LABEL_KEEP_CHARS).collect::<String>();
        format!("{head}...")
    }
}

/// Sums per-month theme counts into sunset-length bins; every bin is reported.
pub fn sunset_theme_bins(sunsets: &[MonthlySunset], counts: &ThemeCounts) -> Vec<SunsetThemeRow> {
    let mut bins = SunsetBin::ALL
        .iter()
        .map(|bin| (*bin, [0_u32; 4]))
        .collect::<BTreeMap<_, _>>();

    for month in sunsets {
        let Some(bin) = SunsetBin::from_minutes(month.avg_sunset_minutes) else {
            continue;
        };

        let totals = bins.entry(bin).or_insert([0; 4]);
        for (slot, season) in [Season::Winter, Season::Summer, Season::Fall, Season::Other]
            .into_iter()
            .enumerate()
        {
            totals[slot] += count_for(counts, &month.month, season);
        }
    }

    bins.into_iter()
        .map(|(bin, [winter, summer, fall, other])| SunsetThemeRow {
            sunset_bin: bin.label().to_string(),
            winter,
            summer,
            fall,
            other,
        })
        .collect()
}
