use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

const FOUR_SEASON_RULES: &[(Season, &[&str])] = &[
    (
        Season::Winter,
        &["winter", "snow", "cold", "christmas", "holiday", "ski", "traditional"],
    ),
    (Season::Summer, &["summer", "beach", "sun", "hot", "warm", "house"]),
    (
        Season::Fall,
        &["fall", "autumn", "rain", "chill", "coffee", "indie", "folk"],
    ),
    (
        Season::Spring,
        &["spring", "flowers", "rainy", "sunshine", "bloom", "easter", "pastel"],
    ),
];

const TWO_SEASON_RULES: &[(Season, &[&str])] = &[
    (
        Season::Winter,
        &["winter", "holiday", "christmas", "snow", "cold", "fall", "season"],
    ),
    (Season::Summer, &["summer", "hot", "beach", "sun", "warm"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Winter,
    Summer,
    Fall,
    Spring,
    Other,
}

impl Season {
    pub fn label(self) -> &'static str {
        match self {
            Self::Winter => "winter",
            Self::Summer => "summer",
            Self::Fall => "fall",
            Self::Spring => "spring",
            Self::Other => "other",
        }
    }

    /// Meteorological season of a calendar month (1-12).
    pub fn from_month(month: u32) -> Option<Self> {
        match month {
            12 | 1 | 2 => Some(Self::Winter),
            3..=5 => Some(Self::Spring),
            6..=8 => Some(Self::Summer),
            9..=11 => Some(Self::Fall),
            _ => None,
        }
    }

    /// Season of a `YYYY-MM` month key.
    pub fn from_month_key(month_key: &str) -> Option<Self> {
        month_key
            .get(5..7)
            .and_then(|month| month.parse::<u32>().ok())
            .and_then(Self::from_month)
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeRule {
    pub season: Season,
    pub keywords: Vec<String>,
}

/// Ordered keyword rules; the first season with a matching keyword wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeRules {
    pub rules: Vec<ThemeRule>,
    #[serde(default)]
    pub fallback: Option<Season>,
}

impl Default for ThemeRules {
    fn default() -> Self {
        Self::new(FOUR_SEASON_RULES, Some(Season::Other))
    }
}

impl ThemeRules {
    pub fn new(rules: &[(Season, &[&str])], fallback: Option<Season>) -> Self {
        let rules = rules
            .iter()
            .map(|(season, keywords)| ThemeRule {
                season: *season,
                keywords: keywords.iter().map(|keyword| keyword.to_string()).collect(),
            })
            .collect();

        Self { rules, fallback }.normalized()
    }

    /// Winter/summer only, no fallback.
    pub fn two_season() -> Self {
        Self::new(TWO_SEASON_RULES, None)
    }

    /// Default rules without spring; unmatched names fall back to `Other`.
    pub fn three_season() -> Self {
        Self::default().without(Season::Spring)
    }

    pub fn without(mut self, season: Season) -> Self {
        self.rules.retain(|rule| rule.season != season);
        self
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read themes file: {}", path.display()))?;
        let parsed: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse themes file: {}", path.display()))?;

        if parsed.rules.is_empty() {
            bail!("Themes file has no rules: {}", path.display());
        }

        Ok(parsed.normalized())
    }

    pub fn classify(&self, name: &str) -> Option<Season> {
        let normalized = name.to_lowercase();

        self.rules
            .iter()
            .find(|rule| {
                rule.keywords
                    .iter()
                    .any(|keyword| normalized.contains(keyword.as_str()))
            })
            .map(|rule| rule.season)
            .or(self.fallback)
    }

    fn normalized(self) -> Self {
        let rules = self
            .rules
            .into_iter()
            .map(|rule| ThemeRule {
                season: rule.season,
                keywords: rule
                    .keywords
                    .into_iter()
                    .map(|keyword| keyword.trim().to_lowercase())
                    .filter(|keyword| !keyword.is_empty())
                    .collect(),
            })
            .collect();

        Self {
            rules,
            fallback: self.fallback,
        }
    }
}
