pub mod charts;
pub mod playlists;
pub mod spotify;
pub mod weather;

use std::fmt;

/// Result of one fetcher run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub inserted: usize,
    pub skipped: usize,
    pub cap: usize,
}

impl FetchSummary {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            ..Self::default()
        }
    }

    pub fn cap_reached(&self) -> bool {
        self.inserted >= self.cap
    }
}

impl fmt::Display for FetchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "inserted {} (cap {}), skipped {}",
            self.inserted, self.cap, self.skipped
        )
    }
}
