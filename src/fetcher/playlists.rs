use crate::db::{Database, PlaylistMetaInput, TrackInput};
use crate::fetcher::FetchSummary;
use crate::fetcher::spotify::{
    AUDIO_FEATURE_BATCH, AudioFeatures, PlaylistSummary, PlaylistTrackItem, StreamingApi,
    TRACK_PAGE_LIMIT,
};
use crate::http::HttpError;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub queries: Vec<String>,
    pub limit: u32,
    pub max_new_playlists: usize,
    pub approx_created: bool,
}

#[derive(Debug, Clone)]
pub struct FeaturedOptions {
    pub limit: u32,
    pub max_new_tracks: usize,
    pub max_track_pages: usize,
}

/// Keyword-search discovery: stores playlist metadata only.
pub fn discover_playlists(
    api: &impl StreamingApi,
    database: &Database,
    options: &SearchOptions,
) -> Result<FetchSummary> {
    let mut summary = FetchSummary::new(options.max_new_playlists);

    for query in &options.queries {
        if summary.cap_reached() {
            break;
        }

        let playlists = match api.search_playlists(query, options.limit) {
            Ok(playlists) => playlists,
            Err(error @ HttpError::Status { .. }) => {
                warn!(query = %query, status = ?error.status(), "playlist search returned no results");
                continue;
            }
            Err(error) => {
                return Err(error).with_context(|| format!("Playlist search failed: {query}"));
            }
        };

        for playlist in &playlists {
            if summary.cap_reached() {
                break;
            }

            let Some(spotify_id) = playlist.id.as_deref().filter(|id| !id.is_empty()) else {
                summary.skipped += 1;
                continue;
            };

            let approx_created_at = if options.approx_created {
                earliest_visible_added_at(api, spotify_id)?
            } else {
                None
            };

            let meta = playlist_meta(spotify_id, playlist, approx_created_at);
            if database.upsert_playlist_meta(&meta)? {
                summary.inserted += 1;
            } else {
                summary.skipped += 1;
                if let Some(created_at) = approx_created_at {
                    database.backfill_playlist_created(spotify_id, created_at)?;
                }
            }
        }
    }

    info!(
        inserted = summary.inserted,
        skipped = summary.skipped,
        "playlist search finished"
    );

    Ok(summary)
}

/// Featured-playlist sync: playlists, their tracks with audio features, and links.
pub fn sync_featured_playlists(
    api: &impl StreamingApi,
    database: &mut Database,
    options: &FeaturedOptions,
) -> Result<FetchSummary> {
    let mut summary = FetchSummary::new(options.max_new_tracks);

    let playlists = match api.featured_playlists(options.limit) {
        Ok(playlists) => playlists,
        Err(error @ HttpError::Status { .. }) => {
            warn!(status = ?error.status(), "featured playlists returned no results");
            return Ok(summary);
        }
        Err(error) => return Err(error).context("Featured playlists request failed"),
    };

    for playlist in &playlists {
        if summary.cap_reached() {
            break;
        }

        let Some(spotify_id) = playlist.id.as_deref().filter(|id| !id.is_empty()) else {
            continue;
        };

        let budget = summary.cap.saturating_sub(summary.inserted);
        let known = database.track_ids()?;

        let items = match collect_playlist_tracks(
            api,
            spotify_id,
            options.max_track_pages,
            budget,
            &known,
        ) {
            Ok(items) => items,
            Err(error @ HttpError::Status { .. }) => {
                warn!(playlist = %spotify_id, status = ?error.status(), "playlist tracks unavailable");
                continue;
            }
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("Playlist tracks request failed: {spotify_id}"));
            }
        };

        let mut fresh_ids = Vec::new();
        for id in items.iter().filter_map(usable_track_id) {
            let id = id.to_string();
            if fresh_ids.len() < budget && !known.contains(&id) && !fresh_ids.contains(&id) {
                fresh_ids.push(id);
            }
        }

        let features = match audio_features_by_id(api, &fresh_ids) {
            Ok(features) => features,
            Err(error @ HttpError::Status { .. }) => {
                warn!(playlist = %spotify_id, status = ?error.status(), "audio features unavailable");
                continue;
            }
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("Audio features request failed: {spotify_id}"));
            }
        };

        let tracks = items
            .iter()
            .filter_map(|item| {
                let id = usable_track_id(item)?;
                if !known.contains(id) && !fresh_ids.iter().any(|fresh| fresh == id) {
                    return None;
                }
                let track = item.track.as_ref()?;
                let feature = features.get(id);
                Some(TrackInput {
                    name: track.name.clone(),
                    popularity: track.popularity,
                    valence: feature.and_then(|feature| feature.valence),
                    energy: feature.and_then(|feature| feature.energy),
                    added_at: item.added_at.clone(),
                    spotify_id: id.to_string(),
                })
            })
            .collect::<Vec<_>>();

        let meta = playlist_meta(spotify_id, playlist, earliest_added_at(&items));
        let outcome = database.sync_playlist_tracks(&meta, &tracks, budget)?;

        debug!(
            playlist = %spotify_id,
            new_tracks = outcome.new_tracks,
            new_links = outcome.new_links,
            skipped = outcome.skipped_tracks,
            "playlist synced"
        );

        summary.inserted += outcome.new_tracks;
        summary.skipped += outcome.skipped_tracks;
    }

    info!(
        inserted = summary.inserted,
        skipped = summary.skipped,
        "featured playlist sync finished"
    );

    Ok(summary)
}

/// Follows `next` cursors until exhausted, `max_pages` pages were read, or
/// `wanted` tracks missing from `known` have been seen.
pub fn collect_playlist_tracks(
    api: &impl StreamingApi,
    playlist_id: &str,
    max_pages: usize,
    wanted: usize,
    known: &HashSet<String>,
) -> Result<Vec<PlaylistTrackItem>, HttpError> {
    let mut items = Vec::new();
    let mut unseen = HashSet::new();
    let mut offset = 0;

    for _ in 0..max_pages.max(1) {
        let page = api.playlist_tracks_page(playlist_id, TRACK_PAGE_LIMIT, offset)?;
        let has_next = page.next.is_some();
        items.extend(page.into_items());

        unseen.extend(
            items
                .iter()
                .filter_map(usable_track_id)
                .filter(|id| !known.contains(*id))
                .map(str::to_string),
        );
        if !has_next || unseen.len() >= wanted {
            break;
        }
        offset += TRACK_PAGE_LIMIT;
    }

    Ok(items)
}

/// Id of a non-local track, if it has one.
fn usable_track_id(item: &PlaylistTrackItem) -> Option<&str> {
    let track = item.track.as_ref().filter(|track| !track.is_local)?;
    track.id.as_deref().filter(|id| !id.is_empty())
}

pub fn audio_features_by_id(
    api: &impl StreamingApi,
    ids: &[String],
) -> Result<HashMap<String, AudioFeatures>, HttpError> {
    let mut features = HashMap::new();

    for batch in ids.chunks(AUDIO_FEATURE_BATCH) {
        features.extend(
            api.audio_features(batch)?
                .into_iter()
                .map(|feature| (feature.id.clone(), feature)),
        );
    }

    Ok(features)
}

/// Oldest `added_at` on the first track page; any lookup failure yields `None`.
fn earliest_visible_added_at(
    api: &impl StreamingApi,
    playlist_id: &str,
) -> Result<Option<DateTime<Utc>>> {
    match api.playlist_tracks_page(playlist_id, TRACK_PAGE_LIMIT, 0) {
        Ok(page) => Ok(earliest_added_at(&page.into_items())),
        Err(HttpError::Status { status, .. }) => {
            debug!(playlist = %playlist_id, status, "could not infer playlist creation date");
            Ok(None)
        }
        Err(error) => Err(error)
            .with_context(|| format!("Playlist tracks request failed: {playlist_id}")),
    }
}

pub fn earliest_added_at(items: &[PlaylistTrackItem]) -> Option<DateTime<Utc>> {
    items
        .iter()
        .filter_map(|item| item.added_at.as_deref())
        .filter_map(parse_added_at)
        .min()
}

pub fn parse_added_at(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|timestamp| timestamp.with_timezone(&Utc))
}

fn playlist_meta(
    spotify_id: &str,
    playlist: &PlaylistSummary,
    approx_created_at: Option<DateTime<Utc>>,
) -> PlaylistMetaInput {
    PlaylistMetaInput {
        spotify_id: spotify_id.to_string(),
        name: playlist.name.clone(),
        description: playlist.description.clone().unwrap_or_default(),
        tracks_total: playlist.tracks.as_ref().and_then(|tracks| tracks.total),
        owner_name: playlist
            .owner
            .as_ref()
            .and_then(|owner| owner.display_name.clone())
            .unwrap_or_default(),
        approx_created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::spotify::{TrackObject, TrackPage};
    use std::cell::RefCell;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeSpotify {
        search: HashMap<String, Vec<PlaylistSummary>>,
        failing_queries: HashSet<String>,
        featured_fails: bool,
        featured: Vec<PlaylistSummary>,
        pages: HashMap<String, Vec<TrackPage>>,
        features: HashMap<String, AudioFeatures>,
        failing_features: HashSet<String>,
        feature_batches: RefCell<Vec<usize>>,
        page_requests: RefCell<Vec<(String, u32)>>,
    }

    impl StreamingApi for FakeSpotify {
        fn search_playlists(
            &self,
            query: &str,
            _limit: u32,
        ) -> Result<Vec<PlaylistSummary>, HttpError> {
            if self.failing_queries.contains(query) {
                return Err(HttpError::Status {
                    status: 502,
                    body: "bad gateway".to_string(),
                });
            }
            Ok(self.search.get(query).cloned().unwrap_or_default())
        }

        fn featured_playlists(&self, _limit: u32) -> Result<Vec<PlaylistSummary>, HttpError> {
            if self.featured_fails {
                return Err(HttpError::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            Ok(self.featured.clone())
        }

        fn playlist_tracks_page(
            &self,
            playlist_id: &str,
            limit: u32,
            offset: u32,
        ) -> Result<TrackPage, HttpError> {
            self.page_requests
                .borrow_mut()
                .push((playlist_id.to_string(), offset));

            self.pages
                .get(playlist_id)
                .and_then(|pages| pages.get((offset / limit) as usize))
                .cloned()
                .ok_or(HttpError::Status {
                    status: 404,
                    body: "not found".to_string(),
                })
        }

        fn audio_features(&self, ids: &[String]) -> Result<Vec<AudioFeatures>, HttpError> {
            assert!(ids.len() <= AUDIO_FEATURE_BATCH);
            self.feature_batches.borrow_mut().push(ids.len());
            if ids.iter().any(|id| self.failing_features.contains(id)) {
                return Err(HttpError::Status {
                    status: 429,
                    body: "rate limited".to_string(),
                });
            }
            Ok(ids
                .iter()
                .filter_map(|id| self.features.get(id).cloned())
                .collect())
        }
    }

    fn playlist(id: &str, name: &str) -> PlaylistSummary {
        PlaylistSummary {
            id: Some(id.to_string()),
            name: Some(name.to_string()),
            ..PlaylistSummary::default()
        }
    }

    fn item(track_id: &str, added_at: &str) -> PlaylistTrackItem {
        PlaylistTrackItem {
            added_at: Some(added_at.to_string()),
            track: Some(TrackObject {
                id: Some(track_id.to_string()),
                name: Some(format!("Song {track_id}")),
                popularity: Some(50),
                is_local: false,
            }),
        }
    }

    fn page(items: Vec<PlaylistTrackItem>, has_next: bool) -> TrackPage {
        TrackPage {
            items: Some(items),
            next: has_next.then(|| "next".to_string()),
        }
    }

    fn feature(id: &str) -> (String, AudioFeatures) {
        (
            id.to_string(),
            AudioFeatures {
                id: id.to_string(),
                valence: Some(0.6),
                energy: Some(0.5),
            },
        )
    }

    fn open_temp() -> (TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let database = Database::open(&dir.path().join("spotify.db")).unwrap();
        (dir, database)
    }

    fn search_options(max: usize) -> SearchOptions {
        SearchOptions {
            queries: vec!["summer".to_string(), "winter".to_string()],
            limit: 20,
            max_new_playlists: max,
            approx_created: false,
        }
    }

    #[test]
    fn search_is_capped_and_idempotent() {
        let (_dir, database) = open_temp();
        let mut api = FakeSpotify::default();
        api.search.insert(
            "summer".to_string(),
            (0..3).map(|i| playlist(&format!("s{i}"), "Summer")).collect(),
        );
        api.search.insert(
            "winter".to_string(),
            (0..3).map(|i| playlist(&format!("w{i}"), "Winter")).collect(),
        );

        let first = discover_playlists(&api, &database, &search_options(4)).unwrap();
        let second = discover_playlists(&api, &database, &search_options(4)).unwrap();
        let third = discover_playlists(&api, &database, &search_options(4)).unwrap();

        assert_eq!(first.inserted, 4);
        assert_eq!(second.inserted, 2);
        assert_eq!(third.inserted, 0);
    }

    #[test]
    fn failing_query_continues_with_next() {
        let (_dir, database) = open_temp();
        let mut api = FakeSpotify::default();
        api.failing_queries.insert("summer".to_string());
        api.search
            .insert("winter".to_string(), vec![playlist("w1", "Snow Day"), PlaylistSummary::default()]);

        let summary = discover_playlists(&api, &database, &search_options(25)).unwrap();

        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn approx_created_backfills_existing_rows() {
        let (_dir, database) = open_temp();
        let mut api = FakeSpotify::default();
        api.search
            .insert("winter".to_string(), vec![playlist("w1", "Snow Day")]);

        discover_playlists(&api, &database, &search_options(25)).unwrap();
        assert!(database.playlist_months().unwrap().is_empty());

        api.pages.insert(
            "w1".to_string(),
            vec![page(
                vec![
                    item("t1", "2023-12-05T10:00:00Z"),
                    item("t2", "2023-11-20T10:00:00Z"),
                    item("t3", "garbage"),
                ],
                false,
            )],
        );
        let mut options = search_options(25);
        options.approx_created = true;
        discover_playlists(&api, &database, &options).unwrap();

        let months = database.playlist_months().unwrap();
        assert_eq!(months.len(), 1);
        assert_eq!(months[0].month_added, "2023-11");
    }

    fn featured_options(max_new_tracks: usize) -> FeaturedOptions {
        FeaturedOptions {
            limit: 10,
            max_new_tracks,
            max_track_pages: 10,
        }
    }

    fn two_page_featured() -> FakeSpotify {
        let mut api = FakeSpotify::default();
        api.featured = vec![playlist("p1", "Hot Hits"), playlist("p2", "Cold Nights")];

        let first_page = (0..100)
            .map(|i| item(&format!("a{i}"), "2024-06-01T00:00:00Z"))
            .collect();
        let second_page = (0..20)
            .map(|i| item(&format!("b{i}"), "2024-05-01T00:00:00Z"))
            .collect();
        api.pages.insert(
            "p1".to_string(),
            vec![page(first_page, true), page(second_page, false)],
        );
        api.pages.insert(
            "p2".to_string(),
            vec![page(vec![item("c0", "2024-01-01T00:00:00Z")], false)],
        );
        api.features = (0..100)
            .map(|i| feature(&format!("a{i}")))
            .chain((0..20).map(|i| feature(&format!("b{i}"))))
            .chain(std::iter::once(feature("c0")))
            .collect();
        api
    }

    #[test]
    fn small_budget_stops_paging_and_feature_lookups_early() {
        let (_dir, mut database) = open_temp();
        let api = two_page_featured();

        let summary = sync_featured_playlists(&api, &mut database, &featured_options(25)).unwrap();

        assert_eq!(summary.inserted, 25);
        assert_eq!(summary.skipped, 0);
        assert_eq!(*api.feature_batches.borrow(), vec![25]);
        assert_eq!(*api.page_requests.borrow(), vec![("p1".to_string(), 0)]);
        assert_eq!(database.track_ids().unwrap().len(), 25);
        assert_eq!(database.playlist_months().unwrap()[0].month_added, "2024-06");
    }

    #[test]
    fn large_budget_pages_batches_and_reruns_without_lookups() {
        let (_dir, mut database) = open_temp();
        let api = two_page_featured();

        let summary =
            sync_featured_playlists(&api, &mut database, &featured_options(200)).unwrap();

        assert_eq!(summary.inserted, 121);
        assert_eq!(*api.feature_batches.borrow(), vec![100, 20, 1]);
        assert_eq!(
            *api.page_requests.borrow(),
            vec![
                ("p1".to_string(), 0),
                ("p1".to_string(), 100),
                ("p2".to_string(), 0)
            ]
        );
        let months = database.playlist_months().unwrap();
        assert!(months.iter().any(|row| row.month_added == "2024-05"));
        assert!(months.iter().any(|row| row.month_added == "2024-01"));

        let rerun = sync_featured_playlists(&api, &mut database, &featured_options(200)).unwrap();

        assert_eq!(rerun.inserted, 0);
        assert_eq!(rerun.skipped, 0);
        assert_eq!(api.feature_batches.borrow().len(), 3);
    }

    #[test]
    fn featured_status_error_yields_empty_summary() {
        let (_dir, mut database) = open_temp();
        let mut api = two_page_featured();
        api.featured_fails = true;

        let summary = sync_featured_playlists(&api, &mut database, &featured_options(25)).unwrap();

        assert_eq!(summary, FetchSummary::new(25));
        assert!(api.page_requests.borrow().is_empty());
        assert!(database.track_ids().unwrap().is_empty());
    }

    #[test]
    fn feature_status_error_skips_only_that_playlist() {
        let (_dir, mut database) = open_temp();
        let mut api = FakeSpotify::default();
        api.featured = vec![playlist("p1", "Hot Hits"), playlist("p2", "Cold Nights")];
        api.pages.insert(
            "p1".to_string(),
            vec![page(vec![item("t1", "2024-06-01T00:00:00Z")], false)],
        );
        api.pages.insert(
            "p2".to_string(),
            vec![page(vec![item("t2", "2024-01-01T00:00:00Z")], false)],
        );
        api.features = HashMap::from([feature("t1"), feature("t2")]);
        api.failing_features.insert("t1".to_string());

        let summary = sync_featured_playlists(&api, &mut database, &featured_options(25)).unwrap();

        assert_eq!(summary.inserted, 1);
        assert_eq!(database.track_ids().unwrap(), HashSet::from(["t2".to_string()]));
        let months = database.playlist_months().unwrap();
        assert_eq!(months.len(), 1);
        assert_eq!(months[0].name.as_deref(), Some("Cold Nights"));
    }

    #[test]
    fn tracks_without_features_are_skipped() {
        let (_dir, mut database) = open_temp();
        let mut api = FakeSpotify::default();
        api.featured = vec![playlist("p1", "Mixed")];
        api.pages.insert(
            "p1".to_string(),
            vec![page(
                vec![
                    item("t1", "2024-02-01T00:00:00Z"),
                    item("t2", "2024-02-02T00:00:00Z"),
                    PlaylistTrackItem {
                        added_at: None,
                        track: None,
                    },
                ],
                false,
            )],
        );
        api.features = HashMap::from([feature("t1")]);
        api.features.insert(
            "t2".to_string(),
            AudioFeatures {
                id: "t2".to_string(),
                valence: None,
                energy: Some(0.9),
            },
        );

        let options = FeaturedOptions {
            limit: 10,
            max_new_tracks: 25,
            max_track_pages: 10,
        };
        let summary = sync_featured_playlists(&api, &mut database, &options).unwrap();

        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn missing_track_pages_skip_the_playlist() {
        let (_dir, mut database) = open_temp();
        let mut api = FakeSpotify::default();
        api.featured = vec![playlist("gone", "Deleted"), playlist("p1", "Rainy")];
        api.pages.insert(
            "p1".to_string(),
            vec![page(vec![item("t1", "2024-03-01T00:00:00Z")], false)],
        );
        api.features = HashMap::from([feature("t1")]);

        let options = FeaturedOptions {
            limit: 10,
            max_new_tracks: 25,
            max_track_pages: 10,
        };
        let summary = sync_featured_playlists(&api, &mut database, &options).unwrap();

        assert_eq!(summary.inserted, 1);
        assert_eq!(database.playlist_months().unwrap().len(), 1);
    }

    #[test]
    fn malformed_timestamps_become_none() {
        assert!(parse_added_at("2024-01-01T12:00:00Z").is_some());
        assert!(parse_added_at("01/01/2024").is_none());
        assert!(earliest_added_at(&[item("t1", "")]).is_none());
    }
}
