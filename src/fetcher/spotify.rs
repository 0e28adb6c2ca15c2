use crate::http::{HttpClient, HttpError};
use anyhow::{Context, Result};
use serde::Deserialize;

pub const TRACK_PAGE_LIMIT: u32 = 100;
pub const AUDIO_FEATURE_BATCH: usize = 100;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistsEnvelope {
    playlists: Option<Paging<Option<PlaylistSummary>>>,
}

#[derive(Debug, Deserialize)]
struct AudioFeaturesEnvelope {
    #[serde(default)]
    audio_features: Vec<Option<AudioFeatures>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Paging<T> {
    pub items: Option<Vec<T>>,
    pub next: Option<String>,
}

impl<T> Paging<T> {
    pub fn into_items(self) -> Vec<T> {
        self.items.unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaylistSummary {
    pub id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub tracks: Option<TracksRef>,
    pub owner: Option<Owner>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TracksRef {
    pub total: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Owner {
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaylistTrackItem {
    pub added_at: Option<String>,
    pub track: Option<TrackObject>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackObject {
    pub id: Option<String>,
    pub name: Option<String>,
    pub popularity: Option<i64>,
    #[serde(default)]
    pub is_local: bool,
}

pub type TrackPage = Paging<PlaylistTrackItem>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AudioFeatures {
    pub id: String,
    pub valence: Option<f64>,
    pub energy: Option<f64>,
}

/// Read-only slice of the Spotify Web API used by the playlist fetchers.
pub trait StreamingApi {
    fn search_playlists(&self, query: &str, limit: u32) -> Result<Vec<PlaylistSummary>, HttpError>;

    fn featured_playlists(&self, limit: u32) -> Result<Vec<PlaylistSummary>, HttpError>;

    fn playlist_tracks_page(
        &self,
        playlist_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<TrackPage, HttpError>;

    /// `ids` must hold at most [`AUDIO_FEATURE_BATCH`] entries.
    fn audio_features(&self, ids: &[String]) -> Result<Vec<AudioFeatures>, HttpError>;
}

pub struct SpotifyClient {
    http: HttpClient,
    api_url: String,
    market: String,
    token: String,
}

impl SpotifyClient {
    /// Exchanges client credentials for a bearer token.
    pub fn connect(
        http: HttpClient,
        accounts_url: &str,
        api_url: &str,
        market: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Self> {
        let token_url = format!("{}/api/token", accounts_url.trim_end_matches('/'));
        let token: TokenResponse = http
            .post_form_basic(
                &token_url,
                client_id,
                client_secret,
                &[("grant_type", "client_credentials")],
            )
            .context("Spotify token request failed")?;

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            market: market.to_string(),
            token: token.access_token,
        })
    }

    fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, HttpError> {
        self.http
            .get_json(&format!("{}{path}", self.api_url), query, Some(&self.token))
    }
}

impl StreamingApi for SpotifyClient {
    fn search_playlists(&self, query: &str, limit: u32) -> Result<Vec<PlaylistSummary>, HttpError> {
        let envelope: PlaylistsEnvelope = self.get(
            "/search",
            &[
                ("q", query.to_string()),
                ("type", "playlist".to_string()),
                ("limit", limit.to_string()),
                ("market", self.market.clone()),
            ],
        )?;

        Ok(flatten_playlists(envelope))
    }

    fn featured_playlists(&self, limit: u32) -> Result<Vec<PlaylistSummary>, HttpError> {
        let envelope: PlaylistsEnvelope = self.get(
            "/browse/featured-playlists",
            &[
                ("limit", limit.to_string()),
                ("country", self.market.clone()),
            ],
        )?;

        Ok(flatten_playlists(envelope))
    }

    fn playlist_tracks_page(
        &self,
        playlist_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<TrackPage, HttpError> {
        self.get(
            &format!("/playlists/{playlist_id}/tracks"),
            &[
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
                ("market", self.market.clone()),
            ],
        )
    }

    fn audio_features(&self, ids: &[String]) -> Result<Vec<AudioFeatures>, HttpError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let envelope: AudioFeaturesEnvelope =
            self.get("/audio-features", &[("ids", ids.join(","))])?;

        Ok(envelope.audio_features.into_iter().flatten().collect())
    }
}

fn flatten_playlists(envelope: PlaylistsEnvelope) -> Vec<PlaylistSummary> {
    envelope
        .playlists
        .map(Paging::into_items)
        .unwrap_or_default()
        .into_iter()
        .flatten()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_response_drops_null_playlists() {
        let raw = r#"{
            "playlists": {
                "items": [
                    null,
                    {"id": "p1", "name": "Winter Chill", "tracks": {"total": 40}, "owner": {"display_name": "Spotify"}},
                    {"id": "p2", "name": "Beach Party", "description": null, "owner": null}
                ],
                "next": null
            }
        }"#;

        let envelope: PlaylistsEnvelope = serde_json::from_str(raw).unwrap();
        let playlists = flatten_playlists(envelope);

        assert_eq!(playlists.len(), 2);
        assert_eq!(playlists[0].tracks.as_ref().and_then(|t| t.total), Some(40));
        assert!(playlists[1].owner.is_none());
    }

    #[test]
    fn missing_or_null_items_are_empty() {
        let no_playlists: PlaylistsEnvelope = serde_json::from_str("{}").unwrap();
        let null_items: PlaylistsEnvelope =
            serde_json::from_str(r#"{"playlists": {"items": null}}"#).unwrap();

        assert!(flatten_playlists(no_playlists).is_empty());
        assert!(flatten_playlists(null_items).is_empty());
    }

    #[test]
    fn track_page_parses_local_and_null_tracks() {
        let raw = r#"{
            "items": [
                {"added_at": "2023-11-02T09:00:00Z", "track": {"id": "t1", "name": "Snow", "popularity": 55}},
                {"added_at": "2023-11-03T09:00:00Z", "track": null},
                {"added_at": null, "track": {"id": null, "name": "demo.mp3", "is_local": true}}
            ],
            "next": "https://api.spotify.com/v1/playlists/p1/tracks?offset=100&limit=100"
        }"#;

        let page: TrackPage = serde_json::from_str(raw).unwrap();

        assert!(page.next.is_some());
        let items = page.into_items();
        assert_eq!(items.len(), 3);
        assert!(items[1].track.is_none());
        assert!(items[2].track.as_ref().is_some_and(|track| track.is_local));
    }

    #[test]
    fn audio_features_skip_null_entries() {
        let raw = r#"{"audio_features": [{"id": "t1", "valence": 0.3, "energy": 0.8}, null]}"#;
        let envelope: AudioFeaturesEnvelope = serde_json::from_str(raw).unwrap();
        let features = envelope
            .audio_features
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();

        assert_eq!(features.len(), 1);
        assert_eq!(features[0].valence, Some(0.3));
    }
}
