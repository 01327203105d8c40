use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sgsync_models::{
    EpisodeFlagChange, EpisodeNumber, LastActivity, MovieFlagChange, RemoteMovie, RemoteSeasonFlags, RemoteShowFlags,
};
use std::collections::BTreeMap;
use tracing::{debug, warn};
use crate::error::{RemoteError, RemoteResult};

pub const DEFAULT_BASE_URL: &str = "https://api.trakt.tv";

/// Everything needed to sign a request.
pub struct Endpoint<'a> {
    pub client: &'a Client,
    pub base_url: &'a str,
    pub access_token: &'a str,
    pub client_id: &'a str,
}

impl Endpoint<'_> {
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Bearer {}", self.access_token))
            .header("trakt-api-version", "2")
            .header("trakt-api-key", self.client_id)
            .header("Content-Type", "application/json")
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> RemoteResult<T> {
        let response = self.request(Method::GET, path).send().await?;
        let response = check_status(response, path).await?;
        response.json::<T>().await.map_err(|e| RemoteError::Malformed(format!("{}: {}", path, e)))
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> RemoteResult<()> {
        let response = self.request(Method::POST, path).json(body).send().await?;
        check_status(response, path).await?;
        Ok(())
    }
}

async fn check_status(response: Response, path: &str) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error_text = response.text().await.unwrap_or_default();
    warn!(
        operation = "trakt_request",
        path = path,
        status = status.as_u16(),
        "trakt request failed"
    );
    Err(RemoteError::from_status(status.as_u16(), error_text))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraktIds {
    pub trakt: Option<u64>,
    pub tvdb: Option<u32>,
    pub tmdb: Option<u32>,
    pub imdb: Option<String>,
    pub slug: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TraktShow {
    title: Option<String>,
    ids: TraktIds,
}

#[derive(Debug, Deserialize)]
struct TraktMovie {
    title: Option<String>,
    ids: TraktIds,
}

#[derive(Debug, Deserialize)]
struct TraktEpisodeNumber {
    number: u32,
}

#[derive(Debug, Deserialize)]
struct TraktSeason {
    number: u32,
    #[serde(default)]
    episodes: Vec<TraktEpisodeNumber>,
}

#[derive(Debug, Deserialize)]
struct TraktFlaggedShow {
    last_watched_at: Option<DateTime<Utc>>,
    show: TraktShow,
    #[serde(default)]
    seasons: Vec<TraktSeason>,
}

#[derive(Debug, Deserialize)]
struct TraktMovieEntry {
    movie: TraktMovie,
}

#[derive(Debug, Default, Deserialize)]
struct TraktActivityTimes {
    watched_at: Option<DateTime<Utc>>,
    collected_at: Option<DateTime<Utc>>,
    watchlisted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct TraktLastActivities {
    #[serde(default)]
    episodes: TraktActivityTimes,
    #[serde(default)]
    movies: TraktActivityTimes,
}

#[derive(Debug, Deserialize)]
struct TraktSearchResult {
    show: Option<TraktShow>,
}

fn to_remote_show(item: TraktFlaggedShow) -> RemoteShowFlags {
    RemoteShowFlags {
        show_id: item.show.ids.tvdb,
        trakt_id: item.show.ids.trakt,
        title: item.show.title,
        last_watched_at: item.last_watched_at,
        seasons: item
            .seasons
            .into_iter()
            .map(|season| RemoteSeasonFlags {
                number: season.number,
                episodes: season.episodes.into_iter().map(|e| e.number).collect(),
            })
            .collect(),
    }
}

fn to_remote_movie(entry: TraktMovieEntry) -> RemoteMovie {
    RemoteMovie {
        tmdb_id: entry.movie.ids.tmdb,
        trakt_id: entry.movie.ids.trakt,
        imdb_id: entry.movie.ids.imdb,
        title: entry.movie.title,
    }
}

pub async fn get_last_activities(endpoint: &Endpoint<'_>) -> RemoteResult<LastActivity> {
    let activities: TraktLastActivities = endpoint.get_json("/sync/last_activities").await?;
    Ok(LastActivity {
        episodes_watched_at: activities.episodes.watched_at,
        episodes_collected_at: activities.episodes.collected_at,
        movies_watched_at: activities.movies.watched_at,
        movies_collected_at: activities.movies.collected_at,
        movies_watchlisted_at: activities.movies.watchlisted_at,
    })
}

/// `kind_path` is `watched` or `collection`.
pub async fn get_flagged_shows(endpoint: &Endpoint<'_>, kind_path: &str) -> RemoteResult<Vec<RemoteShowFlags>> {
    let path = format!("/sync/{}/shows", kind_path);
    let items: Vec<TraktFlaggedShow> = endpoint.get_json(&path).await?;
    debug!("trakt returned {} shows for {}", items.len(), path);
    Ok(items.into_iter().map(to_remote_show).collect())
}

/// `list_path` is `collection`, `watchlist` or `watched`.
pub async fn get_movies(endpoint: &Endpoint<'_>, list_path: &str) -> RemoteResult<Vec<RemoteMovie>> {
    let path = format!("/sync/{}/movies", list_path);
    let items: Vec<TraktMovieEntry> = endpoint.get_json(&path).await?;
    debug!("trakt returned {} movies for {}", items.len(), path);
    Ok(items.into_iter().map(to_remote_movie).collect())
}

pub async fn search_show_by_tvdb_id(endpoint: &Endpoint<'_>, tvdb_id: u32) -> RemoteResult<Option<u64>> {
    let path = format!("/search/tvdb/{}?type=show", tvdb_id);
    let results: Vec<TraktSearchResult> = endpoint.get_json(&path).await?;
    Ok(results
        .into_iter()
        .filter_map(|r| r.show)
        .find(|show| show.ids.tvdb == Some(tvdb_id))
        .and_then(|show| show.ids.trakt))
}

/// Build the `shows` body for history and collection requests.
pub fn episodes_body(changes: &[&EpisodeFlagChange]) -> serde_json::Value {
    let shows: Vec<serde_json::Value> = changes
        .iter()
        .map(|change| {
            let mut seasons: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
            for EpisodeNumber { season, number } in &change.episodes {
                seasons.entry(*season).or_default().push(*number);
            }
            let seasons: Vec<serde_json::Value> = seasons
                .into_iter()
                .map(|(number, episodes)| {
                    json!({
                        "number": number,
                        "episodes": episodes.into_iter().map(|e| json!({ "number": e })).collect::<Vec<_>>(),
                    })
                })
                .collect();
            let mut ids = serde_json::Map::new();
            if let Some(trakt_id) = change.trakt_id {
                ids.insert("trakt".to_string(), json!(trakt_id));
            }
            ids.insert("tvdb".to_string(), json!(change.show_id));
            json!({ "ids": ids, "seasons": seasons })
        })
        .collect();
    json!({ "shows": shows })
}

pub fn movies_body(changes: &[&MovieFlagChange]) -> serde_json::Value {
    let movies: Vec<serde_json::Value> = changes
        .iter()
        .map(|change| json!({ "ids": { "tmdb": change.movie_id } }))
        .collect();
    json!({ "movies": movies })
}

/// POST to `/sync/{list_path}` or `/sync/{list_path}/remove`.
pub async fn post_sync(
    endpoint: &Endpoint<'_>,
    list_path: &str,
    remove: bool,
    body: &serde_json::Value,
) -> RemoteResult<()> {
    let path = if remove {
        format!("/sync/{}/remove", list_path)
    } else {
        format!("/sync/{}", list_path)
    };
    endpoint.post(&path, body).await
}
