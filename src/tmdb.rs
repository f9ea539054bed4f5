use crate::config::Config;
use crate::error::LookupError;
use crate::format::{clip, html_escape, one_line_title, MessageFormatter, MovieCard};
use crate::storage::StoredMovie;
use async_trait::async_trait;
use moka::future::Cache;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

static IMDB_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^tt\d{7,9}$").expect("valid regex"));
static TMDB_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^tmdb:(\d+)$").expect("valid regex"));

const OVERVIEW_LIMIT: usize = 800;

/// What the user typed, classified by lookup route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    Imdb(String),
    Tmdb(u64),
    Query(String),
}

impl Identifier {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if IMDB_ID.is_match(raw) {
            return Identifier::Imdb(raw.to_string());
        }
        if let Some(id) = TMDB_ID
            .captures(raw)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
        {
            return Identifier::Tmdb(id);
        }
        Identifier::Query(raw.to_string())
    }
}

#[derive(Clone)]
pub struct TmdbClient {
    api_key: String,
    base_url: String,
    language: String,
    http: Client,
    cache: Cache<String, Option<Movie>>,
}

impl TmdbClient {
    pub fn new(api_key: String, base_url: String, language: String) -> Result<Self, LookupError> {
        let http = Client::builder().timeout(Duration::from_secs(15)).build()?;
        let cache = Cache::builder()
            .max_capacity(1_000)
            .time_to_live(Duration::from_secs(60 * 60))
            .build();
        Ok(Self { api_key, base_url, language, http, cache })
    }

    pub fn from_config(cfg: &Config) -> Result<Self, LookupError> {
        Self::new(cfg.tmdb_api_key.clone(), cfg.tmdb_base_url.clone(), cfg.tmdb_language.clone())
    }

    /// Movie search, at most `limit` (1..10) results.
    pub async fn search_movies(&self, query: &str, limit: usize) -> Result<Vec<Movie>, LookupError> {
        let url = format!(
            "{}/3/search/movie?query={}&language={}&include_adult=false&page=1",
            self.base_url,
            urlencoding::encode(query),
            self.language
        );
        let resp = self.http.get(url).bearer_auth(&self.api_key).send().await?;
        if !resp.status().is_success() {
            return Err(LookupError::Status(resp.status()));
        }
        let mut data: SearchResp = resp.json().await?;
        data.results.truncate(limit.clamp(1, 10));
        Ok(data.results)
    }

    pub async fn movie_details(&self, id: u64) -> Result<Option<Movie>, LookupError> {
        let url = format!("{}/3/movie/{}?language={}", self.base_url, id, self.language);
        let resp = self.http.get(url).bearer_auth(&self.api_key).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(LookupError::Status(resp.status()));
        }
        Ok(Some(resp.json().await?))
    }

    pub async fn find_by_imdb(&self, imdb_id: &str) -> Result<Option<Movie>, LookupError> {
        let url = format!(
            "{}/3/find/{}?external_source=imdb_id&language={}",
            self.base_url,
            urlencoding::encode(imdb_id),
            self.language
        );
        let resp = self.http.get(url).bearer_auth(&self.api_key).send().await?;
        if !resp.status().is_success() {
            return Err(LookupError::Status(resp.status()));
        }
        let data: FindResp = resp.json().await?;
        Ok(data.movie_results.into_iter().next().map(|mut m| {
            m.imdb_id = Some(imdb_id.to_string());
            m
        }))
    }

    async fn resolve(&self, identifier: &Identifier) -> Result<Option<Movie>, LookupError> {
        match identifier {
            Identifier::Imdb(id) => self.find_by_imdb(id).await,
            Identifier::Tmdb(id) => self.movie_details(*id).await,
            Identifier::Query(q) => Ok(self.search_movies(q, 1).await?.into_iter().next()),
        }
    }

    /// Cached lookup; failures are not cached.
    pub async fn lookup(&self, raw: &str) -> Result<Option<Movie>, LookupError> {
        let identifier = Identifier::parse(raw);
        let key = match &identifier {
            Identifier::Imdb(id) => id.clone(),
            Identifier::Tmdb(id) => format!("tmdb:{id}"),
            Identifier::Query(q) => q.to_lowercase(),
        };
        if let Some(hit) = self.cache.get(&key).await {
            debug!(%key, "lookup cache hit");
            return Ok(hit);
        }
        let found = self.resolve(&identifier).await?;
        self.cache.insert(key, found.clone()).await;
        Ok(found)
    }
}

#[async_trait]
impl MessageFormatter for TmdbClient {
    async fn create_message(&self, identifier: &str) -> MovieCard {
        let identifier = identifier.trim();
        match self.lookup(identifier).await {
            Ok(Some(m)) => MovieCard { text: make_card(&m), movie: Some(m.into_stored()) },
            Ok(None) => MovieCard::not_found(identifier),
            Err(e) => {
                warn!(%identifier, error = %e, "movie lookup failed");
                MovieCard::failed()
            }
        }
    }
}

pub fn make_card(m: &Movie) -> String {
    let mut out = format!("<b>{}</b>", html_escape(&one_line_title(&m.title, m.release_date.as_deref())));
    if !m.original_title.is_empty() && m.original_title != m.title {
        out.push_str(&format!("\n<i>{}</i>", html_escape(&m.original_title)));
    }
    if let Some(score) = m.vote_average.filter(|v| *v > 0.0) {
        out.push_str(&format!("\n⭐ {:.1}/10", score));
    }
    let overview = m.overview.trim();
    if overview.is_empty() {
        out.push_str("\n\n<i>no overview</i>");
    } else {
        out.push_str(&format!("\n\n{}", html_escape(&clip(overview, OVERVIEW_LIMIT))));
    }
    if let Some(imdb) = &m.imdb_id {
        out.push_str(&format!("\n\nhttps://www.imdb.com/title/{}/", imdb));
    }
    out
}

/* ======= DTOs ======= */

#[derive(Deserialize, Debug)]
struct SearchResp {
    results: Vec<Movie>,
}

#[derive(Deserialize, Debug)]
struct FindResp {
    #[serde(default)]
    movie_results: Vec<Movie>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Movie {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub original_title: String,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub imdb_id: Option<String>,
}

impl Movie {
    pub fn into_stored(self) -> StoredMovie {
        StoredMovie {
            id: self.id,
            imdb_id: self.imdb_id,
            title: self.title,
            original_title: self.original_title,
            release_date: self.release_date.filter(|d| !d.is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> TmdbClient {
        TmdbClient::new("key".into(), server.uri(), "en-US".into()).unwrap()
    }

    fn matrix() -> serde_json::Value {
        json!({
            "id": 603,
            "title": "The Matrix",
            "original_title": "The Matrix",
            "overview": "A hacker learns the truth.",
            "release_date": "1999-03-31",
            "vote_average": 8.2
        })
    }

    #[test]
    fn identifiers_are_classified() {
        assert_eq!(Identifier::parse(" tt0133093 "), Identifier::Imdb("tt0133093".into()));
        assert_eq!(Identifier::parse("tmdb:603"), Identifier::Tmdb(603));
        assert_eq!(Identifier::parse("the matrix"), Identifier::Query("the matrix".into()));
        assert_eq!(Identifier::parse("tt12"), Identifier::Query("tt12".into()));
    }

    #[tokio::test]
    async fn imdb_id_goes_through_find() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/3/find/tt0133093"))
            .and(query_param("external_source", "imdb_id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "movie_results": [matrix()] })))
            .expect(1)
            .mount(&server)
            .await;

        let card = client(&server).create_message("tt0133093").await;

        let movie = card.movie.expect("movie resolved");
        assert_eq!(movie.id, 603);
        assert_eq!(movie.imdb_id.as_deref(), Some("tt0133093"));
        assert!(card.text.starts_with("<b>The Matrix (1999)</b>"));
        assert!(card.text.contains("⭐ 8.2/10"));
        assert!(card.text.contains("https://www.imdb.com/title/tt0133093/"));
    }

    #[tokio::test]
    async fn tmdb_id_goes_through_details() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/3/movie/603"))
            .respond_with(ResponseTemplate::new(200).set_body_json(matrix()))
            .mount(&server)
            .await;

        let card = client(&server).create_message("tmdb:603").await;
        assert_eq!(card.movie.map(|m| m.title), Some("The Matrix".to_string()));
    }

    #[tokio::test]
    async fn free_text_takes_first_search_hit_and_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/3/search/movie"))
            .and(query_param("query", "the matrix"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [matrix(), { "id": 1, "title": "Other" }] })))
            .expect(1)
            .mount(&server)
            .await;

        let tmdb = client(&server);
        let first = tmdb.create_message("the matrix").await;
        let second = tmdb.create_message("The Matrix").await;

        assert_eq!(first.movie.as_ref().map(|m| m.id), Some(603));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn unknown_tmdb_id_gives_not_found_card() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/3/movie/999999999"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "status_code": 34 })))
            .expect(1)
            .mount(&server)
            .await;

        let card = client(&server).create_message("tmdb:999999999").await;
        assert_eq!(card, MovieCard::not_found("tmdb:999999999"));
    }

    #[tokio::test]
    async fn empty_search_gives_not_found_card() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/3/search/movie"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
            .mount(&server)
            .await;

        let card = client(&server).create_message("zzzz").await;
        assert_eq!(card, MovieCard::not_found("zzzz"));
    }

    #[tokio::test]
    async fn server_error_gives_failure_card() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let card = client(&server).create_message("tt0133093").await;
        assert_eq!(card, MovieCard::failed());
    }
}
