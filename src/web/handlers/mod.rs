//! Route handlers grouped by area.

#![allow(clippy::unused_async)]

/// Admin and Super Admin pages
pub mod admin;
/// Announcement listing
pub mod announcements;
/// Login, registration, logout and password reset
pub mod auth;
/// Course catalogue and course management
pub mod courses;
/// Dashboard, identity and profile
pub mod dashboard;
/// Payments and refunds
pub mod payments;
/// Student area
pub mod student;
/// Teacher area
pub mod teacher;

use super::AppState;
use axum::Json;
use axum::Router;
use axum::response::Redirect;
use axum::routing::{get, put};
use chrono::Utc;
use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt;
use std::str::FromStr;

/// Default rows per page for paginated listings.
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// `?page=&page_size=` query parameters.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Paging {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

impl Paging {
    /// 1-based page number.
    #[must_use]
    pub fn page(self) -> u64 {
        self.page.unwrap_or(1).max(1)
    }

    /// Rows per page, clamped to 1..=100.
    #[must_use]
    pub fn page_size(self) -> u64 {
        self.page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, 100)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Field<T> {
    Typed(T),
    Text(String),
}

/// Optional field that may arrive typed (JSON) or as text (forms, where empty means absent).
///
/// Use with `#[serde(default, deserialize_with = "optional")]`.
pub fn optional<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: fmt::Display,
{
    match Option::<Field<T>>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Field::Typed(value)) => Ok(Some(value)),
        Some(Field::Text(text)) => match text.trim() {
            "" => Ok(None),
            text => text.parse().map(Some).map_err(de::Error::custom),
        },
    }
}

/// Routes that need no session.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(|| async { Redirect::to("/dashboard") }))
        .route("/health", get(health))
        .nest("/auth", auth::routes())
}

/// Routes open to every logged-in role.
pub fn signed_in_routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard::show))
        .route("/me", get(dashboard::me))
        .route("/me/profile", put(dashboard::update_profile))
        .route("/announcements", get(announcements::list))
        .route(
            "/announcements/:id",
            put(announcements::update).delete(announcements::remove),
        )
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "OK", "timestamp": Utc::now() }))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::web::testing::*;
    use axum::http::StatusCode;

    #[test]
    fn test_paging_defaults_and_clamps() {
        let paging = Paging::default();
        assert_eq!((paging.page(), paging.page_size()), (1, DEFAULT_PAGE_SIZE));
        let paging = Paging {
            page: Some(0),
            page_size: Some(1000),
        };
        assert_eq!((paging.page(), paging.page_size()), (1, 100));
    }

    #[derive(Debug, Deserialize)]
    struct Sample {
        #[serde(default, deserialize_with = "optional")]
        points: Option<f64>,
    }

    #[test]
    fn test_optional_accepts_json_and_form_values() {
        let json: Sample = serde_json::from_str(r#"{"points": 7.5}"#).unwrap();
        assert_eq!(json.points, Some(7.5));
        let form: Sample = serde_urlencoded::from_str("points=12").unwrap();
        assert_eq!(form.points, Some(12.0));
        let blank: Sample = serde_urlencoded::from_str("points=").unwrap();
        assert_eq!(blank.points, None);
        let missing: Sample = serde_urlencoded::from_str("").unwrap();
        assert_eq!(missing.points, None);
        assert!(serde_urlencoded::from_str::<Sample>("points=abc").is_err());
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _db) = app().await;
        let response = send(&app, json_request("GET", "/health", None, None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "OK");
        assert!(body["timestamp"].is_string());
    }
}
