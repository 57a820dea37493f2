//! Response negotiation.
//!
//! Every route serves two kinds of client. API clients (JSON body, JSON `Accept`, or
//! `X-Requested-With: XMLHttpRequest`) get a `{success, message, data}` envelope and a
//! status code. Browser clients get rendered pages, and after a form post a redirect with
//! a flash message. Handlers stay flow-agnostic by returning through [`View`] and letting
//! errors bubble up as [`Error`]; [`negotiate`] rewrites error responses for browsers.

use super::AppState;
use super::render::{PageContext, ViewRenderer};
use super::session::{self, FlashKind};
use crate::config::roles;
use crate::core::access::Role;
use crate::errors::{Error, ErrorKind, Result};
use axum::async_trait;
use axum::extract::{FromRequest, FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::{Form, Json};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use tower_sessions::Session;
use tracing::{error, warn};

/// Which kind of client sent the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Api,
    Page,
}

impl Flow {
    /// Classifies a request by its headers.
    #[must_use]
    pub fn detect(headers: &HeaderMap) -> Self {
        let has = |name: header::HeaderName, needle: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.to_ascii_lowercase().contains(needle))
        };
        let xhr = headers
            .get("x-requested-with")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"));
        if xhr || has(header::CONTENT_TYPE, "application/json") || has(header::ACCEPT, "application/json") {
            Self::Api
        } else {
            Self::Page
        }
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Flow {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> std::result::Result<Self, Self::Rejection> {
        Ok(Self::detect(&parts.headers))
    }
}

/// JSON body of every API response.
#[derive(Debug, Serialize)]
pub struct Envelope {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

/// Attached to error responses so [`negotiate`] can rewrite them for browsers.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::ValidationFailed | ErrorKind::InvalidOrExpiredToken => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::UpstreamFailure => StatusCode::BAD_GATEWAY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let message = if self.is_user_facing() {
            self.to_string()
        } else if kind == ErrorKind::UpstreamFailure {
            warn!("Upstream failure: {self}");
            "Service temporarily unavailable".to_string()
        } else {
            error!("Request failed: {self}");
            "Server error".to_string()
        };

        let body = Envelope {
            success: false,
            message: message.clone(),
            data: None,
            kind: Some(kind),
        };
        let mut response = (status_for(kind), Json(body)).into_response();
        response.extensions_mut().insert(ErrorReport { kind, message });
        response
    }
}

fn to_value<T: Serialize>(data: &T) -> Result<Value> {
    serde_json::to_value(data).map_err(|e| Error::Internal {
        message: format!("response encoding: {e}"),
    })
}

/// Renders `template` with the session's identity, menu and pending flash.
async fn render_page(
    renderer: &dyn ViewRenderer,
    session: &Session,
    template: &str,
    data: &Value,
) -> Result<String> {
    let identity = session::identity(session).await?;
    let flash = session::take_flash(session).await?;
    let menu = identity
        .as_ref()
        .and_then(|i| Role::from_name(&i.role_name))
        .map_or(&[][..], roles::menu);
    renderer.render(&PageContext {
        template,
        identity: identity.as_ref(),
        menu,
        flash: flash.as_ref(),
        data,
    })
}

/// Per-request responder that knows the client flow.
pub struct View {
    flow: Flow,
    session: Session,
    renderer: Arc<dyn ViewRenderer>,
}

#[async_trait]
impl FromRequestParts<AppState> for View {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, message)| Error::Session {
                message: message.to_string(),
            })?;
        Ok(Self {
            flow: Flow::detect(&parts.headers),
            session,
            renderer: Arc::clone(&state.renderer),
        })
    }
}

impl View {
    /// Client flow of this request.
    #[must_use]
    pub const fn flow(&self) -> Flow {
        self.flow
    }

    /// The request's session.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Shows `data`: as the envelope's `data` for API clients, through `template` for browsers.
    pub async fn page<T: Serialize>(&self, template: &str, data: &T) -> Result<Response> {
        let data = to_value(data)?;
        match self.flow {
            Flow::Api => Ok(Json(Envelope {
                success: true,
                message: "OK".to_string(),
                data: Some(data),
                kind: None,
            })
            .into_response()),
            Flow::Page => {
                let html = render_page(self.renderer.as_ref(), &self.session, template, &data).await?;
                Ok(Html(html).into_response())
            }
        }
    }

    /// Reports a completed action: envelope for API clients, flash plus redirect for browsers.
    pub async fn done<T: Serialize>(&self, message: &str, redirect_to: &str, data: &T) -> Result<Response> {
        self.finish(StatusCode::OK, message, redirect_to, data).await
    }

    /// Like [`View::done`] with `201 Created` for API clients.
    pub async fn created<T: Serialize>(&self, message: &str, redirect_to: &str, data: &T) -> Result<Response> {
        self.finish(StatusCode::CREATED, message, redirect_to, data).await
    }

    /// Reports an action that ran but did not succeed, such as a declined charge.
    ///
    /// API clients get `success: false` with `status`; browsers get an error flash.
    pub async fn declined<T: Serialize>(
        &self,
        status: StatusCode,
        message: &str,
        redirect_to: &str,
        data: &T,
    ) -> Result<Response> {
        self.finish(status, message, redirect_to, data).await
    }

    async fn finish<T: Serialize>(
        &self,
        status: StatusCode,
        message: &str,
        redirect_to: &str,
        data: &T,
    ) -> Result<Response> {
        let success = status.is_success();
        match self.flow {
            Flow::Api => {
                let body = Envelope {
                    success,
                    message: message.to_string(),
                    data: Some(to_value(data)?),
                    kind: None,
                };
                Ok((status, Json(body)).into_response())
            }
            Flow::Page => {
                let kind = if success { FlashKind::Success } else { FlashKind::Error };
                session::set_flash(&self.session, kind, message).await?;
                Ok(Redirect::to(redirect_to).into_response())
            }
        }
    }
}

/// Request body accepted as JSON or as an urlencoded form, by `Content-Type`.
pub struct Payload<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for Payload<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));
        if is_json {
            let Json(value) = Json::<T>::from_request(req, state)
                .await
                .map_err(|e| Error::validation(e.body_text()))?;
            Ok(Self(value))
        } else {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(|e| Error::validation(e.body_text()))?;
            Ok(Self(value))
        }
    }
}

/// Path of a same-site referer, used to send a failed form back where it came from.
fn back_path(referer: Option<&str>, public_host: &str) -> Option<String> {
    let referer = referer?;
    let path = if referer.starts_with('/') {
        referer
    } else {
        referer.strip_prefix(public_host.trim_end_matches('/'))?
    };
    let off_site = path.starts_with("//") || path.starts_with("/\\");
    (path.starts_with('/') && !off_site).then(|| path.to_string())
}

/// Rewrites error responses for browser clients.
///
/// Unauthenticated requests go to the login page, failed form submissions go back to the
/// referring page, and failed page loads render the `error` template. The failure message
/// travels as a flash in the redirect cases. API responses pass through untouched.
pub async fn negotiate(
    State(state): State<AppState>,
    session: Session,
    request: Request,
    next: Next,
) -> Response {
    let flow = Flow::detect(request.headers());
    let method = request.method().clone();
    let referer = request
        .headers()
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let response = next.run(request).await;
    if flow == Flow::Api {
        return response;
    }
    let Some(report) = response.extensions().get::<ErrorReport>().cloned() else {
        return response;
    };

    let target = if report.kind == ErrorKind::Unauthenticated {
        Some("/auth/login".to_string())
    } else if method == Method::GET {
        None
    } else {
        Some(
            back_path(referer.as_deref(), &state.config.server.public_host)
                .unwrap_or_else(|| "/dashboard".to_string()),
        )
    };

    if let Some(target) = target {
        if let Err(e) = session::set_flash(&session, FlashKind::Error, &report.message).await {
            warn!("Could not store flash message: {e}");
        }
        return Redirect::to(&target).into_response();
    }

    let status = response.status();
    let data = serde_json::json!({
        "status": status.as_u16(),
        "kind": report.kind,
        "message": report.message,
    });
    match render_page(state.renderer.as_ref(), &session, "error", &data).await {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            error!("Could not render error page: {e}");
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_flow_detection() {
        let mut headers = HeaderMap::new();
        assert_eq!(Flow::detect(&headers), Flow::Page);

        headers.insert(header::ACCEPT, HeaderValue::from_static("text/html"));
        assert_eq!(Flow::detect(&headers), Flow::Page);

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
        assert_eq!(Flow::detect(&headers), Flow::Api);

        let mut headers = HeaderMap::new();
        headers.insert("x-requested-with", HeaderValue::from_static("xmlhttprequest"));
        assert_eq!(Flow::detect(&headers), Flow::Api);

        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        assert_eq!(Flow::detect(&headers), Flow::Api);
    }

    #[test]
    fn test_error_statuses() {
        let cases = [
            (Error::Unauthenticated, StatusCode::UNAUTHORIZED),
            (Error::forbidden("no"), StatusCode::FORBIDDEN),
            (Error::NotFound { entity: "Course", id: 1 }, StatusCode::NOT_FOUND),
            (Error::WeakPassword, StatusCode::BAD_REQUEST),
            (Error::AlreadyEnrolled { course_id: 1 }, StatusCode::CONFLICT),
            (Error::Upstream { message: "down".to_string() }, StatusCode::BAD_GATEWAY),
            (Error::Internal { message: "boom".to_string() }, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            let response = error.into_response();
            assert_eq!(response.status(), status);
            assert!(response.extensions().get::<ErrorReport>().is_some());
        }
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let response = Error::Internal { message: "db path /secret".to_string() }.into_response();
        let report = response.extensions().get::<ErrorReport>().cloned();
        assert_eq!(report.map(|r| r.message), Some("Server error".to_string()));
    }

    #[test]
    fn test_back_path_stays_on_site() {
        let host = "http://localhost:3000";
        assert_eq!(back_path(Some("/courses/1"), host), Some("/courses/1".to_string()));
        assert_eq!(
            back_path(Some("http://localhost:3000/admin/users"), host),
            Some("/admin/users".to_string())
        );
        assert_eq!(back_path(Some("https://evil.example/x"), host), None);
        assert_eq!(back_path(Some("//evil.example"), host), None);
        assert_eq!(back_path(Some("/\\evil.example"), host), None);
        assert_eq!(back_path(Some("http://localhost:3000/\\evil.example"), host), None);
        assert_eq!(back_path(None, host), None);
    }
}
