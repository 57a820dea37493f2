use crate::core::announcements;
use crate::errors::Result;
use crate::web::AppState;
use crate::web::gate::Auth;
use crate::web::respond::{Payload, View};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct AnnouncementForm {
    pub title: String,
    pub message: String,
}

pub async fn list(
    State(state): State<AppState>,
    view: View,
    Query(query): Query<ListQuery>,
) -> Result<Response> {
    let items = announcements::list_announcements(&state.db, query.limit).await?;
    view.page("announcements", &json!({ "announcements": items })).await
}

pub async fn create(
    State(state): State<AppState>,
    Auth(ctx): Auth,
    view: View,
    Payload(form): Payload<AnnouncementForm>,
) -> Result<Response> {
    let announcement =
        announcements::create_announcement(&state.db, &ctx, &form.title, &form.message).await?;
    view.created(
        "Announcement posted",
        "/announcements",
        &json!({ "announcement": announcement }),
    )
    .await
}

pub async fn update(
    State(state): State<AppState>,
    Auth(ctx): Auth,
    view: View,
    Path(id): Path<i64>,
    Payload(form): Payload<AnnouncementForm>,
) -> Result<Response> {
    let announcement =
        announcements::update_announcement(&state.db, &ctx, id, &form.title, &form.message).await?;
    view.done(
        "Announcement updated",
        "/announcements",
        &json!({ "announcement": announcement }),
    )
    .await
}

pub async fn remove(
    State(state): State<AppState>,
    Auth(ctx): Auth,
    view: View,
    Path(id): Path<i64>,
) -> Result<Response> {
    announcements::delete_announcement(&state.db, &ctx, id).await?;
    view.done("Announcement deleted", "/announcements", &json!({})).await
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use crate::core::access::Role;
    use crate::test_utils::create_test_user;
    use crate::web::testing::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_teacher_posts_and_student_reads() {
        let (app, db) = app().await;
        create_test_user(&db, "Tia", "tia@example.com", Role::Teacher).await.unwrap();
        create_test_user(&db, "Stu", "stu@example.com", Role::Student).await.unwrap();

        let teacher = login(&app, "tia@example.com").await;
        let body = json!({ "title": "Welcome", "message": "Term starts Monday" });
        let response = send(&app, json_request("POST", "/teacher/announcements", Some(&teacher), Some(body.clone()))).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let student = login(&app, "stu@example.com").await;
        let response = send(&app, json_request("POST", "/teacher/announcements", Some(&student), Some(body))).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let list = body_json(send(&app, json_request("GET", "/announcements", Some(&student), None)).await).await;
        let items = list["data"]["announcements"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["authorName"], "Tia");
    }
}
