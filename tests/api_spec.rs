use axum::http::StatusCode;
use axum_test::TestServer;
use prism::api::{create_router, create_router_with_auth, AuthConfig, StubBackend};
use prism::models::*;
use serde_json::json;

fn setup() -> TestServer {
    let app = create_router(StubBackend::new());
    TestServer::new(app).expect("Failed to create test server")
}

async fn generate(server: &TestServer, input: &str) -> GenerateResponse {
    server
        .post("/api/v1/generate")
        .json(&json!({ "user_input": input }))
        .await
        .json::<GenerateResponse>()
}

async fn feedback(server: &TestServer, session_id: &str, version: u32, text: &str) -> FeedbackResponse {
    server
        .post(&format!("/api/v1/sessions/{}/feedback", session_id))
        .json(&json!({ "session_id": session_id, "version": version, "feedback": text }))
        .await
        .json::<FeedbackResponse>()
}

mod health {
    use super::*;

    #[tokio::test]
    async fn reports_healthy_at_the_root() {
        let server = setup();

        let response = server.get("/health").await;

        response.assert_status_ok();
        response.assert_json(&json!({ "status": "healthy" }));
    }
}

mod generation {
    use super::*;

    #[tokio::test]
    async fn generate_opens_a_session_at_version_one() {
        let server = setup();

        let created = generate(&server, "a red circle").await;

        assert_eq!(created.version, 1);
        assert!(!created.session_id.is_empty());
        assert!(created.prompt.contains("a red circle"));
        assert!(created.image_url.starts_with("https://picsum.photos/seed/"));
    }

    #[tokio::test]
    async fn generate_into_an_existing_session_takes_the_next_number() {
        let server = setup();
        let created = generate(&server, "a red circle").await;

        let second = server
            .post("/api/v1/generate")
            .json(&json!({ "user_input": "a green square", "session_id": created.session_id }))
            .await
            .json::<GenerateResponse>();

        assert_eq!(second.session_id, created.session_id);
        assert_eq!(second.version, 2);
    }

    #[tokio::test]
    async fn blank_input_is_unprocessable() {
        let server = setup();

        let response = server
            .post("/api/v1/generate")
            .json(&json!({ "user_input": "  " }))
            .await;

        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        response.assert_json(&json!({ "detail": "user input must not be empty" }));
    }

    #[tokio::test]
    async fn feedback_reports_parent_and_diff() {
        let server = setup();
        let created = generate(&server, "a red circle").await;

        let revised = feedback(&server, &created.session_id, 1, "make it blue").await;

        assert_eq!(revised.version, 2);
        assert_eq!(revised.parent_version, 1);
        let diff = revised.diff.expect("diff missing");
        assert_eq!(diff.operations[0].values, vec!["make it blue".to_string()]);
        assert!(revised.schema.appearance.contains(&"make it blue".to_string()));
    }

    #[tokio::test]
    async fn feedback_on_a_missing_version_is_not_found() {
        let server = setup();
        let created = generate(&server, "a red circle").await;

        let response = server
            .post(&format!("/api/v1/sessions/{}/feedback", created.session_id))
            .json(&json!({ "session_id": created.session_id, "version": 7, "feedback": "x" }))
            .await;

        response.assert_status_not_found();
        response.assert_json(&json!({ "detail": "version 7 not found" }));
    }

    #[tokio::test]
    async fn rollback_copies_the_target() {
        let server = setup();
        let created = generate(&server, "a red circle").await;
        feedback(&server, &created.session_id, 1, "make it blue").await;

        let rolled = server
            .post(&format!("/api/v1/sessions/{}/rollback", created.session_id))
            .json(&json!({ "target_version": 1 }))
            .await
            .json::<FeedbackResponse>();

        assert_eq!(rolled.version, 3);
        assert_eq!(rolled.parent_version, 1);
        assert_eq!(rolled.prompt, created.prompt);
        assert!(rolled.diff.is_none());
    }

    #[tokio::test]
    async fn preview_compiles_without_creating_a_session() {
        let server = setup();

        let preview = server
            .post("/api/v1/preview")
            .json(&json!({ "user_input": "a red circle" }))
            .await
            .json::<PreviewResponse>();

        assert_eq!(preview.schema.subject, vec!["a red circle".to_string()]);
        let list = server.get("/api/v1/sessions").await.json::<SessionList>();
        assert_eq!(list.total, 0);
    }
}

mod sessions {
    use super::*;

    #[tokio::test]
    async fn versions_list_the_full_history() {
        let server = setup();
        let created = generate(&server, "a red circle").await;
        feedback(&server, &created.session_id, 1, "make it blue").await;

        let history = server
            .get(&format!("/api/v1/sessions/{}/versions", created.session_id))
            .await
            .json::<SessionHistory>();

        assert_eq!(history.versions.len(), 2);
        assert_eq!(history.versions[0].user_input.as_deref(), Some("a red circle"));
        assert_eq!(history.versions[1].user_feedback.as_deref(), Some("make it blue"));
        let loaded = Session::from_history(history).expect("history should load");
        assert_eq!(loaded.versions[1].parent_version, Some(1));
    }

    #[tokio::test]
    async fn list_pages_with_skip_and_limit() {
        let server = setup();
        for input in ["one", "two", "three"] {
            generate(&server, input).await;
        }

        let page = server
            .get("/api/v1/sessions")
            .add_query_param("skip", 1)
            .add_query_param("limit", 1)
            .await
            .json::<SessionList>();

        assert_eq!(page.total, 3);
        assert_eq!(page.sessions.len(), 1);
        assert_eq!(page.sessions[0].version_count, 1);
        assert!(page.sessions[0].thumbnail_url.is_some());
    }

    #[tokio::test]
    async fn patch_renames_a_session() {
        let server = setup();
        let created = generate(&server, "a red circle").await;

        let updated = server
            .patch(&format!("/api/v1/sessions/{}", created.session_id))
            .json(&json!({ "name": "Circles" }))
            .await
            .json::<UpdatedSession>();

        assert_eq!(updated.name.as_deref(), Some("Circles"));
        assert_eq!(updated.description, None);
    }

    #[tokio::test]
    async fn delete_removes_the_session() {
        let server = setup();
        let created = generate(&server, "a red circle").await;

        let deleted = server
            .delete(&format!("/api/v1/sessions/{}", created.session_id))
            .await
            .json::<DeletedSession>();
        assert_eq!(deleted.status, "deleted");

        server
            .get(&format!("/api/v1/sessions/{}/versions", created.session_id))
            .await
            .assert_status_not_found();
    }
}

mod auth {
    use super::*;

    fn setup_with_key() -> TestServer {
        let app = create_router_with_auth(StubBackend::new(), AuthConfig::with_api_key("secret"));
        TestServer::new(app).expect("Failed to create test server")
    }

    #[tokio::test]
    async fn missing_key_is_unauthorized() {
        let server = setup_with_key();

        server
            .get("/api/v1/sessions")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn matching_bearer_key_is_accepted() {
        let server = setup_with_key();

        server
            .get("/api/v1/sessions")
            .authorization_bearer("secret")
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn health_needs_no_key() {
        let server = setup_with_key();

        server.get("/health").await.assert_status_ok();
    }
}
