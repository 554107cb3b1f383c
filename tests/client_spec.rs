//! HTTP client against the stub served on a loopback port.

use std::sync::Arc;
use std::time::Duration;

use prism::api::{self, create_router_with_auth, AuthConfig, StubBackend};
use prism::client::{ClientError, PrismBackend, PrismClient};
use prism::config::Config;
use prism::db::{Database, MemoryPointer};
use prism::models::*;
use prism::store::LineageStore;
use tokio::net::TcpListener;
use tokio_test::assert_ok;

/// Start a stub server and return its base URL.
async fn spawn_stub(auth: AuthConfig) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("No local address");
    let app = create_router_with_auth(StubBackend::new(), auth);
    tokio::spawn(api::serve(listener, app));
    format!("http://{}", addr)
}

async fn client() -> PrismClient {
    PrismClient::new(spawn_stub(AuthConfig::disabled()).await, None)
}

mod requests {
    use super::*;

    #[tokio::test]
    async fn health_is_served_at_the_root() {
        let client = client().await;
        assert_eq!(client.health().await.unwrap().status, "healthy");
    }

    #[tokio::test]
    async fn generate_feedback_and_history_round_trip() {
        let client = client().await;

        let created = client
            .generate(&GenerateRequest {
                user_input: "a red circle".to_string(),
                session_id: None,
            })
            .await
            .unwrap();
        let revised = client
            .feedback(&FeedbackRequest {
                session_id: created.session_id.clone(),
                version: created.version,
                feedback: "make it blue".to_string(),
            })
            .await
            .unwrap();
        let history = client.get_versions(&created.session_id).await.unwrap();

        assert_eq!(revised.parent_version, 1);
        assert_eq!(history.versions.len(), 2);
    }

    #[tokio::test]
    async fn list_passes_offset_and_limit() {
        let client = client().await;
        for input in ["one", "two", "three"] {
            client
                .generate(&GenerateRequest {
                    user_input: input.to_string(),
                    session_id: None,
                })
                .await
                .unwrap();
        }

        let page = client.list_sessions(2, 5).await.unwrap();

        assert_eq!(page.total, 3);
        assert_eq!(page.sessions.len(), 1);
    }

    #[tokio::test]
    async fn patch_sends_only_the_given_fields() {
        let client = client().await;
        let created = client
            .generate(&GenerateRequest {
                user_input: "a red circle".to_string(),
                session_id: None,
            })
            .await
            .unwrap();
        client
            .update_session(&created.session_id, &SessionPatch::description("shapes"))
            .await
            .unwrap();

        let updated = client
            .update_session(&created.session_id, &SessionPatch::name("Circles"))
            .await
            .unwrap();

        assert_eq!(updated.name.as_deref(), Some("Circles"));
        assert_eq!(updated.description.as_deref(), Some("shapes"));
    }
}

mod errors {
    use super::*;

    #[tokio::test]
    async fn missing_session_maps_to_not_found_with_detail() {
        let client = client().await;

        let err = client.get_versions("nope").await.unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(err.remote_message(), Some("session nope not found"));
    }

    #[tokio::test]
    async fn unprocessable_input_maps_to_bad_request() {
        let client = client().await;

        let err = client
            .preview(&PreviewRequest {
                user_input: String::new(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::BadRequest(ref m) if m == "user input must not be empty"));
    }

    #[tokio::test]
    async fn wrong_key_maps_to_unauthorized() {
        let url = spawn_stub(AuthConfig::with_api_key("secret")).await;

        let rejected = PrismClient::new(url.clone(), Some("wrong".to_string()));
        let err = rejected.list_sessions(0, 20).await.unwrap_err();
        assert!(matches!(err, ClientError::Unauthorized));
        assert_eq!(err.remote_message(), None);

        let accepted = PrismClient::new(url, Some("secret".to_string()));
        assert_ok!(accepted.list_sessions(0, 20).await);
    }

    #[tokio::test]
    async fn unreachable_backend_is_an_http_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = PrismClient::new(format!("http://{}", addr), None);
        let err = client.health().await.unwrap_err();

        assert!(matches!(err, ClientError::Http(_)));
        assert!(!err.is_timeout());
    }

    /// Accept connections and never answer.
    async fn spawn_silent() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                open.push(socket);
            }
        });
        format!("http://{}", addr)
    }

    fn impatient(url: String) -> PrismClient {
        PrismClient::from_config(&Config {
            api_url: url,
            generation_timeout: Duration::from_millis(100),
            request_timeout: Duration::from_millis(100),
            ..Config::default()
        })
    }

    #[tokio::test]
    async fn silent_backend_is_a_timeout() {
        let client = impatient(spawn_silent().await);

        let err = client.health().await.unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(err.remote_message(), None);
    }

    #[tokio::test]
    async fn store_reports_a_timeout_distinctly() {
        let client = impatient(spawn_silent().await);
        let store = LineageStore::new(Arc::new(client), Arc::new(MemoryPointer::new()));

        let err = store.generate("a red circle").await.unwrap_err();

        assert!(matches!(err, prism::store::StoreError::Client(ref e) if e.is_timeout()));
        assert_eq!(
            store.last_error().as_deref(),
            Some("generation failed: the backend did not answer in time")
        );
        assert!(!store.has_session());
    }
}

mod end_to_end {
    use super::*;

    #[tokio::test]
    async fn store_survives_a_restart_through_the_database() {
        let url = spawn_stub(AuthConfig::disabled()).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prism.db");

        let session_id = {
            let db = Database::open(path.clone()).unwrap();
            db.migrate().unwrap();
            let store = LineageStore::new(Arc::new(PrismClient::new(url.clone(), None)), Arc::new(db));
            let created = store.generate("a red circle").await.unwrap();
            store.submit_feedback("make it blue").await.unwrap();
            store.rollback_to(1).await.unwrap();
            created.session_id
        };

        let db = Database::open(path).unwrap();
        db.migrate().unwrap();
        let store = LineageStore::new(Arc::new(PrismClient::new(url, None)), Arc::new(db));
        store.hydrate().await;

        assert_eq!(store.session_id(), Some(session_id));
        assert_eq!(store.focus(), Some(3));
        let parents: Vec<Option<u32>> = store
            .with_session(|s, _| s.versions.iter().map(|v| v.parent_version).collect())
            .unwrap();
        assert_eq!(parents, vec![None, Some(1), Some(1)]);
        assert_eq!(
            store.version_tree().unwrap(),
            "○ v1 a red circle\n├── ○ v2 make it blue\n└── ● v3 rollback to v1\n"
        );
    }
}
