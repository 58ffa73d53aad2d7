use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use wattson::route::History;
use wattson::session::SessionManager;
use wattson::store::{MemorySessionStore, StoredSession};
use wattson::types::{Credential, Identity};
use wattson::WattsonClient;
use wiremock::matchers::{method, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Deserialize)]
pub struct Fixture {
    #[serde(rename = "_meta")]
    pub meta: Option<FixtureMeta>,
    pub request: FixtureRequest,
    pub response: FixtureResponse,
}

#[derive(Deserialize)]
pub struct FixtureMeta {
    pub query: Option<HashMap<String, String>>,
}

#[derive(Deserialize)]
pub struct FixtureRequest {
    pub method: String,
    pub path_pattern: String,
}

#[derive(Deserialize)]
pub struct FixtureResponse {
    pub status_code: u16,
    pub body: serde_json::Value,
}

/// A signed-in or signed-out client wired to a mock backend.
pub struct Harness {
    pub client: WattsonClient,
    pub session: Arc<SessionManager>,
    pub store: Arc<MemorySessionStore>,
    pub history: Arc<History>,
}

pub struct WattsonMock {
    pub server: MockServer,
}

impl WattsonMock {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
    }

    fn load_fixture(fixture_path: &str) -> Fixture {
        let full_path = Self::fixtures_dir().join(fixture_path);

        let content = fs::read_to_string(&full_path)
            .unwrap_or_else(|e| panic!("Failed to read fixture {}: {}", full_path.display(), e));

        serde_json::from_str(&content)
            .unwrap_or_else(|e| panic!("Failed to parse fixture {}: {}", full_path.display(), e))
    }

    #[allow(dead_code)]
    pub async fn mount_fixture(&self, fixture_path: &str) {
        self.mount_fixture_delayed(fixture_path, Duration::ZERO)
            .await;
    }

    pub async fn mount_fixture_delayed(&self, fixture_path: &str, delay: Duration) {
        let fixture = Self::load_fixture(fixture_path);

        let mut mock = Mock::given(method(fixture.request.method.as_str()))
            .and(path_regex(&fixture.request.path_pattern));

        if let Some(query) = fixture.meta.and_then(|meta| meta.query) {
            for (key, value) in query {
                mock = mock.and(query_param(key, value));
            }
        }

        mock.respond_with(
            ResponseTemplate::new(fixture.response.status_code)
                .set_body_json(&fixture.response.body)
                .set_delay(delay),
        )
        .mount(&self.server)
        .await;
    }

    pub fn base_url(&self) -> String {
        format!("{}/api/", self.server.uri())
    }

    fn harness(&self, store: MemorySessionStore) -> Harness {
        let store = Arc::new(store);
        let history = Arc::new(History::default());
        let session = Arc::new(SessionManager::new(store.clone(), history.clone()));
        session.initialize().expect("fresh session manager");
        let client = WattsonClient::new(session.clone()).with_base_url(self.base_url());
        Harness {
            client,
            session,
            store,
            history,
        }
    }

    #[allow(dead_code)]
    pub fn signed_out(&self) -> Harness {
        self.harness(MemorySessionStore::new())
    }

    #[allow(dead_code)]
    pub fn signed_in(&self, token: &str, username: &str) -> Harness {
        self.harness(MemorySessionStore::with_session(StoredSession {
            credential: Credential::new(token),
            identity: Identity::new(username),
        }))
    }
}
