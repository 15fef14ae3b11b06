//! Common test utilities and helpers for daybook tests
#![allow(dead_code)]

use std::path::PathBuf;

use chrono::{Duration, Utc};
use daybook::auth::TokenStore;
use daybook::{Config, Token};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Isolated data directory plus a config file pointing at it
pub struct TestEnvironment {
    pub temp_dir: TempDir,
    pub data_dir: PathBuf,
    pub config_path: PathBuf,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let data_dir = temp_dir.path().join("data");
        let config_path = temp_dir.path().join("daybook").join("config.yml");
        std::fs::create_dir_all(config_path.parent().unwrap())
            .expect("Failed to create config dir");

        Self {
            temp_dir,
            data_dir,
            config_path,
        }
    }

    /// Config using the local data dir and, optionally, a mock Graph server
    pub fn config(&self, server: Option<&MockServer>) -> Config {
        let mut config = Config::default();
        config.storage.data_dir = self.data_dir.display().to_string();
        if let Some(server) = server {
            config.outlook.authority_url = server.uri();
            config.outlook.graph_url = format!("{}/v1.0", server.uri());
        }
        config
    }

    /// Write `config` to the environment's config path
    pub fn write_config(&self, config: &Config) -> PathBuf {
        config
            .save(&self.config_path)
            .expect("Failed to write test config");
        self.config_path.clone()
    }

    /// Persist a token that stays valid for an hour
    pub fn save_valid_token(&self, config: &Config) {
        TokenStore::new(config.token_path())
            .save(&Token {
                access_token: "test-access".to_string(),
                token_type: "Bearer".to_string(),
                refresh_token: "test-refresh".to_string(),
                expiry: Some(Utc::now() + Duration::hours(1)),
            })
            .expect("Failed to save token");
    }

    /// Persist a token that expired a while ago
    pub fn save_expired_token(&self, config: &Config) {
        TokenStore::new(config.token_path())
            .save(&Token {
                access_token: "expired-access".to_string(),
                token_type: "Bearer".to_string(),
                refresh_token: "test-refresh".to_string(),
                expiry: Some(Utc::now() - Duration::hours(1)),
            })
            .expect("Failed to save token");
    }
}

/// Graph event JSON with the fields the importer reads
pub fn graph_event(id: &str, subject: &str, start: &str, end: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "subject": subject,
        "bodyPreview": "",
        "isAllDay": false,
        "isCancelled": false,
        "sensitivity": "normal",
        "showAs": "busy",
        "start": { "dateTime": start, "timeZone": "UTC" },
        "end": { "dateTime": end, "timeZone": "UTC" },
        "location": { "displayName": "" }
    })
}

/// Serve `events` as a single calendar view page
pub async fn mount_calendar(server: &MockServer, events: Vec<serde_json::Value>) {
    Mock::given(method("GET"))
        .and(path("/v1.0/me/calendarView"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "value": events })),
        )
        .mount(server)
        .await;
}

/// Assertion helpers for test validation
pub fn assert_contains_all(text: &str, expected: &[&str]) {
    for item in expected {
        assert!(
            text.contains(item),
            "Expected text to contain '{}', but it didn't. Text: {}",
            item,
            text
        );
    }
}
