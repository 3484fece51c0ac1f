//! Shared test support for the Tether workspace: a scripted server, JSON
//! scenario fixtures, and payload builders.

mod builders;
mod scripted;

pub use builders::{document_body, issue_body, test_config};
pub use scripted::{RecordedRequest, ScriptedReply, ScriptedTransport};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::PathBuf;

/// Root directory of the scenario fixtures.
fn fixtures_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios")
}

/// Load and deserialize a JSON fixture file.
///
/// # Panics
/// Panics if the file doesn't exist or can't be deserialized.
pub fn load_fixture<T: DeserializeOwned>(relative_path: &str) -> T {
    let path = fixtures_root().join(relative_path);
    let content = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read fixture {}: {}", path.display(), e));
    serde_json::from_str(&content)
        .unwrap_or_else(|e| panic!("Failed to parse fixture {}: {}", path.display(), e))
}

/// Check that a fixture file exists.
pub fn fixture_exists(relative_path: &str) -> bool {
    fixtures_root().join(relative_path).exists()
}

/// List all scenario files.
pub fn list_fixtures() -> Vec<PathBuf> {
    let dir = fixtures_root();
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return Vec::new();
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| {
            let path = entry.ok()?.path();
            path.extension().is_some_and(|ext| ext == "json").then_some(path)
        })
        .collect();
    paths.sort();
    paths
}

/// A scripted server conversation plus what the test should observe.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Replies served in order; once exhausted the transport echoes.
    #[serde(default)]
    pub replies: Vec<ScriptedReply>,
    #[serde(default)]
    pub expect: ScenarioExpectations,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScenarioExpectations {
    /// Total requests the server should see.
    pub requests: Option<usize>,
    /// `"METHOD /path"` of each request, in order. Ids are not included for
    /// resources whose id the server assigns.
    #[serde(default)]
    pub methods: Vec<String>,
    /// Gaps between consecutive attempts, in seconds.
    #[serde(default)]
    pub retry_delays_secs: Vec<u64>,
    /// Final status of the scenario's last mutation, if it stays queued.
    pub final_status: Option<String>,
    pub pending_count: Option<usize>,
}

/// Load a scenario by file stem, e.g. `load_scenario("conflict")`.
pub fn load_scenario(name: &str) -> Scenario {
    load_fixture(&format!("{name}.json"))
}
