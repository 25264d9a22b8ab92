// src/persistence/mod.rs
mod error;

pub use error::PersistError;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Durable mirror of the Registry's backend url list.
///
/// `Persister` only ever persists urls -- `in_flight` and `healthy` are
/// runtime-only and are reconstructed (as `0` / `false`) the next time a
/// roster is loaded into a fresh Registry.
#[derive(Clone)]
pub struct Persister {
    path: PathBuf,
}

#[derive(Serialize, Deserialize, Default)]
struct Roster {
    #[serde(default)]
    backends: Vec<String>,
}

impl Persister {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the persisted roster. Never fails: a missing file, an
    /// unparseable file, or a file lacking the expected `{"backends": [...]}`
    /// shape all fall back to an empty roster with a warning, so a corrupt
    /// `backends.json` can never keep the process from starting.
    pub async fn load(&self) -> Vec<String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => match serde_json::from_str::<Roster>(&contents) {
                Ok(roster) => roster.backends,
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %e,
                        "backends file is not valid JSON, starting with an empty roster"
                    );
                    Vec::new()
                }
            },
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "could not read backends file, starting with an empty roster"
                );
                Vec::new()
            }
        }
    }

    /// Persist `roster` as `{"backends": [...]}` with two-space indentation,
    /// replacing the file's contents. A write failure is logged and leaves
    /// the in-memory Registry untouched -- there is no rollback, matching
    /// the design's documented failure policy. The next successful save
    /// re-establishes durability.
    pub async fn save(&self, roster: &[String]) {
        if let Err(e) = self.try_save(roster).await {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to persist backend roster");
        }
    }

    async fn try_save(&self, roster: &[String]) -> Result<(), PersistError> {
        let document = Roster {
            backends: roster.to_vec(),
        };
        let serialized = serde_json::to_string_pretty(&document)?;
        tokio::fs::write(&self.path, serialized).await?;
        tracing::info!(backends = ?roster, "persisted backend roster");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("lor-balancer-test-{}-{}.json", std::process::id(), name))
    }

    #[tokio::test]
    async fn load_on_missing_file_returns_empty_roster() {
        let persister = Persister::new(temp_path("missing"));
        assert_eq!(persister.load().await, Vec::<String>::new());
    }

    #[tokio::test]
    async fn load_on_malformed_json_returns_empty_roster() {
        let path = temp_path("malformed");
        tokio::fs::write(&path, b"not json at all").await.unwrap();
        let persister = Persister::new(&path);
        assert_eq!(persister.load().await, Vec::<String>::new());
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn save_then_load_roundtrips_the_roster_and_its_order() {
        let path = temp_path("roundtrip");
        let persister = Persister::new(&path);
        let roster = vec![
            "https://a.example:8001".to_string(),
            "https://b.example:8002".to_string(),
        ];

        persister.save(&roster).await;
        let loaded = persister.load().await;

        assert_eq!(loaded, roster);
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn saved_file_uses_two_space_indentation() {
        let path = temp_path("formatting");
        let persister = Persister::new(&path);
        persister.save(&["https://a.example".to_string()]).await;

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(contents.contains("\n  \"backends\""));
        let _ = tokio::fs::remove_file(&path).await;
    }
}
