use super::types::{PersistedServiceState, StateDocument};
use super::{BACKUP_FILE_NAME, STATE_FILE_NAME};
use crate::error::{Error, Result};
use crate::service::LifecycleState;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// JSON persistence for per-service state with a backup copy.
///
/// Loads never fail: a broken primary falls back to the backup, a broken
/// backup to an empty map. Saves are atomic (temp file + rename) and
/// serialized through an async write gate so concurrent updates from the
/// event loop and action handlers cannot interleave their read-modify-write.
pub struct StateManager {
    state_path: PathBuf,
    backup_path: PathBuf,
    write_gate: Mutex<()>,
}

impl StateManager {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        let dir = state_dir.as_ref();
        Self {
            state_path: dir.join(STATE_FILE_NAME),
            backup_path: dir.join(BACKUP_FILE_NAME),
            write_gate: Mutex::new(()),
        }
    }

    pub fn state_file_path(&self) -> &Path {
        &self.state_path
    }

    pub fn backup_file_path(&self) -> &Path {
        &self.backup_path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.state_path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Create the state directory.
    pub async fn initialize(&self) -> Result<()> {
        if let Some(dir) = self.state_path.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                Error::Persistence(format!(
                    "Failed to create state directory '{}': {}",
                    dir.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    pub async fn load_state(&self) -> BTreeMap<String, PersistedServiceState> {
        match read_document(&self.state_path).await {
            Ok(Some(doc)) => return parse_state_data(&doc),
            Ok(None) => {}
            Err(e) => tracing::warn!(
                "State file '{}' is unreadable ({}), trying backup",
                self.state_path.display(),
                e
            ),
        }

        match read_document(&self.backup_path).await {
            Ok(Some(doc)) => {
                tracing::warn!("Restoring state from backup '{}'", self.backup_path.display());
                parse_state_data(&doc)
            }
            Ok(None) => {
                tracing::info!("No existing state file found, starting fresh");
                BTreeMap::new()
            }
            Err(e) => {
                tracing::error!(
                    "Backup state file '{}' is unreadable ({}), starting fresh",
                    self.backup_path.display(),
                    e
                );
                BTreeMap::new()
            }
        }
    }

    pub async fn get_service_state(&self, service_id: &str) -> Option<PersistedServiceState> {
        self.load_state().await.remove(service_id)
    }

    /// Replace the whole document.
    pub async fn save_state(&self, services: BTreeMap<String, PersistedServiceState>) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        self.write_atomic(&StateDocument::new(services)).await
    }

    /// Read-modify-write of one entry.
    pub async fn update_service_state(&self, entry: PersistedServiceState) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        let mut services = self.load_state().await;
        services.insert(entry.service_id.clone(), entry);
        self.write_atomic(&StateDocument::new(services)).await
    }

    /// Delete both files; missing files are fine.
    pub async fn clear_state(&self) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        for path in [&self.state_path, &self.backup_path] {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn write_atomic(&self, doc: &StateDocument) -> Result<()> {
        // A corrupt primary must never replace a good backup.
        match read_document(&self.state_path).await {
            Ok(Some(_)) => {
                if let Err(e) = tokio::fs::copy(&self.state_path, &self.backup_path).await {
                    tracing::warn!("Failed to back up state file: {}", e);
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(
                "Not backing up unreadable state file '{}': {}",
                self.state_path.display(),
                e
            ),
        }

        let body = serde_json::to_vec_pretty(doc)?;
        let temp = self.temp_path();
        let write = async {
            let mut file = tokio::fs::File::create(&temp).await?;
            file.write_all(&body).await?;
            file.sync_all().await?;
            tokio::fs::rename(&temp, &self.state_path).await
        };
        write.await.map_err(|e| {
            Error::Persistence(format!(
                "Failed to save state to '{}': {}",
                self.state_path.display(),
                e
            ))
        })
    }
}

/// `Ok(None)` when the file does not exist.
async fn read_document(path: &Path) -> Result<Option<Value>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn parse_state_data(doc: &Value) -> BTreeMap<String, PersistedServiceState> {
    let mut states = BTreeMap::new();
    let Some(services) = doc.get("services").and_then(Value::as_object) else {
        return states;
    };

    for (service_id, raw) in services {
        if !is_valid_persisted_state(raw) {
            tracing::warn!("Invalid persisted state for service '{}', skipping", service_id);
            continue;
        }
        match serde_json::from_value::<PersistedServiceState>(raw.clone()) {
            Ok(entry) => {
                states.insert(service_id.clone(), entry);
            }
            Err(e) => tracing::warn!(
                "Invalid persisted state for service '{}' ({}), skipping",
                service_id,
                e
            ),
        }
    }
    states
}

/// Structural check run before typed decoding.
pub(crate) fn is_valid_persisted_state(raw: &Value) -> bool {
    let has_id = raw.get("serviceId").and_then(Value::as_str).is_some();
    let known_state = raw
        .get("state")
        .and_then(Value::as_str)
        .is_some_and(|s| {
            serde_json::from_value::<LifecycleState>(Value::String(s.to_string())).is_ok()
        });
    let has_breaker = raw.get("circuitBreaker").is_some_and(Value::is_object);
    let has_attempts = raw.get("autoRestoreAttempts").is_some_and(Value::is_number);
    let has_change = raw.get("lastStateChange").is_some_and(Value::is_string);

    has_id && known_state && has_breaker && has_attempts && has_change
}
