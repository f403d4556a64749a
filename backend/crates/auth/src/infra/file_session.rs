//! File-Backed Session Store
//!
//! One JSON file per session, named `session_<id>`, inside a single
//! directory. Writes go to a temp file in the same directory followed by a
//! rename, so readers never observe a half-written record.

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration as StdDuration, SystemTime};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::domain::entity::{Session, session::SessionId};
use crate::domain::repository::SessionRepository;
use crate::error::{AuthError, AuthResult};

const FILE_PREFIX: &str = "session_";
const TEMP_MARKER: &str = ".tmp.";

/// Temp files older than this are leftovers of interrupted writes
const STALE_TEMP_AGE: StdDuration = StdDuration::from_secs(60);

#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Open (and create if needed) the session directory
    pub async fn open(dir: impl Into<PathBuf>) -> AuthResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        tracing::debug!(dir = %dir.display(), "Session store ready");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &SessionId) -> PathBuf {
        self.dir.join(format!("{}{}", FILE_PREFIX, id))
    }

    fn temp_path_for(&self, id: &SessionId) -> PathBuf {
        self.dir.join(format!(
            ".{}{}{}{}",
            FILE_PREFIX,
            id,
            TEMP_MARKER,
            uuid::Uuid::new_v4().simple()
        ))
    }

    async fn read_record(path: &Path, id: SessionId) -> AuthResult<Option<Session>> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let values: Map<String, Value> = serde_json::from_str(&contents).map_err(|e| {
            AuthError::SessionCorrupted(format!("session {} is unreadable: {}", id, e))
        })?;
        Ok(Some(Session::from_values(id, values)))
    }

    async fn remove_ignoring_missing(path: &Path) -> AuthResult<bool> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl SessionRepository for FileSessionStore {
    async fn load(&self, id: &SessionId) -> AuthResult<Option<Session>> {
        Self::read_record(&self.path_for(id), id.clone()).await
    }

    async fn save(&self, session: &Session) -> AuthResult<()> {
        let contents = serde_json::to_vec(session.values())
            .map_err(|e| AuthError::Internal(format!("Failed to encode session: {}", e)))?;

        let tmp_path = self.temp_path_for(&session.id);
        if let Err(e) = tokio::fs::write(&tmp_path, &contents).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp_path, self.path_for(&session.id)).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> AuthResult<()> {
        Self::remove_ignoring_missing(&self.path_for(id)).await?;
        Ok(())
    }

    async fn clean_expired(&self, cutoff: DateTime<Utc>) -> AuthResult<u64> {
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let path = entry.path();

            if name.contains(TEMP_MARKER) {
                let stale = entry
                    .metadata()
                    .await
                    .and_then(|m| m.modified())
                    .map(|modified| {
                        SystemTime::now()
                            .duration_since(modified)
                            .is_ok_and(|age| age >= STALE_TEMP_AGE)
                    })
                    .unwrap_or(false);
                if stale && Self::remove_ignoring_missing(&path).await? {
                    removed += 1;
                }
                continue;
            }

            let Some(id) = name.strip_prefix(FILE_PREFIX).and_then(SessionId::parse) else {
                continue;
            };

            let expired = match Self::read_record(&path, id).await {
                Ok(Some(session)) => session.created_at().map_or(true, |created| created < cutoff),
                Ok(None) => false,
                Err(AuthError::SessionCorrupted(_)) => true,
                Err(e) => return Err(e),
            };
            if expired && Self::remove_ignoring_missing(&path).await? {
                removed += 1;
            }
        }

        Ok(removed)
    }
}
