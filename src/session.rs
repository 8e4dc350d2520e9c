use std::collections::HashMap;
use std::sync::Mutex;

use crate::core::types::{ConversationMessage, Session};
use crate::error::CoreError;
use crate::persist;

const IDLE_TTL: std::time::Duration = std::time::Duration::from_secs(60 * 60 * 2);

/// Per-session conversation transcripts, one JSON file per session under the
/// persisted-state layout. Summary caching lives alongside the in-memory
/// session map, matching `context_manager.py::ContextManager`'s
/// `conversation_summaries` dict (keyed by session id, cleared on demand).
pub struct SessionStore {
    dir: std::path::PathBuf,
    sessions: Mutex<HashMap<String, Session>>,
}

fn session_path(dir: &std::path::Path, session_id: &str) -> std::path::PathBuf {
    let safe: String = session_id
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    dir.join(format!("{safe}.json"))
}

impl SessionStore {
    pub fn new(dir: std::path::PathBuf) -> Self {
        Self {
            dir,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get_or_create(&self, session_id: &str) -> Result<Session, CoreError> {
        if let Some(session) = self.sessions.lock().unwrap().get(session_id).cloned() {
            return Ok(session);
        }

        let path = session_path(&self.dir, session_id);
        let loaded = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Session>(&bytes).ok(),
            Err(_) => None,
        };

        let session = loaded.unwrap_or_else(|| {
            let now = chrono::Utc::now();
            Session {
                session_id: session_id.to_string(),
                history: Vec::new(),
                summary: None,
                created_at: now,
                last_active_at: now,
            }
        });

        self.sessions
            .lock()
            .unwrap()
            .insert(session_id.to_string(), session.clone());
        Ok(session)
    }

    pub async fn append_message(
        &self,
        session_id: &str,
        message: ConversationMessage,
    ) -> Result<(), CoreError> {
        let mut session = self.get_or_create(session_id).await?;
        session.history.push(message);
        session.last_active_at = chrono::Utc::now();
        self.persist(&session).await?;
        self.sessions
            .lock()
            .unwrap()
            .insert(session_id.to_string(), session);
        Ok(())
    }

    pub fn cache_summary(&self, session_id: &str, summary: String) {
        if let Some(session) = self.sessions.lock().unwrap().get_mut(session_id) {
            session.summary = Some(summary);
        }
    }

    pub fn cached_summary(&self, session_id: &str) -> Option<String> {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .and_then(|s| s.summary.clone())
    }

    pub fn clear_summary(&self, session_id: &str) {
        if let Some(session) = self.sessions.lock().unwrap().get_mut(session_id) {
            session.summary = None;
        }
    }

    async fn persist(&self, session: &Session) -> Result<(), CoreError> {
        persist::ensure_dir(&self.dir).await?;
        let path = session_path(&self.dir, &session.session_id);
        let bytes = serde_json::to_vec_pretty(session).map_err(|e| CoreError::Other(e.into()))?;
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| CoreError::Other(e.into()))
    }

    /// Evicts in-memory sessions idle past `IDLE_TTL`; the on-disk
    /// transcript is left untouched so a later request still resumes it.
    pub fn sweep_idle(&self) {
        let now = chrono::Utc::now();
        self.sessions.lock().unwrap().retain(|_, s| {
            now.signed_duration_since(s.last_active_at)
                .to_std()
                .map(|d| d < IDLE_TTL)
                .unwrap_or(true)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_or_create_returns_fresh_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().to_path_buf());
        let session = store.get_or_create("abc").await.unwrap();
        assert_eq!(session.session_id, "abc");
        assert!(session.history.is_empty());
    }

    #[tokio::test]
    async fn append_message_persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().to_path_buf());
        store
            .append_message(
                "s1",
                ConversationMessage {
                    role: "user".to_string(),
                    content: "hi".to_string(),
                    timestamp: chrono::Utc::now(),
                    sources: vec![],
                },
            )
            .await
            .unwrap();
        let path = session_path(dir.path(), "s1");
        assert!(path.exists());
    }
}
