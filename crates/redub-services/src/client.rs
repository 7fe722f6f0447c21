//! HTTP collaborators: track byte fetch and final-mix persistence.

use std::io::Read;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("track not found: {0}")]
    NotFound(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    BadResponse(String),
}

/// Retrieves raw encoded audio for a track or recording by identifier.
pub trait TrackStore {
    fn fetch_track_bytes(&self, track_id: &str) -> Result<Vec<u8>, StoreError>;
}

/// Persists a rendered mix container.
pub trait MixStore {
    fn persist_final_mix(&self, wav: &[u8], meta: &MixMetadata) -> Result<PersistAck, StoreError>;
}

/// Metadata accompanying a persisted mix. A present `recording_id` means
/// re-save (update); absent means first save (create).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixMetadata {
    pub name: String,
    pub song_id: String,
    pub recording_id: Option<String>,
}

/// Server acknowledgement for a persisted mix.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PersistAck {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
}

/// API endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub token: Option<String>,
}

/// ureq-backed store talking to the recording REST API.
pub struct HttpStore {
    config: ApiConfig,
    agent: ureq::Agent,
}

impl HttpStore {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            config,
            agent: ureq::agent(),
        }
    }

    fn authorize(&self, request: ureq::Request) -> ureq::Request {
        match &self.config.token {
            Some(token) => request.set("Authorization", &format!("Bearer {token}")),
            None => request,
        }
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn map_error(track_id: &str, err: ureq::Error) -> StoreError {
    match err {
        ureq::Error::Status(404, _) => StoreError::NotFound(track_id.to_string()),
        ureq::Error::Status(code, _) => StoreError::BadResponse(format!("status {code}")),
        ureq::Error::Transport(t) => StoreError::Transport(t.to_string()),
    }
}

impl TrackStore for HttpStore {
    fn fetch_track_bytes(&self, track_id: &str) -> Result<Vec<u8>, StoreError> {
        let url = join_url(&self.config.base_url, track_id);
        let response = self
            .authorize(self.agent.get(&url))
            .call()
            .map_err(|e| map_error(track_id, e))?;

        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        info!(track_id, bytes = bytes.len(), "fetched track");
        Ok(bytes)
    }
}

impl MixStore for HttpStore {
    fn persist_final_mix(&self, wav: &[u8], meta: &MixMetadata) -> Result<PersistAck, StoreError> {
        let request = match &meta.recording_id {
            Some(id) => self
                .agent
                .put(&join_url(&self.config.base_url, &format!("recordings/{id}")))
                .query("name", &meta.name),
            None => self
                .agent
                .post(&join_url(&self.config.base_url, "recordings"))
                .query("name", &meta.name)
                .query("song_id", &meta.song_id),
        };

        let response = self
            .authorize(request.set("Content-Type", "audio/wav"))
            .send_bytes(wav)
            .map_err(|e| map_error(&meta.name, e))?;

        let mut body = String::new();
        response
            .into_reader()
            .read_to_string(&mut body)
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let ack = if body.trim().is_empty() {
            PersistAck::default()
        } else {
            serde_json::from_str(&body).map_err(|e| StoreError::BadResponse(e.to_string()))?
        };

        info!(name = %meta.name, update = meta.recording_id.is_some(), "persisted mix");
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url_normalizes_slashes() {
        assert_eq!(join_url("http://api/", "/tracks/1"), "http://api/tracks/1");
        assert_eq!(join_url("http://api", "tracks/1"), "http://api/tracks/1");
    }

    #[test]
    fn test_persist_ack_parsing() {
        let ack: PersistAck = serde_json::from_str(r#"{"id": 7, "name": "Take 1"}"#).unwrap();
        assert_eq!(ack.id, Some(7));
        assert_eq!(ack.name.as_deref(), Some("Take 1"));

        // Extra fields are ignored, missing fields default
        let ack: PersistAck = serde_json::from_str(r#"{"ok": true}"#).unwrap();
        assert_eq!(ack.id, None);
    }
}
