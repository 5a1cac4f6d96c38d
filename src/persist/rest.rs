// src/persist/rest.rs
//! REST-backed store: PostgREST row operations plus an object-storage
//! upload endpoint, authenticated with a service-role key.

use std::time::Duration;

use log::info;
use serde_json::{json, Value};

use crate::config::StoreConfig;
use crate::core::error::PersistError;
use crate::persist::store::{
    AuditEntry, PersistStore, PredictionRow, RecordingRow, SessionStatus, SeverityRow,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RestStore {
    agent: ureq::Agent,
    base_url: String,
    service_key: String,
}

impl RestStore {
    pub fn new(cfg: &StoreConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(REQUEST_TIMEOUT)
            .build();
        Self {
            agent,
            base_url: cfg.url.trim_end_matches('/').to_string(),
            service_key: cfg.service_key.clone(),
        }
    }

    fn authed(&self, req: ureq::Request) -> ureq::Request {
        req.set("apikey", &self.service_key)
            .set("Authorization", &format!("Bearer {}", self.service_key))
    }

    fn map_err(context: &str, err: ureq::Error) -> PersistError {
        match err {
            ureq::Error::Status(status, _) => PersistError::Status {
                context: context.to_string(),
                status,
            },
            other => PersistError::Transport {
                context: context.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Insert a row and return the representation id from the response.
    fn insert_returning(&self, table: &str, body: &Value) -> Result<String, PersistError> {
        let context = format!("insert into {table}");
        let url = format!("{}/rest/v1/{table}", self.base_url);
        let response = self
            .authed(self.agent.post(&url))
            .set("Content-Type", "application/json")
            .set("Prefer", "return=representation")
            .send_string(&body.to_string())
            .map_err(|e| Self::map_err(&context, e))?;

        let rows: Value = response.into_json().map_err(|e| PersistError::Io {
            context: context.clone(),
            source: e,
        })?;
        let id = rows
            .get(0)
            .and_then(|row| row.get("id"))
            .map(|id| match id {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .ok_or(PersistError::BadResponse { context })?;
        Ok(id)
    }

    fn insert(&self, table: &str, body: &Value) -> Result<(), PersistError> {
        let context = format!("insert into {table}");
        let url = format!("{}/rest/v1/{table}", self.base_url);
        self.authed(self.agent.post(&url))
            .set("Content-Type", "application/json")
            .send_string(&body.to_string())
            .map_err(|e| Self::map_err(&context, e))?;
        Ok(())
    }

    fn update(&self, table: &str, id: &str, body: &Value) -> Result<(), PersistError> {
        let context = format!("update {table} {id}");
        let url = format!("{}/rest/v1/{table}?id=eq.{id}", self.base_url);
        self.authed(self.agent.request("PATCH", &url))
            .set("Content-Type", "application/json")
            .send_string(&body.to_string())
            .map_err(|e| Self::map_err(&context, e))?;
        Ok(())
    }
}

impl PersistStore for RestStore {
    fn get_session(&self, session_id: &str) -> Result<Option<Value>, PersistError> {
        let context = format!("get session {session_id}");
        let url = format!(
            "{}/rest/v1/sessions?id=eq.{session_id}&select=*",
            self.base_url
        );
        let response = self
            .authed(self.agent.get(&url))
            .call()
            .map_err(|e| Self::map_err(&context, e))?;
        let rows: Value = response.into_json().map_err(|e| PersistError::Io {
            context,
            source: e,
        })?;
        Ok(rows.get(0).cloned())
    }

    fn update_session_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        ended_at: Option<&str>,
    ) -> Result<(), PersistError> {
        let mut body = json!({ "status": status.as_str() });
        if let Some(ended) = ended_at {
            body["ended_at"] = json!(ended);
        }
        self.update("sessions", session_id, &body)?;
        info!("[persist] session {session_id} status -> {status}");
        Ok(())
    }

    fn update_device_last_seen(&self, device_id: &str, seen_at: &str) -> Result<(), PersistError> {
        self.update("devices", device_id, &json!({ "last_seen_at": seen_at }))
    }

    fn upload_file(
        &self,
        bucket: &str,
        path: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<(), PersistError> {
        let context = format!("upload {bucket}/{path}");
        let url = format!("{}/storage/v1/object/{bucket}/{path}", self.base_url);
        self.authed(self.agent.post(&url))
            .set("Content-Type", content_type)
            .send_bytes(data)
            .map_err(|e| Self::map_err(&context, e))?;
        info!("[persist] uploaded {} bytes to {bucket}/{path}", data.len());
        Ok(())
    }

    fn create_recording(&self, row: &RecordingRow) -> Result<String, PersistError> {
        let body = serde_json::to_value(row).unwrap_or(Value::Null);
        let id = self.insert_returning("recordings", &body)?;
        info!("[persist] created recording {id}");
        Ok(id)
    }

    fn create_prediction(&self, row: &PredictionRow) -> Result<String, PersistError> {
        let body = serde_json::to_value(row).unwrap_or(Value::Null);
        let id = self.insert_returning("predictions", &body)?;
        info!("[persist] created prediction {id}");
        Ok(id)
    }

    fn create_murmur_severity(&self, row: &SeverityRow) -> Result<String, PersistError> {
        let body = serde_json::to_value(row).unwrap_or(Value::Null);
        let id = self.insert_returning("murmur_severity", &body)?;
        info!("[persist] created murmur severity {id}");
        Ok(id)
    }

    fn create_live_metrics(
        &self,
        org_id: &str,
        session_id: &str,
        metrics: &Value,
    ) -> Result<(), PersistError> {
        self.insert(
            "live_metrics",
            &json!({
                "org_id": org_id,
                "session_id": session_id,
                "metrics_json": metrics,
            }),
        )
    }

    fn create_audit_log(&self, entry: &AuditEntry) -> Result<(), PersistError> {
        let body = serde_json::to_value(entry).unwrap_or(Value::Null);
        self.insert("audit_logs", &body)
    }
}
