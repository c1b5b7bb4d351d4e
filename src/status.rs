use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

use crate::alignment::{classify, AlignmentVerdict};
use crate::dish_client::DishClient;
use crate::error::{DishError, DishResult};
use crate::summary::NormalizedSummary;

/// One successful status poll: the normalized readings, the alignment
/// verdict and the payload they were derived from.
#[derive(Serialize, Clone, Debug)]
pub struct StatusReport {
    pub ts: i64,
    pub summary: NormalizedSummary,
    pub alignment: AlignmentVerdict,
    pub raw: Value,
}

impl StatusReport {
    pub fn from_raw(raw: Value) -> Self {
        Self {
            ts: current_timestamp(),
            summary: NormalizedSummary::from_payload(&raw),
            alignment: classify(&raw),
            raw,
        }
    }

    /// Obstruction fraction, preferring the summary over the classifier's copy.
    pub fn obstruction_fraction(&self) -> Option<f64> {
        self.summary
            .obstruction_fraction
            .or(self.alignment.obstruction_fraction)
    }
}

/// Shared front door to the dish, used by both the HTTP handlers and the
/// scheduler. Owns the lazily created session.
pub struct StatusService<C: DishClient> {
    client: C,
    session: Mutex<Option<Arc<C::Session>>>,
}

impl<C: DishClient> StatusService<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            session: Mutex::new(None),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Session handle, created on first use. The lock is held while
    /// connecting so concurrent first callers share one session.
    async fn session(&self) -> DishResult<Option<Arc<C::Session>>> {
        let mut slot = self.session.lock().await;
        if let Some(session) = slot.as_ref() {
            return Ok(Some(Arc::clone(session)));
        }

        match self.client.connect().await? {
            Some(session) => {
                let session = Arc::new(session);
                *slot = Some(Arc::clone(&session));
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    async fn fetch_raw(&self) -> DishResult<Value> {
        let session = self.session().await?;
        match session.as_deref() {
            Some(session) => match self.client.get_status(Some(session)).await {
                Err(DishError::SessionRejected) => self.client.get_status(None).await,
                result => result,
            },
            None => self.client.get_status(None).await,
        }
    }

    pub async fn status(&self) -> DishResult<StatusReport> {
        let raw = self.fetch_raw().await?;
        Ok(StatusReport::from_raw(raw))
    }

    /// A status poll whose only purpose is keeping the dish session warm.
    pub async fn keepalive(&self) -> DishResult<i64> {
        self.status().await.map(|report| report.ts)
    }

    pub async fn reset_obstruction_map(&self) -> DishResult<i64> {
        let session = self.session().await?;
        match session.as_deref() {
            Some(session) => match self.client.reset_obstruction_map(Some(session)).await {
                Err(DishError::SessionRejected) => self.client.reset_obstruction_map(None).await,
                result => result,
            },
            None => self.client.reset_obstruction_map(None).await,
        }?;
        Ok(current_timestamp())
    }
}

/// Body of `GET /api/status`.
#[derive(Serialize, Debug, Default)]
pub struct StatusResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<NormalizedSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alignment: Option<AlignmentVerdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<DishResult<StatusReport>> for StatusResponse {
    fn from(result: DishResult<StatusReport>) -> Self {
        match result {
            Ok(report) => Self {
                ok: true,
                ts: Some(report.ts),
                summary: Some(report.summary),
                alignment: Some(report.alignment),
                raw: Some(report.raw),
                error: None,
            },
            Err(e) => Self {
                ok: false,
                error: Some(e.to_string()),
                ..Self::default()
            },
        }
    }
}

/// Body of the keep-alive and reset endpoints.
#[derive(Serialize, Debug, PartialEq)]
pub struct ActionResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResponse {
    /// `fallback` stands in for an error that carries no message.
    pub fn from_result(result: DishResult<i64>, fallback: &str) -> Self {
        match result {
            Ok(ts) => Self {
                ok: true,
                ts: Some(ts),
                error: None,
            },
            Err(e) => {
                let message = e.to_string();
                Self {
                    ok: false,
                    ts: None,
                    error: Some(if message.is_empty() {
                        fallback.to_string()
                    } else {
                        message
                    }),
                }
            }
        }
    }
}

#[derive(Serialize, Debug)]
pub struct HealthResponse {
    pub ok: bool,
    pub ts: i64,
}

impl HealthResponse {
    pub fn now() -> Self {
        Self {
            ok: true,
            ts: current_timestamp(),
        }
    }
}

/// Unix seconds.
pub fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
