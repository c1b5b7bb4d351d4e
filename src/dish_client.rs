use serde_json::Value;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;

use crate::error::{DishError, DishResult};

/// gRPC method every dish request goes through.
pub const DEVICE_METHOD: &str = "SpaceX.API.Device.Device/Handle";

const STATUS_REQUEST: &str = r#"{"get_status":{}}"#;
const CLEAR_OBSTRUCTION_MAP_REQUEST: &str = r#"{"dish_clear_obstruction_map":{}}"#;

/// Status responses arrive wrapped in one of these, depending on how the
/// response was rendered.
const STATUS_ENVELOPES: &[&str] = &["dishGetStatus", "dish_get_status"];

/// Capability of the external dish-control client.
///
/// Some client versions need a reusable session handle and some do not, so
/// `connect` may return `None` and every call takes an optional session. A
/// call that does not accept the handle returns [`DishError::SessionRejected`]
/// and the caller retries without it.
pub trait DishClient: Send + Sync + 'static {
    type Session: Send + Sync + 'static;

    fn connect(&self) -> impl Future<Output = DishResult<Option<Self::Session>>> + Send;

    fn get_status(
        &self,
        session: Option<&Self::Session>,
    ) -> impl Future<Output = DishResult<Value>> + Send;

    fn reset_obstruction_map(
        &self,
        session: Option<&Self::Session>,
    ) -> impl Future<Output = DishResult<()>> + Send;
}

/// Handle to a dish endpoint whose tooling has been verified.
#[derive(Debug, Clone)]
pub struct DishChannel {
    pub target: String,
}

/// Talks to the dish by running `grpcurl` against its local gRPC endpoint.
///
/// Each call is a separate process bounded by `timeout`; the child is killed
/// if the call is abandoned.
pub struct GrpcurlClient {
    binary: PathBuf,
    target: String,
    timeout: Duration,
}

impl GrpcurlClient {
    pub fn new(binary: impl Into<PathBuf>, target: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            target: target.into(),
            timeout,
        }
    }

    async fn run(&self, args: &[&str]) -> DishResult<Output> {
        let mut command = Command::new(&self.binary);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) if e.kind() == io::ErrorKind::NotFound => Err(DishError::Unavailable(
                format!("{} not found", self.binary.display()),
            )),
            Ok(Err(e)) => Err(DishError::Unavailable(format!(
                "failed to run {}: {}",
                self.binary.display(),
                e
            ))),
            Err(_) => Err(DishError::Timeout(self.timeout)),
        }
    }

    async fn handle(
        &self,
        session: Option<&DishChannel>,
        request: &str,
        capability: &str,
    ) -> DishResult<String> {
        let target = session.map(|s| s.target.as_str()).unwrap_or(self.target.as_str());
        let max_time = self.timeout.as_secs().max(1).to_string();
        let output = self
            .run(&["-plaintext", "-max-time", max_time.as_str(), "-d", request, target, DEVICE_METHOD])
            .await?;

        if !output.status.success() {
            return Err(classify_failure(
                capability,
                &String::from_utf8_lossy(&output.stderr),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl DishClient for GrpcurlClient {
    type Session = DishChannel;

    async fn connect(&self) -> DishResult<Option<DishChannel>> {
        let output = self.run(&["-version"]).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let client_version = [stdout.trim(), stderr.trim()]
            .into_iter()
            .find(|s| !s.is_empty())
            .unwrap_or("unknown")
            .to_string();

        log::info!("[DISH] {} ready for {}", client_version, self.target);
        Ok(Some(DishChannel {
            target: self.target.clone(),
        }))
    }

    async fn get_status(&self, session: Option<&DishChannel>) -> DishResult<Value> {
        let stdout = self.handle(session, STATUS_REQUEST, "get_status").await?;
        parse_status(&stdout)
    }

    async fn reset_obstruction_map(&self, session: Option<&DishChannel>) -> DishResult<()> {
        self.handle(session, CLEAR_OBSTRUCTION_MAP_REQUEST, "reset_obstruction_map")
            .await
            .map(|_| ())
    }
}

/// Decode a status response, unwrapping the per-request envelope if present.
pub fn parse_status(stdout: &str) -> DishResult<Value> {
    let value: Value =
        serde_json::from_str(stdout).map_err(|e| DishError::Decode(e.to_string()))?;

    let inner = STATUS_ENVELOPES
        .iter()
        .find_map(|key| value.get(*key).filter(|v| v.is_object()).cloned());
    Ok(inner.unwrap_or(value))
}

/// Map a failed grpcurl run to an error. The dish answers `Unimplemented`
/// for requests its firmware does not know.
fn classify_failure(capability: &str, stderr: &str) -> DishError {
    if stderr.contains("Code: Unimplemented") {
        return DishError::Unsupported {
            capability: capability.to_string(),
        };
    }

    let message = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && *line != "ERROR:")
        .collect::<Vec<_>>()
        .join(" ");
    if message.is_empty() {
        DishError::Fetch(format!("{} failed", capability))
    } else {
        DishError::Fetch(message)
    }
}
