use crate::error::Result;
use maestro_protocol::{encode_line, Notification, ProgressParams};
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// Output stream shared between the response writer and the progress sink,
/// so frames never interleave mid-line.
pub(crate) type SharedWriter = Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

/// Emits `$/progress` notifications for the request currently being
/// processed. Notifications carry no id, so the orchestrator can never
/// mistake one for the response.
#[derive(Clone)]
pub struct ProgressSink {
    writer: SharedWriter,
    server: String,
}

impl ProgressSink {
    pub(crate) fn new(writer: SharedWriter, server: impl Into<String>) -> Self {
        Self {
            writer,
            server: server.into(),
        }
    }

    /// Write one progress frame. `progress` is clamped to `[0.0, 1.0]`.
    pub async fn emit(&self, message: impl Into<String>, progress: f64) -> Result<()> {
        let note = Notification::progress(&ProgressParams {
            message: message.into(),
            progress: progress.clamp(0.0, 1.0),
            server: Some(self.server.clone()),
        });
        let line = encode_line(&note)?;
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}
