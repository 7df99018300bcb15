// Background conversion runner
//
// A trigger spawns one session on tokio's blocking pool and gets back a
// handle. The handle can request cancellation and yields the session's
// structured result when awaited.

use colored::*;
use tokio::task::JoinHandle;
use tracing::info;

use super::error::{ConversionError, ConversionResult};
use super::pipeline::CancelFlag;
use super::resampling::{ResampleEngine, RubatoEngine};
use super::session::{ConversionReport, ConversionSession};
use crate::config::ConversionConfig;

/// Handle to a running conversion
pub struct ConversionHandle {
    session_id: String,
    cancel: CancelFlag,
    task: JoinHandle<ConversionResult<ConversionReport>>,
}

impl ConversionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Ask the session to stop at the next chunk boundary. Resources are
    /// still released and the partial output is kept.
    pub fn cancel(&self) {
        info!("⏹️ {}: cancel requested for {}", "RUNNER".yellow(), self.session_id);
        self.cancel.cancel();
    }

    /// Wait for the session to finish
    pub async fn join(self) -> ConversionResult<ConversionReport> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(ConversionError::Task(e.to_string())),
        }
    }
}

/// Start a conversion with the rubato engine. Must be called inside a tokio runtime.
pub fn spawn_conversion(config: ConversionConfig) -> ConversionHandle {
    spawn_conversion_with::<RubatoEngine>(config)
}

pub fn spawn_conversion_with<E: ResampleEngine + 'static>(config: ConversionConfig) -> ConversionHandle {
    let session = ConversionSession::new(config);
    let session_id = session.id().to_string();
    let cancel = CancelFlag::new();
    let task_cancel = cancel.clone();

    info!("🚀 {}: spawning session {}", "RUNNER".blue(), session_id);
    let task = tokio::task::spawn_blocking(move || session.run_with_engine::<E>(&task_cancel));

    ConversionHandle {
        session_id,
        cancel,
        task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_join_yields_report() {
        let temp_dir = TempDir::new().unwrap();
        let input_path = temp_dir.path().join("in.pcm");
        let output_path = temp_dir.path().join("out.pcm");
        // 441 frames of stereo f32 silence = 10 ms at 44.1 kHz
        std::fs::write(&input_path, vec![0u8; 441 * 8]).unwrap();

        let handle = spawn_conversion(ConversionConfig::for_files(&input_path, &output_path));
        let session_id = handle.session_id().to_string();
        let report = handle.join().await.unwrap();

        assert_eq!(report.session_id, session_id);
        assert_eq!(report.stats.input_frames, 441);
        assert_eq!(report.stats.output_frames, 480);
        assert_eq!(std::fs::metadata(&output_path).unwrap().len(), 480 * 4);
    }

    #[tokio::test]
    async fn test_join_surfaces_errors() {
        let temp_dir = TempDir::new().unwrap();
        let handle = spawn_conversion(ConversionConfig::for_files(
            temp_dir.path().join("missing.pcm"),
            temp_dir.path().join("out.pcm"),
        ));
        let err = handle.join().await.unwrap_err();
        assert_eq!(err.kind(), "source_unavailable");
    }
}
