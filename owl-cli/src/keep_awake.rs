use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Holds a `caffeinate` child on macOS so the machine stays awake while waiting.
///
/// The child is also tied to our pid (`-w`) and killed on drop, so it never
/// outlives the process.
#[derive(Debug, Default)]
pub struct KeepAwake {
    child: Option<Child>,
}

impl KeepAwake {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn start() -> Self {
        if !cfg!(target_os = "macos") {
            debug!("Keep-awake is only supported on macOS");
            return Self::disabled();
        }

        info!("Spawning caffeinate to keep the machine awake");
        let spawned = Command::new("caffeinate")
            .arg("-dims")
            .arg("-w")
            .arg(std::process::id().to_string())
            .kill_on_drop(true)
            .spawn();
        match spawned {
            Ok(child) => Self { child: Some(child) },
            Err(e) => {
                warn!(error = %e, "Failed to spawn caffeinate");
                Self::disabled()
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.child.is_some()
    }

    pub async fn stop(mut self) {
        if let Some(mut child) = self.child.take() {
            info!("Terminating caffeinate");
            if let Err(e) = child.kill().await {
                debug!(error = %e, "caffeinate already gone");
            }
        }
    }
}
