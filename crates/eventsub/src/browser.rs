//! Opening URLs in the user's browser.

use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

fn opener(url: &str) -> Command {
    if cfg!(target_os = "macos") {
        let mut command = Command::new("open");
        command.arg(url);
        command
    } else if cfg!(target_os = "windows") {
        // The empty argument is the window title `start` expects first.
        let mut command = Command::new("cmd");
        command.args(["/C", "start", ""]).arg(url);
        command
    } else {
        let mut command = Command::new("xdg-open");
        command.arg(url);
        command
    }
}

/// Open `url` with the platform's default handler.
pub async fn open_url(url: &str) -> Result<()> {
    let mut command = opener(url);
    debug!(?command, "Opening URL");
    let status = command.status().await?;
    if status.success() {
        Ok(())
    } else {
        Err(Error::Io(std::io::Error::other(format!(
            "browser opener exited with {status}"
        ))))
    }
}
