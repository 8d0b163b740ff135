use audion_backends::{Alert, Host};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use url::Url;

/// Host hooks for a terminal session.
pub struct CliHost;

impl Host for CliHost {
    fn alert(&self, alert: &Alert) {
        error!(message = %alert.message, detail = %alert.informative, "playback alert");
        eprintln!("\n{}: {}", alert.message, alert.informative);
    }

    fn request_open_document(&self) {
        println!("\nNothing to play. Use `open <path or url>`.");
    }

    fn open_external(&self, url: &Url) -> bool {
        println!("\nOpen this page to continue:\n  {url}");
        launch(opener(url)).is_some()
    }

    fn authorization_fallback(&self) {
        debug!("command ignored until authorization completes");
        println!("\nNot authorized yet. Finish signing in in the browser, or run `audion auth login`.");
    }
}

/// Spawns `cmd` and reaps it in the background.
fn launch(mut cmd: tokio::process::Command) -> Option<JoinHandle<()>> {
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            warn!(error=%err, "failed to launch browser");
            return None;
        }
    };
    Some(tokio::spawn(async move {
        match child.wait().await {
            Ok(status) if !status.success() => {
                warn!(%status, "browser launcher exited with failure")
            }
            Ok(_) => {}
            Err(err) => warn!(error=%err, "failed to wait for browser launcher"),
        }
    }))
}

#[cfg(target_os = "macos")]
fn opener(url: &Url) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new("open");
    cmd.arg(url.as_str());
    cmd
}

#[cfg(target_os = "windows")]
fn opener(url: &Url) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new("cmd");
    cmd.args(["/C", "start", "", url.as_str()]);
    cmd
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn opener(url: &Url) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new("xdg-open");
    cmd.arg(url.as_str());
    cmd
}
