//! Platform browser-open helper for the interactive renderer's `o` action
//! (spec §4.F "Open action", §6.3).

/// Opens `url` in the platform's default browser. Best-effort: failures are
/// logged, never fatal — the renderer keeps running either way.
pub fn open(url: &str) {
    let result = spawn_opener(url);
    if let Err(e) = result {
        tracing::warn!(error = %e, url, "failed to open browser");
    }
}

#[cfg(target_os = "windows")]
fn spawn_opener(url: &str) -> std::io::Result<std::process::Child> {
    std::process::Command::new("cmd")
        .args(["/c", "start", url])
        .spawn()
}

#[cfg(target_os = "macos")]
fn spawn_opener(url: &str) -> std::io::Result<std::process::Child> {
    std::process::Command::new("open").arg(url).spawn()
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn spawn_opener(url: &str) -> std::io::Result<std::process::Child> {
    std::process::Command::new("xdg-open").arg(url).spawn()
}
