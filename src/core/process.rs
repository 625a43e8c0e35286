use udb_core::fs_paths::{AppPaths, DesktopPaths};

fn enhanced_path() -> Option<String> {
    let bin_dir = DesktopPaths.bin_dir()?;
    let sep = if cfg!(windows) { ";" } else { ":" };
    let current = std::env::var("PATH").unwrap_or_default();
    Some(format!("{}{}{}", bin_dir.display(), sep, current))
}

/// Async command with the managed `bin` directory prepended to `PATH`, so a
/// locally installed ffmpeg wins over the system one.
pub fn command<S: AsRef<std::ffi::OsStr>>(program: S) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    #[cfg(target_os = "windows")]
    cmd.creation_flags(0x08000000);
    if let Some(path) = enhanced_path() {
        cmd.env("PATH", path);
    }
    cmd.kill_on_drop(true);
    cmd
}
