use anyhow::{Result, anyhow};
use directories::UserDirs;
use std::{env, fs, path::PathBuf};

/// `$GESTURESNAP_RUNTIME_DIR` or `~/.local/run`.
pub fn runtime_dir() -> Result<PathBuf> {
    let dir = match env::var_os("GESTURESNAP_RUNTIME_DIR") {
        Some(d) => PathBuf::from(d),
        None => UserDirs::new()
            .ok_or_else(|| anyhow!("cannot determine home directory"))?
            .home_dir()
            .join(".local")
            .join("run"),
    };
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn socket_path() -> Result<PathBuf> {
    Ok(runtime_dir()?.join("gesturesnap.sock"))
}
