//! Capture side effects for a fire: naming the file, running the configured
//! screen grabber, and picking a feedback line.

use anyhow::{Context, Result};
use log::{error, info};
use rand::seq::IndexedRandom;
use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
    thread,
    time::{SystemTime, UNIX_EPOCH},
};

use crate::config::Profile;

const FEEDBACK: [&str; 5] = [
    "Snap! You've got the shot!",
    "Great gesture! Picture perfect!",
    "Your hand is a star!",
    "Wow, you're a pro!",
    "Screenshot taken with style!",
];

pub const RECENT_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq)]
enum CaptureAction {
    Log,
    /// Shell command; `{file}` is replaced by the quoted capture path.
    Command(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRecord {
    pub path: PathBuf,
    pub unix_secs: u64,
    pub feedback: &'static str,
    /// False in log-only mode, where no file is written.
    pub grabbed: bool,
}

#[derive(Debug)]
pub struct CaptureSink {
    dir: PathBuf,
    prefix: String,
    action: CaptureAction,
    last_secs: u64,
    same_secs: u32,
}

impl CaptureSink {
    pub fn from_profile(p: &Profile) -> Self {
        let action = match p.capture.action.trim().strip_prefix("cmd:") {
            Some(cmd) => CaptureAction::Command(cmd.trim().to_string()),
            None => CaptureAction::Log,
        };
        Self {
            dir: p.capture_dir(),
            prefix: p.capture.prefix.clone(),
            action,
            last_secs: 0,
            same_secs: 0,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn capture(&mut self) -> Result<CaptureRecord> {
        let unix_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        self.capture_at(unix_secs)
    }

    /// The grab command runs on its own thread; its failure is logged there
    /// and never reaches the caller.
    pub fn capture_at(&mut self, unix_secs: u64) -> Result<CaptureRecord> {
        let name = self.next_file_name(unix_secs);
        let path = self.dir.join(name);
        let feedback = FEEDBACK
            .choose(&mut rand::rng())
            .copied()
            .unwrap_or(FEEDBACK[0]);

        let grabbed = match &self.action {
            CaptureAction::Log => {
                info!("capture triggered: {}", path.display());
                false
            }
            CaptureAction::Command(cmd) => {
                fs::create_dir_all(&self.dir)
                    .with_context(|| format!("failed to create {}", self.dir.display()))?;
                let line = expand_command(cmd, &path);
                let target = path.clone();
                thread::spawn(move || match Command::new("sh").arg("-c").arg(&line).status() {
                    Ok(st) if st.success() => info!("capture saved: {}", target.display()),
                    Ok(st) => error!("capture command exited with {st}: {line}"),
                    Err(e) => error!("capture command failed to start: {e}"),
                });
                true
            }
        };

        Ok(CaptureRecord {
            path,
            unix_secs,
            feedback,
            grabbed,
        })
    }

    // Short cooldowns can fire twice within a second; suffix those.
    fn next_file_name(&mut self, unix_secs: u64) -> String {
        if unix_secs == self.last_secs {
            self.same_secs += 1;
            format!("{}_{}_{}.png", self.prefix, unix_secs, self.same_secs)
        } else {
            self.last_secs = unix_secs;
            self.same_secs = 0;
            capture_file_name(&self.prefix, unix_secs)
        }
    }
}

pub fn capture_file_name(prefix: &str, unix_secs: u64) -> String {
    format!("{prefix}_{unix_secs}.png")
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

fn expand_command(cmd: &str, path: &Path) -> String {
    let quoted = shell_quote(&path.display().to_string());
    if cmd.contains("{file}") {
        cmd.replace("{file}", &quoted)
    } else {
        format!("{cmd} {quoted}")
    }
}

/// Newest `<prefix>_*.png` files in `dir`, most recent first.
pub fn recent_captures(dir: &Path, prefix: &str, limit: usize) -> Vec<PathBuf> {
    let head = format!("{prefix}_");
    let mut found: Vec<(SystemTime, PathBuf)> = Vec::new();
    if let Ok(rd) = fs::read_dir(dir) {
        for e in rd.flatten() {
            let path = e.path();
            let matches = path
                .file_name()
                .and_then(|s| s.to_str())
                .is_some_and(|s| s.starts_with(&head) && s.ends_with(".png"));
            if !matches {
                continue;
            }
            let mtime = e
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(UNIX_EPOCH);
            found.push((mtime, path));
        }
    }
    found.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
    found.into_iter().take(limit).map(|(_, p)| p).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink(action: CaptureAction) -> CaptureSink {
        CaptureSink {
            dir: PathBuf::from("/tmp/shots"),
            prefix: "screenshot".into(),
            action,
            last_secs: 0,
            same_secs: 0,
        }
    }

    #[test]
    fn names_follow_timestamp_scheme() {
        let mut s = sink(CaptureAction::Log);
        let rec = s.capture_at(1_700_000_000).unwrap();
        assert_eq!(rec.path, PathBuf::from("/tmp/shots/screenshot_1700000000.png"));
        assert!(FEEDBACK.contains(&rec.feedback));
        assert!(!rec.grabbed);
    }

    #[test]
    fn same_second_captures_get_suffixed() {
        let mut s = sink(CaptureAction::Log);
        let a = s.capture_at(42).unwrap();
        let b = s.capture_at(42).unwrap();
        let c = s.capture_at(43).unwrap();
        assert_eq!(a.path.file_name().unwrap(), "screenshot_42.png");
        assert_eq!(b.path.file_name().unwrap(), "screenshot_42_1.png");
        assert_eq!(c.path.file_name().unwrap(), "screenshot_43.png");
    }

    #[test]
    fn command_gets_quoted_path() {
        let p = Path::new("/tmp/my shots/screenshot_1.png");
        assert_eq!(
            expand_command("grim {file}", p),
            "grim '/tmp/my shots/screenshot_1.png'"
        );
        assert_eq!(
            expand_command("scrot", p),
            "scrot '/tmp/my shots/screenshot_1.png'"
        );
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn recent_of_missing_dir_is_empty() {
        let dir = Path::new("/nonexistent/gesturesnap/captures");
        assert!(recent_captures(dir, "screenshot", RECENT_LIMIT).is_empty());
    }

    #[test]
    fn recent_lists_newest_first() {
        use std::time::Duration;
        let dir = std::env::temp_dir().join(format!("gesturesnap-recent-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        for (i, name) in ["screenshot_1.png", "screenshot_3.png", "screenshot_2.png", "other_9.png"]
            .iter()
            .enumerate()
        {
            let f = fs::File::create(dir.join(name)).unwrap();
            f.set_modified(UNIX_EPOCH + Duration::from_secs(1_000 + i as u64))
                .unwrap();
        }
        let got = recent_captures(&dir, "screenshot", 2);
        fs::remove_dir_all(&dir).unwrap();
        let names: Vec<_> = got
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["screenshot_2.png", "screenshot_3.png"]);
    }

    #[test]
    fn parses_action_from_profile() {
        let txt = r#"
[meta]
allow_commands = true
[thresholds]
[capture]
action = "cmd: grim {file}"
"#;
        let p = Profile::parse(txt).unwrap();
        let s = CaptureSink::from_profile(&p);
        assert_eq!(s.action, CaptureAction::Command("grim {file}".into()));
    }
}
