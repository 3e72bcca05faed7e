use anyhow::{Result, anyhow};
use directories::UserDirs;
use log::{info, warn};
use serde::Deserialize;
use std::{
    env, fs,
    io::Write,
    path::{Path, PathBuf},
};

use crate::gestures::GestureKind;
use crate::trigger::{DEFAULT_COOLDOWN_SECS, DEFAULT_HOLD_SECS, TriggerConfig};

#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    pub name: Option<String>,
    #[serde(default)]
    pub allow_commands: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_hold_secs")]
    pub hold_secs: f64,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: f64,
    #[serde(default = "default_min_confidence")]
    pub min_detection_confidence: f32,
}

fn default_hold_secs() -> f64 {
    DEFAULT_HOLD_SECS
}

fn default_cooldown_secs() -> f64 {
    DEFAULT_COOLDOWN_SECS
}

fn default_min_confidence() -> f32 {
    0.7
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GestureSection {
    #[serde(default)]
    pub active: GestureKind,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Detector {
    #[serde(default)]
    pub command: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Capture {
    #[serde(default)]
    pub dir: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_action")]
    pub action: String,
}

fn default_prefix() -> String {
    "screenshot".to_string()
}

fn default_action() -> String {
    "log".to_string()
}

impl Default for Capture {
    fn default() -> Self {
        Self {
            dir: String::new(),
            prefix: default_prefix(),
            action: default_action(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub meta: Meta,
    pub thresholds: Thresholds,
    #[serde(default)]
    pub gesture: GestureSection,
    #[serde(default)]
    pub detector: Detector,
    #[serde(default)]
    pub capture: Capture,
}

impl Profile {
    pub fn parse(txt: &str) -> Result<Self> {
        let profile: Profile = toml::from_str(txt)?;
        validate_profile(&profile)?;
        Ok(profile)
    }

    pub fn trigger_config(&self) -> TriggerConfig {
        TriggerConfig {
            hold_secs: self.thresholds.hold_secs,
            cooldown_secs: self.thresholds.cooldown_secs,
            gesture: self.gesture.active,
        }
    }

    /// Where captures land: `capture.dir` (with `~/` expanded), else the
    /// user's picture directory, else the home directory.
    pub fn capture_dir(&self) -> PathBuf {
        let dirs = UserDirs::new();
        let dir = self.capture.dir.trim();
        if !dir.is_empty() {
            return match (dir.strip_prefix("~/"), &dirs) {
                (Some(rest), Some(d)) => d.home_dir().join(rest),
                _ => PathBuf::from(dir),
            };
        }
        match dirs {
            Some(d) => d
                .picture_dir()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| d.home_dir().to_path_buf()),
            None => PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DaemonConfigState {
    pub active_name: String,
    pub profile: Profile,
    pub config_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub active_ptr: PathBuf,
}

/// `$GESTURESNAP_CONFIG_DIR` or `~/.config/gesturesnap`.
pub fn config_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("GESTURESNAP_CONFIG_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let home = UserDirs::new()
        .ok_or_else(|| anyhow!("cannot determine home directory"))?
        .home_dir()
        .to_path_buf();
    Ok(home.join(".config").join("gesturesnap"))
}

fn default_profile_text() -> &'static str {
    include_str!("../profiles/default.toml")
}

impl DaemonConfigState {
    pub fn load_or_install_default() -> Result<Self> {
        let cfgdir = config_dir()?;
        let profdir = cfgdir.join("profiles");
        fs::create_dir_all(&profdir)?;

        let def_path = profdir.join("default.toml");
        if !def_path.exists() {
            fs::write(&def_path, default_profile_text())?;
            info!("installed default profile at {}", def_path.display());
        }

        let active_ptr = cfgdir.join("active");
        if !active_ptr.exists() {
            let mut f = fs::File::create(&active_ptr)?;
            f.write_all(b"default")?;
        }

        let wanted = fs::read_to_string(&active_ptr)?.trim().to_string();
        let (active_name, profile) = match load_profile(&profdir, &wanted) {
            Ok(p) => (wanted, p),
            Err(e) if wanted != "default" => {
                warn!("active profile '{wanted}' unusable ({e}); falling back to default");
                ("default".to_string(), load_profile(&profdir, "default")?)
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            active_name,
            profile,
            config_dir: cfgdir,
            profiles_dir: profdir,
            active_ptr,
        })
    }

    /// Re-reads the active profile. On error the last good profile stays.
    pub fn reload(&mut self) -> Result<()> {
        self.profile = load_profile(&self.profiles_dir, &self.active_name)?;
        Ok(())
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        let p = self.profile_path(name);
        if !p.exists() {
            return Err(anyhow!("profile not found: {}", p.display()));
        }
        let profile = load_profile(&self.profiles_dir, name)?;
        fs::write(&self.active_ptr, name.as_bytes())?;
        self.active_name = name.to_string();
        self.profile = profile;
        Ok(())
    }

    pub fn profile_path(&self, name: &str) -> PathBuf {
        self.profiles_dir.join(format!("{name}.toml"))
    }

    pub fn list_profiles(&self) -> Vec<String> {
        let mut v = Vec::new();
        if let Ok(rd) = fs::read_dir(&self.profiles_dir) {
            for e in rd.flatten() {
                let path = e.path();
                if path.extension().is_some_and(|ext| ext == "toml") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        v.push(stem.to_string());
                    }
                }
            }
        }
        v.sort();
        v
    }

    pub fn doctor_report(&self) -> serde_json::Value {
        let capture_dir = self.profile.capture_dir();
        let detector = self.profile.detector.command.trim();
        let detector_program = detector.split_whitespace().next();
        serde_json::json!({
            "config_dir": self.config_dir,
            "profiles_dir": self.profiles_dir,
            "active_profile": self.active_name,
            "profile_name": self.profile.meta.name,
            "capture_dir": capture_dir,
            "capture_dir_exists": capture_dir.is_dir(),
            "capture_action": self.profile.capture.action,
            "detector_command": detector,
            "detector_on_path": detector_program.map(program_on_path),
            "hints": {
                "detector": "set [detector] command to a program printing one JSON frame per line",
                "capture": "set [capture] action = \"cmd:grim {file}\" and meta.allow_commands = true"
            }
        })
    }
}

fn load_profile(dir: &Path, name: &str) -> Result<Profile> {
    let path = dir.join(format!("{name}.toml"));
    let txt = fs::read_to_string(&path)
        .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
    Profile::parse(&txt).map_err(|e| anyhow!("failed to load {}: {e}", path.display()))
}

fn validate_profile(p: &Profile) -> Result<()> {
    p.trigger_config().validate()?;
    let conf = p.thresholds.min_detection_confidence;
    if !(0.0..=1.0).contains(&conf) {
        return Err(anyhow!("thresholds.min_detection_confidence must be in [0,1], got {conf}"));
    }
    if p.capture.prefix.trim().is_empty() || p.capture.prefix.contains('/') {
        return Err(anyhow!("capture.prefix must be a non-empty file name prefix"));
    }

    let action = p.capture.action.trim();
    if action != "log" && !action.starts_with("cmd:") {
        return Err(anyhow!("capture.action has invalid value '{action}'"));
    }
    if let Some(cmd) = action.strip_prefix("cmd:") {
        if cmd.trim().is_empty() {
            return Err(anyhow!("capture.action 'cmd:' has no command"));
        }
        if !p.meta.allow_commands {
            return Err(anyhow!("capture.action uses cmd: but allow_commands=false"));
        }
    }
    if !p.detector.command.trim().is_empty() && !p.meta.allow_commands {
        return Err(anyhow!("detector.command is set but allow_commands=false"));
    }
    Ok(())
}

fn program_on_path(program: &str) -> bool {
    if program.contains('/') {
        return Path::new(program).is_file();
    }
    env::var_os("PATH")
        .map(|paths| env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[meta]
name = "test"

[thresholds]
hold_secs = 0.5
cooldown_secs = 2.0
min_detection_confidence = 0.6
"#;

    #[test]
    fn bundled_default_profile_is_valid() {
        let p = Profile::parse(default_profile_text()).unwrap();
        assert_eq!(p.trigger_config(), TriggerConfig::default());
        assert_eq!(p.thresholds.min_detection_confidence, 0.7);
        assert_eq!(p.capture.prefix, "screenshot");
        assert_eq!(p.capture.action, "log");
        assert!(!p.meta.allow_commands);
    }

    #[test]
    fn optional_sections_default() {
        let p = Profile::parse(MINIMAL).unwrap();
        assert_eq!(p.gesture.active, GestureKind::OpenPalm);
        assert_eq!(p.trigger_config().hold_secs, 0.5);
        assert_eq!(p.trigger_config().cooldown_secs, 2.0);
        assert!(p.detector.command.is_empty());
        assert_eq!(p.capture.action, "log");
    }

    #[test]
    fn parses_gesture_kind() {
        let txt = format!("{MINIMAL}\n[gesture]\nactive = \"peace-sign\"\n");
        let p = Profile::parse(&txt).unwrap();
        assert_eq!(p.gesture.active, GestureKind::PeaceSign);

        let txt = format!("{MINIMAL}\n[gesture]\nactive = \"Open Palm\"\n");
        let p = Profile::parse(&txt).unwrap();
        assert_eq!(p.gesture.active, GestureKind::OpenPalm);

        let txt = format!("{MINIMAL}\n[gesture]\nactive = \"thumbs-up\"\n");
        let err = Profile::parse(&txt).unwrap_err().to_string();
        assert!(err.contains("thumbs-up"), "{err}");
    }

    #[test]
    fn rejects_non_positive_thresholds() {
        let txt = MINIMAL.replace("hold_secs = 0.5", "hold_secs = 0.0");
        let err = Profile::parse(&txt).unwrap_err().to_string();
        assert!(err.contains("hold_secs"), "{err}");

        let txt = MINIMAL.replace("cooldown_secs = 2.0", "cooldown_secs = -1.0");
        assert!(Profile::parse(&txt).is_err());

        let txt = MINIMAL.replace(
            "min_detection_confidence = 0.6",
            "min_detection_confidence = 1.5",
        );
        assert!(Profile::parse(&txt).is_err());
    }

    #[test]
    fn command_actions_need_opt_in() {
        let txt = format!("{MINIMAL}\n[capture]\naction = \"cmd:grim {{file}}\"\n");
        let err = Profile::parse(&txt).unwrap_err().to_string();
        assert!(err.contains("allow_commands"), "{err}");

        let allowed = txt.replace("name = \"test\"", "name = \"test\"\nallow_commands = true");
        let p = Profile::parse(&allowed).unwrap();
        assert_eq!(p.capture.action, "cmd:grim {file}");

        let txt = format!("{MINIMAL}\n[detector]\ncommand = \"python3 detect.py\"\n");
        assert!(Profile::parse(&txt).is_err());
    }

    #[test]
    fn rejects_unknown_action() {
        let txt = format!("{MINIMAL}\n[capture]\naction = \"upload\"\n");
        assert!(Profile::parse(&txt).is_err());
        let txt = format!("{MINIMAL}\n[capture]\nprefix = \"a/b\"\n");
        assert!(Profile::parse(&txt).is_err());
    }

    #[test]
    fn explicit_capture_dir_wins() {
        let txt = format!("{MINIMAL}\n[capture]\ndir = \"/tmp/shots\"\n");
        let p = Profile::parse(&txt).unwrap();
        assert_eq!(p.capture_dir(), PathBuf::from("/tmp/shots"));
    }

    #[test]
    fn doctor_names_the_profile() {
        let dir = PathBuf::from("/nonexistent/gesturesnap");
        let state = DaemonConfigState {
            active_name: "work".into(),
            profile: Profile::parse(MINIMAL).unwrap(),
            config_dir: dir.clone(),
            profiles_dir: dir.join("profiles"),
            active_ptr: dir.join("active"),
        };
        let report = state.doctor_report();
        assert_eq!(report["active_profile"], "work");
        assert_eq!(report["profile_name"], "test");
        assert_eq!(report["detector_on_path"], serde_json::Value::Null);
    }
}
