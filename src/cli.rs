use anyhow::{Context, Result, anyhow};
use pico_args::Arguments;
use std::{
    env, fs,
    io::{self, Write},
    path::PathBuf,
    process::Command,
    time::Instant,
};

use crate::config::{DaemonConfigState, Profile};
use crate::gestures::GestureKind;
use crate::input::{FrameReader, Source};
use crate::ipc::{self, Engine};
use crate::trigger::TriggerEvent;

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    // Hidden daemon mode (spawned by `start`)
    if pargs.contains("--daemon") {
        return ipc::run_daemon();
    }

    // No args -> general help
    if env::args().len() == 1 {
        print_help();
        return Ok(());
    }

    // Flags-based help (-h/--help)
    if pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    // First free arg is the subcommand
    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            if let Some(t) = topic {
                print_subcmd_help(&t);
            } else {
                print_help();
            }
            Ok(())
        }

        Some("start") => {
            if ipc::client_request(serde_json::json!({"op":"status"})).is_ok() {
                return Err(anyhow!("gesturesnap: daemon already running"));
            }
            let exe = std::env::current_exe()?;
            let child = Command::new(exe).arg("--daemon").spawn()?;
            println!("gesturesnap: started daemon (pid={})", child.id());
            Ok(())
        }

        Some("stop") => request(serde_json::json!({"op":"shutdown"})),
        Some("status") => request(serde_json::json!({"op":"status"})),
        Some("reload") => request(serde_json::json!({"op":"reload"})),
        Some("list") => request(serde_json::json!({"op":"list"})),
        Some("recent") => request(serde_json::json!({"op":"recent"})),
        Some("doctor") => request(serde_json::json!({"op":"doctor"})),

        Some("use") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: gesturesnap use <profile_name>"))?;
            request(serde_json::json!({"op":"use","profile":name}))
        }

        Some("gesture") => {
            let kind: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: gesturesnap gesture <open-palm|peace-sign>"))?;
            // validate locally for a better message
            let kind: GestureKind = kind.parse()?;
            request(serde_json::json!({"op":"gesture","gesture":kind.as_str()}))
        }

        Some("thresholds") => {
            let hold: Option<f64> = pargs.opt_value_from_str("--hold")?;
            let cooldown: Option<f64> = pargs.opt_value_from_str("--cooldown")?;
            request(serde_json::json!({"op":"thresholds","hold":hold,"cooldown":cooldown}))
        }

        Some("run") => {
            let overrides = Overrides::parse(&mut pargs)?;
            let profile = overrides.load_profile()?;
            let source = match profile.detector.command.trim() {
                "" => Source::Stdin,
                cmd => Source::Command(cmd.to_string()),
            };
            drive(&profile, &overrides, &source)
        }

        Some("replay") => {
            let overrides = Overrides::parse(&mut pargs)?;
            let file: PathBuf = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: gesturesnap replay <frames.jsonl>"))?;
            let profile = overrides.load_profile()?;
            drive(&profile, &overrides, &Source::File(file))
        }

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

/// Flags shared by the foreground commands.
struct Overrides {
    profile: Option<PathBuf>,
    gesture: Option<GestureKind>,
    hold: Option<f64>,
    cooldown: Option<f64>,
}

impl Overrides {
    fn parse(pargs: &mut Arguments) -> Result<Self> {
        let gesture: Option<String> = pargs.opt_value_from_str("--gesture")?;
        Ok(Self {
            profile: pargs.opt_value_from_str("--profile")?,
            gesture: gesture.map(|g| g.parse::<GestureKind>()).transpose()?,
            hold: pargs.opt_value_from_str("--hold")?,
            cooldown: pargs.opt_value_from_str("--cooldown")?,
        })
    }

    fn load_profile(&self) -> Result<Profile> {
        match &self.profile {
            Some(path) => {
                let txt = fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                Profile::parse(&txt).with_context(|| format!("failed to load {}", path.display()))
            }
            None => Ok(DaemonConfigState::load_or_install_default()?.profile),
        }
    }

    fn apply(&self, engine: &mut Engine) -> Result<()> {
        if let Some(kind) = self.gesture {
            engine.machine.set_gesture(kind);
        }
        if let Some(h) = self.hold {
            engine.machine.set_hold_threshold(h)?;
        }
        if let Some(c) = self.cooldown {
            engine.machine.set_cooldown_threshold(c)?;
        }
        Ok(())
    }
}

/// Runs frames through an engine in the foreground, one JSON event per line.
fn drive(profile: &Profile, overrides: &Overrides, source: &Source) -> Result<()> {
    let mut engine = Engine::from_profile(profile)?;
    overrides.apply(&mut engine)?;
    let reader = FrameReader::open(source)?;
    write_events(&mut engine, reader, &mut io::stdout().lock())
}

fn write_events(engine: &mut Engine, reader: FrameReader, out: &mut impl Write) -> Result<()> {
    let clock = Instant::now();
    for line in reader {
        let line = line?;
        if let Some((t, ev)) = engine.process_line(&line, clock.elapsed().as_secs_f64()) {
            writeln!(out, "{}", event_json(t, &ev, engine.status()))?;
        }
    }
    Ok(())
}

fn event_json(t: f64, ev: &TriggerEvent, status: &str) -> serde_json::Value {
    let mut v = serde_json::json!({"t": t, "event": ev.as_str()});
    match ev {
        TriggerEvent::Holding(elapsed) => v["elapsed"] = (*elapsed).into(),
        TriggerEvent::Fire => v["status"] = status.into(),
        _ => {}
    }
    v
}

fn request(req: serde_json::Value) -> Result<()> {
    let r = ipc::client_request(req)?;
    print_response(&r);
    Ok(())
}

fn print_help() {
    println!(
        r#"gesturesnap — hold a hand gesture to take a screenshot

USAGE:
  gesturesnap help [command]                 Show general or command-specific help
  gesturesnap start                          Start the daemon
  gesturesnap stop                           Stop the daemon
  gesturesnap status                         Show trigger phase, gesture and thresholds
  gesturesnap reload                         Reload active profile
  gesturesnap use <name>                     Switch active profile
  gesturesnap list                           List profiles
  gesturesnap gesture <open-palm|peace-sign> Change the capture gesture
  gesturesnap thresholds [--hold S] [--cooldown S]
                                             Change hold / cooldown seconds
  gesturesnap recent                         List the newest captures
  gesturesnap doctor                         Diagnose detector and capture setup
  gesturesnap run [OPTIONS]                  Run in the foreground (detector command or stdin)
  gesturesnap replay [OPTIONS] <file>        Replay recorded frames and print events

OPTIONS (run, replay):
  --profile <file>   Use this profile file instead of the active one
  --gesture <kind>   Override the active gesture
  --hold <secs>      Override the hold threshold
  --cooldown <secs>  Override the cooldown threshold

TIPS:
  - Profiles: ~/.config/gesturesnap/profiles
  - Active profile pointer: ~/.config/gesturesnap/active
  - Frames are JSON lines: {{"t": 0.5, "hands": [{{"score": 0.9, "landmarks": [[x, y], ...]}}]}}
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "start" => println!("usage: gesturesnap start\nStarts the background daemon."),
        "stop" => println!("usage: gesturesnap stop\nStops the running daemon."),
        "status" => println!(
            "usage: gesturesnap status\nShows phase, gesture, thresholds, capture count, profile, socket."
        ),
        "reload" => println!(
            "usage: gesturesnap reload\nReloads the current profile; keeps last good on error."
        ),
        "use" => {
            println!("usage: gesturesnap use <name>\nSwitches active profile to <name> and reloads.")
        }
        "list" => {
            println!("usage: gesturesnap list\nLists available profiles and the active one.")
        }
        "gesture" => println!(
            "usage: gesturesnap gesture <open-palm|peace-sign>\nTakes effect on the next frame; not saved to the profile."
        ),
        "thresholds" => println!(
            "usage: gesturesnap thresholds [--hold S] [--cooldown S]\nBoth must be positive; invalid values leave the current ones."
        ),
        "recent" => println!("usage: gesturesnap recent\nLists up to 10 newest captures."),
        "doctor" => println!(
            "usage: gesturesnap doctor\nChecks the detector command and capture directory."
        ),
        "run" => println!(
            "usage: gesturesnap run [--profile F] [--gesture K] [--hold S] [--cooldown S]\nReads frames from the profile's detector command, or stdin if none."
        ),
        "replay" => println!(
            "usage: gesturesnap replay [--profile F] [--gesture K] [--hold S] [--cooldown S] <file>\nFeeds a JSON-lines recording through the trigger and prints each event."
        ),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}

fn print_response(v: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_default());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_lines() {
        let v = event_json(0.5, &TriggerEvent::Holding(0.5), "");
        assert_eq!(v, serde_json::json!({"t": 0.5, "event": "holding", "elapsed": 0.5}));
        let v = event_json(1.0, &TriggerEvent::Fire, "Screenshot taken: a.png");
        assert_eq!(v["status"], "Screenshot taken: a.png");
        let v = event_json(2.0, &TriggerEvent::NoHand, "ignored");
        assert_eq!(v, serde_json::json!({"t": 2.0, "event": "no-hand"}));
    }

    fn replay(overrides: &Overrides) -> Vec<serde_json::Value> {
        let profile = Profile::parse("[meta]\n[thresholds]\n").unwrap();
        let mut engine = Engine::from_profile(&profile).unwrap();
        overrides.apply(&mut engine).unwrap();
        let demo = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos/open_palm_hold.jsonl");
        let reader = FrameReader::open(&Source::File(demo)).unwrap();
        let mut out = Vec::new();
        write_events(&mut engine, reader, &mut out).unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    fn no_overrides() -> Overrides {
        Overrides {
            profile: None,
            gesture: None,
            hold: None,
            cooldown: None,
        }
    }

    #[test]
    fn demo_recording_replays_reference_sequence() {
        let events = replay(&no_overrides());
        let kinds: Vec<&str> = events.iter().map(|v| v["event"].as_str().unwrap()).collect();
        assert_eq!(
            kinds,
            [
                "holding", "holding", "fire", "holding", "holding", "cooling", "no-hand",
                "holding", "holding", "fire",
            ]
        );
        assert_eq!(events[2]["t"], 1.0);
        assert_eq!(events[9]["t"], 4.2);
        assert!(
            events[2]["status"]
                .as_str()
                .unwrap()
                .starts_with("Capture triggered: screenshot_")
        );
    }

    #[test]
    fn overrides_change_the_replay() {
        let peace = Overrides {
            gesture: Some(GestureKind::PeaceSign),
            ..no_overrides()
        };
        let events = replay(&peace);
        assert!(events.iter().all(|v| v["event"] != "fire"));
        assert_eq!(events[0]["event"], "gesture-lost");

        let bad = Overrides {
            hold: Some(0.0),
            ..no_overrides()
        };
        let profile = Profile::parse("[meta]\n[thresholds]\n").unwrap();
        let mut engine = Engine::from_profile(&profile).unwrap();
        assert!(bad.apply(&mut engine).is_err());
    }
}
