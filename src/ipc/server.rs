use anyhow::{Result, anyhow};
use log::{error, info, warn};
use notify::{EventKind, RecursiveMode, Watcher};
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};
use std::{
    io::{BufRead, BufReader, Write},
    os::unix::net::{UnixListener, UnixStream},
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Sender},
    },
    thread,
    time::Duration,
};

use super::pipeline::{Engine, run_pipeline};
use super::runtime::socket_path;
use crate::actions::{RECENT_LIMIT, recent_captures};
use crate::config::DaemonConfigState;
use crate::gestures::GestureKind;
use crate::input::{FrameReader, Source};

enum IpcMsg {
    ProfileFileChanged(PathBuf),
    Shutdown,
}

struct DaemonCtx {
    cfg: Mutex<DaemonConfigState>,
    engine: Arc<Mutex<Engine>>,
    socket: PathBuf,
    pipeline_running: Arc<AtomicBool>,
}

pub fn run_daemon() -> Result<()> {
    // socket
    let sock = socket_path()?;
    if sock.exists() {
        let _ = std::fs::remove_file(&sock);
    }
    let listener = UnixListener::bind(&sock)?;
    info!("daemon: listening on {}", sock.display());

    // state
    let cfg = DaemonConfigState::load_or_install_default()?;
    info!("daemon: active profile '{}'", cfg.active_name);
    let engine = Arc::new(Mutex::new(Engine::from_profile(&cfg.profile)?));
    let detector = cfg.profile.detector.command.trim().to_string();
    let profiles_dir = cfg.profiles_dir.clone();
    let ctx = Arc::new(DaemonCtx {
        cfg: Mutex::new(cfg),
        engine: engine.clone(),
        socket: sock.clone(),
        pipeline_running: Arc::new(AtomicBool::new(false)),
    });

    let (tx, rx) = mpsc::channel::<IpcMsg>();

    // signals
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let tx_sig = tx.clone();
    thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!("daemon: received signal {sig}");
            let _ = tx_sig.send(IpcMsg::Shutdown);
        }
    });

    // profile watcher
    let tx_watch = tx.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(ev) if matches!(ev.kind, EventKind::Create(_) | EventKind::Modify(_)) => {
                for p in ev.paths {
                    let _ = tx_watch.send(IpcMsg::ProfileFileChanged(p));
                }
            }
            Ok(_) => {}
            Err(e) => warn!("profile watcher error: {e}"),
        }
    })?;
    watcher.watch(&profiles_dir, RecursiveMode::NonRecursive)?;

    // gesture pipeline
    let stop = Arc::new(AtomicBool::new(false));
    let mut detector_handle = None;
    let mut pipeline = None;
    if detector.is_empty() {
        warn!("no detector command configured; pipeline idle");
    } else {
        let reader = FrameReader::open(&Source::Command(detector))?;
        detector_handle = reader.detector();
        let running = ctx.pipeline_running.clone();
        let stop = stop.clone();
        running.store(true, Ordering::Relaxed);
        pipeline = Some(thread::spawn(move || {
            if let Err(e) = run_pipeline(engine, reader, stop) {
                error!("gesture pipeline failed: {e:#}");
            }
            running.store(false, Ordering::Relaxed);
        }));
    }

    // accept loop
    listener.set_nonblocking(true)?;
    loop {
        if let Ok((stream, _)) = listener.accept() {
            let ctx = ctx.clone();
            let tx = tx.clone();
            thread::spawn(move || {
                if let Err(e) = handle_client(stream, &ctx, tx) {
                    error!("ipc client error: {e}");
                }
            });
        }

        while let Ok(msg) = rx.try_recv() {
            match msg {
                IpcMsg::ProfileFileChanged(path) => {
                    let active = match ctx.cfg.lock() {
                        Ok(cfg) => cfg.profile_path(&cfg.active_name),
                        Err(_) => continue,
                    };
                    if path == active {
                        match reload_active(&ctx) {
                            Ok(name) => info!("profile '{name}' changed on disk; reloaded"),
                            Err(e) => error!("reload failed, keeping last good profile: {e:#}"),
                        }
                    }
                }
                IpcMsg::Shutdown => {
                    stop.store(true, Ordering::Relaxed);
                    if let Some(d) = &detector_handle {
                        d.stop();
                    }
                    if let Some(h) = pipeline.take() {
                        if h.join().is_err() {
                            error!("gesture pipeline panicked");
                        }
                    }
                    let _ = std::fs::remove_file(&sock);
                    info!("daemon: shutting down");
                    return Ok(());
                }
            }
        }

        thread::sleep(Duration::from_millis(5));
    }
}

fn handle_client(mut stream: UnixStream, ctx: &DaemonCtx, tx: Sender<IpcMsg>) -> Result<()> {
    stream.set_nonblocking(false)?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    if line.trim().is_empty() {
        return Ok(());
    }
    let req: serde_json::Value = serde_json::from_str(&line)?;
    let op = req.get("op").and_then(|v| v.as_str()).unwrap_or("");

    let resp = match handle_request(op, &req, ctx) {
        Ok(data) => serde_json::json!({"ok": true, "data": data}),
        Err(e) => serde_json::json!({"ok": false, "error": format!("{e:#}")}),
    };
    writeln!(stream, "{resp}")?;

    if op == "shutdown" {
        let _ = tx.send(IpcMsg::Shutdown);
    }
    Ok(())
}

fn handle_request(op: &str, req: &serde_json::Value, ctx: &DaemonCtx) -> Result<serde_json::Value> {
    match op {
        "status" => {
            let cfg = lock(&ctx.cfg)?;
            let eng = lock(&ctx.engine)?;
            let mut data = eng.status_json();
            data["active_profile"] = cfg.active_name.clone().into();
            data["socket"] = ctx.socket.display().to_string().into();
            data["pipeline_running"] = ctx.pipeline_running.load(Ordering::Relaxed).into();
            Ok(data)
        }
        "reload" => {
            let name = reload_active(ctx)?;
            Ok(serde_json::json!({"active_profile": name}))
        }
        "use" => {
            let name = req
                .get("profile")
                .and_then(|v| v.as_str())
                .ok_or_else(|| anyhow!("missing 'profile'"))?;
            let mut cfg = lock(&ctx.cfg)?;
            cfg.set_active(name)?;
            lock(&ctx.engine)?.apply_profile(&cfg.profile)?;
            info!("switched active profile to {}", cfg.active_name);
            Ok(serde_json::json!({"active_profile": cfg.active_name}))
        }
        "list" => {
            let cfg = lock(&ctx.cfg)?;
            Ok(serde_json::json!({"profiles": cfg.list_profiles(), "active": cfg.active_name}))
        }
        "gesture" => {
            let kind: GestureKind = req
                .get("gesture")
                .and_then(|v| v.as_str())
                .ok_or_else(|| anyhow!("missing 'gesture'"))?
                .parse()?;
            lock(&ctx.engine)?.machine.set_gesture(kind);
            info!("active gesture set to {kind}");
            Ok(serde_json::json!({"gesture": kind.as_str()}))
        }
        "thresholds" => {
            let mut eng = lock(&ctx.engine)?;
            let mut next = eng.machine.config();
            if let Some(v) = req.get("hold").and_then(|v| v.as_f64()) {
                next.hold_secs = v;
            }
            if let Some(v) = req.get("cooldown").and_then(|v| v.as_f64()) {
                next.cooldown_secs = v;
            }
            eng.machine.apply(next)?;
            info!(
                "thresholds set: hold {}s, cooldown {}s",
                next.hold_secs, next.cooldown_secs
            );
            Ok(serde_json::json!({
                "hold_secs": next.hold_secs,
                "cooldown_secs": next.cooldown_secs,
            }))
        }
        "recent" => {
            let eng = lock(&ctx.engine)?;
            let files = recent_captures(eng.sink.dir(), eng.sink.prefix(), RECENT_LIMIT);
            Ok(serde_json::json!({"dir": eng.sink.dir(), "captures": files}))
        }
        "doctor" => Ok(lock(&ctx.cfg)?.doctor_report()),
        "shutdown" => Ok(serde_json::json!("shutting down")),
        _ => Err(anyhow!("unknown op: {op}")),
    }
}

fn lock<T>(m: &Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>> {
    m.lock().map_err(|_| anyhow!("daemon state lock poisoned"))
}

fn reload_active(ctx: &DaemonCtx) -> Result<String> {
    let mut cfg = lock(&ctx.cfg)?;
    cfg.reload()?;
    lock(&ctx.engine)?.apply_profile(&cfg.profile)?;
    Ok(cfg.active_name.clone())
}

// client helper
pub fn client_request(req: serde_json::Value) -> Result<serde_json::Value> {
    let sock = socket_path()?;
    if !sock.exists() {
        return Err(anyhow!(
            "gesturesnap daemon is not running (socket missing at {})",
            sock.display()
        ));
    }
    let mut stream = UnixStream::connect(sock)?;
    let line = serde_json::to_string(&req)? + "\n";
    stream.write_all(line.as_bytes())?;
    let mut reader = BufReader::new(stream);
    let mut resp = String::new();
    reader.read_line(&mut resp)?;
    let v: serde_json::Value = serde_json::from_str(&resp)?;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;

    fn ctx() -> DaemonCtx {
        let profile = Profile::parse("[meta]\n[thresholds]\n").unwrap();
        let engine = Engine::from_profile(&profile).unwrap();
        let dir = PathBuf::from("/nonexistent/gesturesnap");
        DaemonCtx {
            cfg: Mutex::new(DaemonConfigState {
                active_name: "default".into(),
                profile,
                config_dir: dir.clone(),
                profiles_dir: dir.join("profiles"),
                active_ptr: dir.join("active"),
            }),
            engine: Arc::new(Mutex::new(engine)),
            socket: dir.join("gesturesnap.sock"),
            pipeline_running: Arc::new(AtomicBool::new(false)),
        }
    }

    #[test]
    fn status_reports_machine_state() {
        let ctx = ctx();
        let data = handle_request("status", &serde_json::json!({}), &ctx).unwrap();
        assert_eq!(data["phase"], "idle");
        assert_eq!(data["gesture"], "open-palm");
        assert_eq!(data["hold_secs"], 1.0);
        assert_eq!(data["active_profile"], "default");
        assert_eq!(data["pipeline_running"], false);
    }

    #[test]
    fn gesture_op_switches_kind() {
        let ctx = ctx();
        let req = serde_json::json!({"op": "gesture", "gesture": "peace-sign"});
        handle_request("gesture", &req, &ctx).unwrap();
        assert_eq!(ctx.engine.lock().unwrap().machine.gesture(), GestureKind::PeaceSign);

        let req = serde_json::json!({"op": "gesture", "gesture": "wave"});
        assert!(handle_request("gesture", &req, &ctx).is_err());
        assert_eq!(ctx.engine.lock().unwrap().machine.gesture(), GestureKind::PeaceSign);
    }

    #[test]
    fn invalid_thresholds_leave_previous_values() {
        let ctx = ctx();
        let req = serde_json::json!({"hold": 2.0, "cooldown": 0.0});
        assert!(handle_request("thresholds", &req, &ctx).is_err());
        let cfg = ctx.engine.lock().unwrap().machine.config();
        assert_eq!((cfg.hold_secs, cfg.cooldown_secs), (1.0, 3.0));

        let req = serde_json::json!({"cooldown": 5.0});
        handle_request("thresholds", &req, &ctx).unwrap();
        let cfg = ctx.engine.lock().unwrap().machine.config();
        assert_eq!((cfg.hold_secs, cfg.cooldown_secs), (1.0, 5.0));
    }

    #[test]
    fn unknown_op_is_an_error() {
        let err = handle_request("dance", &serde_json::json!({}), &ctx()).unwrap_err();
        assert_eq!(err.to_string(), "unknown op: dance");
    }
}
