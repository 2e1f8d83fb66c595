use anyhow::{Result, anyhow};
use log::{debug, error, info, warn};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
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
        mpsc::{self, Sender},
    },
    thread,
    time::Duration,
};

use super::pipeline::{PipelineCtl, PipelineStatus, run_pipeline};
use super::runtime::socket_path;
use crate::config::{DaemonConfigState, Profile};

pub fn run_daemon() -> Result<()> {
    // socket
    let sock = socket_path()?;
    if sock.exists() {
        let _ = std::fs::remove_file(&sock);
    }
    let listener = UnixListener::bind(&sock)?;
    info!("daemon: listening on {}", sock.display());

    // state
    let mut cfg = DaemonConfigState::load_or_install_default()?;
    info!("daemon: active profile '{}'", cfg.active_name);

    let (tx_req, rx_req) = mpsc::channel::<IpcMsg>();

    let pipeline = PipelineThread::start(cfg.profile.clone())?;
    let _watcher = watch_profiles(&cfg, tx_req.clone())?;
    spawn_signal_thread(tx_req.clone())?;

    // accept loop
    listener.set_nonblocking(true)?;
    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                let snapshot = ClientView {
                    cfg: cfg.clone(),
                    status: pipeline.status.clone(),
                    socket: sock.clone(),
                };
                let tx = tx_req.clone();
                thread::spawn(move || {
                    if let Err(e) = handle_client(stream, snapshot, tx) {
                        error!("ipc client error: {e}");
                    }
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => warn!("accept failed: {e}"),
        }

        while let Ok(msg) = rx_req.try_recv() {
            match msg {
                IpcMsg::Reload(reply) => {
                    let res = cfg.reload().map(|()| {
                        pipeline.update_profile(cfg.profile.clone());
                        info!("profile reloaded");
                        cfg.active_name.clone()
                    });
                    if let Err(e) = &res {
                        error!("reload failed: {e}");
                    }
                    let _ = reply.send(res);
                }
                IpcMsg::UseProfile(name, reply) => {
                    let res = cfg.set_active(&name).map(|()| {
                        pipeline.update_profile(cfg.profile.clone());
                        info!("switched active profile to {}", cfg.active_name);
                        cfg.active_name.clone()
                    });
                    if let Err(e) = &res {
                        error!("use profile failed: {e}");
                    }
                    let _ = reply.send(res);
                }
                IpcMsg::FileChanged(path) => {
                    if path != cfg.active_path() {
                        continue;
                    }
                    match cfg.reload() {
                        Ok(()) => {
                            pipeline.update_profile(cfg.profile.clone());
                            info!("active profile changed on disk; reloaded");
                        }
                        Err(e) => warn!("ignoring edit to {}: {e}", path.display()),
                    }
                }
                IpcMsg::Pipeline(ctl) => pipeline.send(ctl),
                IpcMsg::Shutdown => {
                    info!("daemon: shutting down");
                    let _ = std::fs::remove_file(&sock);
                    return Ok(());
                }
            }
        }

        thread::sleep(Duration::from_millis(5));
    }
}

fn handle_client(mut stream: UnixStream, view: ClientView, tx_req: Sender<IpcMsg>) -> Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    if line.trim().is_empty() {
        return Ok(());
    }
    let req: serde_json::Value = serde_json::from_str(&line)?;
    let op = req.get("op").and_then(|v| v.as_str()).unwrap_or("");
    debug!("ipc op '{op}'");

    let resp = match op {
        "status" => {
            let pipeline = view
                .status
                .lock()
                .map(|s| s.to_json())
                .unwrap_or(serde_json::Value::Null);
            serde_json::json!({"ok": true, "data": {
                "active_profile": view.cfg.active_name,
                "socket": view.socket,
                "landmark_source": view.cfg.profile.source.path,
                "pipeline": pipeline,
            }})
        }
        "reload" => round_trip(&tx_req, IpcMsg::Reload),
        "use" => match req.get("profile").and_then(|v| v.as_str()) {
            Some(name) => {
                let name = name.to_string();
                round_trip(&tx_req, |reply| IpcMsg::UseProfile(name, reply))
            }
            None => error_response("missing 'profile'"),
        },
        "list" => {
            let list = view.cfg.list_profiles();
            serde_json::json!({"ok": true, "data": {"profiles": list, "active": view.cfg.active_name}})
        }
        "pause" => pipeline_op(&tx_req, PipelineCtl::Pause, "paused"),
        "resume" => pipeline_op(&tx_req, PipelineCtl::Resume, "resumed"),
        "reset" => pipeline_op(&tx_req, PipelineCtl::Reset, "reset"),
        "doctor" => {
            let report = view.cfg.doctor_report();
            serde_json::json!({"ok": true, "data": report})
        }
        "shutdown" => {
            // answer first; the main loop exits the process once it sees this
            writeln!(stream, "{}", serde_json::json!({"ok": true, "data": "shutting down"}))?;
            let _ = tx_req.send(IpcMsg::Shutdown);
            return Ok(());
        }
        _ => error_response(&format!("unknown op: {op}")),
    };

    writeln!(stream, "{resp}")?;
    Ok(())
}

fn error_response(msg: &str) -> serde_json::Value {
    serde_json::json!({"ok": false, "error": msg})
}

/// Sends a profile change to the main loop and waits for the outcome.
fn round_trip(
    tx_req: &Sender<IpcMsg>,
    make: impl FnOnce(Sender<Result<String>>) -> IpcMsg,
) -> serde_json::Value {
    let (tx, rx) = mpsc::channel();
    if tx_req.send(make(tx)).is_err() {
        return error_response("daemon is shutting down");
    }
    match rx.recv_timeout(Duration::from_secs(5)) {
        Ok(Ok(active)) => serde_json::json!({"ok": true, "data": {"active_profile": active}}),
        Ok(Err(e)) => error_response(&format!("{e:#}")),
        Err(_) => error_response("daemon did not answer"),
    }
}

fn pipeline_op(tx_req: &Sender<IpcMsg>, ctl: PipelineCtl, done: &str) -> serde_json::Value {
    match tx_req.send(IpcMsg::Pipeline(ctl)) {
        Ok(()) => serde_json::json!({"ok": true, "data": done}),
        Err(_) => error_response("daemon is shutting down"),
    }
}

/// What a client connection may read; taken when the connection is accepted.
struct ClientView {
    cfg: DaemonConfigState,
    status: Arc<Mutex<PipelineStatus>>,
    socket: PathBuf,
}

enum IpcMsg {
    Reload(Sender<Result<String>>),
    UseProfile(String, Sender<Result<String>>),
    FileChanged(PathBuf),
    Pipeline(PipelineCtl),
    Shutdown,
}

struct PipelineThread {
    tx_ctl: Sender<PipelineCtl>,
    status: Arc<Mutex<PipelineStatus>>,
    _thread: thread::JoinHandle<()>,
}

impl PipelineThread {
    fn start(profile: Profile) -> Result<Self> {
        let (tx_ctl, rx_ctl) = mpsc::channel();
        let status = Arc::new(Mutex::new(PipelineStatus::default()));
        let status_clone = status.clone();
        let handle = thread::Builder::new()
            .name("handctl-pipeline".into())
            .spawn(move || {
                if let Err(e) = run_pipeline(profile, status_clone.clone(), rx_ctl) {
                    error!("tracking pipeline failed: {e}");
                }
                if let Ok(mut s) = status_clone.lock() {
                    s.running = false;
                }
            })?;
        Ok(Self {
            tx_ctl,
            status,
            _thread: handle,
        })
    }

    fn send(&self, ctl: PipelineCtl) {
        if self.tx_ctl.send(ctl).is_err() {
            warn!("tracking pipeline is gone; control message dropped");
        }
    }

    fn update_profile(&self, profile: Profile) {
        self.send(PipelineCtl::Profile(Box::new(profile)));
    }
}

/// Hot reload: edits to the active profile file are applied without a
/// client round trip.
fn watch_profiles(cfg: &DaemonConfigState, tx: Sender<IpcMsg>) -> Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(ev) if ev.kind.is_modify() || ev.kind.is_create() => {
            for path in ev.paths {
                let _ = tx.send(IpcMsg::FileChanged(path));
            }
        }
        Ok(_) => {}
        Err(e) => warn!("profile watcher: {e}"),
    })?;
    watcher.watch(&cfg.profiles_dir, RecursiveMode::NonRecursive)?;
    info!("watching {} for profile edits", cfg.profiles_dir.display());
    Ok(watcher)
}

fn spawn_signal_thread(tx: Sender<IpcMsg>) -> Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!("daemon: received signal {sig}");
            let _ = tx.send(IpcMsg::Shutdown);
        }
    });
    Ok(())
}

// client helper
pub fn client_request(req: serde_json::Value) -> Result<serde_json::Value> {
    let sock = socket_path()?;
    if !sock.exists() {
        return Err(anyhow!(
            "handctl daemon is not running (socket missing at {})",
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
