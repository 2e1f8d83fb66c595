use anyhow::{Result, anyhow};
use log::warn;
use pico_args::Arguments;
use std::{collections::BTreeMap, env, path::PathBuf, process::Command};

use crate::actions::{Button, MouseSink, UinputSink};
use crate::config::{DaemonConfigState, Profile};
use crate::ipc::{
    self,
    pipeline::{Session, Tick},
};
use crate::mapper::CursorMapper;
use crate::source::{self, Frame, LandmarkSource, SourceError};

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

    if pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    // offline commands only
    let profile_path: Option<PathBuf> = pargs.opt_value_from_str("--profile")?;
    let live = pargs.contains("--live");

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
            let exe = std::env::current_exe()?;
            let child = Command::new(exe).arg("--daemon").spawn()?;
            println!("handctl: started daemon (pid={})", child.id());
            Ok(())
        }

        Some(op @ ("stop" | "status" | "reload" | "list" | "pause" | "resume" | "reset" | "doctor")) => {
            let op = if op == "stop" { "shutdown" } else { op };
            let r = ipc::client_request(serde_json::json!({ "op": op }))?;
            print_response(&r);
            Ok(())
        }

        Some("use") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handctl use <profile_name>"))?;
            let r = ipc::client_request(serde_json::json!({"op":"use","profile":name}))?;
            print_response(&r);
            Ok(())
        }

        Some("replay") => {
            let path: PathBuf = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handctl replay <file|-> [--live] [--profile <file>]"))?;
            let profile = load_profile(profile_path)?;
            let mut sink = if live {
                UinputSink::new(&profile.screen)?
            } else {
                UinputSink::noop()
            };
            let mut src = source::open(&path)
                .map_err(|e| anyhow!("cannot open {}: {e}", path.display()))?;
            let summary = replay(&profile, &mut src, &mut sink, |frame, tick| {
                if let Some(line) = describe_tick(frame, tick) {
                    println!("{line}");
                }
            })?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }

        Some("map") => {
            let x: f64 = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handctl map <x> <y> [--profile <file>]"))?;
            let y: f64 = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handctl map <x> <y> [--profile <file>]"))?;
            let profile = load_profile(profile_path)?;
            let mapper = CursorMapper::new(&profile);
            let (sx, sy) = mapper.map_to_screen(x, y);
            println!("({x}, {y}) -> ({sx}, {sy})");
            Ok(())
        }

        Some("emit") => {
            // usage:
            //   handctl emit click right
            //   handctl emit scroll -3
            //   handctl emit move 960 540
            let what: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handctl emit <click|scroll|move> ..."))?;
            let profile = load_profile(profile_path)?;
            let mut sink = UinputSink::new(&profile.screen)?;
            match what.as_str() {
                "click" => {
                    let btn: Button = pargs
                        .free_from_str()
                        .map_err(|_| anyhow!("usage: handctl emit click <left|right>"))?;
                    sink.click(btn)?;
                    println!("ok: clicked {btn:?}");
                }
                "scroll" => {
                    let units: i32 = pargs
                        .free_from_str()
                        .map_err(|_| anyhow!("usage: handctl emit scroll <units>"))?;
                    sink.scroll(units)?;
                    println!("ok: scrolled {units}");
                }
                "move" => {
                    let x: i32 = pargs
                        .free_from_str()
                        .map_err(|_| anyhow!("usage: handctl emit move <x> <y>"))?;
                    let y: i32 = pargs
                        .free_from_str()
                        .map_err(|_| anyhow!("usage: handctl emit move <x> <y>"))?;
                    sink.move_to(x, y)?;
                    println!("ok: moved to ({x}, {y})");
                }
                other => return Err(anyhow!("unknown emit kind: {other}")),
            }
            Ok(())
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

/// `--profile <file>` wins; otherwise the active profile from the config dir.
fn load_profile(path: Option<PathBuf>) -> Result<Profile> {
    match path {
        Some(p) => {
            let txt = std::fs::read_to_string(&p)
                .map_err(|e| anyhow!("failed to read {}: {e}", p.display()))?;
            Profile::parse(&txt)
        }
        None => Ok(DaemonConfigState::load_or_install_default()?.profile),
    }
}

/// Runs a recorded feed through a fresh session, reporting every tick.
/// Returns how often each dispatch label was seen.
fn replay<S: LandmarkSource, M: MouseSink>(
    profile: &Profile,
    src: &mut S,
    sink: &mut M,
    mut on_tick: impl FnMut(&Frame, &Tick),
) -> Result<serde_json::Value> {
    let mut session = Session::new(profile);
    let mut labels: BTreeMap<&'static str, u64> = BTreeMap::new();
    let mut frames = 0u64;
    let mut skipped = 0u64;
    loop {
        let frame = match src.next_frame() {
            Ok(Some(f)) => f,
            Ok(None) => break,
            Err(SourceError::Io(e)) => return Err(e.into()),
            Err(e) => {
                warn!("skipping frame: {e}");
                skipped += 1;
                continue;
            }
        };
        frames += 1;
        let tick = session.tick(&frame, sink)?;
        *labels.entry(tick.dispatched.label).or_default() += 1;
        on_tick(&frame, &tick);
    }
    Ok(serde_json::json!({
        "frames": frames,
        "skipped": skipped,
        "labels": labels,
    }))
}

fn describe_tick(frame: &Frame, tick: &Tick) -> Option<String> {
    let pos = tick.gesture.position()?;
    let action = match tick.dispatched.action {
        Some(a) => format!("{a:?}"),
        None => "-".to_string(),
    };
    Some(format!(
        "{:9.3}  {:<12} ({:.3}, {:.3})  {action}",
        frame.timestamp, tick.dispatched.label, pos.0, pos.1
    ))
}

fn print_help() {
    println!(
        r#"handctl: hand gesture mouse control

USAGE:
  handctl help [command]                 Show general or command-specific help
  handctl start                          Start the daemon
  handctl stop                           Stop the daemon
  handctl status                         Show pipeline state (fps, hand, last gesture)
  handctl reload                         Reload active profile
  handctl use <name>                     Switch active profile
  handctl list                           List profiles
  handctl pause | resume                 Suspend or resume pointer output
  handctl reset                          Clear gesture and smoothing state
  handctl doctor                         Diagnose permissions and the landmark feed
  handctl replay <file|->                Run a recorded landmark feed offline
  handctl map <x> <y>                    Show where a normalized point lands on screen
  handctl emit click <left|right>        Emit a mouse click
  handctl emit scroll <units>            Emit wheel units (+ up, - down)
  handctl emit move <x> <y>              Move the pointer to a pixel

OPTIONS (replay, map, emit):
  --profile <file>                       Use this profile instead of the active one
  --live                                 replay: drive the real pointer

TIPS:
  - Profiles: ~/.config/handctl/profiles
  - Active profile pointer: ~/.config/handctl/active
  - Edits to the active profile are picked up while the daemon runs
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "start" => println!("usage: handctl start\nStarts the background daemon."),
        "stop" => println!("usage: handctl stop\nStops the running daemon."),
        "status" => println!(
            "usage: handctl status\nShows active profile, socket, fps, hand presence and last gesture."
        ),
        "reload" => println!(
            "usage: handctl reload\nReloads the current profile; keeps last good on error."
        ),
        "use" => {
            println!("usage: handctl use <name>\nSwitches active profile to <name> and reloads.")
        }
        "list" => println!("usage: handctl list\nLists available profiles and the active one."),
        "pause" | "resume" => println!(
            "usage: handctl pause | handctl resume\nWhile paused, frames are read but nothing reaches the pointer."
        ),
        "reset" => println!("usage: handctl reset\nDrops click latch, scroll baseline and smoothing history."),
        "doctor" => println!(
            "usage: handctl doctor\nChecks /dev/uinput, group membership and the configured landmark source."
        ),
        "replay" => println!(
            "usage: handctl replay <file|-> [--live] [--profile <file>]\nRuns JSON-lines landmark frames through the detector and prints each gesture."
        ),
        "map" => println!("usage: handctl map <x> <y> [--profile <file>]\nMaps a normalized point to screen pixels."),
        "emit" => println!(
            "usage:\n  handctl emit click <left|right>\n  handctl emit scroll <units>\n  handctl emit move <x> <y>"
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
