//! The DBGp serving loop: reads requests from the IDE connection, routes them
//! through the session, frames and writes the responses.

use crate::bridge::error::{Error, Result};
use crate::bridge::{preview, Session, Status, Toggles};
use crate::dbgp::{self, template, DbgpRequest};
use crate::ui::{console, BridgeMessage, Printer};
use anyhow::Context;
use log::{error, info, warn};
use serde_json::json;
use std::io::{BufReader, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;

/// Dial the IDE, emit `init`, then serve requests until the client
/// disconnects, sends `stop`, or the user quits at the prompt. Returns the
/// recorder's exit code.
pub fn run(mut session: Session, dbgp_port: u16, toggles: Arc<Toggles>) -> anyhow::Result<i32> {
    info!(target: "dbgp", "trying to connect to the debugger IDE on port {dbgp_port}");
    let stream = TcpStream::connect(("127.0.0.1", dbgp_port)).with_context(|| {
        format!("connect to port {dbgp_port}: is your IDE listening for debugging connections?")
    })?;
    let mut writer = stream.try_clone().context("clone the IDE socket")?;

    writer.write_all(&dbgp::packet(&template::init(
        session.entry_file(),
        std::process::id(),
    )))?;
    info!(target: "dbgp", "connected to the debugger IDE");

    let (tx, rx) = mpsc::channel();
    spawn_socket_reader(stream.try_clone().context("clone the IDE socket")?, tx.clone());
    let printer = console::start(tx, session.direction_handle(), Arc::clone(&toggles))?;

    while let Ok(message) = rx.recv() {
        match message {
            BridgeMessage::IdeRequest(raw) => {
                if !serve_request(&mut session, &raw, &mut writer, &toggles, &printer) {
                    break;
                }
                if session.status() == Status::Stopped {
                    info!(target: "dbgp", "IDE sent the stop command");
                    break;
                }
            }
            BridgeMessage::IdeClosed => {
                info!(target: "dbgp", "EOF received on the connection to the IDE");
                break;
            }
            BridgeMessage::RawMi(command) => match session.raw_mi(&command) {
                Ok(result) => {
                    let rendered = json!({
                        "class": result.class,
                        "payload": result.fields.to_json(),
                    });
                    printer.println(
                        serde_json::to_string_pretty(&rendered).unwrap_or_else(|_| rendered.to_string()),
                    );
                }
                Err(e) => printer.println(format!("gdb/mi error: {e:#}")),
            },
            BridgeMessage::Diversion(command) => {
                if let Some(xml) = session.diversion_checked(&command) {
                    printer.println(xml);
                }
            }
            BridgeMessage::Quit => break,
        }
    }

    let _ = stream.shutdown(Shutdown::Both);
    Ok(session.teardown())
}

/// Handle one request end to end; `false` tears the session down.
fn serve_request(
    session: &mut Session,
    raw: &str,
    writer: &mut TcpStream,
    toggles: &Toggles,
    printer: &Printer,
) -> bool {
    let verbose = toggles.verbose.load(Ordering::Relaxed);
    if verbose {
        printer.println(format!("ide -> retrace: {}", preview(raw)));
    }

    let request = match DbgpRequest::parse(raw) {
        Ok(request) => request,
        Err(e) => {
            error!(target: "dbgp", "unusable request: {e:#}");
            return false;
        }
    };
    if let Err(e) = session.accept_sequence(request.sequence) {
        error!(target: "dbgp", "{e:#}");
        return false;
    }

    // latch the direction for the whole request; prompt-side flips become
    // visible at the next one
    let reverse = session.latched_direction();

    let response = match dispatch(session, &request, reverse) {
        Ok(xml) => xml,
        Err(e) if e.is_fatal() => {
            error!(target: "dbgp", "fatal error while handling `{}`: {e:#}", request.command);
            return false;
        }
        Err(e) => {
            warn!(target: "dbgp", "request `{}` failed: {e:#}", request.command);
            template::error(&request.command, request.sequence, e.dbgp_code(), &e.to_string())
        }
    };

    if verbose {
        printer.println(format!("retrace -> ide:\n{}", preview(&response)));
    }
    if let Err(e) = writer.write_all(&dbgp::packet(&response)) {
        error!(target: "dbgp", "writing to the IDE failed: {e:#}");
        return false;
    }
    true
}

/// Route one parsed request to its handler and render the response XML.
pub fn dispatch(session: &mut Session, request: &DbgpRequest, reverse: bool) -> Result<String> {
    match request.command.as_str() {
        "feature_set" => feature_set(session, request),
        "feature_get" => feature_get(session, request),
        "status" => Ok(template::status(
            request.sequence,
            session.status(),
            session.reason(),
        )),
        "breakpoint_set" => breakpoint_set(session, request),
        "breakpoint_remove" => breakpoint_remove(session, request),
        "breakpoint_update" => breakpoint_update(session, request),
        "step_into" => {
            let position = session.step_into(reverse)?;
            Ok(template::step_break(
                "step_into",
                request.sequence,
                &position.filename,
                position.line,
            ))
        }
        "step_over" | "step_out" => {
            let step_out = request.command == "step_out";
            let position = session.step_over_or_out(reverse, step_out)?;
            Ok(template::step_break(
                &request.command,
                request.sequence,
                &position.filename,
                position.line,
            ))
        }
        "run" => {
            let position = session.run(reverse)?;
            Ok(template::step_break(
                "run",
                request.sequence,
                &position.filename,
                position.line,
            ))
        }
        // evaluating interpreter code must not trip user breakpoints set on
        // the very same lines
        "eval" | "property_get" | "property_value" | "context_get" => {
            session.diversion_without_breakpoints(&request.full_command)
        }
        "stack_get" | "stack_depth" | "context_names" | "typemap_get" | "source" => {
            session.diversion(&request.full_command)
        }
        "property_set" => Ok(template::property_set(request.sequence)),
        "stdout" | "stderr" | "stdin" => {
            Ok(template::std_fd(request.sequence, &request.command))
        }
        "stop" => {
            session.status = Status::Stopped;
            Ok(template::status(
                request.sequence,
                session.status(),
                session.reason(),
            ))
        }
        other => Err(Error::UnknownCommand(other.to_string())),
    }
}

fn feature_set(session: &mut Session, request: &DbgpRequest) -> Result<String> {
    let name = request.require("n", "feature name")?;
    let value = request.require("v", "feature value")?;
    session.features.set(name, value)?;
    Ok(template::feature_set(request.sequence, name, 1))
}

fn feature_get(session: &mut Session, request: &DbgpRequest) -> Result<String> {
    let name = request.require("n", "feature name")?;
    Ok(match session.features.get(name) {
        Some(feature) => template::feature_get(request.sequence, name, 1, &feature.text()),
        None => template::feature_get(request.sequence, name, 0, ""),
    })
}

fn breakpoint_set(session: &mut Session, request: &DbgpRequest) -> Result<String> {
    let kind = request.require("t", "breakpoint type")?;
    match kind {
        "line" => {}
        "call" | "return" | "exception" | "conditional" | "watch" => {
            return Err(Error::TypeNotSupported(kind.to_string()));
        }
        unknown => {
            return Err(Error::Request(format!("unknown breakpoint type `{unknown}`")));
        }
    }

    let file_uri = request.require("f", "script file uri")?;
    let disabled = match request.option("s") {
        None | Some("enabled") => false,
        Some("disabled") => true,
        Some(other) => {
            return Err(Error::Request(format!("unknown breakpoint status `{other}`")));
        }
    };
    let line: i64 = request
        .require("n", "line number")?
        .parse()
        .map_err(|_| Error::Request("malformed line number in breakpoint_set".to_string()))?;
    let temporary = request.option("r") == Some("1");

    if request.option("h").is_some() || request.option("o").is_some() {
        return Err(Error::HitConditionUnsupported);
    }

    let view = session.set_line_breakpoint(file_uri, line, disabled, temporary)?;
    let state = if view.enabled { "enabled" } else { "disabled" };
    Ok(template::breakpoint_set(request.sequence, state, &view.number))
}

fn breakpoint_remove(session: &mut Session, request: &DbgpRequest) -> Result<String> {
    let number = request.require("d", "breakpoint id to remove")?;
    session.remove_breakpoint(number)?;
    Ok(template::breakpoint_ack("breakpoint_remove", request.sequence))
}

fn breakpoint_update(session: &mut Session, request: &DbgpRequest) -> Result<String> {
    let number = request.require("d", "breakpoint number for breakpoint_update")?;
    if request.option("n").is_some() {
        return Err(Error::UpdateUnsupported("line number"));
    }
    if request.option("h").is_some() || request.option("o").is_some() {
        return Err(Error::UpdateUnsupported("hit condition/value"));
    }

    match request.require("s", "new breakpoint status")? {
        "enabled" => session.enable_breakpoint(number)?,
        "disabled" => session.disable_breakpoint(number)?,
        other => {
            return Err(Error::Request(format!(
                "unknown breakpoint status `{other}` for breakpoint_update"
            )));
        }
    }
    Ok(template::breakpoint_ack("breakpoint_update", request.sequence))
}

fn spawn_socket_reader(stream: TcpStream, tx: Sender<BridgeMessage>) {
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        loop {
            let mut buf = Vec::new();
            match read_until_nul(&mut reader, &mut buf) {
                Ok(0) => {
                    let _ = tx.send(BridgeMessage::IdeClosed);
                    break;
                }
                Ok(_) => {
                    let raw = String::from_utf8_lossy(&buf).into_owned();
                    if tx.send(BridgeMessage::IdeRequest(raw)).is_err() {
                        break;
                    }
                }
                Err(_) => {
                    let _ = tx.send(BridgeMessage::IdeClosed);
                    break;
                }
            }
        }
    });
}

fn read_until_nul<R: std::io::BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<usize> {
    let n = reader.read_until(0, buf)?;
    if buf.last() == Some(&0) {
        buf.pop();
    }
    Ok(n)
}
