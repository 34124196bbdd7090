//! A scripted stand-in for gdb: replies to MI commands from a canned list, in
//! order, and records every command it saw so tests can assert the exact
//! command stream an operation produced.

use retrace::bridge::location::LocationIndex;
use retrace::bridge::mi::MiClient;
use retrace::bridge::{Session, Toggles};
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

/// Two script files and four stack levels. Instrumentation lines: a.php -> 3,
/// b.php -> 4, level 0..3 -> 5..8.
const LOCATIONS_FIXTURE: &str = "\
//&&& Number of Files: 2
//&&& Max Stack Depth: 4
//### /srv/app/a.php
//### /srv/app/b.php
//$$$
//$$$
//$$$
//$$$
";

pub const ENTRY_FILE: &str = "/srv/app/a.php";

static FIXTURE_COUNTER: AtomicUsize = AtomicUsize::new(0);

pub fn test_index() -> LocationIndex {
    let path = std::env::temp_dir().join(format!(
        "retrace_break_{}_{}.c",
        std::process::id(),
        FIXTURE_COUNTER.fetch_add(1, Ordering::SeqCst)
    ));
    std::fs::write(&path, LOCATIONS_FIXTURE).unwrap();
    let index = LocationIndex::from_file(&path).unwrap();
    let _ = std::fs::remove_file(&path);
    index
}

/// Session wired to a scripted gdb. The returned log fills up with the MI
/// commands (tokens stripped) in the order the session issued them.
pub fn scripted_session(replies: Vec<Vec<String>>) -> (Session, Arc<Mutex<Vec<String>>>) {
    let (command_rx, command_tx) = os_pipe::pipe().unwrap();
    let (reply_rx, reply_tx) = os_pipe::pipe().unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));

    let thread_log = Arc::clone(&log);
    thread::spawn(move || fake_gdb(command_rx, reply_tx, replies.into(), thread_log));

    let client = MiClient::from_transport(
        BufReader::new(reply_rx),
        command_tx,
        Arc::new(Toggles::default()),
    );
    let session = Session::new(client, test_index(), ENTRY_FILE.to_string(), None);
    (session, log)
}

pub fn commands(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn fake_gdb(
    commands: os_pipe::PipeReader,
    mut replies_out: os_pipe::PipeWriter,
    mut replies: VecDeque<Vec<String>>,
    log: Arc<Mutex<Vec<String>>>,
) {
    // the stop the one-shot attach breakpoint would have produced; the client
    // swallows it, later stops flow through
    let _ = writeln!(replies_out, "*stopped,reason=\"breakpoint-hit\",bkptno=\"2\"");

    for line in BufReader::new(commands).lines() {
        let Ok(line) = line else { break };
        let command = strip_token(&line);
        if command == "gdb-exit" {
            break;
        }
        log.lock().unwrap().push(command.to_string());

        let batch = replies
            .pop_front()
            .unwrap_or_else(|| vec!["^error,msg=\"scripted gdb ran out of replies\"".to_string()]);
        for reply in batch {
            if writeln!(replies_out, "{reply}").is_err() {
                return;
            }
        }
        let _ = writeln!(replies_out, "(gdb)");
    }
}

fn strip_token(line: &str) -> &str {
    let rest = line.trim_start_matches(|c: char| c.is_ascii_digit());
    rest.strip_prefix('-').unwrap_or(rest).trim_end()
}

// ---------------------------------------------------------------------------
// reply builders
// ---------------------------------------------------------------------------

pub fn done() -> Vec<String> {
    vec!["^done".to_string()]
}

pub fn done_bkpt(number: &str) -> Vec<String> {
    vec![format!(
        "^done,bkpt={{number=\"{number}\",type=\"breakpoint\",disp=\"keep\"}}"
    )]
}

pub fn running_then_stop(bkptno: &str) -> Vec<String> {
    vec![
        "^running".to_string(),
        format!("*stopped,reason=\"breakpoint-hit\",disp=\"keep\",bkptno=\"{bkptno}\""),
    ]
}

pub fn running_then_exit(reason: &str) -> Vec<String> {
    vec![
        "^running".to_string(),
        format!("*stopped,reason=\"{reason}\""),
    ]
}

/// `data-evaluate-expression` reply for a string value; gdb renders those as
/// `0xADDR "contents"` with embedded quotes backslash-escaped.
pub fn value_str(contents: &str) -> Vec<String> {
    let escaped = contents.replace('"', "\\\\\\\"");
    vec![format!("^done,value=\"0x7f261d8624e8 \\\"{escaped}\\\"\"")]
}

pub fn value_int(value: i64) -> Vec<String> {
    vec![format!("^done,value=\"{value}\"")]
}
