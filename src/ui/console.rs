//! The interactive prompt next to the IDE session: direction toggles,
//! verbosity toggles, and escape hatches into gdb/mi and the diversion
//! helper.

use crate::bridge::Toggles;
use crate::ui::{BridgeMessage, Printer};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread;

const PROMPT: &str = "(retrace) ";
const HISTORY_FILE: &str = ".retrace.history";

const HELP_TEXT: &str = r##"
h        display this help text
q        quit
r        debug in reverse mode
f        debug in forward (normal) mode
t        toggle between reverse and forward modes
v        toggle between verbose and quiet modes
n        toggle between showing and not showing gdb notifications
<enter>  will tell you whether you are in forward or reverse mode

Debugging in reverse mode can be confusing but here is a cheat sheet:
The buttons in your IDE debugger have the following (opposite) meanings in reverse mode:

         step-into     becomes: step-into a statement in the reverse direction

         step-over     becomes: step-over one statement backwards. As usual, stop if you
                                encounter a breakpoint while doing this operation.

         step-out      becomes: run backwards until you come out of the current function
                                and are about to enter it. As usual, stop if you encounter
                                a breakpoint while doing this operation.

         run/continue  becomes: run backwards until you hit a breakpoint

Expert usage:
* For commands to be sent to gdb/mi prefix the command with "-" e.g. -thread-info
* For dbgp commands answered by the replayed process, prefix the command with "#"
  e.g. #stack_get -i 0
  Note: only a subset of dbgp commands may be issued in this way.
"##;

/// Spawn the prompt thread. Returns a printer wired to the line editor so the
/// dispatcher can write results without mangling the prompt.
pub fn start(
    tx: Sender<BridgeMessage>,
    direction: Arc<Mutex<bool>>,
    toggles: Arc<Toggles>,
) -> anyhow::Result<Printer> {
    let mut editor = DefaultEditor::new()?;
    let history = history_path();
    if let Some(path) = &history {
        let _ = editor.load_history(path);
    }

    let printer = Printer::new(Box::new(editor.create_external_printer()?));

    thread::spawn(move || {
        println!("h <enter> for help");
        loop {
            let line = match editor.readline(PROMPT) {
                Ok(line) => line,
                Err(ReadlineError::Eof | ReadlineError::Interrupted) => {
                    println!("Exiting.");
                    let _ = tx.send(BridgeMessage::Quit);
                    break;
                }
                Err(e) => {
                    log::error!(target: "console", "readline: {e:#}");
                    let _ = tx.send(BridgeMessage::Quit);
                    break;
                }
            };

            if !line.trim().is_empty() {
                let _ = editor.add_history_entry(&line);
            }

            let input = line.trim();
            if input.starts_with('t') {
                let mut reverse = direction.lock().expect("direction flag poisoned");
                *reverse = !*reverse;
                print_mode(*reverse);
            } else if input.starts_with('r') {
                *direction.lock().expect("direction flag poisoned") = true;
                print_mode(true);
            } else if input.starts_with('f') {
                *direction.lock().expect("direction flag poisoned") = false;
                print_mode(false);
            } else if input.starts_with('v') {
                let verbose = !toggles.verbose.fetch_xor(true, Ordering::Relaxed);
                println!("{}", if verbose { "Verbose mode" } else { "Quiet mode" });
            } else if input.starts_with('n') {
                let show = !toggles.gdb_notifications.fetch_xor(true, Ordering::Relaxed);
                println!(
                    "{}",
                    if show {
                        "Will show gdb notifications"
                    } else {
                        "Wont show gdb notifications"
                    }
                );
            } else if let Some(command) = input.strip_prefix('-') {
                if tx.send(BridgeMessage::RawMi(command.trim().to_string())).is_err() {
                    break;
                }
            } else if let Some(command) = input.strip_prefix('#') {
                if tx.send(BridgeMessage::Diversion(command.trim().to_string())).is_err() {
                    break;
                }
            } else if input.starts_with('q') {
                println!("Exiting.");
                let _ = tx.send(BridgeMessage::Quit);
                break;
            } else if input.starts_with('h') {
                println!("{HELP_TEXT}");
            } else {
                print_mode(*direction.lock().expect("direction flag poisoned"));
            }
        }

        if let Some(path) = &history {
            let _ = editor.save_history(path);
        }
    });

    Ok(printer)
}

fn print_mode(reverse: bool) {
    if reverse {
        println!("In reverse mode");
    } else {
        println!("In forward mode");
    }
}

fn history_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(HISTORY_FILE))
}
