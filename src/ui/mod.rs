pub mod console;
pub mod ide;

use std::cell::RefCell;
use std::fmt::Display;

/// Everything the dispatcher loop reacts to: requests read from the IDE
/// socket and actions typed at the interactive prompt.
pub enum BridgeMessage {
    /// One null-terminated DBGp request.
    IdeRequest(String),
    /// EOF or error on the IDE socket.
    IdeClosed,
    /// Raw MI command from the prompt (`-` prefix).
    RawMi(String),
    /// DBGp command answered by the replayed process (`#` prefix).
    Diversion(String),
    Quit,
}

/// Prints through the line editor so messages from other threads do not
/// mangle the prompt. Falls back to plain stdout when no editor is around
/// (tests, non-tty).
pub struct Printer {
    inner: Option<RefCell<Box<dyn rustyline::ExternalPrinter>>>,
}

// the printer is only handed to the dispatcher thread and used behind &self
unsafe impl Send for Printer {}

impl Printer {
    pub fn new(printer: Box<dyn rustyline::ExternalPrinter>) -> Self {
        Printer {
            inner: Some(RefCell::new(printer)),
        }
    }

    pub fn plain() -> Self {
        Printer { inner: None }
    }

    pub fn println(&self, msg: impl Display) {
        match &self.inner {
            None => println!("{msg}"),
            Some(printer) => {
                let _ = printer.borrow_mut().print(format!("{msg}\n"));
            }
        }
    }
}
