use crate::bridge::error::{Error, Result};
use crate::bridge::{Position, Session};

/// Name of the helper compiled into the traced process; it executes one DBGp
/// command against the replayed interpreter state and returns the rendered
/// XML. The call runs in a side-effect-free sub-session of the replay.
const DIVERSION_HELPER: &str = "retrace_xdebug_cmd";

impl Session {
    /// Script file of the currently stopped frame.
    pub fn current_filename(&mut self) -> Result<String> {
        self.eval_string("filename")
    }

    /// Script line of the currently stopped frame.
    pub fn current_line(&mut self) -> Result<i64> {
        self.eval_int("lineno")
    }

    /// Script stack depth of the currently stopped frame (0 at the entry).
    pub fn current_depth(&mut self) -> Result<i64> {
        self.eval_int("level")
    }

    pub fn current_position(&mut self) -> Result<Position> {
        Ok(Position {
            filename: self.current_filename()?,
            line: self.current_line()?,
        })
    }

    /// Ask the replayed process to answer a DBGp command in a diversion
    /// sub-session. Replay state is read-only by construction, so the helper
    /// cannot disturb the execution cursor.
    pub fn diversion(&mut self, command: &str) -> Result<String> {
        self.eval_string(&format!("{DIVERSION_HELPER}(\"{command}\")"))
    }

    /// Diversion with every gdb breakpoint disabled around the call: the
    /// helper executes interpreter code, and evaluating it must not trip user
    /// breakpoints set on the same lines.
    pub fn diversion_without_breakpoints(&mut self, command: &str) -> Result<String> {
        let user_breakpoints = self.breakpoints.enabled_user_breakpoints();
        self.disable_all_breakpoints()?;
        let result = self.diversion(command);
        self.enable_breakpoints(&user_breakpoints)?;
        result
    }

    fn eval_value(&mut self, expression: &str) -> Result<String> {
        let result = self
            .mi
            .send_ok(&format!("data-evaluate-expression {expression}"))?;
        result
            .fields
            .get_str("value")
            .map(str::to_string)
            .ok_or_else(|| Error::MiCommand {
                command: format!("data-evaluate-expression {expression}"),
                details: "reply carries no value".to_string(),
            })
    }

    fn eval_string(&mut self, expression: &str) -> Result<String> {
        parse_gdb_string(&self.eval_value(expression)?)
    }

    fn eval_int(&mut self, expression: &str) -> Result<i64> {
        let value = self.eval_value(expression)?;
        value.trim().parse().map_err(|_| Error::MiCommand {
            command: format!("data-evaluate-expression {expression}"),
            details: format!("expected an integer, got `{value}`"),
        })
    }
}

/// Extract the contents of a gdb string value.
///
/// A string response looks like `0x7f261d8624e8 "some string here"`, the
/// empty string like `0x7f44a33a9c1e ""`; embedded quotes arrive
/// backslash-escaped.
pub(crate) fn parse_gdb_string(value: &str) -> Result<String> {
    let first = value.find('"');
    let last = value.rfind('"');
    match (first, last) {
        (Some(first), Some(last)) if first != last => {
            Ok(unquote_gdb_string(&value[first + 1..last]))
        }
        _ => Err(Error::GdbStringResponse(value.to_string())),
    }
}

fn unquote_gdb_string(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek() == Some(&'"') {
            out.push('"');
            chars.next();
        } else {
            out.push(c);
        }
    }
    out
}
