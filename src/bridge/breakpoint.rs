use crate::bridge::error::{Error, Result};
use crate::bridge::{Session, BREAK_SOURCE};
use log::warn;
use std::collections::HashMap;

/// Closed set of breakpoint kinds known to the bridge.
///
/// `Line` breakpoints are the ones the IDE asked for; everything else is
/// internal machinery and never reported as a user hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakpointKind {
    /// Script line breakpoint, conditional on `lineno` at an instrumentation
    /// line that represents one script file.
    Line {
        file_uri: String,
        line: i64,
        temporary: bool,
    },
    /// Transient breakpoint bounding a step at one stack depth.
    Depth { level: i64 },
    /// The master stepping breakpoint, hit once per script statement.
    Master,
}

#[derive(Debug, Clone)]
pub struct Breakpoint {
    /// Number assigned by gdb; the registry and gdb always agree on it.
    pub number: String,
    pub kind: BreakpointKind,
    pub enabled: bool,
}

impl Breakpoint {
    fn is_user(&self) -> bool {
        matches!(self.kind, BreakpointKind::Line { .. })
    }
}

/// Mirror of gdb's breakpoint table, keyed by gdb's own numbers.
///
/// Mutated only between stop events, in the same critical section as the
/// corresponding gdb command.
#[derive(Default)]
pub struct BreakpointRegistry {
    table: HashMap<String, Breakpoint>,
}

impl BreakpointRegistry {
    pub fn track(&mut self, bp: Breakpoint) {
        self.table.insert(bp.number.clone(), bp);
    }

    pub fn untrack(&mut self, number: &str) {
        self.table.remove(number);
    }

    pub fn contains(&self, number: &str) -> bool {
        self.table.contains_key(number)
    }

    pub fn mark(&mut self, numbers: &[String], enabled: bool) {
        for number in numbers {
            if let Some(bp) = self.table.get_mut(number) {
                bp.enabled = enabled;
            }
        }
    }

    pub fn mark_all(&mut self, enabled: bool) {
        for bp in self.table.values_mut() {
            bp.enabled = enabled;
        }
    }

    /// Numbers of all enabled user (script line) breakpoints.
    pub fn enabled_user_breakpoints(&self) -> Vec<String> {
        self.table
            .values()
            .filter(|bp| bp.enabled && bp.is_user())
            .map(|bp| bp.number.clone())
            .collect()
    }

    pub fn is_enabled_user(&self, number: &str) -> bool {
        self.table
            .get(number)
            .is_some_and(|bp| bp.enabled && bp.is_user())
    }

    pub fn is_enabled_user_temporary(&self, number: &str) -> bool {
        self.table.get(number).is_some_and(|bp| {
            bp.enabled && matches!(bp.kind, BreakpointKind::Line { temporary: true, .. })
        })
    }

    /// Number of the enabled user breakpoint sitting on `(uri, line)`, if any.
    pub fn user_breakpoint_at(&self, uri: &str, line: i64) -> Option<&str> {
        self.table.values().find_map(|bp| match &bp.kind {
            BreakpointKind::Line {
                file_uri,
                line: bp_line,
                ..
            } if bp.enabled && file_uri == uri && *bp_line == line => Some(bp.number.as_str()),
            _ => None,
        })
    }
}

/// State rendered into a `breakpoint_set` response.
pub struct BreakpointView {
    pub number: String,
    pub enabled: bool,
}

impl Session {
    /// Insert a script line breakpoint: a conditional gdb breakpoint on the
    /// instrumentation line that represents `file_uri`.
    pub fn set_line_breakpoint(
        &mut self,
        file_uri: &str,
        line: i64,
        disabled: bool,
        temporary: bool,
    ) -> Result<BreakpointView> {
        let Some(location_line) = self.index.file_line(file_uri) else {
            let warning = format!(
                "retrace: Not able to find {file_uri} to add a breakpoint. \
                 Either the IDE is trying to set a breakpoint for a file from a different \
                 project (which is OK) or you need to regenerate breakpoint locations for \
                 this project"
            );
            warn!(target: "bridge", "{warning}");
            return Err(Error::NoSuchFile(warning));
        };

        let temporary_flag = if temporary { "-t " } else { "" };
        let disabled_flag = if disabled { "-d " } else { "" };
        let result = self.mi.send(&format!(
            "break-insert {temporary_flag}{disabled_flag}-f -c \"lineno == {line}\" \
             --source {BREAK_SOURCE} --line {location_line}"
        ))?;
        if result.class != "done" {
            warn!(target: "bridge", "gdb rejected the line breakpoint: {:?}", result.fields);
            return Err(Error::CouldNotSetBreakpoint);
        }

        let number = breakpoint_number(&result)?;
        if self.breakpoints.contains(&number) {
            return Err(Error::DuplicateBreakpoint(number));
        }

        self.breakpoints.track(Breakpoint {
            number: number.clone(),
            kind: BreakpointKind::Line {
                file_uri: file_uri.to_string(),
                line,
                temporary,
            },
            enabled: !disabled,
        });

        Ok(BreakpointView {
            number,
            enabled: !disabled,
        })
    }

    /// Insert an unconditional breakpoint on the instrumentation line that
    /// represents stack depth `level`.
    pub(crate) fn insert_depth_breakpoint(&mut self, level: i64) -> Result<String> {
        let Some(location_line) = self.index.level_line(level) else {
            return Err(Error::DepthRange {
                level: level + 1,
                max: self.index.max_depth() as i64,
            });
        };

        let result = self
            .mi
            .send(&format!("break-insert -f --source {BREAK_SOURCE} --line {location_line}"))?;
        if result.class != "done" {
            return Err(Error::DepthBreakpoint);
        }

        let number = breakpoint_number(&result)?;
        self.breakpoints.track(Breakpoint {
            number: number.clone(),
            kind: BreakpointKind::Depth { level },
            enabled: true,
        });
        Ok(number)
    }

    /// Delete a breakpoint from gdb and forget it.
    pub fn remove_breakpoint(&mut self, number: &str) -> Result<()> {
        self.mi.send(&format!("break-delete {number}"))?;
        self.breakpoints.untrack(number);
        Ok(())
    }

    pub(crate) fn enable_breakpoints(&mut self, numbers: &[String]) -> Result<()> {
        if numbers.is_empty() {
            return Ok(());
        }
        self.mi.send(&format!("break-enable {}", numbers.join(" ")))?;
        self.breakpoints.mark(numbers, true);
        Ok(())
    }

    pub(crate) fn disable_breakpoints(&mut self, numbers: &[String]) -> Result<()> {
        if numbers.is_empty() {
            return Ok(());
        }
        self.mi.send(&format!("break-disable {}", numbers.join(" ")))?;
        self.breakpoints.mark(numbers, false);
        Ok(())
    }

    /// Disable every breakpoint gdb knows about, tracked here or not.
    pub(crate) fn disable_all_breakpoints(&mut self) -> Result<()> {
        self.mi.send("break-disable")?;
        self.breakpoints.mark_all(false);
        Ok(())
    }

    /// Enable every breakpoint gdb knows about, tracked here or not.
    pub fn enable_all_breakpoints(&mut self) -> Result<()> {
        self.mi.send("break-enable")?;
        self.breakpoints.mark_all(true);
        Ok(())
    }

    pub fn enable_breakpoint(&mut self, number: &str) -> Result<()> {
        self.enable_breakpoints(&[number.to_string()])
    }

    pub fn disable_breakpoint(&mut self, number: &str) -> Result<()> {
        self.disable_breakpoints(&[number.to_string()])
    }
}

pub(crate) fn breakpoint_number(result: &crate::bridge::mi::output::MiResult) -> Result<String> {
    result
        .fields
        .get("bkpt")
        .and_then(|b| b.get("number"))
        .and_then(|n| n.as_str())
        .map(str::to_string)
        .ok_or_else(|| Error::MiCommand {
            command: "break-insert".to_string(),
            details: "reply carries no breakpoint number".to_string(),
        })
}
