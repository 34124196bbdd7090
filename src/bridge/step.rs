//! Forward and reverse navigation over the replayed execution.
//!
//! Every operation starts and ends with the engine in `break`. The building
//! blocks are the master stepping breakpoint (fires once per script
//! statement), transient stack-depth breakpoints, and gdb's
//! continue-with-direction. Reverse navigation always finishes by taking one
//! forward master trip so the reported location is a statement boundary.

use crate::bridge::error::{Error, Result};
use crate::bridge::mi::StopEvent;
use crate::bridge::{Position, Reason, Session, Status, MASTER_BP};
use crate::weak_error;
use log::debug;

/// Outcome of one continue: the breakpoint that fired and whether it was a
/// user-visible script breakpoint (a hit temporary one is consumed on the
/// spot).
pub(crate) struct ContinueOutcome {
    pub number: String,
    pub user_hit: bool,
}

impl Session {
    pub(crate) fn continue_execution(&mut self, reverse: bool) -> Result<ContinueOutcome> {
        self.status = Status::Running;
        let command = if reverse {
            "exec-continue --reverse"
        } else {
            "exec-continue"
        };

        let sent = self.mi.send(command);
        let stop = sent.and_then(|_| self.mi.wait_stop());
        self.status = Status::Break;

        let number = match stop? {
            StopEvent::Breakpoint(number) => number,
            StopEvent::Other(reason) => {
                self.reason = Reason::Aborted;
                return Err(Error::TraceBoundary(reason));
            }
        };

        if self.breakpoints.is_enabled_user_temporary(&number) {
            // gdb already dropped the temporary breakpoint on hit
            self.breakpoints.untrack(&number);
            return Ok(ContinueOutcome {
                number,
                user_hit: true,
            });
        }

        let user_hit = self.breakpoints.is_enabled_user(&number);
        Ok(ContinueOutcome { number, user_hit })
    }

    /// Re-align onto the next (or previous) script statement boundary: one
    /// trip of the master stepping breakpoint, which is enabled only for the
    /// duration of the move.
    pub(crate) fn goto_master(&mut self, reverse: bool) -> Result<ContinueOutcome> {
        self.enable_breakpoint(MASTER_BP)?;
        let outcome = self.continue_execution(reverse);
        let disabled = self.disable_breakpoint(MASTER_BP);
        let outcome = outcome?;
        disabled?;
        Ok(outcome)
    }

    /// One script statement, in either direction.
    pub fn step_into(&mut self, reverse: bool) -> Result<Position> {
        debug!(target: "bridge", "step_into reverse={reverse}");
        self.goto_master(reverse)?;
        self.current_position()
    }

    /// Step to the next statement at the current depth (step over) or at the
    /// caller's depth (step out), in either direction.
    pub fn step_over_or_out(&mut self, reverse: bool, step_out: bool) -> Result<Position> {
        debug!(target: "bridge", "step_{} reverse={reverse}", if step_out { "out" } else { "over" });

        let current_level = self.current_depth()?;
        // maintain-or-decrease the depth for step over, strictly decrease it
        // for step out
        let level_limit = if step_out && current_level > 0 {
            current_level - 1
        } else {
            current_level
        };

        let trap = self.insert_depth_breakpoint(level_limit)?;
        let outcome = self.continue_execution(reverse)?;

        if !reverse {
            self.remove_breakpoint(&trap)?;
            self.goto_master(false)?;
        } else {
            if outcome.user_hit {
                self.remove_breakpoint(&trap)?;

                // finish the statement the user breakpoint interrupted, at
                // the depth observed there, with other breaks quiet
                let hit_level = self.current_depth()?;
                let user_breakpoints = self.breakpoints.enabled_user_breakpoints();
                self.disable_breakpoints(&user_breakpoints)?;

                let inner_trap = self.insert_depth_breakpoint(hit_level)?;
                self.continue_execution(true)?;
                self.remove_breakpoint(&inner_trap)?;

                self.enable_breakpoints(&user_breakpoints)?;
            } else {
                let user_breakpoints = self.breakpoints.enabled_user_breakpoints();
                self.disable_breakpoints(&user_breakpoints)?;

                // complete the statement boundary with the depth trap still
                // armed
                self.continue_execution(true)?;

                self.enable_breakpoints(&user_breakpoints)?;
                self.remove_breakpoint(&trap)?;
            }

            // forward direction on purpose: land on a statement start rather
            // than mid-statement
            self.goto_master(false)?;
        }

        self.current_position()
    }

    /// Run until a user breakpoint fires, in either direction.
    pub fn run(&mut self, reverse: bool) -> Result<Position> {
        debug!(target: "bridge", "run reverse={reverse}");

        if reverse {
            // a statement step back first, with user breaks quiet, so the
            // breakpoint on the current line does not fire immediately
            let user_breakpoints = self.breakpoints.enabled_user_breakpoints();
            self.disable_breakpoints(&user_breakpoints)?;
            self.goto_master(true)?;
            self.enable_breakpoints(&user_breakpoints)?;
        }

        let outcome = self.continue_execution(reverse)?;
        if !outcome.user_hit {
            return Err(Error::TraceBoundary(format!(
                "stopped on breakpoint {} owned by no one",
                outcome.number
            )));
        }

        let user_breakpoints = self.breakpoints.enabled_user_breakpoints();
        self.disable_breakpoints(&user_breakpoints)?;

        if !reverse {
            self.goto_master(false)?;
        } else {
            // after the hit, step over backwards to the statement boundary
            let current_level = self.current_depth()?;
            let trap = self.insert_depth_breakpoint(current_level)?;
            self.continue_execution(true)?;
            self.remove_breakpoint(&trap)?;

            // forward direction on purpose, as in all reverse navigation
            self.goto_master(false)?;
        }

        let position = self.current_position();
        let restored = self.enable_breakpoints(&user_breakpoints);
        let position = position?;
        restored?;
        Ok(position)
    }
}

impl Session {
    /// Recoverable variant for the prompt's escape hatch: failures are logged
    /// and swallowed, the session stays usable.
    pub fn diversion_checked(&mut self, command: &str) -> Option<String> {
        weak_error!(self.diversion(command), "diversion")
    }
}
