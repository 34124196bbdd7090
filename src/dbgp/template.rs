//! Literal XML skeletons for every DBGp response shape.

use crate::bridge::{Reason, Status};

pub fn init(entry_file: &str, appid: u32) -> String {
    format!(
        r#"<init xmlns="urn:debugger_protocol_v1" language="PHP" protocol_version="1.0"
		fileuri="file://{entry_file}"
		appid="{appid}" idekey="retrace">
		<engine version="0.1.0"><![CDATA[retrace]]></engine>
	</init>"#
    )
}

pub fn feature_set(sequence: i64, name: &str, success: u8) -> String {
    format!(
        r#"<response xmlns="urn:debugger_protocol_v1" command="feature_set"
		transaction_id="{sequence}" feature="{name}" success="{success}">
	</response>"#
    )
}

pub fn feature_get(sequence: i64, name: &str, supported: u8, value: &str) -> String {
    format!(
        r#"<response xmlns="urn:debugger_protocol_v1" command="feature_get"
		transaction_id="{sequence}" feature_name="{name}" supported="{supported}">
		{value}
	</response>"#
    )
}

pub fn status(sequence: i64, status: Status, reason: Reason) -> String {
    format!(
        r#"<response xmlns="urn:debugger_protocol_v1" command="status"
		transaction_id="{sequence}" status="{status}" reason="{reason}">
	</response>"#
    )
}

pub fn breakpoint_set(sequence: i64, state: &str, id: &str) -> String {
    format!(
        r#"<response xmlns="urn:debugger_protocol_v1" command="breakpoint_set" transaction_id="{sequence}" status="{state}" id="{id}">
	</response>"#
    )
}

/// Shared by `breakpoint_remove` and `breakpoint_update`.
pub fn breakpoint_ack(command: &str, sequence: i64) -> String {
    format!(
        r#"<response xmlns="urn:debugger_protocol_v1" command="{command}" transaction_id="{sequence}">
	</response>"#
    )
}

pub fn error(command: &str, sequence: i64, code: u32, message: &str) -> String {
    format!(
        r#"<response xmlns="urn:debugger_protocol_v1" command="{command}" transaction_id="{sequence}">
	 	<error code="{code}">
        		<message>{message}</message>
    		</error>
	</response>"#
    )
}

/// `break` report for the step and run commands.
pub fn step_break(command: &str, sequence: i64, filename: &str, line: i64) -> String {
    format!(
        r#"<response xmlns="urn:debugger_protocol_v1" xmlns:xdebug="http://xdebug.org/dbgp/xdebug" command="{command}"
		transaction_id="{sequence}" status="break" reason="ok">
		<xdebug:message filename="{filename}" lineno="{line}"></xdebug:message>
	</response>"#
    )
}

/// Replay is read-only; property writes always fail.
pub fn property_set(sequence: i64) -> String {
    format!(r#"<response transaction_id="{sequence}" command="property_set" success="0"></response>"#)
}

/// The stdout/stdin/stderr redirection commands always fail.
pub fn std_fd(sequence: i64, command: &str) -> String {
    format!(r#"<response transaction_id="{sequence}" command="{command}" success="0"></response>"#)
}
