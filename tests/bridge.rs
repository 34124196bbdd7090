//! End-to-end exercises of the request dispatcher and the step engine over a
//! scripted gdb, asserting both the exact MI command streams and the rendered
//! DBGp responses.

mod common;

use common::*;
use retrace::bridge::error::Error;
use retrace::bridge::{Reason, Status};
use retrace::dbgp::{template, DbgpRequest};
use retrace::ui::ide::dispatch;

fn req(raw: &str) -> DbgpRequest {
    DbgpRequest::parse(raw).unwrap()
}

fn strs(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

#[test]
fn init_response_names_entry_script_and_pid() {
    let xml = template::init("/srv/app/a.php", 4242);
    assert!(xml.contains("fileuri=\"file:///srv/app/a.php\""));
    assert!(xml.contains("appid=\"4242\""));
    assert!(xml.contains("idekey=\"retrace\""));
}

#[test]
fn status_starts_in_starting_ok() {
    let (mut session, log) = scripted_session(vec![]);
    assert_eq!(session.entry_file(), ENTRY_FILE);
    let xml = dispatch(&mut session, &req("status -i 1"), false).unwrap();
    assert!(xml.contains("status=\"starting\""));
    assert!(xml.contains("reason=\"ok\""));
    assert!(commands(&log).is_empty());
}

#[test]
fn stop_transitions_to_stopped() {
    let (mut session, log) = scripted_session(vec![]);
    let xml = dispatch(&mut session, &req("stop -i 3"), false).unwrap();
    assert!(xml.contains("status=\"stopped\""));
    assert_eq!(session.status(), Status::Stopped);
    assert!(commands(&log).is_empty());
}

#[test]
fn step_into_forward_is_one_master_trip() {
    let (mut session, log) = scripted_session(vec![
        done(),                      // break-enable 1
        running_then_stop("1"),      // exec-continue
        done(),                      // break-disable 1
        value_str("/srv/app/a.php"), // filename
        value_int(2),                // lineno
    ]);

    let xml = dispatch(&mut session, &req("step_into -i 1"), false).unwrap();

    assert_eq!(
        commands(&log),
        strs(&[
            "break-enable 1",
            "exec-continue",
            "break-disable 1",
            "data-evaluate-expression filename",
            "data-evaluate-expression lineno",
        ])
    );
    assert!(xml.contains("command=\"step_into\""));
    assert!(xml.contains("status=\"break\" reason=\"ok\""));
    assert!(xml.contains("filename=\"/srv/app/a.php\""));
    assert!(xml.contains("lineno=\"2\""));
    assert!(xml.contains("transaction_id=\"1\""));
    assert_eq!(session.status(), Status::Break);
}

#[test]
fn step_into_reverse_continues_backwards() {
    let (mut session, log) = scripted_session(vec![
        done(),
        running_then_stop("1"),
        done(),
        value_str("/srv/app/a.php"),
        value_int(1),
    ]);

    dispatch(&mut session, &req("step_into -i 7"), true).unwrap();

    assert_eq!(
        commands(&log),
        strs(&[
            "break-enable 1",
            "exec-continue --reverse",
            "break-disable 1",
            "data-evaluate-expression filename",
            "data-evaluate-expression lineno",
        ])
    );
}

#[test]
fn breakpoint_set_translates_to_conditional_insert() {
    let (mut session, log) = scripted_session(vec![done_bkpt("2")]);

    let xml = dispatch(
        &mut session,
        &req("breakpoint_set -i 4 -t line -f file:///srv/app/a.php -n 7"),
        false,
    )
    .unwrap();

    assert_eq!(
        commands(&log),
        strs(&["break-insert -f -c \"lineno == 7\" --source retrace_break.c --line 3"])
    );
    assert!(xml.contains("id=\"2\""));
    assert!(xml.contains("status=\"enabled\""));
    assert!(xml.contains("transaction_id=\"4\""));
}

#[test]
fn breakpoint_set_disabled_and_temporary_flags() {
    let (mut session, log) = scripted_session(vec![done_bkpt("2")]);

    let xml = dispatch(
        &mut session,
        &req("breakpoint_set -i 4 -t line -f file:///srv/app/b.php -n 12 -s disabled -r 1"),
        false,
    )
    .unwrap();

    assert_eq!(
        commands(&log),
        strs(&["break-insert -t -d -f -c \"lineno == 12\" --source retrace_break.c --line 4"])
    );
    assert!(xml.contains("status=\"disabled\""));
}

#[test]
fn breakpoint_set_for_unknown_file_is_recoverable() {
    let (mut session, log) = scripted_session(vec![]);

    let err = dispatch(
        &mut session,
        &req("breakpoint_set -i 4 -t line -f file:///elsewhere/c.php -n 3"),
        false,
    )
    .unwrap_err();

    assert!(matches!(err, Error::NoSuchFile(_)));
    assert_eq!(err.dbgp_code(), 200);
    assert!(!err.is_fatal());
    assert!(commands(&log).is_empty(), "no gdb traffic for unknown files");
}

#[test]
fn breakpoint_set_unsupported_type_is_recoverable() {
    let (mut session, log) = scripted_session(vec![]);

    for kind in ["call", "return", "exception", "conditional", "watch"] {
        let err = dispatch(
            &mut session,
            &req(&format!("breakpoint_set -i 4 -t {kind} -f file:///srv/app/a.php -n 3")),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, Error::TypeNotSupported(_)));
        assert_eq!(err.dbgp_code(), 201);
        assert!(!err.is_fatal());
    }
    assert!(commands(&log).is_empty());
}

#[test]
fn breakpoint_set_hit_condition_is_recoverable() {
    let (mut session, _) = scripted_session(vec![]);
    let err = dispatch(
        &mut session,
        &req("breakpoint_set -i 4 -t line -f file:///srv/app/a.php -n 3 -h 5"),
        false,
    )
    .unwrap_err();
    assert!(matches!(err, Error::HitConditionUnsupported));
    assert_eq!(err.dbgp_code(), 201);
}

#[test]
fn breakpoint_remove_deletes_in_gdb() {
    let (mut session, log) = scripted_session(vec![done_bkpt("2"), done()]);

    dispatch(
        &mut session,
        &req("breakpoint_set -i 1 -t line -f file:///srv/app/a.php -n 7"),
        false,
    )
    .unwrap();
    let xml = dispatch(&mut session, &req("breakpoint_remove -i 2 -d 2"), false).unwrap();

    assert_eq!(commands(&log)[1], "break-delete 2");
    assert!(xml.contains("command=\"breakpoint_remove\""));
    assert!(xml.contains("transaction_id=\"2\""));
}

#[test]
fn breakpoint_update_toggles_state() {
    let (mut session, log) = scripted_session(vec![done_bkpt("2"), done(), done()]);

    dispatch(
        &mut session,
        &req("breakpoint_set -i 1 -t line -f file:///srv/app/a.php -n 7"),
        false,
    )
    .unwrap();
    dispatch(&mut session, &req("breakpoint_update -i 2 -d 2 -s disabled"), false).unwrap();
    dispatch(&mut session, &req("breakpoint_update -i 3 -d 2 -s enabled"), false).unwrap();

    let log = commands(&log);
    assert_eq!(log[1], "break-disable 2");
    assert_eq!(log[2], "break-enable 2");
}

#[test]
fn breakpoint_update_unsupported_fields_are_recoverable() {
    let (mut session, log) = scripted_session(vec![]);

    for raw in [
        "breakpoint_update -i 2 -d 2 -n 14 -s enabled",
        "breakpoint_update -i 3 -d 2 -h 5 -s enabled",
        "breakpoint_update -i 4 -d 2 -o >= -s enabled",
    ] {
        let err = dispatch(&mut session, &req(raw), false).unwrap_err();
        assert!(matches!(err, Error::UpdateUnsupported(_)));
        assert!(!err.is_fatal(), "the session must survive the rejection");
        assert_eq!(err.dbgp_code(), 201);

        // what the serving loop would send back instead of a result
        let xml = template::error("breakpoint_update", 2, err.dbgp_code(), &err.to_string());
        assert!(xml.contains("<error code=\"201\">"));
        assert!(xml.contains("breakpoint_update"));
    }

    assert!(commands(&log).is_empty(), "gdb is never consulted");
}

#[test]
fn run_forward_aligns_on_the_statement_after_a_hit() {
    let (mut session, log) = scripted_session(vec![
        done_bkpt("2"),              // breakpoint_set
        running_then_stop("2"),      // run: exec-continue, user hit
        done(),                      // break-disable 2
        done(),                      // break-enable 1
        running_then_stop("1"),      // master trip
        done(),                      // break-disable 1
        value_str("/srv/app/b.php"), // filename
        value_int(9),                // lineno
        done(),                      // break-enable 2
    ]);

    dispatch(
        &mut session,
        &req("breakpoint_set -i 1 -t line -f file:///srv/app/b.php -n 9"),
        false,
    )
    .unwrap();
    let xml = dispatch(&mut session, &req("run -i 2"), false).unwrap();

    assert_eq!(
        commands(&log)[1..],
        strs(&[
            "exec-continue",
            "break-disable 2",
            "break-enable 1",
            "exec-continue",
            "break-disable 1",
            "data-evaluate-expression filename",
            "data-evaluate-expression lineno",
            "break-enable 2",
        ])
    );
    assert!(xml.contains("command=\"run\""));
    assert!(xml.contains("filename=\"/srv/app/b.php\""));
    assert!(xml.contains("lineno=\"9\""));
}

#[test]
fn run_reverse_steps_off_the_line_then_realigns_forward() {
    let (mut session, log) = scripted_session(vec![
        done_bkpt("2"),              // breakpoint_set
        done(),                      // disable user bps before the backwards statement step
        done(),                      // break-enable 1
        running_then_stop("1"),      // exec-continue --reverse (master)
        done(),                      // break-disable 1
        done(),                      // re-enable user bps
        running_then_stop("2"),      // exec-continue --reverse, user hit
        done(),                      // break-disable 2
        value_int(1),                // level at the hit
        done_bkpt("3"),              // depth trap at level 1
        running_then_stop("3"),      // exec-continue --reverse
        done(),                      // break-delete 3
        done(),                      // break-enable 1
        running_then_stop("1"),      // forward master trip
        done(),                      // break-disable 1
        value_str("/srv/app/b.php"), // filename
        value_int(9),                // lineno
        done(),                      // break-enable 2
    ]);

    dispatch(
        &mut session,
        &req("breakpoint_set -i 1 -t line -f file:///srv/app/b.php -n 9"),
        false,
    )
    .unwrap();
    let xml = dispatch(&mut session, &req("run -i 2"), true).unwrap();

    assert_eq!(
        commands(&log)[1..],
        strs(&[
            "break-disable 2",
            "break-enable 1",
            "exec-continue --reverse",
            "break-disable 1",
            "break-enable 2",
            "exec-continue --reverse",
            "break-disable 2",
            "data-evaluate-expression level",
            "break-insert -f --source retrace_break.c --line 6",
            "exec-continue --reverse",
            "break-delete 3",
            "break-enable 1",
            "exec-continue",
            "break-disable 1",
            "data-evaluate-expression filename",
            "data-evaluate-expression lineno",
            "break-enable 2",
        ])
    );
    assert!(xml.contains("command=\"run\""));
    assert!(xml.contains("lineno=\"9\""));
}

#[test]
fn step_over_forward_traps_current_depth() {
    let (mut session, log) = scripted_session(vec![
        value_int(1),                // level
        done_bkpt("3"),              // depth trap at level 1
        running_then_stop("3"),      // exec-continue
        done(),                      // break-delete 3
        done(),                      // break-enable 1
        running_then_stop("1"),      // master trip
        done(),                      // break-disable 1
        value_str("/srv/app/a.php"), // filename
        value_int(5),                // lineno
    ]);

    let xml = dispatch(&mut session, &req("step_over -i 11"), false).unwrap();

    assert_eq!(
        commands(&log),
        strs(&[
            "data-evaluate-expression level",
            "break-insert -f --source retrace_break.c --line 6",
            "exec-continue",
            "break-delete 3",
            "break-enable 1",
            "exec-continue",
            "break-disable 1",
            "data-evaluate-expression filename",
            "data-evaluate-expression lineno",
        ])
    );
    assert!(xml.contains("command=\"step_over\""));
    assert!(xml.contains("lineno=\"5\""));
}

#[test]
fn step_out_forward_traps_caller_depth() {
    let (mut session, log) = scripted_session(vec![
        value_int(1),                // level
        done_bkpt("3"),              // depth trap at level 0
        running_then_stop("3"),
        done(),
        done(),
        running_then_stop("1"),
        done(),
        value_str("/srv/app/a.php"),
        value_int(6),
    ]);

    let xml = dispatch(&mut session, &req("step_out -i 12"), false).unwrap();

    // level 0 is the caller's slot in the depth table
    assert_eq!(
        commands(&log)[1],
        "break-insert -f --source retrace_break.c --line 5"
    );
    assert!(xml.contains("command=\"step_out\""));
}

#[test]
fn step_over_reverse_without_user_hit_finishes_the_boundary() {
    let (mut session, log) = scripted_session(vec![
        value_int(1),                // level
        done_bkpt("3"),              // depth trap
        running_then_stop("3"),      // exec-continue --reverse, trap fires
        running_then_stop("3"),      // second reverse continue to the boundary
        done(),                      // break-delete 3
        done(),                      // break-enable 1
        running_then_stop("1"),      // forward master trip
        done(),                      // break-disable 1
        value_str("/srv/app/a.php"),
        value_int(4),
    ]);

    let xml = dispatch(&mut session, &req("step_over -i 13"), true).unwrap();

    assert_eq!(
        commands(&log),
        strs(&[
            "data-evaluate-expression level",
            "break-insert -f --source retrace_break.c --line 6",
            "exec-continue --reverse",
            "exec-continue --reverse",
            "break-delete 3",
            "break-enable 1",
            "exec-continue",
            "break-disable 1",
            "data-evaluate-expression filename",
            "data-evaluate-expression lineno",
        ])
    );
    assert!(xml.contains("command=\"step_over\""));
}

#[test]
fn step_over_reverse_interrupted_by_user_breakpoint() {
    let (mut session, log) = scripted_session(vec![
        done_bkpt("2"),              // breakpoint_set at b.php:9
        value_int(2),                // level
        done_bkpt("3"),              // depth trap at level 2
        running_then_stop("2"),      // exec-continue --reverse, user hit first
        done(),                      // break-delete 3
        value_int(1),                // level observed at the hit
        done(),                      // break-disable 2
        done_bkpt("4"),              // new trap at the observed depth
        running_then_stop("4"),      // exec-continue --reverse
        done(),                      // break-delete 4
        done(),                      // break-enable 2
        done(),                      // break-enable 1
        running_then_stop("1"),      // forward master trip
        done(),                      // break-disable 1
        value_str("/srv/app/b.php"),
        value_int(9),
    ]);

    dispatch(
        &mut session,
        &req("breakpoint_set -i 1 -t line -f file:///srv/app/b.php -n 9"),
        false,
    )
    .unwrap();
    dispatch(&mut session, &req("step_over -i 2"), true).unwrap();

    assert_eq!(
        commands(&log)[1..],
        strs(&[
            "data-evaluate-expression level",
            "break-insert -f --source retrace_break.c --line 7",
            "exec-continue --reverse",
            "break-delete 3",
            "data-evaluate-expression level",
            "break-disable 2",
            "break-insert -f --source retrace_break.c --line 6",
            "exec-continue --reverse",
            "break-delete 4",
            "break-enable 2",
            "break-enable 1",
            "exec-continue",
            "break-disable 1",
            "data-evaluate-expression filename",
            "data-evaluate-expression lineno",
        ])
    );
}

#[test]
fn temporary_breakpoint_is_consumed_on_hit() {
    let (mut session, log) = scripted_session(vec![
        done_bkpt("2"),              // breakpoint_set -r 1
        running_then_stop("2"),      // run: temporary hit, consumed
        done(),                      // break-enable 1 (no user bps left to disable)
        running_then_stop("1"),
        done(),                      // break-disable 1
        value_str("/srv/app/a.php"),
        value_int(5),
        running_then_stop("2"),      // second run: the number is unknown now
    ]);

    dispatch(
        &mut session,
        &req("breakpoint_set -i 1 -t line -f file:///srv/app/a.php -n 5 -r 1"),
        false,
    )
    .unwrap();
    let xml = dispatch(&mut session, &req("run -i 2"), false).unwrap();
    assert!(xml.contains("lineno=\"5\""));

    // the registry no longer owns breakpoint 2, so its hit is not a user hit
    let err = dispatch(&mut session, &req("run -i 3"), false).unwrap_err();
    assert!(matches!(err, Error::TraceBoundary(_)));
    assert!(!err.is_fatal());

    let log = commands(&log);
    assert_eq!(log[0], "break-insert -t -f -c \"lineno == 5\" --source retrace_break.c --line 3");
    assert!(
        !log.contains(&"break-disable 2".to_string()),
        "a consumed temporary never shows up in enable/disable lists"
    );
}

#[test]
fn running_off_the_recording_is_a_recoverable_engine_error() {
    let (mut session, _) = scripted_session(vec![running_then_exit("exited-normally")]);

    let err = dispatch(&mut session, &req("run -i 1"), false).unwrap_err();

    assert!(matches!(err, Error::TraceBoundary(_)));
    assert!(!err.is_fatal());
    assert_eq!(err.dbgp_code(), 998);
    assert_eq!(session.status(), Status::Break);
    assert_eq!(session.reason(), Reason::Aborted);
}

#[test]
fn stack_get_is_answered_by_the_replayed_process() {
    let reply = r#"<response xmlns="urn:debugger_protocol_v1" command="stack_get" transaction_id="5"><stack where="main" level="0"/></response>"#;
    let (mut session, log) = scripted_session(vec![value_str(reply)]);

    let xml = dispatch(&mut session, &req("stack_get -i 5"), false).unwrap();

    assert_eq!(
        commands(&log),
        strs(&["data-evaluate-expression retrace_xdebug_cmd(\"stack_get -i 5\")"])
    );
    assert_eq!(xml, reply);
}

#[test]
fn eval_disables_breakpoints_around_the_diversion() {
    let reply = r#"<response command="eval" transaction_id="6"><property type="int"><![CDATA[3]]></property></response>"#;
    let (mut session, log) = scripted_session(vec![
        done_bkpt("2"), // breakpoint_set
        done(),         // break-disable (all)
        value_str(reply),
        done(),         // break-enable 2
    ]);

    dispatch(
        &mut session,
        &req("breakpoint_set -i 1 -t line -f file:///srv/app/a.php -n 7"),
        false,
    )
    .unwrap();
    let xml = dispatch(&mut session, &req("eval -i 6 -- ZXhwcg=="), false).unwrap();

    assert_eq!(
        commands(&log)[1..],
        strs(&[
            "break-disable",
            "data-evaluate-expression retrace_xdebug_cmd(\"eval -i 6 -- ZXhwcg==\")",
            "break-enable 2",
        ])
    );
    assert_eq!(xml, reply);
}

#[test]
fn property_set_always_fails_because_replay_is_read_only() {
    let (mut session, log) = scripted_session(vec![]);
    let xml = dispatch(&mut session, &req("property_set -i 8 -n x -- NDI="), false).unwrap();
    assert!(xml.contains("command=\"property_set\""));
    assert!(xml.contains("success=\"0\""));
    assert!(commands(&log).is_empty(), "the replayed process is never asked");
}

#[test]
fn std_fd_commands_are_unimplemented() {
    let (mut session, _) = scripted_session(vec![]);
    for fd in ["stdout", "stderr", "stdin"] {
        let xml = dispatch(&mut session, &req(&format!("{fd} -i 9 -c 1")), false).unwrap();
        assert!(xml.contains(&format!("command=\"{fd}\"")));
        assert!(xml.contains("success=\"0\""));
    }
}

#[test]
fn feature_set_and_get_round_trip() {
    let (mut session, _) = scripted_session(vec![]);

    let xml = dispatch(&mut session, &req("feature_set -i 1 -n max_children -v 100"), false).unwrap();
    assert!(xml.contains("feature=\"max_children\""));
    assert!(xml.contains("success=\"1\""));

    let xml = dispatch(&mut session, &req("feature_get -i 2 -n max_children"), false).unwrap();
    assert_eq!(xml, template::feature_get(2, "max_children", 1, "100"));

    // set-then-get returns exactly what was written, for both boolean values
    for flag in ["0", "1"] {
        let set = format!("feature_set -i 10 -n show_hidden -v {flag}");
        dispatch(&mut session, &req(&set), false).unwrap();
        let get = dispatch(&mut session, &req("feature_get -i 20 -n show_hidden"), false).unwrap();
        assert_eq!(get, template::feature_get(20, "show_hidden", 1, flag));
    }
}

#[test]
fn feature_get_unknown_is_unsupported() {
    let (mut session, _) = scripted_session(vec![]);
    let xml = dispatch(&mut session, &req("feature_get -i 2 -n quantum_entanglement"), false).unwrap();
    assert!(xml.contains("supported=\"0\""));
}

#[test]
fn feature_set_read_only_is_fatal() {
    let (mut session, _) = scripted_session(vec![]);
    let err = dispatch(&mut session, &req("feature_set -i 1 -n language_name -v Ruby"), false)
        .unwrap_err();
    assert!(matches!(err, Error::FeatureReadOnly(_)));
    assert!(err.is_fatal());
}

#[test]
fn unknown_command_is_fatal() {
    let (mut session, _) = scripted_session(vec![]);
    let err = dispatch(&mut session, &req("detach -i 1"), false).unwrap_err();
    assert!(matches!(err, Error::UnknownCommand(_)));
    assert!(err.is_fatal());
}

#[test]
fn sequence_numbers_must_increase() {
    let (mut session, _) = scripted_session(vec![]);
    session.accept_sequence(5).unwrap();
    session.accept_sequence(6).unwrap();
    let err = session.accept_sequence(6).unwrap_err();
    assert!(matches!(err, Error::StaleSequence(6)));
    assert!(err.is_fatal());
    let err = session.accept_sequence(2).unwrap_err();
    assert!(matches!(err, Error::StaleSequence(2)));
}

#[test]
fn recoverable_errors_render_as_dbgp_error_responses() {
    let xml = template::error("breakpoint_set", 4, 201, "breakpoint type `watch` is not supported");
    assert!(xml.contains("command=\"breakpoint_set\""));
    assert!(xml.contains("transaction_id=\"4\""));
    assert!(xml.contains("<error code=\"201\">"));
    assert!(xml.contains("<message>breakpoint type `watch` is not supported</message>"));
}

#[test]
fn sequence_feature_checks_follow_direction_latch() {
    // a flip of the shared flag between requests is observed by the next
    // request only
    let (session, _) = scripted_session(vec![]);
    let handle = session.direction_handle();
    assert!(!session.latched_direction());
    *handle.lock().unwrap() = true;
    assert!(session.latched_direction());
}
