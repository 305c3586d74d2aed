use script_debugger::callframe::{CallStack, FrameFlags};
use script_debugger::emergency::{self, EmergencyFlags};
use script_debugger::interactive::{InteractiveLoopCoordinator, ScriptedHost};
use script_debugger::interp::{ContextFlags, InterpreterFlags, WaitFlags};
use script_debugger::secure::{secure_eval, SecureEvalOptions};
use script_debugger::{DebugError, DebuggerConfig, Interpreter};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

// Short timeouts so contention tests fail fast
fn test_config() -> Arc<DebuggerConfig> {
    Arc::new(DebuggerConfig {
        lock_timeout_ms: 50,
        lock_retries: 2,
        loop_timeout_ms: 50,
        loop_retries: 4,
        loop_retry_sleep_ms: 5,
        ..DebuggerConfig::default()
    })
}

fn interp() -> Interpreter {
    Interpreter::new("test", test_config())
}

fn eval(interp: &mut Interpreter, script: &str) -> String {
    interp
        .eval(script)
        .unwrap_or_else(|e| panic!("script failed: {}\n{}", e, script))
}

#[cfg(test)]
mod callframe_tests {
    use super::*;

    fn stack_with_scopes(n: usize) -> CallStack {
        let mut stack = CallStack::new();
        for i in 0..n {
            stack.push_scope_frame(&format!("scope{}", i));
        }
        stack
    }

    #[test]
    fn test_uplevel_resolves_every_valid_level() {
        let stack = stack_with_scopes(3);
        assert_eq!(stack.level(), 3);

        for l in 0..=3usize {
            let relative = stack.resolve_uplevel_target(&l.to_string()).unwrap();
            assert_eq!(relative.target, 3 - l, "relative level {}", l);
            assert_eq!(relative.current, 3);
            assert!(!relative.absolute);
            assert_eq!(relative.marked, l != 0);

            let absolute = stack.resolve_uplevel_target(&format!("#{}", l)).unwrap();
            assert_eq!(absolute.target, l, "absolute level #{}", l);
            assert!(absolute.absolute);
        }
    }

    #[test]
    fn test_uplevel_rejects_levels_outside_stack() {
        let stack = stack_with_scopes(2);
        for spec in ["3", "#3", "-1", "x", "#", ""] {
            let err = stack.resolve_uplevel_target(spec).unwrap_err();
            assert!(matches!(err, DebugError::InvalidLevel(_)), "spec {:?}", spec);
        }
    }

    #[test]
    fn test_tracking_frames_are_not_levels() {
        let mut stack = stack_with_scopes(1);
        stack.push_tracking_frame("marker", FrameFlags::DEBUGGER);
        assert_eq!(stack.level(), 1);
        let target = stack.resolve_uplevel_target("1").unwrap();
        assert_eq!(target.target, 0);
    }

    #[test]
    fn test_pop_unwinds_orphaned_scopes() {
        let mut stack = stack_with_scopes(1);
        let before = stack.depth();

        let handle = stack.push_tracking_frame("span", FrameFlags::NONE);
        stack.push_scope_frame("left open");
        stack.push_scope_frame("also left open");

        assert_eq!(stack.pop_scope_frames_and_one_more(handle).unwrap(), 3);
        assert_eq!(stack.depth(), before);
    }

    #[test]
    fn test_nested_spans_balance_even_on_error() {
        let mut interp = interp();
        let before = interp.stack().depth();

        let outcome: Result<(), DebugError> =
            interp.with_tracking_frame("outer", FrameFlags::NONE, |interp| {
                interp.stack_mut().push_scope_frame("orphan");
                interp.with_tracking_frame("inner", FrameFlags::NONE, |interp| {
                    interp.stack_mut().push_scope_frame("orphan too");
                    Err(DebugError::script("inner failure"))
                })
            });

        assert!(outcome.is_err());
        assert_eq!(interp.stack().depth(), before);
        assert!(interp.complaints().is_empty());
    }

    #[test]
    fn test_unmark_reports_missing_frames_but_clears_the_rest() {
        let mut stack = stack_with_scopes(3);
        let mark = stack.mark_frames(0, FrameFlags::INVISIBLE).unwrap();
        assert_eq!(mark.len(), 3);
        assert_eq!(stack.current_index(), 0);

        stack.pop_scope().unwrap();
        assert!(stack.unmark_frames(mark).is_err());
        assert_eq!(stack.current_index(), 2);
        assert!(stack
            .frames()
            .iter()
            .all(|f| !f.flags.has(FrameFlags::INVISIBLE)));
    }

    #[test]
    fn test_invoke_runs_in_caller_scope() {
        let mut interp = interp();
        eval(&mut interp, "set x global\nscope open\nset x inner");

        assert_eq!(eval(&mut interp, "debug invoke 1 set x"), "global");
        assert_eq!(eval(&mut interp, "set x"), "inner");

        eval(&mut interp, "debug invoke #0 set y 5");
        assert_eq!(eval(&mut interp, "info exists y"), "0");
        eval(&mut interp, "scope close");
        assert_eq!(eval(&mut interp, "set y"), "5");
    }

    #[test]
    fn test_invoke_bad_level() {
        let mut interp = interp();
        let err = interp.eval("debug invoke 5 set x 1").unwrap_err();
        assert!(matches!(err, DebugError::InvalidLevel(_)));
        assert_eq!(interp.stack().depth(), 1);
    }
}

#[cfg(test)]
mod debugger_tests {
    use super::*;

    fn with_debugger() -> Interpreter {
        let mut interp = interp();
        eval(&mut interp, "debug setup");
        interp
    }

    #[test]
    fn test_breakpoint_idempotence() {
        let mut interp = with_debugger();
        assert_eq!(eval(&mut interp, "debug breakpoint set foo.tcl 10"), "0");
        assert_eq!(eval(&mut interp, "debug breakpoint set foo.tcl 10 10"), "1");
        assert_eq!(eval(&mut interp, "debug breakpoint match foo.tcl 10 10"), "1");
        assert_eq!(eval(&mut interp, "debug breakpoint match foo.tcl 10 11"), "0");

        assert_eq!(eval(&mut interp, "debug breakpoint clear foo.tcl 10 10"), "1");
        assert_eq!(eval(&mut interp, "debug breakpoint clear foo.tcl 10 10"), "0");
        assert_eq!(eval(&mut interp, "debug breakpoint clear bar.tcl 1 2"), "0");
        assert_eq!(eval(&mut interp, "debug breakpoint match foo.tcl 10 10"), "0");
    }

    #[test]
    fn test_breakpoint_bad_location() {
        let mut interp = with_debugger();
        let err = interp.eval("debug breakpoint set foo.tcl 0").unwrap_err();
        assert!(matches!(err, DebugError::InvalidLocation(_)));
        let err = interp.eval("debug breakpoint set foo.tcl ten").unwrap_err();
        assert!(matches!(err, DebugError::InvalidLocation(_)));
    }

    #[test]
    fn test_breakpoints_listing() {
        let mut interp = with_debugger();
        eval(&mut interp, "debug breakpoint set foo.tcl 10 12");
        eval(&mut interp, "debug breakpoint set bar.tcl 3");
        assert_eq!(eval(&mut interp, "debug breakpoints"), "bar.tcl:3-3 foo.tcl:10-12");
        assert_eq!(eval(&mut interp, "debug breakpoints foo*"), "foo.tcl:10-12");
    }

    #[test]
    fn test_debugger_required() {
        let mut interp = interp();
        let err = interp.eval("debug token true").unwrap_err();
        assert!(matches!(err, DebugError::DebuggerUnavailable(_)));
    }

    #[test]
    fn test_types_partial_updates() {
        let mut interp = with_debugger();
        assert_eq!(eval(&mut interp, "debug types"), "Demand");
        assert_eq!(eval(&mut interp, "debug types +Error +Token"), "Demand Error Token");
        assert_eq!(eval(&mut interp, "debug types -Demand"), "Error Token");
        assert_eq!(eval(&mut interp, "debug types {Execute Return}"), "Execute Return");
        assert!(interp.eval("debug types +Bogus").is_err());
        assert_eq!(eval(&mut interp, "debug types"), "Execute Return");
    }

    #[test]
    fn test_steps_require_interactive() {
        let mut interp = with_debugger();
        let err = interp.eval("debug steps 5").unwrap_err();
        assert!(matches!(err, DebugError::NotInteractive(_)));
        let err = interp.eval("debug step true").unwrap_err();
        assert!(matches!(err, DebugError::NotInteractive(_)));
        assert_eq!(eval(&mut interp, "debug steps"), "0");
    }

    #[test]
    fn test_suspend_resume_nesting() {
        let mut interp = with_debugger();
        eval(&mut interp, "debug types +Error");
        assert_eq!(eval(&mut interp, "debug suspend"), "1");
        assert_eq!(eval(&mut interp, "debug enable"), "0");

        // a suspended debugger reads as disabled
        let err = interp.eval("debug suspend").unwrap_err();
        assert!(matches!(err, DebugError::DebuggerUnavailable(_)));

        assert_eq!(eval(&mut interp, "debug resume"), "0");
        assert_eq!(eval(&mut interp, "debug types"), "Demand Error");
        assert!(interp.eval("debug resume").is_err());
    }

    #[test]
    fn test_run_resumes_even_on_error() {
        let mut interp = with_debugger();
        let err = interp.eval("debug run {error inside}").unwrap_err();
        assert_eq!(err.to_string(), "inside");
        assert_eq!(interp.debugger().unwrap().suspend_count(), 0);
        assert_eq!(eval(&mut interp, "debug enable"), "1");
    }

    #[test]
    fn test_queue_and_mailbox() {
        let mut interp = with_debugger();
        eval(&mut interp, "debug iqueue {set a 1}");
        eval(&mut interp, "debug iqueue {set b 2}");
        assert_eq!(eval(&mut interp, "debug iqueue -dump"), "{set a 1} {set b 2}");
        assert_eq!(eval(&mut interp, "debug iqueue -dump -clear"), "{set a 1} {set b 2}");
        assert_eq!(eval(&mut interp, "debug iqueue -dump"), "");

        eval(&mut interp, "debug icommand {puts hi}");
        assert_eq!(eval(&mut interp, "debug icommand"), "puts hi");
        eval(&mut interp, "debug iresult 42");
        assert_eq!(eval(&mut interp, "debug iresult"), "42");
    }

    #[test]
    fn test_info_is_json() {
        let mut interp = with_debugger();
        eval(&mut interp, "debug breakpoint set foo.tcl 1");
        let info: serde_json::Value = serde_json::from_str(&eval(&mut interp, "debug info")).unwrap();
        assert_eq!(info["enabled"], true);
        assert_eq!(info["breakpoints"], 1);
        assert_eq!(info["types"], serde_json::json!(["Demand"]));
    }

    #[test]
    fn test_restore_resets_state() {
        let mut interp = with_debugger();
        eval(&mut interp, "debug types +Error");
        eval(&mut interp, "debug suspend");
        eval(&mut interp, "debug restore");
        assert_eq!(interp.debugger().unwrap().suspend_count(), 0);
        assert_eq!(eval(&mut interp, "debug types"), "Demand");
    }

    #[test]
    fn test_break_without_debugger_passes_through() {
        let mut interp = interp();
        assert_eq!(eval(&mut interp, "debug break"), "");
    }

    #[test]
    fn test_break_not_interactive() {
        let mut interp = with_debugger();
        let err = interp.eval("debug break").unwrap_err();
        assert!(matches!(err, DebugError::NotInteractive(_)));
        assert_eq!(eval(&mut interp, "debug break -noerror"), "");
    }
}

#[cfg(test)]
mod secure_eval_tests {
    use super::*;

    fn parent_with_child(safe: bool) -> Interpreter {
        let mut parent = interp();
        let flag = if safe { "-safe " } else { "" };
        eval(&mut parent, &format!("interp create {}child", flag));
        parent
    }

    #[derive(Debug, PartialEq)]
    struct Snapshot {
        events: bool,
        wait: WaitFlags,
        flags: InterpreterFlags,
        context: ContextFlags,
    }

    fn snapshot(parent: &Interpreter) -> Snapshot {
        let handle = parent.child("child").unwrap();
        let child = handle.lock();
        Snapshot {
            events: child.events_enabled(),
            wait: child.wait_flags(),
            flags: child.flags(),
            context: child.context_flags(),
        }
    }

    #[test]
    fn test_trusted_eval_in_safe_child() {
        let mut parent = parent_with_child(true);
        let before = snapshot(&parent);

        let result = eval(
            &mut parent,
            "debug secureeval -trusted true child {puts hello\nset x 1}",
        );
        assert_eq!(result, "1");

        assert_eq!(snapshot(&parent), before);
        let handle = parent.child("child").unwrap();
        let child = handle.lock();
        assert!(child.is_safe());
        assert!(!child.is_trusted());
        assert_eq!(child.get_var("x"), Some("1"));
        assert_eq!(child.output(), "hello\n");
    }

    #[test]
    fn test_untrusted_eval_cannot_see_hidden_commands() {
        let mut parent = parent_with_child(true);
        let err = parent
            .eval("debug secureeval child {puts hello}")
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid command name \"puts\"");
    }

    #[test]
    fn test_restoration_for_every_combination() {
        for safe in [false, true] {
            for events in [false, true] {
                for stop_on_error in [false, true] {
                    for trusted in [false, true] {
                        for script in ["set ok 1", "error failed"] {
                            let mut parent = parent_with_child(safe);
                            {
                                let handle = parent.child("child").unwrap();
                                let mut child = handle.lock();
                                child.set_events_enabled(!events);
                            }
                            let before = snapshot(&parent);
                            let options = SecureEvalOptions {
                                trusted,
                                events,
                                stop_on_error,
                                ..SecureEvalOptions::default()
                            };
                            let outcome = secure_eval(&mut parent, "child", script, &options);
                            assert_eq!(outcome.is_ok(), script.starts_with("set"));
                            assert_eq!(
                                snapshot(&parent),
                                before,
                                "safe={} events={} stop={} trusted={} script={}",
                                safe,
                                events,
                                stop_on_error,
                                trusted,
                                script
                            );
                            assert!(parent.complaints().is_empty());
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_events_suppressed_unless_requested() {
        let mut parent = parent_with_child(false);
        eval(&mut parent, "interp eval child {after idle set fired 1}");

        eval(&mut parent, "debug secureeval child update");
        assert_eq!(eval(&mut parent, "interp eval child {info exists fired}"), "0");

        eval(&mut parent, "debug secureeval -events true child update");
        assert_eq!(eval(&mut parent, "interp eval child {set fired}"), "1");
    }

    #[test]
    fn test_error_info_copied_into_parent() {
        let mut parent = parent_with_child(false);
        let err = parent
            .eval("debug secureeval child {set a 1\nerror boom}")
            .unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert!(
            parent.error_info().contains("(in interpreter \"child\" line 2)"),
            "error info: {}",
            parent.error_info()
        );
    }

    #[test]
    fn test_timeout_cancels_and_nocancel_resets() {
        let mut parent = parent_with_child(false);

        let err = parent
            .eval("debug secureeval -timeout 50 -nocancel child {sleep 5000}")
            .unwrap_err();
        assert!(err.is_canceled(), "unexpected error: {}", err);
        assert!(
            parent.error_info().ends_with("(canceled in interpreter \"child\")"),
            "error info: {}",
            parent.error_info()
        );
        assert!(parent.error_info().starts_with(&err.to_string()));
        assert_eq!(eval(&mut parent, "interp eval child {set after 1}"), "1");

        let err = parent
            .eval("debug secureeval -timeout 50 child {sleep 5000}")
            .unwrap_err();
        assert!(err.is_canceled());
        // without -nocancel the unwinding cancel stays pending
        let err = parent.eval("interp eval child {set again 1}").unwrap_err();
        assert!(err.is_canceled());
    }

    #[test]
    fn test_file_eval() {
        let mut parent = parent_with_child(false);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "set a 2").unwrap();
        writeln!(file, "incr a 3").unwrap();

        let options = SecureEvalOptions {
            file: true,
            ..SecureEvalOptions::default()
        };
        let path = file.path().to_string_lossy().into_owned();
        assert_eq!(secure_eval(&mut parent, "child", &path, &options).unwrap(), "5");
    }

    #[test]
    fn test_missing_child() {
        let mut parent = interp();
        let err = parent.eval("debug secureeval nobody {set a 1}").unwrap_err();
        assert!(matches!(err, DebugError::InvalidConnection(_)));
    }

    #[test]
    fn test_locked_child_is_unavailable() {
        let mut parent = parent_with_child(false);
        let handle = parent.child("child").unwrap();

        let holder = {
            let handle = Arc::clone(&handle);
            std::thread::spawn(move || {
                let _guard = handle.lock();
                std::thread::sleep(Duration::from_millis(400));
            })
        };
        std::thread::sleep(Duration::from_millis(50));

        let err = parent.eval("debug secureeval child {set a 1}").unwrap_err();
        assert!(err.is_retryable());
        holder.join().unwrap();
        assert_eq!(eval(&mut parent, "debug secureeval child {set a 1}"), "1");
    }
}

#[cfg(test)]
mod emergency_tests {
    use super::*;

    fn flags(text: &str) -> EmergencyFlags {
        text.parse().unwrap()
    }

    #[test]
    fn test_emergency_is_idempotent() {
        let mut interp = interp();
        let bundle = flags("Enabled Created Tokens ScriptArguments");

        let first = emergency::apply(&mut interp, bundle).unwrap();
        assert!(first.changes > 0);
        assert!(first.lines.iter().any(|l| l.starts_with("debugger: absent -> created")));
        assert!(interp.is_interactive());
        assert!(interp.has_flag(InterpreterFlags::TRACK_SCRIPT_ARGUMENTS));
        assert!(interp.debugger().unwrap().break_on_token());

        let second = emergency::apply(&mut interp, bundle).unwrap();
        assert_eq!(second.changes, 0);
        assert!(second.lines.is_empty());

        let verbose = emergency::apply(&mut interp, bundle | EmergencyFlags::VERBOSE).unwrap();
        assert_eq!(verbose.changes, 0);
        assert!(!verbose.lines.is_empty());
        assert!(verbose.lines.iter().all(|l| !l.contains("->")));
    }

    #[test]
    fn test_emergency_disable_then_dispose() {
        let mut interp = interp();
        emergency::apply(&mut interp, flags("Enabled Created")).unwrap();

        let report = emergency::apply(&mut interp, flags("Disabled")).unwrap();
        assert!(report.changes > 0);
        assert!(!interp.debugger().unwrap().is_enabled());
        assert!(!interp.is_interactive());

        let report = emergency::apply(&mut interp, flags("Disposed")).unwrap();
        assert_eq!(report.changes, 1);
        assert!(interp.debugger().is_none());
    }

    #[test]
    fn test_emergency_report_only() {
        let mut interp = interp();
        let report = emergency::apply(&mut interp, flags("Verbose")).unwrap();
        assert_eq!(report.changes, 0);
        assert!(report.lines.iter().any(|l| l == "debugger: absent"));
        assert!(interp.debugger().is_none());
    }

    #[test]
    fn test_emergency_respects_interactive_lock() {
        let mut interp = interp();
        interp.set_interactive_modifiable(false);

        emergency::apply(&mut interp, flags("Enabled Created")).unwrap();
        assert!(!interp.is_interactive());

        emergency::apply(&mut interp, flags("Enabled IgnoreModifiable")).unwrap();
        assert!(interp.is_interactive());
    }

    #[test]
    fn test_emergency_lock_unavailable_changes_nothing() {
        let mut interp = interp();
        let root = interp.sync_root();
        let _held = root.lock();

        let err = emergency::emergency(&mut interp, flags("Enabled Created")).unwrap_err();
        assert!(matches!(err, DebugError::LockUnavailable(_)));
        assert!(interp.debugger().is_none());
        assert!(!interp.is_interactive());
    }

    #[test]
    fn test_emergency_inside_locked_child() {
        let mut parent = interp();
        eval(&mut parent, "interp create child");

        // the child's handle lock is held by `interp eval` for the whole call
        let report = eval(&mut parent, "interp eval child {debug emergency {Enabled Created}}");
        assert!(report.contains("debugger: absent -> created"), "{}", report);

        let handle = parent.child("child").unwrap();
        assert!(handle.lock().debugger().is_some());
        assert!(parent.debugger().is_none());
    }

    #[test]
    fn test_emergency_conflicting_flags() {
        let mut interp = interp();
        assert!(emergency::apply(&mut interp, flags("Enabled Disabled")).is_err());
        assert!(emergency::apply(&mut interp, flags("Created Disposed")).is_err());
    }

    #[test]
    fn test_emergency_break_writes_report_first() {
        let host = ScriptedHost::new(["set z 5", "#go"]);
        let mut interp = Interpreter::interactive("test", test_config(), Box::new(host.clone()));
        interp.set_coordinator(Some(InteractiveLoopCoordinator::new("emergency", &test_config())));

        eval(&mut interp, "debug emergency {Enabled Created Break}");

        let output = host.output();
        let report_at = output.find("debugger: absent -> created").unwrap();
        let break_at = output.find("debugger: Demand break").unwrap();
        assert!(report_at < break_at, "output: {}", output);
        assert_eq!(eval(&mut interp, "set z"), "5");
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn test_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"lock_retries": 7, "default_types": ["Demand", "Error"]}}"#).unwrap();

        let config = DebuggerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.lock_retries, 7);
        assert_eq!(config.lock_timeout_ms, DebuggerConfig::default().lock_timeout_ms);

        let mut interp = Interpreter::new("cfg", Arc::new(config));
        eval(&mut interp, "debug setup");
        assert_eq!(eval(&mut interp, "debug types"), "Demand Error");
    }

    #[test]
    fn test_bad_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(DebuggerConfig::from_file(file.path()).is_err());
    }
}

#[cfg(test)]
mod command_tests {
    use super::*;

    #[test]
    fn test_incr() {
        let mut interp = interp();
        assert_eq!(eval(&mut interp, "incr n"), "1");
        assert_eq!(eval(&mut interp, "incr n 41"), "42");
        assert_eq!(eval(&mut interp, "incr n -50"), "-8");
        assert!(interp.eval("incr n abc").is_err());
    }

    #[test]
    fn test_incr_overflow_is_an_error() {
        let mut interp = interp();
        eval(&mut interp, "set x 9223372036854775807");

        let err = interp.eval("incr x").unwrap_err();
        assert!(err.to_string().contains("integer overflow"), "{}", err);
        assert_eq!(eval(&mut interp, "set x"), "9223372036854775807");

        eval(&mut interp, "set y -9223372036854775808");
        assert!(interp.eval("incr y -1").is_err());
    }
}
