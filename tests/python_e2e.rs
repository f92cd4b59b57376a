//! End-to-end tests against a real Python interpreter.
//!
//! These exercise the bundled companion script and therefore need a
//! `python3` on `PATH`; they are ignored by default. Run them with
//! `cargo test -- --ignored`.

#![cfg(unix)]

use std::net::TcpListener;

use serde_json::json;

use pysock::config::SessionConfig;
use pysock::session::{Session, SessionError};
use pysock::wire::WireError;

/// Pick a port that was free a moment ago.
fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn python_session() -> Session {
    let config = SessionConfig {
        host: "127.0.0.1".to_string(),
        timeout_secs: 10,
        ..SessionConfig::new(free_port())
    };
    Session::new(config).unwrap()
}

#[test]
#[ignore = "requires python3 on PATH"]
fn set_then_get_round_trips_json_values() {
    let mut session = python_session();
    session.start().unwrap();
    assert!(session.version().is_some());

    let values = [
        json!(42),
        json!(1.5),
        json!("text with \"quotes\" and \\ backslashes"),
        json!(true),
        json!(null),
        json!([1, "two", [3, null]]),
        json!({"nested": {"k": [1, 2]}, "empty": {}}),
    ];
    for (i, value) in values.iter().enumerate() {
        let name = format!("v{i}");
        session.set([(name.as_str(), value)]).unwrap();
        assert_eq!(&session.get(&name).unwrap(), value, "value {i}");
    }

    session.stop().unwrap();
}

#[test]
#[ignore = "requires python3 on PATH"]
fn exec_output_and_namespace_persist_across_connections() {
    let mut session = python_session();
    session.start().unwrap();

    // Each call is a separate connection; the namespace must survive.
    session.exec("total = 0").unwrap();
    session.exec("total += 40\ntotal += 2").unwrap();
    let output = session.exec("print(total)").unwrap();
    assert_eq!(output, vec!["42".to_string()]);
    assert_eq!(session.get("total").unwrap(), json!(42));

    session.stop().unwrap();
}

#[test]
#[ignore = "requires python3 on PATH"]
fn remote_exception_carries_traceback() {
    let mut session = python_session();
    session.start().unwrap();

    let result = session.exec("print('partial')\nundefined_name");
    match result {
        Err(SessionError::Wire(WireError::Remote(detail))) => {
            assert!(detail.contains("NameError"), "detail: {detail}");
            assert!(detail.contains("undefined_name"), "detail: {detail}");
        }
        other => panic!("expected remote error, got {other:?}"),
    }
    // The failed request did not kill the companion.
    assert_eq!(session.exec("print(1)").unwrap(), vec!["1".to_string()]);

    session.stop().unwrap();
}

#[test]
#[ignore = "requires python3 on PATH"]
fn code_containing_quit_does_not_stop_the_server() {
    let mut session = python_session();
    session.start().unwrap();

    // Only the exact request "quit" shuts the companion down.
    let output = session.exec("msg = 'quit'\nprint(msg)").unwrap();
    assert_eq!(output, vec!["quit".to_string()]);
    assert!(session.is_running());
    assert_eq!(session.exec("print(2)").unwrap(), vec!["2".to_string()]);

    session.stop().unwrap();
    assert!(!session.is_running());
}

#[test]
#[ignore = "requires python3 on PATH"]
fn json_hooks_accept_singledispatch_registration() {
    let mut session = python_session();
    session.start().unwrap();

    // Register a serializer for a type JSON does not know about.
    session
        .exec(concat!(
            "import json\n",
            "class Point:\n",
            "    def __init__(self, x, y):\n",
            "        self.x = x\n",
            "        self.y = y\n",
            "@PYSOCK_JSON_DUMPS.register(Point)\n",
            "def _(p):\n",
            "    return json.dumps({\"x\": p.x, \"y\": p.y})\n",
            "p = Point(1, 2)\n",
        ))
        .unwrap();

    assert_eq!(session.get("p").unwrap(), json!({"x": 1, "y": 2}));

    session.stop().unwrap();
}
