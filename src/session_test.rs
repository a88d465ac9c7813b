use super::*;
use crate::runtime::test_helpers::{DEBUG_TARGET, MemoryTransport, Observed, PROD_TARGET, RecordingObserver};
use crate::script::Host;
use serde_json::json;

fn session(target: &str) -> (Session, std::sync::Arc<MemoryTransport>, RecordingObserver) {
    let transport = MemoryTransport::new(target);
    let observer = RecordingObserver::default();
    let session = Session::new(Link::new(transport.clone()), Box::new(observer.clone()));
    (session, transport, observer)
}

#[test]
fn send_encodes_envelope() {
    let (session, transport, _) = session(PROD_TARGET);
    session.send("status", Some(json!({"ok": true})));
    assert_eq!(transport.frames(), vec![r#"{"t":"status","d":{"ok":true}}"#.to_owned()]);
}

#[test]
fn send_while_unready_is_silent() {
    let (session, transport, observer) = session(PROD_TARGET);
    transport.set_ready(false);

    session.send("status", Some(json!(1)));

    assert!(transport.frames().is_empty());
    assert!(observer.events().is_empty());
}

#[test]
fn encode_failure_in_production_is_shipped_on_fault_topic() {
    let (session, transport, observer) = session(PROD_TARGET);

    session.send("*", None);

    let faults = transport.sent_on("e");
    assert_eq!(faults.len(), 1);
    let trace = faults[0].payload.as_ref().and_then(Value::as_str).unwrap_or_default();
    assert!(trace.starts_with("EncodeFailure"), "{trace}");
    assert!(observer.events().is_empty());
}

#[test]
fn encode_failure_in_debug_is_raised_locally() {
    let (session, transport, observer) = session(DEBUG_TARGET);

    session.send("", Some(json!(1)));

    assert!(transport.frames().is_empty());
    assert_eq!(observer.raised().len(), 1);
}

#[test]
fn log_always_reports_and_mirrors_only_when_local() {
    let (session, transport, observer) = session(PROD_TARGET);

    session.log(json!("quiet"), false);
    session.log(json!("loud"), true);

    let reports: Vec<_> = transport.sent_on("r").into_iter().map(|e| e.payload).collect();
    assert_eq!(reports, vec![Some(json!("quiet")), Some(json!("loud"))]);
    assert_eq!(observer.events(), vec![Observed::Log(json!("loud"))]);
}

#[test]
fn request_module_sends_name_and_params() {
    let (session, transport, _) = session(PROD_TARGET);

    session.request_module("geo", Some(json!({"precise": true})));
    session.request_module("clock", None);

    let requests: Vec<_> = transport.sent_on("module").into_iter().map(|e| e.payload).collect();
    assert_eq!(
        requests,
        vec![Some(json!({"name": "geo", "params": {"precise": true}})), Some(json!({"name": "clock"}))]
    );
}

#[test]
fn debug_and_info_follow_target() {
    let (debug, _, _) = session(DEBUG_TARGET);
    let (prod, _, _) = session(PROD_TARGET);

    assert!(debug.debug());
    assert!(!prod.debug());
    assert_eq!(prod.info().project.as_deref(), Some("project"));
    assert_eq!(prod.info().user_agent.as_deref(), Some("tether/test"));
}

#[test]
fn builtins_route_to_session() {
    let (mut session, transport, _) = session(PROD_TARGET);

    session.call("send", vec![json!("a"), json!(1)]).unwrap();
    session.call("module", vec![json!("geo")]).unwrap();
    let stamp = session.call("ping", vec![]).unwrap();
    let debug = session.call("debug", vec![]).unwrap();
    let info = session.call("info", vec![]).unwrap();

    let topics: Vec<_> = transport.envelopes().into_iter().map(|e| e.topic).collect();
    assert_eq!(topics, vec!["a", "module", "ping"]);
    assert!(stamp.as_i64().is_some_and(|ms| ms > 0));
    assert_eq!(debug, json!(false));
    assert_eq!(info["user-agent"], json!("tether/test"));
}

#[test]
fn builtins_check_arity_and_names() {
    let (mut session, _, _) = session(PROD_TARGET);

    assert!(matches!(session.call("send", vec![]), Err(ScriptError::Arity { .. })));
    assert!(matches!(session.call("ping", vec![json!(1)]), Err(ScriptError::Arity { .. })));
    assert_eq!(session.call("fetch", vec![]), Err(ScriptError::UnknownFunction("fetch".into())));
}

#[test]
fn timestamps_are_positive_and_monotone_enough() {
    let first = timestamp_ms();
    std::thread::sleep(std::time::Duration::from_millis(2));
    assert!(timestamp_ms() > first);
}

#[test]
fn encode_failure_while_unready_is_still_raised_in_debug() {
    let (session, transport, observer) = session(DEBUG_TARGET);
    transport.set_ready(false);

    session.send("*", Some(json!(1)));

    assert!(transport.frames().is_empty());
    let raised = observer.raised();
    assert_eq!(raised.len(), 1);
    assert!(raised[0].starts_with("EncodeFailure"), "{}", raised[0]);
}
