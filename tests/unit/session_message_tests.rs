//! Session envelope parsing and reply shapes.

use afd_webui::session::message::parse_error_reply;
use afd_webui::session::{MessageClass, SessionMessage};
use afd_webui::AppError;

#[test]
fn full_envelope_parses() {
    let msg = SessionMessage::parse(
        r#"{"user":"op","class":"log","action":"list","context":"system",
            "filter":{"file":"0","level":"I|W"}}"#,
    )
    .expect("parse");
    assert_eq!(msg.class, MessageClass::Log);
    assert_eq!(msg.action(), "list");
    assert_eq!(msg.context(), "system");
    assert_eq!(msg.command(), "");
    assert_eq!(msg.filter_object()["level"], "I|W");
}

#[test]
fn missing_class_is_rejected() {
    let err = SessionMessage::parse(r#"{"action":"start"}"#).expect_err("no class");
    assert!(matches!(err, AppError::Protocol(_)));
    assert_eq!(parse_error_reply(&err)["status"], 406);
}

#[test]
fn non_object_filter_reads_as_empty() {
    let msg = SessionMessage::parse(r#"{"class":"log","filter":[{"jid":"1"}]}"#).expect("parse");
    assert!(msg.filter_object().is_empty());
}

#[test]
fn with_status_echoes_the_request() {
    let msg = SessionMessage::parse(r#"{"class":"alias","action":"retry","alias":["h1","h2"]}"#)
        .expect("parse");
    let reply = msg.with_status(500);
    assert_eq!(reply["class"], "alias");
    assert_eq!(reply["action"], "retry");
    assert_eq!(reply["alias"], serde_json::json!(["h1", "h2"]));
    assert_eq!(reply["status"], 500);
    assert!(reply.get("command").is_none());
}

#[test]
fn error_reply_mirrors_aliases_and_message() {
    let msg = SessionMessage::parse(r#"{"class":"alias","action":"info","command":"save","alias":"h1"}"#)
        .expect("parse");
    let reply = msg.error_reply(&AppError::PathViolation("INFO-h1".into()));
    assert_eq!(reply["alias"], serde_json::json!(["h1"]));
    assert_eq!(reply["status"], 500);
    assert_eq!(reply["message"], "path violation: INFO-h1");
}
