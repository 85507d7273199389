//! Message routing on the ctrl and log endpoints with mock collaborators.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;

use afd_webui::session::dispatch::dispatch;
use afd_webui::session::{AppState, ChannelClass};

use super::test_helpers::{
    as_source, assert_silent, next_json, open_channel, test_state, work_dir, CountingSource,
    HOST_CONFIG,
};

const QUIET: Duration = Duration::from_millis(300);

fn fixture(host_config: Option<&str>) -> (TempDir, Arc<AppState>) {
    let dir = work_dir(host_config);
    let state = test_state(&dir, as_source(&Arc::new(CountingSource::default())));
    (dir, state)
}

async fn wait_for_file(path: &Path, needle: &str) -> String {
    for _ in 0..250 {
        if let Ok(text) = std::fs::read_to_string(path) {
            if text.contains(needle) {
                return text;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("{} never contained {needle}", path.display());
}

// ── Envelope ────────────────────────────────────────────────

#[tokio::test]
async fn unparseable_frame_is_not_acceptable() {
    let (_dir, state) = fixture(Some(HOST_CONFIG));
    let (channel, mut rx) = open_channel(ChannelClass::Ctrl);

    dispatch(&state, &channel, "{not json");
    assert_eq!(next_json(&mut rx).await["status"], 406);
}

#[tokio::test]
async fn unknown_class_is_ignored() {
    let (_dir, state) = fixture(Some(HOST_CONFIG));
    let (channel, mut rx) = open_channel(ChannelClass::Ctrl);

    dispatch(&state, &channel, r#"{"class":"weather","action":"read"}"#);
    dispatch(&state, &channel, r#"{"class":"afd","action":"nope","command":"x"}"#);
    assert_silent(&mut rx, QUIET).await;
}

// ── fsa ─────────────────────────────────────────────────────

#[tokio::test]
async fn fsa_start_and_stop_manage_the_subscription() {
    let (_dir, state) = fixture(Some(HOST_CONFIG));
    let (channel, mut rx) = open_channel(ChannelClass::Ctrl);

    dispatch(&state, &channel, r#"{"class":"fsa","action":"start"}"#);
    assert_eq!(state.publisher.subscriber_count(), 1);
    let frame = next_json(&mut rx).await;
    assert_eq!(frame["class"], "fsa");
    assert_eq!(frame["data"][0]["alias"], "host1");

    dispatch(&state, &channel, r#"{"class":"fsa","action":"stop"}"#);
    assert_eq!(state.publisher.subscriber_count(), 0);
    assert!(!state.publisher.is_running());
}

// ── afd hc ──────────────────────────────────────────────────

#[tokio::test]
async fn hc_read_without_alias_returns_the_first_host() {
    let (_dir, state) = fixture(Some(HOST_CONFIG));
    let (channel, mut rx) = open_channel(ChannelClass::Ctrl);

    dispatch(
        &state,
        &channel,
        r#"{"class":"afd","action":"hc","command":"read","alias":""}"#,
    );
    let reply = next_json(&mut rx).await;
    assert_eq!(reply["class"], "afd");
    assert_eq!(reply["action"], "hc");
    assert_eq!(reply["alias"], json!(["host1"]));
    assert_eq!(reply["order"], json!(["host1", "host2"]));
    assert_eq!(reply["data"]["host1"]["ftp_mode_passive"], "yes");
    assert!(reply["data"].get("host2").is_none());
}

#[tokio::test]
async fn hc_read_carries_protocol_class() {
    let (_dir, state) = fixture(Some(HOST_CONFIG));
    state.protocols.replace(std::collections::HashMap::from([(
        "host2".to_owned(),
        vec!["SCP".to_owned()],
    )]));
    let (channel, mut rx) = open_channel(ChannelClass::Ctrl);

    dispatch(
        &state,
        &channel,
        r#"{"class":"afd","action":"hc","command":"read","alias":["host2"]}"#,
    );
    let reply = next_json(&mut rx).await;
    assert_eq!(
        reply["data"]["host2"]["protocol-class"],
        ".scheme-remote.scheme-sftp"
    );
}

#[tokio::test]
async fn hc_read_without_host_config_is_not_satisfiable() {
    let (_dir, state) = fixture(None);
    let (channel, mut rx) = open_channel(ChannelClass::Ctrl);

    dispatch(
        &state,
        &channel,
        r#"{"class":"afd","action":"hc","command":"read"}"#,
    );
    let reply = next_json(&mut rx).await;
    assert_eq!(reply["status"], 416);
    assert_eq!(reply["command"], "read");
}

#[tokio::test]
async fn hc_save_rewrites_the_store_without_a_reply() {
    let (dir, state) = fixture(Some(HOST_CONFIG));
    let (channel, mut rx) = open_channel(ChannelClass::Ctrl);

    let request = json!({
        "class": "afd",
        "action": "hc",
        "command": "save",
        "data": { "data": { "host1": { "host_name_real1": "ftp.renamed", "max_errors": 4 } } }
    });
    dispatch(&state, &channel, &request.to_string());

    let path = dir.path().join("etc").join("HOST_CONFIG");
    wait_for_file(&path, "ftp.renamed").await;
    let host1 = state.store.read_one("host1").expect("read back");
    assert_eq!(
        host1.data["host1"].text("ftp_mode_passive").as_deref(),
        Some("no")
    );
    assert_silent(&mut rx, QUIET).await;
}

#[tokio::test]
async fn hc_save_with_malformed_payload_is_not_satisfiable() {
    let (_dir, state) = fixture(Some(HOST_CONFIG));
    let (channel, mut rx) = open_channel(ChannelClass::Ctrl);

    dispatch(
        &state,
        &channel,
        r#"{"class":"afd","action":"hc","command":"save","data":"garbage"}"#,
    );
    assert_eq!(next_json(&mut rx).await["status"], 416);
}

// ── afd dc ──────────────────────────────────────────────────

#[tokio::test]
async fn dc_save_list_and_read() {
    let (dir, state) = fixture(Some(HOST_CONFIG));
    let (channel, mut rx) = open_channel(ChannelClass::Ctrl);

    dispatch(
        &state,
        &channel,
        r#"{"class":"afd","action":"dc","command":"save","filename":"DIR_CONFIG","text":"[directory]\n"}"#,
    );
    wait_for_file(&dir.path().join("etc").join("DIR_CONFIG"), "[directory]").await;

    dispatch(
        &state,
        &channel,
        r#"{"class":"afd","action":"dc","command":"list"}"#,
    );
    let listing = next_json(&mut rx).await;
    assert_eq!(listing["filename"], json!(["DIR_CONFIG"]));

    dispatch(
        &state,
        &channel,
        r#"{"class":"afd","action":"dc","command":"read","filename":"DIR_CONFIG"}"#,
    );
    let read = next_json(&mut rx).await;
    assert_eq!(read["text"], "[directory]\n");
}

#[tokio::test]
async fn dc_save_outside_etc_is_refused() {
    let (dir, state) = fixture(Some(HOST_CONFIG));
    let (channel, mut rx) = open_channel(ChannelClass::Ctrl);

    dispatch(
        &state,
        &channel,
        r#"{"class":"afd","action":"dc","command":"save","filename":"../escape","text":"x"}"#,
    );
    let reply = next_json(&mut rx).await;
    assert_eq!(reply["status"], 500);
    assert!(!dir.path().join("escape").exists());
}

// ── alias ───────────────────────────────────────────────────

#[tokio::test]
async fn info_read_falls_back_when_missing() {
    let (_dir, state) = fixture(Some(HOST_CONFIG));
    let (channel, mut rx) = open_channel(ChannelClass::Ctrl);

    dispatch(
        &state,
        &channel,
        r#"{"class":"alias","action":"info","command":"read","alias":"host1"}"#,
    );
    let reply = next_json(&mut rx).await;
    assert_eq!(reply["alias"], "host1");
    assert_eq!(reply["text"], "No information available.");
    assert_eq!(reply["data"], json!({}));
}

#[tokio::test]
async fn info_read_combines_host_view_and_info_text() {
    let (dir, state) = fixture(Some(HOST_CONFIG));
    std::fs::write(
        dir.path().join("mock").join("dummy.fsa_view.txt"),
        "=====> host1 (0) <=====\n\
         Real hostname 1    : ftp.one\n\
         Host toggle string : {12}\n\
         Total errors       : 4\n\
         Last connection    : Tue Oct 14 10:21:07 2026\n\
         Protocol           : FTP active\n",
    )
    .expect("mock");
    std::fs::write(dir.path().join("etc").join("INFO-host1"), b"Kontakt: J\xfcrgen\n")
        .expect("info");
    let (channel, mut rx) = open_channel(ChannelClass::Ctrl);

    dispatch(
        &state,
        &channel,
        r#"{"class":"alias","action":"info","command":"read","alias":"host1"}"#,
    );
    let reply = next_json(&mut rx).await;
    assert_eq!(reply["alias"], "host1");
    assert_eq!(reply["text"], "Kontakt: J\u{fc}rgen\n");
    let data = &reply["data"];
    assert_eq!(data["hostname"], "host1");
    assert_eq!(data["real1"], "ftp.one");
    assert_eq!(data["host1"], "host11");
    assert_eq!(data["host2"], "host12");
    assert_eq!(data["total_errors"], "4");
    assert_eq!(data["last_connection"], "Tue Oct 14 10:21:07 2026");
    assert_eq!(data["protocol"], "FTP");
}

#[tokio::test]
async fn info_save_then_read() {
    let (dir, state) = fixture(Some(HOST_CONFIG));
    let (channel, mut rx) = open_channel(ChannelClass::Ctrl);

    dispatch(
        &state,
        &channel,
        r#"{"class":"alias","action":"info","command":"save","alias":"host2","text":"call ops"}"#,
    );
    wait_for_file(&dir.path().join("etc").join("INFO-host2"), "call ops").await;

    dispatch(
        &state,
        &channel,
        r#"{"class":"alias","action":"info","command":"read","alias":["host2"]}"#,
    );
    assert_eq!(next_json(&mut rx).await["text"], "call ops");
}

#[tokio::test]
async fn select_matches_real_names_and_protocols() {
    let (_dir, state) = fixture(Some(HOST_CONFIG));
    state.protocols.replace(std::collections::HashMap::from([
        ("host1".to_owned(), vec!["FTP".to_owned()]),
        ("host2".to_owned(), vec!["SFTP".to_owned()]),
    ]));
    let (channel, mut rx) = open_channel(ChannelClass::Ctrl);

    let by_name = json!({
        "class": "alias",
        "action": "select",
        "data": { "modal_select_string": "^sftp", "modal_select_protocol": ["FTP", "SFTP"] }
    });
    dispatch(&state, &channel, &by_name.to_string());
    let reply = next_json(&mut rx).await;
    assert_eq!(reply["action"], "select");
    assert_eq!(reply["alias"], json!(["host2"]));

    let by_protocol = json!({
        "class": "alias",
        "action": "deselect",
        "data": { "modal_select_string": "*", "modal_select_protocol": "FTP" }
    });
    dispatch(&state, &channel, &by_protocol.to_string());
    let reply = next_json(&mut rx).await;
    assert_eq!(reply["action"], "deselect");
    assert_eq!(reply["alias"], json!(["host1"]));
}

#[tokio::test]
async fn failed_host_command_echoes_request_with_error_status() {
    let (_dir, state) = fixture(Some(HOST_CONFIG));
    let (channel, mut rx) = open_channel(ChannelClass::Ctrl);

    // no dummy.afdcmd.txt, so the mocked command fails
    dispatch(
        &state,
        &channel,
        r#"{"class":"alias","action":"retry","alias":["host1","host2"]}"#,
    );
    let reply = next_json(&mut rx).await;
    assert_eq!(reply["action"], "retry");
    assert_eq!(reply["alias"], json!(["host1", "host2"]));
    assert_eq!(reply["status"], 500);
}

#[tokio::test]
async fn successful_host_command_is_silent() {
    let (dir, state) = fixture(Some(HOST_CONFIG));
    std::fs::write(dir.path().join("mock").join("dummy.afdcmd.txt"), "").expect("mock");
    let (channel, mut rx) = open_channel(ChannelClass::Ctrl);

    dispatch(
        &state,
        &channel,
        r#"{"class":"alias","action":"start","alias":"host1"}"#,
    );
    assert_silent(&mut rx, QUIET).await;
}

#[tokio::test]
async fn unknown_alias_action_replies_error_status() {
    let (_dir, state) = fixture(Some(HOST_CONFIG));
    let (channel, mut rx) = open_channel(ChannelClass::Ctrl);

    dispatch(
        &state,
        &channel,
        r#"{"class":"alias","action":"explode","alias":"host1"}"#,
    );
    let reply = next_json(&mut rx).await;
    assert_eq!(reply["action"], "explode");
    assert_eq!(reply["status"], 500);
}

#[tokio::test]
async fn alias_config_returns_dir_config_text() {
    let (dir, state) = fixture(Some(HOST_CONFIG));
    std::fs::write(
        dir.path().join("mock").join("dummy.get_dc_data.txt"),
        "[destination]\n",
    )
    .expect("mock");
    let (channel, mut rx) = open_channel(ChannelClass::Ctrl);

    dispatch(
        &state,
        &channel,
        r#"{"class":"alias","action":"config","alias":"host1"}"#,
    );
    let reply = next_json(&mut rx).await;
    assert_eq!(reply["alias"], "host1");
    assert_eq!(reply["text"], "[destination]\n");
}

// ── log endpoint ────────────────────────────────────────────

#[tokio::test]
async fn system_log_is_filtered_by_level() {
    let (dir, state) = fixture(Some(HOST_CONFIG));
    std::fs::write(
        dir.path().join("log").join("SYSTEM_LOG.0"),
        "14 10:00:00 <I> started\n14 10:00:01 <W> disk low\n14 10:00:02 <E> failed\n",
    )
    .expect("log");
    let (channel, mut rx) = open_channel(ChannelClass::Log);

    dispatch(
        &state,
        &channel,
        r#"{"class":"log","action":"list","context":"system","filter":{"file":"0","level":"W|E"}}"#,
    );
    let reply = next_json(&mut rx).await;
    assert_eq!(reply["context"], "system");
    assert_eq!(reply["append"], false);
    assert_eq!(
        reply["text"],
        "14 10:00:01 <W> disk low\n14 10:00:02 <E> failed\n"
    );
}

#[tokio::test]
async fn query_log_rows_come_from_alda() {
    let (dir, state) = fixture(Some(HOST_CONFIG));
    std::fs::write(dir.path().join("mock").join("dummy.alda.txt"), "<tr>a</tr>\n<tr>b</tr>")
        .expect("mock");
    let (channel, mut rx) = open_channel(ChannelClass::Log);

    dispatch(
        &state,
        &channel,
        r#"{"class":"log","action":"list","context":"input","filter":{"filename":"*.txt"}}"#,
    );
    let reply = next_json(&mut rx).await;
    assert_eq!(reply["context"], "input");
    assert_eq!(reply["lines"], json!(["<tr>a</tr>", "<tr>b</tr>"]));
    assert_eq!(reply["errno"], 0);
    assert!(reply.get("error").is_none());
}

#[tokio::test]
async fn file_info_combines_row_and_job_view() {
    let (dir, state) = fixture(Some(HOST_CONFIG));
    std::fs::write(dir.path().join("mock").join("dummy.jid_view.txt"), "Job ID : a\n")
        .expect("mock");
    let (channel, mut rx) = open_channel(ChannelClass::Log);

    dispatch(
        &state,
        &channel,
        r#"{"class":"log","action":"info","context":"output",
            "filter":[{"jid":"10","fnl":"a.txt","fnr":"b.txt","uu":"1","sz":"42"}]}"#,
    );
    let reply = next_json(&mut rx).await;
    assert_eq!(reply["action"], "info");
    assert_eq!(reply["data"]["jid"], "10");
    assert_eq!(reply["data"]["fnr"], "b.txt");
    let text = reply["data"]["text"].as_str().expect("text");
    assert!(text.contains("Local name : a.txt"));
    assert!(text.ends_with("Job ID : a\n"));
}

#[tokio::test]
async fn ctrl_classes_are_ignored_on_the_log_endpoint() {
    let (_dir, state) = fixture(Some(HOST_CONFIG));
    let (channel, mut rx) = open_channel(ChannelClass::Log);

    dispatch(&state, &channel, r#"{"class":"fsa","action":"start"}"#);
    assert_eq!(state.publisher.subscriber_count(), 0);
    assert_silent(&mut rx, QUIET).await;
}
