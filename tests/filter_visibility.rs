//! Session-scoped filter behavior observed through retrieval.

mod common;

use common::{command, connect, harness};
use courier::protocol::Status;
use serde_json::json;

const CHID: &str = "#feed@example.org";

async fn seed(h: &common::Harness, alice: &mut common::Client) {
    command(
        h,
        alice,
        "hCreateUpdateChannel",
        json!({
            "chid": CHID,
            "owner": "alice@example.org",
            "authorized_principals": ["alice@example.org"],
        }),
    )
    .await;
    for (kind, urgency) in [("report", "low"), ("report", "high"), ("note", "high")] {
        let result = command(
            h,
            alice,
            "hPublish",
            json!({
                "chid": CHID,
                "publisher": "alice@example.org",
                "type": kind,
                "payload": { "urgency": urgency },
                "persistent": true,
            }),
        )
        .await;
        assert_eq!(result.status, Status::Ok);
    }
}

#[tokio::test]
async fn conjunction_of_named_filters_gates_retrieval() {
    let h = harness();
    let mut alice = connect(&h, "alice@example.org/mobile").await;
    seed(&h, &mut alice).await;

    // f1 keeps reports; f2 keeps high urgency; both must pass.
    for (name, template) in [
        ("f1", json!({ "type": "report" })),
        ("f2", json!({ "payload": { "urgency": "high" } })),
    ] {
        let result = command(
            &h,
            &mut alice,
            "hSetFilter",
            json!({ "actor": CHID, "name": name, "template": template }),
        )
        .await;
        assert_eq!(result.status, Status::Ok);
    }

    let result = command(&h, &mut alice, "hGetLastMessages", json!({ "chid": CHID })).await;
    let messages = result.result.as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["type"], "report");
    assert_eq!(messages[0]["payload"]["urgency"], "high");

    // Unsetting f2 widens visibility back to every report.
    command(
        &h,
        &mut alice,
        "hUnsetFilter",
        json!({ "actor": CHID, "name": "f2" }),
    )
    .await;
    let result = command(&h, &mut alice, "hGetLastMessages", json!({ "chid": CHID })).await;
    assert_eq!(result.result.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn replacing_a_filter_keeps_its_position() {
    let h = harness();
    let mut alice = connect(&h, "alice@example.org/mobile").await;
    seed(&h, &mut alice).await;

    for name in ["f1", "f2"] {
        command(
            &h,
            &mut alice,
            "hSetFilter",
            json!({ "actor": CHID, "name": name, "template": { "type": "report" } }),
        )
        .await;
    }
    // Re-setting f1 must not move it behind f2.
    command(
        &h,
        &mut alice,
        "hSetFilter",
        json!({ "actor": CHID, "name": "f1", "template": { "type": "note" } }),
    )
    .await;

    let result = command(&h, &mut alice, "hListFilters", json!({ "actor": CHID })).await;
    let names: Vec<_> = result
        .result
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["f1", "f2"]);
}

#[tokio::test]
async fn filters_are_scoped_to_their_session() {
    let h = harness();
    let mut alice = connect(&h, "alice@example.org/mobile").await;
    seed(&h, &mut alice).await;
    command(
        &h,
        &mut alice,
        "hCreateUpdateChannel",
        json!({
            "chid": CHID,
            "authorized_principals": ["alice@example.org", "bob@example.org"],
        }),
    )
    .await;

    command(
        &h,
        &mut alice,
        "hSetFilter",
        json!({ "actor": CHID, "name": "only-notes", "template": { "type": "note" } }),
    )
    .await;

    let result = command(&h, &mut alice, "hGetLastMessages", json!({ "chid": CHID })).await;
    assert_eq!(result.result.as_array().unwrap().len(), 1);

    // Another session sees the channel unfiltered.
    let mut bob = connect(&h, "bob@example.org/web").await;
    let result = command(&h, &mut bob, "hGetLastMessages", json!({ "chid": CHID })).await;
    assert_eq!(result.result.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn reserved_fields_are_rejected() {
    let h = harness();
    let mut alice = connect(&h, "alice@example.org/mobile").await;

    let result = command(
        &h,
        &mut alice,
        "hSetFilter",
        json!({ "actor": CHID, "name": "bad", "template": { "publisher": "x", "msgid": "m" } }),
    )
    .await;
    assert_eq!(result.status, Status::InvalidAttr);
}

#[tokio::test]
async fn thread_visibility_follows_first_message() {
    let h = harness();
    let mut alice = connect(&h, "alice@example.org/mobile").await;
    command(
        &h,
        &mut alice,
        "hCreateUpdateChannel",
        json!({
            "chid": CHID,
            "owner": "alice@example.org",
            "authorized_principals": ["alice@example.org"],
        }),
    )
    .await;
    for kind in ["hidden", "visible"] {
        command(
            &h,
            &mut alice,
            "hPublish",
            json!({
                "chid": CHID,
                "publisher": "alice@example.org",
                "convid": "t1",
                "type": kind,
                "persistent": true,
            }),
        )
        .await;
    }
    command(
        &h,
        &mut alice,
        "hSetFilter",
        json!({ "actor": CHID, "name": "v", "template": { "type": "visible" } }),
    )
    .await;

    let result = command(
        &h,
        &mut alice,
        "hGetThread",
        json!({ "chid": CHID, "convid": "t1" }),
    )
    .await;
    assert_eq!(result.status, Status::Ok);
    assert_eq!(result.result, json!([]), "no partial thread visibility");
}
