//! Field session timing: debounce, stale replies, selection

mod common;

use std::sync::Arc;
use std::time::Duration;

use addrverify::config::DebounceConfig;
use addrverify::verify::{MSG_RATE_LIMITED, MSG_TOO_SHORT, MSG_VERIFIED};
use addrverify::{
    AddressCandidate, AddressField, AddressParts, FieldCommand, FieldEvent, FieldKind,
    FieldSession, LocationConstraint,
};
use common::{FakeGeocoder, evergreen_springfield};
use tokio::sync::mpsc;
use tokio::time::sleep;

fn start(
    geo: Arc<FakeGeocoder>,
    constraint: LocationConstraint,
) -> (
    flume::Sender<FieldCommand>,
    tokio::task::JoinHandle<AddressField>,
    mpsc::UnboundedReceiver<FieldEvent>,
) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let field = AddressField::new(FieldKind::Origin, constraint);
    let (cmd_tx, handle) = FieldSession::new(field, geo, &DebounceConfig::default(), event_tx).spawn();
    (cmd_tx, handle, event_rx)
}

async fn close(cmd_tx: flume::Sender<FieldCommand>, handle: tokio::task::JoinHandle<AddressField>) -> AddressField {
    cmd_tx.send(FieldCommand::Close).unwrap();
    handle.await.unwrap()
}

fn main_st(n: u32) -> AddressCandidate {
    AddressCandidate::new(&format!("{} Main St", n), "Springfield", "IL", "62701")
}

#[tokio::test(start_paused = true)]
async fn rapid_typing_fires_one_lookup() {
    let geo = Arc::new(FakeGeocoder::new());
    let (cmd_tx, handle, _events) = start(Arc::clone(&geo), LocationConstraint::unconstrained());

    for text in ["1", "12", "123"] {
        cmd_tx.send(FieldCommand::Input(text.into())).unwrap();
        sleep(Duration::from_millis(50)).await;
    }
    sleep(Duration::from_secs(1)).await;

    close(cmd_tx, handle).await;
    assert_eq!(geo.calls(), vec!["123".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn late_reply_does_not_overwrite_newer_one() {
    let geo = Arc::new(
        FakeGeocoder::new()
            .respond_after("Main", Duration::from_millis(1000), vec![main_st(1), main_st(2)])
            .respond_after("Main St", Duration::from_millis(100), vec![main_st(3)]),
    );
    let (cmd_tx, handle, _events) = start(Arc::clone(&geo), LocationConstraint::unconstrained());

    cmd_tx.send(FieldCommand::Input("Main".into())).unwrap();
    sleep(Duration::from_millis(350)).await;
    cmd_tx.send(FieldCommand::Input("Main St".into())).unwrap();
    sleep(Duration::from_secs(3)).await;

    let field = close(cmd_tx, handle).await;
    assert_eq!(geo.calls(), vec!["Main".to_string(), "Main St".to_string()]);
    assert_eq!(field.suggestions(), &[main_st(3)]);
    assert!(field.snapshot().show_suggestions);
}

#[tokio::test(start_paused = true)]
async fn selection_discards_in_flight_suggestions() {
    let geo = Arc::new(FakeGeocoder::new().respond_after(
        "742 Evergreen",
        Duration::from_millis(500),
        vec![main_st(1)],
    ));
    let (cmd_tx, handle, _events) = start(Arc::clone(&geo), LocationConstraint::unconstrained());

    cmd_tx.send(FieldCommand::Input("742 Evergreen".into())).unwrap();
    sleep(Duration::from_millis(400)).await;
    cmd_tx.send(FieldCommand::Select(evergreen_springfield())).unwrap();
    sleep(Duration::from_secs(2)).await;

    let field = close(cmd_tx, handle).await;
    assert_eq!(geo.calls().len(), 1);
    let snapshot = field.snapshot();
    assert_eq!(snapshot.verified, Some(true));
    assert!(!snapshot.show_suggestions);
    assert!(snapshot.suggestions.is_empty());
}

#[tokio::test(start_paused = true)]
async fn verify_command_reports_through_events() {
    let geo = Arc::new(FakeGeocoder::new().respond("742 Evergreen Terrace", vec![evergreen_springfield()]));
    let (cmd_tx, handle, mut events) = start(
        Arc::clone(&geo),
        LocationConstraint::new(Some("Springfield"), Some("IL"), None),
    );

    cmd_tx.send(FieldCommand::Input("742 Evergreen Terrace".into())).unwrap();
    cmd_tx.send(FieldCommand::Verify).unwrap();

    let verified = loop {
        match events.recv().await {
            Some(FieldEvent::Updated(snapshot)) if snapshot.verified == Some(true) => break snapshot,
            Some(_) => continue,
            None => panic!("session ended before verifying"),
        }
    };
    assert_eq!(verified.message, MSG_VERIFIED);
    assert_eq!(verified.selected, Some(evergreen_springfield()));

    close(cmd_tx, handle).await;
}

#[tokio::test(start_paused = true)]
async fn part_edits_only_refresh_the_hint() {
    let composed = "742 Evergreen Terrace, Springfield, IL";
    let geo = Arc::new(FakeGeocoder::new().respond(composed, vec![evergreen_springfield()]));
    let (cmd_tx, handle, _events) = start(Arc::clone(&geo), LocationConstraint::unconstrained());

    cmd_tx.send(FieldCommand::Input("742 Evergreen Terrace".into())).unwrap();
    sleep(Duration::from_secs(1)).await;
    cmd_tx
        .send(FieldCommand::Parts(AddressParts::new("Springfield", "IL", "")))
        .unwrap();
    sleep(Duration::from_secs(1)).await;

    let field = close(cmd_tx, handle).await;
    assert!(geo.calls().contains(&composed.to_string()));
    let state = field.state();
    assert_eq!(state.verified, None);
    assert!(state.message.is_empty());
    assert_eq!(state.top_suggestion, Some(evergreen_springfield()));
}

#[tokio::test(start_paused = true)]
async fn rate_limit_blocks_lookups() {
    let geo = Arc::new(FakeGeocoder::new());
    geo.set_rate_limited(true);
    let (cmd_tx, handle, _events) = start(Arc::clone(&geo), LocationConstraint::unconstrained());

    cmd_tx.send(FieldCommand::Input("742 Evergreen".into())).unwrap();
    sleep(Duration::from_secs(1)).await;
    cmd_tx.send(FieldCommand::Verify).unwrap();
    sleep(Duration::from_millis(10)).await;

    let field = close(cmd_tx, handle).await;
    assert!(geo.calls().is_empty());
    assert_eq!(field.state().message, MSG_RATE_LIMITED);
    assert!(field.snapshot().rate_limited);
}

#[tokio::test(start_paused = true)]
async fn edit_during_verify_discards_the_reply() {
    let geo = Arc::new(FakeGeocoder::new().respond_after(
        "742 Evergreen Terrace",
        Duration::from_millis(800),
        vec![evergreen_springfield()],
    ));
    let (cmd_tx, handle, _events) = start(
        Arc::clone(&geo),
        LocationConstraint::new(Some("Springfield"), Some("IL"), None),
    );

    cmd_tx.send(FieldCommand::Input("742 Evergreen Terrace".into())).unwrap();
    cmd_tx.send(FieldCommand::Verify).unwrap();
    sleep(Duration::from_millis(100)).await;
    cmd_tx.send(FieldCommand::Input("74".into())).unwrap();
    sleep(Duration::from_secs(2)).await;

    let field = close(cmd_tx, handle).await;
    assert_eq!(geo.calls(), vec!["742 Evergreen Terrace".to_string()]);
    let snapshot = field.snapshot();
    assert_eq!(snapshot.text, "74");
    assert_ne!(snapshot.verified, Some(true));
    assert_eq!(snapshot.selected, None);
    assert_eq!(snapshot.resolved_position, None);
}

#[tokio::test(start_paused = true)]
async fn verify_after_edit_uses_the_new_text() {
    let geo = Arc::new(
        FakeGeocoder::new()
            .respond_after("742 Evergreen", Duration::from_millis(800), vec![evergreen_springfield()])
            .respond("1 Nowhere Lane", Vec::new()),
    );
    let (cmd_tx, handle, _events) = start(Arc::clone(&geo), LocationConstraint::unconstrained());

    cmd_tx.send(FieldCommand::Input("742 Evergreen".into())).unwrap();
    cmd_tx.send(FieldCommand::Verify).unwrap();
    sleep(Duration::from_millis(100)).await;
    cmd_tx.send(FieldCommand::Input("1 Nowhere Lane".into())).unwrap();
    cmd_tx.send(FieldCommand::Verify).unwrap();
    sleep(Duration::from_secs(2)).await;

    let field = close(cmd_tx, handle).await;
    let snapshot = field.snapshot();
    assert_eq!(snapshot.verified, Some(false));
    assert_eq!(snapshot.selected, None);
}

#[tokio::test(start_paused = true)]
async fn rate_limit_flag_follows_the_lookup() {
    let geo = Arc::new(FakeGeocoder::new());
    geo.set_rate_limited(true);
    let (cmd_tx, handle, _events) = start(Arc::clone(&geo), LocationConstraint::unconstrained());

    cmd_tx.send(FieldCommand::Input("742 Evergreen".into())).unwrap();
    cmd_tx.send(FieldCommand::Verify).unwrap();
    sleep(Duration::from_millis(10)).await;

    // Window over; the next edit needs no lookup of its own to notice
    geo.set_rate_limited(false);
    cmd_tx.send(FieldCommand::Input("74".into())).unwrap();
    cmd_tx.send(FieldCommand::Verify).unwrap();
    sleep(Duration::from_millis(10)).await;

    let field = close(cmd_tx, handle).await;
    assert!(geo.calls().is_empty());
    let snapshot = field.snapshot();
    assert!(!snapshot.rate_limited);
    assert_eq!(snapshot.message, MSG_TOO_SHORT);
}
