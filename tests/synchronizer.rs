use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt};
use ledc_scheduler::*;
use parking_lot::Mutex;
use serde_json::{json, Value};

const DOCUMENT: &str = r#"{
    "timers": { "0": { "id": 0, "freq": 1000 }, "1": { "id": 1, "freq": null } },
    "channels": {
        "0": { "id": 0, "name": "Royal blue", "timer": 0, "gpio": 18, "enabled": true },
        "1": { "id": 1, "name": null, "timer": 4, "gpio": null, "enabled": false }
    },
    "schedule": {
        "20:00": { "tod": "20:00", "0": 0 },
        "08:00": { "tod": "08:00", "0": 60 }
    },
    "system": { "hostname": "reef-tank", "timezone": "CET-1CEST", "ntp_servers": ["pool.ntp.org", null] }
}"#;

#[derive(Debug, Clone)]
enum Reply {
    Respond(Response),
    Hang,
}

#[derive(Debug, Clone, PartialEq)]
enum Request {
    Get,
    Set(String),
}

/// In-memory device answering every request with the configured reply
struct MockDevice {
    reply: Mutex<Reply>,
    requests: Mutex<Vec<Request>>,
}

impl MockDevice {
    fn new(reply: Reply) -> Self {
        Self {
            reply: Mutex::new(reply),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn answering(body: &str) -> Self {
        Self::new(Reply::Respond(Response::ok(body)))
    }

    fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }

    fn reply(&self) -> BoxFuture<'static, Result<Response>> {
        match self.reply.lock().clone() {
            Reply::Respond(response) => future::ready(Ok(response)).boxed(),
            Reply::Hang => future::pending().boxed(),
        }
    }
}

impl SettingsTransport for MockDevice {
    fn fetch(&self) -> BoxFuture<'_, Result<Response>> {
        self.requests.lock().push(Request::Get);
        self.reply()
    }

    fn send(&self, body: String) -> BoxFuture<'_, Result<Response>> {
        self.requests.lock().push(Request::Set(body));
        self.reply()
    }
}

fn synchronizer(device: MockDevice) -> Synchronizer<MockDevice> {
    let config = SyncConfig::new("http://mock").with_timeout(Duration::from_millis(50));
    Synchronizer::new(device, config)
}

fn loaded_state() -> AppState {
    AppState::from_aggregate(SettingsAggregate::from_json(DOCUMENT).unwrap())
}

fn sent_body(sync: &Synchronizer<MockDevice>) -> Value {
    match sync.transport().requests().last() {
        Some(Request::Set(body)) => serde_json::from_str(body).unwrap(),
        other => panic!("expected a set request, got {other:?}"),
    }
}

#[tokio::test]
async fn load_replaces_state() {
    let sync = synchronizer(MockDevice::answering(DOCUMENT));

    sync.load().await.unwrap();

    let state = sync.state();
    assert_eq!(state.timers.get(0).unwrap().freq, 1000);
    assert_eq!(state.timers.get(1).unwrap().freq, 500);
    assert_eq!(state.channels.get(0).unwrap().name, "Royal blue");
    assert_eq!(state.channels.get(1).unwrap().timer, None);
    assert_eq!(state.schedule.entries()[0].tod, "08:00");
    assert_eq!(state.system.hostname, "reef-tank");
    assert_eq!(sync.status().message, "Settings loaded.");
    assert_eq!(sync.transport().requests(), [Request::Get]);
}

#[tokio::test]
async fn load_timeout_leaves_state_untouched() {
    let config = SyncConfig::new("http://mock").with_timeout(Duration::from_millis(20));
    let sync = Synchronizer::with_state(MockDevice::new(Reply::Hang), config, loaded_state());

    let err = sync.load().await.unwrap_err();

    assert!(matches!(err, Error::Timeout(_)));
    assert_eq!(*sync.state(), loaded_state());
    let status = sync.status();
    assert!(status.failed);
    assert!(status.message.contains("Timeout"));
    assert_eq!(status.message, "Failed to load settings. Error: Timeout");
}

#[tokio::test]
async fn load_reports_device_error_body() {
    let device = MockDevice::new(Reply::Respond(Response {
        status: 500,
        body: "flash busy".into(),
    }));
    let sync = synchronizer(device);

    let err = sync.load().await.unwrap_err();

    assert!(matches!(err, Error::Status { status: 500, .. }));
    assert_eq!(sync.status().message, "Failed to load settings. Error: flash busy");
    assert_eq!(*sync.state(), AppState::default());
}

#[tokio::test]
async fn load_rejects_malformed_document() {
    let sync = Synchronizer::with_state(
        MockDevice::answering(r#"{"timers": {"zero": {}}}"#),
        SyncConfig::new("http://mock"),
        loaded_state(),
    );

    assert!(sync.load().await.is_err());
    assert!(sync.status().failed);
    assert_eq!(*sync.state(), loaded_state());
}

#[tokio::test]
async fn save_refuses_row_without_time() {
    let sync = synchronizer(MockDevice::answering(""));
    sync.stage_rows(vec![
        ScheduleEntry::new("08:00").with_level(0, 10),
        ScheduleEntry::new("").with_level(0, 20),
    ]);

    let err = sync.save().await.unwrap_err();

    assert!(matches!(
        err,
        Error::Validation(ValidationError::MissingTimeOfDay { row: 1 })
    ));
    assert!(sync.transport().requests().is_empty());
    assert_eq!(
        sync.status().message,
        "Save failed: Invalid schedule. Please fix errors."
    );
    // Rows stay staged so they can be fixed
    assert!(sync.state().has_staged_rows());
    assert!(sync.state().schedule.is_empty());
}

#[tokio::test]
async fn save_refuses_duplicate_times() {
    let sync = synchronizer(MockDevice::answering(""));
    sync.stage_rows(vec![
        ScheduleEntry::new("08:00").with_level(0, 10),
        ScheduleEntry::new("08:00").with_level(0, 20),
    ]);

    let err = sync.save().await.unwrap_err();

    assert!(matches!(
        err,
        Error::Validation(ValidationError::DuplicateTimeOfDay { .. })
    ));
    assert!(sync.transport().requests().is_empty());
}

#[tokio::test]
async fn save_refuses_invalid_timer() {
    let sync = Synchronizer::with_state(
        MockDevice::answering(""),
        SyncConfig::new("http://mock"),
        loaded_state(),
    );
    sync.update(|state| state.timers.get_mut(2).unwrap().freq = 0);

    let err = sync.save().await.unwrap_err();

    assert!(matches!(
        err,
        Error::Validation(ValidationError::TimerFrequency { id: 2, freq: 0 })
    ));
    assert_eq!(
        sync.status().message,
        "Save failed: Invalid timer setup. Please fix errors."
    );
    assert!(sync.transport().requests().is_empty());
}

#[tokio::test]
async fn save_sends_wire_document() {
    let sync = Synchronizer::with_state(
        MockDevice::answering("OK"),
        SyncConfig::new("http://mock"),
        loaded_state(),
    );
    sync.update(|state| state.channels.get_mut(0).unwrap().name = String::new());
    sync.stage_rows(vec![
        ScheduleEntry::new("09:30").with_level(0, 40),
        ScheduleEntry::new("06:00").with_level(0, 5),
    ]);

    sync.save().await.unwrap();

    let body = sent_body(&sync);
    assert_eq!(body["channels"]["0"]["name"], Value::Null);
    assert_eq!(body["channels"]["0"]["gpio"], json!(18));
    assert_eq!(body["timers"]["1"]["freq"], json!(500));
    assert_eq!(
        body["schedule"],
        json!({
            "06:00": { "tod": "06:00", "0": 5 },
            "09:30": { "tod": "09:30", "0": 40 }
        })
    );
    assert_eq!(body["system"]["hostname"], json!("reef-tank"));

    assert!(!sync.state().has_staged_rows());
    assert_eq!(sync.state().schedule.len(), 2);
    assert_eq!(sync.status().message, "Complete.");
}

#[tokio::test]
async fn save_reports_device_rejection() {
    let device = MockDevice::new(Reply::Respond(Response {
        status: 400,
        body: "Invalid JSON".into(),
    }));
    let sync = synchronizer(device);

    let err = sync.save().await.unwrap_err();

    assert!(matches!(err, Error::Status { status: 400, .. }));
    assert_eq!(sync.status().message, "Save failed: Error: Invalid JSON");
    assert_eq!(sync.transport().requests().len(), 1);
}

#[tokio::test]
async fn overlapping_operations_are_rejected() {
    let sync = synchronizer(MockDevice::new(Reply::Hang));

    let (first, second) = tokio::join!(sync.load(), sync.save());

    assert!(matches!(first, Err(Error::Timeout(_))));
    assert!(matches!(second, Err(Error::Busy)));
    assert_eq!(sync.transport().requests(), [Request::Get]);

    // The guard is released once the first operation finished
    *sync.transport().reply.lock() = Reply::Respond(Response::ok(DOCUMENT));
    sync.load().await.unwrap();
}

#[tokio::test]
async fn sweep_then_save_merges_rows() {
    let sync = Synchronizer::with_state(
        MockDevice::answering("OK"),
        SyncConfig::new("http://mock"),
        loaded_state(),
    );
    let sweep = SweepRequest::linear(0, "08:00", 0, "09:00", 100, StepMode::Time(30.0)).unwrap();

    let rows = sync.update(|state| state.schedule.apply_sweep(&sweep));
    sync.save().await.unwrap();

    assert_eq!(rows, 3);
    let body = sent_body(&sync);
    assert_eq!(
        body["schedule"],
        json!({
            "08:00": { "tod": "08:00", "0": 0 },
            "08:30": { "tod": "08:30", "0": 50 },
            "09:00": { "tod": "09:00", "0": 100 },
            "20:00": { "tod": "20:00", "0": 0 }
        })
    );

    let dataset = sync.state().dataset();
    assert_eq!(dataset.len(), 1);
    assert_eq!(dataset[0].points.first(), Some(&Point::new("00:00", 0)));
    assert_eq!(dataset[0].points.last(), Some(&Point::new("24:00", 0)));
}

#[tokio::test]
async fn backup_writes_raw_document() {
    let dir = tempfile::tempdir().unwrap();
    let sync = synchronizer(MockDevice::answering(DOCUMENT));

    let path = sync.backup(dir.path()).await.unwrap();

    assert_eq!(path, dir.path().join("reef-tank.json"));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), DOCUMENT);
    assert_eq!(*sync.state(), AppState::default());
    assert!(!sync.status().failed);
}

#[tokio::test]
async fn backup_without_hostname_uses_fallback_name() {
    let dir = tempfile::tempdir().unwrap();
    let sync = synchronizer(MockDevice::answering(r#"{"system": {"hostname": ""}}"#));

    let path = sync.backup(dir.path()).await.unwrap();

    assert_eq!(path.file_name().unwrap(), "settings.json");
}

#[tokio::test]
async fn restore_applies_file_and_saves_on_confirm() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reef-tank.json");
    std::fs::write(&path, DOCUMENT).unwrap();

    let sync = synchronizer(MockDevice::answering("OK"));
    sync.restore(&path, |_| false).await.unwrap();

    assert_eq!(*sync.state(), loaded_state());
    assert!(sync.transport().requests().is_empty());

    sync.restore(&path, |state| state.system.hostname == "reef-tank")
        .await
        .unwrap();

    let body = sent_body(&sync);
    assert_eq!(body["channels"]["0"]["name"], json!("Royal blue"));
    assert_eq!(sync.status().message, "Settings restored.");
}

#[tokio::test]
async fn restore_rejects_malformed_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();

    let sync = Synchronizer::with_state(
        MockDevice::answering("OK"),
        SyncConfig::new("http://mock"),
        loaded_state(),
    );

    let err = sync.restore(&path, |_| true).await.unwrap_err();

    assert!(matches!(err, Error::Parse(_)));
    assert!(sync.status().message.starts_with("Restore failed:"));
    assert_eq!(*sync.state(), loaded_state());
    assert!(sync.transport().requests().is_empty());
}

#[tokio::test]
async fn save_refuses_unknown_schedule_channel() {
    let sync = synchronizer(MockDevice::answering("OK"));
    sync.stage_rows(vec![ScheduleEntry::new("07:00").with_level(9, 40)]);

    let err = sync.save().await.unwrap_err();

    assert!(matches!(
        err,
        Error::Validation(ValidationError::UnknownChannel { channel: 9, .. })
    ));
    assert!(sync.transport().requests().is_empty());
}
