// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;
use uuid::Uuid;

use super::*;

#[test]
fn envelope_round_trips_with_dotted_kind() {
    let envelope = TaskEnvelope {
        task_id: Uuid::new_v4(),
        broker_id: "b-1".into(),
        queue: "host01".into(),
        spec: TaskSpec::HealthCheck(HealthCheckParams {
            device_id: Uuid::new_v4(),
            serial: "R58M41ABC".into(),
        }),
    };

    let wire = serde_json::to_value(&envelope).unwrap();
    assert_eq!(wire["kind"], "tasks.device_tasks.health_check");
    assert_eq!(wire["queue"], "host01");

    let back: TaskEnvelope = serde_json::from_value(wire).unwrap();
    assert_eq!(back, envelope);
}

#[test]
fn unknown_payload_field_is_rejected() {
    let wire = json!({
        "task_id": Uuid::new_v4(),
        "broker_id": "b-2",
        "queue": "host01",
        "kind": "tasks.install_tasks.install_apk",
        "serial": "R58M41ABC",
        "apk_name": "youtube.apk",
        "bogus": true,
    });

    let err = serde_json::from_value::<TaskEnvelope>(wire).unwrap_err();
    assert!(err.to_string().contains("bogus"), "unexpected error: {err}");
}

#[test]
fn youtube_params_apply_defaults() {
    let wire = json!({
        "device_udid": "192.168.1.40:5555",
        "assignment_id": "A-77",
    });
    let params: YoutubeJobParams = serde_json::from_value(wire).unwrap();
    assert_eq!(params.duration_sec, 180);
    assert_eq!(params.duration_min_pct, 30);
    assert_eq!(params.duration_max_pct, 90);
    assert_eq!(params.prob_like, 0);
    assert!(params.target_url.is_none());
}

#[yare::parameterized(
    pending = { TaskStatus::Pending, false },
    running = { TaskStatus::Running, false },
    retrying = { TaskStatus::Retrying, false },
    success = { TaskStatus::Success, true },
    failed = { TaskStatus::Failed, true },
    cancelled = { TaskStatus::Cancelled, true },
)]
fn terminal_statuses(status: TaskStatus, terminal: bool) {
    assert_eq!(status.is_terminal(), terminal);
}

#[test]
fn spec_kind_matches_wire_name() {
    let spec = TaskSpec::RunYoutube(YoutubeJobParams {
        device_udid: "serial-1".into(),
        assignment_id: "A-1".into(),
        target_url: None,
        keyword: None,
        video_title: None,
        duration_sec: 60,
        duration_min_pct: 50,
        duration_max_pct: 50,
        prob_like: 0,
        prob_comment: 0,
        prob_subscribe: 0,
        prob_playlist: 0,
        comment_text: None,
    });
    assert_eq!(spec.kind(), TaskKind::RunYoutube);
    assert_eq!(spec.kind().as_str(), "tasks.appium_tasks.run_youtube");
    let wire = serde_json::to_value(&spec).unwrap();
    assert_eq!(wire["kind"], spec.kind().as_str());
}
