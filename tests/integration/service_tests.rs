//! End-to-end behaviour of the service loop: bytes in, lines out.

use serde_json::json;

use crate::mock_hw::{Rig, SensorCall, journal};
use spectroneph::app::ports::SensorSettings;
use spectroneph::error::TransportError;

// ── Start-up ──────────────────────────────────────────────────

#[test]
fn start_announces_device_ready() {
    let mut rig = Rig::new();
    rig.start(0);

    assert_eq!(
        rig.link.take_lines(),
        vec![
            r#"{"event":true,"type":"device_ready","timestamp":0,"data":{"uptime":0,"sensor_connected":true}}"#
        ]
    );
    assert_eq!(rig.sensor.calls.first(), Some(&SensorCall::Begin));
    assert_eq!(rig.power.activity, vec![0]);
}

#[test]
fn start_without_sensor_still_announces() {
    let mut rig = Rig::new();
    rig.sensor.connected = false;
    rig.start(7);

    let lines = rig.link.take_json();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["event"], json!(true));
    assert_eq!(lines[0]["data"], json!({"uptime": 7, "sensor_connected": false}));
}

// ── Framing and envelope ──────────────────────────────────────

#[test]
fn ping_reply_is_byte_exact() {
    let mut rig = Rig::new();
    rig.link.push_line(r#"{"cmd":"ping","id":1}"#);
    let summary = rig.tick(250);

    assert_eq!(summary.commands, 1);
    assert_eq!(
        rig.link.take_lines(),
        vec![r#"{"resp":"data","id":1,"status":0,"data":{"pong":true,"time":250}}"#]
    );
}

#[test]
fn unknown_command_reply_is_byte_exact() {
    let mut rig = Rig::new();
    rig.link.push_line(r#"{"cmd":"nope","id":1}"#);
    rig.tick(0);

    assert_eq!(
        rig.link.take_lines(),
        vec![r#"{"resp":"error","id":1,"status":1,"data":"Unknown command: nope"}"#]
    );
}

#[test]
fn malformed_lines_get_no_reply() {
    let mut rig = Rig::new();
    rig.link.push_line("not json at all");
    rig.link.push_line(r#"{"id":3}"#);
    rig.link.push_line("[1,2,3]");
    rig.link.push_line(r#"{"cmd":7,"id":3}"#);
    rig.link.push_line(r#"{"cmd":"ping","id":4}"#);
    let summary = rig.tick(0);

    assert_eq!(summary.dropped, 4);
    assert_eq!(summary.commands, 1);
    let lines = rig.link.take_json();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["id"], json!(4));
}

#[test]
fn commands_are_answered_in_arrival_order() {
    let mut rig = Rig::new();
    rig.link
        .push(b"{\"cmd\":\"ping\",\"id\":1}\r\n{\"cmd\":\"nope\",\"id\":2}\n\n{\"cmd\":\"ping\",\"id\":3}\n");
    rig.tick(0);

    let ids: Vec<_> = rig.link.take_json().iter().map(|l| l["id"].clone()).collect();
    assert_eq!(ids, vec![json!(1), json!(2), json!(3)]);
}

#[test]
fn a_line_split_across_ticks_is_reassembled() {
    let mut rig = Rig::new();
    rig.link.push(br#"{"cmd":"pi"#);
    assert_eq!(rig.tick(0).commands, 0);
    assert!(rig.link.take_lines().is_empty());

    rig.link.push(b"ng\",\"id\":8}\n");
    assert_eq!(rig.tick(1).commands, 1);
    assert_eq!(rig.link.take_json()[0]["id"], json!(8));
}

#[test]
fn input_is_left_queued_until_the_link_reports_it() {
    let mut rig = Rig::new();
    rig.link.held = true;
    rig.link.push_line(r#"{"cmd":"ping","id":4}"#);

    let summary = rig.tick(0);
    assert_eq!((summary.bytes_read, summary.commands), (0, 0));
    assert!(rig.link.take_lines().is_empty());

    rig.link.held = false;
    assert_eq!(rig.tick(1).commands, 1);
    assert_eq!(rig.link.take_json()[0]["id"], json!(4));
}

#[test]
fn read_fault_is_reported_and_input_survives() {
    let mut rig = Rig::new();
    rig.link.push_line(r#"{"cmd":"ping","id":6}"#);
    rig.link.read_fault = true;

    let summary = rig.tick(0);
    assert_eq!(summary.link_error, Some(TransportError::ReadFailed));
    assert_eq!(summary.commands, 0);

    let summary = rig.tick(1);
    assert_eq!(summary.link_error, None);
    assert_eq!(summary.commands, 1);
    assert_eq!(rig.link.take_json()[0]["id"], json!(6));
}

#[test]
fn missing_id_is_echoed_as_zero() {
    let mut rig = Rig::new();
    let reply = rig.request(0, r#"{"cmd":"ping"}"#);
    assert_eq!(reply["id"], json!(0));
    assert_eq!(reply["resp"], json!("data"));
}

// ── Identity ──────────────────────────────────────────────────

#[test]
fn get_info_reports_identity_and_sensor() {
    let mut rig = Rig::new();
    let reply = rig.request(1234, r#"{"cmd":"get_info","id":2}"#);
    let data = &reply["data"];

    assert_eq!(data["name"], json!("AS7341 Nephelometer"));
    assert_eq!(data["uptime"], json!(1234));
    assert_eq!(data["hardware"]["chip"], json!("mock"));
    assert_eq!(data["sensor"]["type"], json!("AS7341"));
    assert_eq!(data["sensor"]["connected"], json!(true));
    assert!(data["sensor"]["config"].is_object());
}

#[test]
fn get_info_omits_config_without_sensor() {
    let mut rig = Rig::new();
    rig.sensor.connected = false;
    let reply = rig.request(0, r#"{"cmd":"get_info","id":2}"#);
    assert_eq!(reply["data"]["sensor"], json!({"type": "AS7341", "connected": false}));
}

// ── Sensor commands ───────────────────────────────────────────

#[test]
fn as7341_init_reports_failure_inside_success() {
    let mut rig = Rig::new();
    assert_eq!(
        rig.request(0, r#"{"cmd":"as7341_init","id":1}"#)["data"],
        json!({"initialized": true})
    );

    rig.sensor.connected = false;
    let reply = rig.request(0, r#"{"cmd":"as7341_init","id":2}"#);
    assert_eq!(reply["status"], json!(0));
    assert_eq!(reply["data"]["initialized"], json!(false));
    assert_eq!(reply["data"]["error"], json!("Failed to initialize AS7341"));
}

#[test]
fn as7341_config_replaces_bad_values_with_a_warning() {
    let mut rig = Rig::new();
    let reply = rig.request(
        0,
        r#"{"cmd":"as7341_config","id":5,"params":{"gain":42,"integration_time":200}}"#,
    );

    assert_eq!(reply["status"], json!(0));
    assert_eq!(reply["data"]["warning"], json!("Some configuration parameters were invalid"));
    assert_eq!(reply["data"]["gain"], json!(5));
    assert_eq!(reply["data"]["integration_time"], json!(200));
    assert!(rig.sensor.calls.contains(&SensorCall::Configure(SensorSettings {
        gain: 5,
        integration_time_ms: 200,
        led_current_ma: 10,
    })));
}

#[test]
fn as7341_config_without_sensor_is_an_execution_error() {
    let mut rig = Rig::new();
    rig.sensor.connected = false;
    let reply = rig.request(0, r#"{"cmd":"as7341_config","id":6,"params":{"gain":3}}"#);
    assert_eq!(reply["resp"], json!("error"));
    assert_eq!(reply["status"], json!(3));
}

#[test]
fn as7341_read_returns_all_channels() {
    let mut rig = Rig::new();
    let reply = rig.request(0, r#"{"cmd":"as7341_read","id":3}"#);
    assert_eq!(
        reply["data"],
        json!({
            "F1": 11, "F2": 22, "F3": 33, "F4": 44, "F5": 55, "F6": 66, "F7": 77, "F8": 88,
            "Clear": 900, "NIR": 12
        })
    );

    rig.sensor.failing_reads = 1;
    let reply = rig.request(0, r#"{"cmd":"as7341_read","id":4}"#);
    assert_eq!(reply["status"], json!(3));
    assert_eq!(reply["data"], json!("Failed to read spectral data"));
}

#[test]
fn as7341_led_clamps_current() {
    let mut rig = Rig::new();
    let reply = rig.request(
        0,
        r#"{"cmd":"as7341_led","id":1,"params":{"enabled":true,"current":50}}"#,
    );
    assert_eq!(
        reply["data"],
        json!({"current": 20, "type": "onboard", "enabled": true})
    );
    assert!(rig.sensor.calls.contains(&SensorCall::SetLed {
        enabled: true,
        current_ma: 20
    }));
}

#[test]
fn as7341_led_external_failure_is_reported() {
    let mut rig = Rig::new();
    let reply = rig.request(
        0,
        r#"{"cmd":"as7341_led","id":2,"params":{"enabled":true,"external":true}}"#,
    );
    assert_eq!(reply["status"], json!(3));
    assert_eq!(reply["data"], json!("Failed to control LED"));
}

// ── Streams ───────────────────────────────────────────────────

#[test]
fn stream_fires_immediately_then_on_interval() {
    let mut rig = Rig::new();
    rig.link
        .push_line(r#"{"cmd":"stream_start","id":1,"params":{"type":"as7341","interval_ms":100}}"#);
    rig.tick(0);

    let lines = rig.link.take_lines();
    assert_eq!(lines.len(), 2);
    assert_eq!(
        lines[0],
        r#"{"resp":"data","id":1,"status":0,"data":{"type":"as7341","interval_ms":100,"active":true}}"#
    );
    assert!(
        lines[1].starts_with(r#"{"data":true,"type":"as7341","timestamp":0,"data":{"F1":11,"#),
        "unexpected frame {}",
        lines[1]
    );

    rig.tick(50);
    rig.tick(99);
    assert!(rig.link.take_lines().is_empty());

    let summary = rig.tick(100);
    assert_eq!(summary.frames, 1);
    let frames = rig.link.take_json();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["timestamp"], json!(100));
    assert_eq!(frames[0]["data"]["NIR"], json!(12));
}

#[test]
fn failed_read_is_retried_next_tick() {
    let mut rig = Rig::new();
    rig.sensor.failing_reads = 1;
    let lines = rig.send(
        0,
        r#"{"cmd":"stream_start","id":1,"params":{"type":"as7341","interval_ms":100}}"#,
    );
    assert_eq!(lines.len(), 1, "only the reply, no frame");

    assert_eq!(rig.tick(1).frames, 1);
    assert_eq!(rig.link.take_json()[0]["timestamp"], json!(1));

    rig.tick(100);
    assert!(rig.link.take_lines().is_empty());
    rig.tick(101);
    assert_eq!(rig.link.take_json().len(), 1);
}

#[test]
fn stream_start_echoes_the_clamped_interval() {
    let mut rig = Rig::new();
    rig.sensor.connected = false;

    let reply = rig.request(0, r#"{"cmd":"stream_start","id":1,"params":{"type":"as7341","interval_ms":1}}"#);
    assert_eq!(reply["data"]["interval_ms"], json!(10));

    let reply = rig.request(
        0,
        r#"{"cmd":"stream_start","id":2,"params":{"type":"as7341","interval_ms":99999999}}"#,
    );
    assert_eq!(reply["data"]["interval_ms"], json!(60000));

    let reply = rig.request(0, r#"{"cmd":"stream_start","id":3,"params":{"type":"as7341"}}"#);
    assert_eq!(reply["data"]["interval_ms"], json!(100));

    let reply = rig.request(0, r#"{"cmd":"get_streams","id":4}"#);
    assert_eq!(
        reply["data"],
        json!({"count": 1, "streams": [{"type": "as7341", "interval_ms": 100}]})
    );
}

#[test]
fn malformed_stream_interval_is_clamped_not_defaulted() {
    let mut rig = Rig::new();
    rig.sensor.connected = false;

    let reply = rig.request(0, r#"{"cmd":"stream_start","id":1,"params":{"type":"as7341","interval_ms":-5}}"#);
    assert_eq!(reply["status"], json!(0));
    assert_eq!(reply["data"]["interval_ms"], json!(10));
    assert_eq!(rig.app.streams().interval_of("as7341"), Some(10));

    let reply = rig.request(0, r#"{"cmd":"stream_start","id":2,"params":{"type":"as7341","interval_ms":"500"}}"#);
    assert_eq!(reply["data"]["interval_ms"], json!(10));

    let reply = rig.request(0, r#"{"cmd":"stream_start","id":3,"params":{"type":"as7341","interval_ms":250.7}}"#);
    assert_eq!(reply["data"]["interval_ms"], json!(250));
    assert_eq!(rig.app.streams().interval_of("as7341"), Some(250));
}

#[test]
fn stream_cap_rejects_new_types_only() {
    let mut rig = Rig::new();
    rig.sensor.connected = false;
    for (id, ty) in ["a", "b", "c"].iter().enumerate() {
        let reply = rig.request(
            0,
            &format!(r#"{{"cmd":"stream_start","id":{id},"params":{{"type":"{ty}"}}}}"#),
        );
        assert_eq!(reply["data"]["active"], json!(true));
    }

    let reply = rig.request(0, r#"{"cmd":"stream_start","id":9,"params":{"type":"d"}}"#);
    assert_eq!(reply["status"], json!(0));
    assert_eq!(reply["data"]["active"], json!(false));
    assert_eq!(reply["data"]["error"], json!("Failed to start stream"));

    let reply = rig.request(0, r#"{"cmd":"stream_start","id":10,"params":{"type":"b","interval_ms":500}}"#);
    assert_eq!(reply["data"]["active"], json!(true));
    assert_eq!(rig.app.streams().len(), 3);
    assert_eq!(rig.app.streams().interval_of("b"), Some(500));
}

#[test]
fn stream_stop_reports_previous_state() {
    let mut rig = Rig::new();
    rig.sensor.connected = false;
    rig.request(0, r#"{"cmd":"stream_start","id":1,"params":{"type":"as7341"}}"#);

    let reply = rig.request(0, r#"{"cmd":"stream_stop","id":2,"params":{"type":"as7341"}}"#);
    assert_eq!(reply["data"], json!({"type": "as7341", "was_active": true}));
    let reply = rig.request(0, r#"{"cmd":"stream_stop","id":3,"params":{"type":"as7341"}}"#);
    assert_eq!(reply["data"], json!({"type": "as7341", "was_active": false}));
}

#[test]
fn stream_commands_require_a_type() {
    let mut rig = Rig::new();
    for cmd in ["stream_start", "stream_stop"] {
        let reply = rig.request(0, &format!(r#"{{"cmd":"{cmd}","id":1}}"#));
        assert_eq!(reply["resp"], json!("error"));
        assert_eq!(reply["status"], json!(2));
        assert_eq!(reply["data"], json!("Missing stream type"));
    }
    assert!(rig.app.streams().is_empty());
}

// ── Device ────────────────────────────────────────────────────

#[test]
fn reset_flushes_the_reply_before_restarting() {
    let j = journal();
    let mut rig = Rig::journaled(&j);
    rig.sensor.connected = false;
    rig.request(0, r#"{"cmd":"stream_start","id":1,"params":{"type":"as7341"}}"#);

    rig.link.push_line(r#"{"cmd":"reset","id":9}"#);
    rig.link.push_line(r#"{"cmd":"ping","id":10}"#);
    let summary = rig.tick(5);

    assert!(summary.restarted);
    assert_eq!(rig.system.restarts, 1);
    assert_eq!(
        rig.link.take_lines(),
        vec![r#"{"resp":"data","id":9,"status":0,"data":{"reset":true,"message":"Device will reset in 1 second"}}"#]
    );
    let events = j.borrow();
    assert_eq!(&events[events.len() - 2..], ["flush", "restart"]);
    assert!(rig.app.streams().is_empty());
    assert!(rig.sensor.calls.contains(&SensorCall::SetLed {
        enabled: false,
        current_ma: 0
    }));
}

#[test]
fn diagnostics_reports_each_subsystem() {
    let mut rig = Rig::new();
    let reply = rig.request(42, r#"{"cmd":"diagnostics","id":1}"#);
    let data = &reply["data"];
    assert_eq!(data["status"], json!("running"));
    assert_eq!(data["timestamp"], json!(42));
    assert_eq!(data["system"]["free_heap"], json!(123_456));
    assert_eq!(data["system"]["CPU_freq"], json!(160));
    assert_eq!(data["sensor"], json!({"connected": true, "status": "pass"}));
    assert_eq!(data["communication"]["serial"], json!("pass"));
    assert_eq!(data["result"], json!("pass"));

    rig.sensor.connected = false;
    let data = rig.request(43, r#"{"cmd":"diagnostics","id":2}"#)["data"].clone();
    assert_eq!(data["sensor"]["status"], json!("fail"));
    assert_eq!(data["result"], json!("pass"));
}

#[test]
fn diagnostics_fails_when_the_probe_faults() {
    let mut rig = Rig::new();
    rig.sensor.panic_on_probe = true;
    let reply = rig.request(0, r#"{"cmd":"diagnostics","id":1}"#);
    assert_eq!(reply["status"], json!(0));
    assert_eq!(reply["data"]["sensor"]["status"], json!("error"));
    assert_eq!(reply["data"]["result"], json!("fail"));
}

// ── Power ─────────────────────────────────────────────────────

#[test]
fn activity_and_idle_checks_reach_the_power_port() {
    let mut rig = Rig::new();
    rig.request(10, r#"{"cmd":"ping","id":1}"#);
    rig.tick(20);
    rig.link.push_line("garbage");
    rig.tick(30);

    assert_eq!(rig.power.activity, vec![10]);
    assert_eq!(rig.power.idle_checks, vec![20, 30]);
}
