// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn device_list_parses_serials_and_states() {
    let output = "List of devices attached\n\
                  R58M41ABC\tdevice\n\
                  192.168.1.40:5555\tdevice\n\
                  emulator-5554\toffline\n\n";
    let devices = parse_device_list(output);
    assert_eq!(devices.len(), 3);
    assert_eq!(devices[0], AdbDevice { serial: "R58M41ABC".into(), state: "device".into() });
    assert_eq!(devices[2].state, "offline");
}

#[test]
fn empty_device_list() {
    assert!(parse_device_list("List of devices attached\n\n").is_empty());
}

#[test]
fn battery_parses_level_and_charging() {
    let output = "Current Battery Service state:\n  AC powered: false\n  status: 2\n  level: 87\n  scale: 100\n";
    assert_eq!(parse_battery(output), (87, true));

    let discharging = "  status: 3\n  level: 42\n";
    assert_eq!(parse_battery(discharging), (42, false));

    let full = "  status: 5\n  level: 100\n";
    assert_eq!(parse_battery(full), (100, true));
}

#[test]
fn battery_defaults_on_garbage() {
    assert_eq!(parse_battery("no battery here"), (0, false));
}

#[test]
fn wifi_ip_parses_first_inet() {
    let output = "30: wlan0: <BROADCAST,MULTICAST,UP>\n    inet 192.168.1.101/24 brd 192.168.1.255 scope global wlan0\n    inet6 fe80::1/64 scope link\n";
    assert_eq!(parse_wifi_ip(output), Some("192.168.1.101".to_owned()));
    assert_eq!(parse_wifi_ip("no addresses"), None);
}

#[test]
fn version_name_parses_from_dumpsys() {
    let output = "    userId=10234\n    versionCode=1541239232\n    versionName=19.05.36 minSdk=26\n";
    assert_eq!(parse_version_name(output), Some("19.05.36".to_owned()));
    assert_eq!(parse_version_name("nothing"), None);
}

#[test]
fn package_list_strips_prefixes() {
    let output = "package:com.google.android.youtube\npackage:org.autojs.autoxjs.v6\n";
    assert_eq!(
        parse_package_list(output),
        vec!["com.google.android.youtube".to_owned(), "org.autojs.autoxjs.v6".to_owned()]
    );
}

#[tokio::test]
async fn inspect_device_combines_shell_probes() {
    let adb = fake::FakeAdb::new();
    adb.set_shell_response("getprop ro.product.model", "SM-G960N\n");
    adb.set_shell_response("getprop ro.build.version.release", "10\n");
    adb.set_shell_response("dumpsys battery", "  status: 2\n  level: 63\n");
    adb.set_shell_response("ip addr show wlan0", "    inet 192.168.1.101/24 brd\n");

    let facts = inspect_device(adb.as_ref(), "R58M41ABC").await;
    assert_eq!(facts.model.as_deref(), Some("SM-G960N"));
    assert_eq!(facts.os_version.as_deref(), Some("10"));
    assert_eq!(facts.battery_level, Some(63));
    assert!(facts.charging);
    assert_eq!(facts.wifi_ip.as_deref(), Some("192.168.1.101"));
}
