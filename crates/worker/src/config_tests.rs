// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;

use super::Config;

fn parse(args: &[&str]) -> Config {
    Config::parse_from(args)
}

#[test]
fn defaults_validate() -> anyhow::Result<()> {
    let config = parse(&["farm-worker"]);
    config.validate()?;
    assert_eq!(config.host_number, "HOST01");
    assert_eq!(config.effective_queue(), "host01");
    assert_eq!(config.max_concurrent, 5);
    assert_eq!(config.service_port_start, 8200);
    assert_eq!(config.service_port_end, 8300);
    Ok(())
}

#[test]
fn explicit_queue_wins() {
    let config = parse(&["farm-worker", "--host-number", "HOST07", "--queue", "special"]);
    assert_eq!(config.effective_queue(), "special");
}

#[test]
fn queue_derives_from_host_number() {
    let config = parse(&["farm-worker", "--host-number", "HOST12"]);
    assert_eq!(config.effective_queue(), "host12");
}

#[test]
fn empty_port_range_rejected() {
    let config = parse(&[
        "farm-worker",
        "--service-port-start",
        "8300",
        "--service-port-end",
        "8300",
    ]);
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("port range"), "unexpected error: {err}");
}

#[test]
fn zero_concurrency_rejected() {
    let config = parse(&["farm-worker", "--max-concurrent", "0"]);
    assert!(config.validate().is_err());
}
