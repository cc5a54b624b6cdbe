//! Shared fixtures for the keypin benchmarks.

use keypin_core::PublicKeyHash;

/// Hosts in the synthetic benchmark policy.
pub const BENCH_HOSTS: usize = 64;

#[must_use]
pub fn pin(byte: u8) -> PublicKeyHash {
    PublicKeyHash::from_bytes([byte; 32])
}

#[must_use]
pub fn host_name(index: usize) -> String {
    format!("h{index}.bench.example.com")
}

/// A policy with `hosts` pinned hosts at 100% rollout, serialized as JSON.
///
/// Host `i` pins `pin(i)` as primary and `pin(i + 1)` as backup.
#[must_use]
pub fn policy_json(version: u64, hosts: usize) -> String {
    let entries: Vec<String> = (0..hosts)
        .map(|i| {
            let primary = pin(i as u8).to_base64();
            let backup = pin((i as u8).wrapping_add(1)).to_base64();
            format!(
                r#""{}":{{"enabled":true,"pins":{{"primary":"{primary}","backup":["{backup}"]}},"rollout_percentage":100}}"#,
                host_name(i)
            )
        })
        .collect();
    format!(
        r#"{{"version":{version},"enabled":true,"min_app_version":"1.0.0","hosts":{{{}}},"rollout_strategy":{{"percentage":100}}}}"#,
        entries.join(",")
    )
}
