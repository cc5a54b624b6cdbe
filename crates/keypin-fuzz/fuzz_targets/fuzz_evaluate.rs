#![no_main]
use std::sync::Arc;

use keypin_core::{
    BuiltinPins, ConfigurationStore, EngineConfig, EvaluationRequest, NullSink, PinEvaluator,
    PublicKeyHash, Verdict,
};
use libfuzzer_sys::fuzz_target;

const POLICY: &str = r#"{
  "version": 1,
  "enabled": true,
  "hosts": {
    "api.example.com": {
      "enabled": true,
      "pins": {
        "primary": "AQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQE=",
        "backup": ["AgICAgICAgICAgICAgICAgICAgICAgICAgICAgICAgI="]
      },
      "rollout_percentage": 50
    }
  },
  "rollout_strategy": { "percentage": 100 }
}"#;

// Layout: [host_len, host bytes.., id_len, id bytes.., 32-byte hashes..]
fuzz_target!(|data: &[u8]| {
    let Some((&host_len, rest)) = data.split_first() else {
        return;
    };
    let (host, rest) = rest.split_at(usize::from(host_len).min(rest.len()));
    let Some((&id_len, rest)) = rest.split_first() else {
        return;
    };
    let (id, rest) = rest.split_at(usize::from(id_len).min(rest.len()));

    let host = String::from_utf8_lossy(host);
    let id = String::from_utf8_lossy(id);
    let observed: Vec<PublicKeyHash> = rest
        .chunks_exact(32)
        .filter_map(|chunk| <[u8; 32]>::try_from(chunk).ok())
        .map(PublicKeyHash::from_bytes)
        .collect();

    let store = Arc::new(ConfigurationStore::default());
    store.refresh(POLICY.as_bytes()).expect("fixed policy parses");
    let evaluator = PinEvaluator::new(
        store,
        Arc::new(BuiltinPins::new()),
        Arc::new(NullSink),
        EngineConfig::default(),
    );
    let request = EvaluationRequest::new(&host, &observed).client_id(&id);
    let result = evaluator.evaluate(&request);

    // A match always names a pin the observed chain actually contained.
    if result.verdict == Verdict::PinMatch {
        let matched = result.matched_pin.expect("match carries its pin");
        assert!(observed.contains(&matched));
    } else {
        assert!(result.matched_pin.is_none());
    }
    if observed.is_empty() {
        assert_ne!(result.verdict, Verdict::PinMatch);
    }
});
