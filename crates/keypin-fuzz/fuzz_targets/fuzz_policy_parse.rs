#![no_main]
use keypin_core::{ConfigurationStore, Policy};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let store = ConfigurationStore::default();
    let before = store.current();

    match Policy::parse(data) {
        Ok(policy) => {
            // Accepted policies re-serialize to something that parses back equal.
            let canonical = policy.to_json().expect("serialize accepted policy");
            let reparsed = Policy::parse(canonical.as_bytes()).expect("reparse canonical policy");
            assert_eq!(reparsed, policy);
            assert!(store.refresh(data).is_ok());
        }
        Err(_) => {
            // A rejected document never disturbs the active policy.
            assert!(store.refresh(data).is_err());
            assert!(std::sync::Arc::ptr_eq(&before, &store.current()));
        }
    }
});
