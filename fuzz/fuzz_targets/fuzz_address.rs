// SPDX-License-Identifier: AGPL-3.0-or-later
//! Fuzz target for address parsing and joining

#![no_main]

use arbitrary::Arbitrary;
use cloudfs_core::Address;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input<'a> {
    raw: &'a str,
    name: &'a str,
}

fuzz_target!(|input: Input<'_>| {
    let Ok(addr) = Address::parse(input.raw) else {
        return;
    };

    // Display must parse back to the same address
    let reparsed = Address::parse(&addr.to_string()).expect("display output must parse");
    assert_eq!(reparsed, addr);

    assert!(!addr.key().starts_with('/'));
    let _ = addr.name();
    let _ = addr.extension();
    let _ = addr.local_path();

    if let Some(parent) = addr.parent() {
        assert!(parent.is_dir_like());
        assert!(parent.key().len() < addr.key().len());
    }

    if let Ok(child) = addr.join(input.name) {
        assert_eq!(child.parent().map(|p| p.key().to_string()), Some(addr.dir_prefix()));
        assert!(child.key().starts_with(&addr.dir_prefix()));
    }
});
