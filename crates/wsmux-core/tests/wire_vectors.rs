//! Wire codec vector tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::fs;

use bytes::Bytes;

use wsmux_core::protocol::wire::{deserialize, serialize};

mod vector_loader;
use vector_loader::TestVector;

fn load(name: &str) -> TestVector {
    let s = fs::read_to_string(format!("tests/vectors/{name}")).unwrap();
    serde_json::from_str(&s).unwrap()
}

const FILES: [&str; 12] = [
    "wire_event.json",
    "wire_body_separators.json",
    "wire_escaped_names.json",
    "wire_bad_namespace.json",
    "wire_bad_room.json",
    "wire_remote_error.json",
    "wire_noop.json",
    "wire_short_invalid.json",
    "wire_short_native.json",
    "wire_empty_native.json",
    "wire_binary_body.json",
    "wire_native_binary.json",
];

#[test]
fn wire_vectors() {
    for f in FILES {
        let v = load(f);
        let raw = v.frame.decode();
        let msg = deserialize(Bytes::from(raw), v.allow_native);
        let ex = &v.expect;

        assert_eq!(msg.is_invalid, ex.is_invalid, "vector={}", v.description);
        if ex.is_invalid {
            continue;
        }

        assert_eq!(msg.wait, ex.wait, "vector={}", v.description);
        assert_eq!(msg.namespace, ex.namespace, "vector={}", v.description);
        assert_eq!(msg.room, ex.room, "vector={}", v.description);
        assert_eq!(msg.event, ex.event, "vector={}", v.description);
        assert_eq!(msg.is_noop, ex.is_noop, "vector={}", v.description);
        assert_eq!(msg.is_native, ex.is_native, "vector={}", v.description);
        assert_eq!(msg.body.as_ref(), ex.body_bytes().as_slice(), "vector={}", v.description);

        match &v.expect_error {
            Some(err) => {
                let e = msg.err.as_ref().expect("expected error");
                assert_eq!(e.code().as_str(), err.code, "vector={}", v.description);
                if let Some(text) = &err.text {
                    assert_eq!(&e.to_string(), text, "vector={}", v.description);
                }
            }
            None => assert!(msg.err.is_none(), "vector={}", v.description),
        }
    }
}

#[test]
fn structured_vectors_reencode_verbatim() {
    // Canonical frames (flags as 0/1, no native) encode back byte-for-byte.
    for f in FILES {
        let v = load(f);
        if v.expect.is_invalid || v.expect.is_native {
            continue;
        }
        let raw = v.frame.decode();
        let msg = deserialize(Bytes::from(raw.clone()), false);
        assert_eq!(serialize(&msg).as_ref(), raw.as_slice(), "vector={}", v.description);
    }
}
