//! JSON test vector loader shared by wire codec tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(dead_code)]

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct TestVector {
    pub description: String,
    #[serde(default)]
    pub allow_native: bool,
    pub frame: FrameData,
    pub expect: ExpectMessage,
    #[serde(default)]
    pub expect_error: Option<ExpectError>,
}

#[derive(Debug, Deserialize)]
pub struct ExpectMessage {
    #[serde(default)]
    pub wait: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub room: String,
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub body_hex: Option<String>,
    #[serde(default)]
    pub is_noop: bool,
    #[serde(default)]
    pub is_native: bool,
    #[serde(default)]
    pub is_invalid: bool,
}

impl ExpectMessage {
    pub fn body_bytes(&self) -> Vec<u8> {
        match (&self.body, &self.body_hex) {
            (_, Some(h)) => hex::decode(h).expect("invalid hex body in test vector"),
            (Some(s), None) => s.as_bytes().to_vec(),
            (None, None) => Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ExpectError {
    pub code: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FrameData {
    pub encoding: String,
    pub data: String,
}

impl FrameData {
    pub fn decode(&self) -> Vec<u8> {
        match self.encoding.as_str() {
            "utf8" => self.data.as_bytes().to_vec(),
            "base64" => base64::decode(&self.data).expect("invalid base64 in test vector"),
            "hex" => hex::decode(&self.data).expect("invalid hex in test vector"),
            other => panic!("unsupported encoding: {other}"),
        }
    }
}
