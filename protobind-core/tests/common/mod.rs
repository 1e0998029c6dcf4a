#![allow(dead_code)]

use bytes::Bytes;
use http::Request;
use protobind_core::ProtoBinder;
use protobind_core::prost_reflect::{DynamicMessage, Value};

pub fn binder() -> ProtoBinder {
    ProtoBinder::builder(fixture_protos::descriptor_pool())
        .build()
        .expect("Failed to build binder")
}

pub fn message(binder: &ProtoBinder, name: &str) -> DynamicMessage {
    binder.new_message(name).expect("Message not found")
}

pub fn request(uri: &str, body: &str) -> Request<Bytes> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Bytes::from(body.to_string()))
        .expect("Failed to build request")
}

pub fn field(message: &DynamicMessage, name: &str) -> Value {
    message
        .get_field_by_name(name)
        .expect("Field not found")
        .into_owned()
}

pub fn string(message: &DynamicMessage, name: &str) -> String {
    match field(message, name) {
        Value::String(s) => s,
        other => panic!("Expected string for '{name}', got {other:?}"),
    }
}
