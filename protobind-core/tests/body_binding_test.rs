use bytes::Bytes;
use common::{binder, field, message, request, string};
use http_body::{Body, Frame};
use protobind_core::binding::coerce_json;
use protobind_core::i18n::{LocaleHint, message_id};
use protobind_core::prost_reflect::{DynamicMessage, ReflectMessage, Value};
use protobind_core::{BindError, BinderConfig, ProtoBinder};
use serde_json::json;
use std::pin::Pin;
use std::task::{Context, Poll};

mod common;

fn update_doc(binder: &ProtoBinder) -> DynamicMessage {
    message(binder, "odoc.doc.UpdateDocRequest")
}

fn coerced(name: &str, body: serde_json::Value) -> serde_json::Value {
    let pool = fixture_protos::descriptor_pool();
    let descriptor = pool.get_message_by_name(name).expect("Message not found");
    let bytes = coerce_json(body.to_string().as_bytes(), &descriptor).expect("Coercion failed");
    serde_json::from_slice(&bytes).unwrap()
}

#[test]
fn test_string_and_native_numbers_bind_identically() {
    let binder = binder();

    let mut quoted = update_doc(&binder);
    binder
        .bind_proto(
            &request("/docs", r#"{"serviceId":"S1","name":"Paper","docId":"42","starred":"true","score":"1.5"}"#),
            &mut quoted,
        )
        .expect("Binding failed");

    let mut native = update_doc(&binder);
    binder
        .bind_proto(
            &request("/docs", r#"{"serviceId":"S1","name":"Paper","docId":42,"starred":true,"score":1.5}"#),
            &mut native,
        )
        .expect("Binding failed");

    assert_eq!(quoted, native);
    assert_eq!(field(&native, "doc_id"), Value::U64(42));
    assert_eq!(field(&native, "starred"), Value::Bool(true));
}

#[test]
fn test_unsigned_leading_zeros() {
    let body = coerced(
        "odoc.doc.UpdateDocRequest",
        json!({ "docId": "007", "folderId": "-12" }),
    );
    assert_eq!(body, json!({ "docId": 7, "folderId": -12 }));

    let body = coerced("odoc.doc.UpdateDocRequest", json!({ "doc_id": "000" }));
    assert_eq!(body, json!({ "doc_id": 0 }));
}

#[test]
fn test_unparseable_strings_are_left_alone() {
    let body = coerced(
        "odoc.doc.UpdateDocRequest",
        json!({ "docId": "abc", "starred": "yes", "score": "NaN", "name": "42" }),
    );
    assert_eq!(
        body,
        json!({ "docId": "abc", "starred": "yes", "score": "NaN", "name": "42" })
    );
}

#[test]
fn test_nested_messages_lists_and_maps_are_coerced() {
    let body = coerced(
        "odoc.note.ListNotesRequest",
        json!({
            "ids": ["1", 2, "x"],
            "flags": ["t", "0"],
            "weights": { "a": "3" },
            "tagIdList": { "a": "3" },
            "anchor": { "page": "0012" },
        }),
    );

    assert_eq!(
        body,
        json!({
            "ids": [1, 2, "x"],
            "flags": [true, false],
            "weights": { "a": 3 },
            "tagIdList": { "a": "3" },
            "anchor": { "page": 12 },
        })
    );
}

#[test]
fn test_repeated_message_items_get_defaults() {
    let body = coerced(
        "odoc.doc.UpdateDocRequest",
        json!({ "authors": [{ "name": "Ada", "order": "01" }, { "weight": "0.5" }] }),
    );

    assert_eq!(
        body,
        json!({
            "authors": [
                { "name": "Ada", "order": 1, "weight": 0.0, "corresponding": false, "affiliation": "" },
                { "name": "", "order": 0, "weight": 0.5, "corresponding": false, "affiliation": "" },
            ]
        })
    );
}

#[test]
fn test_defaults_skip_oneof_members() {
    let body = coerced(
        "odoc.note.CreateNoteRequest",
        json!({ "marks": [{ "markId": "m1", "hex": "#fff" }] }),
    );

    assert_eq!(
        body,
        json!({
            "marks": [{
                "markId": "m1",
                "hex": "#fff",
                "page": 0,
                "x": 0.0,
                "visible": false,
                "note": "",
            }]
        })
    );
}

#[test]
fn test_body_merges_into_prepopulated_target() {
    let binder = binder();
    let mut msg = update_doc(&binder);
    msg.set_field_by_name("service_id", Value::String("S1".to_string()));

    let err = binder
        .bind_proto(&request("/docs", r#"{"name":"x"}"#), &mut msg)
        .expect_err("A one character name is too short");

    // Binding happened in place; validation then rejected the short name.
    assert_eq!(string(&msg, "service_id"), "S1");
    assert_eq!(string(&msg, "name"), "x");
    match err {
        BindError::Validation(err) => assert_eq!(err.message_id(), message_id::MIN_LENGTH),
        other => panic!("Expected Validation error, got {other:?}"),
    }

    let mut msg = update_doc(&binder);
    msg.set_field_by_name("service_id", Value::String("S1".to_string()));
    binder
        .bind_proto(&request("/docs", r#"{"name":"xy"}"#), &mut msg)
        .expect("Binding failed");
    assert_eq!(string(&msg, "service_id"), "S1");
    assert_eq!(string(&msg, "name"), "xy");
}

#[test]
fn test_query_values_survive_absent_body_fields() {
    let binder = binder();
    let mut msg = update_doc(&binder);

    binder
        .bind_proto(
            &request("/docs?service_id=S2&docId=9", r#"{"name":"Paper","unknownField":1}"#),
            &mut msg,
        )
        .expect("Binding failed");

    assert_eq!(string(&msg, "service_id"), "S2");
    assert_eq!(field(&msg, "doc_id"), Value::U64(9));
    assert_eq!(string(&msg, "name"), "Paper");
}

#[test]
fn test_binding_is_idempotent() {
    let binder = binder();
    let req = request(
        "/docs?tagIdList%5Ba%5D=1",
        r#"{"serviceId":"S1","name":"Paper","authors":[{"name":"Ada"}],"publishedAt":"2024-05-01T08:00:00Z"}"#,
    );

    let mut first = update_doc(&binder);
    let mut second = update_doc(&binder);
    binder.bind_proto(&req, &mut first).expect("Binding failed");
    binder.bind_proto(&req, &mut second).expect("Binding failed");

    assert_eq!(first, second);
    assert!(first.has_field_by_name("published_at"));
}

#[test]
fn test_invalid_json_is_an_unmarshal_error() {
    let binder = binder();
    let mut msg = update_doc(&binder);

    let err = binder
        .bind_proto(&request("/docs", r#"{"serviceId": "#), &mut msg)
        .expect_err("Broken JSON must fail");
    assert!(matches!(err, BindError::Unmarshal(_)));

    // Not an object: coercion falls back to the raw body, which the decoder rejects.
    let err = binder
        .bind_proto(&request("/docs", "[1,2]"), &mut msg)
        .expect_err("An array body must fail");
    assert!(matches!(err, BindError::Unmarshal(_)));

    // A type mismatch surfaces the decoder message unchanged.
    let err = binder
        .bind_proto(&request("/docs", r#"{"docId":"abc"}"#), &mut msg)
        .expect_err("A non-numeric id must fail");
    let BindError::Unmarshal(inner) = &err else {
        panic!("Expected Unmarshal error, got {err:?}");
    };
    assert_eq!(err.to_string(), inner.to_string());
}

#[test]
fn test_empty_body_is_still_validated() {
    let binder = binder();
    let mut msg = update_doc(&binder);

    let err = binder
        .bind_proto(&request("/docs", ""), &mut msg)
        .expect_err("service_id is required");

    let BindError::Validation(err) = err else {
        panic!("Expected Validation error");
    };
    assert_eq!(err.message_id(), message_id::REQUIRED);
}

#[test]
fn test_bind_json_ignores_the_query_string() {
    let binder = binder();
    let mut msg = update_doc(&binder);

    binder
        .bind_json(
            br#"{"service_id":"S3","name":"Notes","score":"2"}"#,
            &mut msg,
            &LocaleHint::default(),
        )
        .expect("Binding failed");

    assert_eq!(string(&msg, "service_id"), "S3");
    assert_eq!(field(&msg, "score"), Value::F64(2.0));
}

#[tokio::test]
async fn test_bind_buffers_the_body_for_downstream_reads() {
    let binder = binder();
    let mut msg = update_doc(&binder);
    let body = r#"{"serviceId":"S1","name":"Paper"}"#;

    let req = http::Request::builder()
        .uri("/docs?docId=3")
        .body(body.to_string())
        .unwrap();

    let req = binder.bind(req, &mut msg).await.expect("Binding failed");

    assert_eq!(req.body(), &Bytes::from(body));
    assert_eq!(req.uri().query(), Some("docId=3"));
    assert_eq!(field(&msg, "doc_id"), Value::U64(3));
    assert_eq!(string(&msg, "name"), "Paper");
}

#[tokio::test]
async fn test_bind_with_request_body_logging() {
    let config = BinderConfig::from_json(
        r#"{"debug":{"enableRequestLogging":true,"logRequestBody":true,"maxRequestBodySize":4}}"#,
    )
    .expect("Config must parse");
    let binder = ProtoBinder::builder(fixture_protos::descriptor_pool())
        .config(config)
        .build()
        .expect("Failed to build binder");
    let mut msg = update_doc(&binder);
    let body = r#"{"serviceId":"S1","name":"Paper"}"#;

    let req = http::Request::builder()
        .uri("/docs?docId=3")
        .header("x-forwarded-for", "1.2.3.4, 10.0.0.1")
        .body(body.to_string())
        .unwrap();

    let req = binder.bind(req, &mut msg).await.expect("Binding failed");

    assert!(binder.config().debug.log_request_body);
    assert_eq!(binder.config().debug.body_limit(), 4);
    assert_eq!(req.body(), &Bytes::from(body));
    assert_eq!(string(&msg, "name"), "Paper");
}

struct BrokenBody;

impl Body for BrokenBody {
    type Data = Bytes;
    type Error = std::io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Poll::Ready(Some(Err(std::io::Error::other("connection reset"))))
    }
}

#[tokio::test]
async fn test_body_read_failure_is_propagated() {
    let binder = binder();
    let mut msg = update_doc(&binder);
    let req = http::Request::builder().uri("/docs").body(BrokenBody).unwrap();

    let err = binder
        .bind(req, &mut msg)
        .await
        .expect_err("Reading must fail");

    assert!(err.request.is_none());
    match err.error {
        BindError::BodyRead(source) => assert_eq!(source.to_string(), "connection reset"),
        other => panic!("Expected BodyRead error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rejected_request_keeps_its_body() {
    let binder = binder();
    let mut msg = update_doc(&binder);
    let body = r#"{"serviceId":"S1","name":"x"}"#;

    let req = http::Request::builder()
        .uri("/docs?docId=3")
        .header("x-real-ip", "10.0.0.9")
        .body(body.to_string())
        .unwrap();

    let err = binder
        .bind(req, &mut msg)
        .await
        .expect_err("A one character name is too short");

    let (req, err) = err.into_parts();
    match err {
        BindError::Validation(err) => assert_eq!(err.message_id(), message_id::MIN_LENGTH),
        other => panic!("Expected Validation error, got {other:?}"),
    }

    let req = req.expect("The buffered request must be returned");
    assert_eq!(req.body(), &Bytes::from(body));
    assert_eq!(req.uri().query(), Some("docId=3"));
    assert_eq!(req.headers()["x-real-ip"], "10.0.0.9");

    // Unmarshal failures hand the request back as well.
    let req = http::Request::builder()
        .uri("/docs")
        .body("{broken".to_string())
        .unwrap();
    let err = binder
        .bind(req, &mut update_doc(&binder))
        .await
        .expect_err("Broken JSON must fail");
    assert!(matches!(err.error, BindError::Unmarshal(_)));
    assert_eq!(
        err.request.expect("The buffered request must be returned").body(),
        &Bytes::from("{broken")
    );
}

#[test]
fn test_bind_message_with_generated_types() {
    let binder = binder();
    let mut timestamp = prost_types::Timestamp {
        seconds: 10,
        nanos: 0,
    };

    binder
        .bind_message(&request("/ts?nanos=5", ""), &mut timestamp)
        .expect("Binding failed");
    assert_eq!(timestamp.seconds, 10);
    assert_eq!(timestamp.nanos, 5);

    assert_eq!(
        timestamp.descriptor().full_name(),
        "google.protobuf.Timestamp"
    );
}
