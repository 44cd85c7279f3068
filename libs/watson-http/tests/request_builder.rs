#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Request builder behaviour through the public API.

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http_body_util::{BodyExt, Full};
use serde_json::json;
use std::io::Cursor;
use watson_http::{
    BodyContent, BuildError, FormContents, Method, RequestBuilder, is_json_mime_type,
    is_json_patch_mime_type,
};

const NO_PARAMS: &[&str] = &[];

async fn body_of(request: http::Request<Full<Bytes>>) -> Bytes {
    request.into_body().collect().await.unwrap().to_bytes()
}

#[test]
fn url_pairs_segments_with_parameters() {
    let request = RequestBuilder::new(Method::Post)
        .construct_url(
            "https://host/api",
            &["v1/workspaces", "message"],
            &["xxxxx"],
        )
        .unwrap()
        .build()
        .unwrap();
    assert_eq!(
        request.uri().to_string(),
        "https://host/api/v1/workspaces/xxxxx/message"
    );
}

#[test]
fn url_with_more_parameters_than_segments_ignores_the_extra() {
    let request = RequestBuilder::new(Method::Get)
        .construct_url("https://host/api", &["v1/models"], &["en-US", "unused"])
        .unwrap()
        .build()
        .unwrap();
    assert_eq!(request.uri().to_string(), "https://host/api/v1/models/en-US");
}

#[test]
fn relative_base_is_rejected() {
    let err = RequestBuilder::new(Method::Get)
        .construct_url("/api", &["v1"], NO_PARAMS)
        .unwrap_err();
    assert!(matches!(err, BuildError::InvalidUrl { .. }));
}

#[test]
fn mime_classification() {
    assert!(is_json_mime_type("application/json"));
    assert!(is_json_mime_type("APPLICATION/JSON;charset=utf-8"));
    assert!(is_json_mime_type("application/merge-patch+json"));
    assert!(!is_json_mime_type("application/json-patch+json"));
    assert!(is_json_patch_mime_type("application/json-patch+json"));
    assert!(!is_json_mime_type(""));
    assert!(!is_json_mime_type("json"));
}

#[tokio::test]
async fn later_body_setter_replaces_earlier_one() {
    let request = RequestBuilder::new(Method::Post)
        .construct_url("https://host/api", &["v1/synthesize"], NO_PARAMS)
        .unwrap()
        .set_body_content_string("first")
        .set_body_content_json(&json!({"text": "second"}))
        .unwrap()
        .build()
        .unwrap();
    assert_eq!(&body_of(request).await[..], br#"{"text":"second"}"#);
}

#[tokio::test]
async fn text_for_json_content_type_is_json_encoded() {
    let request = RequestBuilder::new(Method::Post)
        .construct_url("https://host/api", &["v1/tone"], NO_PARAMS)
        .unwrap()
        .set_body_content("application/json", BodyContent::Text("I am happy".to_owned()))
        .unwrap()
        .build()
        .unwrap();
    assert_eq!(&body_of(request).await[..], br#""I am happy""#);
}

#[tokio::test]
async fn stream_for_json_content_type_is_sent_as_is() {
    let request = RequestBuilder::new(Method::Post)
        .construct_url("https://host/api", &["v1/tone"], NO_PARAMS)
        .unwrap()
        .set_body_content(
            "application/json",
            BodyContent::Stream(Box::new(Cursor::new(br#"{"pre":"encoded"}"#.to_vec()))),
        )
        .unwrap()
        .build()
        .unwrap();
    assert_eq!(&body_of(request).await[..], br#"{"pre":"encoded"}"#);
}

#[test]
fn number_for_plain_content_type_is_rejected() {
    let err = RequestBuilder::new(Method::Post)
        .set_body_content("text/plain", BodyContent::Json(json!(42)))
        .unwrap_err();
    assert!(
        matches!(err, BuildError::UnsupportedBody { ref type_name, .. } if type_name == "number")
    );
}

#[tokio::test]
async fn two_form_fields_make_two_parts() {
    let request = RequestBuilder::new(Method::Post)
        .construct_url("https://host/api", &["v3/classify"], NO_PARAMS)
        .unwrap()
        .add_query("version", "2018-03-19")
        .add_form_data("threshold", None, None, "0.6")
        .add_form_data(
            "images_file",
            Some("kitten.png"),
            Some("image/png"),
            FormContents::Stream(Box::new(Cursor::new(vec![0x89, b'P', b'N', b'G']))),
        )
        .build()
        .unwrap();

    assert_eq!(request.uri().query(), Some("version=2018-03-19"));
    let content_type = request.headers()[CONTENT_TYPE].to_str().unwrap().to_owned();
    let boundary = content_type
        .strip_prefix("multipart/form-data; boundary=")
        .expect("multipart content type");

    let body = body_of(request).await;
    let text = String::from_utf8_lossy(&body);
    assert_eq!(text.matches(&format!("--{boundary}\r\n")).count(), 2);
    assert!(text.contains("Content-Disposition: form-data; name=\"threshold\"\r\n\r\n0.6\r\n"));
    assert!(text.contains(
        "Content-Disposition: form-data; name=\"images_file\"; filename=\"kitten.png\"\r\nContent-Type: image/png\r\n\r\n"
    ));
    assert!(text.ends_with(&format!("--{boundary}--\r\n")));
}

#[tokio::test]
async fn same_field_name_appends_parts() {
    let request = RequestBuilder::new(Method::Post)
        .construct_url("https://host/api", &["v1/collections"], NO_PARAMS)
        .unwrap()
        .add_form_data("file", Some("a.txt"), None, "A")
        .add_form_data("file", Some("b.txt"), None, "B")
        .build()
        .unwrap();

    let body = body_of(request).await;
    let text = String::from_utf8_lossy(&body);
    assert_eq!(text.matches("name=\"file\"").count(), 2);
    assert_eq!(text.matches("Content-Type: application/octet-stream").count(), 2);
}
