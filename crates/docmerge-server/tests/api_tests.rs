//! Handler tests: base64 DOCX in, JSON envelope out

use axum::body::Bytes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use docmerge_server::{detect_fields, merge_document};
use serde_json::{json, Value};
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;
const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"/>"#;

fn build_docx(paragraphs: &str) -> Vec<u8> {
    let document = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{paragraphs}</w:body></w:document>"#
    );
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in [
        ("[Content_Types].xml", CONTENT_TYPES),
        ("_rels/.rels", ROOT_RELS),
        ("word/document.xml", document.as_str()),
    ] {
        zip.start_file(name, SimpleFileOptions::default()).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

fn letter_b64() -> String {
    STANDARD.encode(build_docx(
        "<w:p><w:r><w:t>Dear «Name»,</w:t></w:r></w:p><w:p><w:r><w:t>Balance: «Amount»</w:t></w:r></w:p>",
    ))
}

fn body(value: &Value) -> Bytes {
    Bytes::from(serde_json::to_vec(value).unwrap())
}

async fn into_json(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn detect(request: Bytes) -> (StatusCode, Value) {
    into_json(detect_fields(request).await.into_response()).await
}

async fn merge(request: Bytes) -> (StatusCode, Value) {
    into_json(merge_document(request).await.into_response()).await
}

fn merged_document_xml(encoded: &str) -> String {
    let bytes = STANDARD.decode(encoded).unwrap();
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .unwrap()
        .read_to_string(&mut xml)
        .unwrap();
    xml
}

#[tokio::test]
async fn test_detect_fields() {
    let (status, json) = detect(body(&json!({ "docx": letter_b64() }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["fields"], json!(["Name", "Amount"]));
    assert_eq!(json["count"], 2);
    assert_eq!(json["data_template"], json!({ "Amount": "", "Name": "" }));
}

#[tokio::test]
async fn test_detect_input_errors() {
    let (status, json) = detect(Bytes::from_static(b"{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json, json!({ "error": "Invalid input" }));

    let (status, json) = detect(body(&json!({ "docx": "" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "'docx' key missing");

    let (_, json) = detect(body(&json!({ "docx": "%%%" }))).await;
    assert_eq!(json["error"], "Failed to decode base64 input");

    let (status, json) = detect(body(&json!({ "docx": STANDARD.encode(b"plain text") }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Input is not a ZIP archive");
}

#[tokio::test]
async fn test_detect_not_a_document() {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    zip.start_file("readme.txt", SimpleFileOptions::default())
        .unwrap();
    zip.write_all(b"hello").unwrap();
    let bytes = zip.finish().unwrap().into_inner();

    let (status, json) = detect(body(&json!({ "docx": STANDARD.encode(bytes) }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["error"].as_str().unwrap().contains("Not a valid DOCX document"));
}

#[tokio::test]
async fn test_merge_success() {
    let request = format!(
        r#"{{"docx": "{}", "data": {{"Name": "Ada", "Amount": "12.50", "name": "Grace"}}}}"#,
        letter_b64()
    );
    let (status, json) = merge(Bytes::from(request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 2);
    assert_eq!(json["validation"]["valid"], true);
    assert_eq!(
        json["validation"]["warnings"],
        json!(["Duplicate key 'name' detected in JSON data (first occurrence kept)"])
    );
    assert_eq!(json["merge_data"], json!({ "Name": "Ada", "Amount": "12.50" }));
    assert_eq!(json["skipped_fields"], json!([]));

    let xml = merged_document_xml(json["docx"].as_str().unwrap());
    assert!(xml.contains("Dear Ada,"));
    assert!(xml.contains("Balance: 12.50"));
    assert!(!xml.contains("Grace"));
}

#[tokio::test]
async fn test_merge_reports_skipped_fields() {
    let (status, json) = merge(body(&json!({ "docx": letter_b64(), "data": { "Name": "Ada" } }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["skipped_fields"], json!(["Amount"]));
    assert!(merged_document_xml(json["docx"].as_str().unwrap()).contains("«Amount»"));
}

#[tokio::test]
async fn test_merge_input_errors() {
    let (status, json) = merge(body(&json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "'docx' key missing");

    let (_, json) = merge(body(&json!({ "docx": "%%%" }))).await;
    assert_eq!(json["error"], "Failed to decode base64 input");

    let (status, json) = merge(body(&json!({ "docx": letter_b64() }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "'data' key missing");

    let (status, json) = merge(body(&json!({ "docx": letter_b64(), "data": [1, 2] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"]
        .as_str()
        .unwrap()
        .starts_with("Failed to parse merge data"));
}

#[tokio::test]
async fn test_merge_validation_failure() {
    let (status, json) = merge(body(&json!({
        "docx": letter_b64(),
        "data": { "Name": "Ada", "Amount": 12.5 }
    })))
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["validation"]["valid"], false);
    assert_eq!(
        json["validation"]["errors"],
        json!(["Invalid value for field 'Amount': expected string, got number"])
    );
    assert_eq!(json["fields"], json!(["Name", "Amount"]));
    assert!(json.get("docx").is_none());
    assert!(json.get("skipped_fields").is_none());
}
