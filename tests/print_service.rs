mod support;

use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue};
use pressroom::application::{
    print::{PrintError, PrintRequest, SpecPayload},
    render::RenderError,
};
use support::{Harness, RETENTION};

fn request(spec: &str) -> PrintRequest {
    let mut headers = HeaderMap::new();
    headers.insert("referer", HeaderValue::from_static("http://maps.example/"));
    headers.insert("cookie", HeaderValue::from_static("session=42"));
    headers.insert("user-agent", HeaderValue::from_static("test"));
    PrintRequest {
        spec: Some(SpecPayload::Text(spec.to_string())),
        headers,
        peer: None,
    }
}

#[tokio::test]
async fn ticket_delivers_the_same_bytes_as_synchronous_render() {
    let harness = Harness::new();
    let spec = r#"{"layout":"A4 portrait","outputFilename":"plan_${date}"}"#;

    let direct = harness
        .print
        .render_synchronous(request(spec))
        .await
        .expect("sync render");
    let ticket = harness
        .print
        .render_async(request(spec))
        .await
        .expect("async render");
    let fetched = harness
        .print
        .retrieve(&ticket.handle)
        .await
        .expect("retrieve");

    assert_eq!(direct.content_type, fetched.content_type);
    assert_eq!(direct.content_length, fetched.content_length);
    assert_eq!(direct.file_name, "plan_Oct_17_2026.pdf");
    assert_eq!(fetched.file_name, direct.file_name);

    let direct = direct.into_bytes().await.expect("direct bytes");
    let fetched = fetched.into_bytes().await.expect("fetched bytes");
    assert_eq!(direct, fetched);

    let text = String::from_utf8(direct.to_vec()).expect("utf8 body");
    assert!(text.contains("referer: http://maps.example/"));
    assert!(text.contains("cookie: session=42"));
    assert!(!text.contains("user-agent"));
}

#[tokio::test]
async fn handles_are_url_safe_and_carry_the_suffix() {
    let harness = Harness::new();
    let ticket = harness
        .print
        .render_async(request(r#"{"outputFormat":"png"}"#))
        .await
        .expect("async render");

    assert!(ticket.handle.ends_with(".png"));
    assert!(
        ticket
            .handle
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_'))
    );
    let delivery = harness.print.retrieve(&ticket.handle).await.expect("retrieve");
    assert_eq!(delivery.content_type, "image/png");
    assert_eq!(delivery.file_name, "map-print.png");
}

#[tokio::test]
async fn retrieval_does_not_consume_the_artifact() {
    let harness = Harness::new();
    let ticket = harness
        .print
        .render_async(request("{}"))
        .await
        .expect("async render");

    for _ in 0..3 {
        harness.print.retrieve(&ticket.handle).await.expect("retrieve");
    }
    assert_eq!(harness.store.len(), 1);
    assert_eq!(harness.stored_files(), 1);
}

#[tokio::test]
async fn synchronous_render_keeps_nothing() {
    let harness = Harness::new();
    harness
        .print
        .render_synchronous(request("{}"))
        .await
        .expect("sync render");

    assert!(harness.store.is_empty());
    assert_eq!(harness.stored_files(), 0);
}

#[tokio::test]
async fn failed_renders_leave_no_artifact_behind() {
    let harness = Harness::new();

    let err = harness
        .print
        .render_synchronous(request(r#"{"fail":true}"#))
        .await
        .expect_err("sync failure");
    assert!(matches!(err, PrintError::Render(RenderError::Render { .. })));

    let err = harness
        .print
        .render_async(request(r#"{"fail":true}"#))
        .await
        .expect_err("async failure");
    assert!(matches!(err, PrintError::Render(RenderError::Render { .. })));

    let err = harness
        .print
        .render_async(request(r#"{"outputFormat":"tiff"}"#))
        .await
        .expect_err("unsupported format");
    assert!(matches!(
        err,
        PrintError::Render(RenderError::Unsupported { .. })
    ));

    assert!(harness.store.is_empty());
    assert_eq!(harness.stored_files(), 0);
}

#[tokio::test]
async fn invalid_spec_is_a_domain_error() {
    let harness = Harness::new();
    let err = harness
        .print
        .render_async(request("[1, 2]"))
        .await
        .expect_err("array spec");
    assert!(matches!(err, PrintError::Domain(_)));
    assert_eq!(harness.stored_files(), 0);
}

#[tokio::test]
async fn artifacts_expire_after_the_retention_window() {
    let harness = Harness::new();
    let ticket = harness
        .print
        .render_async(request("{}"))
        .await
        .expect("async render");

    harness.clock.advance(RETENTION - Duration::from_secs(1));
    harness
        .print
        .render_async(request("{}"))
        .await
        .expect("second render");
    harness
        .print
        .retrieve(&ticket.handle)
        .await
        .expect("still retrievable inside the window");

    harness.clock.advance(Duration::from_secs(2));
    // the next ticket request sweeps first
    harness
        .print
        .render_async(request("{}"))
        .await
        .expect("third render");

    let err = harness
        .print
        .retrieve(&ticket.handle)
        .await
        .expect_err("expired");
    assert!(matches!(err, PrintError::UnknownHandle { handle } if handle == ticket.handle));
    assert_eq!(harness.store.len(), 2);
    assert_eq!(harness.stored_files(), 2);
}

#[tokio::test]
async fn vanished_backing_is_reported_as_unknown() {
    let harness = Harness::new();
    let ticket = harness
        .print
        .render_async(request("{}"))
        .await
        .expect("async render");

    let artifact = harness.store.lookup(&ticket.handle).expect("registered");
    std::fs::remove_file(artifact.storage.path()).expect("remove backing");

    let err = harness
        .print
        .retrieve(&ticket.handle)
        .await
        .expect_err("backing gone");
    assert!(matches!(err, PrintError::UnknownHandle { .. }));
}

#[tokio::test]
async fn concurrent_tickets_get_distinct_handles() {
    let harness = Harness::new();
    let mut tasks = Vec::new();
    for index in 0..16 {
        let print = harness.print.clone();
        tasks.push(tokio::spawn(async move {
            print
                .render_async(request(&format!(r#"{{"page":{index}}}"#)))
                .await
                .expect("async render")
                .handle
        }));
    }

    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.expect("join"));
    }
    handles.sort();
    handles.dedup();
    assert_eq!(handles.len(), 16);
    assert_eq!(harness.store.len(), 16);
}

#[tokio::test]
async fn drain_all_releases_every_backing() {
    let harness = Harness::new();
    for _ in 0..3 {
        harness
            .print
            .render_async(request("{}"))
            .await
            .expect("async render");
    }

    assert_eq!(harness.store.drain_all(), 3);
    assert_eq!(harness.stored_files(), 0);
}
