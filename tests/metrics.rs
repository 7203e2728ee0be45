mod support;

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, OnceLock, Weak},
};

use axum::http::HeaderMap;
use metrics_util::debugging::{DebuggingRecorder, Snapshotter};
use pressroom::{
    application::{
        clock::ManualClock,
        print::{PrintRequest, SpecPayload},
        store::{ArtifactStore, StorageReclaimer, SweepOutcome},
    },
    domain::artifact::{Artifact, ArtifactDraft, NamingHints, OutputFormat, StorageRef},
    infra::telemetry,
};
use serial_test::serial;
use support::{Harness, RETENTION, START};

fn snapshotter() -> &'static Snapshotter {
    static SNAPSHOTTER: OnceLock<Snapshotter> = OnceLock::new();
    SNAPSHOTTER.get_or_init(|| {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        recorder
            .install()
            .expect("debug metrics recorder should install in this test process");
        telemetry::describe_metrics();
        snapshotter
    })
}

fn metric_names(snapshotter: &Snapshotter) -> HashSet<String> {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect()
}

/// Starts a second sweep from inside the first one.
#[derive(Default)]
struct ReentrantReclaimer {
    store: OnceLock<Weak<ArtifactStore>>,
    nested: Mutex<Vec<SweepOutcome>>,
}

impl StorageReclaimer for ReentrantReclaimer {
    fn reclaim(&self, _artifact: &Artifact) {
        if let Some(store) = self.store.get().and_then(Weak::upgrade) {
            let outcome = store.evict_expired();
            self.nested.lock().expect("nested").push(outcome);
        }
    }
}

#[test]
#[serial]
fn store_emits_lifecycle_metrics() {
    let snapshotter = snapshotter();

    let clock = Arc::new(ManualClock::new(START));
    let reclaimer = Arc::new(ReentrantReclaimer::default());
    let store = Arc::new(ArtifactStore::new(
        RETENTION,
        clock.clone(),
        reclaimer.clone(),
    ));
    reclaimer
        .store
        .set(Arc::downgrade(&store))
        .expect("store set once");

    store.register(ArtifactDraft {
        handle: "abc.pdf".to_string(),
        storage: StorageRef::new("/tmp/pressroom-abc.pdf.printout"),
        format: OutputFormat::new("pdf", "application/pdf"),
        naming: NamingHints::default(),
    });
    clock.advance(RETENTION * 2);

    assert_eq!(store.evict_expired(), SweepOutcome::Completed { evicted: 1 });
    assert_eq!(
        *reclaimer.nested.lock().expect("nested"),
        vec![SweepOutcome::Skipped]
    );

    let names = metric_names(snapshotter);
    for metric in [
        "pressroom_artifacts_registered_total",
        "pressroom_artifacts_evicted_total",
        "pressroom_artifacts_stored",
        "pressroom_eviction_skipped_total",
    ] {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}

#[tokio::test]
#[serial]
async fn print_jobs_emit_render_metrics() {
    let snapshotter = snapshotter();
    let harness = Harness::new();

    let request = |spec: &str| PrintRequest {
        spec: Some(SpecPayload::Text(spec.to_string())),
        headers: HeaderMap::new(),
        peer: None,
    };
    harness
        .print
        .render_synchronous(request("{}"))
        .await
        .expect("render");
    harness
        .print
        .render_synchronous(request(r#"{"fail":true}"#))
        .await
        .expect_err("failure");

    let names = metric_names(snapshotter);
    for metric in ["pressroom_render_ms", "pressroom_render_failures_total"] {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
