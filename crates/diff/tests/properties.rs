#![forbid(unsafe_code)]

use serde_json::json;
use vigil_diff::{diff_lines, ManifestCleaner};

fn manifests() -> Vec<Vec<u8>> {
    vec![
        br#"{"kind":"fakeKind"}"#.to_vec(),
        serde_json::to_vec(&json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": { "name": "svc", "namespace": "ns", "resourceVersion": "9", "annotations": null },
            "spec": { "ports": [ { "port": 80 } ] }
        }))
        .unwrap(),
        serde_json::to_vec(&json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {
                "name": "web",
                "generation": 2,
                "annotations": { "deployment.kubernetes.io/revision": "4", "owner": "a" }
            },
            "spec": { "replicas": 3 },
            "status": { "replicas": 3 }
        }))
        .unwrap(),
    ]
}

#[test]
fn cleaning_is_idempotent() {
    let cleaner = ManifestCleaner::default();
    for m in manifests() {
        let once = cleaner.clean(&m).unwrap();
        let twice = cleaner.clean(&once).unwrap();
        assert_eq!(once, twice);
    }
}

#[test]
fn cleaned_manifest_never_differs_from_itself() {
    let cleaner = ManifestCleaner::default();
    for m in manifests() {
        let c = cleaner.clean(&m).unwrap();
        assert!(diff_lines(&c, &c).unwrap().is_empty());
    }
}

#[test]
fn volatile_only_changes_produce_no_diff() {
    let cleaner = ManifestCleaner::default();
    let a = cleaner
        .clean(br#"{"kind":"Deployment","metadata":{"name":"w","resourceVersion":"1","generation":1},"status":{"x":1}}"#)
        .unwrap();
    let b = cleaner
        .clean(br#"{"kind":"Deployment","metadata":{"name":"w","resourceVersion":"2","generation":2},"status":{"x":2}}"#)
        .unwrap();
    assert!(diff_lines(&a, &b).unwrap().is_empty());
}

#[test]
fn user_visible_change_produces_diff() {
    let cleaner = ManifestCleaner::default();
    let a = cleaner.clean(br#"{"kind":"fakeKind"}"#).unwrap();
    let b = cleaner.clean(br#"{"kind":"fakeKindDifferentThanPrevious"}"#).unwrap();
    let out = String::from_utf8(diff_lines(&a, &b).unwrap()).unwrap();
    assert!(out.contains("-  \"kind\": \"fakeKind\""), "{}", out);
    assert!(out.contains("+  \"kind\": \"fakeKindDifferentThanPrevious\""), "{}", out);
}
