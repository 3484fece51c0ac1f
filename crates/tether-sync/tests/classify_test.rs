use serde_json::json;
use tether_sync::{classify, Disposition, TransportOutcome};

#[test]
fn success_carries_body() {
    let body = json!({"id": "doc-1"});
    assert_eq!(
        classify(TransportOutcome::json(201, body.clone())),
        Disposition::Synced { body: Some(body) }
    );
    assert_eq!(
        classify(TransportOutcome::status(204)),
        Disposition::Synced { body: None }
    );
}

#[test]
fn conflict_uses_server_message() {
    let outcome = TransportOutcome::json(409, json!({"error": "stale version"}));
    assert_eq!(
        classify(outcome),
        Disposition::Conflict {
            message: "stale version".into()
        }
    );
}

#[test]
fn client_errors_are_final() {
    for status in [400, 401, 403, 404, 408, 410, 422] {
        assert!(
            matches!(classify(TransportOutcome::status(status)), Disposition::Rejected { status: s, .. } if s == status),
            "{status} should be rejected"
        );
    }
    let outcome = TransportOutcome::json(422, json!({"message": "title required"}));
    assert_eq!(
        classify(outcome),
        Disposition::Rejected {
            status: 422,
            message: "title required".into()
        }
    );
}

#[test]
fn server_errors_and_rate_limits_are_transient() {
    for status in [429, 500, 502, 503, 504] {
        assert!(
            matches!(classify(TransportOutcome::status(status)), Disposition::Transient { status: Some(s), .. } if s == status),
            "{status} should be retried"
        );
    }
}

#[test]
fn network_failures_are_transient() {
    assert!(matches!(
        classify(TransportOutcome::Timeout),
        Disposition::Transient { status: None, .. }
    ));
    assert_eq!(
        classify(TransportOutcome::NetworkFailure {
            reason: "connection reset".into()
        }),
        Disposition::Transient {
            status: None,
            message: "connection reset".into()
        }
    );
}
