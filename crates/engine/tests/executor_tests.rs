//! Retry and fallback behaviour of a logical call, observed through the
//! engine facade and the attempt log.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use courier_engine::{
    AttemptOutcome, CallFailureKind, CallOptions, Capability, CircuitBreaker,
    CircuitBreakerConfig, CircuitState, Provider, ProviderErrorKind, ProviderOptions,
    ResponseEnvelope, RetryOverrides,
};

#[tokio::test]
async fn first_attempt_success_needs_no_backoff() {
    let sendgrid = Arc::new(ScriptedProvider::new("sendgrid", vec![ok("sendgrid")]));
    let h = harness(
        vec![candidate(&sendgrid, ProviderOptions::default())],
        exact_config(),
    );

    let response = h
        .engine
        .call(Capability::EmailSend, params(), CallOptions::default())
        .await
        .unwrap();

    assert!(response.is_success());
    assert_eq!(response.provider(), Some("sendgrid"));
    assert_eq!(response.attempts(), 1);
    assert!(h.sleeper.delays().is_empty());

    let records = h.records(response.call_id()).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, AttemptOutcome::Success);
    assert_eq!(records[0].attempt, 1);
}

#[tokio::test]
async fn transient_failures_retry_with_exponential_backoff() {
    let sendgrid = Arc::new(ScriptedProvider::new(
        "sendgrid",
        vec![transient(), transient(), ok("sendgrid")],
    ));
    let h = harness(
        vec![candidate(&sendgrid, ProviderOptions::default())],
        exact_config(),
    );

    let response = h
        .engine
        .call(Capability::EmailSend, params(), CallOptions::default())
        .await
        .unwrap();

    assert!(response.is_success());
    assert_eq!(sendgrid.calls(), 3);
    assert_eq!(
        h.sleeper.delays(),
        vec![Duration::from_millis(200), Duration::from_millis(400)]
    );

    let outcomes: Vec<_> = h
        .records(response.call_id())
        .await
        .into_iter()
        .map(|r| (r.attempt, r.outcome))
        .collect();
    assert_eq!(
        outcomes,
        vec![
            (1, AttemptOutcome::RetryableFailure),
            (2, AttemptOutcome::RetryableFailure),
            (3, AttemptOutcome::Success),
        ]
    );
}

#[tokio::test]
async fn permanent_failure_falls_back_immediately() {
    let sendgrid = Arc::new(ScriptedProvider::always("sendgrid", permanent()));
    let mailgun = Arc::new(ScriptedProvider::new("mailgun", vec![ok("mailgun")]));
    let h = harness(
        vec![
            candidate(&sendgrid, ProviderOptions::default()),
            candidate(&mailgun, ProviderOptions::default()),
        ],
        exact_config(),
    );

    let response = h
        .engine
        .call(Capability::EmailSend, params(), CallOptions::default())
        .await
        .unwrap();

    assert_eq!(response.provider(), Some("mailgun"));
    assert_eq!(sendgrid.calls(), 1);
    assert!(h.sleeper.delays().is_empty());

    let records = h.records(response.call_id()).await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].provider, "sendgrid");
    assert_eq!(records[0].outcome, AttemptOutcome::PermanentFailure);
    assert_eq!(records[0].error_kind.as_deref(), Some("invalid_request"));
    assert_eq!(records[1].provider, "mailgun");
    assert_eq!(records[1].attempt, 1);
}

#[tokio::test]
async fn exhausted_candidates_yield_aggregated_failure() {
    let sendgrid = Arc::new(ScriptedProvider::always("sendgrid", transient()));
    let mailgun = Arc::new(ScriptedProvider::always("mailgun", transient()));
    let h = harness(
        vec![
            candidate(&sendgrid, ProviderOptions::default()),
            candidate(&mailgun, ProviderOptions::default()),
        ],
        exact_config(),
    );

    let response = h
        .engine
        .call(Capability::EmailSend, params(), CallOptions::default())
        .await
        .unwrap();

    match &response {
        ResponseEnvelope::Failure {
            kind,
            exhausted,
            attempts,
            failures,
            ..
        } => {
            assert_eq!(*kind, CallFailureKind::AllProvidersExhausted);
            assert!(*exhausted);
            assert_eq!(*attempts, 6);
            assert_eq!(failures.len(), 2);
            assert_eq!(failures[0].provider, "sendgrid");
            assert_eq!(failures[0].attempts, 3);
            assert_eq!(failures[1].kind, ProviderErrorKind::Unavailable);
        }
        other => panic!("expected failure, got {:?}", other),
    }

    let records = h.records(response.call_id()).await;
    assert_eq!(records.len(), 6);
    let mailgun_attempts: Vec<u32> = records
        .iter()
        .filter(|r| r.provider == "mailgun")
        .map(|r| r.attempt)
        .collect();
    assert_eq!(mailgun_attempts, vec![1, 2, 3]);
    // Backoff happens within a candidate only, never between candidates.
    assert_eq!(h.sleeper.delays().len(), 4);
}

#[tokio::test]
async fn provider_without_retry_support_gets_one_attempt() {
    let lob = Arc::new(ScriptedProvider::always("lob", transient()));
    let h = harness(
        vec![candidate(&lob, ProviderOptions::default().without_retry())],
        exact_config(),
    );

    let response = h
        .engine
        .call(Capability::EmailSend, params(), CallOptions::default())
        .await
        .unwrap();

    assert!(!response.is_success());
    assert_eq!(lob.calls(), 1);
}

#[tokio::test]
async fn retry_overrides_layer_provider_then_call() {
    let sendgrid = Arc::new(ScriptedProvider::always("sendgrid", transient()));
    let h = harness(
        vec![candidate(
            &sendgrid,
            ProviderOptions::default().with_retry(RetryOverrides::default().max_attempts(5)),
        )],
        exact_config(),
    );

    h.engine
        .call(Capability::EmailSend, params(), CallOptions::default())
        .await
        .unwrap();
    assert_eq!(sendgrid.calls(), 5);

    let options = CallOptions::new().retry(
        RetryOverrides::default()
            .max_attempts(2)
            .base_delay(Duration::from_millis(10)),
    );
    h.engine
        .call(Capability::EmailSend, params(), options)
        .await
        .unwrap();
    assert_eq!(sendgrid.calls(), 7);
    assert_eq!(h.sleeper.delays().last(), Some(&Duration::from_millis(10)));
}

#[tokio::test]
async fn invalid_call_overrides_are_rejected_before_any_attempt() {
    let sendgrid = Arc::new(ScriptedProvider::new("sendgrid", vec![]));
    let h = harness(
        vec![candidate(&sendgrid, ProviderOptions::default())],
        exact_config(),
    );

    let options = CallOptions::new().retry(RetryOverrides::default().multiplier(0.5));
    let result = h
        .engine
        .call(Capability::EmailSend, params(), options)
        .await;

    assert!(result.is_err());
    assert_eq!(sendgrid.calls(), 0);
    assert_eq!(h.sink.len(), 0);
}

#[tokio::test]
async fn provider_panic_is_a_permanent_fault() {
    let mailgun = Arc::new(ScriptedProvider::new("mailgun", vec![ok("mailgun")]));
    let h = harness(
        vec![
            candidate(&Arc::new(PanickingProvider), ProviderOptions::default()),
            candidate(&mailgun, ProviderOptions::default()),
        ],
        exact_config(),
    );

    let response = h
        .engine
        .call(Capability::EmailSend, params(), CallOptions::default())
        .await
        .unwrap();

    assert_eq!(response.provider(), Some("mailgun"));
    let records = h.records(response.call_id()).await;
    assert_eq!(records[0].provider, "panicking");
    assert_eq!(records[0].outcome, AttemptOutcome::PermanentFailure);
    assert_eq!(records[0].error_kind.as_deref(), Some("fault"));
    assert!(h.sleeper.delays().is_empty());
}

#[tokio::test]
async fn exhausted_retries_open_the_circuit() {
    let sendgrid = Arc::new(ScriptedProvider::always("sendgrid", transient()));
    let mailgun = Arc::new(ScriptedProvider::always("mailgun", ok("mailgun")));

    let mut registry = courier_engine::ProviderRegistry::new().with_circuit_breaker(
        CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        }),
    );
    registry
        .register(
            Capability::EmailSend,
            "sendgrid",
            sendgrid.clone(),
            ProviderOptions::default(),
        )
        .unwrap();
    registry
        .register(
            Capability::EmailSend,
            "mailgun",
            mailgun.clone(),
            ProviderOptions::default(),
        )
        .unwrap();
    let breaker = registry.circuit_breaker().unwrap().clone();

    let sink = Arc::new(courier_engine::MemorySink::new());
    let logger = courier_engine::CallLogger::spawn(sink, Default::default());
    let engine = courier_engine::Engine::new(registry, logger, exact_config())
        .unwrap()
        .with_sleeper(Arc::new(RecordingSleeper::default()));

    let first = engine
        .call(Capability::EmailSend, params(), CallOptions::default())
        .await
        .unwrap();
    assert_eq!(first.provider(), Some("mailgun"));
    assert_eq!(breaker.state(Capability::EmailSend, "sendgrid"), CircuitState::Open);
    assert_eq!(breaker.state(Capability::EmailSend, "mailgun"), CircuitState::Closed);

    let second = engine
        .call(Capability::EmailSend, params(), CallOptions::default())
        .await
        .unwrap();
    assert_eq!(second.attempts(), 1);
    assert_eq!(sendgrid.calls(), 3);
}

#[tokio::test]
async fn circuits_are_tracked_per_capability() {
    let failing_mail = Arc::new(ScriptedProvider::always("primary", transient()));
    let mail_backup = Arc::new(ScriptedProvider::new("backup", vec![]));
    let healthy_storage = Arc::new(ScriptedProvider::new("primary", vec![]));
    let storage_backup = Arc::new(ScriptedProvider::new("backup", vec![]));

    let mut registry = courier_engine::ProviderRegistry::new().with_circuit_breaker(
        CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        }),
    );
    for (capability, provider) in [
        (Capability::EmailSend, failing_mail.clone()),
        (Capability::EmailSend, mail_backup.clone()),
        (Capability::ObjectUpload, healthy_storage.clone()),
        (Capability::ObjectUpload, storage_backup.clone()),
    ] {
        let name = provider.vendor().to_string();
        registry
            .register(capability, name, provider, ProviderOptions::default())
            .unwrap();
    }
    let breaker = registry.circuit_breaker().unwrap().clone();

    let sink = Arc::new(courier_engine::MemorySink::new());
    let logger = courier_engine::CallLogger::spawn(sink, Default::default());
    let engine = courier_engine::Engine::new(registry, logger, exact_config())
        .unwrap()
        .with_sleeper(Arc::new(RecordingSleeper::default()));

    let mail = engine
        .call(Capability::EmailSend, params(), CallOptions::default())
        .await
        .unwrap();
    assert_eq!(mail.provider(), Some("backup"));
    assert_eq!(breaker.state(Capability::EmailSend, "primary"), CircuitState::Open);

    let upload = engine
        .call(Capability::ObjectUpload, params(), CallOptions::default())
        .await
        .unwrap();
    assert_eq!(upload.provider(), Some("primary"));
    assert_eq!(healthy_storage.calls(), 1);
    assert_eq!(storage_backup.calls(), 0);
    assert_eq!(
        breaker.state(Capability::ObjectUpload, "primary"),
        CircuitState::Closed
    );
}
