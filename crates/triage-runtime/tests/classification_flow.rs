//! End-to-end classification through the orchestrator with a scripted provider.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use triage_core::{ClassificationEvent, FallbackReason, Message, ResultSource, Tier};
use triage_runtime::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, NotificationSink, NullSink,
    Orchestrator, ProviderError, RateLimiter, RuntimeConfig, TokenUsage,
};

const INFORMATIVO: &str = r#"{"tier": "INFORMATIVO", "tag_code": "10", "tag_name": "VALORES", "reason": "constancia"}"#;

/// Plays back queued replies, then answers with `INFORMATIVO` forever.
struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    calls: AtomicU32,
}

impl ScriptedProvider {
    fn new(replies: Vec<Result<String, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicU32::new(0),
        })
    }

    fn answering() -> Arc<Self> {
        Self::new(Vec::new())
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(
        &self,
        _messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(INFORMATIVO.to_string()));

        reply.map(|content| CompletionResponse {
            content,
            usage: TokenUsage::default(),
            model: config.model.clone(),
            finish_reason: Some("STOP".to_string()),
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Takes one second per call.
struct SlowProvider {
    calls: AtomicU32,
}

#[async_trait]
impl LlmProvider for SlowProvider {
    async fn complete(
        &self,
        _messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(1)).await;
        Ok(CompletionResponse {
            content: INFORMATIVO.to_string(),
            usage: TokenUsage::default(),
            model: config.model.clone(),
            finish_reason: Some("STOP".to_string()),
        })
    }

    fn name(&self) -> &str {
        "slow"
    }
}

#[derive(Default)]
struct RecordingSink {
    batches: Mutex<Vec<Vec<ClassificationEvent>>>,
    singles: AtomicU32,
}

impl NotificationSink for RecordingSink {
    fn notify_batch(&self, events: &[ClassificationEvent]) {
        self.batches.lock().push(events.to_vec());
    }

    fn notify_one(&self, _event: &ClassificationEvent) {
        self.singles.fetch_add(1, Ordering::SeqCst);
    }
}

fn orchestrator(provider: Arc<ScriptedProvider>, config: RuntimeConfig) -> Orchestrator {
    Orchestrator::builder()
        .provider(provider)
        .config(config)
        .sink(Arc::new(NullSink))
        .build()
        .unwrap()
}

fn server_error() -> Result<String, ProviderError> {
    Err(ProviderError::Status {
        status: 500,
        message: "internal".to_string(),
    })
}

fn quota() -> Result<String, ProviderError> {
    Err(ProviderError::RateLimited { retry_after: None })
}

#[tokio::test]
async fn every_message_gets_a_label_whatever_the_provider_does() {
    let provider = ScriptedProvider::new(vec![
        server_error(),
        Err(ProviderError::Timeout(Duration::from_secs(10))),
        Ok("no json here".to_string()),
        Err(ProviderError::InvalidEnvelope("empty candidates".to_string())),
    ]);
    let orch = orchestrator(Arc::clone(&provider), RuntimeConfig::default());

    let batch = (1..=5)
        .map(|id| Message::new(id, format!("Resolución {id}"), "SUNAT"))
        .collect();
    let classified = orch.classify_batch(batch).await;

    assert_eq!(classified.len(), 5);
    assert!(classified.iter().all(|c| c.message.tier.is_some()));
    let ids: Vec<_> = classified.iter().map(|c| c.message.id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    assert_eq!(classified[4].result.source, ResultSource::Model);
    assert_eq!(classified[4].message.tag_code, "10");
}

#[tokio::test]
async fn human_flags_are_never_written() {
    let orch = orchestrator(ScriptedProvider::answering(), RuntimeConfig::default());
    let mut message = Message::new(1, "Constancia", "SUNAT").urgent();
    message.starred = true;

    let classified = orch.classify_one(message).await;

    assert!(classified.message.urgent);
    assert!(classified.message.starred);
    assert_eq!(classified.message.tier, Some(Tier::Informative));
}

#[tokio::test]
async fn unparseable_answer_falls_back_to_recurrent() {
    let provider = ScriptedProvider::new(vec![Ok("Lo siento, no puedo clasificar esto.".to_string())]);
    let orch = orchestrator(provider, RuntimeConfig::default());

    let classified = orch.classify_one(Message::new(1, "Aviso", "SUNAT")).await;

    assert_eq!(
        classified.result.source,
        ResultSource::Fallback(FallbackReason::MalformedResponse)
    );
    assert_eq!(classified.result.tier, Tier::Recurrent);
    assert_eq!(classified.result.tag_code, "00");
    assert_eq!(classified.result.confidence, 0.5);
    assert_eq!(orch.breaker().consecutive_failures(), 0);
}

#[tokio::test(start_paused = true)]
async fn quota_rejections_back_off_then_succeed() {
    let provider = ScriptedProvider::new(vec![quota(), quota()]);
    let orch = orchestrator(Arc::clone(&provider), RuntimeConfig::default());

    let start = Instant::now();
    let classified = orch.classify_one(Message::new(1, "Multa tributaria", "SUNAT")).await;

    assert_eq!(classified.result.source, ResultSource::Model);
    assert_eq!(provider.calls(), 3);
    assert_eq!(start.elapsed(), Duration::from_secs(3));
    assert_eq!(orch.status().requests_in_window, 3);
}

#[tokio::test(start_paused = true)]
async fn quota_exhausted_on_every_attempt_opens_circuit() {
    let provider = ScriptedProvider::new(vec![quota(), quota(), quota()]);
    let orch = orchestrator(Arc::clone(&provider), RuntimeConfig::default());

    let first = orch.classify_one(Message::new(1, "Embargo", "SUNAT")).await;
    assert_eq!(
        first.result.source,
        ResultSource::Fallback(FallbackReason::QuotaExceeded)
    );
    assert!(orch.status().breaker_open);

    let second = orch.classify_one(Message::new(2, "Embargo", "SUNAT")).await;
    assert_eq!(
        second.result.source,
        ResultSource::Fallback(FallbackReason::CircuitOpen)
    );
    assert_eq!(provider.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn repeated_failures_open_circuit_until_cooldown() {
    let provider = ScriptedProvider::new((0..5).map(|_| server_error()).collect());
    let orch = orchestrator(Arc::clone(&provider), RuntimeConfig::default());

    // priority subjects keep being admitted once failures pile up
    for id in 1..=5 {
        let classified = orch
            .classify_one(Message::new(id, "Resolución de Cobranza", "SUNAT"))
            .await;
        assert_eq!(
            classified.result.source,
            ResultSource::Fallback(FallbackReason::ProviderError)
        );
    }
    assert!(orch.status().breaker_open);
    assert_eq!(orch.status().consecutive_failures, 5);

    let blocked = orch.classify_one(Message::new(6, "Embargo", "SUNAT")).await;
    assert_eq!(
        blocked.result.source,
        ResultSource::Fallback(FallbackReason::CircuitOpen)
    );
    assert_eq!(provider.calls(), 5);

    tokio::time::sleep(Duration::from_secs(301)).await;

    let recovered = orch.classify_one(Message::new(7, "Constancia", "SUNAT")).await;
    assert_eq!(recovered.result.source, ResultSource::Model);
    let status = orch.status();
    assert!(!status.breaker_open);
    assert_eq!(status.consecutive_failures, 0);
}

#[tokio::test]
async fn routine_messages_shed_near_ceiling_priority_admitted() {
    let provider = ScriptedProvider::answering();
    let config = RuntimeConfig {
        rate_limit_per_minute: 20,
        ..Default::default()
    };
    let orch = orchestrator(Arc::clone(&provider), config);
    for _ in 0..17 {
        assert!(orch.limiter().try_admit());
    }

    let routine = orch
        .classify_one(Message::new(1, "Constancia de presentación", "SUNAT"))
        .await;
    assert_eq!(
        routine.result.source,
        ResultSource::Fallback(FallbackReason::Shed)
    );
    assert_eq!(provider.calls(), 0);

    let flagged = orch
        .classify_one(Message::new(2, "Constancia de presentación", "SUNAT").urgent())
        .await;
    assert_eq!(flagged.result.source, ResultSource::Model);

    let coactiva = orch
        .classify_one(Message::new(3, "Resolución Coactiva de Embargo", "SUNAT"))
        .await;
    assert_eq!(coactiva.result.source, ResultSource::Model);
    assert_eq!(provider.calls(), 2);
    assert_eq!(orch.status().requests_in_window, 19);
}

#[tokio::test(start_paused = true)]
async fn window_ceiling_holds_until_rollover() {
    let provider = ScriptedProvider::answering();
    let config = RuntimeConfig {
        rate_limit_per_minute: 2,
        ..Default::default()
    };
    let orch = orchestrator(Arc::clone(&provider), config);
    let urgent = |id| Message::new(id, "Aviso", "SUNAT").urgent();

    assert_eq!(orch.classify_one(urgent(1)).await.result.source, ResultSource::Model);
    assert_eq!(orch.classify_one(urgent(2)).await.result.source, ResultSource::Model);
    assert_eq!(
        orch.classify_one(urgent(3)).await.result.source,
        ResultSource::Fallback(FallbackReason::RateLimited)
    );
    assert_eq!(provider.calls(), 2);
    assert!(!orch.status().breaker_open);

    tokio::time::sleep(Duration::from_secs(61)).await;

    assert_eq!(orch.classify_one(urgent(4)).await.result.source, ResultSource::Model);
    assert_eq!(orch.status().requests_in_window, 1);
}

#[tokio::test]
async fn batch_notifies_once_and_empty_batch_never() {
    let sink = Arc::new(RecordingSink::default());
    let orch = Orchestrator::builder()
        .provider(ScriptedProvider::answering())
        .sink(sink.clone())
        .build()
        .unwrap();

    orch.classify_batch(Vec::new()).await;
    assert!(sink.batches.lock().is_empty());

    let batch = vec![
        Message::new(1, "Constancia", "SUNAT"),
        Message::new(2, "Aviso", "SUNAT"),
        Message::new(3, "Valor", "SUNAT"),
    ];
    orch.classify_batch(batch).await;

    let batches = sink.batches.lock();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 3);
    assert_eq!(batches[0][1].subject, "Aviso");
    assert_eq!(sink.singles.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn orchestrators_sharing_a_limiter_share_the_quota() {
    let limiter = Arc::new(RateLimiter::new(3));
    let build = || {
        Orchestrator::builder()
            .provider(ScriptedProvider::answering())
            .limiter(Arc::clone(&limiter))
            .sink(Arc::new(NullSink))
            .build()
            .unwrap()
    };
    let (a, b) = (build(), build());

    a.classify_one(Message::new(1, "Multa", "SUNAT")).await;
    b.classify_one(Message::new(2, "Multa", "SUNAT")).await;
    a.classify_one(Message::new(3, "Multa", "SUNAT")).await;
    let last = b.classify_one(Message::new(4, "Multa", "SUNAT")).await;

    assert_eq!(
        last.result.source,
        ResultSource::Fallback(FallbackReason::RateLimited)
    );
    assert_eq!(limiter.remaining(), 0);
}

#[tokio::test(start_paused = true)]
async fn quota_then_server_error_keeps_circuit_open() {
    let provider = ScriptedProvider::new(vec![quota(), server_error()]);
    let orch = orchestrator(Arc::clone(&provider), RuntimeConfig::default());

    let first = orch.classify_one(Message::new(1, "Embargo", "SUNAT")).await;
    assert_eq!(
        first.result.source,
        ResultSource::Fallback(FallbackReason::ProviderError)
    );
    assert!(orch.status().breaker_open);
    assert_eq!(orch.status().consecutive_failures, 2);

    let second = orch.classify_one(Message::new(2, "Embargo", "SUNAT")).await;
    assert_eq!(
        second.result.source,
        ResultSource::Fallback(FallbackReason::CircuitOpen)
    );
    assert_eq!(provider.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn backoff_does_not_stall_concurrent_classification() {
    let provider = ScriptedProvider::new(vec![quota()]);
    let orch = orchestrator(Arc::clone(&provider), RuntimeConfig::default());
    let start = Instant::now();

    let backing_off = async {
        let classified = orch.classify_one(Message::new(1, "Multa", "SUNAT")).await;
        (classified, start.elapsed())
    };
    let concurrent = async {
        let classified = orch.classify_one(Message::new(2, "Embargo", "SUNAT")).await;
        (classified, start.elapsed())
    };
    let ((first, first_took), (second, second_took)) = tokio::join!(backing_off, concurrent);

    assert_eq!(first.result.source, ResultSource::Model);
    assert_eq!(first_took, Duration::from_secs(1));

    // the first 429 opened the circuit; the other call sees that at once
    assert_eq!(
        second.result.source,
        ResultSource::Fallback(FallbackReason::CircuitOpen)
    );
    assert_eq!(second_took, Duration::ZERO);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn concurrent_batch_keeps_input_order() {
    let provider = Arc::new(SlowProvider {
        calls: AtomicU32::new(0),
    });
    let config = RuntimeConfig {
        batch_concurrency: 3,
        ..Default::default()
    };
    let orch = Orchestrator::builder()
        .provider(provider.clone())
        .config(config)
        .sink(Arc::new(NullSink))
        .build()
        .unwrap();

    let start = Instant::now();
    let batch = (1..=6)
        .map(|id| Message::new(id, format!("Constancia {id}"), "SUNAT"))
        .collect();
    let classified = orch.classify_batch(batch).await;

    assert_eq!(start.elapsed(), Duration::from_secs(2));
    let ids: Vec<_> = classified.iter().map(|c| c.message.id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
    assert!(classified.iter().all(|c| c.result.source == ResultSource::Model));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 6);
    assert_eq!(orch.status().requests_in_window, 6);
}
