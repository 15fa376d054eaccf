//! Mock implementations for testing
//!
//! These mocks enable integration testing without a warehouse.

use super::traits::AnswerClient;
use crate::warehouse::{
    AnswerFunction, ExternalAnswer, ResultSet, Statement, WarehouseError, WarehouseService,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Semaphore;

type AnswerResult = Result<Option<ExternalAnswer>, WarehouseError>;

// ============================================================================
// Mock Answer Client
// ============================================================================

/// Mock answering client that returns queued responses
pub struct MockAnswerClient {
    responses: Mutex<VecDeque<AnswerResult>>,
    /// Record of all questions asked
    pub requests: Mutex<Vec<(AnswerFunction, String)>>,
}

impl MockAnswerClient {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a one-row answer
    pub fn queue_answer(&self, text: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(Some(ExternalAnswer::text(text))));
    }

    /// Queue a zero-row result
    pub fn queue_no_rows(&self) {
        self.responses.lock().unwrap().push_back(Ok(None));
    }

    pub fn queue_error(&self, error: WarehouseError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_requests(&self) -> Vec<(AnswerFunction, String)> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockAnswerClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnswerClient for MockAnswerClient {
    async fn answer(&self, function: AnswerFunction, question: &str) -> AnswerResult {
        self.requests
            .lock()
            .unwrap()
            .push((function, question.to_string()));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(WarehouseError::network("No mock response queued")))
    }
}

// ============================================================================
// Gated Mock Answer Client (for busy-state testing)
// ============================================================================

/// Answers only after the test releases a permit, keeping the session busy
/// for as long as the test needs.
pub struct GatedAnswerClient {
    inner: MockAnswerClient,
    gate: Semaphore,
    started: AtomicUsize,
}

impl GatedAnswerClient {
    pub fn new() -> Self {
        Self {
            inner: MockAnswerClient::new(),
            gate: Semaphore::new(0),
            started: AtomicUsize::new(0),
        }
    }

    pub fn queue_answer(&self, text: &str) {
        self.inner.queue_answer(text);
    }

    /// Let one waiting (or future) request complete
    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    /// Number of calls that reached the client
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

impl Default for GatedAnswerClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnswerClient for GatedAnswerClient {
    async fn answer(&self, function: AnswerFunction, question: &str) -> AnswerResult {
        self.started.fetch_add(1, Ordering::SeqCst);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| WarehouseError::network("gate closed"))?;
        permit.forget();
        self.inner.answer(function, question).await
    }
}

// ============================================================================
// Mock Warehouse
// ============================================================================

/// Warehouse returning queued result sets and recording statements
pub struct MockWarehouse {
    results: Mutex<VecDeque<Result<ResultSet, WarehouseError>>>,
    pub statements: Mutex<Vec<Statement>>,
}

impl MockWarehouse {
    pub fn new() -> Self {
        Self {
            results: Mutex::new(VecDeque::new()),
            statements: Mutex::new(Vec::new()),
        }
    }

    pub fn queue(&self, result: Result<ResultSet, WarehouseError>) {
        self.results.lock().unwrap().push_back(result);
    }
}

impl Default for MockWarehouse {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WarehouseService for MockWarehouse {
    async fn execute(&self, statement: &Statement) -> Result<ResultSet, WarehouseError> {
        self.statements.lock().unwrap().push(statement.clone());
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(WarehouseError::network("No mock result queued")))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_FALLBACK_ANSWER;
    use crate::dispatcher::{
        DispatchError, DispatchSettings, SessionManager, SseEvent, UnavailableClient,
        WarehouseAnswerClient,
    };
    use crate::session::Sender;
    use crate::state_machine::TransitionError;
    use crate::warehouse::WarehouseErrorKind;
    use std::sync::Arc;
    use std::time::Duration;

    fn settings() -> DispatchSettings {
        DispatchSettings {
            default_function: AnswerFunction::Docs,
            fallback_answer: DEFAULT_FALLBACK_ANSWER.to_string(),
        }
    }

    fn manager_with(client: Arc<dyn AnswerClient>) -> SessionManager {
        SessionManager::new(client, settings())
    }

    /// Poll until the condition holds or the timeout expires
    async fn wait_until<F, Fut>(timeout: Duration, mut condition: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if condition().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_mock_answer_client() {
        let mock = MockAnswerClient::new();
        mock.queue_answer("Hello");

        let answer = mock.answer(AnswerFunction::Docs, "hi").await.unwrap();
        assert_eq!(answer.unwrap().response_text, "Hello");

        // Second call should fail (no more responses)
        assert!(mock.answer(AnswerFunction::Docs, "hi").await.is_err());
        assert_eq!(mock.recorded_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_warehouse_client_maps_first_row() {
        let warehouse = Arc::new(MockWarehouse::new());
        warehouse.queue(Ok(ResultSet::new(
            vec!["RESPONSE".to_string()],
            vec![
                vec![Some("Refunds within 30 days.".to_string())],
                vec![Some("second row".to_string())],
            ],
        )));
        warehouse.queue(Ok(ResultSet::new(vec!["RESPONSE".to_string()], vec![])));

        let client = WarehouseAnswerClient::new(warehouse.clone());

        let answer = client
            .answer(AnswerFunction::Logs, "What is the refund policy?")
            .await
            .unwrap();
        assert_eq!(answer.unwrap().response_text, "Refunds within 30 days.");

        let none = client.answer(AnswerFunction::Docs, "nothing").await.unwrap();
        assert!(none.is_none());

        let statements = warehouse.statements.lock().unwrap().clone();
        assert_eq!(statements[0].sql, "SELECT * FROM TABLE(DOC_LOGS_LLM(?))");
        assert_eq!(
            serde_json::to_value(&statements[0].bindings).unwrap(),
            serde_json::json!([{ "type": "TEXT", "value": "What is the refund policy?" }])
        );
    }

    /// submit("What is the refund policy?") with one row appends both turns
    #[tokio::test]
    async fn test_simple_exchange() {
        let client = Arc::new(MockAnswerClient::new());
        client.queue_answer("Refunds within 30 days.");
        let manager = manager_with(client.clone());
        let session = manager.create(None).await;

        let submitted = session.submit("What is the refund policy?").await.unwrap();
        assert_eq!(submitted.user.content(), "What is the refund policy?");
        assert_eq!(submitted.bot.content(), "Refunds within 30 days.");

        let snapshot = session.snapshot().await;
        assert!(!snapshot.busy);
        assert_eq!(snapshot.turns.len(), 2);
        assert_eq!(snapshot.turns[0].sender(), Sender::User);
        assert_eq!(snapshot.turns[0].content(), "What is the refund policy?");
        assert_eq!(snapshot.turns[1].sender(), Sender::Bot);
        assert_eq!(snapshot.turns[1].content(), "Refunds within 30 days.");

        assert_eq!(
            client.recorded_requests(),
            vec![(AnswerFunction::Docs, "What is the refund policy?".to_string())]
        );
    }

    #[tokio::test]
    async fn test_n_submits_alternate() {
        let client = Arc::new(MockAnswerClient::new());
        for i in 0..5 {
            client.queue_answer(&format!("answer {i}"));
        }
        let manager = manager_with(client.clone());
        let session = manager.create(Some(AnswerFunction::Combined)).await;

        for i in 0..5 {
            session.submit(format!("question {i}")).await.unwrap();
        }

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.turns.len(), 10);
        for (i, turn) in snapshot.turns.iter().enumerate() {
            let expected = if i % 2 == 0 { Sender::User } else { Sender::Bot };
            assert_eq!(turn.sender(), expected);
        }
        assert!(client
            .recorded_requests()
            .iter()
            .all(|(function, _)| *function == AnswerFunction::Combined));
    }

    #[tokio::test]
    async fn test_blank_submit_warns_without_mutation() {
        let client = Arc::new(MockAnswerClient::new());
        let manager = manager_with(client.clone());
        let session = manager.create(None).await;
        let (_, mut rx) = session.subscribe().await;

        let result = session.submit("   ").await;
        assert_eq!(result, Err(DispatchError::Rejected(TransitionError::EmptyInput)));

        let snapshot = session.snapshot().await;
        assert!(snapshot.turns.is_empty());
        assert!(!snapshot.busy);
        assert!(client.recorded_requests().is_empty());

        match tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
            Ok(Ok(SseEvent::Warning { message })) => {
                assert_eq!(message, "Please enter a question.");
            }
            other => panic!("Expected warning, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_submit_while_busy_is_rejected() {
        let client = Arc::new(GatedAnswerClient::new());
        client.queue_answer("first answer");
        let manager = manager_with(client.clone());
        let session = manager.create(None).await;

        let first = {
            let session = session.clone();
            tokio::spawn(async move { session.submit("first").await })
        };

        // Wait until the first query is outstanding
        let watcher = session.clone();
        assert!(
            wait_until(Duration::from_secs(2), || {
                let watcher = watcher.clone();
                async move { watcher.snapshot().await.busy }
            })
            .await
        );

        let second = session.submit("second").await;
        assert_eq!(second, Err(DispatchError::Rejected(TransitionError::Busy)));

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.turns.len(), 1);
        assert!(snapshot.busy);

        client.release();
        let first = first.await.unwrap().unwrap();
        assert_eq!(first.bot.content(), "first answer");

        // Only one outbound call was ever made
        assert_eq!(client.started(), 1);
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.turns.len(), 2);
        assert!(!snapshot.busy);
    }

    #[tokio::test]
    async fn test_service_failure_becomes_bot_turn() {
        let client = Arc::new(MockAnswerClient::new());
        client.queue_error(WarehouseError::auth("Authentication failed: token expired"));
        client.queue_answer("recovered");
        let manager = manager_with(client.clone());
        let session = manager.create(None).await;

        let submitted = session.submit("hello").await.unwrap();
        assert_eq!(
            submitted.bot.content(),
            "Error: Authentication failed: token expired"
        );

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.turns.len(), 2);
        assert!(!snapshot.busy);

        // The session keeps working after a failure
        let submitted = session.submit("again").await.unwrap();
        assert_eq!(submitted.bot.content(), "recovered");
        assert_eq!(session.snapshot().await.turns.len(), 4);
    }

    #[tokio::test]
    async fn test_zero_rows_uses_fallback() {
        let client = Arc::new(MockAnswerClient::new());
        client.queue_no_rows();
        let manager = manager_with(client);
        let session = manager.create(None).await;

        let submitted = session.submit("unknown").await.unwrap();
        assert_eq!(submitted.bot.content(), DEFAULT_FALLBACK_ANSWER);
    }

    #[tokio::test]
    async fn test_malformed_rows_become_error_turn() {
        let warehouse = Arc::new(MockWarehouse::new());
        warehouse.queue(Ok(ResultSet::new(
            vec!["SOMETHING_ELSE".to_string()],
            vec![vec![Some("x".to_string())]],
        )));
        let client: Arc<dyn AnswerClient> = Arc::new(WarehouseAnswerClient::new(warehouse));
        let manager = manager_with(client);
        let session = manager.create(None).await;

        let submitted = session.submit("q").await.unwrap();
        assert!(submitted.bot.content().starts_with("Error: result has no RESPONSE column"));
    }

    #[tokio::test]
    async fn test_stream_reports_turns_and_busy() {
        let client = Arc::new(MockAnswerClient::new());
        client.queue_answer("pong");
        let manager = manager_with(client);
        let session = manager.create(None).await;
        let (initial, mut rx) = session.subscribe().await;
        assert!(initial.turns.is_empty());

        session.submit("ping").await.unwrap();

        let mut seen = Vec::new();
        while let Ok(Ok(event)) =
            tokio::time::timeout(Duration::from_millis(200), rx.recv()).await
        {
            seen.push(event);
        }

        assert!(matches!(&seen[0], SseEvent::Turn { seq: 1, turn } if turn.content() == "ping"));
        assert!(matches!(seen[1], SseEvent::Busy { busy: true }));
        assert!(matches!(&seen[2], SseEvent::Turn { seq: 2, turn } if turn.content() == "pong"));
        assert!(matches!(seen[3], SseEvent::Busy { busy: false }));
        assert_eq!(seen.len(), 4);
    }

    #[tokio::test]
    async fn test_end_session_drops_it() {
        let client = Arc::new(MockAnswerClient::new());
        client.queue_answer("a");
        let manager = manager_with(client);
        let session = manager.create(None).await;
        session.submit("q").await.unwrap();
        assert_eq!(manager.session_count().await, 1);

        manager.end(&session.id).await.unwrap();
        assert_eq!(manager.session_count().await, 0);
        assert!(matches!(
            manager.get(&session.id).await,
            Err(DispatchError::NotFound(_))
        ));
        assert!(matches!(
            manager.end(&session.id).await,
            Err(DispatchError::NotFound(_))
        ));

        // The runtime stops; late submits through a stale handle are refused
        let closed = wait_until(Duration::from_secs(2), || {
            let session = session.clone();
            async move { session.submit("late").await == Err(DispatchError::SessionClosed) }
        })
        .await;
        assert!(closed);
    }

    #[tokio::test]
    async fn test_ending_busy_session_finishes_outstanding_query() {
        let client = Arc::new(GatedAnswerClient::new());
        client.queue_answer("done");
        let manager = manager_with(client.clone());
        let session = manager.create(None).await;

        let pending = {
            let session = session.clone();
            tokio::spawn(async move { session.submit("slow").await })
        };
        assert!(
            wait_until(Duration::from_secs(2), || {
                let client = client.clone();
                async move { client.started() == 1 }
            })
            .await
        );

        manager.end(&session.id).await.unwrap();
        client.release();

        let submitted = pending.await.unwrap().unwrap();
        assert_eq!(submitted.bot.content(), "done");
    }

    /// A subscriber joining mid-session can drop every turn at or below the
    /// snapshot's sequence number and still see each turn exactly once
    #[tokio::test]
    async fn test_subscriber_dedups_turns_by_sequence() {
        let client = Arc::new(MockAnswerClient::new());
        client.queue_answer("first answer");
        client.queue_answer("second answer");
        let manager = manager_with(client);
        let session = manager.create(None).await;

        session.submit("first").await.unwrap();
        let (initial, mut rx) = session.subscribe().await;
        assert_eq!(initial.last_seq, 2);

        session.submit("second").await.unwrap();

        let mut rendered: Vec<String> = initial
            .turns
            .iter()
            .map(|turn| turn.content().to_string())
            .collect();
        let mut last_seq = initial.last_seq;
        while let Ok(Ok(event)) =
            tokio::time::timeout(Duration::from_millis(200), rx.recv()).await
        {
            if let SseEvent::Turn { seq, turn } = event {
                if seq > last_seq {
                    last_seq = seq;
                    rendered.push(turn.content().to_string());
                }
            }
        }

        assert_eq!(
            rendered,
            vec!["first", "first answer", "second", "second answer"]
        );
        assert_eq!(last_seq, session.snapshot().await.last_seq);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reap_idle_spares_recent_streaming_and_busy_sessions() {
        let client = Arc::new(GatedAnswerClient::new());
        client.queue_answer("eventually");
        let manager = manager_with(client.clone());

        let abandoned = manager.create(None).await;
        let active = manager.create(None).await;
        let streaming = manager.create(None).await;
        let busy = manager.create(None).await;
        let (_, _stream) = streaming.subscribe().await;

        let pending = {
            let busy = busy.clone();
            tokio::spawn(async move { busy.submit("slow").await })
        };
        assert!(
            wait_until(Duration::from_secs(2), || {
                let client = client.clone();
                async move { client.started() == 1 }
            })
            .await
        );

        tokio::time::advance(Duration::from_secs(40)).await;
        manager.get(&active.id).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(manager.reap_idle(Duration::from_secs(60)).await, 1);
        assert!(matches!(
            manager.get(&abandoned.id).await,
            Err(DispatchError::NotFound(_))
        ));
        assert_eq!(manager.session_count().await, 3);

        client.release();
        pending.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_reclaims_abandoned_session() {
        let manager = Arc::new(manager_with(Arc::new(MockAnswerClient::new())));
        let abandoned = manager.create(None).await;
        manager.spawn_reaper(Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(manager.session_count().await, 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(manager.session_count().await, 0);

        // The runtime is gone too
        assert_eq!(
            abandoned.submit("hello?").await,
            Err(DispatchError::SessionClosed)
        );
    }

    #[tokio::test]
    async fn test_unavailable_client_reports_reason() {
        let manager = manager_with(Arc::new(UnavailableClient::new("account locked")));
        let session = manager.create(None).await;

        let submitted = session.submit("anyone there?").await.unwrap();
        assert_eq!(submitted.bot.content(), "Error: account locked");
        assert!(!session.snapshot().await.busy);
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let client = Arc::new(MockAnswerClient::new());
        client.queue_answer("one");
        client.queue_error(WarehouseError::new(WarehouseErrorKind::Timeout, "too slow"));
        let manager = manager_with(client);

        let a = manager.create(None).await;
        let b = manager.create(Some(AnswerFunction::Logs)).await;
        assert_ne!(a.id, b.id);

        a.submit("first").await.unwrap();
        b.submit("second").await.unwrap();

        assert_eq!(a.snapshot().await.turns[1].content(), "one");
        assert_eq!(b.snapshot().await.turns[1].content(), "Error: too slow");
        assert_eq!(
            manager.submit(&a.id, "  ").await.unwrap_err().to_string(),
            "Please enter a question."
        );
    }
}
