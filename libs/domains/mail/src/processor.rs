//! Mail job processor.
//!
//! One job runs strictly in order: parse, fetch template, render, fetch
//! provider, send, update history. Any failing step ends the job. The audit
//! trail is always `pending` followed by exactly one of `sent` or `failed`.
//! Status records are best effort and never change a job's outcome.

use crate::error::{MailError, MailResult};
use crate::models::{
    HistoryUpdate, JobPayload, LifecycleStatus, MailProvider, MailStatus, MailTemplate, StatusEvent,
};
use crate::providers::{DispatchOptions, MailDispatcher, MailTransport};
use crate::service::{MailService, ServiceError};
use crate::templates::TemplateRenderer;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use stream_worker::{JobHandler, StreamEntry, StreamError};
use tokio::time::Instant;
use tracing::{Instrument, info, info_span, warn};

const PENDING_MESSAGE: &str = "Mail job received";
const SENT_MESSAGE: &str = "Send mail success";

/// Processor settings.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Production disables the test recipient override.
    pub production: bool,
    /// Outside production, replaces (or extends) every job's recipients.
    pub test_recipients: Vec<String>,
    /// Append `test_recipients` instead of replacing.
    pub test_append: bool,
    /// Bound on each status record call.
    pub status_timeout: Duration,
    pub dispatch: DispatchOptions,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            production: true,
            test_recipients: Vec::new(),
            test_append: false,
            status_timeout: Duration::from_secs(5),
            dispatch: DispatchOptions::default(),
        }
    }
}

impl ProcessorConfig {
    pub fn with_production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    pub fn with_test_recipients(mut self, recipients: Vec<String>, append: bool) -> Self {
        self.test_recipients = recipients;
        self.test_append = append;
        self
    }

    pub fn with_status_timeout(mut self, timeout: Duration) -> Self {
        self.status_timeout = timeout;
        self
    }

    pub fn with_dispatch(mut self, dispatch: DispatchOptions) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Final recipient list for `payload`.
    pub fn resolve_recipients(&self, payload: &JobPayload) -> Vec<String> {
        let mut recipients = payload.recipients();

        if !self.production && !self.test_recipients.is_empty() {
            if self.test_append {
                recipients.extend(self.test_recipients.iter().cloned());
            } else {
                recipients = self.test_recipients.clone();
            }
        }

        recipients
    }
}

/// Runs mail jobs against a [`MailService`], a [`TemplateRenderer`] and a
/// [`MailTransport`].
pub struct MailJobProcessor<S, R, T>
where
    S: MailService,
    R: TemplateRenderer + 'static,
    T: MailTransport,
{
    service: Arc<S>,
    renderer: Arc<R>,
    transport: Arc<T>,
    config: ProcessorConfig,
}

impl<S, R, T> MailJobProcessor<S, R, T>
where
    S: MailService,
    R: TemplateRenderer + 'static,
    T: MailTransport,
{
    pub fn new(
        service: Arc<S>,
        renderer: Arc<R>,
        transport: Arc<T>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            service,
            renderer,
            transport,
            config,
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Process one job and record its status trail.
    pub async fn process(&self, job_id: &str, raw: &str, deadline: Instant) -> MailResult<()> {
        self.record(job_id, MailStatus::Pending, PENDING_MESSAGE).await;

        match self.run(job_id, raw, deadline).await {
            Ok(()) => {
                self.record(job_id, MailStatus::Sent, SENT_MESSAGE).await;
                Ok(())
            }
            Err(e) => {
                warn!(job_id, kind = e.kind(), error = %e, "Mail job failed");
                self.record(job_id, MailStatus::Failed, &e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn run(&self, job_id: &str, raw: &str, deadline: Instant) -> MailResult<()> {
        let payload = JobPayload::parse(raw)?;

        let template = self.fetch_template(&payload.template, deadline).await?;
        if template.status != LifecycleStatus::Active {
            warn!(
                template = %template.id,
                status = %template.status,
                "Using inactive mail template"
            );
        }

        let rendered = self.renderer.render(&template.subject, &template.body, &payload.data)?;

        let provider = self.fetch_provider(&payload.provider, deadline).await?;
        let recipients = self.config.resolve_recipients(&payload);

        if Instant::now() >= deadline {
            return Err(MailError::SendFailed("deadline exceeded before send".to_string()));
        }

        let mut dispatcher = MailDispatcher::new(Arc::clone(&self.transport), self.config.dispatch);
        dispatcher.configure(&provider);
        within(
            deadline,
            dispatcher.send(&recipients, &rendered.subject, &rendered.body, &payload.data),
        )
        .await
        .unwrap_or_else(|| Err(MailError::SendInterrupted("deadline exceeded".to_string())))?;

        info!(
            job_id,
            template = %template.id,
            provider = %provider.email,
            recipients = recipients.len(),
            "Mail sent"
        );

        let update = HistoryUpdate {
            job_id: job_id.to_string(),
            subject: rendered.subject,
            body: rendered.body,
            recipients,
            data: serde_json::to_string(&payload.data)
                .map_err(|e| MailError::HistoryUpdateFailed(e.to_string()))?,
            template_id: template.id,
            provider_email: provider.email,
        };

        match within(deadline, self.service.update_history(&update)).await {
            Some(Ok(())) => Ok(()),
            Some(Err(e)) => Err(MailError::HistoryUpdateFailed(e.to_string())),
            None => Err(MailError::HistoryUpdateFailed("deadline exceeded".to_string())),
        }
    }

    async fn fetch_template(&self, id: &str, deadline: Instant) -> MailResult<MailTemplate> {
        let result = within(deadline, self.service.get_template(id)).await;
        lookup(result, id, MailError::TemplateNotFound)
    }

    async fn fetch_provider(&self, email: &str, deadline: Instant) -> MailResult<MailProvider> {
        let result = within(deadline, self.service.get_provider(email)).await;
        lookup(result, email, MailError::ProviderNotFound)
    }

    /// Record a status event, logging instead of failing.
    async fn record(&self, job_id: &str, status: MailStatus, message: &str) {
        let event = StatusEvent::new(job_id, status, message);

        let recorded = tokio::time::timeout(
            self.config.status_timeout,
            self.service.create_status_event(&event),
        );

        let result = match recorded.await {
            Ok(result) => result.map_err(|e| MailError::StatusRecordFailed(e.to_string())),
            Err(_) => Err(MailError::StatusRecordFailed(format!(
                "timed out after {:?}",
                self.config.status_timeout
            ))),
        };

        if let Err(e) = result {
            warn!(job_id, status = %status, error = %e, "Status event not recorded");
        }
    }
}

/// Run `fut` until `deadline`. `None` when the deadline passed first.
async fn within<F: Future>(deadline: Instant, fut: F) -> Option<F::Output> {
    tokio::time::timeout_at(deadline, fut).await.ok()
}

/// Map a lookup outcome. Pool errors stay pool errors, everything else is
/// "not found" for the looked-up record.
fn lookup<V>(
    result: Option<Result<Option<V>, ServiceError>>,
    key: &str,
    not_found: fn(String) -> MailError,
) -> MailResult<V> {
    match result {
        Some(Ok(Some(value))) => Ok(value),
        Some(Ok(None)) => Err(not_found(format!("'{}' does not exist", key))),
        Some(Err(ServiceError::Pool(e))) => Err(MailError::Pool(e)),
        Some(Err(e)) => Err(not_found(format!("'{}': {}", key, e))),
        None => Err(not_found(format!("'{}': deadline exceeded", key))),
    }
}

#[async_trait]
impl<S, R, T> JobHandler for MailJobProcessor<S, R, T>
where
    S: MailService,
    R: TemplateRenderer + 'static,
    T: MailTransport,
{
    async fn handle(&self, entry: &StreamEntry, deadline: Instant) -> Result<(), StreamError> {
        let span = info_span!(
            "mail_job",
            job_id = %entry.job_id,
            queue = %entry.queue,
            retry_count = entry.retry_count
        );

        self.process(&entry.job_id, &entry.payload, deadline)
            .instrument(span)
            .await
            .map_err(StreamError::from)
    }

    fn name(&self) -> &'static str {
        "MailJobProcessor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Encryption;
    use crate::providers::{OutgoingMail, TransportSettings};
    use crate::templates::HandlebarsRenderer;
    use grpc_client::PoolError;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use stream_worker::ErrorCategory;

    // ========================================================================
    // Fakes
    // ========================================================================

    #[derive(Default)]
    struct FakeMailService {
        templates: HashMap<String, MailTemplate>,
        providers: HashMap<String, MailProvider>,
        events: Mutex<Vec<StatusEvent>>,
        history: Mutex<Vec<HistoryUpdate>>,
        provider_lookups: AtomicUsize,
        template_delay: Option<Duration>,
        template_unconfigured: bool,
        fail_history: bool,
        fail_status: bool,
    }

    impl FakeMailService {
        fn statuses(&self) -> Vec<MailStatus> {
            self.events.lock().unwrap().iter().map(|e| e.status).collect()
        }
    }

    #[async_trait]
    impl MailService for FakeMailService {
        async fn get_template(&self, id: &str) -> Result<Option<MailTemplate>, ServiceError> {
            if let Some(delay) = self.template_delay {
                tokio::time::sleep(delay).await;
            }
            if self.template_unconfigured {
                return Err(PoolError::EndpointUnconfigured("mail-service".into()).into());
            }
            Ok(self.templates.get(id).cloned())
        }

        async fn get_provider(&self, email: &str) -> Result<Option<MailProvider>, ServiceError> {
            self.provider_lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self.providers.get(email).cloned())
        }

        async fn update_history(&self, update: &HistoryUpdate) -> Result<(), ServiceError> {
            if self.fail_history {
                return Err(ServiceError::Rpc(tonic::Status::internal("history store down")));
            }
            self.history.lock().unwrap().push(update.clone());
            Ok(())
        }

        async fn create_status_event(&self, event: &StatusEvent) -> Result<(), ServiceError> {
            if self.fail_status {
                return Err(ServiceError::Rpc(tonic::Status::unavailable("status store down")));
            }
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeTransport {
        sent: Mutex<Vec<OutgoingMail>>,
        fail: bool,
        /// Held after the server accepted the mail.
        linger: Option<Duration>,
    }

    impl FakeTransport {
        fn sent(&self) -> Vec<OutgoingMail> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MailTransport for FakeTransport {
        async fn deliver(
            &self,
            _settings: &TransportSettings,
            mail: &OutgoingMail,
        ) -> MailResult<()> {
            if self.fail {
                return Err(MailError::SendFailed("connection refused".into()));
            }
            self.sent.lock().unwrap().push(mail.clone());
            if let Some(linger) = self.linger {
                tokio::time::sleep(linger).await;
            }
            Ok(())
        }

        fn name(&self) -> &'static str {
            "fake"
        }
    }

    fn template(id: &str, subject: &str, body: &str) -> MailTemplate {
        MailTemplate {
            id: id.into(),
            name: id.into(),
            subject: subject.into(),
            body: body.into(),
            keys: vec!["name".into()],
            provider_email: "no@x.com".into(),
            status: LifecycleStatus::Active,
        }
    }

    fn provider(email: &str) -> MailProvider {
        MailProvider {
            id: "p1".into(),
            email: email.into(),
            name: "No Reply".into(),
            host: "smtp.x.com".into(),
            port: 587,
            username: "user".into(),
            password: "secret".into(),
            encryption: Encryption::StartTls,
            status: LifecycleStatus::Active,
        }
    }

    fn service() -> FakeMailService {
        FakeMailService {
            templates: HashMap::from([(
                "t1".to_string(),
                template("t1", "Hi {{name}}", "Hello {{name}}!"),
            )]),
            providers: HashMap::from([("no@x.com".to_string(), provider("no@x.com"))]),
            ..Default::default()
        }
    }

    type Processor = MailJobProcessor<FakeMailService, HandlebarsRenderer, FakeTransport>;

    fn processor(
        service: FakeMailService,
        transport: FakeTransport,
        config: ProcessorConfig,
    ) -> (Processor, Arc<FakeMailService>, Arc<FakeTransport>) {
        let service = Arc::new(service);
        let transport = Arc::new(transport);
        let processor = MailJobProcessor::new(
            Arc::clone(&service),
            Arc::new(HandlebarsRenderer::new()),
            Arc::clone(&transport),
            config,
        );
        (processor, service, transport)
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    const ANN: &str = r#"{"provider":"no@x.com","to":"a@b.com","template":"t1","data":{"name":"Ann"}}"#;

    // ========================================================================
    // Happy path
    // ========================================================================

    #[tokio::test]
    async fn test_sends_rendered_mail_and_records_sent() {
        let (processor, service, transport) =
            processor(service(), FakeTransport::default(), ProcessorConfig::default());

        processor.process("job-1", ANN, deadline()).await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Hi Ann");
        assert_eq!(sent[0].body, "Hello Ann!");
        assert_eq!(sent[0].recipients, vec!["a@b.com"]);
        assert_eq!(service.statuses(), vec![MailStatus::Pending, MailStatus::Sent]);

        let events = service.events.lock().unwrap();
        assert!(events.iter().all(|e| e.job_id == "job-1"));
        assert_eq!(events[1].message, "Send mail success");
    }

    #[tokio::test]
    async fn test_history_carries_rendered_mail() {
        let (processor, service, _) =
            processor(service(), FakeTransport::default(), ProcessorConfig::default());

        processor.process("job-1", ANN, deadline()).await.unwrap();

        let history = service.history.lock().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].job_id, "job-1");
        assert_eq!(history[0].subject, "Hi Ann");
        assert_eq!(history[0].recipients, vec!["a@b.com"]);
        assert_eq!(history[0].data, r#"{"name":"Ann"}"#);
        assert_eq!(history[0].template_id, "t1");
        assert_eq!(history[0].provider_email, "no@x.com");
    }

    #[tokio::test]
    async fn test_inactive_template_is_still_used() {
        let mut svc = service();
        svc.templates.get_mut("t1").unwrap().status = LifecycleStatus::Inactive;
        let (processor, _, transport) =
            processor(svc, FakeTransport::default(), ProcessorConfig::default());

        processor.process("job-1", ANN, deadline()).await.unwrap();
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_steps_run_in_order() {
        use crate::service::MockMailService;

        let mut seq = mockall::Sequence::new();
        let mut service = MockMailService::new();
        service
            .expect_create_status_event()
            .withf(|event| event.status == MailStatus::Pending)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        service
            .expect_get_template()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(template("t1", "Hi {{name}}", "Hello {{name}}!"))));
        service
            .expect_get_provider()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(provider("no@x.com"))));
        service
            .expect_update_history()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        service
            .expect_create_status_event()
            .withf(|event| event.status == MailStatus::Sent)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let transport = Arc::new(FakeTransport::default());
        let processor = MailJobProcessor::new(
            Arc::new(service),
            Arc::new(HandlebarsRenderer::new()),
            Arc::clone(&transport),
            ProcessorConfig::default(),
        );

        processor.process("job-1", ANN, deadline()).await.unwrap();
        assert_eq!(transport.sent().len(), 1);
    }

    // ========================================================================
    // Failures
    // ========================================================================

    #[tokio::test]
    async fn test_malformed_payload_fails_without_remote_calls() {
        let (processor, service, transport) =
            processor(service(), FakeTransport::default(), ProcessorConfig::default());

        let err = processor.process("job-1", "{oops", deadline()).await.unwrap_err();

        assert!(matches!(err, MailError::Parse(_)));
        assert_eq!(service.statuses(), vec![MailStatus::Pending, MailStatus::Failed]);
        assert_eq!(service.provider_lookups.load(Ordering::SeqCst), 0);
        assert!(transport.sent().is_empty());
        assert!(service.events.lock().unwrap()[1].message.starts_with("Failed to parse payload"));
    }

    #[tokio::test]
    async fn test_unknown_template_never_sends() {
        let (processor, service, transport) =
            processor(service(), FakeTransport::default(), ProcessorConfig::default());
        let raw = r#"{"provider":"no@x.com","to":"a@b.com","template":"missing","data":{}}"#;

        let err = processor.process("job-1", raw, deadline()).await.unwrap_err();

        assert!(matches!(err, MailError::TemplateNotFound(_)));
        assert_eq!(err.category(), ErrorCategory::Permanent);
        assert_eq!(service.statuses(), vec![MailStatus::Pending, MailStatus::Failed]);
        assert_eq!(service.provider_lookups.load(Ordering::SeqCst), 0);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_render_failure_stops_before_provider_lookup() {
        let (processor, service, transport) =
            processor(service(), FakeTransport::default(), ProcessorConfig::default());
        let raw = r#"{"provider":"no@x.com","to":"a@b.com","template":"t1","data":{}}"#;

        let err = processor.process("job-1", raw, deadline()).await.unwrap_err();

        assert!(matches!(err, MailError::Render(_)));
        assert_eq!(service.provider_lookups.load(Ordering::SeqCst), 0);
        assert!(transport.sent().is_empty());
        assert_eq!(service.statuses(), vec![MailStatus::Pending, MailStatus::Failed]);
    }

    #[tokio::test]
    async fn test_unknown_provider_never_sends() {
        let (processor, service, transport) =
            processor(service(), FakeTransport::default(), ProcessorConfig::default());
        let raw = r#"{"provider":"nobody@x.com","to":"a@b.com","template":"t1","data":{"name":"Ann"}}"#;

        let err = processor.process("job-1", raw, deadline()).await.unwrap_err();

        assert!(matches!(err, MailError::ProviderNotFound(_)));
        assert_eq!(service.provider_lookups.load(Ordering::SeqCst), 1);
        assert!(transport.sent().is_empty());
        assert_eq!(service.statuses(), vec![MailStatus::Pending, MailStatus::Failed]);
    }

    #[tokio::test]
    async fn test_send_failure_is_transient_and_skips_history() {
        let transport = FakeTransport {
            fail: true,
            ..Default::default()
        };
        let (processor, service, _) = processor(service(), transport, ProcessorConfig::default());

        let err = processor.process("job-1", ANN, deadline()).await.unwrap_err();

        assert!(matches!(err, MailError::SendFailed(_)));
        assert_eq!(err.category(), ErrorCategory::Transient);
        assert!(service.history.lock().unwrap().is_empty());
        assert_eq!(service.statuses(), vec![MailStatus::Pending, MailStatus::Failed]);
    }

    #[tokio::test]
    async fn test_history_failure_after_send_is_permanent() {
        let svc = FakeMailService {
            fail_history: true,
            ..service()
        };
        let (processor, service, transport) =
            processor(svc, FakeTransport::default(), ProcessorConfig::default());

        let err = processor.process("job-1", ANN, deadline()).await.unwrap_err();

        assert!(matches!(err, MailError::HistoryUpdateFailed(_)));
        assert_eq!(err.category(), ErrorCategory::Permanent);
        assert_eq!(transport.sent().len(), 1);
        assert_eq!(service.statuses(), vec![MailStatus::Pending, MailStatus::Failed]);
    }

    #[tokio::test]
    async fn test_status_failures_do_not_fail_the_job() {
        let svc = FakeMailService {
            fail_status: true,
            ..service()
        };
        let (processor, _, transport) =
            processor(svc, FakeTransport::default(), ProcessorConfig::default());

        processor.process("job-1", ANN, deadline()).await.unwrap();
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_endpoint_is_permanent() {
        let svc = FakeMailService {
            template_unconfigured: true,
            ..service()
        };
        let (processor, _, transport) =
            processor(svc, FakeTransport::default(), ProcessorConfig::default());

        let err = processor.process("job-1", ANN, deadline()).await.unwrap_err();

        assert!(matches!(err, MailError::Pool(PoolError::EndpointUnconfigured(_))));
        assert_eq!(err.category(), ErrorCategory::Permanent);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_deadline_during_send_is_never_retried() {
        let transport = FakeTransport {
            linger: Some(Duration::from_millis(300)),
            ..Default::default()
        };
        let (processor, service, transport) =
            processor(service(), transport, ProcessorConfig::default());

        let err = processor
            .process("job-1", ANN, Instant::now() + Duration::from_millis(50))
            .await
            .unwrap_err();

        assert_eq!(transport.sent().len(), 1);
        assert!(matches!(err, MailError::SendInterrupted(_)));
        assert_eq!(err.category(), ErrorCategory::Permanent);
        assert!(service.history.lock().unwrap().is_empty());
        assert_eq!(service.statuses(), vec![MailStatus::Pending, MailStatus::Failed]);

        let stream: StreamError = err.into();
        assert_eq!(stream.category(), ErrorCategory::Permanent);
    }

    #[tokio::test]
    async fn test_expired_deadline_skips_send() {
        let (processor, _, transport) =
            processor(service(), FakeTransport::default(), ProcessorConfig::default());

        let err = processor
            .process("job-1", ANN, Instant::now() - Duration::from_millis(1))
            .await
            .unwrap_err();

        assert!(transport.sent().is_empty());
        assert!(matches!(err, MailError::SendFailed(ref msg) if msg.contains("before send")));
    }

    #[tokio::test]
    async fn test_deadline_fails_the_blocking_step() {
        let svc = FakeMailService {
            template_delay: Some(Duration::from_secs(2)),
            ..service()
        };
        let (processor, service, transport) =
            processor(svc, FakeTransport::default(), ProcessorConfig::default());

        let started = std::time::Instant::now();
        let err = processor
            .process("job-1", ANN, Instant::now() + Duration::from_millis(50))
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(matches!(
            err,
            MailError::TemplateNotFound(ref msg) if msg.contains("deadline exceeded")
        ));
        assert!(transport.sent().is_empty());
        assert_eq!(service.statuses(), vec![MailStatus::Pending, MailStatus::Failed]);
    }

    // ========================================================================
    // Recipients
    // ========================================================================

    #[tokio::test]
    async fn test_test_recipients_replace_payload_recipients() {
        let config = ProcessorConfig::default()
            .with_production(false)
            .with_test_recipients(vec!["qa@x.com".into()], false);
        let (processor, _, transport) = processor(service(), FakeTransport::default(), config);
        let raw = r#"{"provider":"no@x.com","tos":["a@b.com","c@d.com"],"template":"t1","data":{"name":"Ann"}}"#;

        processor.process("job-1", raw, deadline()).await.unwrap();

        assert_eq!(transport.sent()[0].recipients, vec!["qa@x.com"]);
    }

    #[test]
    fn test_resolve_recipients_rules() {
        let payload =
            JobPayload::parse(r#"{"provider":"p","to":"a@b.com","template":"t"}"#).unwrap();
        let testers = vec!["qa@x.com".to_string()];

        let production = ProcessorConfig::default().with_test_recipients(testers.clone(), false);
        assert_eq!(production.resolve_recipients(&payload), vec!["a@b.com"]);

        let no_list = ProcessorConfig::default().with_production(false);
        assert_eq!(no_list.resolve_recipients(&payload), vec!["a@b.com"]);

        let append = ProcessorConfig::default()
            .with_production(false)
            .with_test_recipients(testers, true);
        assert_eq!(append.resolve_recipients(&payload), vec!["a@b.com", "qa@x.com"]);
    }

    // ========================================================================
    // Queue handler
    // ========================================================================

    #[tokio::test]
    async fn test_handler_maps_failures_to_stream_errors() {
        let (processor, service, _) =
            processor(service(), FakeTransport::default(), ProcessorConfig::default());
        let entry = StreamEntry {
            queue: "mail:default".into(),
            entry_id: "1-0".into(),
            job_id: "history-9".into(),
            payload: r#"{"provider":"no@x.com","to":"a@b.com","template":"missing"}"#.into(),
            retry_count: 0,
        };

        let err = processor.handle(&entry, deadline()).await.unwrap_err();

        assert_eq!(err.kind(), "template_not_found");
        assert_eq!(err.category(), ErrorCategory::Permanent);
        assert_eq!(service.events.lock().unwrap()[0].job_id, "history-9");
    }
}
