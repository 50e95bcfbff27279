//! Host side of the sandbox: posts render requests and correlates responses.
//!
//! The host never blocks on a render. It records the newest `renderId` and
//! drops any response for an older one, so a slow render can never overwrite
//! the display of a newer request. Requests issued before the context has
//! signalled readiness are held (newest only) and flushed on the ready
//! signal. A request still loading when its context is replaced is held
//! again for the replacement.

use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use crate::config::SandboxConfig;
use crate::errors::SandboxError;

use super::context::{IsolatedContext, spawn_context};
use super::protocol::{InboundMessage, Origin, RenderRequest, RunnerMessage};

/// What the pane shows for the current artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RenderStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    Error(String),
}

impl RenderStatus {
    pub fn is_settled(&self) -> bool {
        matches!(self, RenderStatus::Ready | RenderStatus::Error(_))
    }
}

type ContextFactory = Box<dyn Fn() -> Result<Box<dyn IsolatedContext>, SandboxError> + Send>;

pub struct SandboxHost {
    context: Box<dyn IsolatedContext>,
    factory: Option<ContextFactory>,
    expected_origin: Origin,
    context_ready: bool,
    pending: Option<RenderRequest>,
    latest: Option<String>,
    latest_request: Option<RenderRequest>,
    issued_at: Option<Instant>,
    status: RenderStatus,
    render_timeout: Option<Duration>,
}

enum Wake {
    Message(Option<InboundMessage>),
    Deadline,
}

impl SandboxHost {
    pub fn new(
        context: Box<dyn IsolatedContext>,
        expected_origin: Origin,
        render_timeout: Option<Duration>,
    ) -> Self {
        Self {
            context,
            factory: None,
            expected_origin,
            context_ready: false,
            pending: None,
            latest: None,
            latest_request: None,
            issued_at: None,
            status: RenderStatus::Idle,
            render_timeout,
        }
    }

    /// Spawn the configured context; timed-out contexts are replaced with a
    /// fresh one of the same kind.
    pub fn from_config(config: &SandboxConfig) -> Result<Self, SandboxError> {
        let context = spawn_context(config)?;
        let factory_config = config.clone();
        let mut host = Self::new(
            context,
            Origin::parse(&config.host_origin),
            config.render_timeout,
        );
        host.factory = Some(Box::new(move || spawn_context(&factory_config)));
        Ok(host)
    }

    pub fn status(&self) -> &RenderStatus {
        &self.status
    }

    pub fn latest_render_id(&self) -> Option<&str> {
        self.latest.as_deref()
    }

    pub fn is_context_ready(&self) -> bool {
        self.context_ready
    }

    /// Request a render under a fresh `renderId`, superseding any in flight.
    pub fn render(&mut self, code: impl Into<String>) -> Result<String, SandboxError> {
        let render_id = Uuid::new_v4().to_string();
        self.render_with_id(code, render_id.clone())?;
        Ok(render_id)
    }

    pub fn render_with_id(
        &mut self,
        code: impl Into<String>,
        render_id: impl Into<String>,
    ) -> Result<(), SandboxError> {
        let request = RenderRequest::new(code, render_id);
        self.latest = Some(request.render_id.clone());
        self.latest_request = Some(request.clone());
        self.status = RenderStatus::Loading;
        self.issued_at = Some(Instant::now());

        if self.context_ready {
            self.context.post(&request)?;
        } else {
            tracing::trace!(render_id = %request.render_id, "context not ready; holding request");
            self.pending = Some(request);
        }
        Ok(())
    }

    fn origin_accepted(&self, origin: &Origin) -> bool {
        *origin == Origin::Opaque || *origin == self.expected_origin
    }

    /// Apply one inbound message. Returns `true` when the status changed.
    pub fn handle_inbound(&mut self, inbound: InboundMessage) -> bool {
        if !self.origin_accepted(&inbound.origin) {
            tracing::debug!(origin = %inbound.origin, expected = %self.expected_origin, "ignoring message from unexpected origin");
            return false;
        }

        match inbound.message {
            RunnerMessage::Ready(signal) => {
                if !signal.ready {
                    return false;
                }
                tracing::debug!(version = %signal.version, "artifact runner ready");
                self.context_ready = true;
                match self.pending.take() {
                    Some(request) => match self.context.post(&request) {
                        Ok(()) => false,
                        Err(e) => {
                            self.status = RenderStatus::Error(e.to_string());
                            true
                        }
                    },
                    None => false,
                }
            }
            RunnerMessage::Rendered(response) => {
                if self.latest.as_deref() != Some(response.render_id.as_str()) {
                    tracing::debug!(render_id = %response.render_id, latest = ?self.latest, "discarding stale render response");
                    return false;
                }
                self.issued_at = None;
                self.latest_request = None;
                self.status = if response.is_ok() {
                    RenderStatus::Ready
                } else {
                    RenderStatus::Error(response.message.unwrap_or_default())
                };
                true
            }
        }
    }

    fn deadline(&self) -> Option<Instant> {
        match (self.render_timeout, self.issued_at) {
            (Some(timeout), Some(issued)) if self.status == RenderStatus::Loading => Some(issued + timeout),
            _ => None,
        }
    }

    /// Fail the latest render if it has been silent past the deadline.
    /// Returns `true` when it did.
    pub fn check_deadline(&mut self, now: Instant) -> bool {
        let Some(deadline) = self.deadline() else {
            return false;
        };
        if now < deadline {
            return false;
        }

        let waited = self.render_timeout.unwrap_or_default();
        tracing::warn!(render_id = ?self.latest, timeout_ms = waited.as_millis() as u64, "artifact render timed out");
        self.status = RenderStatus::Error(format!(
            "Artifact render timed out after {} ms.",
            waited.as_millis()
        ));
        self.issued_at = None;
        self.recycle();
        true
    }

    /// Tear the context down and, when possible, spawn a fresh one. Code
    /// already running in the old context is abandoned, not interrupted.
    fn recycle(&mut self) {
        match self.factory.as_ref().map(|factory| factory()) {
            Some(Ok(context)) => self.replace_context(context),
            Some(Err(e)) => {
                tracing::warn!(error = %e, "failed to respawn artifact runner");
                self.detach();
            }
            None => self.detach(),
        }
    }

    fn detach(&mut self) {
        self.context.teardown();
        self.context_ready = false;
        self.pending = None;
    }

    /// Swap in a new isolated context, e.g. when the pane is re-opened. A
    /// render still loading is held until the new context is ready.
    pub fn replace_context(&mut self, context: Box<dyn IsolatedContext>) {
        self.context.teardown();
        self.context = context;
        self.context_ready = false;
        self.pending = match self.status {
            RenderStatus::Loading => self.latest_request.clone(),
            _ => None,
        };
        if let Some(request) = &self.pending {
            tracing::debug!(render_id = %request.render_id, "holding in-flight request for replacement context");
            self.issued_at = Some(Instant::now());
        }
    }

    /// Wait for the next status change. `None` once the context is gone.
    pub async fn next_update(&mut self) -> Option<RenderStatus> {
        loop {
            let deadline = self.deadline();
            let wake = {
                let recv = self.context.recv();
                match deadline {
                    Some(deadline) => tokio::select! {
                        message = recv => Wake::Message(message),
                        _ = tokio::time::sleep_until(deadline) => Wake::Deadline,
                    },
                    None => Wake::Message(recv.await),
                }
            };

            match wake {
                Wake::Message(None) => return None,
                Wake::Message(Some(inbound)) => {
                    if self.handle_inbound(inbound) {
                        return Some(self.status.clone());
                    }
                }
                Wake::Deadline => {
                    if self.check_deadline(Instant::now()) {
                        return Some(self.status.clone());
                    }
                }
            }
        }
    }

    /// Render and wait for the outcome of that request.
    pub async fn render_and_wait(
        &mut self,
        code: impl Into<String>,
    ) -> Result<RenderStatus, SandboxError> {
        self.render(code)?;
        while let Some(status) = self.next_update().await {
            if status.is_settled() {
                return Ok(status);
            }
        }
        Err(SandboxError::ContextClosed)
    }
}

impl Drop for SandboxHost {
    fn drop(&mut self) {
        self.context.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RenderError;
    use crate::sandbox::compiler::CompiledModule;
    use crate::sandbox::context::ThreadContext;
    use crate::sandbox::engine::EngineRuntime;
    use crate::sandbox::protocol::{ReadySignal, RenderResponse};
    use crate::sandbox::runtime::{Component, ComponentRuntime};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    /// Records posted requests; replies are scripted by the test.
    struct ScriptedContext {
        posted: Arc<Mutex<Vec<RenderRequest>>>,
        inbound: mpsc::UnboundedReceiver<InboundMessage>,
    }

    #[async_trait]
    impl IsolatedContext for ScriptedContext {
        fn post(&mut self, request: &RenderRequest) -> Result<(), SandboxError> {
            self.posted.lock().unwrap().push(request.clone());
            Ok(())
        }

        async fn recv(&mut self) -> Option<InboundMessage> {
            self.inbound.recv().await
        }

        fn teardown(&mut self) {
            self.inbound.close();
        }
    }

    fn scripted_context() -> (
        ScriptedContext,
        Arc<Mutex<Vec<RenderRequest>>>,
        mpsc::UnboundedSender<InboundMessage>,
    ) {
        let posted = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::unbounded_channel();
        let context = ScriptedContext {
            posted: posted.clone(),
            inbound: rx,
        };
        (context, posted, tx)
    }

    fn scripted() -> (
        SandboxHost,
        Arc<Mutex<Vec<RenderRequest>>>,
        mpsc::UnboundedSender<InboundMessage>,
    ) {
        let (context, posted, tx) = scripted_context();
        let host = SandboxHost::new(
            Box::new(context),
            Origin::parse("http://127.0.0.1:3141"),
            None,
        );
        (host, posted, tx)
    }

    fn ready() -> InboundMessage {
        InboundMessage::opaque(RunnerMessage::Ready(ReadySignal {
            ready: true,
            version: "1".to_string(),
        }))
    }

    fn rendered(response: RenderResponse) -> InboundMessage {
        InboundMessage::opaque(RunnerMessage::Rendered(response))
    }

    #[test]
    fn test_requests_wait_for_ready_signal() {
        let (mut host, posted, _tx) = scripted();
        host.render_with_id("a", "r1").unwrap();
        host.render_with_id("b", "r2").unwrap();
        assert!(posted.lock().unwrap().is_empty());

        host.handle_inbound(ready());
        let posted = posted.lock().unwrap();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].render_id, "r2");
    }

    #[test]
    fn test_stale_response_is_discarded() {
        let (mut host, posted, _tx) = scripted();
        host.handle_inbound(ready());
        host.render_with_id("code-1", "r1").unwrap();
        host.render_with_id("code-2", "r2").unwrap();
        assert_eq!(posted.lock().unwrap().len(), 2);

        assert!(!host.handle_inbound(rendered(RenderResponse::ok("r1"))));
        assert_eq!(host.status(), &RenderStatus::Loading);

        assert!(host.handle_inbound(rendered(RenderResponse::error("r2", "SyntaxError (line 1): x"))));
        assert_eq!(
            host.status(),
            &RenderStatus::Error("SyntaxError (line 1): x".to_string())
        );
    }

    #[test]
    fn test_foreign_origin_is_ignored() {
        let (mut host, _posted, _tx) = scripted();
        host.handle_inbound(ready());
        host.render_with_id("code", "r1").unwrap();

        let forged = InboundMessage {
            origin: Origin::Url("https://evil.example".to_string()),
            message: RunnerMessage::Rendered(RenderResponse::ok("r1")),
        };
        assert!(!host.handle_inbound(forged));
        assert_eq!(host.status(), &RenderStatus::Loading);

        let same_origin = InboundMessage {
            origin: Origin::parse("http://127.0.0.1:3141/"),
            message: RunnerMessage::Rendered(RenderResponse::ok("r1")),
        };
        assert!(host.handle_inbound(same_origin));
        assert_eq!(host.status(), &RenderStatus::Ready);
    }

    #[test]
    fn test_replaced_context_receives_loading_request() {
        let (mut host, first, _tx) = scripted();
        host.handle_inbound(ready());
        host.render_with_id("code-1", "r1").unwrap();
        assert_eq!(first.lock().unwrap().len(), 1);

        let (context, second, _tx2) = scripted_context();
        host.replace_context(Box::new(context));
        assert!(!host.is_context_ready());
        assert!(second.lock().unwrap().is_empty());

        host.handle_inbound(ready());
        let second = second.lock().unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].render_id, "r1");
        assert_eq!(second[0].code, "code-1");
        assert_eq!(host.status(), &RenderStatus::Loading);
    }

    #[test]
    fn test_replaced_context_holds_nothing_once_settled() {
        let (mut host, _first, _tx) = scripted();
        host.handle_inbound(ready());
        host.render_with_id("code-1", "r1").unwrap();
        host.handle_inbound(rendered(RenderResponse::ok("r1")));

        let (context, second, _tx2) = scripted_context();
        host.replace_context(Box::new(context));
        host.handle_inbound(ready());
        assert!(second.lock().unwrap().is_empty());
        assert_eq!(host.status(), &RenderStatus::Ready);
    }

    #[test]
    fn test_timed_out_request_is_not_replayed() {
        let (mut host, _first, _tx) = scripted();
        let (context, second, _tx2) = scripted_context();
        let spare = Mutex::new(Some(Box::new(context) as Box<dyn IsolatedContext>));
        host.factory = Some(Box::new(move || {
            spare.lock().unwrap().take().ok_or(SandboxError::ContextClosed)
        }));
        host.render_timeout = Some(Duration::from_millis(10));
        host.handle_inbound(ready());
        host.render_with_id("while(true){}", "r1").unwrap();

        assert!(host.check_deadline(Instant::now() + Duration::from_millis(20)));
        host.handle_inbound(ready());
        assert!(second.lock().unwrap().is_empty());
    }

    #[test]
    fn test_deadline_only_with_timeout() {
        let (mut host, _posted, _tx) = scripted();
        host.render_with_id("code", "r1").unwrap();
        assert!(!host.check_deadline(Instant::now() + Duration::from_secs(3600)));
    }

    #[tokio::test]
    async fn test_watchdog_fails_silent_render() {
        let (mut host, _posted, _tx) = scripted();
        host.render_timeout = Some(Duration::from_millis(100));
        host.handle_inbound(ready());
        host.render_with_id("while(true){}", "r1").unwrap();

        assert!(!host.check_deadline(Instant::now()));
        assert!(host.check_deadline(Instant::now() + Duration::from_millis(150)));
        assert_eq!(
            host.status(),
            &RenderStatus::Error("Artifact render timed out after 100 ms.".to_string())
        );
        assert!(!host.is_context_ready());

        // Settled renders do not time out twice
        assert!(!host.check_deadline(Instant::now() + Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_next_update_times_out() {
        let (mut host, _posted, _tx) = scripted();
        host.render_timeout = Some(Duration::from_millis(20));
        host.handle_inbound(ready());
        host.render_with_id("code", "r1").unwrap();

        let status = host.next_update().await.unwrap();
        assert!(matches!(status, RenderStatus::Error(m) if m.contains("timed out")));
    }

    #[tokio::test]
    async fn test_next_update_skips_stale() {
        let (mut host, _posted, tx) = scripted();
        tx.send(ready()).unwrap();
        host.render_with_id("one", "r1").unwrap();
        host.render_with_id("two", "r2").unwrap();
        tx.send(rendered(RenderResponse::ok("r1"))).unwrap();
        tx.send(rendered(RenderResponse::ok("r2"))).unwrap();

        assert_eq!(host.next_update().await, Some(RenderStatus::Ready));
        assert_eq!(host.latest_render_id(), Some("r2"));
    }

    #[tokio::test]
    async fn test_render_and_wait_with_thread_context() {
        let context = ThreadContext::spawn().unwrap();
        let mut host = SandboxHost::new(Box::new(context), Origin::Opaque, None);

        let status = host
            .render_and_wait("export default function A() { return <div/>; }")
            .await
            .unwrap();
        assert_eq!(status, RenderStatus::Ready);

        let status = host.render_and_wait("export default {};").await.unwrap();
        assert!(matches!(status, RenderStatus::Error(m) if m.contains("not a function")));
    }

    /// Holds any program mentioning `holdUntilReleased` until the test
    /// releases it.
    struct GatedRuntime {
        inner: EngineRuntime,
        entered: std::sync::mpsc::Sender<()>,
        release: std::sync::mpsc::Receiver<()>,
    }

    impl ComponentRuntime for GatedRuntime {
        fn evaluate(&mut self, module: &CompiledModule) -> Result<Component, RenderError> {
            if module.program.contains("holdUntilReleased") {
                let _ = self.entered.send(());
                let _ = self.release.recv();
            }
            self.inner.evaluate(module)
        }
    }

    #[tokio::test]
    async fn test_blocked_render_is_superseded_by_newer_request() {
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let context = ThreadContext::with_runtime(GatedRuntime {
            inner: EngineRuntime::default(),
            entered: entered_tx,
            release: release_rx,
        })
        .unwrap();
        let mut host = SandboxHost::new(Box::new(context), Origin::Opaque, None);

        let slow = "const holdUntilReleased = true;\nexport default function Slow() { return <p>slow</p>; }";
        host.render_with_id(slow, "r1").unwrap();
        // Delivers the ready signal and flushes r1, which then blocks
        let idle = tokio::time::timeout(Duration::from_millis(200), host.next_update()).await;
        assert!(idle.is_err());
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        host.render_with_id("export default 42;", "r2").unwrap();
        release_tx.send(()).unwrap();

        let status = tokio::time::timeout(Duration::from_secs(10), host.next_update())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(&status, RenderStatus::Error(m) if m.contains("a number")), "{:?}", status);
        assert_eq!(host.latest_render_id(), Some("r2"));

        let extra = tokio::time::timeout(Duration::from_millis(200), host.next_update()).await;
        assert!(extra.is_err());
    }
}
