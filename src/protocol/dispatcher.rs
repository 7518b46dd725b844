use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, instrument, warn};

use crate::core::frame::{Request, Response, MAX_PAYLOAD_SIZE};
use crate::core::status::StatusCode;
use crate::error::constants::{ERR_AUX_NOT_CONFIGURED, ERR_HANDLER_PANICKED, ERR_RESULT_TOO_LARGE};
use crate::protocol::access::{AccessGate, CallerIdentity, TrustPolicy};
use crate::protocol::registry::{Dispatch, HandlerEntry, HandlerFn, HandlerRegistry};
use crate::transport::aux::AuxForwarder;
use crate::utils::metrics::{Metrics, Timer};
use crate::utils::timeout::AUX_REQUEST_TIMEOUT;

/// Request pipeline: lookup, access check, length check, then a local handler
/// or the aux link.
///
/// The order is fixed. Unauthorised callers never cost an aux round trip and
/// no handler ever sees a payload outside its declared bounds.
pub struct EngineCore {
    registry: Arc<HandlerRegistry>,
    gate: AccessGate,
    aux: Option<Arc<dyn AuxForwarder>>,
    aux_timeout: Duration,
    frame_limit: usize,
    metrics: Arc<Metrics>,
}

impl EngineCore {
    pub fn new(registry: HandlerRegistry, policy: TrustPolicy) -> Self {
        let registry = Arc::new(registry);
        Self {
            gate: AccessGate::new(policy, registry.clone()),
            registry,
            aux: None,
            aux_timeout: AUX_REQUEST_TIMEOUT,
            frame_limit: MAX_PAYLOAD_SIZE,
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn with_aux(mut self, aux: Arc<dyn AuxForwarder>, timeout: Duration) -> Self {
        self.aux = Some(aux);
        self.aux_timeout = timeout;
        self
    }

    /// Largest result a local handler may return.
    pub fn with_frame_limit(mut self, frame_limit: usize) -> Self {
        self.frame_limit = frame_limit;
        self
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn frame_limit(&self) -> usize {
        self.frame_limit
    }

    pub fn has_aux(&self) -> bool {
        self.aux.is_some()
    }

    /// Answer one request. Never fails: every outcome is a status.
    #[instrument(
        level = "debug",
        skip(self, request, caller),
        fields(
            command_id = request.command_id,
            sequence_id = request.sequence_id,
            uid = ?caller.uid
        )
    )]
    pub async fn handle(&self, request: Request, caller: &CallerIdentity) -> Response {
        let sequence_id = request.sequence_id;
        let response = match self.dispatch(request, caller).await {
            Ok(response) => response.with_sequence_id(sequence_id),
            Err(status) => Response::from_status(sequence_id, status),
        };
        self.metrics.record_outcome(response.status());
        debug!(status = %response.status(), "Request handled");
        response
    }

    async fn dispatch(
        &self,
        request: Request,
        caller: &CallerIdentity,
    ) -> Result<Response, StatusCode> {
        let entry = self.registry.lookup(request.command_id)?;
        self.gate.authorize(request.command_id, caller)?;
        HandlerRegistry::validate_length(entry, request.payload.len())?;

        match &entry.dispatch {
            Dispatch::Local(handler) => {
                self.metrics.request_local();
                self.run_local(entry, handler.clone(), request).await
            }
            Dispatch::Forwarded => {
                self.metrics.request_forwarded();
                self.forward(request).await
            }
        }
    }

    async fn run_local(
        &self,
        entry: &HandlerEntry,
        handler: HandlerFn,
        request: Request,
    ) -> Result<Response, StatusCode> {
        let payload = request.payload;
        let _timer = Timer::start("local_handler");
        // handlers may block on peripheral I/O
        let outcome = tokio::task::spawn_blocking(move || handler(&payload[..])).await;

        match outcome {
            Ok(Ok(result)) if result.len() > self.frame_limit => {
                warn!(
                    command = %entry.name,
                    len = result.len(),
                    limit = self.frame_limit,
                    "{ERR_RESULT_TOO_LARGE}"
                );
                Err(StatusCode::InternalError)
            }
            Ok(Ok(result)) => Ok(Response::success(request.sequence_id, result)),
            Ok(Err(failure)) => {
                debug!(
                    command = %entry.name,
                    code = failure.code,
                    reason = %failure.reason,
                    "Handler reported failure"
                );
                Err(StatusCode::HandlerFailure(failure.code))
            }
            Err(join_error) => {
                error!(command = %entry.name, error = %join_error, "{ERR_HANDLER_PANICKED}");
                Err(StatusCode::InternalError)
            }
        }
    }

    async fn forward(&self, request: Request) -> Result<Response, StatusCode> {
        let Some(aux) = &self.aux else {
            warn!(command_id = request.command_id, "{ERR_AUX_NOT_CONFIGURED}");
            return Err(StatusCode::AuxUnreachable);
        };
        Ok(aux.forward(request, self.aux_timeout).await)
    }
}
