use std::sync::Arc;

use albgate_core::handler::{BoxHandler, Handler, NotFound, ServiceHandler};
use albgate_core::http::Extensions;
use lambda_runtime::{service_fn, LambdaEvent};
use log::{debug, error};

use crate::error::GatewayError;
use crate::event::{TargetGroupRequest, TargetGroupResponse};
use crate::request::into_core_request;
use crate::response::ResponseRecorder;

/// Serves load balancer events with a single [`Handler`].
#[derive(Clone)]
pub struct Gateway {
    handler: BoxHandler,
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new(NotFound)
    }
}

impl Gateway {
    pub fn new<H>(handler: H) -> Self
    where
        H: Handler + 'static,
    {
        Self {
            handler: Arc::new(handler),
        }
    }

    /// Use `handler` when present, [`NotFound`] otherwise.
    pub fn with_handler(handler: Option<BoxHandler>) -> Self {
        handler.map_or_else(Self::default, |handler| Self { handler })
    }

    /// Serve events with a `tower_service::Service`.
    pub fn from_service<S>(service: S) -> Self
    where
        ServiceHandler<S>: Handler + 'static,
    {
        Self::new(ServiceHandler::new(service))
    }

    pub fn handler(&self) -> &BoxHandler {
        &self.handler
    }

    /// Handle one event: translate it, run the handler against a fresh recorder and return the
    /// finalised reply.
    pub fn invoke(
        &self,
        base: Extensions,
        event: TargetGroupRequest,
    ) -> Result<TargetGroupResponse, GatewayError> {
        let request = into_core_request(base, event).inspect_err(|err| {
            error!("failed to translate load balancer event: {err}");
        })?;

        let mut recorder = ResponseRecorder::new();
        self.handler.serve(request, &mut recorder);
        let reply = recorder.end();

        debug!(
            "reply {} ({} body chars, base64: {})",
            reply.status_code,
            reply.body.len(),
            reply.is_base64_encoded
        );
        Ok(reply)
    }

    /// Poll the Lambda runtime API for events until the runtime shuts down.
    ///
    /// The runtime's invocation context is placed in each request's extensions; read it with
    /// [`crate::invocation_context`].
    pub async fn run(self) -> Result<(), lambda_runtime::Error> {
        lambda_runtime::run(service_fn(move |event: LambdaEvent<TargetGroupRequest>| {
            let gateway = self.clone();
            async move {
                let (payload, context) = event.into_parts();
                debug!("invocation {}", context.request_id);
                let mut base = Extensions::new();
                base.insert(context);
                gateway
                    .invoke(base, payload)
                    .map_err(lambda_runtime::Error::from)
            }
        }))
        .await
    }
}
