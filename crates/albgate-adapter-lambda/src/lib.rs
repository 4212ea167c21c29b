//! Runs `albgate-core` handlers as AWS Lambda functions behind an Application Load Balancer.
//!
//! Each load balancer event becomes an `http::Request`, the handler writes into an in-memory
//! recorder, and the recorder becomes the reply the load balancer expects.

mod context;
mod error;
mod event;
mod gateway;
mod logger;
mod request;
mod response;

pub use context::{
    invocation_context, target_group_context, target_group_context_in,
    with_target_group_context, LambdaRequestContext,
};
pub use error::GatewayError;
pub use event::{ElbContext, TargetGroupRequest, TargetGroupRequestContext, TargetGroupResponse};
pub use gateway::Gateway;
pub use logger::{init_logger, LambdaLogging, LAMBDA_LOG_LEVEL_ENV, RUST_LOG_ENV};
pub use request::into_core_request;
pub use response::ResponseRecorder;

use albgate_core::handler::BoxHandler;

/// Serve load balancer events with `handler`, or with a plain 404 handler when `None`.
///
/// Logging is configured from the environment first. Only returns once the Lambda runtime stops.
pub async fn listen_and_serve(handler: Option<BoxHandler>) -> Result<(), lambda_runtime::Error> {
    run_with_logging(LambdaLogging::from_env(), Gateway::with_handler(handler)).await
}

pub async fn run_with_logging(
    logging: LambdaLogging,
    gateway: Gateway,
) -> Result<(), lambda_runtime::Error> {
    // A second logger install (e.g. the host already set one) is not fatal.
    if init_logger(logging.effective_level()).is_err() {
        log::debug!("logger already installed; keeping existing configuration");
    }
    gateway.run().await
}
