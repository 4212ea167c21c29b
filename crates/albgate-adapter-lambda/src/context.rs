use std::net::IpAddr;

use albgate_core::http::{Extensions, Request};

use crate::event::TargetGroupRequestContext;

/// Lookup key for the load balancer routing block. Private so nothing else can read or overwrite
/// the slot through `Extensions`.
#[derive(Clone)]
struct TargetGroupContextKey(TargetGroupRequestContext);

/// Attach the routing block of an event to `extensions`.
pub fn with_target_group_context(
    mut extensions: Extensions,
    context: TargetGroupRequestContext,
) -> Extensions {
    extensions.insert(TargetGroupContextKey(context));
    extensions
}

/// Routing block of the event a request was translated from.
///
/// `None` for requests that did not come through the gateway.
pub fn target_group_context(request: &Request) -> Option<&TargetGroupRequestContext> {
    target_group_context_in(request.extensions())
}

pub fn target_group_context_in(extensions: &Extensions) -> Option<&TargetGroupRequestContext> {
    extensions
        .get::<TargetGroupContextKey>()
        .map(|TargetGroupContextKey(context)| context)
}

/// Invocation metadata (request id, deadline, function ARN) of the Lambda call serving `request`.
pub fn invocation_context(request: &Request) -> Option<&lambda_runtime::Context> {
    request.extensions().get::<lambda_runtime::Context>()
}

/// Connection data recovered from the load balancer headers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LambdaRequestContext {
    pub host: Option<String>,
    pub remote_addr: Option<IpAddr>,
}

impl LambdaRequestContext {
    pub fn insert(request: &mut Request, context: LambdaRequestContext) {
        request.extensions_mut().insert(context);
    }

    pub fn get(request: &Request) -> Option<&LambdaRequestContext> {
        request.extensions().get::<LambdaRequestContext>()
    }
}
