use std::sync::Arc;

use albgate_adapter_lambda::{
    invocation_context, listen_and_serve, target_group_context, LambdaRequestContext,
};
use albgate_core::http::header::CONTENT_TYPE;
use albgate_core::{handler_fn, HeaderValue, Method, Request, ResponseWriter, StatusCode};
use log::info;
use serde_json::json;

fn app(request: Request, writer: &mut dyn ResponseWriter) {
    info!("{} {}", request.method(), request.uri());

    match (request.method(), request.uri().path()) {
        (&Method::GET, "/") => {
            text(writer);
            writer.write(b"AlbGate Demo App");
        }
        (&Method::GET, "/whoami") => {
            let connection = LambdaRequestContext::get(&request).cloned().unwrap_or_default();
            let payload = json!({
                "host": connection.host,
                "client": connection.remote_addr.map(|addr| addr.to_string()),
                "targetGroupArn": target_group_context(&request)
                    .map(|ctx| ctx.elb.target_group_arn.as_str()),
                "requestId": invocation_context(&request).map(|ctx| ctx.request_id.as_str()),
                "traceId": request
                    .headers()
                    .get("x-amzn-trace-id")
                    .and_then(|value| value.to_str().ok()),
            });
            writer
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            writer.write(payload.to_string().as_bytes());
        }
        (&Method::POST, "/echo") => {
            if let Some(content_type) = request.headers().get(CONTENT_TYPE).cloned() {
                writer.headers_mut().insert(CONTENT_TYPE, content_type);
            }
            writer.write(request.body().as_bytes());
        }
        _ => {
            text(writer);
            writer.write_header(StatusCode::NOT_FOUND);
            writer.write(format!("no route for {}\n", request.uri().path()).as_bytes());
        }
    }
}

fn text(writer: &mut dyn ResponseWriter) {
    writer.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
}

#[tokio::main]
async fn main() -> Result<(), lambda_runtime::Error> {
    listen_and_serve(Some(Arc::new(handler_fn(app)))).await
}
