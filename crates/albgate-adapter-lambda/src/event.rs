//! Event and reply envelopes exchanged with Lambda when it sits behind an Application Load
//! Balancer target group.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Inbound event delivered by the load balancer for one HTTP request.
///
/// Missing or `null` fields decode to their empty defaults; only the body is validated later, when
/// it is translated.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetGroupRequest {
    #[serde(default, deserialize_with = "null_as_default")]
    pub http_method: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub path: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub query_string_parameters: HashMap<String, String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub headers: HashMap<String, String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub body: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_base64_encoded: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub request_context: TargetGroupRequestContext,
}

/// Routing block attached to every load balancer event.
///
/// Keys other than `elb` are kept untouched in `extra`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct TargetGroupRequestContext {
    #[serde(default, deserialize_with = "null_as_default")]
    pub elb: ElbContext,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElbContext {
    #[serde(default, deserialize_with = "null_as_default")]
    pub target_group_arn: String,
}

/// Reply returned to the load balancer for one invocation.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetGroupResponse {
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_description: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub is_base64_encoded: bool,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_load_balancer_event() {
        let event: TargetGroupRequest = serde_json::from_value(json!({
            "requestContext": {
                "elb": {
                    "targetGroupArn": "arn:aws:elasticloadbalancing:us-east-1:123456789012:targetgroup/lambda-target/abc"
                }
            },
            "httpMethod": "GET",
            "path": "/pets",
            "queryStringParameters": { "order": "desc" },
            "headers": { "host": "example.com" },
            "body": "",
            "isBase64Encoded": false
        }))
        .expect("event");

        assert_eq!(event.http_method, "GET");
        assert_eq!(event.path, "/pets");
        assert_eq!(event.query_string_parameters["order"], "desc");
        assert_eq!(event.headers["host"], "example.com");
        assert!(!event.is_base64_encoded);
        assert!(event
            .request_context
            .elb
            .target_group_arn
            .ends_with("targetgroup/lambda-target/abc"));
    }

    #[test]
    fn missing_and_null_fields_use_defaults() {
        let event: TargetGroupRequest = serde_json::from_value(json!({
            "path": "/",
            "queryStringParameters": null,
            "headers": null,
            "body": null
        }))
        .expect("event");

        assert!(event.http_method.is_empty());
        assert!(event.query_string_parameters.is_empty());
        assert!(event.headers.is_empty());
        assert!(event.body.is_empty());
        assert_eq!(event.request_context, TargetGroupRequestContext::default());
    }

    #[test]
    fn null_routing_block_fields_use_defaults() {
        let event: TargetGroupRequest = serde_json::from_value(json!({
            "path": "/",
            "requestContext": { "elb": null }
        }))
        .expect("event");
        assert_eq!(event.request_context.elb, ElbContext::default());

        let context: TargetGroupRequestContext =
            serde_json::from_value(json!({ "elb": { "targetGroupArn": null } })).expect("context");
        assert!(context.elb.target_group_arn.is_empty());
    }

    #[test]
    fn request_context_keeps_unknown_keys() {
        let raw = json!({
            "elb": { "targetGroupArn": "arn:tg" },
            "traceId": "Root=1-5bdb40ca-556d8b0c50dc66f0511bf520"
        });
        let context: TargetGroupRequestContext =
            serde_json::from_value(raw.clone()).expect("context");

        assert_eq!(context.elb.target_group_arn, "arn:tg");
        assert_eq!(
            context.extra.get("traceId").and_then(Value::as_str),
            Some("Root=1-5bdb40ca-556d8b0c50dc66f0511bf520")
        );
        assert_eq!(serde_json::to_value(&context).expect("encode"), raw);
    }

    #[test]
    fn reply_serialises_with_load_balancer_field_names() {
        let reply = TargetGroupResponse {
            status_code: 200,
            status_description: Some("200 OK".into()),
            headers: BTreeMap::from([("content-type".into(), "text/plain".into())]),
            body: "ok".into(),
            is_base64_encoded: false,
        };

        assert_eq!(
            serde_json::to_value(&reply).expect("encode"),
            json!({
                "statusCode": 200,
                "statusDescription": "200 OK",
                "headers": { "content-type": "text/plain" },
                "body": "ok",
                "isBase64Encoded": false
            })
        );
    }
}
