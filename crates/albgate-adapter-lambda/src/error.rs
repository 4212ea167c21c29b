use thiserror::Error;

/// Failure to turn a load balancer event into a request. No reply is produced when this occurs.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The event is flagged as base64 but its body does not decode.
    #[error("malformed base64 body: {source}")]
    MalformedBody {
        #[source]
        source: base64::DecodeError,
    },
}

impl GatewayError {
    pub fn is_malformed_body(&self) -> bool {
        matches!(self, GatewayError::MalformedBody { .. })
    }
}

impl From<base64::DecodeError> for GatewayError {
    fn from(source: base64::DecodeError) -> Self {
        GatewayError::MalformedBody { source }
    }
}
