use serde::Deserialize;
use wirebind_core::cache::DEFAULT_CAPACITY;

/// Client-level configuration shared by both executors.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Descriptor count above which the client's cache is cleared.
    pub descriptor_cache_capacity: usize,
    /// Scheme used when a resolved host carries none.
    pub default_scheme: String,
    /// Enforce `Content-Length` over response bodies.
    pub validate_response_length: bool,
    /// Header carrying the per-call request id. Empty disables it.
    pub request_id_header: String,
    /// Buffered bodies of at least this many bytes decode on the blocking
    /// pool in non-blocking mode. 0 offloads every buffered decode.
    pub decode_offload_threshold: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            descriptor_cache_capacity: DEFAULT_CAPACITY,
            default_scheme: "https".to_string(),
            validate_response_length: true,
            request_id_header: "x-client-request-id".to_string(),
            decode_offload_threshold: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: ClientConfig = serde_json::from_str(r#"{"default_scheme": "http"}"#).unwrap();
        assert_eq!(config.default_scheme, "http");
        assert_eq!(config.descriptor_cache_capacity, 10_000);
        assert!(config.validate_response_length);
        assert_eq!(config.request_id_header, "x-client-request-id");
    }
}
