use std::sync::Arc;

use crate::{GrpcTransport, Transport, TransportConfig, TransportError, WebSocketTransport};

/// Build the transport binding selected by the controller URL scheme.
///
/// `http`/`https` URLs are rewritten to their WebSocket equivalents;
/// unknown schemes fail `INVALID_URL`.
pub fn create_transport(mut config: TransportConfig) -> Result<Arc<dyn Transport>, TransportError> {
    let scheme = config
        .url
        .split_once("://")
        .map(|(scheme, _)| scheme.to_ascii_lowercase())
        .ok_or_else(|| TransportError::InvalidUrl(config.url.clone()))?;

    match scheme.as_str() {
        "ws" | "wss" => Ok(Arc::new(WebSocketTransport::new(config))),
        "http" => {
            config.url = config.url.replacen("http://", "ws://", 1);
            Ok(Arc::new(WebSocketTransport::new(config)))
        }
        "https" => {
            config.url = config.url.replacen("https://", "wss://", 1);
            Ok(Arc::new(WebSocketTransport::new(config)))
        }
        "grpc" | "grpcs" => Ok(Arc::new(GrpcTransport::new(config))),
        _ => Err(TransportError::InvalidUrl(config.url.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> TransportConfig {
        TransportConfig {
            url: url.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn websocket_schemes_select_websocket() {
        for url in ["ws://c:9000/agent", "wss://c/agent"] {
            let transport = create_transport(config(url)).unwrap();
            assert_eq!(transport.info().protocol, "websocket");
        }
    }

    #[test]
    fn http_urls_are_rewritten_to_websocket() {
        let transport = create_transport(config("http://c:9000/agent")).unwrap();
        let info = transport.info();
        assert_eq!(info.protocol, "websocket");
        assert_eq!(info.controller_url, "ws://c:9000/agent");

        let transport = create_transport(config("https://c/agent")).unwrap();
        assert_eq!(transport.info().controller_url, "wss://c/agent");
    }

    #[test]
    fn grpc_schemes_select_grpc() {
        for url in ["grpc://c:7443", "grpcs://c:7443"] {
            let transport = create_transport(config(url)).unwrap();
            assert_eq!(transport.info().protocol, "grpc");
        }
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        assert!(matches!(
            create_transport(config("mqtt://c")),
            Err(TransportError::InvalidUrl(_))
        ));
        assert!(matches!(
            create_transport(config("not a url")),
            Err(TransportError::InvalidUrl(_))
        ));
    }
}
