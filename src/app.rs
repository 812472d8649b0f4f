//! Production wiring
//!
//! Installs logging and builds a session against the configured backend.

use crate::backend::{BackendError, HttpBackend};
use crate::host::HostEnvironment;
use crate::session::ChatSession;
use crate::types::config::{load_config, ChatConfig};
use tracing_subscriber::EnvFilter;

/// Session type used by the embedding page
pub type PageChat<H> = ChatSession<HttpBackend, H>;

/// Install the global tracing subscriber. Later calls are no-ops.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pagechat=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Build a session from the layered configuration
pub fn connect<H: HostEnvironment>(host: H) -> Result<PageChat<H>, BackendError> {
    connect_with(host, load_config())
}

/// Build a session from an explicit configuration
pub fn connect_with<H: HostEnvironment>(
    host: H,
    config: ChatConfig,
) -> Result<PageChat<H>, BackendError> {
    let backend = HttpBackend::new(&config)?;
    tracing::info!(endpoint = %backend.endpoint(), "Chat session initialized");
    Ok(ChatSession::new(backend, host, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::StaticPage;

    #[tokio::test]
    async fn test_connect_with_config() {
        init_tracing();
        init_tracing();

        let config = ChatConfig {
            backend_base_url: "http://backend:9000".into(),
            ..ChatConfig::default()
        };
        let session = connect_with(StaticPage::new("u", "t"), config).unwrap();

        assert_eq!(session.config().ask_stream_url(), "http://backend:9000/ask_stream");
        let state = session.snapshot().await;
        assert_eq!(state.transcript.len(), 2);
        assert!(!state.is_awaiting_response);
    }
}
