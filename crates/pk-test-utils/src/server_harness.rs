//! Test server harness for E2E testing
//!
//! Provides `TestPkServer` for spawning real Presence Keeper routers in tests.

use presence_keeper::config::Config;
use presence_keeper::observability::metrics::init_metrics_recorder;
use presence_keeper::routes::{self, AppState};
use presence_keeper::services::upstream::mock::MockPresenceAdapter;
use presence_keeper::services::{ControllerSettings, PresenceAdapter, SessionController};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Upstream base URL used by harness configs. Never contacted; the mock
/// adapter stands in for the platform.
pub const TEST_UPSTREAM_BASE_URL: &str = "http://upstream.test";

/// Test harness for spawning the Presence Keeper server in E2E tests.
///
/// # Example
/// ```rust,ignore
/// let adapter = Arc::new(MockPresenceAdapter::succeeding());
/// let server = TestPkServer::spawn(Arc::clone(&adapter)).await?;
///
/// let status: serde_json::Value = reqwest::get(format!("{}/api/status", server.url()))
///     .await?
///     .json()
///     .await?;
/// assert_eq!(status["isConnected"], false);
/// ```
pub struct TestPkServer {
    addr: SocketAddr,
    config: Config,
    controller: Arc<SessionController>,
    _handle: JoinHandle<()>,
}

impl TestPkServer {
    /// Spawn a server with the default test configuration.
    pub async fn spawn(adapter: Arc<MockPresenceAdapter>) -> Result<Self, anyhow::Error> {
        Self::spawn_with_vars(adapter, HashMap::new()).await
    }

    /// Spawn a server, overriding or adding environment variables.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Route every upstream call through `adapter`
    /// - Start the HTTP server in the background
    pub async fn spawn_with_vars(
        adapter: Arc<MockPresenceAdapter>,
        overrides: HashMap<String, String>,
    ) -> Result<Self, anyhow::Error> {
        let mut vars = HashMap::from([
            (
                "UPSTREAM_BASE_URL".to_string(),
                TEST_UPSTREAM_BASE_URL.to_string(),
            ),
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
        ]);
        vars.extend(overrides);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let controller = Arc::new(SessionController::new(
            adapter as Arc<dyn PresenceAdapter>,
            ControllerSettings {
                heartbeat_interval: config.heartbeat_interval(),
                max_retries: config.max_retries,
            },
        ));

        let state = Arc::new(AppState {
            config: config.clone(),
            controller: Arc::clone(&controller),
        });

        // The global recorder can only be installed once per process; later
        // servers get a standalone recorder.
        let metrics_handle = match init_metrics_recorder() {
            Ok(handle) => handle,
            Err(_) => {
                use metrics_exporter_prometheus::PrometheusBuilder;
                PrometheusBuilder::new().build_recorder().handle()
            }
        };

        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            controller,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The controller behind the router, for driving ticks directly.
    pub fn controller(&self) -> &Arc<SessionController> {
        &self.controller
    }
}

impl Drop for TestPkServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
