//! Configuration management for the GraphJS server
//!
//! All configurable parameters in one place with environment variable overrides.
//! Sensible defaults for local development, configurable in production.

use std::env;
use std::path::PathBuf;
use tracing::info;

use crate::graph::GraphFlavor;

fn env_flag(val: &str) -> bool {
    let val = val.to_lowercase();
    val == "true" || val == "1"
}

fn is_production_env() -> bool {
    env::var("GRAPHJS_ENV")
        .map(|v| {
            let v = v.to_lowercase();
            v == "production" || v == "prod"
        })
        .unwrap_or(false)
}

/// CORS configuration
#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// Allowed origins (empty = allow all)
    pub allowed_origins: Vec<String>,
    /// Allowed HTTP methods
    pub allowed_methods: Vec<String>,
    /// Allowed headers
    pub allowed_headers: Vec<String>,
    /// Whether cross-origin requests may carry the session cookie.
    /// Only honored together with an explicit origin list.
    pub allow_credentials: bool,
    /// Max age for preflight cache (seconds)
    pub max_age_seconds: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            allowed_methods: vec![
                "GET".to_string(),
                "POST".to_string(),
                "OPTIONS".to_string(),
            ],
            allowed_headers: vec!["Content-Type".to_string(), "X-Request-ID".to_string()],
            allow_credentials: false,
            max_age_seconds: 86400,
        }
    }
}

impl CorsConfig {
    /// Load from environment variables
    ///
    /// In production mode (GRAPHJS_ENV=production), warns if CORS origins are
    /// not configured.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(origins) = env::var("GRAPHJS_CORS_ORIGINS") {
            config.allowed_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Ok(methods) = env::var("GRAPHJS_CORS_METHODS") {
            config.allowed_methods = methods
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Ok(headers) = env::var("GRAPHJS_CORS_HEADERS") {
            config.allowed_headers = headers
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Ok(val) = env::var("GRAPHJS_CORS_CREDENTIALS") {
            config.allow_credentials = env_flag(&val);
        }

        if let Ok(val) = env::var("GRAPHJS_CORS_MAX_AGE") {
            if let Ok(n) = val.parse() {
                config.max_age_seconds = n;
            }
        }

        if is_production_env() && config.allowed_origins.is_empty() {
            tracing::warn!(
                "PRODUCTION WARNING: CORS allows all origins. Set GRAPHJS_CORS_ORIGINS to restrict."
            );
        }

        config
    }

    /// Check if any origin restrictions are configured
    pub fn is_restricted(&self) -> bool {
        !self.allowed_origins.is_empty()
    }

    /// Credentialed CORS, i.e. an origin list plus `allow_credentials`
    pub fn sends_credentials(&self) -> bool {
        self.allow_credentials && self.is_restricted()
    }

    /// Convert to tower-http CorsLayer
    pub fn to_layer(&self) -> tower_http::cors::CorsLayer {
        use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};

        let mut layer = CorsLayer::new();

        if self.allowed_origins.is_empty() {
            if self.allow_credentials {
                tracing::warn!(
                    "CORS: credentials require GRAPHJS_CORS_ORIGINS; ignoring GRAPHJS_CORS_CREDENTIALS"
                );
            }
            layer = layer.allow_origin(Any);
        } else {
            let mut valid_origins = Vec::new();
            for origin_str in &self.allowed_origins {
                match origin_str.parse::<axum::http::HeaderValue>() {
                    Ok(origin) => valid_origins.push(origin),
                    Err(_) => tracing::warn!("CORS: Invalid origin '{}' - skipping", origin_str),
                }
            }

            if valid_origins.is_empty() {
                // Never fall back to permissive on a broken origin list
                tracing::error!(
                    "CORS: All {} configured origin(s) failed to parse. \
                     Rejecting all cross-origin requests. Fix GRAPHJS_CORS_ORIGINS.",
                    self.allowed_origins.len()
                );
            }
            layer = layer.allow_origin(AllowOrigin::list(valid_origins));
        }

        let methods: Vec<axum::http::Method> = self
            .allowed_methods
            .iter()
            .filter_map(|m| m.parse().ok())
            .collect();
        layer = if methods.is_empty() {
            layer.allow_methods(AllowMethods::mirror_request())
        } else {
            layer.allow_methods(methods)
        };

        let headers: Vec<axum::http::HeaderName> = self
            .allowed_headers
            .iter()
            .filter_map(|h| h.parse().ok())
            .collect();
        layer = if headers.is_empty() {
            layer.allow_headers(AllowHeaders::mirror_request())
        } else {
            layer.allow_headers(headers)
        };

        if self.sends_credentials() {
            layer = layer.allow_credentials(true);
        }

        layer.max_age(std::time::Duration::from_secs(self.max_age_seconds))
    }
}

/// Which [`GraphStore`](crate::graph::GraphStore) backs the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphBackend {
    /// Volatile, process-local
    Memory,
    /// In-memory with a JSON snapshot loaded at startup and written on shutdown
    Snapshot,
}

impl GraphBackend {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "memory" | "mem" => Some(Self::Memory),
            "snapshot" | "file" => Some(Self::Snapshot),
            _ => None,
        }
    }
}

/// Account seeded on startup when no user with this name exists
#[derive(Debug, Clone)]
pub struct FounderConfig {
    pub username: String,
    pub password: String,
    pub email: String,
}

/// Server configuration loaded from environment with defaults
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server host address (default: 127.0.0.1)
    /// Set to 0.0.0.0 for Docker or network-accessible deployments
    pub host: String,

    /// Server port (default: 1338)
    pub port: u16,

    /// Installation flavor; `groupsv2` installations are `Network`, everything else `Site`
    pub flavor: GraphFlavor,

    /// Graph backend (default: snapshot)
    pub backend: GraphBackend,

    /// Snapshot file used by the snapshot backend
    pub snapshot_path: PathBuf,

    /// Founder account, seeded when all three variables are set
    pub founder: Option<FounderConfig>,

    /// Default page size for listing endpoints (default: 20)
    pub page_size: usize,

    /// Rate limit: requests per second per client IP, 0 disables (default: 50)
    pub rate_limit_per_second: u64,

    /// Rate limit: burst size (default: 100)
    pub rate_limit_burst: u32,

    /// Maximum concurrent requests (default: 200)
    pub max_concurrent_requests: usize,

    /// Request timeout in seconds (default: 30)
    pub request_timeout_secs: u64,

    /// Session inactivity expiry in seconds (default: 7 days)
    pub session_ttl_secs: i64,

    /// Mark the session cookie `Secure` (default: true in production)
    pub secure_cookies: bool,

    /// Emit JSON log lines instead of human-readable output
    pub json_logs: bool,

    /// Whether running in production mode
    pub is_production: bool,

    /// CORS configuration
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1338,
            flavor: GraphFlavor::Site,
            backend: GraphBackend::Snapshot,
            snapshot_path: PathBuf::from("./graphjs_data/graph.json"),
            founder: None,
            page_size: 20,
            rate_limit_per_second: 50,
            rate_limit_burst: 100,
            max_concurrent_requests: 200,
            request_timeout_secs: 30,
            session_ttl_secs: 7 * 24 * 3600,
            secure_cookies: false,
            json_logs: false,
            is_production: false,
            cors: CorsConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults
    #[allow(clippy::field_reassign_with_default)]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        config.is_production = is_production_env();

        if let Ok(val) = env::var("GRAPHJS_HOST") {
            config.host = val;
        }

        if let Ok(val) = env::var("GRAPHJS_PORT") {
            if let Ok(port) = val.parse() {
                config.port = port;
            }
        }

        if let Ok(val) = env::var("GRAPHJS_INSTALLATION_TYPE") {
            config.flavor = if val.trim().eq_ignore_ascii_case("groupsv2") {
                GraphFlavor::Network
            } else {
                GraphFlavor::Site
            };
        }

        if let Ok(val) = env::var("GRAPHJS_BACKEND") {
            match GraphBackend::parse(&val) {
                Some(backend) => config.backend = backend,
                None => tracing::warn!("Unknown GRAPHJS_BACKEND '{}', keeping {:?}", val, config.backend),
            }
        }

        if let Ok(val) = env::var("GRAPHJS_SNAPSHOT_PATH") {
            config.snapshot_path = PathBuf::from(val);
        }

        if let (Ok(username), Ok(password), Ok(email)) = (
            env::var("GRAPHJS_FOUNDER_USERNAME"),
            env::var("GRAPHJS_FOUNDER_PASSWORD"),
            env::var("GRAPHJS_FOUNDER_EMAIL"),
        ) {
            config.founder = Some(FounderConfig {
                username,
                password,
                email,
            });
        }

        if let Ok(val) = env::var("GRAPHJS_PAGE_SIZE") {
            if let Ok(n) = val.parse::<usize>() {
                config.page_size = n.max(1);
            }
        }

        if let Ok(val) = env::var("GRAPHJS_RATE_LIMIT") {
            if let Ok(n) = val.parse() {
                config.rate_limit_per_second = n;
            }
        }

        if let Ok(val) = env::var("GRAPHJS_RATE_BURST") {
            if let Ok(n) = val.parse() {
                config.rate_limit_burst = n;
            }
        }

        if let Ok(val) = env::var("GRAPHJS_MAX_CONCURRENT") {
            if let Ok(n) = val.parse() {
                config.max_concurrent_requests = n;
            }
        }

        if let Ok(val) = env::var("GRAPHJS_REQUEST_TIMEOUT") {
            if let Ok(n) = val.parse() {
                config.request_timeout_secs = n;
            }
        }

        if let Ok(val) = env::var("GRAPHJS_SESSION_TTL") {
            if let Ok(n) = val.parse() {
                config.session_ttl_secs = n;
            }
        }

        if let Ok(val) = env::var("GRAPHJS_SECURE_COOKIES") {
            config.secure_cookies = env_flag(&val);
        } else if config.is_production {
            config.secure_cookies = true;
        }

        if let Ok(val) = env::var("GRAPHJS_LOG_FORMAT") {
            config.json_logs = val.trim().eq_ignore_ascii_case("json");
        }

        config.cors = CorsConfig::from_env();

        config
    }

    /// Whether the session cookie must travel on cross-site requests
    ///
    /// Requires credentialed CORS and secure cookies; browsers drop
    /// `SameSite=None` cookies that are not `Secure`.
    pub fn cross_site_sessions(&self) -> bool {
        self.cors.sends_credentials() && self.secure_cookies
    }

    /// Log the current configuration
    pub fn log(&self) {
        info!("Configuration:");
        info!(
            "   Mode: {}",
            if self.is_production {
                "PRODUCTION"
            } else {
                "Development"
            }
        );
        info!("   Listen: {}:{}", self.host, self.port);
        info!("   Installation: {}", self.flavor.as_str());
        match self.backend {
            GraphBackend::Memory => info!("   Graph backend: memory"),
            GraphBackend::Snapshot => info!("   Graph backend: snapshot at {:?}", self.snapshot_path),
        }
        if let Some(founder) = &self.founder {
            info!("   Founder: {}", founder.username);
        }
        info!("   Page size: {}", self.page_size);
        if self.rate_limit_per_second > 0 {
            info!(
                "   Rate limit: {} req/sec (burst: {})",
                self.rate_limit_per_second, self.rate_limit_burst
            );
        } else {
            info!("   Rate limit: disabled");
        }
        info!("   Max concurrent: {}", self.max_concurrent_requests);
        info!("   Request timeout: {}s", self.request_timeout_secs);
        info!(
            "   Sessions: {}s inactivity expiry, secure cookies: {}",
            self.session_ttl_secs, self.secure_cookies
        );
        if self.cors.allow_credentials && !self.cross_site_sessions() {
            tracing::warn!(
                "   CORS credentials need GRAPHJS_CORS_ORIGINS and secure cookies; session cookie stays same-site"
            );
        }
        if self.cors.is_restricted() {
            info!("   CORS origins: {:?}", self.cors.allowed_origins);
        } else {
            info!("   CORS: Permissive (all origins allowed)");
        }
    }
}

/// Environment variable documentation
pub fn print_env_help() {
    println!("GraphJS Server Configuration Environment Variables:");
    println!();
    println!("  GRAPHJS_ENV               - Set to 'production' or 'prod' for production mode");
    println!("  GRAPHJS_HOST              - Bind address (default: 127.0.0.1, use 0.0.0.0 for Docker)");
    println!("  GRAPHJS_PORT              - Server port (default: 1338)");
    println!("  GRAPHJS_INSTALLATION_TYPE - 'groupsv2' for a Network installation (default: Site)");
    println!("  GRAPHJS_BACKEND           - Graph backend: memory | snapshot (default: snapshot)");
    println!("  GRAPHJS_SNAPSHOT_PATH     - Snapshot file (default: ./graphjs_data/graph.json)");
    println!("  GRAPHJS_FOUNDER_USERNAME  - Founder account username");
    println!("  GRAPHJS_FOUNDER_PASSWORD  - Founder account password");
    println!("  GRAPHJS_FOUNDER_EMAIL     - Founder account email");
    println!("  GRAPHJS_PAGE_SIZE         - Default listing page size (default: 20)");
    println!("  GRAPHJS_RATE_LIMIT        - Requests per second per IP, 0 disables (default: 50)");
    println!("  GRAPHJS_RATE_BURST        - Burst size (default: 100)");
    println!("  GRAPHJS_MAX_CONCURRENT    - Max concurrent requests (default: 200)");
    println!("  GRAPHJS_REQUEST_TIMEOUT   - Request timeout in seconds (default: 30)");
    println!("  GRAPHJS_SESSION_TTL       - Session inactivity expiry in seconds (default: 604800)");
    println!("  GRAPHJS_SECURE_COOKIES    - Secure session cookie true/false (default: auto in production)");
    println!("  GRAPHJS_LOG_FORMAT        - 'json' for JSON log lines");
    println!();
    println!("CORS Configuration:");
    println!("  GRAPHJS_CORS_ORIGINS      - Comma-separated allowed origins (default: all)");
    println!("  GRAPHJS_CORS_METHODS      - Comma-separated allowed methods (default: GET,POST,OPTIONS)");
    println!("  GRAPHJS_CORS_HEADERS      - Comma-separated allowed headers (default: Content-Type,X-Request-ID)");
    println!("  GRAPHJS_CORS_CREDENTIALS  - Session cookie on cross-origin calls, needs GRAPHJS_CORS_ORIGINS (default: false)");
    println!("  GRAPHJS_CORS_MAX_AGE      - Preflight cache seconds (default: 86400)");
    println!();
    println!("  RUST_LOG                  - Log filter (default: graphjs=info,tower_http=info)");
    println!();
}
