//! Application constants
//!
//! Centralized location for domain-level defaults and wire names.

// Connectivity
pub const DEFAULT_PROBE_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 2;

// Remote access
pub const DEFAULT_REMOTE_BASE_URL: &str = "http://localhost:8080/api";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

// Replay
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const MAX_ERROR_MESSAGE_LEN: usize = 256;

// Sessions
pub const DEFAULT_SESSION_TTL_SECS: u64 = 30 * 60;
pub const DEFAULT_SESSION_SWEEP_SECS: u64 = 5 * 60;
pub const SESSION_TOKEN_BYTES: usize = 16;

// Wire contract
pub const BEARER_PREFIX: &str = "Bearer ";
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";
pub const PUBLIC_AUTH_PREFIX: &str = "/api/auth/";
pub const HEALTH_PATH: &str = "/health";
pub const UNAUTHORIZED_MESSAGE: &str = "Unauthorized access";

// Server
pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_IDEMPOTENCY_TTL_SECS: u64 = 24 * 60 * 60;
pub const MIN_PASSWORD_LENGTH: usize = 6;
