/// Structured error types for BalanceBot
///
/// Only the failure modes that program logic needs to match on get a typed
/// variant here; everything else travels through `anyhow` with context.

// =============================================================================
// RPC ERRORS
// =============================================================================

#[derive(Debug, Clone)]
pub enum RpcError {
    /// Every endpoint in the failover pool is unhealthy or unreachable
    NoHealthyEndpoints,

    /// The retry engine gave up after the maximum number of attempts
    RetriesExhausted { attempts: u32, last_error: String },

    /// The per-call deadline elapsed before the call completed
    DeadlineExceeded { timeout_secs: u64 },

    /// Shutdown was observed during a backoff sleep or an in-flight call
    Cancelled,

    /// A chain-id liveness probe against an endpoint failed
    ProbeFailed { url: String, reason: String },
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcError::NoHealthyEndpoints => {
                write!(f, "no healthy RPC endpoints available")
            }
            RpcError::RetriesExhausted {
                attempts,
                last_error,
            } => {
                write!(f, "failed after {} attempts: {}", attempts, last_error)
            }
            RpcError::DeadlineExceeded { timeout_secs } => {
                write!(f, "call exceeded {}s deadline", timeout_secs)
            }
            RpcError::Cancelled => write!(f, "cancelled by shutdown"),
            RpcError::ProbeFailed { url, reason } => {
                write!(f, "liveness probe failed for {}: {}", url, reason)
            }
        }
    }
}

impl std::error::Error for RpcError {}

impl RpcError {
    /// Whether this error means shutdown was requested, as opposed to a
    /// genuine upstream failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RpcError::Cancelled)
    }
}

// =============================================================================
// CONFIGURATION ERRORS
// =============================================================================

#[derive(Debug, Clone)]
pub enum ConfigError {
    /// `rpc_urls` resolved to an empty list
    MissingRpcUrls,

    /// `wallets` resolved to an empty list
    NoWallets,

    /// A wallet or token address is not well-formed 0x-prefixed hex
    InvalidAddress { field: String, value: String },

    /// An RPC URL failed to parse or has a non-http(s) scheme
    InvalidRpcUrl { value: String, reason: String },

    /// The interval is neither an admissible duration nor a 5/6-field cron
    InvalidInterval { value: String, reason: String },

    /// The timezone is not a known IANA name
    UnknownTimezone(String),

    /// `http_port` falls outside the unprivileged range
    PortOutOfRange(u16),

    /// `log_level` is not one of debug|info|warn|error
    InvalidLogLevel(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingRpcUrls => {
                write!(f, "at least one RPC URL is required")
            }
            ConfigError::NoWallets => {
                write!(f, "at least one wallet address is required")
            }
            ConfigError::InvalidAddress { field, value } => {
                write!(f, "invalid hex address in {}: {}", field, value)
            }
            ConfigError::InvalidRpcUrl { value, reason } => {
                write!(f, "invalid RPC URL {}: {}", value, reason)
            }
            ConfigError::InvalidInterval { value, reason } => {
                write!(f, "invalid interval {:?}: {}", value, reason)
            }
            ConfigError::UnknownTimezone(tz) => {
                write!(f, "unknown timezone: {}", tz)
            }
            ConfigError::PortOutOfRange(port) => {
                write!(f, "http_port {} outside allowed range 1024-65535", port)
            }
            ConfigError::InvalidLogLevel(level) => {
                write!(f, "invalid log_level {:?} (expected debug|info|warn|error)", level)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
