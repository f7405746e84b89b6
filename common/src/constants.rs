//! Values that are policy, not configuration: protocol constants every
//! caller must agree on. Runtime-tunable defaults live in `server::config`.

/// Device-side error codes that MUST NOT be retried; a transient failure is
/// promoted to `failed` immediately on any of these.
pub const PERMANENT_ERROR_CODES: &[&str] = &["INVALID_NUMBER", "BLOCKED", "SIM_ERROR"];

/// Device HMAC requests outside this skew window are rejected outright.
pub const DEVICE_CLOCK_SKEW_SECS: i64 = 300;

/// API key raw-secret prefix, per the wire contract in spec §6.
pub const API_KEY_PREFIX: &str = "sms_";

/// Length of the hex suffix following `API_KEY_PREFIX`.
pub const API_KEY_HEX_LEN: usize = 64;

/// Pair code length, URL-safe base64, case-sensitive.
pub const PAIR_CODE_LEN: usize = 24;

/// Number of leading characters of a pair code shown back as a
/// human-recognizable, non-secret prefix.
pub const PAIR_CODE_PREFIX_LEN: usize = 6;

/// Device token byte length before hex-encoding (so 64 hex chars).
pub const DEVICE_TOKEN_BYTES: usize = 32;

/// Webhook signing secret byte length before hex-encoding.
pub const WEBHOOK_SECRET_BYTES: usize = 32;

/// Maximum SMS body length accepted on the public send surface.
pub const MAX_MESSAGE_BODY_LEN: usize = 1600;

/// Default `OutboundMessage.max_attempts`, per spec.md §3 / §4.1's backoff
/// worked example.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 5;

/// Pair code TTL bounds accepted by the admin mint endpoint, in minutes.
pub const PAIR_CODE_TTL_MIN_MINUTES: i64 = 5;
pub const PAIR_CODE_TTL_MAX_MINUTES: i64 = 1440;

/// Items returned per `pull-outbound` call.
pub const PULL_OUTBOUND_BATCH_SIZE: i64 = 5;

/// Default admin/tenant listing page size and hard cap.
pub const DEFAULT_PAGE_LIMIT: i64 = 20;
pub const MAX_PAGE_LIMIT: i64 = 100;

pub fn is_permanent_error_code(code: &str) -> bool {
    PERMANENT_ERROR_CODES.contains(&code)
}
