// Fundamental configuration constants
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3030;
pub const WS_PATH: &str = "ws";

// Cache tiers (seconds)
pub const TTL_SHORT_SECS: u64 = 60;
pub const TTL_MEDIUM_SECS: u64 = 300;
pub const TTL_LONG_SECS: u64 = 3600;
pub const TTL_DAILY_SECS: u64 = 86_400;
pub const TTL_WEEKLY_SECS: u64 = 604_800;

// Backing store
pub const DEFAULT_KEY_PREFIX: &str = "chat:";
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_STORE_RETRIES: u32 = 3;
pub const STORE_RETRY_BASE_DELAY_MS: u64 = 50;
pub const STORE_RETRY_MAX_DELAY_MS: u64 = 2000;
pub const DEFAULT_FALLBACK_CAPACITY: usize = 10_000;

// Rate limiting
pub const DEFAULT_RATE_LIMIT: u32 = 100;
pub const DEFAULT_RATE_WINDOW_SECS: u64 = 60;
pub const DEFAULT_TYPING_LIMIT: u32 = 5;
pub const DEFAULT_TYPING_WINDOW_SECS: u64 = 3;

// Transport
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;
pub const MAX_FRAME_SIZE: usize = 8 * 1024;
pub const MAX_MESSAGE_LENGTH: usize = 2000;
pub const MAX_VOICE_DURATION_SECS: u32 = 300;
/// Hard cap enforced by the websocket layer; larger frames close the connection
pub const MAX_TRANSPORT_MESSAGE_SIZE: usize = 64 * 1024;
