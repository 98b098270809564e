// Fundamental configuration constants
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9000;
pub const DEFAULT_BACKLOG: u32 = 128;

// Per-receive capacity; larger payloads arrive over several reads
pub const RECEIVE_BUFFER_SIZE: usize = 1024;

// Pause after a failed accept before trying again
pub const DEFAULT_ACCEPT_BACKOFF_MS: u64 = 50;
