/// The maximum number of retries for a request.
pub const MAX_RETRIES: u8 = 3;

/// Delay between retries of a failed request.
pub const RETRY_DELAY_MS: u64 = 1_000;
