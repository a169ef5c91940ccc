/// Path of the registration endpoint on the relay host
pub const REGISTRATION_PATH: &str = "/start";

/// Query parameter carrying the requested subdomain
pub const SUBDOMAIN_QUERY_PARAM: &str = "subdomain";

/// Length of auto-generated subdomain slugs
pub const SUBDOMAIN_SLUG_LENGTH: usize = 5;

/// Attempts made to find a free auto-generated slug before giving up
pub const SUBDOMAIN_SLUG_ATTEMPTS: usize = 8;

/// Size of each request body chunk the relay pumps to the agent (16 KiB)
pub const REQUEST_CHUNK_SIZE: usize = 16 * 1024;

/// Upper bound for a single response `data` frame emitted by the agent (64 KiB)
pub const RESPONSE_CHUNK_SIZE: usize = 64 * 1024;

/// Whole-call deadline for one local request on the agent (30 seconds)
pub const LOCAL_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Interval between transport-level pings sent by the agent (30 seconds)
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Depth of the outbound frame queue feeding a connection writer
pub const OUTBOUND_QUEUE_DEPTH: usize = 128;

/// Largest WebSocket message accepted on a tunnel connection (16 MiB)
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;
