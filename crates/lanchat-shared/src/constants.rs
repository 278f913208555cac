/// Application name
pub const APP_NAME: &str = "LanChat";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Author shown by `/about`
pub const AUTHOR_NAME: &str = "Kayfeer";

/// Contact address shown by `/about`
pub const AUTHOR_MAIL: &str = "contact@lanchat.invalid";

/// Project web page shown by `/about`
pub const APP_WEB: &str = "https://lanchat.invalid/";

/// Maximum number of bytes in a chat message, away message, topic or file name
pub const MESSAGE_MAX_BYTES: usize = 450;

/// Maximum number of characters in a nick name
pub const NICK_MAX_CHARS: usize = 10;

/// Interval between heartbeat (IDLE) broadcasts in seconds
pub const HEARTBEAT_INTERVAL_SECS: u64 = 15;

/// A peer with no heartbeat for this many seconds is evicted
pub const PEER_TIMEOUT_SECS: u64 = 120;

/// Delay after the network comes up before logon is considered complete
pub const LOGON_GRACE_MILLIS: u64 = 1500;

/// Interval used when waiting for an unknown peer to identify itself
pub const IDENTIFY_POLL_MILLIS: u64 = 50;

/// Number of poll intervals to wait for an unknown peer before giving up
pub const IDENTIFY_MAX_ATTEMPTS: u64 = 40;

/// Number of deferred identification tasks allowed to wait concurrently
pub const IDENTIFY_WORKERS: usize = 8;

/// Multicast group used for the shared chat
pub const DEFAULT_MULTICAST_GROUP: &str = "224.168.5.200";

/// UDP port used for the shared chat
pub const DEFAULT_CHAT_PORT: u16 = 40556;

/// First port tried for the unicast private chat socket
pub const DEFAULT_PRIVATE_CHAT_PORT: u16 = 40656;

/// Maximum datagram size accepted by the transport
pub const MAX_PACKET_SIZE: usize = 512;

/// Color used for system messages (opaque dark green, ARGB)
pub const DEFAULT_SYSTEM_COLOR: i32 = -16_744_448;

/// Color used for own messages (opaque black, ARGB)
pub const DEFAULT_OWN_COLOR: i32 = -16_777_216;
