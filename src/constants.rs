//! Application-wide constants for xc-hub.
//!
//! Wire tokens, network defaults and choreography timing live here so the
//! protocol vocabulary is discoverable in one place.
//!
//! # Categories
//!
//! - **Network**: port and read sizing
//! - **Protocol**: reserved inbound names/tokens and outgoing commands
//! - **Choreography**: round pass delays and finale timing

// ============================================================================
// Network
// ============================================================================

/// TCP port shared by every effect and the button client.
pub const DEFAULT_PORT: u16 = 5061;

/// Size of a single raw read from a connection.
///
/// Partial records may be carried across reads, up to twice this length.
pub const READ_BUFFER_LEN: usize = 1024;

// ============================================================================
// Protocol (inbound)
// ============================================================================

/// Reserved effect name used by the button client.
pub const BUTTON_NAME: &str = "B";

/// First field marking a control envelope (`NAME:*:CMD:ARG`).
pub const CONTROL_MARKER: &str = "*";

/// First field of a heartbeat record. Always a no-op.
pub const KEEP_ALIVE: &str = "KA";

/// Control sub-command: replace the round order.
pub const CONTROL_SET_ORDER: &str = "RO";

/// Control sub-command: set the sender's broadcast collection.
pub const CONTROL_SET_COLLECTION: &str = "CC";

/// Control sub-command: set the sender's do-not-send flag.
pub const CONTROL_DO_NOT_SEND: &str = "DS";

/// Control sub-command: clear pending choreography and stop everything.
pub const CONTROL_KILL_ALL: &str = "XX";

/// Separator between fields of a record.
pub const FIELD_SEPARATOR: char = ':';

/// Separator between names in `RO`/`CC` member lists.
pub const LIST_SEPARATOR: char = ',';

// ============================================================================
// Protocol (outbound)
// ============================================================================

/// Turn an effect on.
pub const TOKEN_ACTIVATE: &str = "$p1%";

/// Turn an effect off.
pub const TOKEN_DEACTIVATE: &str = "$p0%";

/// Ask an effect to run its local storm pattern.
pub const TOKEN_STORM: &str = "$p2%";

// ============================================================================
// Choreography
// ============================================================================

/// Inter-effect spacing for each pass of a round, in milliseconds.
pub const ROUND_PASS_DELAYS_MS: [u64; 7] = [240, 130, 80, 50, 40, 30, 30];

/// Default round order, seeded into the registry at startup.
pub const DEFAULT_ROUND_ORDER: [&str; 10] = [
    "ENTRY", "LOKI", "POPCORN", "SIDESHOW", "AERIAL", "DRAGON", "SKEEBALL", "STRIKER", "ORGAN",
    "LULU",
];

/// Effect that receives the flash-then-sustain finale.
pub const DEFAULT_FINALE_A: &str = "LULU";

/// Effect that receives the long sustained finale.
pub const DEFAULT_FINALE_B: &str = "BIGBETTY";

/// Number of "prime the pump" flashes in finale A.
pub const FINALE_A_FLASHES: u64 = 4;

/// On-time of each finale A flash (ms).
pub const FINALE_A_FLASH_ON_MS: u64 = 80;

/// Off-time after each finale A flash (ms).
pub const FINALE_A_FLASH_OFF_MS: u64 = 50;

/// Pause between the last flash and the sustained burst (ms).
pub const FINALE_A_PAUSE_MS: u64 = 500;

/// Sustained burst closing finale A (ms).
pub const FINALE_A_SUSTAIN_MS: u64 = 1600;

/// Sustained burst of finale B (ms).
pub const FINALE_B_SUSTAIN_MS: u64 = 5000;

/// Total length of finale A, flashes through sustain (ms).
pub const FINALE_A_WINDOW_MS: u64 = FINALE_A_FLASHES * (FINALE_A_FLASH_ON_MS + FINALE_A_FLASH_OFF_MS)
    + FINALE_A_PAUSE_MS
    + FINALE_A_SUSTAIN_MS;
