//! ROM-level command constants for 1-Wire communication.
//!
//! Memory function commands (read memory, write scratchpad, ...) differ from
//! one device family to the next and are therefore configured per memory bank
//! instead of being listed here.

/// Match a specific 64-bit ROM id at standard speed.
pub const ONEWIRE_MATCH_ROM_CMD: u8 = 0x55;

/// Address every device on the bus at standard speed.
pub const ONEWIRE_SKIP_ROM_CMD: u8 = 0xcc;

/// Overdrive-Match ROM. The ROM id that follows is sent at overdrive speed,
/// and only the matching device switches to overdrive. Devices already in
/// overdrive stay there until a standard-speed reset pulse (at least 480μs)
/// returns every device on the line to standard speed.
pub const ONEWIRE_MATCH_ROM_CMD_OD: u8 = 0x69;

/// Overdrive-Skip ROM. Addresses all devices and moves them to overdrive;
/// everything after this command has to run at overdrive speed until the next
/// standard-speed reset pulse.
pub const ONEWIRE_SKIP_ROM_CMD_OD: u8 = 0x3c;
