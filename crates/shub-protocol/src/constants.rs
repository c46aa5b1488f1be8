//! Protocol constants
//!
//! Sizes and offsets of the packed packet layouts. These must match the
//! co-processor firmware byte for byte.

// ============================================================================
// Common header
// ============================================================================

/// Number of meaningful header bytes (`sequence`, `sensor_type`, `command`,
/// `length`/`ret_val`, `crc8`).
pub const HEADER_SIZE: usize = 5;
/// Offset of the CRC-8 byte inside the header.
pub const CRC_OFFSET: usize = 4;
/// Alignment applied to every packet and to the start of each body.
pub const PACKET_ALIGN: usize = 4;
/// Offset where the body of a control or notify packet begins.
pub const BODY_OFFSET: usize = 8;

// ============================================================================
// Control request
// ============================================================================

/// Size of a control request with an empty body.
pub const CTRL_HEADER_SIZE: usize = BODY_OFFSET;
/// Largest body a control request can carry (`length` is a single byte).
pub const CTRL_MAX_DATA_LEN: usize = u8::MAX as usize;

// ============================================================================
// Acknowledgement
// ============================================================================

/// Size of an acknowledgement packet, including trailing alignment padding.
pub const ACK_SIZE: usize = 8;

// ============================================================================
// Notification
// ============================================================================

/// Number of 32-bit words in a notification body.
pub const NOTIFY_VALUE_COUNT: usize = 5;
/// Size of a notification packet.
pub const NOTIFY_SIZE: usize = BODY_OFFSET + NOTIFY_VALUE_COUNT * 4;

// ============================================================================
// Payload shapes
// ============================================================================

/// Size of an encoded [`BatchParams`](crate::BatchParams) body.
pub const BATCH_SIZE: usize = 16;
/// Size of an encoded [`TimeSync`](crate::TimeSync) body.
pub const TIMESYNC_SIZE: usize = 16;
/// Number of buffer descriptors in a share-memory body.
pub const SHARE_MEM_ENTRIES: usize = 4;
/// Stride of one share-memory descriptor (`u8` command, 3 pad bytes, `u32` base).
pub const SHARE_MEM_ENTRY_SIZE: usize = 8;
/// Size of an encoded [`ShareMemInfo`](crate::ShareMemInfo) body.
pub const SHARE_MEM_SIZE: usize = SHARE_MEM_ENTRIES * SHARE_MEM_ENTRY_SIZE;
/// Size of an encoded [`DataNotify`](crate::DataNotify) body.
pub const DATA_NOTIFY_SIZE: usize = 20;
