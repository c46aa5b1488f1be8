//! Command bodies carried inside control requests and notifications.

use bytes::{Buf, BufMut};

use crate::constants::*;
use crate::error::{ProtocolError, ProtocolResult};
use crate::packets::NotifyPacket;

fn ensure_len(body: &[u8], expected: usize) -> ProtocolResult<()> {
    if body.len() < expected {
        return Err(ProtocolError::too_short(expected, body.len()));
    }
    Ok(())
}

/// Sampling parameters sent with [`CtrlCommand::Enable`](crate::CtrlCommand::Enable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchParams {
    /// Sampling period in nanoseconds.
    pub delay: i64,
    /// Maximum report latency in nanoseconds.
    pub latency: i64,
}

impl BatchParams {
    /// Encode as a control body.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(BATCH_SIZE);
        buf.put_i64_le(self.delay);
        buf.put_i64_le(self.latency);
        buf
    }

    /// Decode from a control body.
    pub fn decode(mut body: &[u8]) -> ProtocolResult<Self> {
        ensure_len(body, BATCH_SIZE)?;
        Ok(BatchParams {
            delay: body.get_i64_le(),
            latency: body.get_i64_le(),
        })
    }
}

/// Host clock snapshot sent with [`CtrlCommand::TimeSync`](crate::CtrlCommand::TimeSync).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeSync {
    /// Host boot-time timestamp in nanoseconds.
    pub host_timestamp: i64,
    /// Host architectural counter at the same instant.
    pub host_archcounter: i64,
}

impl TimeSync {
    /// Encode as a control body.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(TIMESYNC_SIZE);
        buf.put_i64_le(self.host_timestamp);
        buf.put_i64_le(self.host_archcounter);
        buf
    }

    /// Decode from a control body.
    pub fn decode(mut body: &[u8]) -> ProtocolResult<Self> {
        ensure_len(body, TIMESYNC_SIZE)?;
        Ok(TimeSync {
            host_timestamp: body.get_i64_le(),
            host_archcounter: body.get_i64_le(),
        })
    }
}

/// One shared buffer descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShareMemEntry {
    /// Notify command raised when this buffer fills.
    pub notify_cmd: u8,
    /// Co-processor address of the buffer.
    pub buffer_base: u32,
}

/// Shared buffer table sent with [`CtrlCommand::ShareMemory`](crate::CtrlCommand::ShareMemory).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShareMemInfo {
    /// Buffer descriptors; each occupies an 8-byte aligned stride on the wire.
    pub base_info: [ShareMemEntry; SHARE_MEM_ENTRIES],
}

impl ShareMemInfo {
    /// Encode as a control body.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(SHARE_MEM_SIZE);
        for entry in &self.base_info {
            buf.put_u8(entry.notify_cmd);
            buf.put_bytes(0, 3);
            buf.put_u32_le(entry.buffer_base);
        }
        buf
    }

    /// Decode from a control body.
    pub fn decode(mut body: &[u8]) -> ProtocolResult<Self> {
        ensure_len(body, SHARE_MEM_SIZE)?;
        let mut info = ShareMemInfo::default();
        for entry in info.base_info.iter_mut() {
            entry.notify_cmd = body.get_u8();
            body.advance(3);
            entry.buffer_base = body.get_u32_le();
        }
        Ok(info)
    }
}

/// Body of a [`NotifyCommand::Data`](crate::NotifyCommand::Data) notification.
///
/// Packed with no padding: exactly fills the five value words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataNotify {
    /// Write cursor inside the shared buffer.
    pub write_position: i32,
    /// Co-processor timestamp of the newest sample.
    pub scp_timestamp: i64,
    /// Co-processor counter matching `scp_timestamp`.
    pub scp_archcounter: i64,
}

impl DataNotify {
    /// Encode as notification body bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(DATA_NOTIFY_SIZE);
        buf.put_i32_le(self.write_position);
        buf.put_i64_le(self.scp_timestamp);
        buf.put_i64_le(self.scp_archcounter);
        buf
    }

    /// Decode from notification body bytes.
    pub fn decode(mut body: &[u8]) -> ProtocolResult<Self> {
        ensure_len(body, DATA_NOTIFY_SIZE)?;
        Ok(DataNotify {
            write_position: body.get_i32_le(),
            scp_timestamp: body.get_i64_le(),
            scp_archcounter: body.get_i64_le(),
        })
    }

    /// Extract from the value words of a notification.
    pub fn from_notify(notify: &NotifyPacket) -> Self {
        let body = notify.body();
        // The body is always DATA_NOTIFY_SIZE bytes.
        let mut raw = &body[..];
        DataNotify {
            write_position: raw.get_i32_le(),
            scp_timestamp: raw.get_i64_le(),
            scp_archcounter: raw.get_i64_le(),
        }
    }
}
