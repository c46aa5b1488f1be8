//! Command codes carried in the `command` header byte.

use crate::error::ProtocolError;

/// Control commands (host → co-processor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CtrlCommand {
    /// Stop a sensor.
    Disable = 0,
    /// Start a sensor, body is [`BatchParams`](crate::BatchParams).
    Enable = 1,
    /// Flush buffered samples.
    Flush = 2,
    /// Run calibration.
    Calibrate = 3,
    /// Push configuration data.
    Configure = 4,
    /// Run the sensor self test.
    SelfTest = 5,
    /// Start raw-data reporting.
    EnableRaw = 6,
    /// Stop raw-data reporting.
    DisableRaw = 7,
    /// Suppress notifications.
    MaskNotify = 8,
    /// Resume notifications.
    UnmaskNotify = 9,
    /// Clock alignment, body is [`TimeSync`](crate::TimeSync).
    TimeSync = 10,
    /// Exchange shared buffer locations, body is [`ShareMemInfo`](crate::ShareMemInfo).
    ShareMemory = 11,
    /// Free-form debug request.
    Debug = 12,
}

impl CtrlCommand {
    /// Number of defined control commands.
    pub const COUNT: usize = 13;

    /// All control commands in code order.
    pub const ALL: [CtrlCommand; Self::COUNT] = [
        CtrlCommand::Disable,
        CtrlCommand::Enable,
        CtrlCommand::Flush,
        CtrlCommand::Calibrate,
        CtrlCommand::Configure,
        CtrlCommand::SelfTest,
        CtrlCommand::EnableRaw,
        CtrlCommand::DisableRaw,
        CtrlCommand::MaskNotify,
        CtrlCommand::UnmaskNotify,
        CtrlCommand::TimeSync,
        CtrlCommand::ShareMemory,
        CtrlCommand::Debug,
    ];

    /// Wire code.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Short lowercase name for logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            CtrlCommand::Disable => "disable",
            CtrlCommand::Enable => "enable",
            CtrlCommand::Flush => "flush",
            CtrlCommand::Calibrate => "calibrate",
            CtrlCommand::Configure => "configure",
            CtrlCommand::SelfTest => "self-test",
            CtrlCommand::EnableRaw => "enable-raw",
            CtrlCommand::DisableRaw => "disable-raw",
            CtrlCommand::MaskNotify => "mask-notify",
            CtrlCommand::UnmaskNotify => "unmask-notify",
            CtrlCommand::TimeSync => "timesync",
            CtrlCommand::ShareMemory => "share-memory",
            CtrlCommand::Debug => "debug",
        }
    }
}

impl TryFrom<u8> for CtrlCommand {
    type Error = ProtocolError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(code as usize)
            .copied()
            .ok_or(ProtocolError::UnknownCtrlCommand(code))
    }
}

impl std::fmt::Display for CtrlCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notify commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NotifyCommand {
    /// New samples are available, body is [`DataNotify`](crate::DataNotify).
    Data = 0,
    /// Shared buffer reached its watermark.
    Full = 1,
    /// Samples from the super buffer.
    SuperData = 2,
    /// Super buffer reached its watermark.
    SuperFull = 3,
    /// Co-processor finished booting.
    Ready = 4,
    /// Sensor list report.
    List = 5,
    /// Debug output.
    Debug = 6,
    /// Test traffic.
    Test = 7,
}

impl NotifyCommand {
    /// Number of defined notify commands.
    pub const COUNT: usize = 8;

    /// All notify commands in code order.
    pub const ALL: [NotifyCommand; Self::COUNT] = [
        NotifyCommand::Data,
        NotifyCommand::Full,
        NotifyCommand::SuperData,
        NotifyCommand::SuperFull,
        NotifyCommand::Ready,
        NotifyCommand::List,
        NotifyCommand::Debug,
        NotifyCommand::Test,
    ];

    /// Wire code.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Short lowercase name for logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            NotifyCommand::Data => "data",
            NotifyCommand::Full => "full",
            NotifyCommand::SuperData => "super-data",
            NotifyCommand::SuperFull => "super-full",
            NotifyCommand::Ready => "ready",
            NotifyCommand::List => "list",
            NotifyCommand::Debug => "debug",
            NotifyCommand::Test => "test",
        }
    }
}

impl TryFrom<u8> for NotifyCommand {
    type Error = ProtocolError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(code as usize)
            .copied()
            .ok_or(ProtocolError::UnknownNotifyCommand(code))
    }
}

impl std::fmt::Display for NotifyCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ctrl_codes_are_dense() {
        for (i, cmd) in CtrlCommand::ALL.iter().enumerate() {
            assert_eq!(cmd.code() as usize, i);
            assert_eq!(CtrlCommand::try_from(i as u8), Ok(*cmd));
        }
        assert_eq!(
            CtrlCommand::try_from(13),
            Err(ProtocolError::UnknownCtrlCommand(13))
        );
    }

    #[test]
    fn test_notify_codes_are_dense() {
        for (i, cmd) in NotifyCommand::ALL.iter().enumerate() {
            assert_eq!(cmd.code() as usize, i);
        }
        assert_eq!(NotifyCommand::try_from(7), Ok(NotifyCommand::Test));
        assert!(NotifyCommand::try_from(8).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(CtrlCommand::SelfTest.to_string(), "self-test");
        assert_eq!(NotifyCommand::SuperFull.to_string(), "super-full");
    }
}
