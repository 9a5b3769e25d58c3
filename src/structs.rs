use std::fmt;
use std::net::Ipv4Addr;

use crate::addr::ParsedAddress;
use crate::rnd::RandomBitfields;

/// Smallest frame the generator will emit (without CRC).
pub const MIN_PKT_SIZE: u16 = 64;

/// Outcome class of one executed script unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
    Ok,
    ScriptError,
    IoError,
}

impl fmt::Display for ExecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecStatus::Ok => "ok",
            ExecStatus::ScriptError => "script error",
            ExecStatus::IoError => "io error",
        };
        write!(f, "{s}")
    }
}

/// Result of executing one script unit against the engine.
#[derive(Debug, Clone)]
pub struct ScriptExecutionResult {
    pub status: ExecStatus,
    pub message: Option<String>,
}

impl ScriptExecutionResult {
    pub fn ok(message: Option<String>) -> ScriptExecutionResult {
        ScriptExecutionResult {
            status: ExecStatus::Ok,
            message,
        }
    }

    pub fn script_error(message: String) -> ScriptExecutionResult {
        ScriptExecutionResult {
            status: ExecStatus::ScriptError,
            message: Some(message),
        }
    }

    pub fn io_error(message: String) -> ScriptExecutionResult {
        ScriptExecutionResult {
            status: ExecStatus::IoError,
            message: Some(message),
        }
    }
}

/// Per-port generator configuration, the state the control scripts mutate.
#[derive(Debug, Clone)]
pub struct PortConfig {
    /// Number of packets to send, 0 meaning continuous.
    pub count: u64,
    /// Frame size in bytes.
    pub size: u16,
    /// Transmit rate as a percentage of line rate.
    pub rate: u8,
    pub sport: u16,
    pub dport: u16,
    pub src: ParsedAddress,
    /// Destination address, possibly a network to sweep.
    pub dst: ParsedAddress,
    pub rnd: RandomBitfields,
    pub active: bool,
}

impl Default for PortConfig {
    fn default() -> PortConfig {
        PortConfig {
            count: 0,
            size: MIN_PKT_SIZE,
            rate: 100,
            sport: 1234,
            dport: 5678,
            src: ParsedAddress::host_v4(Ipv4Addr::new(192, 168, 0, 1)),
            dst: ParsedAddress::host_v4(Ipv4Addr::new(192, 168, 1, 1)),
            rnd: RandomBitfields::new(),
            active: false,
        }
    }
}
