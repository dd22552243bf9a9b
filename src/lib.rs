//! Single-program MPEG-TS channel extraction and PID remapping, plus a
//! child-process pipe stage for feeding a transport stream through an
//! external tool and back.

pub mod assembler;
pub mod channel;
pub mod config;
pub mod constants;
pub mod crc;
pub mod host;
pub mod network;
pub mod packet;
pub mod pipe;
pub mod psi;

pub use channel::Channel;
pub use config::{ChannelConfig, MapRule, MapSelector, PipeConfig};
pub use host::DemuxHost;
pub use packet::TsPacket;
pub use pipe::{PipeHandle, PipeLifecycle};
