pub mod checksum;
pub mod config;
pub mod error;
pub mod interface;
pub mod packet;
pub mod scenario;

pub use checksum::packet_checksum;
pub use error::{ConfigError, ProtocolError};
pub use interface::{SystemContext, TransportEntity};
pub use packet::{MSG_SIZE, Message, NAK_PAYLOAD, Packet};

pub use config::SimConfig;
pub use scenario::{ProtocolSettings, SimConfigOverride, TestAction, TestAssertion, TestScenario};
