// src/common/mod.rs

// --- Declare all public modules within common ---
pub mod crc;
pub mod error;
pub mod hal_traits;
pub mod packet;
pub mod timing;
pub mod types;
pub mod units;

// --- Re-export key types/traits/functions for easier access ---

// From crc.rs
pub use crc::{calculate_crc16, encode_crc, validate as validate_crc};

// From error.rs
pub use error::{PacketError, ProtocolError};

// From hal_traits.rs
pub use hal_traits::{StationInstant, StationSerial, StationTimer};

// From packet.rs
pub use packet::{decode as decode_loop_packet, parse as parse_loop_packet, LoopReading};

// From types.rs
pub use types::{
    keys, DataSource, LoopPacket, OpMode, SensorSnapshot, StationModel, ACK, LOOP_PACKET_LEN,
};
