//! Real-time fan-out core.
//!
//! - `connection`: handles of locally connected clients
//! - `registry`: per-room membership and relay ownership
//! - `relay`: one task per active room, broker topic → local connections

pub mod connection;
pub mod registry;
pub mod relay;

pub use connection::{
    ConnectionHandle, ConnectionId, DeliveryError, Outbound, PusherChannel, close_code,
};
pub use registry::{
    JoinOutcome, LeaveOutcome, RelayHandle, RelayId, RoomActivity, RoomRegistry,
};
pub use relay::{DeliveryReport, RelayContext, fan_out, start_relay};
