//! Real-time fan-out: typed events, rooms, relays and the relay connection pool.

pub mod events;
pub mod pool;
pub mod protocol;
pub mod relay;
pub mod rooms;

pub use events::{EventEnvelope, GlobalEvent, MatchEvent, PresenceEvent, RealtimeEvent, TournamentEvent};
pub use relay::{ChannelHandle, LocalRelay, PooledRelay, Relay, RelayError};
pub use rooms::{Room, RoomError, RoomManager, RoomType, Subscription};
