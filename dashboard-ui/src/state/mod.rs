//! State Management
//!
//! Global application state and the realtime channel.

pub mod global;
pub mod realtime;

pub use global::{provide_global_state, GlobalState, Toast, ToastVariant};
pub use realtime::{ChannelConfig, RealtimeChannel};
