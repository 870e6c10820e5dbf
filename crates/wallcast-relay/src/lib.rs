//! # Wallcast Relay
//!
//! Forwards new community wall posts into group chats.
//!
//! ## Architecture
//! ```text
//! Long poll events
//!   ├── message_new   → CommandInterpreter → SubscriptionStore (upsert/delete)
//!   └── wall_post_new → DispatchEngine
//!                         ├── list_by_source (snapshot)
//!                         └── per chat: send (rate-limit retry, failures isolated)
//!
//! DiscoverySweep (interval, alternate mode)
//!   Fetching → Filtering (watermark) → Probing (peer ids upward) → Done (save watermark)
//! ```

pub mod commands;
pub mod dispatch;
pub mod engine;
pub mod placeholders;
pub mod retry;
pub mod sweep;

#[cfg(test)]
mod testing;

pub use commands::{Command, CommandInterpreter, CommandOutcome};
pub use dispatch::{DispatchEngine, DispatchReport};
pub use engine::{Relay, spawn_sweep};
pub use retry::RetryPolicy;
pub use sweep::{DiscoverySweep, StopReason, SweepReport};
