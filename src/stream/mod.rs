//! Streaming fan-out: quote, depth, trade, position, order-status and
//! operator-alert delivery to many concurrent subscribers without
//! blocking the match path.

mod event;
mod hub;
mod subscriber;

pub use event::{Channel, ChannelMask, Envelope, StreamEvent};
pub use hub::StreamHub;
pub use subscriber::{Subscriber, SubscriptionFilter};
