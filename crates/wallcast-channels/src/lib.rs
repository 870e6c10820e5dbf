//! # Wallcast Channels
//! VK API plumbing: method calls, error classification, and the Bots Long Poll
//! event stream.

pub mod longpoll;
pub mod vk;

pub use longpoll::{LongPoll, LongPollStream};
pub use vk::{ApiError, VkClient};
