//! Platform bot adapters and the call-bot service.
//!
//! One adapter per video-call platform (Google Meet, Microsoft Teams,
//! Zoom), each fronting that vendor's SDK boundary behind a common trait.
//! The [`service::CallBotService`] dispatches on platform, owns the bot
//! session registry, and runs the reconnection policy.

pub mod adapter;
pub mod detect;
pub mod meet;
pub mod registry;
pub mod service;
pub mod teams;
pub mod traits;
pub mod zoom;

pub use registry::PlatformRegistry;
pub use service::CallBotService;
pub use traits::PlatformBot;
