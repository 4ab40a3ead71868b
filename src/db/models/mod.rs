//! Database models, one file per collection (spec §3), matching the
//! teacher's `db::models` split.

pub mod contact;
pub mod context_dismissal;
pub mod event;
pub mod message;
pub mod push_subscription;
pub mod trigger;

pub use contact::Contact;
pub use context_dismissal::ContextDismissal;
pub use event::Event;
pub use message::Message;
pub use push_subscription::PushSubscription;
pub use trigger::Trigger;
