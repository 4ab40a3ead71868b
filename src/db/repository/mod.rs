pub mod contact_repository;
pub mod context_dismissal_repository;
pub mod event_repository;
pub mod message_repository;
pub mod push_subscription_repository;
pub mod trigger_repository;

pub use contact_repository::ContactRepository;
pub use context_dismissal_repository::ContextDismissalRepository;
pub use event_repository::{EventPatch, EventRepository};
pub use message_repository::MessageRepository;
pub use push_subscription_repository::PushSubscriptionRepository;
pub use trigger_repository::TriggerRepository;
