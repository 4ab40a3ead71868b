pub mod models;
pub mod repository;

pub use models::{Contact, ContextDismissal, Event, Message, PushSubscription, Trigger};
pub use repository::{
    ContactRepository, ContextDismissalRepository, EventPatch, EventRepository, MessageRepository,
    PushSubscriptionRepository, TriggerRepository,
};
