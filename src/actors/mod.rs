pub mod assistant_actor;
pub mod cleanup_actor;
pub mod messages;

pub use assistant_actor::AssistantActorHandle;
pub use cleanup_actor::CleanupActorHandle;
