pub use super::tracked_notification::Entity as TrackedNotification;
