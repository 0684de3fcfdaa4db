pub mod notifications;
pub mod proposals;
