pub mod appointment;
pub mod business;
pub mod channel_account;
pub mod client;
pub mod conversation;
pub mod message;
pub mod onboarding_token;
pub mod outbox;
pub mod webhook_event;
