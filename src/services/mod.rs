pub mod admin_service;
pub mod appointment_service;
pub mod business_service;
pub mod client_service;
pub mod conversation_service;
pub mod message_service;
pub mod onboarding_service;
pub mod outbox_service;
pub mod send_service;
pub mod tenant_service;
pub mod webhook_service;
pub mod whatsapp_client;
