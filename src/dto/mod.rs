pub mod admin_dto;
pub mod appointment_dto;
pub mod auth_dto;
pub mod inbox_dto;
pub mod whatsapp_dto;
