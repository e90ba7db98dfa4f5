pub mod cache;
pub mod crypto;
pub mod phone;
pub mod signature;
pub mod time;
pub mod token;
