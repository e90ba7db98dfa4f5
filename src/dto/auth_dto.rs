use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct AdminLoginPayload {
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ImpersonatePayload {
    pub business_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RedeemOnboardingPayload {
    #[validate(length(min = 16, max = 128))]
    pub token: String,
}
