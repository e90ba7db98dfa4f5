pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;
use std::time::Duration;

use crate::dto::admin_dto::AdminOverview;
use crate::services::{
    admin_service::AdminService, appointment_service::AppointmentService,
    business_service::BusinessService, client_service::ClientService,
    conversation_service::ConversationService, message_service::MessageService,
    onboarding_service::OnboardingService, outbox_service::OutboxService,
    send_service::{OutboxWorker, SendService},
    tenant_service::TenantService,
    webhook_service::WebhookService,
    whatsapp_client::{GraphWhatsAppClient, WhatsAppApi},
};
use crate::utils::cache::{InMemoryTtlCache, ResponseCache};
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub whatsapp: Arc<dyn WhatsAppApi>,
    pub tenant_service: TenantService,
    pub conversation_service: ConversationService,
    pub message_service: MessageService,
    pub outbox_service: OutboxService,
    pub send_service: SendService,
    pub webhook_service: WebhookService,
    pub admin_service: AdminService,
    pub client_service: ClientService,
    pub appointment_service: AppointmentService,
    pub business_service: BusinessService,
    pub onboarding_service: OnboardingService,
}

impl AppState {
    /// Wires services against the Graph API client configured from the environment.
    pub fn new(pool: PgPool) -> error::Result<Self> {
        let config = config::get_config();
        let client = GraphWhatsAppClient::new(
            config.whatsapp_api_base.clone(),
            Duration::from_secs(config.whatsapp_timeout_secs),
        )?;
        Ok(Self::with_whatsapp(pool, Arc::new(client)))
    }

    pub fn with_whatsapp(pool: PgPool, whatsapp: Arc<dyn WhatsAppApi>) -> Self {
        let config = config::get_config();

        let tenant_service = TenantService::new(pool.clone(), config.whatsapp_access_token.clone());
        let conversation_service = ConversationService::new(pool.clone());
        let message_service = MessageService::new(pool.clone());
        let outbox_service = OutboxService::new(pool.clone());
        let send_service = SendService::new(
            tenant_service.clone(),
            conversation_service.clone(),
            message_service.clone(),
            outbox_service.clone(),
            whatsapp.clone(),
            config.whatsapp_fallback_template.clone(),
            config.whatsapp_template_lang.clone(),
        );
        let webhook_service = WebhookService::new(
            pool.clone(),
            tenant_service.clone(),
            conversation_service.clone(),
            message_service.clone(),
        );
        let overview_cache: Arc<dyn ResponseCache<AdminOverview>> =
            Arc::new(InMemoryTtlCache::new());
        let admin_service = AdminService::new(
            pool.clone(),
            outbox_service.clone(),
            overview_cache,
            Duration::from_secs(config.admin_cache_ttl_secs),
        );
        let client_service = ClientService::new(pool.clone());
        let appointment_service = AppointmentService::new(pool.clone());
        let business_service = BusinessService::new(pool.clone());
        let onboarding_service =
            OnboardingService::new(pool.clone(), config.onboarding_token_ttl_hours);

        Self {
            pool,
            whatsapp,
            tenant_service,
            conversation_service,
            message_service,
            outbox_service,
            send_service,
            webhook_service,
            admin_service,
            client_service,
            appointment_service,
            business_service,
            onboarding_service,
        }
    }

    pub fn outbox_worker(&self) -> OutboxWorker {
        let config = config::get_config();
        OutboxWorker::new(
            self.tenant_service.clone(),
            self.message_service.clone(),
            self.outbox_service.clone(),
            self.whatsapp.clone(),
            config.whatsapp_fallback_template.clone(),
            config.whatsapp_template_lang.clone(),
            config.outbox_max_attempts,
        )
    }
}
