use std::time::Duration;

use sqlx::PgPool;

use crate::{
    auth::TokenSigner,
    config::Config,
    notify::{
        transport::{ChannelGateway, GatewayConfig},
        Dispatcher,
    },
};

/// Shared application state handed to every handler. Cheap to clone: the
/// pool and dispatcher are reference-counted internally.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub tokens: TokenSigner,
    pub dispatcher: Dispatcher,
    pub max_probes_per_device: i64,
}

impl AppState {
    pub fn new(pool: PgPool, config: &Config) -> Self {
        let gateway = ChannelGateway::new(
            GatewayConfig {
                email_url: config.email_gateway_url.clone(),
                sms_url: config.sms_gateway_url.clone(),
                push_url: config.push_gateway_url.clone(),
            },
            Duration::from_secs(config.channel_timeout_secs),
        );
        Self {
            pool: pool.clone(),
            tokens: TokenSigner::new(config.auth_secret.clone(), config.token_ttl_mins),
            dispatcher: Dispatcher::new(pool, gateway),
            max_probes_per_device: config.max_probes_per_device,
        }
    }
}
