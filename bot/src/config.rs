/// Process configuration, read once at startup. Required variables
/// panic with a pointed message when missing; optional ones carry the
/// documented defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Chat-platform API base for reply/push delivery
    pub messenger_api_base: String,
    /// Channel secret used to verify inbound webhook signatures
    pub messenger_channel_secret: String,
    /// Bearer token for outbound reply/push calls
    pub messenger_access_token: String,
    pub llm_api_base: String,
    pub llm_api_key: String,
    pub llm_model: String,
    /// Shared secret for the payment provider's webhook signature
    pub billing_webhook_secret: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            messenger_api_base: std::env::var("MESSENGER_API_BASE")
                .unwrap_or_else(|_| "https://api.line.me".to_string()),
            messenger_channel_secret: std::env::var("MESSENGER_CHANNEL_SECRET")
                .expect("MESSENGER_CHANNEL_SECRET must be set"),
            messenger_access_token: std::env::var("MESSENGER_ACCESS_TOKEN")
                .expect("MESSENGER_ACCESS_TOKEN must be set"),
            llm_api_base: std::env::var("LLM_API_BASE")
                .unwrap_or_else(|_| "https://openrouter.ai/api/v1".to_string()),
            llm_api_key: std::env::var("LLM_API_KEY").expect("LLM_API_KEY must be set"),
            llm_model: std::env::var("LLM_MODEL")
                .unwrap_or_else(|_| "meta-llama/llama-3.3-70b-instruct".to_string()),
            billing_webhook_secret: std::env::var("BILLING_WEBHOOK_SECRET")
                .expect("BILLING_WEBHOOK_SECRET must be set"),
        }
    }
}
