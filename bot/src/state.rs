use std::sync::Arc;

use sqlx::PgPool;

use crate::dispatch::Dispatcher;
use crate::messenger::Messenger;
use crate::store::ProfileStore;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub bot: Arc<Dispatcher>,
    pub store: Arc<dyn ProfileStore>,
    pub messenger: Arc<Messenger>,
    /// Channel secret for chat-platform webhook signatures
    pub channel_secret: String,
    /// Shared secret for payment-provider webhook signatures
    pub billing_secret: String,
}
