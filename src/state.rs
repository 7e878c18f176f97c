use sqlx::PgPool;

use crate::auth::SharedAuthProvider;

/// Shared handles available to every handler and middleware
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub auth: SharedAuthProvider,
}

impl AppState {
    pub fn new(pool: PgPool, auth: SharedAuthProvider) -> Self {
        Self { pool, auth }
    }
}
