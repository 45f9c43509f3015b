use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::graphql::{build_schema, FeedSchema};
use crate::identity::{IdentityContext, SqliteAuthProvider};
use crate::ledger::{DynLedger, SqliteLedger};
use crate::store::{DynContentStore, SqliteContentStore};

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub identity: IdentityContext,
    pub store: DynContentStore,
    pub ledger: DynLedger,
    pub graphql_schema: FeedSchema,
}

impl AppState {
    /// Wire every service over one pool.
    pub fn new(db: DbPool, config: Config) -> Self {
        let store: DynContentStore = Arc::new(SqliteContentStore::new(db.clone()));
        let ledger: DynLedger = Arc::new(SqliteLedger::new(db.clone()));
        let auth = Arc::new(SqliteAuthProvider::new(
            db.clone(),
            config.auth.session_hours,
            config.auth.password_cost,
        ));
        let identity = IdentityContext::new(auth, store.clone(), config.auth.admin_email.clone());

        Self {
            db,
            config,
            identity,
            store,
            ledger,
            graphql_schema: build_schema(),
        }
    }
}
