use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use crate::auth::google::{GoogleClient, GoogleIdentity};
use crate::config::AppConfig;
use crate::mailer::{LogMailer, Mailer};
use crate::sessions::repo::{PgSessionStore, SessionStore};
use crate::users::repo::{PgUserStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub mailer: Arc<dyn Mailer>,
    pub google: Option<Arc<dyn GoogleIdentity>>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .context("run migrations")?;

        let google = config
            .google
            .clone()
            .map(|g| Arc::new(GoogleClient::new(g)) as Arc<dyn GoogleIdentity>);

        Ok(Self {
            config,
            users: Arc::new(PgUserStore::new(db.clone())),
            sessions: Arc::new(PgSessionStore::new(db)),
            mailer: Arc::new(LogMailer),
            google,
        })
    }
}
