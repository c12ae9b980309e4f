//! HTTP front door for ssogate.
//!
//! Wires the OAuth engines to a storage backend chosen by configuration and
//! serves them over axum.

pub mod config;
pub mod handlers;
pub mod observability;
pub mod state;
pub mod users;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
};
use ssogate_auth::{OAuthServer, Storage};
use ssogate_auth_postgres::{AppUpdate, NewApp, PostgresOAuthStorage};
use ssogate_sso::{SsoStorage, create_kv_store};
use tower_http::trace::TraceLayer;

pub use config::AppConfig;
pub use state::AppState;
pub use users::{UserDirectory, hash_password};

/// Build handler state: open storage and register configured clients.
pub async fn build_state(config: &AppConfig) -> anyhow::Result<AppState> {
    let (storage, sso): (Arc<dyn Storage>, Option<Arc<SsoStorage>>) = match config.storage.backend
    {
        config::StorageBackend::Sso => {
            let store = create_kv_store(&config.storage.redis).await;
            let sso = Arc::new(SsoStorage::new(store, config.sso.clone()));
            for client in &config.clients {
                sso.put_client(client)
                    .await
                    .with_context(|| format!("register client {}", client.id))?;
            }
            let storage: Arc<dyn Storage> = sso.clone();
            (storage, Some(sso))
        }
        config::StorageBackend::Postgres => {
            let pg = PostgresOAuthStorage::connect(&config.storage.postgres.url)
                .await
                .context("connect to postgres")?;
            if config.storage.postgres.init_schema {
                pg.init_schema().await.context("create oauth tables")?;
            }
            register_apps(&pg, &config.clients).await?;
            let storage: Arc<dyn Storage> = Arc::new(pg);
            (storage, None)
        }
    };

    tracing::info!(
        backend = ?config.storage.backend,
        clients = config.clients.len(),
        users = config.users.len(),
        "Storage ready"
    );

    Ok(AppState {
        oauth: OAuthServer::new(config.oauth.clone(), storage),
        sso,
        users: Arc::new(UserDirectory::new(&config.users)),
        session: config.session.clone(),
    })
}

async fn register_apps(pg: &PostgresOAuthStorage, clients: &[ssogate_auth::Client]) -> anyhow::Result<()> {
    let apps = pg.apps();
    for client in clients {
        let created = apps
            .create(&NewApp {
                name: client.id.clone(),
                client_id: client.id.clone(),
                secret: client.secret.clone(),
                redirect_uri: client.redirect_uri.clone(),
                url: String::new(),
                extra: client.user_data.clone(),
            })
            .await;
        match created {
            Ok(_) => {}
            Err(e) if e.is_conflict() => {
                apps.update(
                    &client.id,
                    &AppUpdate {
                        secret: Some(client.secret.clone()),
                        redirect_uri: Some(client.redirect_uri.clone()),
                        extra: client.user_data.clone(),
                        ..Default::default()
                    },
                )
                .await
                .with_context(|| format!("update client {}", client.id))?;
            }
            Err(e) => return Err(e).with_context(|| format!("register client {}", client.id)),
        }
    }
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/authorize",
            get(handlers::authorize::authorize_get).post(handlers::authorize::authorize_post),
        )
        .route(
            "/token",
            get(handlers::token::token_get).post(handlers::token::token_post),
        )
        .route("/session", get(handlers::session::session_get))
        .route("/logout", post(handlers::session::logout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn build_app(config: &AppConfig) -> anyhow::Result<Router> {
    let state = build_state(config).await?;
    Ok(build_router(state))
}
