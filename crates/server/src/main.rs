use std::future::{Future, IntoFuture};

use anyhow::Error as AnyhowError;
use db::DbErr;
use db::models::{session::Session, user::{CreateUser, User, UserRole}};
use server::{AppState, http};
use services::services::auth as auth_service;
use thiserror::Error;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, prelude::*};
use utils::assets::asset_dir;
use uuid::Uuid;

const GRACEFUL_SHUTDOWN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);
const SESSION_PRUNE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60 * 60);
const ADMIN_EMAIL_ENV: &str = "CAREPLAN_ADMIN_EMAIL";
const ADMIN_PASSWORD_ENV: &str = "CAREPLAN_ADMIN_PASSWORD";
const DEFAULT_ADMIN_EMAIL: &str = "admin@careplan.local";

#[derive(Debug, Error)]
pub enum CareplanError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error(transparent)]
    Other(#[from] AnyhowError),
}

fn spawn_background<F>(task: F) -> tokio::task::JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(task)
}

#[tokio::main]
async fn main() -> Result<(), CareplanError> {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let filter_string = format!(
        "warn,server={level},services={level},db={level},utils={level}",
        level = log_level
    );
    let env_filter = EnvFilter::try_new(filter_string).expect("Failed to create tracing filter");
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter))
        .init();

    // Create asset directory if it doesn't exist
    if !asset_dir().exists() {
        std::fs::create_dir_all(asset_dir())?;
    }

    let state = AppState::new().await?;
    bootstrap_admin(&state).await?;

    let prune_pool = state.db().pool.clone();
    spawn_background(async move {
        loop {
            match Session::prune_expired(&prune_pool).await {
                Ok(removed) if removed > 0 => {
                    tracing::info!(removed, "Pruned expired sessions");
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "Failed to prune expired sessions");
                }
            }
            tokio::time::sleep(SESSION_PRUNE_INTERVAL).await;
        }
    });

    let app_router = http::router(state.clone());

    let port = std::env::var("BACKEND_PORT")
        .or_else(|_| std::env::var("PORT"))
        .ok()
        .and_then(|value| value.trim().parse::<u16>().ok())
        .unwrap_or_else(|| {
            tracing::info!("No PORT environment variable set, using port 0 for auto-assignment");
            0
        });

    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let listener = tokio::net::TcpListener::bind(format!("{host}:{port}")).await?;
    let actual_port = listener.local_addr()?.port();

    tracing::info!("Server running on http://{host}:{actual_port}");

    let (shutdown_rx, force_exit_rx) = spawn_shutdown_watchers();

    let server = axum::serve(listener, app_router)
        .with_graceful_shutdown(wait_for_watch_true(shutdown_rx.clone()))
        .into_future();
    tokio::pin!(server);

    let serve_result = tokio::select! {
        res = &mut server => res,
        _ = wait_for_watch_true(force_exit_rx.clone()) => {
            tracing::warn!("Force shutdown requested (second signal), exiting immediately");
            std::process::exit(130);
        }
        _ = shutdown_deadline(shutdown_rx.clone(), GRACEFUL_SHUTDOWN_TIMEOUT) => {
            tracing::warn!(
                "Graceful shutdown timed out after {:?}, exiting immediately",
                GRACEFUL_SHUTDOWN_TIMEOUT
            );
            std::process::exit(130);
        }
    };

    serve_result?;

    if *shutdown_rx.borrow() {
        std::process::exit(0);
    }

    Ok(())
}

/// Seeds the first administrator on an empty database so the instance is
/// reachable. Credentials come from the environment; a generated password
/// is printed once when none is configured.
async fn bootstrap_admin(state: &AppState) -> Result<(), DbErr> {
    if User::count(&state.db().pool).await? > 0 {
        return Ok(());
    }

    let email =
        std::env::var(ADMIN_EMAIL_ENV).unwrap_or_else(|_| DEFAULT_ADMIN_EMAIL.to_string());
    let (password, generated) = match std::env::var(ADMIN_PASSWORD_ENV) {
        Ok(password) if !password.trim().is_empty() => (password, false),
        _ => (auth_service::generate_token(), true),
    };

    let salt = auth_service::generate_salt();
    let data = CreateUser {
        first_name: "Admin".to_string(),
        last_name: "Careplan".to_string(),
        email: email.clone(),
        password_hash: auth_service::hash_password(&password, &salt),
        password_salt: salt,
        role: UserRole::Admin,
        hourly_rate_cents: 0,
        travel_cost_cents: 0,
    };

    User::create(&state.db().pool, &data, Uuid::new_v4())
        .await
        .map_err(|err| DbErr::Custom(err.to_string()))?;

    if generated {
        tracing::warn!(
            email,
            password,
            "Created bootstrap administrator with a generated password; change it after first login"
        );
    } else {
        tracing::info!(email, "Created bootstrap administrator");
    }

    Ok(())
}

fn spawn_shutdown_watchers() -> (watch::Receiver<bool>, watch::Receiver<bool>) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (force_exit_tx, force_exit_rx) = watch::channel(false);

    tokio::spawn(async move {
        let mut shutdown_sent = false;

        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let mut sigint = match signal(SignalKind::interrupt()) {
                Ok(sig) => sig,
                Err(e) => {
                    tracing::error!("Failed to install SIGINT handler: {e}");
                    return;
                }
            };

            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(sig) => Some(sig),
                Err(e) => {
                    tracing::error!("Failed to install SIGTERM handler: {e}");
                    None
                }
            };

            loop {
                tokio::select! {
                    _ = sigint.recv() => {},
                    _ = async {
                        if let Some(sigterm) = sigterm.as_mut() {
                            sigterm.recv().await;
                        } else {
                            std::future::pending::<()>().await;
                        }
                    } => {},
                }

                if !shutdown_sent {
                    shutdown_sent = true;
                    tracing::info!(
                        "Shutdown signal received, starting graceful shutdown (press Ctrl+C again to force)"
                    );
                    let _ = shutdown_tx.send(true);
                } else {
                    tracing::warn!("Second shutdown signal received, forcing exit");
                    let _ = force_exit_tx.send(true);
                    break;
                }
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to install Ctrl+C handler: {e}");
                return;
            }

            tracing::info!(
                "Shutdown signal received, starting graceful shutdown (press Ctrl+C again to force)"
            );
            let _ = shutdown_tx.send(true);

            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to install Ctrl+C handler: {e}");
                return;
            }

            tracing::warn!("Second shutdown signal received, forcing exit");
            let _ = force_exit_tx.send(true);
        }
    });

    (shutdown_rx, force_exit_rx)
}

async fn wait_for_watch_true(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }

        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn shutdown_deadline(rx: watch::Receiver<bool>, timeout: std::time::Duration) {
    wait_for_watch_true(rx).await;
    tokio::time::sleep(timeout).await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::oneshot;

    use super::spawn_background;

    #[tokio::test]
    async fn spawn_background_returns_immediately() {
        let (tx, rx) = oneshot::channel::<()>();

        let start = std::time::Instant::now();
        let handle = spawn_background(async move {
            let _ = rx.await;
        });
        assert!(start.elapsed() < Duration::from_millis(50));

        let _ = tx.send(());
        let _ = handle.await;
    }
}
