#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use anyhow::{bail, Context, Result};
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tradelog_session::{
    api::HttpSessionApi,
    auth::AuthContext,
    clock::SystemClock,
    credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore},
    session::{ChannelEvents, SessionEvent, SessionLifecycleManager},
    settings::Settings,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration from Settings.toml and environment variables
    // This also loads .env file and initializes the logger
    let settings = Settings::load().context("Failed to load settings")?;
    print_startup_info(&settings);

    let api = HttpSessionApi::new(&settings.api_base_url()?, settings.request_timeout())
        .context("Failed to build the session API client")?;
    let api = Arc::new(api);

    let credentials: Arc<dyn CredentialStore> = match settings.credentials_path() {
        Some(path) => Arc::new(FileCredentialStore::new(path)),
        None => Arc::new(MemoryCredentialStore::new()),
    };

    let manager = Arc::new(SessionLifecycleManager::new(
        api.clone(),
        credentials,
        Arc::new(SystemClock),
        settings.lifecycle_config(),
    ));
    let context = AuthContext::new(api, Arc::clone(&manager));

    let (events, mut receiver) = ChannelEvents::channel();
    if !context.mount(Arc::new(events)).await {
        sign_in(&context).await?;
    }

    let auto_extend = settings.session.auto_extend;
    let extending = Arc::new(AtomicBool::new(false));
    loop {
        tokio::select! {
            event = receiver.recv() => match event {
                Some(SessionEvent::Warning(warning)) => {
                    println!("[{}] {}", warning.kind, warning.message);
                    if auto_extend && warning.offer_extend && !extending.swap(true, Ordering::SeqCst) {
                        let manager = Arc::clone(&manager);
                        let extending = Arc::clone(&extending);
                        // Never wait on the manager from the event loop
                        tokio::spawn(async move {
                            if manager.extend_session().await {
                                info!("Session extended automatically");
                            } else {
                                warn!("Automatic session extension failed");
                            }
                            extending.store(false, Ordering::SeqCst);
                        });
                    }
                }
                Some(SessionEvent::WarningWithdrawn) => {
                    println!("Session extended, warning dismissed");
                }
                Some(SessionEvent::Logout(reason)) => {
                    println!("Signed out: {reason}");
                    break;
                }
                None => break,
            },
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                println!("Stopping session monitor");
                context.unmount().await;
                break;
            }
        }
    }

    Ok(())
}

/// Sign in with `TRADELOG_USERNAME` / `TRADELOG_PASSWORD`
async fn sign_in(context: &AuthContext) -> Result<()> {
    let (Ok(username), Ok(password)) = (
        std::env::var("TRADELOG_USERNAME"),
        std::env::var("TRADELOG_PASSWORD"),
    ) else {
        bail!("No stored session; set TRADELOG_USERNAME and TRADELOG_PASSWORD to sign in");
    };

    context
        .login(&username, &password)
        .await
        .with_context(|| format!("Sign-in failed for {username}"))
}

fn print_startup_info(settings: &Settings) {
    println!("🚀 Starting tradelog session monitor");
    println!("📡 Session API: {}", settings.api.base_url);
    println!(
        "⏱️  Polling every {}s, critical below {}s",
        settings.session.poll_interval_secs, settings.session.critical_threshold_secs
    );
    match settings.credentials_path() {
        Some(path) => println!("🔑 Credentials file: {}", path.display()),
        None => println!("🔑 Credentials kept in memory"),
    }
    if settings.session.auto_extend {
        println!("♻️  Auto-extend enabled");
    }
}
