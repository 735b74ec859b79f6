//! TourFleet Client Core - Headless Entry Point
//!
//! Boots the session core without any screens: restores the persisted
//! session and reports its status. The mobile shells embed `tourfleet_lib`
//! directly and drive the same `ScreenContext`.

use anyhow::Result;
use tracing::info;

use tourfleet_lib::{config::AppConfig, logging, ScreenContext};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env();
    logging::init(&config.data_dir);

    let host = whoami::fallible::hostname().unwrap_or_else(|_| "unknown-host".to_string());
    info!(
        "TourFleet client core starting on {} (api: {})",
        host, config.api_base_url
    );

    let context = ScreenContext::new(&config);
    context.start().await;

    let session = context.session.snapshot();
    if session.is_logged() {
        let name = context
            .profile
            .cached()
            .and_then(|p| p.user_name)
            .unwrap_or_else(|| "unknown user".to_string());
        info!("Session active for {}", name);
    } else {
        info!("No session; login required");
    }

    Ok(())
}
