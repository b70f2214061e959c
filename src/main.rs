//! macos_bundler_release - build, sign, package and notarize a macOS app.

use macos_bundler_release::cli;
use macos_bundler_release::cli::OutputManager;
use std::process;

#[tokio::main]
async fn main() {
    // Warnings stay visible without RUST_LOG
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    match cli::run().await {
        Ok(exit_code) => {
            process::exit(exit_code);
        }
        Err(e) => {
            // Never quiet for fatal errors
            let output = OutputManager::new(false);
            output.error(&format!("Fatal error: {e}"));
            output.suggestions(&e.recovery_suggestions());
            process::exit(1);
        }
    }
}
