//! Service entry point: load settings and run the HTTP server.

use server::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Environment overrides may come from a local .env during development.
    dotenvy::dotenv().ok();
    let settings = Settings::load()?;
    server::start_server(settings).await
}
