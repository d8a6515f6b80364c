use switchyard::cli::run_cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists; must happen before any config is read
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    run_cli().await
}
