use provenance_tools::models::config::AppConfig;
use provenance_tools::processing::fetch::download_images;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = match AppConfig::load() {
        Ok(config) => config.fetch,
        Err(e) => {
            log::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = download_images(&config).await {
        log::error!("Image download failed: {e}");
        std::process::exit(1);
    }
}
