use provenance_tools::models::config::AppConfig;
use provenance_tools::processing::harvest::{StopReason, harvest_to_file};
use provenance_tools::sources::adlib::AdlibSource;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = match AppConfig::load() {
        Ok(config) => config.harvest,
        Err(e) => {
            log::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let source = match AdlibSource::new(&config.base_url, &config.database) {
        Ok(source) => source,
        Err(e) => {
            log::error!("Failed to create Adlib source: {e}");
            std::process::exit(1);
        }
    };

    match harvest_to_file(&source, &config).await {
        Ok(harvest) => {
            if !matches!(harvest.stop, StopReason::Exhausted) {
                log::warn!("Harvest stopped early, the document holds a partial result");
            }
        }
        Err(e) => {
            log::error!("Harvest into {} failed: {e}", config.output_file.display());
            std::process::exit(1);
        }
    }
}
