use provenance_tools::models::config::AppConfig;
use provenance_tools::processing::matching::run_matching;
use provenance_tools::repository::FileIndexCache;
use provenance_tools::vision::embedder::FastembedImageEmbedder;

fn main() {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = match AppConfig::load() {
        Ok(config) => config.matching,
        Err(e) => {
            log::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    log::info!("Loading model: {}", config.model);
    let mut embedder = match FastembedImageEmbedder::try_new(&config.model) {
        Ok(embedder) => embedder,
        Err(e) => {
            log::error!("Failed to load model {}: {e}", config.model);
            std::process::exit(1);
        }
    };

    let cache = FileIndexCache::new(config.index_cache_path(), config.mapping_cache_path());
    if let Err(e) = run_matching(&config, &mut embedder, &cache) {
        log::error!("Matching failed: {e}");
        std::process::exit(1);
    }
}
