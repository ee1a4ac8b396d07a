use provenance_tools::models::config::AppConfig;
use provenance_tools::processing::split::run;

fn main() {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = match AppConfig::load() {
        Ok(config) => config.split,
        Err(e) => {
            log::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&config) {
        log::error!("Photo splitting failed: {e}");
        std::process::exit(1);
    }
}
