use rgen_diffusion::{
    logger, server, BedrockImageModel, GenerationService, S3ImageStore, ServerConfig,
};
use std::sync::Arc;

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dotenv_loaded = dotenv::dotenv().is_ok();

    logger::init()?;
    if dotenv_loaded {
        log::info!(".env file loaded");
    } else {
        log::warn!("No .env file found, using system environment variables");
    }

    let config = ServerConfig::from_env().inspect_err(|e| log::error!("{}", e))?;
    logger::log_startup_info(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"), &config);

    log::info!("Loading model: {}", config.model_id);
    let model = BedrockImageModel::load(&config.model_id, &config.bedrock)
        .await
        .inspect_err(|e| log::error!("Failed to initialize model: {}", e))?;
    log::info!("Model loaded successfully ({:?} family)", model.family());

    let service = GenerationService::new(
        config.defaults.clone(),
        Arc::new(model),
        Arc::new(S3ImageStore::new()),
    );

    server::run(&config, service).await?;
    Ok(())
}
