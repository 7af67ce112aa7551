use actix_web::{
    error::{InternalError, JsonPayloadError},
    http::StatusCode,
    middleware, web, App, HttpRequest, HttpResponse, HttpServer, ResponseError,
};
use tokio::sync::Semaphore;

use crate::{
    config::ServerConfig,
    error::GenerationError,
    models::{ErrorResponse, GenerationRequest, HealthResponse},
    orchestrator::{GenerationService, PipelineFailure, Stage},
};

pub struct AppState {
    service: GenerationService,
    /// Bounds how many generations run at once in this process.
    generation_gate: Semaphore,
}

impl AppState {
    pub fn new(service: GenerationService, max_concurrent_generations: usize) -> Self {
        Self {
            service,
            generation_gate: Semaphore::new(max_concurrent_generations.max(1)),
        }
    }
}

impl ResponseError for PipelineFailure {
    fn status_code(&self) -> StatusCode {
        if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .route("/health", web::get().to(health))
        .route("/generate", web::post().to(generate));
}

fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = HttpResponse::BadRequest().json(ErrorResponse {
        error: format!("Invalid request body: {}", err),
    });
    InternalError::from_response(err, response).into()
}

async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        model: state.service.model_id().to_string(),
    })
}

async fn generate(
    state: web::Data<AppState>,
    request: web::Json<GenerationRequest>,
) -> Result<HttpResponse, PipelineFailure> {
    // Client errors never wait behind a running generation.
    let job = state.service.prepare(&request)?;

    let _permit = state.generation_gate.acquire().await.map_err(|_| PipelineFailure {
        stage: Stage::Generation,
        error: GenerationError::InferenceError("generation gate closed".into()),
    })?;

    let response = state.service.execute(job).await?;
    Ok(HttpResponse::Ok().json(response))
}

pub async fn run(config: &ServerConfig, service: GenerationService) -> std::io::Result<()> {
    let state = web::Data::new(AppState::new(service, config.max_concurrent_generations));

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .configure(configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
