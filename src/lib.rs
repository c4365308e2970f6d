use actix_cors::Cors;
use actix_web::middleware::Compress;
use actix_web::{http::header, web, App, HttpServer};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

pub mod config;
pub mod invoice;
pub mod metrics;
pub mod preview;
pub mod render;
pub mod state;

pub use crate::config::RenderConfig;
pub use crate::render::{RenderPipeline, RenderResult};
pub use crate::state::AppState;

const JANITOR_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_type: &str, message: &str) -> Self {
        Self {
            error: error_type.to_string(),
            message: message.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn not_found(message: &str) -> Self {
        Self::new("NotFound", message)
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new("BadRequest", message)
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::invoice::handlers::render_invoice,
        crate::preview::handlers::show_preview,
        crate::preview::handlers::close_preview
    ),
    components(
        schemas(
            invoice::model::RenderRequest,
            invoice::model::InvoicePayload,
            invoice::model::LineItem,
            invoice::model::RenderMode,
            render::RenderResult,
            ErrorResponse,
        )
    ),
    tags(
        (name = "Invoice", description = "Invoice rendering endpoints."),
        (name = "Preview", description = "PRINT-mode preview surfaces.")
    )
)]
pub struct ApiDoc;

/// Every route the server exposes, minus middleware.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .configure(invoice::handlers::config)
            .configure(preview::handlers::config),
    )
    .service(web::resource("/previews/{id}").route(web::get().to(preview::handlers::show_preview)))
    .service(web::resource("/metrics").route(web::get().to(metrics::metrics_handler)))
    .service(SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-doc/openapi.json", ApiDoc::openapi()));
}

fn cors(public_base_url: &str) -> Cors {
    let mut cors = Cors::default()
        .allowed_origin("http://localhost:5173")
        .allowed_origin("http://localhost:3000")
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
        .max_age(3600);
    if let Ok(url) = url::Url::parse(public_base_url) {
        if url.origin().is_tuple() {
            cors = cors.allowed_origin(&url.origin().ascii_serialization());
        }
    }
    cors
}

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = RenderConfig::from_env().context("invalid configuration")?;
    std::fs::create_dir_all(&config.scratch_dir).with_context(|| {
        format!("failed to create scratch dir {}", config.scratch_dir.display())
    })?;
    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("failed to create output dir {}", config.output_dir.display()))?;

    log::info!(
        "Rendering {} with {} (ready timeout {:?}, render timeout {:?})",
        config.template,
        config.typst_bin.display(),
        config.timeouts.ready,
        config.timeouts.rendered
    );

    let state = AppState::from_config(&config);
    let _janitor = state.previews.spawn_janitor(JANITOR_INTERVAL);
    let app_state = web::Data::new(state);

    log::info!(
        "Starting server at http://{}:{}",
        config.bind_host,
        config.bind_port
    );

    let public_base_url = config.public_base_url.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(Compress::default())
            .wrap(cors(&public_base_url))
            .app_data(app_state.clone())
            .configure(routes)
    })
    .keep_alive(actix_web::http::KeepAlive::Os)
    .bind((config.bind_host.as_str(), config.bind_port))?
    .run()
    .await?;

    Ok(())
}
