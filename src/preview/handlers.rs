use actix_files::NamedFile;
use actix_web::http::header::{ContentDisposition, DispositionType};
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use log::{error, info};
use uuid::Uuid;

use crate::state::AppState;
use crate::ErrorResponse;

#[utoipa::path(
    get,
    path = "/previews/{id}",
    tag = "Preview",
    params(
        ("id" = Uuid, Path, description = "Preview ID")
    ),
    responses(
        (status = 200, description = "Captured PDF, displayed inline", content_type = "application/pdf"),
        (status = 404, description = "Preview closed or unknown", body = ErrorResponse)
    )
)]
pub async fn show_preview(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> HttpResponse {
    let id = path.into_inner();
    let Some(artifact) = state.previews.artifact(&id).await else {
        return HttpResponse::NotFound().json(ErrorResponse::not_found("Preview not found"));
    };

    match NamedFile::open_async(&artifact).await {
        Ok(file) => file
            .set_content_disposition(ContentDisposition {
                disposition: DispositionType::Inline,
                parameters: vec![],
            })
            .into_response(&req),
        Err(e) => {
            error!("Failed to open preview artifact {}: {}", artifact.display(), e);
            HttpResponse::NotFound().json(ErrorResponse::not_found("Preview artifact is gone"))
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/previews/{id}/close",
    tag = "Preview",
    params(
        ("id" = Uuid, Path, description = "Preview ID")
    ),
    responses(
        (status = 204, description = "Preview closed, temporary file scheduled for deletion"),
        (status = 404, description = "Preview closed or unknown", body = ErrorResponse)
    )
)]
pub async fn close_preview(state: web::Data<AppState>, path: web::Path<Uuid>) -> impl Responder {
    let id = path.into_inner();
    if state.previews.close(&id).await {
        info!("Preview {} closed", id);
        HttpResponse::NoContent().finish()
    } else {
        HttpResponse::NotFound().json(ErrorResponse::not_found("Preview not found"))
    }
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/previews/{id}/close").route(web::post().to(close_preview)));
}
