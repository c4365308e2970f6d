use actix_web::{web, HttpResponse, Responder};

use crate::invoice::model::RenderRequest;
use crate::render::RenderResult;
use crate::state::AppState;
use crate::ErrorResponse;

/// HTTP status for a finished render. Cancellation is a normal outcome.
pub fn status_for(result: &RenderResult) -> actix_web::http::StatusCode {
    use actix_web::http::StatusCode;
    match result.error.as_deref() {
        None => StatusCode::OK,
        Some("invalid_request") => StatusCode::BAD_REQUEST,
        Some("timeout") => StatusCode::GATEWAY_TIMEOUT,
        Some(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Invoice",
    post,
    path = "/invoices/render",
    request_body = RenderRequest,
    responses(
        (status = 200, description = "Document saved, previewing, or save cancelled", body = RenderResult),
        (status = 400, description = "Nothing renderable in the payload", body = RenderResult),
        (status = 504, description = "Rendering surface did not answer in time", body = RenderResult),
        (status = 500, description = "Rendering or persistence failed", body = RenderResult)
    )
)]
pub async fn render_invoice(
    state: web::Data<AppState>,
    body: web::Json<RenderRequest>,
) -> impl Responder {
    let result = state.pipeline.render_document(body.into_inner()).await;
    HttpResponse::build(status_for(&result)).json(result)
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        let body = ErrorResponse::bad_request(&err.to_string());
        actix_web::error::InternalError::from_response(err, HttpResponse::BadRequest().json(body))
            .into()
    }))
    .service(web::resource("/invoices/render").route(web::post().to(render_invoice)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    fn result(error: Option<&str>) -> RenderResult {
        RenderResult {
            succeeded: error.is_none(),
            token: "t".to_string(),
            path: None,
            preview_url: None,
            error: error.map(str::to_string),
            message: None,
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&result(None)), StatusCode::OK);
        assert_eq!(status_for(&result(Some("invalid_request"))), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&result(Some("timeout"))), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(status_for(&result(Some("surface"))), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status_for(&result(Some("internal"))), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
