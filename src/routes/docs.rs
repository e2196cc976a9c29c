use crate::openapi::{openapi_document, OPENAPI_JSON_PATH};
use axum::response::Redirect;
use utoipa_swagger_ui::SwaggerUi;

pub const DOCS_PATH: &str = "/docs";

pub async fn redirect_to_docs() -> Redirect {
    tracing::debug!("Redirecting to {}.", DOCS_PATH);
    Redirect::temporary(DOCS_PATH)
}

/// Interactive Swagger UI at `/docs`, backed by the document at `/openapi.json`.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new(DOCS_PATH).url(OPENAPI_JSON_PATH, openapi_document())
}
