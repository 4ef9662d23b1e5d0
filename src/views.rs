use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse};
use kube::api::{Api, ListParams};
use kube::Client;

use crate::ModelMonitor;

pub struct AppState {
    pub client: Client,
    pub namespace: String,
}

// Simple health check endpoint
pub async fn health(_req: HttpRequest) -> HttpResponse {
    HttpResponse::new(StatusCode::OK)
}

// List current modelmonitors in the watched namespace
pub async fn modelmonitors(
    data: web::Data<AppState>,
    _req: HttpRequest,
) -> actix_web::Result<web::Json<Vec<ModelMonitor>>> {
    let monitors: Api<ModelMonitor> = Api::namespaced(data.client.clone(), &data.namespace);
    let list = monitors
        .list(&ListParams::default())
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;
    Ok(web::Json(list.items))
}
