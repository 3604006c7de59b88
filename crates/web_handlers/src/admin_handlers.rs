use actix_web::{HttpResponse, Result, web};

use campground_scan::{ScanContext, ScanError, sync_campgrounds, sync_campsites};

/// Liveness check
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

/// Refreshes the campground catalog of one provider.
/// Returns the synced and failed entry counts.
pub async fn sync_provider_campgrounds(
    ctx: web::Data<ScanContext>,
    path: web::Path<String>,
) -> Result<HttpResponse, ScanError> {
    let provider = path.into_inner();
    let report = sync_campgrounds(ctx.get_ref(), &provider).await?;

    log::info!(
        "Manual campground sync for {}: {} synced, {} failed",
        provider,
        report.synced,
        report.failed
    );
    Ok(HttpResponse::Ok().json(report))
}

/// Refreshes site metadata for every known campground of one provider
pub async fn sync_provider_campsites(
    ctx: web::Data<ScanContext>,
    path: web::Path<String>,
) -> Result<HttpResponse, ScanError> {
    let provider = path.into_inner();
    let report = sync_campsites(ctx.get_ref(), &provider).await?;

    log::info!(
        "Manual campsite sync for {}: {} sites synced, {} campgrounds failed",
        provider,
        report.synced,
        report.failed
    );
    Ok(HttpResponse::Ok().json(report))
}
