use actix_web::{HttpResponse, Result, web};
use validator::Validate;

use campground_scan::{
    AdhocOutcome, AdhocScrapeBody, AdhocScraper, AdhocStatus, AdhocStatusResponse, ScanError,
};

/// Reports whether a refresh of the campground would be accepted right now,
/// along with the most recent request.
pub async fn get_adhoc_status(
    scraper: web::Data<AdhocScraper>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ScanError> {
    let (provider, campground_id) = path.into_inner();

    let can_request = scraper.can_request(&provider, &campground_id).await?;
    let latest = scraper.latest(&provider, &campground_id).await?;

    Ok(HttpResponse::Ok().json(AdhocStatusResponse {
        can_request,
        latest,
    }))
}

/// Refreshes one campground on behalf of a chat user.
/// Returns 429 with the blocking request when one was accepted recently.
pub async fn request_adhoc_scrape(
    scraper: web::Data<AdhocScraper>,
    path: web::Path<(String, String)>,
    body: web::Json<AdhocScrapeBody>,
) -> Result<HttpResponse, ScanError> {
    body.validate()
        .map_err(|e| ScanError::Validation(format!("Validation error: {}", e)))?;

    let (provider, campground_id) = path.into_inner();

    match scraper
        .request(&provider, &campground_id, &body.requester_id)
        .await?
    {
        AdhocOutcome::Processed(request) => {
            log::info!(
                "Adhoc scrape {} for {}/{} finished as {}",
                request.id,
                provider,
                campground_id,
                request.status.as_str()
            );
            let mut response = match request.status {
                AdhocStatus::Pending => HttpResponse::Accepted(),
                _ => HttpResponse::Ok(),
            };
            Ok(response.json(request))
        }
        AdhocOutcome::Debounced { latest } => {
            log::debug!(
                "Adhoc scrape for {}/{} debounced (requester {})",
                provider,
                campground_id,
                body.requester_id
            );
            Ok(HttpResponse::TooManyRequests().json(serde_json::json!({
                "error": "debounced",
                "message": "A refresh for this campground was requested recently. Please try again later.",
                "latest": latest
            })))
        }
    }
}
