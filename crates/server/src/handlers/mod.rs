mod auth;
mod candidates;
mod companies;
mod docs;
mod matches;
mod payments;
mod plans;
mod subscriptions;
mod users;
mod vacancies;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{
  get,
  post
};
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

/// Multipart framing on top of the CV
/// size cap.
const CV_BODY_LIMIT: usize =
  candidates::MAX_CV_BYTES + 1024 * 1024;

async fn health() -> &'static str {
  "ok"
}

pub fn router(
  state: AppState
) -> Router {
  Router::new()
    .route("/health", get(health))
    .route("/openapi.json", get(docs::openapi))
    .route("/v1/users", post(users::create_user))
    .route("/v1/users/me", get(users::me).delete(users::delete_user))
    .route("/v1/users/password", post(users::change_password))
    .route("/v1/auth/login", post(auth::login))
    .route("/v1/auth/logout", post(auth::logout))
    .route(
        "/v1/candidates/me",
        post(candidates::create_candidate)
            .get(candidates::my_candidate)
            .patch(candidates::update_candidate)
            .delete(candidates::delete_candidate),
    )
    .route(
        "/v1/candidates/me/cv",
        post(candidates::upload_cv).layer(DefaultBodyLimit::max(CV_BODY_LIMIT)),
    )
    .route("/v1/candidates/me/matches", get(matches::list_my_matches))
    .route("/v1/candidates/me/matches/refresh", post(matches::refresh_my_matches))
    .route("/v1/candidates/:candidate_id", get(candidates::candidate_detail))
    .route(
        "/v1/companies/me",
        post(companies::create_company)
            .get(companies::my_company)
            .patch(companies::update_company),
    )
    .route("/v1/companies/me/vacancies", get(vacancies::my_vacancies))
    .route("/v1/companies/:company_id", get(companies::company_detail))
    .route("/v1/vacancies", get(vacancies::list_vacancies).post(vacancies::create_vacancy))
    .route(
        "/v1/vacancies/:vacancy_id",
        get(vacancies::vacancy_detail)
            .patch(vacancies::update_vacancy)
            .delete(vacancies::delete_vacancy),
    )
    .route("/v1/vacancies/:vacancy_id/close", post(vacancies::close_vacancy))
    .route("/v1/vacancies/:vacancy_id/matches", get(matches::list_vacancy_matches))
    .route("/v1/matching/health", get(matches::matching_health))
    .route("/v1/plans", get(plans::list_plans))
    .route("/v1/subscriptions/me", get(subscriptions::my_subscription))
    .route("/v1/subscriptions/annual", post(subscriptions::create_annual_subscription))
    .route("/v1/payments/me", get(payments::list_my_payments))
    .route("/v1/payments/:payment_id/refresh", post(payments::refresh_payment))
    .route("/v1/payments/webhooks/mercadopago", post(payments::mercadopago_webhook))
    .route("/v1/payments/webhooks/clip", post(payments::clip_webhook))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
