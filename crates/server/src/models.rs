use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordChangeRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub token_type: String,
    pub expires_in: u64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct CandidateRow {
    pub id: i64,
    pub user_id: i64,
    pub full_name: String,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub headline: Option<String>,
    pub summary: Option<String>,
    pub skills: String,
    pub experience_years: Option<i64>,
    pub cv_filename: Option<String>,
    pub cv_uploaded_at_ms: Option<i64>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Debug, Serialize)]
pub struct CandidateProfile {
    pub id: i64,
    pub user_id: i64,
    pub full_name: String,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub headline: Option<String>,
    pub summary: Option<String>,
    pub skills: Vec<String>,
    pub experience_years: Option<i64>,
    pub cv_filename: Option<String>,
    pub cv_uploaded_at_ms: Option<i64>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl From<CandidateRow> for CandidateProfile {
    fn from(row: CandidateRow) -> Self {
        let skills = serde_json::from_str(&row.skills).unwrap_or_default();
        CandidateProfile {
            id: row.id,
            user_id: row.user_id,
            full_name: row.full_name,
            phone: row.phone,
            location: row.location,
            headline: row.headline,
            summary: row.summary,
            skills,
            experience_years: row.experience_years,
            cv_filename: row.cv_filename,
            cv_uploaded_at_ms: row.cv_uploaded_at_ms,
            created_at_ms: row.created_at_ms,
            updated_at_ms: row.updated_at_ms,
        }
    }
}

/// Candidate create/patch body. On create `full_name` is required; on patch
/// absent fields are kept and empty strings clear optional ones.
#[derive(Debug, Default, Deserialize)]
pub struct CandidatePayload {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub headline: Option<String>,
    pub summary: Option<String>,
    pub skills: Option<Vec<String>>,
    pub experience_years: Option<i64>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct Company {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub industry: Option<String>,
    pub website: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompanyPayload {
    pub name: Option<String>,
    pub industry: Option<String>,
    pub website: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Vacancy {
    pub id: i64,
    pub company_id: i64,
    pub company_name: String,
    pub title: String,
    pub description: String,
    pub location: Option<String>,
    pub modality: String,
    pub employment_type: Option<String>,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub requirements: Option<String>,
    pub status: String,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct VacancyPayload {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub modality: Option<String>,
    pub employment_type: Option<String>,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub requirements: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VacancyListQuery {
    pub q: Option<String>,
    pub location: Option<String>,
    pub modality: Option<String>,
    pub company_id: Option<i64>,
    pub status: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct MatchView {
    pub vacancy_id: i64,
    pub title: String,
    pub company_name: String,
    pub vacancy_status: String,
    pub percentage: f64,
    pub updated_at_ms: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct VacancyMatchView {
    pub candidate_id: i64,
    pub full_name: String,
    pub percentage: f64,
    pub updated_at_ms: i64,
}

#[derive(Debug, Serialize)]
pub struct MatchingHealthResponse {
    pub available: bool,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Plan {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub price_cents: i64,
    pub currency: String,
    pub duration_days: i64,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SubscriptionRow {
    pub id: i64,
    pub user_id: i64,
    pub plan_id: i64,
    pub status: String,
    pub starts_at_ms: i64,
    pub ends_at_ms: i64,
    pub payment_id: Option<i64>,
    pub created_at_ms: i64,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionStatusResponse {
    pub active: bool,
    pub subscription: Option<SubscriptionRow>,
    pub ends_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnnualSubscriptionRequest {
    pub provider: Option<String>,
    pub card_token: String,
    pub payment_method_id: Option<String>,
    pub installments: Option<u32>,
    pub payer_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PaymentRow {
    pub id: i64,
    pub user_id: i64,
    pub plan_id: i64,
    pub provider: String,
    pub provider_payment_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub status_detail: Option<String>,
    pub subscription_id: Option<i64>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub ok: bool,
    pub status: String,
    pub message: String,
    pub subscription: Option<SubscriptionRow>,
    pub payment: Option<PaymentRow>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookQuery {
    pub token: Option<String>,
    pub topic: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub id: Option<String>,
    #[serde(rename = "data.id")]
    pub data_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub reconciled: bool,
}
