//! Field normalisation shared by the profile and vacancy handlers.
use axum::http::StatusCode;

use crate::errors::ServerError;

pub fn bad_request(message: impl Into<String>) -> ServerError {
    ServerError::new(StatusCode::BAD_REQUEST, message)
}

/// Required text: trimmed, non-empty, at most `max` characters.
pub fn required_text(field: &str, value: Option<&str>, max: usize) -> Result<String, ServerError> {
    let value = value.map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Err(bad_request(format!("{field} required")));
    }
    if value.chars().count() > max {
        return Err(bad_request(format!("{field} exceeds {max} characters")));
    }
    Ok(value.to_string())
}

/// Optional text: blank collapses to `None`.
pub fn optional_text(field: &str, value: Option<&str>, max: usize) -> Result<Option<String>, ServerError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) if v.chars().count() > max => {
            Err(bad_request(format!("{field} exceeds {max} characters")))
        }
        Some(v) => Ok(Some(v.to_string())),
    }
}

/// Patch semantics for optional text: absent keeps `current`, blank clears.
pub fn patch_text(
    field: &str,
    patch: Option<&str>,
    current: Option<String>,
    max: usize,
) -> Result<Option<String>, ServerError> {
    match patch {
        None => Ok(current),
        Some(v) => optional_text(field, Some(v), max),
    }
}

/// Trimmed, non-empty, case-insensitively de-duplicated, original order kept.
pub fn normalize_skills(skills: &[String]) -> Result<Vec<String>, ServerError> {
    let mut out: Vec<String> = Vec::new();
    for skill in skills {
        let skill = skill.trim();
        if skill.is_empty() {
            continue;
        }
        if skill.chars().count() > 80 {
            return Err(bad_request("skill exceeds 80 characters"));
        }
        if !out.iter().any(|s| s.eq_ignore_ascii_case(skill)) {
            out.push(skill.to_string());
        }
    }
    if out.len() > 50 {
        return Err(bad_request("at most 50 skills allowed"));
    }
    Ok(out)
}

pub fn non_negative(field: &str, value: Option<i64>) -> Result<Option<i64>, ServerError> {
    match value {
        Some(v) if v < 0 => Err(bad_request(format!("{field} must be >= 0"))),
        other => Ok(other),
    }
}

pub fn website(value: Option<String>) -> Result<Option<String>, ServerError> {
    match value {
        Some(url) if !(url.starts_with("http://") || url.starts_with("https://")) => {
            Err(bad_request("website must start with http:// or https://"))
        }
        other => Ok(other),
    }
}

pub fn salary_range(min: Option<i64>, max: Option<i64>) -> Result<(), ServerError> {
    non_negative("salary_min", min)?;
    non_negative("salary_max", max)?;
    if let (Some(lo), Some(hi)) = (min, max) {
        if lo > hi {
            return Err(bad_request("salary_min must not exceed salary_max"));
        }
    }
    Ok(())
}

pub const MODALITIES: &[&str] = &["onsite", "remote", "hybrid"];

pub fn modality(value: Option<&str>) -> Result<String, ServerError> {
    let value = value.map(|v| v.trim().to_ascii_lowercase()).unwrap_or_default();
    if value.is_empty() {
        return Ok("onsite".to_string());
    }
    if !MODALITIES.contains(&value.as_str()) {
        return Err(bad_request(format!("invalid modality: {value}")));
    }
    Ok(value)
}
