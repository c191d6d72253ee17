//! Deterministic SageMaker resource names.
//!
//! SageMaker names must match `^[a-zA-Z0-9](-*[a-zA-Z0-9]){0,62}`, so every
//! derived name is sanitized to that alphabet and clipped to 63 characters.

use crate::contract::ValidationError;

pub const MAX_RESOURCE_NAME_LEN: usize = 63;

/// Name shared by the model, endpoint configuration and endpoint of one
/// descriptor: `"{model_name}-{version}"` with dots and other punctuation
/// replaced by hyphens.
///
/// Only the model segment is clipped, so two versions of one model never
/// collapse onto the same name.
pub fn resource_name(model_name: &str, version: &str) -> Result<String, ValidationError> {
    let model = sanitize_segment(model_name);
    if model.is_empty() {
        return Err(ValidationError::new(
            "model_name must contain at least one letter or digit",
        ));
    }

    let version = sanitize_segment(version);
    if version.is_empty() {
        return Err(ValidationError::new(
            "version must contain at least one letter or digit",
        ));
    }
    // One model character plus the separator.
    if version.len() + 2 > MAX_RESOURCE_NAME_LEN {
        return Err(ValidationError::new(format!(
            "version is too long for a SageMaker name (max {} characters)",
            MAX_RESOURCE_NAME_LEN - 2
        )));
    }

    let model = clip(&model, MAX_RESOURCE_NAME_LEN - version.len() - 1);
    Ok(format!("{model}-{version}"))
}

/// Variant names are 1-based: the first variant of `foo-1-0` is
/// `foo-1-0-variant-1`.
pub fn variant_name(resource_name: &str, index: usize) -> String {
    let suffix = format!("-variant-{}", index + 1);
    let base = clip(
        resource_name,
        MAX_RESOURCE_NAME_LEN.saturating_sub(suffix.len()),
    );
    format!("{base}{suffix}")
}

fn sanitize_segment(raw: &str) -> String {
    let sanitized: String = raw
        .trim()
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '-' })
        .collect();
    sanitized.trim_matches('-').to_string()
}

fn clip(name: &str, max_len: usize) -> String {
    let clipped: String = name.chars().take(max_len).collect();
    clipped.trim_matches('-').to_string()
}
