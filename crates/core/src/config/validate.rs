use super::{types::Config, ConfigError};
use crate::pacing::PacingSpan;

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Site URLs and claim keyword lists are not empty
/// - Pacing bounds are ordered and every span shrinks toward its floor
/// - Default result columns are non-zero and distinct
/// - Race concurrency is at least 1
/// - Webhook URL, when set, is not blank
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    // Site validation
    if config.site.login_url.trim().is_empty() {
        return Err(invalid("site.login_url cannot be empty"));
    }
    if config.site.search_url.trim().is_empty() {
        return Err(invalid("site.search_url cannot be empty"));
    }
    if config.site.reserve_keywords.iter().all(|k| k.trim().is_empty()) {
        return Err(invalid("site.reserve_keywords needs at least one keyword"));
    }
    if config.site.waitlist_keywords.iter().all(|k| k.trim().is_empty()) {
        return Err(invalid("site.waitlist_keywords needs at least one keyword"));
    }
    if config.site.carrier_column == 0 {
        return Err(invalid("site.carrier_column is 1-based and cannot be 0"));
    }

    // Pacing validation
    let pacing = &config.pacing;
    if pacing.min_level == 0 || pacing.min_level > pacing.max_level {
        return Err(invalid(format!(
            "pacing levels must satisfy 1 <= min_level <= max_level (got {}..={})",
            pacing.min_level, pacing.max_level
        )));
    }
    if !(pacing.min_level..=pacing.max_level).contains(&pacing.default_level) {
        return Err(invalid(format!(
            "pacing.default_level {} is outside {}..={}",
            pacing.default_level, pacing.min_level, pacing.max_level
        )));
    }
    let spans: [(&str, PacingSpan); 6] = [
        ("implicit_wait", pacing.implicit_wait),
        ("no_rows", pacing.no_rows),
        ("rows_no_claim", pacing.rows_no_claim),
        ("claim_attempted", pacing.claim_attempted),
        ("jitter", pacing.jitter),
        ("auth_retry", pacing.auth_retry),
    ];
    for (name, span) in spans {
        if span.floor_ms > span.baseline_ms {
            return Err(invalid(format!(
                "pacing.{} floor_ms ({}) exceeds baseline_ms ({})",
                name, span.floor_ms, span.baseline_ms
            )));
        }
    }

    // Layout validation
    let columns = &config.layout.default_columns;
    if columns.standard == 0 || columns.premium == 0 || columns.waitlist == 0 {
        return Err(invalid("layout.default_columns are 1-based and cannot be 0"));
    }
    if columns.standard == columns.premium
        || columns.standard == columns.waitlist
        || columns.premium == columns.waitlist
    {
        return Err(invalid(format!(
            "layout.default_columns must be distinct (standard={}, premium={}, waitlist={})",
            columns.standard, columns.premium, columns.waitlist
        )));
    }

    // Race validation
    if config.race.max_concurrency == 0 {
        return Err(invalid("race.max_concurrency must be at least 1"));
    }

    // Notify validation
    if let Some(url) = &config.notify.webhook_url {
        if url.trim().is_empty() {
            return Err(invalid("notify.webhook_url cannot be blank; omit it instead"));
        }
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}
