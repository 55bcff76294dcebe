//! Per-model request parameter rules.

use once_cell::sync::Lazy;
use regex::Regex;

/// Default sampling temperature when none is configured.
pub const DEFAULT_TEMPERATURE: f32 = 1.0;

/// Models whose endpoint rejects any temperature other than a fixed value.
static FIXED_TEMPERATURE_RULES: Lazy<Vec<(Regex, f32)>> = Lazy::new(|| {
    [(r"(?i)^kimi-k2\.5($|[-_])", 1.0)]
        .into_iter()
        .filter_map(|(pattern, temp)| Regex::new(pattern).ok().map(|re| (re, temp)))
        .collect()
});

/// Resolve the temperature to send for `model`.
///
/// Fixed-temperature models always win. Otherwise the requested value is
/// used when finite, falling back to [`DEFAULT_TEMPERATURE`].
pub fn resolve_temperature(model: Option<&str>, requested: Option<f32>) -> f32 {
    if let Some(model) = model.map(str::trim) {
        if let Some((_, fixed)) = FIXED_TEMPERATURE_RULES
            .iter()
            .find(|(re, _)| re.is_match(model))
        {
            return *fixed;
        }
    }

    requested
        .filter(|t| t.is_finite())
        .unwrap_or(DEFAULT_TEMPERATURE)
}
