use crate::models::Metadata;

const NEUTRAL: f64 = 0.5;

/// Re-weight a rule score by the upstream service signals carried in the
/// `mcp` metadata object. Without that object the score is returned as is.
pub fn apply_mcp_weighting(base_score: f64, metadata: &Metadata) -> f64 {
    let Some(mcp) = metadata.nested("mcp") else {
        return base_score;
    };

    let signal = |key: &str| mcp.get_unit(key).unwrap_or(NEUTRAL);

    let mut score = base_score;
    score *= 0.7 + 0.3 * signal("nlp_confidence");
    score *= 0.8 + 0.2 * signal("conversion_quality");
    if signal("sentiment_score") < 0.3 {
        score *= 1.2;
    }
    score *= 0.9 + 0.1 * signal("origin_service_trust");

    tracing::debug!(base_score, weighted_score = score, "Applied cross-service weighting");
    score.clamp(0.0, 1.0)
}
