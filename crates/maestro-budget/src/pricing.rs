//! Model pricing — static per-million-token rate table.
//!
//! Rates are USD per million tokens. Unknown models price to zero so cost
//! display degrades gracefully for local or self-hosted models.

/// Pricing tier per million tokens.
struct PricingTier {
    input_per_million: f64,
    output_per_million: f64,
}

// ─── Anthropic ───────────────────────────────────────────────────────────────

const OPUS: PricingTier = PricingTier {
    input_per_million: 5.0,
    output_per_million: 25.0,
};

const SONNET: PricingTier = PricingTier {
    input_per_million: 3.0,
    output_per_million: 15.0,
};

const HAIKU: PricingTier = PricingTier {
    input_per_million: 1.0,
    output_per_million: 5.0,
};

// ─── Google ──────────────────────────────────────────────────────────────────

const GEMINI_PRO: PricingTier = PricingTier {
    input_per_million: 1.25,
    output_per_million: 5.0,
};

const GEMINI_FLASH: PricingTier = PricingTier {
    input_per_million: 0.075,
    output_per_million: 0.3,
};

// ─── OpenAI ──────────────────────────────────────────────────────────────────

const GPT_LARGE: PricingTier = PricingTier {
    input_per_million: 2.5,
    output_per_million: 10.0,
};

const GPT_MINI: PricingTier = PricingTier {
    input_per_million: 0.15,
    output_per_million: 0.6,
};

/// Look up the pricing tier for a model.
///
/// Pattern-matches on model family substrings. Returns `None` for unknown
/// models (no implicit fallback pricing).
fn get_pricing_tier(model: &str) -> Option<&'static PricingTier> {
    let lower = model.to_lowercase();

    if lower.contains("opus") {
        return Some(&OPUS);
    }
    if lower.contains("sonnet") {
        return Some(&SONNET);
    }
    if lower.contains("haiku") {
        return Some(&HAIKU);
    }
    if lower.contains("gemini") {
        if lower.contains("pro") {
            return Some(&GEMINI_PRO);
        }
        return Some(&GEMINI_FLASH);
    }
    if lower.contains("gpt") {
        if lower.contains("mini") || lower.contains("nano") {
            return Some(&GPT_MINI);
        }
        return Some(&GPT_LARGE);
    }

    None
}

/// Estimate the cost of one request in USD.
///
/// Fails soft: an unknown model estimates to `0.0`.
#[must_use]
pub fn estimate_cost(input_tokens: u64, output_tokens: u64, model: &str) -> f64 {
    let Some(pricing) = get_pricing_tier(model) else {
        return 0.0;
    };

    #[allow(clippy::cast_precision_loss)]
    let input = input_tokens as f64;
    #[allow(clippy::cast_precision_loss)]
    let output = output_tokens as f64;

    (input / 1_000_000.0) * pricing.input_per_million
        + (output / 1_000_000.0) * pricing.output_per_million
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn sonnet_rates() {
        let cost = estimate_cost(1_000_000, 1_000_000, "claude-sonnet-4-5");
        // 1M input * $3/M + 1M output * $15/M = $18
        assert!(approx_eq(cost, 18.0));
    }

    #[test]
    fn opus_rates() {
        let cost = estimate_cost(100_000, 10_000, "claude-opus-4-6");
        // (100k/1M)*5 + (10k/1M)*25 = 0.5 + 0.25
        assert!(approx_eq(cost, 0.75));
    }

    #[test]
    fn haiku_cheap() {
        let cost = estimate_cost(10_000, 5_000, "claude-haiku-4-5");
        // (10k/1M)*1 + (5k/1M)*5 = 0.01 + 0.025
        assert!(approx_eq(cost, 0.035));
    }

    #[test]
    fn gemini_pro_vs_flash() {
        assert!(
            estimate_cost(1_000_000, 0, "gemini-2.5-pro")
                > estimate_cost(1_000_000, 0, "gemini-2.5-flash")
        );
    }

    #[test]
    fn gpt_mini_discount() {
        let cost = estimate_cost(1_000_000, 1_000_000, "gpt-4o-mini");
        // (1M/1M)*0.15 + (1M/1M)*0.6
        assert!(approx_eq(cost, 0.75));
    }

    #[test]
    fn family_pattern_matches_dated_ids() {
        assert!(estimate_cost(1000, 1000, "claude-sonnet-4-5-20250929") > 0.0);
        assert!(estimate_cost(1000, 1000, "gemini-3-pro-preview") > 0.0);
    }

    #[test]
    fn unknown_model_is_free() {
        assert!(approx_eq(estimate_cost(1_000_000, 1_000_000, "llama-local"), 0.0));
        assert!(approx_eq(estimate_cost(1_000_000, 1_000_000, ""), 0.0));
    }

    #[test]
    fn zero_tokens_zero_cost() {
        assert!(approx_eq(estimate_cost(0, 0, "claude-opus-4-6"), 0.0));
    }
}
