// src/services/tiers.rs
//! Tier to model/parameter profile table

use serde::Serialize;
use std::fmt;

use super::llm_proxy::ProviderKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Basic,
    Standard,
    Premium,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Basic, Tier::Standard, Tier::Premium];

    /// The tier used when a caller sends no tier or one we do not know.
    /// Older clients send tier names that no longer exist, so this must
    /// stay a fallback and never become a rejection.
    pub const DEFAULT: Tier = Tier::Basic;

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Basic => "basic",
            Tier::Standard => "standard",
            Tier::Premium => "premium",
        }
    }

    /// Resolve a caller-supplied tier name. Returns the tier and whether the
    /// default was substituted.
    pub fn resolve(requested: Option<&str>) -> (Tier, bool) {
        let parsed = requested.map(str::trim).and_then(|name| {
            Tier::ALL
                .into_iter()
                .find(|tier| tier.as_str().eq_ignore_ascii_case(name))
        });
        match parsed {
            Some(tier) => (tier, false),
            None => (Tier::DEFAULT, true),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TierProfile {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl TierProfile {
    fn new(model: &str, max_tokens: u32, temperature: f32) -> Self {
        Self {
            model: model.to_string(),
            max_tokens,
            temperature,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TierTable {
    basic: TierProfile,
    standard: TierProfile,
    premium: TierProfile,
}

impl TierTable {
    pub fn for_provider(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Anthropic => Self {
                basic: TierProfile::new("claude-3-5-haiku-latest", 1024, 0.7),
                standard: TierProfile::new("claude-3-5-sonnet-latest", 2048, 0.7),
                premium: TierProfile::new("claude-3-opus-latest", 4096, 0.5),
            },
            ProviderKind::OpenAi => Self {
                basic: TierProfile::new("gpt-4o-mini", 1024, 0.7),
                standard: TierProfile::new("gpt-4o", 2048, 0.7),
                premium: TierProfile::new("gpt-4.1", 4096, 0.5),
            },
        }
    }

    pub fn profile(&self, tier: Tier) -> &TierProfile {
        match tier {
            Tier::Basic => &self.basic,
            Tier::Standard => &self.standard,
            Tier::Premium => &self.premium,
        }
    }

    pub fn override_model(&mut self, tier: Tier, model: String) {
        match tier {
            Tier::Basic => self.basic.model = model,
            Tier::Standard => self.standard.model = model,
            Tier::Premium => self.premium.model = model,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_tiers_case_insensitively() {
        assert_eq!(Tier::resolve(Some("premium")), (Tier::Premium, false));
        assert_eq!(Tier::resolve(Some(" Standard ")), (Tier::Standard, false));
    }

    #[test]
    fn test_unknown_or_missing_tier_falls_back_to_default() {
        assert_eq!(Tier::resolve(Some("gold")), (Tier::Basic, true));
        assert_eq!(Tier::resolve(Some("")), (Tier::Basic, true));
        assert_eq!(Tier::resolve(None), (Tier::Basic, true));
    }

    #[test]
    fn test_default_tier_is_cheapest() {
        let table = TierTable::for_provider(ProviderKind::Anthropic);
        let default_budget = table.profile(Tier::DEFAULT).max_tokens;
        for tier in Tier::ALL {
            assert!(table.profile(tier).max_tokens >= default_budget);
        }
    }

    #[test]
    fn test_override_model_keeps_limits() {
        let mut table = TierTable::for_provider(ProviderKind::OpenAi);
        table.override_model(Tier::Basic, "local-model".to_string());
        assert_eq!(table.profile(Tier::Basic).model, "local-model");
        assert_eq!(table.profile(Tier::Basic).max_tokens, 1024);
    }
}
