use crate::MembershipError;
use serde::{Deserialize, Serialize};

/// The fixed set of membership domains.
///
/// A user may hold at most one active subscription per category. The set is
/// closed on purpose: an unknown category is a deserialization error, not a
/// silent empty group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanCategory {
    Fitness,
    Streaming,
    Elearning,
    Coworking,
    Digital,
}

impl PlanCategory {
    pub const ALL: [PlanCategory; 5] = [
        PlanCategory::Fitness,
        PlanCategory::Streaming,
        PlanCategory::Elearning,
        PlanCategory::Coworking,
        PlanCategory::Digital,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanCategory::Fitness => "fitness",
            PlanCategory::Streaming => "streaming",
            PlanCategory::Elearning => "elearning",
            PlanCategory::Coworking => "coworking",
            PlanCategory::Digital => "digital",
        }
    }
}

impl std::fmt::Display for PlanCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PlanCategory {
    type Err = MembershipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlanCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| MembershipError::InvalidArgument(format!("unknown category '{s}'")))
    }
}

/// An immutable catalog entry: a purchasable membership tier.
///
/// Prices are minor currency units and non-negative. `features` is ordered
/// for display only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    pub id: String,
    pub name: String,
    pub description: String,
    pub image_emoji: String,
    pub price_monthly: i64,
    pub price_yearly: i64,
    pub features: Vec<String>,
    pub category: PlanCategory,
    pub tier: Option<String>,
}

impl Plan {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: PlanCategory,
        price_monthly: i64,
        price_yearly: i64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            image_emoji: String::new(),
            price_monthly,
            price_yearly,
            features: Vec::new(),
            category,
            tier: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_emoji(mut self, emoji: impl Into<String>) -> Self {
        self.image_emoji = emoji.into();
        self
    }

    pub fn with_features(mut self, features: Vec<String>) -> Self {
        self.features = features;
        self
    }

    pub fn with_tier(mut self, tier: impl Into<String>) -> Self {
        self.tier = Some(tier.into());
        self
    }

    /// Validate catalog data
    pub fn validate(&self) -> crate::Result<()> {
        if self.id.is_empty() {
            return Err(
                MembershipError::InvalidArgument("plan id cannot be empty".to_string()).into(),
            );
        }
        if self.name.is_empty() {
            return Err(
                MembershipError::InvalidArgument("plan name cannot be empty".to_string()).into(),
            );
        }
        if self.price_monthly < 0 || self.price_yearly < 0 {
            return Err(
                MembershipError::InvalidArgument("prices cannot be negative".to_string()).into(),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_category_round_trip() {
        for category in PlanCategory::ALL {
            let parsed = PlanCategory::from_str(category.as_str()).unwrap();
            assert_eq!(parsed, category);
        }
        assert!(PlanCategory::from_str("gaming").is_err());
    }

    #[test]
    fn test_category_serde_lowercase() {
        let json = serde_json::to_string(&PlanCategory::Elearning).unwrap();
        assert_eq!(json, "\"elearning\"");
        let back: PlanCategory = serde_json::from_str("\"coworking\"").unwrap();
        assert_eq!(back, PlanCategory::Coworking);
    }

    #[test]
    fn test_plan_builder() {
        let plan = Plan::new("fit-basic", "Fit Basic", PlanCategory::Fitness, 69900, 59900)
            .with_description("Gym access during regular hours.")
            .with_emoji("💪")
            .with_tier("Basic")
            .with_features(vec!["Access 6am-9pm".to_string()]);

        assert!(plan.validate().is_ok());
        assert_eq!(plan.category, PlanCategory::Fitness);
        assert_eq!(plan.tier.as_deref(), Some("Basic"));
        assert_eq!(plan.features.len(), 1);
    }

    #[test]
    fn test_plan_validation() {
        let plan = Plan::new("", "Nameless", PlanCategory::Digital, 0, 0);
        assert!(plan.validate().is_err());

        let plan = Plan::new("neg", "Negative", PlanCategory::Digital, -1, 0);
        assert!(plan.validate().is_err());
    }
}
