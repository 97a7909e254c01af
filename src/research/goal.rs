//! Research goal definition
//!
//! A goal names the subject under diligence, its domain, the investment
//! thesis, and a weighted set of evaluation criteria. Goals are immutable once
//! a run starts; the controller only ever reads them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::config::RunConfig;
use crate::error::ResearchError;

/// Evaluation category. Declaration order is the canonical category order
/// used for tie-breaking and report layout.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Technical,
    Market,
    Business,
    Team,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Technical,
        Category::Market,
        Category::Business,
        Category::Team,
    ];

    /// Category weight used when the goal supplies no criteria
    pub fn default_weight(&self) -> f64 {
        match self {
            Category::Technical => 0.4,
            Category::Market => 0.2,
            Category::Business => 0.3,
            Category::Team => 0.1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Technical => "technical",
            Category::Market => "market",
            Category::Business => "business",
            Category::Team => "team",
        }
    }

    /// Search terms appended to category-focused evidence queries
    pub fn query_terms(&self) -> &'static str {
        match self {
            Category::Technical => "tech stack architecture infrastructure engineering",
            Category::Market => "market size competitors growth",
            Category::Business => "revenue funding valuation growth",
            Category::Team => "leadership team founders hiring",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ResearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "technical" | "tech" => Ok(Category::Technical),
            "market" => Ok(Category::Market),
            "business" => Ok(Category::Business),
            "team" => Ok(Category::Team),
            other => Err(ResearchError::config(format!("unknown category '{}'", other))),
        }
    }
}

/// Investment thesis the diligence is evaluated against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvestmentThesis {
    AccelerateOrganicGrowth,
    BuyAndBuild,
    DigitalTransformation,
    #[default]
    General,
}

impl InvestmentThesis {
    /// Overall score (0-100) at or above which the recommendation is `Proceed`
    pub fn recommendation_threshold(&self) -> f64 {
        match self {
            InvestmentThesis::AccelerateOrganicGrowth => 70.0,
            InvestmentThesis::BuyAndBuild => 65.0,
            InvestmentThesis::DigitalTransformation => 70.0,
            InvestmentThesis::General => 65.0,
        }
    }

    /// Areas the decomposition should emphasise
    pub fn focus_areas(&self) -> &'static [&'static str] {
        match self {
            InvestmentThesis::AccelerateOrganicGrowth => &[
                "market size and growth trajectory",
                "customer acquisition costs and expansion revenue",
                "competitive dynamics and differentiation",
                "scalability of go-to-market motion",
                "unit economics and path to profitability",
            ],
            InvestmentThesis::BuyAndBuild => &[
                "platform architecture and extensibility",
                "API quality and developer experience",
                "integration ecosystem health",
                "M&A track record and integration capabilities",
            ],
            InvestmentThesis::DigitalTransformation => &[
                "enterprise readiness (security, compliance, scale)",
                "legacy system displacement capability",
                "implementation complexity and time to value",
                "technology stack modernity and hiring ability",
            ],
            InvestmentThesis::General => &[
                "technology quality and scalability",
                "market position",
                "business model durability",
                "team strength",
            ],
        }
    }

    /// Extra terms appended to evidence queries for this thesis
    pub fn query_suffix(&self) -> Option<&'static str> {
        match self {
            InvestmentThesis::BuyAndBuild => Some("API platform integration ecosystem"),
            InvestmentThesis::DigitalTransformation => {
                Some("enterprise security compliance migration")
            }
            _ => None,
        }
    }
}

impl FromStr for InvestmentThesis {
    type Err = ResearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "accelerate-organic-growth" | "growth" => Ok(Self::AccelerateOrganicGrowth),
            "buy-and-build" => Ok(Self::BuyAndBuild),
            "digital-transformation" => Ok(Self::DigitalTransformation),
            "general" => Ok(Self::General),
            other => Err(ResearchError::config(format!("unknown thesis '{}'", other))),
        }
    }
}

/// A weighted evaluation criterion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub name: String,
    /// Relative importance, 0-100
    pub weight: f64,
    pub category: Category,
}

impl Criterion {
    pub fn new(name: impl Into<String>, weight: f64, category: Category) -> Self {
        Self {
            name: name.into(),
            weight,
            category,
        }
    }
}

impl FromStr for Criterion {
    type Err = ResearchError;

    /// Parse `name:weight:category`, e.g. `scalability:30:technical`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.rsplitn(3, ':').collect();
        if parts.len() != 3 {
            return Err(ResearchError::config(format!(
                "criterion '{}' must look like name:weight:category",
                s
            )));
        }
        let category = parts[0].parse()?;
        let weight = parts[1]
            .trim()
            .parse::<f64>()
            .map_err(|_| ResearchError::config(format!("invalid weight in '{}'", s)))?;
        Ok(Criterion::new(parts[2].trim(), weight, category))
    }
}

/// The immutable goal of a research run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchGoal {
    /// Subject identifier, e.g. a company name or domain
    pub subject: String,
    /// Domain context, e.g. the company's website
    pub domain: String,
    #[serde(default)]
    pub thesis: InvestmentThesis,
    #[serde(default)]
    pub criteria: Vec<Criterion>,
    #[serde(default)]
    pub config: RunConfig,
}

impl ResearchGoal {
    pub fn new(subject: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            domain: domain.into(),
            thesis: InvestmentThesis::default(),
            criteria: Vec::new(),
            config: RunConfig::default(),
        }
    }

    pub fn with_thesis(mut self, thesis: InvestmentThesis) -> Self {
        self.thesis = thesis;
        self
    }

    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criteria.push(criterion);
        self
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the goal before a run starts
    pub fn validate(&self) -> Result<(), ResearchError> {
        if self.subject.trim().is_empty() {
            return Err(ResearchError::config("goal subject cannot be empty"));
        }
        for criterion in &self.criteria {
            if criterion.name.trim().is_empty() {
                return Err(ResearchError::config("criterion name cannot be empty"));
            }
            if !(0.0..=100.0).contains(&criterion.weight) {
                return Err(ResearchError::config(format!(
                    "criterion '{}' weight must be within 0-100, got {}",
                    criterion.name, criterion.weight
                )));
            }
        }
        self.config.validate()
    }

    /// Normalized category weights (sum to 1).
    ///
    /// Derived from criteria weights when any criteria carry weight, otherwise
    /// the category defaults.
    pub fn category_weights(&self) -> BTreeMap<Category, f64> {
        let total: f64 = self.criteria.iter().map(|c| c.weight.max(0.0)).sum();
        if total <= 0.0 {
            return Category::ALL
                .iter()
                .map(|c| (*c, c.default_weight()))
                .collect();
        }

        let mut weights: BTreeMap<Category, f64> =
            Category::ALL.iter().map(|c| (*c, 0.0)).collect();
        for criterion in &self.criteria {
            if let Some(w) = weights.get_mut(&criterion.category) {
                *w += criterion.weight.max(0.0) / total;
            }
        }
        weights
    }

    pub fn category_weight(&self, category: Category) -> f64 {
        self.category_weights()
            .get(&category)
            .copied()
            .unwrap_or(0.0)
    }

    /// Categories that must carry at least one critical question.
    ///
    /// With no criteria supplied, every category counts.
    pub fn required_categories(&self) -> Vec<Category> {
        if self.criteria.is_empty() {
            return Category::ALL.to_vec();
        }
        Category::ALL
            .iter()
            .copied()
            .filter(|c| self.criteria.iter().any(|cr| cr.category == *c))
            .collect()
    }

    /// Look up a criterion by case-insensitive name
    pub fn criterion(&self, name: &str) -> Option<&Criterion> {
        let needle = name.trim().to_lowercase();
        self.criteria
            .iter()
            .find(|c| c.name.trim().to_lowercase() == needle)
    }

    /// Recommendation threshold (0-100): configured override or thesis default
    pub fn recommendation_threshold(&self) -> f64 {
        self.config
            .recommendation_threshold
            .unwrap_or_else(|| self.thesis.recommendation_threshold())
    }
}

/// Run submission from an external scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub goal: String,
    pub domain: String,
    #[serde(default)]
    pub thesis: InvestmentThesis,
    #[serde(default)]
    pub criteria: Vec<Criterion>,
    #[serde(default)]
    pub max_iterations: Option<usize>,
}

impl RunRequest {
    /// Build and validate the goal for this request
    pub fn into_goal(self, mut config: RunConfig) -> Result<ResearchGoal, ResearchError> {
        if let Some(max) = self.max_iterations {
            config.max_iterations = max;
        }
        let goal = ResearchGoal {
            subject: self.goal,
            domain: self.domain,
            thesis: self.thesis,
            criteria: self.criteria,
            config,
        };
        goal.validate()?;
        Ok(goal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_category_order() {
        let mut categories = vec![Category::Team, Category::Business, Category::Technical, Category::Market];
        categories.sort();
        assert_eq!(categories, Category::ALL.to_vec());
    }

    #[test]
    fn test_default_category_weights() {
        let goal = ResearchGoal::new("Acme", "acme.io");
        let weights = goal.category_weights();

        assert!(approx(weights[&Category::Technical], 0.4));
        assert!(approx(weights[&Category::Market], 0.2));
        assert!(approx(weights[&Category::Business], 0.3));
        assert!(approx(weights[&Category::Team], 0.1));
    }

    #[test]
    fn test_category_weights_from_criteria() {
        let goal = ResearchGoal::new("Acme", "acme.io")
            .with_criterion(Criterion::new("scalability", 60.0, Category::Technical))
            .with_criterion(Criterion::new("growth", 20.0, Category::Market))
            .with_criterion(Criterion::new("security", 20.0, Category::Technical));

        let weights = goal.category_weights();
        assert!(approx(weights[&Category::Technical], 0.8));
        assert!(approx(weights[&Category::Market], 0.2));
        assert!(approx(weights[&Category::Business], 0.0));
        assert_eq!(
            goal.required_categories(),
            vec![Category::Technical, Category::Market]
        );
    }

    #[test]
    fn test_criterion_parse() {
        let criterion: Criterion = "api quality:35:technical".parse().unwrap();
        assert_eq!(criterion.name, "api quality");
        assert!(approx(criterion.weight, 35.0));
        assert_eq!(criterion.category, Category::Technical);

        assert!("missing-parts".parse::<Criterion>().is_err());
        assert!("x:abc:team".parse::<Criterion>().is_err());
        assert!("x:10:legal".parse::<Criterion>().is_err());
    }

    #[test]
    fn test_goal_validation() {
        assert!(ResearchGoal::new("Acme", "acme.io").validate().is_ok());
        assert!(ResearchGoal::new("  ", "acme.io").validate().is_err());

        let heavy = ResearchGoal::new("Acme", "acme.io")
            .with_criterion(Criterion::new("x", 150.0, Category::Team));
        assert!(heavy.validate().is_err());
    }

    #[test]
    fn test_recommendation_threshold_by_thesis() {
        let goal = ResearchGoal::new("Acme", "acme.io").with_thesis(InvestmentThesis::BuyAndBuild);
        assert!(approx(goal.recommendation_threshold(), 65.0));

        let mut config = RunConfig::default();
        config.recommendation_threshold = Some(80.0);
        let goal = goal.with_config(config);
        assert!(approx(goal.recommendation_threshold(), 80.0));
    }

    #[test]
    fn test_run_request_into_goal() {
        let request: RunRequest = serde_json::from_str(
            r#"{"goal":"Acme","domain":"acme.io","thesis":"buy-and-build",
                "criteria":[{"name":"api","weight":40,"category":"technical"}],"max_iterations":2}"#,
        )
        .unwrap();

        let goal = request.into_goal(RunConfig::default()).unwrap();
        assert_eq!(goal.config.max_iterations, 2);
        assert_eq!(goal.thesis, InvestmentThesis::BuyAndBuild);
        assert_eq!(goal.criteria.len(), 1);
    }
}
