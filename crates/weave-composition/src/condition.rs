//! Applicability conditions
//!
//! Conditions decide whether an extension participates in a compilation. They
//! are evaluated against a [`CompileContext`] and never mutate anything.

use crate::extension::ViewExtension;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use weave_artifact::{ContentHash, ContentHasher, Value};

/// Runtime inputs a compilation is evaluated against
///
/// Two contexts with the same [`signature`](Self::signature) always select the
/// same extensions, so the signature is part of the artifact cache key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompileContext {
    /// Deployment environment, e.g. `prod`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    /// Enabled feature flags
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub features: BTreeSet<String>,
    /// Locale such as `fr_BE`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    /// Free-form values for [`Condition::Equals`] and friends
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl CompileContext {
    /// Empty context
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set environment
    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Builder: enable a feature flag
    #[must_use]
    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.features.insert(feature.into());
        self
    }

    /// Builder: set locale
    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// Builder: set an extra value
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Whether a feature flag is enabled
    #[inline]
    #[must_use]
    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.contains(feature)
    }

    /// Look up a key
    ///
    /// `environment` and `locale` resolve to the dedicated fields, everything
    /// else to [`extra`](Self::extra). Unknown keys are [`Value::Null`].
    #[must_use]
    pub fn get(&self, key: &str) -> Value {
        match key {
            "environment" => self.environment.clone().map_or(Value::Null, Value::String),
            "locale" => self.locale.clone().map_or(Value::Null, Value::String),
            _ => self.extra.get(key).cloned().unwrap_or_default(),
        }
    }

    /// Stable digest of every field
    #[must_use]
    pub fn signature(&self) -> ContentHash {
        let mut hasher = ContentHasher::new();
        hasher
            .update_opt_str(self.environment.as_deref())
            .update_opt_str(self.locale.as_deref())
            .update_i64(self.features.len() as i64);
        for feature in &self.features {
            hasher.update_str(feature);
        }
        hasher.update_i64(self.extra.len() as i64);
        for (key, value) in &self.extra {
            hasher.update_str(key);
            value.hash_into(&mut hasher);
        }
        hasher.finalize()
    }
}

/// Single applicability predicate
///
/// Serialized externally tagged, e.g. `{ "environment": "prod" }` or
/// `{ "not": { "feature": "beta" } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// Environment equals the given name
    Environment(String),
    /// Feature flag is enabled
    Feature(String),
    /// Locale matches exactly, or by language when given without a region
    /// (`fr` matches `fr_BE`)
    Locale(String),
    /// Context value loosely equals `value`
    Equals { key: String, value: Value },
    /// Context value loosely equals one of `values`
    OneOf { key: String, values: Vec<Value> },
    /// Context value is truthy
    Truthy(String),
    /// Negation
    Not(Box<Condition>),
    /// Every inner condition holds (vacuously true)
    All(Vec<Condition>),
    /// At least one inner condition holds
    Any(Vec<Condition>),
}

impl Condition {
    /// Evaluate against a context
    #[must_use]
    pub fn evaluate(&self, ctx: &CompileContext) -> bool {
        match self {
            Self::Environment(env) => ctx.environment.as_deref() == Some(env.as_str()),
            Self::Feature(feature) => ctx.has_feature(feature),
            Self::Locale(wanted) => ctx.locale.as_deref().is_some_and(|locale| locale_matches(wanted, locale)),
            Self::Equals { key, value } => ctx.get(key).loosely_equals(value),
            Self::OneOf { key, values } => {
                let actual = ctx.get(key);
                values.iter().any(|v| actual.loosely_equals(v))
            }
            Self::Truthy(key) => ctx.get(key).is_truthy(),
            Self::Not(inner) => !inner.evaluate(ctx),
            Self::All(inner) => inner.iter().all(|c| c.evaluate(ctx)),
            Self::Any(inner) => inner.iter().any(|c| c.evaluate(ctx)),
        }
    }

    /// Builder: negate
    #[must_use]
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    fn hash_into(&self, hasher: &mut ContentHasher) {
        match self {
            Self::Environment(name) => {
                hasher.update_str("environment").update_str(name);
            }
            Self::Feature(name) => {
                hasher.update_str("feature").update_str(name);
            }
            Self::Locale(name) => {
                hasher.update_str("locale").update_str(name);
            }
            Self::Truthy(key) => {
                hasher.update_str("truthy").update_str(key);
            }
            Self::Equals { key, value } => {
                hasher.update_str("equals").update_str(key);
                value.hash_into(hasher);
            }
            Self::OneOf { key, values } => {
                hasher.update_str("one_of").update_str(key).update_i64(values.len() as i64);
                for value in values {
                    value.hash_into(hasher);
                }
            }
            Self::Not(inner) => {
                hasher.update_str("not");
                inner.hash_into(hasher);
            }
            Self::All(inner) | Self::Any(inner) => {
                let tag = if matches!(self, Self::All(_)) { "all" } else { "any" };
                hasher.update_str(tag).update_i64(inner.len() as i64);
                for condition in inner {
                    condition.hash_into(hasher);
                }
            }
        }
    }
}

fn locale_matches(wanted: &str, actual: &str) -> bool {
    if wanted == actual {
        return true;
    }
    !wanted.contains(['_', '-'])
        && actual
            .split(['_', '-'])
            .next()
            .is_some_and(|language| language == wanted)
}

/// Conjunction of conditions attached to an extension
///
/// An empty set is unconditional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConditionSet(Vec<Condition>);

impl ConditionSet {
    /// Create from conditions
    #[inline]
    #[must_use]
    pub fn new(conditions: Vec<Condition>) -> Self {
        Self(conditions)
    }

    /// Add a condition
    pub fn push(&mut self, condition: Condition) {
        self.0.push(condition);
    }

    /// Whether there are no conditions
    #[inline]
    #[must_use]
    pub fn is_unconditional(&self) -> bool {
        self.0.is_empty()
    }

    /// Conditions in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }

    /// Whether every condition holds
    #[must_use]
    pub fn evaluate(&self, ctx: &CompileContext) -> bool {
        self.0.iter().all(|c| c.evaluate(ctx))
    }

    /// Feed every condition, in declaration order, into `hasher`
    pub fn hash_into(&self, hasher: &mut ContentHasher) {
        hasher.update_i64(self.0.len() as i64);
        for condition in &self.0 {
            condition.hash_into(hasher);
        }
    }
}

impl FromIterator<Condition> for ConditionSet {
    fn from_iter<I: IntoIterator<Item = Condition>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Whether an extension takes part in a compilation under `ctx`
///
/// Requires the owning module to have it active and all its conditions to
/// hold. Pure: the same inputs always give the same answer.
#[must_use]
pub fn eligible(extension: &ViewExtension, ctx: &CompileContext) -> bool {
    extension.active && extension.conditions.evaluate(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::Operation;

    fn prod() -> CompileContext {
        CompileContext::new()
            .with_environment("prod")
            .with_feature("beta")
            .with_locale("fr_BE")
            .with_value("tier", 3_i64)
    }

    #[test]
    fn leaf_conditions() {
        let ctx = prod();
        assert!(Condition::Environment("prod".into()).evaluate(&ctx));
        assert!(!Condition::Environment("dev".into()).evaluate(&ctx));
        assert!(Condition::Feature("beta".into()).evaluate(&ctx));
        assert!(!Condition::Feature("alpha".into()).evaluate(&ctx));
        assert!(Condition::Truthy("tier".into()).evaluate(&ctx));
        assert!(!Condition::Truthy("missing".into()).evaluate(&ctx));
    }

    #[test]
    fn locale_language_prefix() {
        let ctx = prod();
        assert!(Condition::Locale("fr_BE".into()).evaluate(&ctx));
        assert!(Condition::Locale("fr".into()).evaluate(&ctx));
        assert!(!Condition::Locale("fr_FR".into()).evaluate(&ctx));
        assert!(!Condition::Locale("nl".into()).evaluate(&ctx));
        assert!(!Condition::Locale("fr".into()).evaluate(&CompileContext::new()));
    }

    #[test]
    fn equality_is_loose_across_numbers() {
        let ctx = prod();
        let eq = Condition::Equals {
            key: "tier".into(),
            value: Value::Float(3.0),
        };
        assert!(eq.evaluate(&ctx));
        let one_of = Condition::OneOf {
            key: "environment".into(),
            values: vec!["staging".into(), "prod".into()],
        };
        assert!(one_of.evaluate(&ctx));
    }

    #[test]
    fn combinators() {
        let ctx = prod();
        let beta = Condition::Feature("beta".into());
        assert!(!beta.clone().negate().evaluate(&ctx));
        assert!(Condition::All(vec![]).evaluate(&ctx));
        assert!(!Condition::Any(vec![]).evaluate(&ctx));
        assert!(Condition::Any(vec![Condition::Environment("dev".into()), beta]).evaluate(&ctx));
    }

    #[test]
    fn eligibility_requires_active() {
        let ext = ViewExtension::new("x", "v", "//a", Operation::Remove)
            .unwrap()
            .with_condition(Condition::Environment("prod".into()));
        assert!(eligible(&ext, &prod()));
        assert!(!eligible(&ext, &CompileContext::new()));
        assert!(!eligible(&ext.with_active(false), &prod()));
    }

    #[test]
    fn signature_distinguishes_contexts() {
        assert_eq!(prod().signature(), prod().signature());
        assert_ne!(prod().signature(), prod().with_feature("x").signature());
        assert_ne!(
            CompileContext::new().with_environment("a").signature(),
            CompileContext::new().with_locale("a").signature()
        );
        // extras hash by type as well as by rendering
        assert_ne!(
            CompileContext::new().with_value("tier", 1_i64).signature(),
            CompileContext::new().with_value("tier", "1").signature()
        );
    }

    #[test]
    fn condition_sets_hash_by_structure() {
        fn digest(set: &ConditionSet) -> ContentHash {
            let mut hasher = ContentHasher::new();
            set.hash_into(&mut hasher);
            hasher.finalize()
        }
        let env = || Condition::Environment("prod".into());
        let beta = || Condition::Feature("beta".into());
        let sets = [
            ConditionSet::default(),
            ConditionSet::new(vec![env()]),
            ConditionSet::new(vec![env().negate()]),
            ConditionSet::new(vec![Condition::All(vec![env(), beta()])]),
            ConditionSet::new(vec![Condition::Any(vec![env(), beta()])]),
            ConditionSet::new(vec![Condition::Equals { key: "tier".into(), value: Value::Integer(3) }]),
            ConditionSet::new(vec![Condition::Equals { key: "tier".into(), value: Value::from("3") }]),
        ];
        for (i, a) in sets.iter().enumerate() {
            assert_eq!(digest(a), digest(&a.clone()));
            for b in &sets[i + 1..] {
                assert_ne!(digest(a), digest(b), "{a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn serde_shape() {
        let cond: Condition =
            serde_json::from_str(r#"{"not": {"feature": "beta"}}"#).unwrap();
        assert_eq!(cond, Condition::Feature("beta".into()).negate());
        let set: ConditionSet =
            serde_json::from_str(r#"[{"environment": "prod"}, {"equals": {"key": "tier", "value": 3}}]"#)
                .unwrap();
        assert!(set.evaluate(&prod()));
    }
}
