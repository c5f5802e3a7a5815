//! Scoped pattern rules and exact tracking-code mappings.
//!
//! Lookup is an explicit two-pass search: the organization's own rules are
//! consulted before the global set. Within a set, rules are ordered by
//! ascending priority, then descending confidence, then name.

use std::collections::{BTreeSet, HashMap, HashSet};

use fundlens_core::types::{AttributionRule, CodeMapping, PatternKind, RuleScope};
use fundlens_core::{FundlensError, FundlensResult};
use regex::{Regex, RegexBuilder};
use tracing::{debug, info};
use uuid::Uuid;

use crate::similarity::{set_similarity, trigrams};

/// A rule with its pattern prepared for matching.
#[derive(Debug, Clone)]
struct CompiledRule {
    rule: AttributionRule,
    matcher: Matcher,
}

#[derive(Debug, Clone)]
enum Matcher {
    Exact(String),
    Prefix(String),
    Suffix(String),
    Contains(String),
    Regex(Regex),
}

impl Matcher {
    fn compile(rule: &AttributionRule) -> FundlensResult<Self> {
        let pattern = rule.pattern.trim();
        if pattern.is_empty() {
            return Err(FundlensError::InvalidRule(format!(
                "rule '{}' has an empty pattern",
                rule.name
            )));
        }
        let lowered = pattern.to_lowercase();
        Ok(match rule.pattern_kind {
            PatternKind::Exact => Matcher::Exact(lowered),
            PatternKind::Prefix => Matcher::Prefix(lowered),
            PatternKind::Suffix => Matcher::Suffix(lowered),
            PatternKind::Contains => Matcher::Contains(lowered),
            PatternKind::Regex => Matcher::Regex(
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        FundlensError::InvalidRule(format!(
                            "rule '{}' has an invalid regex: {e}",
                            rule.name
                        ))
                    })?,
            ),
        })
    }

    /// `code` is already trimmed and lower-cased.
    fn matches(&self, code: &str) -> bool {
        match self {
            Matcher::Exact(p) => code == p.as_str(),
            Matcher::Prefix(p) => code.starts_with(p.as_str()),
            Matcher::Suffix(p) => code.ends_with(p.as_str()),
            Matcher::Contains(p) => code.contains(p.as_str()),
            Matcher::Regex(re) => re.is_match(code),
        }
    }
}

/// A rule that matched a tracking code.
#[derive(Debug, Clone, Copy)]
pub struct RuleMatch<'a> {
    pub rule: &'a AttributionRule,
    pub is_global: bool,
}

/// Best fuzzy candidate among an organization's known tracking codes.
#[derive(Debug, Clone, Copy)]
pub struct FuzzyCandidate<'a> {
    pub mapping: &'a CodeMapping,
    pub similarity: f64,
}

#[derive(Debug, Clone)]
struct KnownCode {
    code: String,
    grams: BTreeSet<String>,
}

/// Read-only view of the active rules and mappings for one invocation.
#[derive(Debug, Clone, Default)]
pub struct RuleStore {
    global: Vec<CompiledRule>,
    organization: HashMap<Uuid, Vec<CompiledRule>>,
    mappings: HashMap<(Uuid, String), CodeMapping>,
    known_codes: HashMap<Uuid, Vec<KnownCode>>,
}

impl RuleStore {
    /// Build the store, rejecting invalid rules and duplicate
    /// `(pattern, kind)` pairs within a scope.
    pub fn new(rules: Vec<AttributionRule>, mappings: Vec<CodeMapping>) -> FundlensResult<Self> {
        let mut store = Self::default();
        let mut seen: HashSet<(RuleScope, String, PatternKind)> = HashSet::new();

        for rule in rules {
            if !rule.active {
                debug!(rule = %rule.name, "Skipping inactive attribution rule");
                continue;
            }
            if !(0.0..=1.0).contains(&rule.confidence) {
                return Err(FundlensError::InvalidRule(format!(
                    "rule '{}' confidence {} is outside [0, 1]",
                    rule.name, rule.confidence
                )));
            }
            let key = (rule.scope, rule.pattern.trim().to_lowercase(), rule.pattern_kind);
            if !seen.insert(key) {
                return Err(FundlensError::InvalidRule(format!(
                    "duplicate pattern '{}' ({:?}) within scope {:?}",
                    rule.pattern, rule.pattern_kind, rule.scope
                )));
            }
            let compiled = CompiledRule {
                matcher: Matcher::compile(&rule)?,
                rule,
            };
            let scope = compiled.rule.scope;
            match scope {
                RuleScope::Global => store.global.push(compiled),
                RuleScope::Organization(org) => {
                    store.organization.entry(org).or_default().push(compiled)
                }
            }
        }

        Self::sort_by_precedence(&mut store.global);
        for rules in store.organization.values_mut() {
            Self::sort_by_precedence(rules);
        }

        for mapping in mappings {
            let code = mapping.tracking_code.trim().to_lowercase();
            if code.is_empty() {
                return Err(FundlensError::InvalidRule(format!(
                    "empty tracking code mapping for organization {}",
                    mapping.organization_id
                )));
            }
            let key = (mapping.organization_id, code.clone());
            if store.mappings.contains_key(&key) {
                return Err(FundlensError::InvalidRule(format!(
                    "duplicate mapping for tracking code '{}' in organization {}",
                    code, mapping.organization_id
                )));
            }
            store
                .known_codes
                .entry(mapping.organization_id)
                .or_default()
                .push(KnownCode {
                    grams: trigrams(&code),
                    code,
                });
            store.mappings.insert(key, mapping);
        }
        for codes in store.known_codes.values_mut() {
            codes.sort_by(|a, b| a.code.cmp(&b.code));
        }

        info!(
            global_rules = store.global.len(),
            organization_rule_sets = store.organization.len(),
            mappings = store.mappings.len(),
            "Rule store built"
        );
        Ok(store)
    }

    fn sort_by_precedence(rules: &mut [CompiledRule]) {
        rules.sort_by(|a, b| {
            a.rule
                .priority
                .cmp(&b.rule.priority)
                .then_with(|| b.rule.confidence.total_cmp(&a.rule.confidence))
                .then_with(|| a.rule.name.cmp(&b.rule.name))
        });
    }

    /// First matching rule: organization-scoped pass, then global pass.
    pub fn match_rule(&self, organization_id: Uuid, code: &str) -> Option<RuleMatch<'_>> {
        let scoped = self
            .organization
            .get(&organization_id)
            .and_then(|rules| rules.iter().find(|r| r.matcher.matches(code)))
            .map(|r| RuleMatch {
                rule: &r.rule,
                is_global: false,
            });

        scoped.or_else(|| {
            self.global
                .iter()
                .find(|r| r.matcher.matches(code))
                .map(|r| RuleMatch {
                    rule: &r.rule,
                    is_global: true,
                })
        })
    }

    /// Exact mapping for a normalized tracking code.
    pub fn mapping(&self, organization_id: Uuid, code: &str) -> Option<&CodeMapping> {
        self.mappings.get(&(organization_id, code.to_string()))
    }

    /// Most similar known code at or above `threshold`. Ties go to the
    /// lexicographically smallest code.
    pub fn fuzzy_match(
        &self,
        organization_id: Uuid,
        code: &str,
        threshold: f64,
    ) -> Option<FuzzyCandidate<'_>> {
        let grams = trigrams(code);
        let mut best: Option<(&KnownCode, f64)> = None;
        for known in self.known_codes.get(&organization_id)? {
            let score = set_similarity(&grams, &known.grams);
            if score < threshold {
                continue;
            }
            match best {
                Some((_, current)) if score <= current => {}
                _ => best = Some((known, score)),
            }
        }
        let (known, similarity) = best?;
        let mapping = self.mappings.get(&(organization_id, known.code.clone()))?;
        Some(FuzzyCandidate {
            mapping,
            similarity,
        })
    }

    pub fn rule_count(&self) -> usize {
        self.global.len() + self.organization.values().map(Vec::len).sum::<usize>()
    }

    pub fn mapping_count(&self) -> usize {
        self.mappings.len()
    }
}
