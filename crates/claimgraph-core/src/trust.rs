//! # Trust Engine
//!
//! Arbitrates a field's claims into one resolved value with a confidence.
//!
//! ## Algorithm
//!
//! 1. Group claims by normalized value, in first-seen order.
//! 2. Score each claim with the first matching [`TrustRule`].
//! 3. A group's score is the sum of its members' scores.
//! 4. A group backed by an official domain beats any group that is not.
//!    Otherwise the highest-scoring group wins; ties keep the earliest group.
//! 5. The field is conflicted when the runner-up reaches the conflict ratio
//!    of the winner's score.
//! 6. Confidence and method come from the winner's composition: official
//!    backing, agent backing, then the number of distinct agreeing domains.
//! 7. Agent-backed winners under the agent cutoff are capped.
//! 8. Conflicted results below broad consensus are clamped.
//!
//! Scores and confidences are integers. The engine is a pure function of the
//! claim slice and its policy.

use crate::claims::{Claim, SourceKind};
use crate::normalize::normalize_domain;
use crate::primitives::{
    AGENT_CAP_CONFIDENCE, AGENT_CONFLICT_CAP_CONFIDENCE, AGENT_RESULT_CONFIDENCE, AGENT_SCORE,
    AGENT_TRUST_CUTOFF, AUTO_PUBLISH_PERCENT, BROAD_CONSENSUS_CONFIDENCE, CONFLICT_CLAMP_PERCENT,
    CONFLICT_RATIO_PERCENT, CONSENSUS_CONFIDENCE, DEFAULT_SCORE, OFFICIAL_CONFIDENCE,
    OFFICIAL_SCORE, SINGLE_SOURCE_CONFIDENCE, TRUSTED_RETAILER_SCORE,
};
use crate::{ClaimId, Confidence, FieldValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// RULES
// =============================================================================

/// Classification a claim's source received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustTier {
    Official,
    TrustedRetailer,
    Agent,
    Listed,
    Unclassified,
}

/// Condition a [`TrustRule`] tests against a claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourcePredicate {
    /// Domain contains any of the fragments (`"canon"` matches `canon.ru`).
    DomainContainsAny(Vec<String>),
    /// Domain equals the given domain or is a subdomain of it.
    DomainIs(String),
    /// Claim was produced by a research agent.
    AgentProduced,
    /// Matches every claim.
    Always,
}

impl SourcePredicate {
    fn matches(&self, domain: &str, kind: SourceKind) -> bool {
        match self {
            Self::DomainContainsAny(fragments) => {
                fragments.iter().any(|f| domain.contains(f.as_str()))
            }
            Self::DomainIs(d) => {
                domain == d
                    || domain
                        .strip_suffix(d.as_str())
                        .is_some_and(|rest| rest.ends_with('.'))
            }
            Self::AgentProduced => kind == SourceKind::Agent,
            Self::Always => true,
        }
    }
}

/// One entry of the ordered trust table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustRule {
    pub predicate: SourcePredicate,
    pub score: u32,
    pub tier: TrustTier,
}

/// Tunable trust configuration.
///
/// Deserializes from the `[trust]` section of the app config; every field
/// falls back to the compiled-in default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustPolicy {
    pub official_domains: Vec<String>,
    pub trusted_retailers: Vec<String>,
    /// Explicit per-domain scores, checked before the agent rule.
    pub domain_scores: BTreeMap<String, u32>,
    pub official_score: u32,
    pub retailer_score: u32,
    pub agent_score: u32,
    pub default_score: u32,
    pub conflict_ratio_percent: u32,
    pub conflict_clamp_percent: u8,
    pub agent_cutoff: u32,
    pub auto_publish_percent: u8,
}

impl Default for TrustPolicy {
    fn default() -> Self {
        let official = [
            "hp.com",
            "canon",
            "epson",
            "brother",
            "xerox",
            "kyocera",
            "ricoh",
            "lexmark",
            "samsung",
            "konicaminolta",
        ];
        let retailers = ["nix.ru", "dns-shop.ru", "citilink.ru", "onlinetrade.ru"];
        let table = [
            ("amazon.com", 80),
            ("market.yandex.ru", 75),
            ("ozon.ru", 70),
            ("ebay.com", 65),
            ("wildberries.ru", 60),
        ];

        Self {
            official_domains: official.iter().map(|s| (*s).to_string()).collect(),
            trusted_retailers: retailers.iter().map(|s| (*s).to_string()).collect(),
            domain_scores: table
                .iter()
                .map(|(d, s)| ((*d).to_string(), *s))
                .collect(),
            official_score: OFFICIAL_SCORE,
            retailer_score: TRUSTED_RETAILER_SCORE,
            agent_score: AGENT_SCORE,
            default_score: DEFAULT_SCORE,
            conflict_ratio_percent: CONFLICT_RATIO_PERCENT,
            conflict_clamp_percent: CONFLICT_CLAMP_PERCENT,
            agent_cutoff: AGENT_TRUST_CUTOFF,
            auto_publish_percent: AUTO_PUBLISH_PERCENT,
        }
    }
}

impl TrustPolicy {
    /// Expand the policy into the ordered rule list.
    #[must_use]
    pub fn rules(&self) -> Vec<TrustRule> {
        let mut rules = vec![
            TrustRule {
                predicate: SourcePredicate::DomainContainsAny(normalized(&self.official_domains)),
                score: self.official_score,
                tier: TrustTier::Official,
            },
            TrustRule {
                predicate: SourcePredicate::DomainContainsAny(normalized(&self.trusted_retailers)),
                score: self.retailer_score,
                tier: TrustTier::TrustedRetailer,
            },
        ];
        rules.extend(self.domain_scores.iter().map(|(domain, score)| TrustRule {
            predicate: SourcePredicate::DomainIs(normalize_domain(domain)),
            score: *score,
            tier: TrustTier::Listed,
        }));
        rules.push(TrustRule {
            predicate: SourcePredicate::AgentProduced,
            score: self.agent_score,
            tier: TrustTier::Agent,
        });
        rules.push(TrustRule {
            predicate: SourcePredicate::Always,
            score: self.default_score,
            tier: TrustTier::Unclassified,
        });
        rules
    }
}

fn normalized(domains: &[String]) -> Vec<String> {
    domains
        .iter()
        .map(|d| normalize_domain(d))
        .filter(|d| !d.is_empty())
        .collect()
}

// =============================================================================
// RESULTS
// =============================================================================

/// How the winning value's confidence was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    Official,
    Consensus,
    SingleSource,
    AgentResult,
}

/// Whether a resolved field can be published without a human look.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    AutoPublish,
    Review,
}

/// One claim's contribution to the winning value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceContribution {
    pub claim_id: ClaimId,
    pub domain: String,
    pub source_kind: SourceKind,
    pub score: u32,
    pub tier: TrustTier,
}

/// Score breakdown of one candidate value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub value: FieldValue,
    pub normalized: String,
    pub score: u32,
    pub domains: Vec<String>,
    pub claims: usize,
    /// At least one claim comes from an official domain.
    pub official: bool,
}

/// The arbitrated value of one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedField {
    pub field: String,
    pub value: FieldValue,
    pub normalized: String,
    pub confidence: Confidence,
    pub sources: Vec<SourceContribution>,
    pub is_conflict: bool,
    pub method: ResolutionMethod,
    /// Every candidate, in first-seen order.
    pub candidates: Vec<CandidateScore>,
    disposition: Disposition,
}

impl ResolvedField {
    /// Publish or route to review.
    #[must_use]
    pub fn disposition(&self) -> Disposition {
        self.disposition
    }
}

// =============================================================================
// ENGINE
// =============================================================================

struct Group<'a> {
    normalized: &'a str,
    value: &'a FieldValue,
    score: u32,
    domains: Vec<&'a str>,
    members: Vec<(&'a Claim, u32, TrustTier)>,
}

impl Group<'_> {
    fn has_tier(&self, tier: TrustTier) -> bool {
        self.members.iter().any(|(_, _, t)| *t == tier)
    }

    fn has_agent_claim(&self) -> bool {
        self.members
            .iter()
            .any(|(claim, _, _)| claim.source_kind == SourceKind::Agent)
    }
}

/// Deterministic claim arbiter.
#[derive(Debug, Clone)]
pub struct TrustEngine {
    policy: TrustPolicy,
    rules: Vec<TrustRule>,
}

impl Default for TrustEngine {
    fn default() -> Self {
        Self::new(TrustPolicy::default())
    }
}

impl TrustEngine {
    #[must_use]
    pub fn new(policy: TrustPolicy) -> Self {
        let rules = policy.rules();
        Self { policy, rules }
    }

    #[must_use]
    pub fn policy(&self) -> &TrustPolicy {
        &self.policy
    }

    /// Score a single claim's source: first matching rule wins.
    #[must_use]
    pub fn score(&self, claim: &Claim) -> (u32, TrustTier) {
        let domain = normalize_domain(&claim.source_domain);
        self.rules
            .iter()
            .find(|rule| rule.predicate.matches(&domain, claim.source_kind))
            .map(|rule| (rule.score, rule.tier))
            .unwrap_or((self.policy.default_score, TrustTier::Unclassified))
    }

    /// Resolve a field from its full claim set. `None` for an empty set.
    #[must_use]
    pub fn resolve_field(&self, claims: &[Claim]) -> Option<ResolvedField> {
        let first = claims.first()?;

        let mut groups: Vec<Group<'_>> = Vec::new();
        for claim in claims {
            let (score, tier) = self.score(claim);
            let slot = match groups
                .iter()
                .position(|g| g.normalized == claim.normalized.as_str())
            {
                Some(i) => i,
                None => {
                    groups.push(Group {
                        normalized: &claim.normalized,
                        value: &claim.value,
                        score: 0,
                        domains: Vec::new(),
                        members: Vec::new(),
                    });
                    groups.len() - 1
                }
            };
            let group = &mut groups[slot];
            group.score = group.score.saturating_add(score);
            if !group.domains.contains(&claim.source_domain.as_str()) {
                group.domains.push(&claim.source_domain);
            }
            group.members.push((claim, score, tier));
        }

        // Official backing outranks any summed score; ties keep the earliest group.
        let rank = |g: &Group<'_>| (g.has_tier(TrustTier::Official), g.score);
        let mut winner = 0;
        for (i, group) in groups.iter().enumerate() {
            if rank(group) > rank(&groups[winner]) {
                winner = i;
            }
        }
        let runner_up = groups
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != winner)
            .map(|(_, g)| g.score)
            .max();

        let lead = &groups[winner];
        let mut is_conflict = runner_up.is_some_and(|r| {
            u64::from(r) * 100 >= u64::from(lead.score) * u64::from(self.policy.conflict_ratio_percent)
        });

        let by_domains = match lead.domains.len() {
            n if n >= 3 => (BROAD_CONSENSUS_CONFIDENCE, ResolutionMethod::Consensus),
            2 => (CONSENSUS_CONFIDENCE, ResolutionMethod::Consensus),
            _ => (SINGLE_SOURCE_CONFIDENCE, ResolutionMethod::SingleSource),
        };

        let (mut confidence, method) = if lead.has_tier(TrustTier::Official) {
            is_conflict = false;
            (OFFICIAL_CONFIDENCE, ResolutionMethod::Official)
        } else if lead.has_agent_claim() {
            if lead.score >= self.policy.agent_cutoff {
                (AGENT_RESULT_CONFIDENCE, ResolutionMethod::AgentResult)
            } else {
                let cap = if is_conflict {
                    AGENT_CONFLICT_CAP_CONFIDENCE
                } else {
                    AGENT_CAP_CONFIDENCE
                };
                (by_domains.0.min(cap), ResolutionMethod::AgentResult)
            }
        } else {
            by_domains
        };

        if is_conflict && confidence < BROAD_CONSENSUS_CONFIDENCE {
            confidence = confidence.min(self.policy.conflict_clamp_percent);
        }

        let confidence = Confidence::new(confidence);
        let disposition = if !is_conflict && confidence.percent() >= self.policy.auto_publish_percent
        {
            Disposition::AutoPublish
        } else {
            Disposition::Review
        };

        let sources = lead
            .members
            .iter()
            .map(|(claim, score, tier)| SourceContribution {
                claim_id: claim.id,
                domain: claim.source_domain.clone(),
                source_kind: claim.source_kind,
                score: *score,
                tier: *tier,
            })
            .collect();

        let candidates = groups
            .iter()
            .map(|g| CandidateScore {
                value: g.value.clone(),
                normalized: g.normalized.to_string(),
                score: g.score,
                domains: g.domains.iter().map(|d| (*d).to_string()).collect(),
                claims: g.members.len(),
                official: g.has_tier(TrustTier::Official),
            })
            .collect();

        tracing::debug!(
            field = %first.field,
            candidates = groups.len(),
            winner_score = lead.score,
            is_conflict,
            confidence = confidence.percent(),
            "field resolved"
        );

        Some(ResolvedField {
            field: first.field.clone(),
            value: lead.value.clone(),
            normalized: lead.normalized.to_string(),
            confidence,
            sources,
            is_conflict,
            method,
            candidates,
            disposition,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::normalize::normalize_value;
    use chrono::Utc;

    fn claim(id: u64, value: &str, domain: &str, kind: SourceKind) -> Claim {
        Claim {
            id: ClaimId(id),
            item_id: "item-1".into(),
            field: "yield".into(),
            value: FieldValue::text(value),
            normalized: normalize_value(value),
            confidence: Confidence::CERTAIN,
            source_document_id: None,
            source_domain: domain.into(),
            source_kind: kind,
            created_at: Utc::now(),
        }
    }

    fn scrape(id: u64, value: &str, domain: &str) -> Claim {
        claim(id, value, domain, SourceKind::Scrape)
    }

    #[test]
    fn empty_input_resolves_to_none() {
        assert!(TrustEngine::default().resolve_field(&[]).is_none());
    }

    #[test]
    fn scoring_follows_rule_order() {
        let engine = TrustEngine::default();
        assert_eq!(engine.score(&scrape(1, "x", "support.hp.com")), (100, TrustTier::Official));
        assert_eq!(engine.score(&scrape(1, "x", "canon.ru")), (100, TrustTier::Official));
        assert_eq!(engine.score(&scrape(1, "x", "www.nix.ru")), (90, TrustTier::TrustedRetailer));
        assert_eq!(
            engine.score(&claim(1, "x", "random-blog.com", SourceKind::Agent)),
            (75, TrustTier::Agent)
        );
        assert_eq!(engine.score(&scrape(1, "x", "ozon.ru")), (70, TrustTier::Listed));
        assert_eq!(engine.score(&scrape(1, "x", "m.ozon.ru")), (70, TrustTier::Listed));
        assert_eq!(engine.score(&scrape(1, "x", "notozon.ru")), (50, TrustTier::Unclassified));
    }

    #[test]
    fn listed_domain_keeps_its_score_for_agent_claims() {
        let engine = TrustEngine::default();
        assert_eq!(
            engine.score(&claim(1, "x", "amazon.com", SourceKind::Agent)),
            (80, TrustTier::Listed)
        );
        assert_eq!(
            engine.score(&claim(1, "x", "wildberries.ru", SourceKind::Agent)),
            (60, TrustTier::Listed)
        );
        assert_eq!(
            engine.score(&claim(1, "x", "nix.ru", SourceKind::Agent)),
            (90, TrustTier::TrustedRetailer)
        );
    }

    #[test]
    fn two_ordinary_domains_do_not_outvote_official() {
        let resolved = TrustEngine::default()
            .resolve_field(&[
                scrape(1, "2000 pages", "shop-a.com"),
                scrape(2, "2000 pages", "shop-b.com"),
                scrape(3, "1600 pages", "hp.com"),
            ])
            .unwrap();
        assert_eq!(resolved.value, FieldValue::text("1600 pages"));
        assert_eq!(resolved.method, ResolutionMethod::Official);
        assert_eq!(resolved.confidence, Confidence::CERTAIN);
        assert!(!resolved.is_conflict);
    }

    #[test]
    fn highest_scoring_official_group_wins() {
        let resolved = TrustEngine::default()
            .resolve_field(&[
                scrape(1, "1600 pages", "hp.com"),
                scrape(2, "2100 pages", "canon.ru"),
                scrape(3, "2100 pages", "nix.ru"),
            ])
            .unwrap();
        assert_eq!(resolved.value, FieldValue::text("2100 pages"));
        assert_eq!(resolved.method, ResolutionMethod::Official);
    }

    #[test]
    fn single_claim_is_single_source() {
        let resolved = TrustEngine::default()
            .resolve_field(&[scrape(1, "1600 pages", "ozon.ru")])
            .unwrap();
        assert_eq!(resolved.method, ResolutionMethod::SingleSource);
        assert_eq!(resolved.confidence.percent(), 50);
        assert!(!resolved.is_conflict);
        assert_eq!(resolved.disposition(), Disposition::Review);
    }

    #[test]
    fn two_ordinary_domains_agreeing_is_consensus() {
        let resolved = TrustEngine::default()
            .resolve_field(&[
                scrape(1, "1600 pages", "ozon.ru"),
                scrape(2, "1600  Pages", "some-shop.com"),
            ])
            .unwrap();
        assert_eq!(resolved.method, ResolutionMethod::Consensus);
        assert_eq!(resolved.confidence.percent(), 80);
        assert_eq!(resolved.value, FieldValue::text("1600 pages"));
        assert_eq!(resolved.disposition(), Disposition::AutoPublish);
    }

    #[test]
    fn same_domain_twice_is_still_single_source() {
        let resolved = TrustEngine::default()
            .resolve_field(&[
                scrape(1, "1600 pages", "ozon.ru"),
                scrape(2, "1600 pages", "ozon.ru"),
            ])
            .unwrap();
        assert_eq!(resolved.method, ResolutionMethod::SingleSource);
        assert_eq!(resolved.sources.len(), 2);
    }

    #[test]
    fn three_domains_is_broad_consensus() {
        let resolved = TrustEngine::default()
            .resolve_field(&[
                scrape(1, "black", "a.com"),
                scrape(2, "black", "b.com"),
                scrape(3, "black", "c.com"),
            ])
            .unwrap();
        assert_eq!(resolved.confidence.percent(), 90);
        assert_eq!(resolved.method, ResolutionMethod::Consensus);
    }

    #[test]
    fn official_always_wins_and_clears_conflict() {
        let mut claims: Vec<Claim> = (0..6)
            .map(|i| scrape(i, "2000 pages", &format!("shop{i}.com")))
            .collect();
        claims.push(scrape(99, "1600 pages", "hp.com"));

        let resolved = TrustEngine::default().resolve_field(&claims).unwrap();
        assert_eq!(resolved.value, FieldValue::text("1600 pages"));
        assert_eq!(resolved.method, ResolutionMethod::Official);
        assert!(!resolved.is_conflict);
        assert_eq!(resolved.disposition(), Disposition::AutoPublish);
        assert!(resolved.candidates[1].official);
        assert_eq!(resolved.candidates[0].score, 300);

        let resolved = TrustEngine::default()
            .resolve_field(&[
                scrape(1, "2000 pages", "ozon.ru"),
                scrape(2, "1600 pages", "hp.com"),
            ])
            .unwrap();
        assert_eq!(resolved.value, FieldValue::text("1600 pages"));
        assert_eq!(resolved.method, ResolutionMethod::Official);
        assert_eq!(resolved.confidence, Confidence::CERTAIN);
        assert!(!resolved.is_conflict);
    }

    #[test]
    fn retailer_versus_agent_example() {
        let resolved = TrustEngine::default()
            .resolve_field(&[
                claim(1, "15000 pages", "random-blog.com", SourceKind::Agent),
                scrape(2, "10200 pages", "nix.ru"),
            ])
            .unwrap();
        assert_eq!(resolved.value, FieldValue::text("10200 pages"));
        assert_eq!(resolved.method, ResolutionMethod::SingleSource);
        assert!(resolved.is_conflict);
        assert_eq!(resolved.confidence.percent(), 40);
        assert_eq!(resolved.disposition(), Disposition::Review);
        assert_eq!(resolved.candidates.len(), 2);
        assert_eq!(resolved.candidates[0].score, 75);
        assert_eq!(resolved.candidates[1].score, 90);
    }

    #[test]
    fn near_equal_scores_conflict() {
        let resolved = TrustEngine::default()
            .resolve_field(&[scrape(1, "cyan", "a.com"), scrape(2, "magenta", "b.com")])
            .unwrap();
        assert!(resolved.is_conflict);
        assert!(resolved.confidence.percent() <= 40);
        // Tie keeps the earliest group.
        assert_eq!(resolved.value, FieldValue::text("cyan"));
    }

    #[test]
    fn strong_agent_winner_is_agent_result() {
        let resolved = TrustEngine::default()
            .resolve_field(&[
                claim(1, "12000 pages", "blog-a.com", SourceKind::Agent),
                claim(2, "12000 pages", "blog-b.com", SourceKind::Agent),
            ])
            .unwrap();
        assert_eq!(resolved.method, ResolutionMethod::AgentResult);
        assert_eq!(resolved.confidence.percent(), 95);
    }

    #[test]
    fn weak_agent_winner_is_capped() {
        let resolved = TrustEngine::default()
            .resolve_field(&[claim(1, "12000 pages", "blog-a.com", SourceKind::Agent)])
            .unwrap();
        assert_eq!(resolved.method, ResolutionMethod::AgentResult);
        assert_eq!(resolved.confidence.percent(), 50);

        let mut policy = TrustPolicy::default();
        policy.domain_scores.clear();
        let resolved = TrustEngine::new(policy)
            .resolve_field(&[
                claim(1, "12000 pages", "blog-a.com", SourceKind::Agent),
                scrape(2, "12000 pages", "other.com"),
            ])
            .unwrap();
        // 75 + 50 clears the cutoff.
        assert_eq!(resolved.confidence.percent(), 95);
    }

    #[test]
    fn policy_thresholds_are_configurable() {
        let policy = TrustPolicy {
            conflict_ratio_percent: 90,
            ..TrustPolicy::default()
        };
        let resolved = TrustEngine::new(policy)
            .resolve_field(&[
                claim(1, "15000 pages", "random-blog.com", SourceKind::Agent),
                scrape(2, "10200 pages", "nix.ru"),
            ])
            .unwrap();
        assert!(!resolved.is_conflict);
        assert_eq!(resolved.confidence.percent(), 50);
    }

    #[test]
    fn resolution_is_deterministic() {
        let claims = vec![
            scrape(1, "a", "x.com"),
            scrape(2, "b", "nix.ru"),
            claim(3, "a", "y.com", SourceKind::Agent),
        ];
        let engine = TrustEngine::default();
        assert_eq!(engine.resolve_field(&claims), engine.resolve_field(&claims));
    }
}
