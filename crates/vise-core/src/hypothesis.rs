//! Branch hypotheses: competing candidate values for one attribute.
//!
//! `fork_hypotheses` records several named, confidence-weighted candidate
//! values for a target attribute — derived from a source value through a
//! context-gated ruleset of scaled transforms — without committing any of
//! them. `collapse` later resolves the accumulated candidates to a single
//! committed value under a selectable policy, through a normal `set_attr`
//! write, so the resolution is auditable like any other mutation. The
//! candidate list itself is never deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Result, WorkbenchError};
use crate::graph::{split_path, HistoryEntry};
use crate::value::Value;
use crate::workbench::Workbench;

/// One recorded candidate value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchCandidate {
    pub name: String,
    pub value: Value,
    /// Gloss explaining the candidate's reading of the source value.
    pub rationale: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
    pub at: DateTime<Utc>,
}

/// One transform in a ruleset group: scale the source value, annotate, weigh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchSpec {
    pub name: String,
    pub gloss: String,
    pub scale: f64,
    pub confidence: f64,
}

/// Transforms gated on one context tag. A tag-less group matches any
/// context and usually serves as the fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HypothesisGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    pub branches: Vec<BranchSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HypothesisRuleset {
    pub groups: Vec<HypothesisGroup>,
}

impl HypothesisRuleset {
    /// The first group whose tag appears in the context wins; groups without
    /// a tag match anything. No group matching means no candidates.
    pub fn interpret(&self, context: &[String]) -> &[BranchSpec] {
        self.groups
            .iter()
            .find(|g| {
                g.tag
                    .as_ref()
                    .map_or(true, |tag| context.iter().any(|c| c == tag))
            })
            .map(|g| g.branches.as_slice())
            .unwrap_or(&[])
    }
}

/// How to resolve accumulated candidates into one committed value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum CollapsePolicy {
    /// Highest confidence wins; ties break toward the first-seen candidate.
    MaxConfidence,
    /// Confidence-weighted mean of interval midpoints and widths,
    /// reconstructed as an interval. Non-interval candidates are excluded.
    WeightedMean,
    /// Classify recent history glosses into coarse tags and match the
    /// resulting signature against preference patterns; falls back to
    /// max-confidence.
    Contextual(ContextualPolicy),
}

impl CollapsePolicy {
    pub fn name(&self) -> &'static str {
        match self {
            CollapsePolicy::MaxConfidence => "max_confidence",
            CollapsePolicy::WeightedMean => "weighted_mean",
            CollapsePolicy::Contextual(_) => "contextual",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextualPolicy {
    /// How many recent classified events form the signature.
    #[serde(default = "default_window")]
    pub window: usize,
    /// Tags to classify history glosses into (substring match, case
    /// insensitive; first listed tag wins per gloss).
    pub categories: Vec<String>,
    /// Extra node ids whose history feeds the signature, scanned before the
    /// target node itself.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub watch: Vec<String>,
    /// Ordered preference rules; the first matching pattern names the
    /// candidate to prefer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preferences: Vec<SignatureRule>,
}

fn default_window() -> usize {
    4
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureRule {
    pub when: SignaturePattern,
    pub prefer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignaturePattern {
    /// At least `count` occurrences of `tag` in the signature, optionally
    /// requiring that `without` is absent and `alongside` is present.
    AtLeast {
        tag: String,
        count: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        without: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alongside: Option<String>,
    },
    /// The signature ends with exactly this tag sequence.
    EndsWith { tags: Vec<String> },
}

impl SignaturePattern {
    fn matches(&self, signature: &[String]) -> bool {
        match self {
            SignaturePattern::AtLeast {
                tag,
                count,
                without,
                alongside,
            } => {
                let occurrences = signature.iter().filter(|t| *t == tag).count();
                occurrences >= *count
                    && without.as_ref().map_or(true, |w| !signature.contains(w))
                    && alongside.as_ref().map_or(true, |a| signature.contains(a))
            }
            SignaturePattern::EndsWith { tags } => signature.ends_with(tags),
        }
    }
}

/// Outcome of a collapse: which candidate (or synthetic combination) was
/// committed, and under which policy.
#[derive(Debug, Clone, Serialize)]
pub struct CollapseReport {
    pub target: String,
    pub policy: String,
    pub candidate: String,
    pub value: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub signature: Vec<String>,
}

impl Workbench {
    /// Derive one candidate per matching transform from the current value at
    /// `source` and append them to the target attribute's candidate list.
    /// The target's committed value is not changed.
    pub fn fork_hypotheses(
        &mut self,
        source: &str,
        target: &str,
        context: &[String],
        ruleset: &HypothesisRuleset,
    ) -> Result<Vec<BranchCandidate>> {
        let (entity, key) = split_path(target)
            .ok_or_else(|| WorkbenchError::InvalidPath(target.to_string()))?;
        let source_value = self.graph.get(source);
        let Some(node) = self.graph.nodes.get_mut(entity) else {
            return Err(WorkbenchError::NotFound(target.to_string()));
        };
        let mut out = Vec::new();
        for spec in ruleset.interpret(context) {
            let value = source_value.scale(spec.scale);
            let candidate = BranchCandidate {
                name: spec.name.clone(),
                value: value.clone(),
                rationale: spec.gloss.clone(),
                confidence: spec.confidence,
                context: context.to_vec(),
                at: Utc::now(),
            };
            node.hypotheses
                .entry(key.to_string())
                .or_default()
                .push(candidate.clone());
            node.history.push(HistoryEntry {
                path: target.to_string(),
                from: None,
                to: value,
                source: format!("hypothesis:{}", spec.name),
                at: candidate.at,
                gloss: Some(spec.gloss.clone()),
            });
            node.semantics.push(spec.gloss.clone());
            out.push(candidate);
        }
        self.record(
            "fork_hypotheses",
            json!({"source": source, "target": target, "context": context}),
            Some(json!({"candidates": out.len()})),
        );
        Ok(out)
    }

    /// Resolve the target attribute's accumulated candidates to one value.
    /// Returns `None` (and stays silent in the log) when no candidates have
    /// been recorded. The commit is a normal `set_attr` with source
    /// `collapse:<policy>`, so history and provenance capture it.
    pub fn collapse(
        &mut self,
        target: &str,
        policy: &CollapsePolicy,
    ) -> Result<Option<CollapseReport>> {
        let (entity, key) = split_path(target)
            .ok_or_else(|| WorkbenchError::InvalidPath(target.to_string()))?;
        let candidates: Vec<BranchCandidate> = {
            let node = self
                .graph
                .nodes
                .get(entity)
                .ok_or_else(|| WorkbenchError::NotFound(target.to_string()))?;
            match node.hypotheses.get(key) {
                Some(list) if !list.is_empty() => list.clone(),
                _ => return Ok(None),
            }
        };

        let (candidate, value, signature) = match policy {
            CollapsePolicy::MaxConfidence => {
                let chosen = max_confidence(&candidates);
                (chosen.name.clone(), chosen.value.clone(), Vec::new())
            }
            CollapsePolicy::WeightedMean => {
                let (name, value) = weighted_mean(&candidates);
                (name, value, Vec::new())
            }
            CollapsePolicy::Contextual(cfg) => {
                let signature = self.recent_signature(entity, cfg);
                let preferred = cfg
                    .preferences
                    .iter()
                    .find(|rule| rule.when.matches(&signature))
                    .map(|rule| rule.prefer.as_str());
                let chosen = preferred
                    .and_then(|name| candidates.iter().find(|c| c.name == name))
                    .unwrap_or_else(|| max_confidence(&candidates));
                (chosen.name.clone(), chosen.value.clone(), signature)
            }
        };

        let gloss = format!("collapsed via {}: {}", policy.name(), candidate);
        self.set_attr(
            target,
            value.clone(),
            &format!("collapse:{}", policy.name()),
            Some(&gloss),
        )?;
        Ok(Some(CollapseReport {
            target: target.to_string(),
            policy: policy.name().to_string(),
            candidate,
            value,
            signature,
        }))
    }

    /// The last `window` classified events across the watched nodes and the
    /// target node, oldest first.
    fn recent_signature(&self, target_entity: &str, cfg: &ContextualPolicy) -> Vec<String> {
        let mut ids: Vec<&str> = cfg.watch.iter().map(String::as_str).collect();
        if !ids.contains(&target_entity) {
            ids.push(target_entity);
        }
        let mut events: Vec<(DateTime<Utc>, String)> = Vec::new();
        for id in ids {
            let Some(node) = self.graph.nodes.get(id) else {
                continue;
            };
            for entry in &node.history {
                let Some(gloss) = &entry.gloss else { continue };
                let lower = gloss.to_lowercase();
                if let Some(tag) = cfg
                    .categories
                    .iter()
                    .find(|tag| lower.contains(&tag.to_lowercase()))
                {
                    events.push((entry.at, tag.clone()));
                }
            }
        }
        events.sort_by_key(|(at, _)| *at);
        let skip = events.len().saturating_sub(cfg.window);
        events.into_iter().skip(skip).map(|(_, tag)| tag).collect()
    }
}

fn max_confidence(candidates: &[BranchCandidate]) -> &BranchCandidate {
    let mut best = &candidates[0];
    for c in &candidates[1..] {
        if c.confidence > best.confidence {
            best = c;
        }
    }
    best
}

fn weighted_mean(candidates: &[BranchCandidate]) -> (String, Value) {
    let mut mid = 0.0f64;
    let mut width = 0.0f64;
    let mut total = 0.0f64;
    for c in candidates {
        if let Value::Interval(iv) = &c.value {
            mid += iv.mid() * c.confidence;
            width += iv.width() * c.confidence;
            total += c.confidence;
        }
    }
    if total == 0.0 {
        let first = &candidates[0];
        return (first.name.clone(), first.value.clone());
    }
    let mid = mid / total;
    let width = width / total;
    (
        "weighted_mean".to_string(),
        Value::interval(mid - width / 2.0, mid + width / 2.0),
    )
}
