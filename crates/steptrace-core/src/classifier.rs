//! Volume classification.
//!
//! A [`VolumeClassifier`] maps a volume to an integer id using an ordered
//! list of `(pattern, replacement)` rules. The first rule whose pattern
//! matches the whole volume name wins; the name is rewritten with the
//! replacement template and parsed as an integer. Id 0 is reserved for
//! "not sensitive", so a rule that produces 0, a negative number, or text
//! that is not a number leaves the volume at 0.
//!
//! Templates follow the ECMAScript convention: `$nn` names a two-digit
//! group only when the pattern has that many groups, otherwise `$n` is
//! followed by a literal digit, so `$100` with one group yields the
//! group followed by `00`.
//!
//! # Design Principles
//!
//! - Outcomes are cached per [`VolumeHandle`], including 0, so every
//!   volume is tested against the rules at most once.
//! - Classification never fails. Bad rules degrade to 0 with a warning.
//! - Changing the rule list clears the cache.

use std::collections::BTreeMap;

use regex::Regex;
use steptrace_types::{StepPoint, VolumeHandle, VolumeRef};
use tracing::{debug, warn};

/// Errors raised while editing the rule list or filtering the catalogue.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    /// A pattern is not a valid regular expression.
    #[error("invalid volume pattern {pattern:?}: {source}")]
    InvalidPattern {
        /// The rejected pattern text.
        pattern: String,
        /// The underlying regex error.
        source: regex::Error,
    },
}

/// How [`VolumeClassifier::add_rule`] changed the rule list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleChange {
    /// A new rule was appended at this position.
    Added(usize),
    /// The rule at this position had its replacement updated.
    Replaced(usize),
}

/// One classification rule.
#[derive(Debug, Clone)]
pub struct VolumeRule {
    pattern: String,
    regex: Regex,
    replacement: String,
    template: String,
}

impl VolumeRule {
    /// Compile a rule. The pattern is anchored so it must match the whole
    /// volume name.
    pub fn new(pattern: &str, replacement: &str) -> Result<Self, ClassifierError> {
        let regex = full_match(pattern)?;
        let groups = u32::try_from(regex.captures_len().saturating_sub(1)).unwrap_or(u32::MAX);
        Ok(Self {
            pattern: pattern.to_owned(),
            template: braced_template(replacement, groups),
            regex,
            replacement: replacement.to_owned(),
        })
    }

    /// Pattern as written by the user.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Replacement template (`$1`, `${name}` refer to capture groups).
    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    /// Rewrite `name` if the pattern matches it.
    fn rewrite(&self, name: &str) -> Option<String> {
        self.regex
            .is_match(name)
            .then(|| self.regex.replace(name, self.template.as_str()).into_owned())
    }
}

/// Rewrite numbered references as `${n}` so digits after them stay
/// literal. `$$` and `${name}` pass through.
fn braced_template(replacement: &str, groups: u32) -> String {
    let mut out = String::with_capacity(replacement.len());
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        if chars.next_if_eq(&'$').is_some() {
            out.push_str("$$");
            continue;
        }
        let Some(first) = chars.peek().and_then(|d| d.to_digit(10)) else {
            out.push('$');
            continue;
        };
        chars.next();
        let mut group = first;
        if let Some(second) = chars.peek().and_then(|d| d.to_digit(10)) {
            let two = first.saturating_mul(10).saturating_add(second);
            if (1..=groups).contains(&two) {
                chars.next();
                group = two;
            }
        }
        out.push_str("${");
        out.push_str(&group.to_string());
        out.push('}');
    }
    out
}

fn full_match(pattern: &str) -> Result<Regex, ClassifierError> {
    Regex::new(&format!("^(?:{pattern})$")).map_err(|source| ClassifierError::InvalidPattern {
        pattern: pattern.to_owned(),
        source,
    })
}

/// Ordered rules plus the per-volume outcome cache.
#[derive(Debug, Clone, Default)]
pub struct VolumeClassifier {
    rules: Vec<VolumeRule>,
    cache: BTreeMap<VolumeHandle, i32>,
    catalogue: BTreeMap<VolumeHandle, String>,
}

impl VolumeClassifier {
    /// Create a classifier with no rules. Every volume classifies to 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule, or replace the template of the rule with the same
    /// pattern text (which keeps its position). Clears the cache.
    pub fn add_rule(
        &mut self,
        pattern: &str,
        replacement: &str,
    ) -> Result<RuleChange, ClassifierError> {
        let rule = VolumeRule::new(pattern, replacement)?;
        let change = if let Some(index) = self.rules.iter().position(|r| r.pattern == pattern) {
            if let Some(existing) = self.rules.get_mut(index) {
                *existing = rule;
            }
            RuleChange::Replaced(index)
        } else {
            self.rules.push(rule);
            RuleChange::Added(self.rules.len().saturating_sub(1))
        };
        self.cache.clear();
        debug!(pattern, replacement, ?change, "volume rule registered");
        Ok(change)
    }

    /// Registered rules, in match order.
    pub fn rules(&self) -> &[VolumeRule] {
        &self.rules
    }

    /// Classify a volume. Returns the cached outcome when there is one.
    pub fn classify(&mut self, handle: VolumeHandle, name: &str) -> i32 {
        self.register_volume(handle, name);
        if let Some(&id) = self.cache.get(&handle) {
            return id;
        }
        let id = self.resolve(name);
        self.cache.insert(handle, id);
        id
    }

    /// Classify the volume a step point is in. Points outside the world
    /// classify to 0.
    pub fn classify_point(&mut self, point: &StepPoint) -> i32 {
        point
            .volume
            .as_ref()
            .map_or(0, |volume| self.classify(volume.handle, &volume.name))
    }

    /// Whether the volume classifies to a non-zero id.
    pub fn is_sensitive(&mut self, handle: VolumeHandle, name: &str) -> bool {
        self.classify(handle, name) != 0
    }

    /// Record a volume in the catalogue without classifying it.
    pub fn register_volume(&mut self, handle: VolumeHandle, name: &str) {
        self.catalogue
            .entry(handle)
            .or_insert_with(|| name.to_owned());
    }

    /// Catalogued volumes, optionally restricted to names fully matching
    /// `filter`, in handle order.
    pub fn known_volumes(&self, filter: Option<&str>) -> Result<Vec<VolumeRef>, ClassifierError> {
        let regex = filter.map(full_match).transpose()?;
        Ok(self
            .catalogue
            .iter()
            .filter(|(_, name)| regex.as_ref().is_none_or(|r| r.is_match(name)))
            .map(|(&handle, name)| VolumeRef {
                handle,
                name: name.clone(),
            })
            .collect())
    }

    fn resolve(&self, name: &str) -> i32 {
        let Some((rule, rewritten)) = self
            .rules
            .iter()
            .find_map(|rule| rule.rewrite(name).map(|text| (rule, text)))
        else {
            debug!(volume = name, "no volume rule matched");
            return 0;
        };

        match rewritten.trim().parse::<i32>() {
            Ok(id) if id > 0 => {
                debug!(volume = name, id, pattern = rule.pattern(), "volume classified");
                id
            }
            Ok(id) => {
                warn!(
                    volume = name,
                    id,
                    pattern = rule.pattern(),
                    "volume rule produced a non-positive id, volume left unclassified"
                );
                0
            }
            Err(e) => {
                warn!(
                    volume = name,
                    rewritten,
                    pattern = rule.pattern(),
                    error = %e,
                    "volume rule did not produce an integer; volume left unclassified"
                );
                0
            }
        }
    }
}
