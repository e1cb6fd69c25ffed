use crate::rule::{IngressRule, Rule, RuleKey};
use ahash::AHashSet as HashSet;

/// A set of single-source rules, keyed by [`RuleKey`].
///
/// Iteration follows insertion order so that the permissions sent to the
/// cloud are stable across runs.
#[derive(Clone, Debug, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
    keys: HashSet<RuleKey>,
}

/// Expands every rule into its single-source rules and collects them into a
/// set.
pub fn expand<'r>(rules: impl IntoIterator<Item = &'r IngressRule>) -> RuleSet {
    rules.into_iter().flat_map(IngressRule::expand).collect()
}

// === impl RuleSet ===

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule, returning false if a rule with the same identity is
    /// already present.
    pub fn insert(&mut self, rule: Rule) -> bool {
        if !self.keys.insert(rule.key()) {
            return false;
        }
        self.rules.push(rule);
        true
    }

    pub fn contains(&self, rule: &Rule) -> bool {
        self.keys.contains(&rule.key())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    /// Returns the rules in `self` that are not in `other`.
    pub fn difference(&self, other: &RuleSet) -> RuleSet {
        self.rules
            .iter()
            .filter(|rule| !other.contains(rule))
            .cloned()
            .collect()
    }

    /// Returns the rules in `self` that are also in `other`.
    pub fn intersection(&self, other: &RuleSet) -> RuleSet {
        self.rules
            .iter()
            .filter(|rule| other.contains(rule))
            .cloned()
            .collect()
    }

    pub fn union(&self, other: &RuleSet) -> RuleSet {
        self.rules.iter().chain(other.iter()).cloned().collect()
    }
}

impl PartialEq for RuleSet {
    fn eq(&self, other: &Self) -> bool {
        self.keys == other.keys
    }
}

impl Eq for RuleSet {}

impl FromIterator<Rule> for RuleSet {
    fn from_iter<I: IntoIterator<Item = Rule>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl Extend<Rule> for RuleSet {
    fn extend<I: IntoIterator<Item = Rule>>(&mut self, iter: I) {
        for rule in iter {
            self.insert(rule);
        }
    }
}

impl IntoIterator for RuleSet {
    type Item = Rule;
    type IntoIter = std::vec::IntoIter<Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.into_iter()
    }
}

impl<'s> IntoIterator for &'s RuleSet {
    type Item = &'s Rule;
    type IntoIter = std::slice::Iter<'s, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}
