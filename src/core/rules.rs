/// Rule registry — owns named rules and the per-pass expansion context.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

use crate::core::rule::Rule;

/// Default limit on nested rule expansion.
pub const DEFAULT_MAX_DEPTH: usize = 1000;

#[derive(Debug, Error, PartialEq)]
pub enum GenError {
    #[error("rule not found: {0}")]
    RuleNotFound(String),
    #[error("no top rule set")]
    NoTop,
    #[error("expansion depth exceeded {max_depth} at rule {rule}")]
    DepthExceeded { rule: String, max_depth: usize },
}

/// A structural problem in a rule definition, reported by `validate`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("rule {rule} has no items")]
    NoItems { rule: String },
    #[error("rule {rule} is Cond, but item {item} has no conditions")]
    CondWithoutConds { rule: String, item: String },
    #[error("rule {rule} is Cond, but item {item} has no sub-rule")]
    CondWithoutSubRule { rule: String, item: String },
    #[error("rule {rule} is Prob, but item {item} has 0 prob")]
    ZeroProb { rule: String, item: String },
    #[error("rule {rule} is Uniform, but item {item} has > 0 prob")]
    ProbOnUniform { rule: String, item: String },
    #[error("rule {rule}: item {item} references unknown rule {name}")]
    UnknownRule {
        rule: String,
        item: String,
        name: String,
    },
    #[error("rule {rule}: condition references unknown rule {name}")]
    UnknownCondRule { rule: String, name: String },
    #[error("no top rule set")]
    MissingTop,
    #[error("top rule {0} is not defined")]
    UnknownTop(String),
}

/// A set of named rules plus the state of the current expansion pass:
/// which rules have fired, the state map, and the random source.
#[derive(Debug)]
pub struct Rules {
    pub name: String,
    pub desc: String,
    /// Emit `tracing` diagnostics for every firing and selection.
    pub trace: bool,
    /// Nested expansions allowed before `GenError::DepthExceeded`.
    pub max_depth: usize,
    top: Option<String>,
    rules: FxHashMap<String, Rc<Rule>>,
    /// Insertion order, for rendering and validation.
    names: Vec<String>,
    /// Names of inline sub-rules, which fire but are not addressable.
    inline: FxHashSet<String>,
    fired: FxHashSet<String>,
    states: FxHashMap<String, String>,
    depth: usize,
    rng: StdRng,
}

impl Default for Rules {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Rules {
    /// Deep copy: rules in the clone keep independent traversal state.
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            desc: self.desc.clone(),
            trace: self.trace,
            max_depth: self.max_depth,
            top: self.top.clone(),
            rules: self
                .rules
                .iter()
                .map(|(k, r)| (k.clone(), Rc::new(Rule::clone(r))))
                .collect(),
            names: self.names.clone(),
            inline: self.inline.clone(),
            fired: self.fired.clone(),
            states: self.states.clone(),
            depth: 0,
            rng: self.rng.clone(),
        }
    }
}

impl Rules {
    /// An empty registry with an entropy-seeded random source.
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// An empty registry with a reproducible random source.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            name: String::new(),
            desc: String::new(),
            trace: false,
            max_depth: DEFAULT_MAX_DEPTH,
            top: None,
            rules: FxHashMap::default(),
            names: Vec::new(),
            inline: FxHashSet::default(),
            fired: FxHashSet::default(),
            states: FxHashMap::default(),
            depth: 0,
            rng,
        }
    }

    pub fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Add a rule, replacing any rule of the same name. Returns the
    /// replaced rule.
    pub fn add(&mut self, rule: Rule) -> Option<Rc<Rule>> {
        let name = rule.name.clone();
        let prev = self.rules.insert(name.clone(), Rc::new(rule));
        if prev.is_none() {
            if let Some(added) = self.rules.get(&name) {
                collect_inline(added, &mut self.inline);
            }
            self.names.push(name);
        } else {
            // The replaced rule's inline names may be gone.
            self.inline.clear();
            for rule in self.rules.values() {
                collect_inline(rule, &mut self.inline);
            }
        }
        prev
    }

    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.get(name).map(|r| r.as_ref())
    }

    /// True for registered rules and inline sub-rules.
    pub fn knows(&self, name: &str) -> bool {
        self.rules.contains_key(name) || self.inline.contains(name)
    }

    /// Rule names in insertion order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn top(&self) -> Option<&str> {
        self.top.as_deref()
    }

    pub fn set_top(&mut self, name: &str) {
        self.top = Some(name.to_string());
    }

    /// Merge another registry into this one. Rules from `other` override
    /// rules here with the same name; `other`'s top applies only if this
    /// registry has none.
    pub fn merge(&mut self, other: Rules) {
        if self.top.is_none() {
            self.top = other.top;
        }
        for name in other.names {
            if let Some(rule) = other.rules.get(&name) {
                if self.rules.contains_key(&name) {
                    tracing::warn!(rule = %name, "merge replaced existing rule");
                }
                self.add(Rule::clone(rule));
            }
        }
    }

    /// Clear the fired set and state map.
    pub fn reset(&mut self) {
        self.fired.clear();
        self.states.clear();
        self.depth = 0;
    }

    /// Reset the pass and restart traversal of every rule.
    pub fn init(&mut self) {
        self.reset();
        for rule in self.rules.values() {
            rule.init(&mut self.rng);
        }
    }

    /// Run one top-level expansion pass from the top rule.
    pub fn gen(&mut self) -> Result<Vec<String>, GenError> {
        let top = self.top.clone().ok_or(GenError::NoTop)?;
        self.reset();
        self.gen_rule(&top)
    }

    /// Run one pass and join the tokens with spaces.
    pub fn gen_string(&mut self) -> Result<String, GenError> {
        Ok(self.gen()?.join(" "))
    }

    /// Expand a named rule within the current pass.
    pub fn gen_rule(&mut self, name: &str) -> Result<Vec<String>, GenError> {
        let rule = self
            .rules
            .get(name)
            .cloned()
            .ok_or_else(|| GenError::RuleNotFound(name.to_string()))?;
        rule.gen(self)
    }

    pub(crate) fn enter(&mut self, rule: &str) -> Result<(), GenError> {
        if self.depth >= self.max_depth {
            return Err(GenError::DepthExceeded {
                rule: rule.to_string(),
                max_depth: self.max_depth,
            });
        }
        self.depth += 1;
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub(crate) fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn set_fired(&mut self, name: &str) {
        if !self.fired.contains(name) {
            self.fired.insert(name.to_string());
        }
    }

    pub fn has_fired(&self, name: &str) -> bool {
        self.fired.contains(name)
    }

    /// Names fired in the current pass, sorted.
    pub fn fired(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.fired.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn state(&self, key: &str) -> Option<&str> {
        self.states.get(key).map(String::as_str)
    }

    pub fn set_state(&mut self, key: &str, value: &str) {
        self.states.insert(key.to_string(), value.to_string());
    }

    /// Check every rule, plus the top rule setting.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errs = Vec::new();
        match &self.top {
            None => errs.push(ValidationError::MissingTop),
            Some(top) if !self.rules.contains_key(top) => {
                errs.push(ValidationError::UnknownTop(top.clone()))
            }
            Some(_) => {}
        }
        for name in &self.names {
            if let Some(rule) = self.rules.get(name) {
                errs.extend(rule.validate(self));
            }
        }
        errs
    }
}

fn collect_inline(rule: &Rule, inline: &mut FxHashSet<String>) {
    for item in &rule.items {
        if let Some(sub) = &item.sub_rule {
            inline.insert(sub.name.clone());
            collect_inline(sub, inline);
        }
    }
}

impl fmt::Display for Rules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.desc.is_empty() {
            writeln!(f, "// {}", self.desc)?;
        }
        for name in &self.names {
            if let Some(rule) = self.rules.get(name) {
                write!(f, "{rule}")?;
            }
        }
        Ok(())
    }
}
