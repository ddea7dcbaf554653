/// Items — the alternatives a rule chooses between.

use std::fmt;

use crate::core::cond::Cond;
use crate::core::rule::Rule;
use crate::core::rules::{GenError, Rules, ValidationError};

/// One element of an item's expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Elem {
    /// Literal token, emitted as-is. An empty token is silent.
    Token(String),
    /// Reference to a named rule in the registry.
    Rule(String),
}

impl fmt::Display for Elem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Elem::Token(tok) => write!(f, "'{tok}'"),
            Elem::Rule(name) => write!(f, "{name}"),
        }
    }
}

/// A single alternative within a rule.
#[derive(Debug, Clone, Default)]
pub struct Item {
    /// Selection weight, only meaningful under `RuleType::Prob`. Zero means
    /// unspecified.
    pub prob: f32,
    pub elems: Vec<Elem>,
    /// All must hold for the item to be eligible under `RuleType::Cond`.
    pub conds: Vec<Cond>,
    /// Anonymous inline rule expanded after `elems`.
    pub sub_rule: Option<Box<Rule>>,
}

impl Item {
    pub fn new(elems: Vec<Elem>) -> Self {
        Self {
            elems,
            ..Self::default()
        }
    }

    /// An item emitting a single literal token.
    pub fn token(tok: &str) -> Self {
        Self::new(vec![Elem::Token(tok.to_string())])
    }

    /// An item emitting nothing.
    pub fn silent() -> Self {
        Self::token("")
    }

    /// An item expanding a named rule.
    pub fn rule_ref(name: &str) -> Self {
        Self::new(vec![Elem::Rule(name.to_string())])
    }

    pub fn with_prob(mut self, prob: f32) -> Self {
        self.prob = prob;
        self
    }

    pub fn with_cond(mut self, cond: Cond) -> Self {
        self.conds.push(cond);
        self
    }

    pub fn with_sub_rule(mut self, rule: Rule) -> Self {
        self.sub_rule = Some(Box::new(rule));
        self
    }

    /// Expand this item into tokens.
    pub fn gen(&self, parent: &Rule, rules: &mut Rules) -> Result<Vec<String>, GenError> {
        let mut out = Vec::new();
        for el in &self.elems {
            match el {
                Elem::Token(tok) => {
                    if !tok.is_empty() {
                        out.push(tok.clone());
                    }
                }
                Elem::Rule(name) => out.extend(rules.gen_rule(name)?),
            }
        }
        if let Some(sub) = &self.sub_rule {
            out.extend(sub.gen(rules)?);
        }
        if rules.trace {
            tracing::debug!(rule = %parent.name, tokens = ?out, "item expanded");
        }
        Ok(out)
    }

    /// True if every condition holds. An item without conditions is always
    /// eligible.
    pub fn cond_true(&self, _parent: &Rule, rules: &Rules) -> bool {
        self.conds.iter().all(|c| c.eval(rules))
    }

    /// Check references against the registry.
    pub fn validate(&self, parent: &Rule, rules: &Rules) -> Vec<ValidationError> {
        let mut errs = Vec::new();
        for el in &self.elems {
            if let Elem::Rule(name) = el {
                if rules.rule(name).is_none() {
                    errs.push(ValidationError::UnknownRule {
                        rule: parent.name.clone(),
                        item: self.to_string(),
                        name: name.clone(),
                    });
                }
            }
        }
        for cond in &self.conds {
            for name in cond.rule_names() {
                if !rules.knows(name) {
                    errs.push(ValidationError::UnknownCondRule {
                        rule: parent.name.clone(),
                        name: name.to_string(),
                    });
                }
            }
        }
        if let Some(sub) = &self.sub_rule {
            errs.extend(sub.validate(rules));
        }
        errs
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.conds.is_empty() {
            f.write_str("=")?;
            for (i, c) in self.conds.iter().enumerate() {
                if i > 0 {
                    f.write_str(" && ")?;
                }
                // Or binds looser than the joining &&.
                if matches!(c, Cond::Or(_)) {
                    write!(f, "({c})")?;
                } else {
                    write!(f, "{c}")?;
                }
            }
            if !self.elems.is_empty() {
                f.write_str(" ")?;
            }
        } else if self.prob > 0.0 {
            write!(f, "{} ", self.prob)?;
        }
        for (i, el) in self.elems.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{el}")?;
        }
        if let Some(sub) = &self.sub_rule {
            write!(f, "{sub}")?;
        }
        Ok(())
    }
}
