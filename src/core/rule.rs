/// Rules — item selection policies, traversal state, rendering and validation.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::fmt;

use crate::core::item::Item;
use crate::core::rules::{GenError, Rules, ValidationError};
use crate::core::state::State;

/// Name suffix marking an anonymous rule embedded in an item.
pub const SUB_RULE_SUFFIX: &str = "SubRule";

/// How a rule chooses among its items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RuleType {
    /// Uniformly random; items carry no weights.
    #[default]
    Uniform,
    /// Weighted by each item's `prob`.
    Prob,
    /// Uniform among items whose conditions hold.
    Cond,
    /// Cycles through items in order.
    Sequential,
    /// Cycles through items in a fresh random order each pass.
    Permuted,
}

impl RuleType {
    /// Operator shown after the rule name when rendering.
    pub fn operator(self) -> Option<&'static str> {
        match self {
            RuleType::Cond => Some("?"),
            RuleType::Sequential => Some("|"),
            RuleType::Permuted => Some("$"),
            RuleType::Uniform | RuleType::Prob => None,
        }
    }
}

/// A named production choosing one of its items each time it fires.
///
/// Traversal state (`cursor`, `order`) uses interior mutability so that a
/// rule shared by the registry can advance while it is being expanded.
/// Rules are therefore not `Sync`.
#[derive(Debug, Clone, Default)]
pub struct Rule {
    pub name: String,
    pub desc: String,
    pub rule_type: RuleType,
    pub items: Vec<Item>,
    pub state: State,
    cursor: Cell<usize>,
    order: RefCell<Vec<usize>>,
}

impl Rule {
    pub fn new(name: &str, rule_type: RuleType) -> Self {
        Self {
            name: name.to_string(),
            rule_type,
            ..Self::default()
        }
    }

    pub fn with_desc(mut self, desc: &str) -> Self {
        self.desc = desc.to_string();
        self
    }

    pub fn with_item(mut self, item: Item) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_state(mut self, state: State) -> Self {
        self.state = state;
        self
    }

    /// Current position for sequential and permuted traversal.
    pub fn cursor(&self) -> usize {
        self.cursor.get()
    }

    /// Current permuted order; empty until first needed.
    pub fn order(&self) -> Vec<usize> {
        self.order.borrow().clone()
    }

    /// True for anonymous rules embedded in an item.
    pub fn is_sub_rule(&self) -> bool {
        self.name.ends_with(SUB_RULE_SUFFIX)
    }

    /// Restart traversal. Permuted rules draw a fresh order.
    pub fn init<R: Rng + ?Sized>(&self, rng: &mut R) {
        self.cursor.set(0);
        if self.rule_type == RuleType::Permuted {
            *self.order.borrow_mut() = permutation(self.items.len(), rng);
        }
        for item in &self.items {
            if let Some(sub) = &item.sub_rule {
                sub.init(rng);
            }
        }
    }

    /// Fire this rule and expand one selected item.
    ///
    /// Selection misses (weights short of the draw, no true condition, no
    /// items) are not errors and yield an empty sequence.
    pub fn gen(&self, rules: &mut Rules) -> Result<Vec<String>, GenError> {
        rules.enter(&self.name)?;
        let out = self.fire(rules);
        rules.leave();
        out
    }

    fn fire(&self, rules: &mut Rules) -> Result<Vec<String>, GenError> {
        rules.set_fired(&self.name);
        self.state.set(rules, &self.name);
        if rules.trace {
            tracing::debug!(rule = %self.name, "fired rule");
        }
        match self.select(rules) {
            Some(idx) => self.items[idx].gen(self, rules),
            None => Ok(Vec::new()),
        }
    }

    fn select(&self, rules: &mut Rules) -> Option<usize> {
        let no = self.items.len();
        if no == 0 {
            return None;
        }
        let trace = rules.trace;
        match self.rule_type {
            RuleType::Uniform => {
                let opt = rules.rng().gen_range(0..no);
                if trace {
                    tracing::debug!(rule = %self.name, item = opt, from = no, "selected uniform random");
                }
                Some(opt)
            }
            RuleType::Prob => {
                let pv: f32 = rules.rng().gen();
                let mut sum = 0.0f32;
                for (ii, it) in self.items.iter().enumerate() {
                    sum += it.prob;
                    // lower values already excluded
                    if pv < sum {
                        if trace {
                            tracing::debug!(rule = %self.name, item = ii, rnd = pv, sum, "selected by prob");
                        }
                        return Some(ii);
                    }
                }
                if trace {
                    tracing::debug!(rule = %self.name, rnd = pv, sum, "no item selected");
                }
                None
            }
            RuleType::Cond => {
                let copts: Vec<usize> = self
                    .items
                    .iter()
                    .enumerate()
                    .filter(|(_, it)| it.cond_true(self, rules))
                    .map(|(ii, _)| ii)
                    .collect();
                if copts.is_empty() {
                    if trace {
                        tracing::debug!(rule = %self.name, "no items match conds");
                    }
                    return None;
                }
                let opt = copts[rules.rng().gen_range(0..copts.len())];
                if trace {
                    tracing::debug!(rule = %self.name, item = opt, from = copts.len(), "selected matching conds");
                }
                Some(opt)
            }
            RuleType::Sequential => {
                if self.cursor.get() >= no {
                    self.cursor.set(0);
                }
                let opt = self.cursor.get();
                self.cursor.set(opt + 1);
                if trace {
                    tracing::debug!(rule = %self.name, item = opt, "selected sequentially");
                }
                Some(opt)
            }
            RuleType::Permuted => {
                let mut order = self.order.borrow_mut();
                if order.len() != no {
                    *order = permutation(no, rules.rng());
                    self.cursor.set(0);
                }
                if self.cursor.get() >= no {
                    order.shuffle(rules.rng());
                    self.cursor.set(0);
                }
                let opt = order[self.cursor.get()];
                self.cursor.set(self.cursor.get() + 1);
                if trace {
                    tracing::debug!(rule = %self.name, item = opt, "selected in permuted order");
                }
                Some(opt)
            }
        }
    }

    /// Check for configuration errors. Collects every error found.
    pub fn validate(&self, rules: &Rules) -> Vec<ValidationError> {
        if self.items.is_empty() {
            return vec![ValidationError::NoItems {
                rule: self.name.clone(),
            }];
        }
        let mut errs = Vec::new();
        for it in &self.items {
            match self.rule_type {
                RuleType::Cond => {
                    if it.conds.is_empty() {
                        errs.push(ValidationError::CondWithoutConds {
                            rule: self.name.clone(),
                            item: it.to_string(),
                        });
                    }
                    if it.sub_rule.is_none() {
                        errs.push(ValidationError::CondWithoutSubRule {
                            rule: self.name.clone(),
                            item: it.to_string(),
                        });
                    }
                }
                RuleType::Prob if it.prob == 0.0 => {
                    errs.push(ValidationError::ZeroProb {
                        rule: self.name.clone(),
                        item: it.to_string(),
                    });
                }
                RuleType::Uniform if it.prob > 0.0 => {
                    errs.push(ValidationError::ProbOnUniform {
                        rule: self.name.clone(),
                        item: it.to_string(),
                    });
                }
                _ => {}
            }
            errs.extend(it.validate(self, rules));
        }
        errs
    }
}

/// A random permutation of `0..n`.
fn permutation<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<usize> {
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(rng);
    order
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_sub_rule() {
            f.write_str(" {\n")?;
            for it in &self.items {
                writeln!(f, "\t\t{it}")?;
            }
            return f.write_str("\t}\n");
        }
        f.write_str("\n\n")?;
        if !self.desc.is_empty() {
            writeln!(f, "// {}", self.desc)?;
        }
        f.write_str(&self.name)?;
        if let Some(op) = self.rule_type.operator() {
            write!(f, " {op}")?;
        }
        f.write_str(" {\n")?;
        for it in &self.items {
            writeln!(f, "\t{it}")?;
        }
        f.write_str("}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cond::Cond;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn words(rule_type: RuleType, name: &str, toks: &[&str]) -> Rule {
        toks.iter()
            .fold(Rule::new(name, rule_type), |r, t| r.with_item(Item::token(t)))
    }

    fn gen_one(rule: &Rule, rules: &mut Rules) -> Vec<String> {
        rule.gen(rules).unwrap()
    }

    #[test]
    fn sequential_greeting_cycles() {
        let rule = words(RuleType::Sequential, "Greeting", &["hi", "hello"]);
        let mut rules = Rules::with_seed(7);
        assert_eq!(gen_one(&rule, &mut rules), vec!["hi"]);
        assert_eq!(gen_one(&rule, &mut rules), vec!["hello"]);
        assert_eq!(gen_one(&rule, &mut rules), vec!["hi"]);
    }

    #[test]
    fn gen_marks_fired_and_applies_state() {
        let rule = words(RuleType::Uniform, "Opening", &["a"])
            .with_state(State::new().with("last", "="));
        let mut rules = Rules::with_seed(7);
        gen_one(&rule, &mut rules);
        assert!(rules.has_fired("Opening"));
        assert_eq!(rules.state("last"), Some("Opening"));
    }

    #[test]
    fn empty_rule_yields_empty_sequence_for_every_policy() {
        let mut rules = Rules::with_seed(7);
        for rt in [
            RuleType::Uniform,
            RuleType::Prob,
            RuleType::Cond,
            RuleType::Sequential,
            RuleType::Permuted,
        ] {
            let rule = Rule::new("Empty", rt);
            assert!(gen_one(&rule, &mut rules).is_empty());
        }
    }

    #[test]
    fn prob_short_of_draw_selects_nothing() {
        let rule = Rule::new("Rare", RuleType::Prob)
            .with_item(Item::token("never").with_prob(f32::MIN_POSITIVE));
        let mut rules = Rules::with_seed(11);
        let empties = (0..200).filter(|_| gen_one(&rule, &mut rules).is_empty()).count();
        assert!(empties >= 199);
    }

    #[test]
    fn cond_with_no_match_is_empty() {
        let rule = Rule::new("Maybe", RuleType::Cond).with_item(
            Item::default()
                .with_cond(Cond::parse("Other").unwrap())
                .with_sub_rule(words(RuleType::Uniform, "MaybeSubRule", &["x"])),
        );
        let mut rules = Rules::with_seed(1);
        assert!(gen_one(&rule, &mut rules).is_empty());
        rules.set_fired("Other");
        assert_eq!(gen_one(&rule, &mut rules), vec!["x"]);
    }

    #[test]
    fn sequential_wraps_when_cursor_past_end() {
        let rule = words(RuleType::Sequential, "Seq", &["a", "b", "c"]);
        let mut rules = Rules::with_seed(1);
        gen_one(&rule, &mut rules);
        gen_one(&rule, &mut rules);
        assert_eq!(rule.cursor(), 2);
        gen_one(&rule, &mut rules);
        assert_eq!(rule.cursor(), 3);
        assert_eq!(gen_one(&rule, &mut rules), vec!["a"]);
        assert_eq!(rule.cursor(), 1);
    }

    #[test]
    fn init_resets_cursor_and_draws_permutation() {
        let rule = words(RuleType::Permuted, "Perm", &["a", "b", "c", "d"]);
        let mut rules = Rules::with_seed(5);
        gen_one(&rule, &mut rules);
        assert_eq!(rule.cursor(), 1);

        let mut rng = StdRng::seed_from_u64(9);
        rule.init(&mut rng);
        assert_eq!(rule.cursor(), 0);
        let mut order = rule.order();
        order.sort_unstable();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn init_leaves_order_empty_for_non_permuted() {
        let rule = words(RuleType::Sequential, "Seq", &["a", "b"]);
        rule.init(&mut StdRng::seed_from_u64(1));
        assert!(rule.order().is_empty());
    }

    #[test]
    fn permuted_regenerates_order_when_items_change() {
        let mut rule = words(RuleType::Permuted, "Perm", &["a", "b"]);
        let mut rules = Rules::with_seed(2);
        gen_one(&rule, &mut rules);
        assert_eq!(rule.order().len(), 2);

        rule.items.push(Item::token("c"));
        gen_one(&rule, &mut rules);
        assert_eq!(rule.order().len(), 3);
        assert_eq!(rule.cursor(), 1);
    }

    #[test]
    fn validate_empty_rule_names_it_once() {
        let rules = Rules::with_seed(0);
        let errs = Rule::new("Nothing", RuleType::Prob).validate(&rules);
        assert_eq!(errs.len(), 1);
        assert!(errs[0].to_string().contains("Nothing"));
    }

    #[test]
    fn validate_well_formed_uniform() {
        let rules = Rules::with_seed(0);
        assert!(words(RuleType::Uniform, "Ok", &["a", "b"]).validate(&rules).is_empty());
    }

    #[test]
    fn validate_weight_misuse() {
        let rules = Rules::with_seed(0);
        let uniform = Rule::new("U", RuleType::Uniform)
            .with_item(Item::token("a").with_prob(0.5))
            .with_item(Item::token("b"));
        let errs = uniform.validate(&rules);
        assert_eq!(errs.len(), 1);
        assert!(matches!(errs[0], ValidationError::ProbOnUniform { .. }));

        let prob = Rule::new("P", RuleType::Prob)
            .with_item(Item::token("a").with_prob(0.5))
            .with_item(Item::token("b"))
            .with_item(Item::token("c"));
        let errs = prob.validate(&rules);
        assert_eq!(errs.len(), 2);
        assert!(errs.iter().all(|e| matches!(e, ValidationError::ZeroProb { .. })));
    }

    #[test]
    fn validate_cond_items_need_conds_and_sub_rules() {
        let rules = Rules::with_seed(0);
        let rule = Rule::new("C", RuleType::Cond).with_item(Item::token("bare"));
        let errs = rule.validate(&rules);
        assert_eq!(errs.len(), 2);
        assert!(matches!(errs[0], ValidationError::CondWithoutConds { .. }));
        assert!(matches!(errs[1], ValidationError::CondWithoutSubRule { .. }));
    }

    #[test]
    fn sequential_and_permuted_only_check_items() {
        let rules = Rules::with_seed(0);
        for rt in [RuleType::Sequential, RuleType::Permuted] {
            let rule = Rule::new("S", rt).with_item(Item::token("a").with_prob(0.3));
            assert!(rule.validate(&rules).is_empty());
        }
    }

    #[test]
    fn display_named_rule() {
        let rule = words(RuleType::Sequential, "Greeting", &["hi", "hello"]).with_desc("salutations");
        assert_eq!(
            rule.to_string(),
            "\n\n// salutations\nGreeting | {\n\t'hi'\n\t'hello'\n}\n"
        );
        let plain = words(RuleType::Uniform, "Noun", &["dog"]);
        assert_eq!(plain.to_string(), "\n\nNoun {\n\t'dog'\n}\n");
    }

    #[test]
    fn display_sub_rule_is_inline() {
        let sub = words(RuleType::Uniform, "MoodSubRule", &["calm"]);
        assert_eq!(sub.to_string(), " {\n\t\t'calm'\n\t}\n");
    }
}
