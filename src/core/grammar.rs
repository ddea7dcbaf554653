/// Rule-definition loading — RON files into a `Rules` registry.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::core::cond::Cond;
use crate::core::item::{Elem, Item};
use crate::core::rule::{Rule, RuleType, SUB_RULE_SUFFIX};
use crate::core::rules::Rules;
use crate::core::state::State;

#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("condition parse error: {0}")]
    CondParse(String),
    #[error("invalid element '{elem}' in rule {rule}")]
    InvalidElem { rule: String, elem: String },
    #[error("duplicate rule: {0}")]
    DuplicateRule(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

// RON deserialization helpers — the file format is flatter than the
// runtime types, so we go through intermediate structs.

#[derive(Debug, Deserialize)]
#[serde(rename = "Rules")]
struct RonRules {
    #[serde(default)]
    name: String,
    #[serde(default)]
    desc: String,
    #[serde(default)]
    top: Option<String>,
    rules: Vec<RonRule>,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "Rule")]
struct RonRule {
    name: String,
    #[serde(default)]
    desc: String,
    #[serde(default)]
    kind: RuleType,
    #[serde(default)]
    state: BTreeMap<String, String>,
    items: Vec<RonItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "Item")]
struct RonItem {
    #[serde(default)]
    prob: f32,
    #[serde(default)]
    elems: Vec<String>,
    #[serde(default)]
    cond: Vec<String>,
    #[serde(default)]
    sub: Option<Vec<RonItem>>,
    #[serde(default)]
    sub_kind: RuleType,
}

impl Rules {
    /// Load a rule set from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<Rules, GrammarError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a rule set from a RON string, using an entropy-seeded random
    /// source. Call `seed` afterwards for reproducible output.
    pub fn parse_ron(input: &str) -> Result<Rules, GrammarError> {
        // `top: "Name"` and `sub: [...]` are written without `Some(...)`.
        let raw: RonRules = ron::Options::default()
            .with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
            .from_str(input)?;
        let mut rules = Rules::new();
        rules.name = raw.name;
        rules.desc = raw.desc;

        for ron_rule in raw.rules {
            if rules.rule(&ron_rule.name).is_some() {
                return Err(GrammarError::DuplicateRule(ron_rule.name));
            }
            let rule = convert_rule(ron_rule)?;
            rules.add(rule);
        }

        if let Some(top) = raw.top {
            rules.set_top(&top);
        } else if let Some(first) = rules.names().first().cloned() {
            rules.set_top(&first);
        }

        Ok(rules)
    }
}

fn convert_rule(raw: RonRule) -> Result<Rule, GrammarError> {
    let mut rule = Rule::new(&raw.name, raw.kind)
        .with_desc(&raw.desc)
        .with_state(State {
            entries: raw.state,
        });
    rule.items = convert_items(&raw.name, raw.items)?;
    Ok(rule)
}

fn convert_items(rule_name: &str, raw: Vec<RonItem>) -> Result<Vec<Item>, GrammarError> {
    let mut items = Vec::with_capacity(raw.len());
    for (i, ron_item) in raw.into_iter().enumerate() {
        let mut item = Item {
            prob: ron_item.prob,
            ..Item::default()
        };
        for text in &ron_item.elems {
            item.elems.push(parse_elem(rule_name, text)?);
        }
        for text in &ron_item.cond {
            item.conds.push(Cond::parse(text)?);
        }
        if let Some(sub_items) = ron_item.sub {
            let sub_name = format!("{rule_name}Item{i}{SUB_RULE_SUFFIX}");
            let mut sub = Rule::new(&sub_name, ron_item.sub_kind);
            sub.items = convert_items(&sub_name, sub_items)?;
            item.sub_rule = Some(Box::new(sub));
        }
        items.push(item);
    }
    Ok(items)
}

/// `'text'` is a literal token (`''` is silent); a bare name is a rule
/// reference.
fn parse_elem(rule_name: &str, text: &str) -> Result<Elem, GrammarError> {
    let invalid = || GrammarError::InvalidElem {
        rule: rule_name.to_string(),
        elem: text.to_string(),
    };
    if let Some(rest) = text.strip_prefix('\'') {
        let tok = rest.strip_suffix('\'').ok_or_else(invalid)?;
        return Ok(Elem::Token(tok.to_string()));
    }
    let name = text.trim();
    if name.is_empty() || name.contains(char::is_whitespace) || name.contains('\'') {
        return Err(invalid());
    }
    Ok(Elem::Rule(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: &str = r#"
        (
            top: "Sentence",
            rules: [
                (name: "Sentence", items: [(elems: ["Subject", "'runs'"])]),
                (name: "Subject", kind: Prob, items: [
                    (prob: 0.5, elems: ["'dog'"]),
                    (prob: 0.5, elems: ["'cat'"]),
                ]),
            ],
        )
    "#;

    #[test]
    fn parse_small_rule_set() {
        let rules = Rules::parse_ron(SMALL).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules.top(), Some("Sentence"));
        let subject = rules.rule("Subject").unwrap();
        assert_eq!(subject.rule_type, RuleType::Prob);
        assert_eq!(subject.items[1].prob, 0.5);
        assert!(rules.validate().is_empty());
    }

    #[test]
    fn optional_fields_written_bare() {
        let rules = Rules::parse_ron(
            r#"(
                top: "Gate",
                rules: [
                    (name: "Open", items: [(elems: ["'o'"])]),
                    (name: "Gate", kind: Cond, items: [
                        (cond: ["Open"], sub: [(elems: ["'through'"])]),
                    ]),
                ],
            )"#,
        )
        .unwrap();
        assert_eq!(rules.top(), Some("Gate"));
        let gate = rules.rule("Gate").unwrap();
        assert!(gate.items[0].sub_rule.is_some());
        assert!(rules.validate().is_empty());
    }

    #[test]
    fn explicit_some_still_accepted() {
        let rules = Rules::parse_ron(
            r#"(top: Some("A"), rules: [(name: "A", items: [(elems: ["'a'"])])])"#,
        )
        .unwrap();
        assert_eq!(rules.top(), Some("A"));
    }

    #[test]
    fn parse_elem_forms() {
        assert_eq!(parse_elem("R", "'hi'").unwrap(), Elem::Token("hi".to_string()));
        assert_eq!(parse_elem("R", "''").unwrap(), Elem::Token(String::new()));
        assert_eq!(parse_elem("R", "Noun").unwrap(), Elem::Rule("Noun".to_string()));
        assert!(parse_elem("R", "'open").is_err());
        assert!(parse_elem("R", "two words").is_err());
        assert!(parse_elem("R", "").is_err());
    }

    #[test]
    fn sub_items_become_inline_rule() {
        let rules = Rules::parse_ron(
            r#"(rules: [
                (name: "Mood", kind: Cond, items: [
                    (cond: ["Subject && !Other"], sub: [(elems: ["'ok'"])], sub_kind: Sequential),
                ]),
                (name: "Subject", items: [(elems: ["'x'"])]),
                (name: "Other", items: [(elems: ["'y'"])]),
            ])"#,
        )
        .unwrap();
        let mood = rules.rule("Mood").unwrap();
        let sub = mood.items[0].sub_rule.as_ref().unwrap();
        assert_eq!(sub.name, "MoodItem0SubRule");
        assert_eq!(sub.rule_type, RuleType::Sequential);
        assert!(sub.is_sub_rule());
        assert_eq!(rules.top(), Some("Mood"));
        assert!(rules.knows("MoodItem0SubRule"));
    }

    #[test]
    fn state_map_loaded() {
        let rules = Rules::parse_ron(
            r#"(rules: [(name: "A", state: {"last": "="}, items: [(elems: ["'a'"])])])"#,
        )
        .unwrap();
        assert_eq!(
            rules.rule("A").unwrap().state.entries.get("last").map(String::as_str),
            Some("=")
        );
    }

    #[test]
    fn duplicate_rule_rejected() {
        let err = Rules::parse_ron(
            r#"(rules: [
                (name: "A", items: [(elems: ["'a'"])]),
                (name: "A", items: [(elems: ["'b'"])]),
            ])"#,
        )
        .unwrap_err();
        assert!(matches!(err, GrammarError::DuplicateRule(ref n) if n == "A"));
    }

    #[test]
    fn bad_condition_rejected() {
        let err = Rules::parse_ron(
            r#"(rules: [(name: "A", kind: Cond, items: [(cond: ["A &&"], sub: [])])])"#,
        )
        .unwrap_err();
        assert!(matches!(err, GrammarError::CondParse(_)));
    }

    #[test]
    fn malformed_ron_rejected() {
        assert!(matches!(
            Rules::parse_ron("(rules: [ (name: ) ])"),
            Err(GrammarError::Ron(_))
        ));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = Rules::load_from_ron(Path::new("tests/fixtures/does_not_exist.ron")).unwrap_err();
        assert!(matches!(err, GrammarError::Io(_)));
    }
}
