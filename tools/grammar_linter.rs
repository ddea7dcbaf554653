/// Grammar Linter — validates rule-definition files.
///
/// Usage: grammar_linter <rules_file_or_dir>

use std::collections::HashSet;
use std::path::Path;
use std::process;
use stochastic_grammar::core::item::Elem;
use stochastic_grammar::core::rule::{Rule, RuleType};
use stochastic_grammar::core::rules::Rules;

/// Rounding allowance when checking that weights sum to one.
const WEIGHT_SLACK: f32 = 1e-5;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: grammar_linter <rules_file_or_dir>");
        process::exit(0);
    }

    let rules_dir = &args[1];
    let mut rules = Rules::new();
    let rules_path = Path::new(rules_dir);

    if rules_path.is_file() {
        match Rules::load_from_ron(rules_path) {
            Ok(loaded) => rules.merge(loaded),
            Err(e) => {
                eprintln!("ERROR: Failed to load rules file: {}", e);
                process::exit(1);
            }
        }
    } else if rules_path.is_dir() {
        load_rules_recursive(rules_path, &mut rules);
    } else {
        eprintln!("ERROR: Path '{}' does not exist", rules_dir);
        process::exit(1);
    }

    println!("Loaded {} rules", rules.len());

    let errors: Vec<String> = rules.validate().iter().map(|e| e.to_string()).collect();
    let mut warnings = Vec::new();
    lint_rules(&rules, &mut warnings);

    println!("\n=== Rules Lint Report ===\n");

    if errors.is_empty() && warnings.is_empty() {
        println!("All checks passed!");
    }

    for warning in &warnings {
        println!("WARNING: {}", warning);
    }

    for error in &errors {
        println!("ERROR: {}", error);
    }

    println!(
        "\nSummary: {} errors, {} warnings",
        errors.len(),
        warnings.len()
    );

    if errors.is_empty() {
        process::exit(0);
    } else {
        process::exit(1);
    }
}

fn load_rules_recursive(dir: &Path, rules: &mut Rules) {
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                load_rules_recursive(&path, rules);
            } else if path.extension().and_then(|s| s.to_str()) == Some("ron") {
                match Rules::load_from_ron(&path) {
                    Ok(loaded) => {
                        println!("  Loaded: {}", path.display());
                        rules.merge(loaded);
                    }
                    Err(e) => {
                        eprintln!("  ERROR loading {}: {}", path.display(), e);
                    }
                }
            }
        }
    }
}

fn lint_rules(rules: &Rules, warnings: &mut Vec<String>) {
    // Rules the top rule can never reach
    if let Some(top) = rules.top() {
        let mut reached = HashSet::new();
        if let Some(rule) = rules.rule(top) {
            reached.insert(top.to_string());
            mark_reachable(rule, rules, &mut reached);
        }
        for name in rules.names() {
            if !reached.contains(name) {
                warnings.push(format!("Rule '{}' is unreachable from top rule '{}'", name, top));
            }
        }
    }

    for name in rules.names() {
        let Some(rule) = rules.rule(name) else {
            continue;
        };
        lint_rule(rule, warnings);
    }
}

fn lint_rule(rule: &Rule, warnings: &mut Vec<String>) {
    if rule.rule_type == RuleType::Prob {
        let total: f32 = rule.items.iter().map(|it| it.prob).sum();
        if total < 1.0 - WEIGHT_SLACK {
            warnings.push(format!(
                "Rule '{}' weights sum to {}; output is empty {:.0}% of the time",
                rule.name,
                total,
                (1.0 - total) * 100.0
            ));
        } else if total > 1.0 + WEIGHT_SLACK {
            warnings.push(format!(
                "Rule '{}' weights sum to {}; trailing items are under-selected",
                rule.name, total
            ));
        }
    }

    // Direct self-reference in every item never terminates
    let self_ref = |elems: &[Elem]| elems.iter().any(|e| matches!(e, Elem::Rule(r) if *r == rule.name));
    if !rule.items.is_empty() && rule.items.iter().all(|it| self_ref(&it.elems)) {
        warnings.push(format!(
            "Rule '{}' has no non-recursive item (infinite recursion)",
            rule.name
        ));
    }

    for item in &rule.items {
        if let Some(sub) = &item.sub_rule {
            lint_rule(sub, warnings);
        }
    }
}

fn mark_reachable(rule: &Rule, rules: &Rules, reached: &mut HashSet<String>) {
    for item in &rule.items {
        for elem in &item.elems {
            if let Elem::Rule(name) = elem {
                if reached.insert(name.clone()) {
                    if let Some(next) = rules.rule(name) {
                        mark_reachable(next, rules, reached);
                    }
                }
            }
        }
        if let Some(sub) = &item.sub_rule {
            mark_reachable(sub, rules, reached);
        }
    }
}
