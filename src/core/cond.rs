/// Condition expressions — gate conditional items on fired rules and state.

use std::fmt;

use crate::core::grammar::GrammarError;
use crate::core::rules::Rules;

/// A boolean expression evaluated against the current expansion pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Cond {
    /// True if the named rule has fired in the current pass.
    Fired(String),
    /// True if the state map holds `value` for `key`.
    StateIs { key: String, value: String },
    Not(Box<Cond>),
    And(Vec<Cond>),
    Or(Vec<Cond>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Term(String),
    StateTerm(String, String),
    And,
    Or,
    Not,
    Open,
    Close,
}

impl Cond {
    /// Parse a condition expression.
    ///
    /// Syntax:
    /// - `Name` → `Fired`
    /// - `key=value` → `StateIs`
    /// - `!x`, `x && y`, `x || y`, `(x)`; `&&` binds tighter than `||`
    pub fn parse(input: &str) -> Result<Cond, GrammarError> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(GrammarError::CondParse("empty condition".to_string()));
        }
        let mut pos = 0;
        let cond = parse_or(&tokens, &mut pos)?;
        if pos != tokens.len() {
            return Err(GrammarError::CondParse(format!(
                "unexpected {:?} in '{}'",
                tokens[pos], input
            )));
        }
        Ok(cond)
    }

    /// Evaluate against the fired set and state map of `rules`.
    pub fn eval(&self, rules: &Rules) -> bool {
        match self {
            Cond::Fired(name) => rules.has_fired(name),
            Cond::StateIs { key, value } => rules.state(key) == Some(value.as_str()),
            Cond::Not(inner) => !inner.eval(rules),
            Cond::And(terms) => terms.iter().all(|c| c.eval(rules)),
            Cond::Or(terms) => terms.iter().any(|c| c.eval(rules)),
        }
    }

    /// Names of all rules this expression tests for having fired.
    pub fn rule_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_names(&mut names);
        names
    }

    fn collect_names<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Cond::Fired(name) => names.push(name),
            Cond::StateIs { .. } => {}
            Cond::Not(inner) => inner.collect_names(names),
            Cond::And(terms) | Cond::Or(terms) => {
                for t in terms {
                    t.collect_names(names);
                }
            }
        }
    }
}

fn is_term_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')
}

fn tokenize(input: &str) -> Result<Vec<Token>, GrammarError> {
    let chars: Vec<char> = input.chars().collect();
    let len = chars.len();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < len {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' => i += 1,
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '&' | '|' => {
                if i + 1 >= len || chars[i + 1] != c {
                    return Err(GrammarError::CondParse(format!(
                        "expected '{c}{c}' at position {i}"
                    )));
                }
                tokens.push(if c == '&' { Token::And } else { Token::Or });
                i += 2;
            }
            _ if is_term_char(c) => {
                let start = i;
                while i < len && is_term_char(chars[i]) {
                    i += 1;
                }
                let name: String = chars[start..i].iter().collect();
                if i < len && chars[i] == '=' {
                    i += 1;
                    let vstart = i;
                    while i < len && is_term_char(chars[i]) {
                        i += 1;
                    }
                    if vstart == i {
                        return Err(GrammarError::CondParse(format!(
                            "missing value for state '{name}'"
                        )));
                    }
                    let value: String = chars[vstart..i].iter().collect();
                    tokens.push(Token::StateTerm(name, value));
                } else {
                    tokens.push(Token::Term(name));
                }
            }
            _ => {
                return Err(GrammarError::CondParse(format!(
                    "unexpected character '{c}' in '{input}'"
                )));
            }
        }
    }

    Ok(tokens)
}

fn parse_or(tokens: &[Token], pos: &mut usize) -> Result<Cond, GrammarError> {
    let mut terms = vec![parse_and(tokens, pos)?];
    while tokens.get(*pos) == Some(&Token::Or) {
        *pos += 1;
        terms.push(parse_and(tokens, pos)?);
    }
    Ok(if terms.len() == 1 {
        terms.remove(0)
    } else {
        Cond::Or(terms)
    })
}

fn parse_and(tokens: &[Token], pos: &mut usize) -> Result<Cond, GrammarError> {
    let mut terms = vec![parse_unary(tokens, pos)?];
    while tokens.get(*pos) == Some(&Token::And) {
        *pos += 1;
        terms.push(parse_unary(tokens, pos)?);
    }
    Ok(if terms.len() == 1 {
        terms.remove(0)
    } else {
        Cond::And(terms)
    })
}

fn parse_unary(tokens: &[Token], pos: &mut usize) -> Result<Cond, GrammarError> {
    let tok = tokens
        .get(*pos)
        .ok_or_else(|| GrammarError::CondParse("unexpected end of condition".to_string()))?;
    *pos += 1;
    match tok {
        Token::Not => Ok(Cond::Not(Box::new(parse_unary(tokens, pos)?))),
        Token::Open => {
            let inner = parse_or(tokens, pos)?;
            if tokens.get(*pos) != Some(&Token::Close) {
                return Err(GrammarError::CondParse("unclosed parenthesis".to_string()));
            }
            *pos += 1;
            Ok(inner)
        }
        Token::Term(name) => Ok(Cond::Fired(name.clone())),
        Token::StateTerm(key, value) => Ok(Cond::StateIs {
            key: key.clone(),
            value: value.clone(),
        }),
        other => Err(GrammarError::CondParse(format!("unexpected {other:?}"))),
    }
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cond::Fired(name) => write!(f, "{name}"),
            Cond::StateIs { key, value } => write!(f, "{key}={value}"),
            Cond::Not(inner) => match inner.as_ref() {
                Cond::And(_) | Cond::Or(_) => write!(f, "!({inner})"),
                _ => write!(f, "!{inner}"),
            },
            Cond::And(terms) => {
                for (i, t) in terms.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" && ")?;
                    }
                    // Or binds looser; keep it grouped.
                    if matches!(t, Cond::Or(_)) {
                        write!(f, "({t})")?;
                    } else {
                        write!(f, "{t}")?;
                    }
                }
                Ok(())
            }
            Cond::Or(terms) => {
                for (i, t) in terms.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" || ")?;
                    }
                    write!(f, "{t}")?;
                }
                Ok(())
            }
        }
    }
}
