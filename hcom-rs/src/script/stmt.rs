//! HCOM statement tree and script-level parser.
//!
//! A script is a sequence of lines.  Blank lines and `#` comments are
//! dropped; block keywords (`if`/`else`/`endif`, `while`/`repeat`,
//! `foreach`/`endforeach`, `define`/`enddefine`) nest; every other line is a
//! command handed to the dispatcher.  [`parse_prefix`] keeps the statements
//! read before a broken construct so a caller can run them and report the
//! error where the construct starts.

use std::collections::HashMap;
use std::rc::Rc;

use crate::error::HcomError;

use super::text::{split_word, strip_redundant_parens};

/// A parsed HCOM statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Any line that is not a control keyword.
    Command(String),
    /// `&name`
    Label(String),
    /// `goto name`
    Goto(String),
    /// `stop`
    Stop,
    /// `define name` … `enddefine`
    Define {
        name: String,
        lines: Vec<String>,
        body: Rc<Script>,
    },
    /// `if(cond)` … [`else` …] `endif`
    If {
        cond: String,
        then_block: Vec<Stmt>,
        else_block: Vec<Stmt>,
    },
    /// `while(cond)` … `repeat`
    While { cond: String, body: Vec<Stmt> },
    /// `foreach var filter` … `endforeach`.  The body is re-parsed for every
    /// match after `$var` substitution; `body` is the unsubstituted parse.
    Foreach {
        var: String,
        filter: String,
        lines: Vec<String>,
        body: Vec<Stmt>,
    },
}

/// A parsed script plus its label index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    pub stmts: Vec<Stmt>,
    /// Label → index of the top-level statement where execution resumes.
    labels: HashMap<String, usize>,
}

impl Script {
    /// Where a `goto label` resumes.  A top-level label resumes right after
    /// itself; a label nested inside a block resumes at that block's
    /// top-level statement.
    pub fn label_target(&self, label: &str) -> Option<usize> {
        self.labels.get(label).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }

    fn index_labels(&mut self) {
        for (i, stmt) in self.stmts.iter().enumerate() {
            if let Stmt::Label(name) = stmt {
                self.labels.insert(name.clone(), i + 1);
                continue;
            }
            let mut nested = Vec::new();
            collect_labels(stmt, &mut nested);
            for name in nested {
                self.labels.entry(name).or_insert(i);
            }
        }
    }
}

fn collect_labels(stmt: &Stmt, out: &mut Vec<String>) {
    let blocks: Vec<&Vec<Stmt>> = match stmt {
        Stmt::If {
            then_block,
            else_block,
            ..
        } => vec![then_block, else_block],
        Stmt::While { body, .. } | Stmt::Foreach { body, .. } => vec![body],
        _ => return,
    };
    for block in blocks {
        for s in block {
            match s {
                Stmt::Label(name) => out.push(name.clone()),
                other => collect_labels(other, out),
            }
        }
    }
}

// ── Parser ────────────────────────────────────────────────────────────────────

/// Parse HCOM script text into a [`Script`].
pub fn parse_script(src: &str) -> Result<Script, HcomError> {
    parse_lines(src.lines())
}

/// Parse pre-split lines (function and foreach bodies).
pub fn parse_lines<I, S>(lines: I) -> Result<Script, HcomError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    match parse_prefix(lines) {
        (script, None) => Ok(script),
        (_, Some(e)) => Err(e),
    }
}

/// Parse top-level statements up to the first broken construct.
///
/// Returns everything before it together with the error; the broken
/// construct and all lines after it are dropped.
pub fn parse_prefix<I, S>(lines: I) -> (Script, Option<HcomError>)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let stmts: Vec<String> = lines
        .into_iter()
        .map(|l| l.as_ref().trim().to_owned())
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .collect();
    let mut parser = StmtParser { stmts, pos: 0 };
    let mut script = Script::default();
    let mut error = None;
    while let Some(line) = parser.peek().map(str::to_owned) {
        parser.pos += 1;
        match parser.parse_one(&line) {
            Ok(stmt) => script.stmts.push(stmt),
            Err(e) => {
                error = Some(e);
                break;
            }
        }
    }
    script.index_labels();
    (script, error)
}

struct StmtParser {
    stmts: Vec<String>,
    pos: usize,
}

impl StmtParser {
    fn peek(&self) -> Option<&str> {
        self.stmts.get(self.pos).map(String::as_str)
    }

    /// Parse statements until one of the terminator keywords.  The
    /// terminator is left unconsumed.
    fn parse_block_until(&mut self, stop_at: &[&str]) -> Result<Vec<Stmt>, HcomError> {
        let mut stmts = Vec::new();
        while let Some(line) = self.peek().map(str::to_owned) {
            if stop_at.contains(&keyword(&line)) {
                break;
            }
            self.pos += 1;
            stmts.push(self.parse_one(&line)?);
        }
        Ok(stmts)
    }

    /// Consume the expected terminator or fail with `missing`.
    fn expect(&mut self, terminator: &str, missing: &str) -> Result<String, HcomError> {
        match self.peek() {
            Some(line) if keyword(line) == terminator => {
                let line = line.to_owned();
                self.pos += 1;
                Ok(line)
            }
            _ => Err(HcomError::Syntax(missing.to_owned())),
        }
    }

    fn parse_one(&mut self, line: &str) -> Result<Stmt, HcomError> {
        if let Some(label) = line.strip_prefix('&') {
            return Ok(Stmt::Label(label.trim().to_owned()));
        }
        if let Some(cond) = block_condition(line, "if") {
            return self.parse_if(cond);
        }
        if let Some(cond) = block_condition(line, "while") {
            return self.parse_while(cond);
        }
        let (word, rest) = split_word(line);
        match word {
            "goto" => Ok(Stmt::Goto(rest.trim().to_owned())),
            "stop" if rest.is_empty() => Ok(Stmt::Stop),
            "define" if !rest.is_empty() => self.parse_define(rest.trim()),
            "foreach" if !rest.is_empty() => self.parse_foreach(rest),
            _ => Ok(Stmt::Command(line.to_owned())),
        }
    }

    fn parse_if(&mut self, cond: String) -> Result<Stmt, HcomError> {
        const MISSING: &str = "Missing ENDIF in if-statement.";
        let then_block = self.parse_block_until(&["else", "endif"])?;
        let else_block = if self.peek().map(keyword) == Some("else") {
            self.pos += 1;
            self.parse_block_until(&["endif"])?
        } else {
            Vec::new()
        };
        self.expect("endif", MISSING)?;
        Ok(Stmt::If {
            cond,
            then_block,
            else_block,
        })
    }

    fn parse_while(&mut self, cond: String) -> Result<Stmt, HcomError> {
        let body = self.parse_block_until(&["repeat"])?;
        self.expect("repeat", "Missing REPEAT in while loop.")?;
        Ok(Stmt::While { cond, body })
    }

    fn parse_foreach(&mut self, rest: &str) -> Result<Stmt, HcomError> {
        let (var, filter) = split_word(rest);
        let start = self.pos;
        let body = self.parse_block_until(&["endforeach"])?;
        let lines = self.stmts[start..self.pos].to_vec();
        self.expect("endforeach", "Missing ENDFOREACH in foreach loop.")?;
        Ok(Stmt::Foreach {
            var: var.to_owned(),
            filter: filter.trim().to_owned(),
            lines,
            body,
        })
    }

    fn parse_define(&mut self, name: &str) -> Result<Stmt, HcomError> {
        let start = self.pos;
        let stmts = self.parse_block_until(&["enddefine"])?;
        let lines = self.stmts[start..self.pos].to_vec();
        self.expect("enddefine", "Missing ENDDEFINE in function definition.")?;
        let mut body = Script {
            stmts,
            labels: HashMap::new(),
        };
        body.index_labels();
        Ok(Stmt::Define {
            name: name.to_owned(),
            lines,
            body: Rc::new(body),
        })
    }
}

// ── Small utilities ───────────────────────────────────────────────────────────

/// First word of a line, used to spot terminators.
fn keyword(line: &str) -> &str {
    split_word(line).0
}

/// `if(cond)`, `if (cond)` → `cond` with one level of redundant parentheses
/// removed.  `None` if the line does not open such a block.
fn block_condition(line: &str, word: &str) -> Option<String> {
    let rest = line.strip_prefix(word)?;
    let rest = rest.trim_start();
    if !rest.starts_with('(') {
        return None;
    }
    Some(strip_redundant_parens(rest).to_owned())
}
