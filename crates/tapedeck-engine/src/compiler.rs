//! The compile front end: file-map splicing and validation
//!
//! Sources are tape-machine code plus two conveniences: `//` line comments
//! and C-style `#include "label"` directives resolved recursively against
//! the in-memory file map. Compilation splices includes, strips everything
//! that is not a command character, validates loop brackets, and, when the
//! generated-code toggle is on, eliminates command pairs that cancel out.

use std::collections::HashMap;

use tracing::debug;

use tapedeck_core::config::BuildConfig;
use tapedeck_core::engine::Compiler;
use tapedeck_core::error::{DeckError, DeckResult};

const COMMANDS: &str = "+-<>[].,^v";

/// Built-in compiler for tape-machine sources
#[derive(Debug, Clone, Copy, Default)]
pub struct TapeCompiler;

impl TapeCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl Compiler for TapeCompiler {
    fn compile(
        &self,
        file_map: &HashMap<String, String>,
        entry_label: &str,
        config: &BuildConfig,
    ) -> DeckResult<String> {
        debug!(
            entry_label,
            layout = config.grid_layout.label(),
            "assembling tape program"
        );
        let mut include_stack: Vec<String> = Vec::new();
        let spliced = splice(file_map, entry_label, &mut include_stack)?;

        let mut code: String = spliced.chars().filter(|c| COMMANDS.contains(*c)).collect();
        validate_brackets(&code)?;

        if config.optimise_generated_code {
            code = eliminate_inverse_pairs(code);
        }
        Ok(code)
    }
}

/// Resolve one document, splicing `#include` directives depth-first.
/// The stack of labels being expanded catches cycles.
fn splice(
    file_map: &HashMap<String, String>,
    label: &str,
    include_stack: &mut Vec<String>,
) -> DeckResult<String> {
    let text = file_map
        .get(label)
        .ok_or_else(|| DeckError::compile(format!("no document labeled \"{label}\"")))?;
    if include_stack.iter().any(|seen| seen == label) {
        return Err(DeckError::compile(format!(
            "include cycle through \"{label}\""
        )));
    }
    include_stack.push(label.to_string());

    let mut spliced = String::new();
    for line in text.lines() {
        let line = strip_comment(line);
        if let Some(directive) = line.trim_start().strip_prefix("#include") {
            let target = parse_include_target(directive.trim())?;
            spliced.push_str(&splice(file_map, target, include_stack)?);
        } else {
            spliced.push_str(line);
        }
        spliced.push('\n');
    }

    include_stack.pop();
    Ok(spliced)
}

fn strip_comment(line: &str) -> &str {
    match line.find("//") {
        Some(offset) => &line[..offset],
        None => line,
    }
}

/// The directive operand is the target label in double quotes
fn parse_include_target(operand: &str) -> DeckResult<&str> {
    operand
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .filter(|target| !target.is_empty())
        .ok_or_else(|| {
            DeckError::compile(format!("malformed #include directive: #include {operand}"))
        })
}

fn validate_brackets(code: &str) -> DeckResult<()> {
    let mut depth = 0usize;
    for (offset, instruction) in code.chars().enumerate() {
        match instruction {
            '[' => depth += 1,
            ']' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| DeckError::compile(format!("unmatched ] at offset {offset}")))?;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(DeckError::compile("unmatched [ in program"));
    }
    Ok(())
}

/// Remove adjacent command pairs that cancel out, to a fixpoint
fn eliminate_inverse_pairs(code: String) -> String {
    const PAIRS: [(char, char); 6] = [
        ('+', '-'),
        ('-', '+'),
        ('<', '>'),
        ('>', '<'),
        ('^', 'v'),
        ('v', '^'),
    ];
    let mut current: Vec<char> = code.chars().collect();
    loop {
        let mut next: Vec<char> = Vec::with_capacity(current.len());
        let mut removed = false;
        let mut index = 0;
        while index < current.len() {
            let pair = current
                .get(index + 1)
                .map(|&b| (current[index], b))
                .filter(|p| PAIRS.contains(p));
            if pair.is_some() {
                index += 2;
                removed = true;
            } else {
                next.push(current[index]);
                index += 1;
            }
        }
        current = next;
        if !removed {
            break;
        }
    }
    current.into_iter().collect()
}
