//! Section-level parsing of domain and problem documents.
//!
//! A domain document is a `Start Domain:` / `End Domain` envelope holding
//! the `Entities:`, `Variables:`, `Actions:`, `EnvSteps:` and `IterStep:`
//! sections in that order. A problem document is a `Start Problem:` /
//! `End Problem` envelope of `Name: values` entries, split into iteration
//! batches by lines holding a single `*`.

use crate::ast::*;
use crate::error::{LoadError, LoadResult, ParseError, ParseResult};
use crate::parser::parse_expr;
use crate::statement::{check_identifier, parse_cost, parse_updates, scan_blocks, SourceLine};
use crate::symbols::{Scope, SlotKind, SymbolTable};
use crate::token::Span;
use tracing::debug;

/// Split text into trimmed, non-empty lines with `#` comments removed.
pub fn source_lines(source: &str) -> Vec<SourceLine> {
    source
        .lines()
        .enumerate()
        .filter_map(|(i, raw)| {
            let code = raw.split('#').next().unwrap_or("");
            let trimmed = code.trim();
            if trimmed.is_empty() {
                return None;
            }
            let lead = code[..code.len() - code.trim_start().len()].chars().count();
            Some(SourceLine::new(trimmed, i as u32 + 1, lead as u32 + 1))
        })
        .collect()
}

/// Strip the `Start <kind>:` / `End <kind>` envelope.
fn envelope<'a>(lines: &'a [SourceLine], kind: &str) -> ParseResult<&'a [SourceLine]> {
    let start = format!("Start {}:", kind);
    let end = format!("End {}", kind);
    let Some(first) = lines.first() else {
        return Err(ParseError::syntax(
            format!("empty document, expected '{}'", start),
            Span::new(0, 0, 1, 1),
        ));
    };
    if first.text != start && first.text != start.trim_end_matches(':') {
        return Err(ParseError::syntax(
            format!("expected '{}'", start),
            first.span(),
        ));
    }
    let Some(close) = lines.iter().position(|l| l.text == end) else {
        return Err(ParseError::syntax(
            format!("missing '{}'", end),
            first.span(),
        ));
    };
    if let Some(extra) = lines.get(close + 1) {
        return Err(ParseError::syntax(
            format!("unexpected content after '{}'", end),
            extra.span(),
        ));
    }
    Ok(&lines[1..close])
}

/// Sections of a domain document, in their required order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Section {
    Entities,
    Variables,
    Actions,
    EnvSteps,
    IterStep,
}

impl Section {
    const ALL: [Section; 5] = [
        Section::Entities,
        Section::Variables,
        Section::Actions,
        Section::EnvSteps,
        Section::IterStep,
    ];

    fn name(&self) -> &'static str {
        match self {
            Section::Entities => "Entities",
            Section::Variables => "Variables",
            Section::Actions => "Actions",
            Section::EnvSteps => "EnvSteps",
            Section::IterStep => "IterStep",
        }
    }

    fn from_header(text: &str) -> Option<Section> {
        let name = text.strip_suffix(':').unwrap_or(text);
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    fn from_end(text: &str) -> Option<Section> {
        let name = text.strip_prefix("End ")?;
        Self::ALL.into_iter().find(|s| s.name() == name)
    }
}

fn split_sections(lines: &[SourceLine]) -> LoadResult<Vec<(Section, Vec<SourceLine>)>> {
    let mut sections: Vec<(Section, Vec<SourceLine>)> = Vec::new();
    let mut open = false;

    for line in lines {
        if let Some(section) = Section::from_header(&line.text) {
            if let Some((last, _)) = sections.last() {
                if *last >= section {
                    return Err(LoadError::new(
                        "domain",
                        section.name(),
                        ParseError::syntax(
                            format!("section '{}' is repeated or out of order", section.name()),
                            line.span(),
                        ),
                    ));
                }
            }
            sections.push((section, Vec::new()));
            open = true;
            continue;
        }

        if let Some(section) = Section::from_end(&line.text) {
            match sections.last() {
                Some((last, _)) if open && *last == section => {
                    open = false;
                    continue;
                }
                _ => {
                    return Err(LoadError::new(
                        "domain",
                        section.name(),
                        ParseError::syntax(
                            format!("'End {}' without a matching header", section.name()),
                            line.span(),
                        ),
                    ))
                }
            }
        }

        match sections.last_mut() {
            Some((_, body)) if open => body.push(line.clone()),
            _ => {
                return Err(LoadError::new(
                    "domain",
                    "Domain",
                    ParseError::syntax("line outside of any section", line.span()),
                ))
            }
        }
    }

    Ok(sections)
}

/// Parse a domain document.
pub fn parse_domain(source: &str) -> LoadResult<Domain> {
    let lines = source_lines(source);
    let body = envelope(&lines, "Domain").map_err(|e| LoadError::new("domain", "Domain", e))?;
    let sections = split_sections(body)?;

    let mut domain = Domain {
        symbols: SymbolTable::new(),
        variables: Vec::new(),
        items: Vec::new(),
        actions: Vec::new(),
        env_steps: Vec::new(),
        iter_steps: Vec::new(),
    };

    for (section, lines) in &sections {
        let at = |e: ParseError| LoadError::new("domain", section.name(), e);
        match section {
            Section::Entities => parse_entities(lines, &mut domain.symbols).map_err(at)?,
            Section::Variables => {
                let (items, variables) =
                    parse_variables(lines, &mut domain.symbols).map_err(at)?;
                domain.items = items;
                domain.variables = variables;
            }
            Section::Actions => {
                domain.actions = parse_actions(lines, &domain.symbols).map_err(at)?;
            }
            Section::EnvSteps => {
                domain.env_steps = parse_steps(lines, &domain.symbols).map_err(at)?;
            }
            Section::IterStep => {
                domain.iter_steps = parse_steps(lines, &domain.symbols).map_err(at)?;
            }
        }
    }

    debug!(
        entities = domain.entities().len(),
        variables = domain.variables.len(),
        collections = domain.items.len(),
        actions = domain.actions.len(),
        env_steps = domain.env_steps.len(),
        iter_steps = domain.iter_steps.len(),
        "loaded domain"
    );
    Ok(domain)
}

// === Entities ===

fn parse_entities(lines: &[SourceLine], symbols: &mut SymbolTable) -> ParseResult<()> {
    for line in lines {
        for (start, end) in split_top_level(&line.text) {
            let entry = line.slice(start, end);
            if entry.text.is_empty() {
                continue;
            }
            let (name, role) = match entry.text.find('(') {
                Some(paren) if entry.text.ends_with(')') => {
                    let role = entry.slice(paren + 1, entry.text.len() - 1).text;
                    (entry.slice(0, paren).text, Some(role))
                }
                Some(_) => {
                    return Err(ParseError::syntax(
                        "expected ')' after the base role",
                        entry.span(),
                    ))
                }
                None => (entry.text.clone(), None),
            };
            if name.is_empty() {
                return Err(ParseError::syntax("missing entity name", entry.span()));
            }
            if symbols.define_entity(name.clone(), role, line.line).is_none() {
                return Err(ParseError::syntax(
                    format!("entity '{}' is declared twice", name),
                    entry.span(),
                ));
            }
        }
    }
    Ok(())
}

// === Variables ===

fn parse_variables(
    lines: &[SourceLine],
    symbols: &mut SymbolTable,
) -> ParseResult<(Vec<ItemsDecl>, Vec<VarDecl>)> {
    // Item collections first, so variable owners can be checked for dynamic types.
    let mut items = Vec::new();
    for line in lines {
        if let Some(rest) = strip_word(&line.text, "items") {
            items.push(parse_items(line, rest, symbols)?);
        }
    }

    let mut variables = Vec::new();
    let mut const_slots = 0;
    let mut var_slots = 0;
    for line in lines {
        if strip_word(&line.text, "items").is_some() {
            continue;
        }
        let (constant, rest) = if let Some(rest) = strip_word(&line.text, "const") {
            (true, rest)
        } else if let Some(rest) = strip_word(&line.text, "var") {
            (false, rest)
        } else {
            return Err(ParseError::syntax(
                "expected a 'const', 'var' or 'items' declaration",
                line.span(),
            ));
        };

        let slot = if constant { &mut const_slots } else { &mut var_slots };
        let decl = parse_var_decl(line, rest, constant, *slot, symbols)?;
        *slot += 1;

        let var = if constant {
            VarRef::Const(decl.slot)
        } else {
            VarRef::Var(decl.slot)
        };
        if !symbols.define_variable(decl.name.clone(), var, decl.kind) {
            return Err(ParseError::syntax(
                format!("variable '{}' is declared twice", decl.name),
                line.span(),
            ));
        }
        variables.push(decl);
    }

    Ok((items, variables))
}

fn strip_word<'a>(text: &'a str, word: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(word)?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim())
    } else {
        None
    }
}

/// Split `<name words> [KIND]` into the name and the kind (INT by default).
fn name_and_kind(words: &[&str]) -> (String, ValueKind) {
    match words.split_last() {
        Some((last, rest)) if !rest.is_empty() => match ValueKind::from_keyword(last) {
            Some(kind) => (rest.join(" "), kind),
            None => (words.join(" "), ValueKind::Int),
        },
        _ => (words.join(" "), ValueKind::Int),
    }
}

fn parse_var_decl(
    line: &SourceLine,
    rest: &str,
    constant: bool,
    slot: usize,
    symbols: &SymbolTable,
) -> ParseResult<VarDecl> {
    let span = line.span();
    let mut rest = rest.trim();

    let mut role = None;
    if rest.ends_with(')') {
        let paren = rest
            .rfind('(')
            .ok_or_else(|| ParseError::syntax("unbalanced ')' in declaration", span))?;
        role = Some(rest[paren + 1..rest.len() - 1].trim().to_string());
        rest = rest[..paren].trim();
    }

    let mut owner = None;
    if let Some((left, right)) = rest.rsplit_once('-') {
        let owner_name = right.trim();
        let entity = symbols
            .lookup_entity(owner_name)
            .ok_or_else(|| ParseError::UnknownEntity {
                name: owner_name.to_string(),
                span,
            })?;
        if symbols.collection_of(entity).is_some() {
            return Err(ParseError::syntax(
                format!(
                    "'{}' is a dynamic entity; declare its data as an items field",
                    owner_name
                ),
                span,
            ));
        }
        owner = Some(entity);
        rest = left.trim();
    }

    let words: Vec<&str> = rest.split_whitespace().collect();
    let (name, kind) = name_and_kind(&words);
    if name.is_empty() {
        return Err(ParseError::syntax("missing variable name", span));
    }

    Ok(VarDecl {
        name,
        kind,
        constant,
        owner,
        role,
        slot,
        line: line.line,
    })
}

fn parse_items(line: &SourceLine, rest: &str, symbols: &mut SymbolTable) -> ParseResult<ItemsDecl> {
    let span = line.span();
    let cleaned = rest.replace(',', " ");
    let words: Vec<&str> = cleaned.split_whitespace().collect();
    let is_group_start = |w: &&str| *w == "var" || *w == "const";

    let first_group = words.iter().position(is_group_start).ok_or_else(|| {
        ParseError::syntax("expected 'var' or 'const' fields after the entity name", span)
    })?;
    let entity_name = words[..first_group].join(" ");
    let entity = symbols
        .lookup_entity(&entity_name)
        .ok_or_else(|| ParseError::UnknownEntity {
            name: entity_name.clone(),
            span,
        })?;

    let mut fields = Vec::new();
    let mut const_slots = 0;
    let mut var_slots = 0;
    let mut i = first_group;
    while i < words.len() {
        let constant = words[i] == "const";
        let end = words[i + 1..]
            .iter()
            .position(is_group_start)
            .map(|p| i + 1 + p)
            .unwrap_or(words.len());
        let (name, kind) = name_and_kind(&words[i + 1..end]);
        if name.is_empty() {
            return Err(ParseError::syntax("missing field name", span));
        }
        let slot = if constant { &mut const_slots } else { &mut var_slots };
        fields.push(FieldDecl {
            name,
            kind,
            constant,
            slot: *slot,
        });
        *slot += 1;
        i = end;
    }

    let collection = symbols
        .define_collection(entity, fields.len())
        .ok_or_else(|| {
            ParseError::syntax(
                format!("entity '{}' already has an items declaration", entity_name),
                span,
            )
        })?;
    for field in &fields {
        let var = VarRef::Field {
            collection,
            field: field.slot,
            constant: field.constant,
        };
        if !symbols.define_variable(field.name.clone(), var, field.kind) {
            return Err(ParseError::syntax(
                format!("field '{}' is declared twice", field.name),
                span,
            ));
        }
    }

    Ok(ItemsDecl {
        entity,
        collection,
        fields,
        line: line.line,
    })
}

// === Actions ===

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Subsection {
    Precs,
    PrecsAdd,
    Confs,
    ConfsAdd,
    Effects,
    EffectsAdd,
    Cost,
}

impl Subsection {
    fn from_header(text: &str) -> Option<Subsection> {
        Some(match text {
            "Precs:" => Subsection::Precs,
            "PrecsAdd:" => Subsection::PrecsAdd,
            "Confs:" => Subsection::Confs,
            "ConfsAdd:" => Subsection::ConfsAdd,
            "Effects:" => Subsection::Effects,
            "EffectsAdd:" => Subsection::EffectsAdd,
            "Cost:" => Subsection::Cost,
            _ => return None,
        })
    }
}

/// Split a block body into labelled subsections. Lines before the first
/// label go to `default`, or are an error when there is none.
fn subsections(
    lines: &[SourceLine],
    default: Option<Subsection>,
) -> ParseResult<Vec<(Subsection, Vec<SourceLine>)>> {
    let mut out: Vec<(Subsection, Vec<SourceLine>)> = Vec::new();
    for line in lines {
        if let Some(sub) = Subsection::from_header(&line.text) {
            if out.iter().any(|(s, _)| *s == sub) {
                return Err(ParseError::syntax(
                    format!("duplicate '{}' subsection", line.text),
                    line.span(),
                ));
            }
            out.push((sub, Vec::new()));
            continue;
        }
        match (out.last_mut(), default) {
            (Some((_, body)), _) => body.push(line.clone()),
            (None, Some(sub)) => out.push((sub, vec![line.clone()])),
            (None, None) => {
                return Err(ParseError::syntax(
                    "expected a subsection header such as 'Precs:' or 'Effects:'",
                    line.span(),
                ))
            }
        }
    }
    Ok(out)
}

/// Collect the lines up to `terminator`, returning them and the index after it.
fn block_until<'a>(
    lines: &'a [SourceLine],
    start: usize,
    terminator: &str,
) -> ParseResult<(&'a [SourceLine], usize)> {
    let header = &lines[start];
    let end = lines[start + 1..]
        .iter()
        .position(|l| l.text == terminator)
        .map(|p| start + 1 + p)
        .ok_or_else(|| {
            ParseError::syntax(
                format!("'{}' is not closed by '{}'", header.text, terminator),
                header.span(),
            )
        })?;
    Ok((&lines[start + 1..end], end + 1))
}

fn parse_actions(lines: &[SourceLine], symbols: &SymbolTable) -> ParseResult<Vec<ActionDecl>> {
    let mut actions: Vec<ActionDecl> = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let header = &lines[i];
        let (body, next) = block_until(lines, i, "End Action")?;
        let action = parse_action(header, body, symbols, &actions)?;
        if actions.iter().any(|a| a.name == action.name) {
            return Err(ParseError::syntax(
                format!("action '{}' is declared twice", action.name),
                header.span(),
            ));
        }
        actions.push(action);
        i = next;
    }
    Ok(actions)
}

fn parse_action(
    header: &SourceLine,
    body: &[SourceLine],
    symbols: &SymbolTable,
    earlier: &[ActionDecl],
) -> ParseResult<ActionDecl> {
    let colon = header.text.find(':').ok_or_else(|| {
        ParseError::syntax("expected 'Name: parameters' action header", header.span())
    })?;
    let name = header.slice(0, colon).text;
    if name.is_empty() {
        return Err(ParseError::syntax("missing action name", header.span()));
    }

    let mut params_line = header.tail(colon + 1);
    let mut tag = None;
    if params_line.text.ends_with(')') {
        let paren = params_line.text.rfind('(').ok_or_else(|| {
            ParseError::syntax("unbalanced ')' in action header", params_line.span())
        })?;
        tag = Some(params_line.slice(paren + 1, params_line.text.len() - 1).text);
        params_line = params_line.slice(0, paren);
    }

    let parent = tag
        .as_deref()
        .and_then(|t| earlier.iter().find(|a| a.name == t));
    let mut action = match parent {
        Some(parent) => ActionDecl {
            name,
            base_action: parent.base_action.clone(),
            parent: Some(parent.name.clone()),
            line: header.line,
            ..parent.clone()
        },
        None => ActionDecl {
            name,
            base_action: tag,
            parent: None,
            params: Vec::new(),
            preconditions: Vec::new(),
            conflicts: Vec::new(),
            effects: Vec::new(),
            cost: CostExpr::zero(),
            line: header.line,
        },
    };

    // Inherited parameters keep their slots; new ones are appended.
    for (start, end) in split_top_level(&params_line.text) {
        let entry = params_line.slice(start, end);
        if entry.text.is_empty() {
            continue;
        }
        let (param_name, entity_name) = entry
            .text
            .split_once('-')
            .map(|(n, e)| (n.trim(), e.trim()))
            .ok_or_else(|| {
                ParseError::syntax("expected '<param> - <EntityType>'", entry.span())
            })?;
        check_identifier(param_name, entry.span())?;
        let entity = symbols
            .lookup_entity(entity_name)
            .ok_or_else(|| ParseError::UnknownEntity {
                name: entity_name.to_string(),
                span: entry.span(),
            })?;
        match action.params.iter().find(|p| p.name == param_name) {
            Some(existing) if existing.entity == entity => {}
            Some(_) => {
                return Err(ParseError::syntax(
                    format!(
                        "parameter '{}' is redeclared with a different entity type",
                        param_name
                    ),
                    entry.span(),
                ))
            }
            None => action.params.push(ParamDecl {
                name: param_name.to_string(),
                entity,
            }),
        }
    }
    if action.params.is_empty() {
        return Err(ParseError::syntax(
            format!("action '{}' needs at least one parameter", action.name),
            header.span(),
        ));
    }

    let mut scope = Scope::new();
    for param in &action.params {
        scope.push(param.name.clone(), SlotKind::Entity(param.entity));
    }

    for (sub, lines) in subsections(body, None)? {
        match sub {
            Subsection::Precs => {
                action.preconditions = parse_conditions(&lines, symbols, &scope)?;
            }
            Subsection::PrecsAdd => {
                let more = parse_conditions(&lines, symbols, &scope)?;
                action.preconditions.extend(more);
            }
            Subsection::Confs => action.conflicts = parse_conditions(&lines, symbols, &scope)?,
            Subsection::ConfsAdd => {
                let more = parse_conditions(&lines, symbols, &scope)?;
                action.conflicts.extend(more);
            }
            Subsection::Effects => {
                action.effects = parse_updates(&scan_blocks(&lines)?, symbols, &scope)?.0;
            }
            Subsection::EffectsAdd => {
                let (more, _) = parse_updates(&scan_blocks(&lines)?, symbols, &scope)?;
                action.effects.extend(more);
            }
            Subsection::Cost => {
                action.cost = parse_cost(&scan_blocks(&lines)?, symbols, &scope)?;
            }
        }
    }

    Ok(action)
}

fn parse_conditions(
    lines: &[SourceLine],
    symbols: &SymbolTable,
    scope: &Scope,
) -> ParseResult<Vec<Expr>> {
    lines
        .iter()
        .map(|l| parse_expr(&l.text, l.line, l.column, symbols, scope))
        .collect()
}

// === Environment and iteration steps ===

fn parse_steps(lines: &[SourceLine], symbols: &SymbolTable) -> ParseResult<Vec<StepDecl>> {
    let mut steps = Vec::new();
    let mut i = 0;
    let scope = Scope::new();
    while i < lines.len() {
        let header = &lines[i];
        let name = header
            .text
            .strip_suffix(':')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ParseError::syntax("expected a 'Name:' step header", header.span()))?;
        let (body, next) = block_until(lines, i, "End Step")?;

        let mut step = StepDecl {
            name: name.to_string(),
            effects: Vec::new(),
            cost: CostExpr::zero(),
            line: header.line,
        };
        for (sub, lines) in subsections(body, Some(Subsection::Effects))? {
            let blocks = scan_blocks(&lines)?;
            match sub {
                Subsection::Effects | Subsection::EffectsAdd => {
                    step.effects.extend(parse_updates(&blocks, symbols, &scope)?.0);
                }
                Subsection::Cost => step.cost = parse_cost(&blocks, symbols, &scope)?,
                _ => {
                    let line = lines.first().unwrap_or(header);
                    return Err(ParseError::syntax(
                        "steps take no preconditions",
                        line.span(),
                    ));
                }
            }
        }
        steps.push(step);
        i = next;
    }
    Ok(steps)
}

// === Problems ===

/// Parse a problem document.
pub fn parse_problem(source: &str) -> LoadResult<Problem> {
    let lines = source_lines(source);
    let at = |e: ParseError| LoadError::new("problem", "Problem", e);
    let body = envelope(&lines, "Problem").map_err(at)?;

    let mut batches: Vec<Vec<ProblemEntry>> = vec![Vec::new()];
    let mut current: Option<ProblemEntry> = None;

    for line in body {
        if line.text == "*" {
            if let Some(entry) = current.take() {
                push_entry(&mut batches, entry);
            }
            batches.push(Vec::new());
            continue;
        }

        if is_entry_header(&line.text) {
            if let Some(entry) = current.take() {
                push_entry(&mut batches, entry);
            }
            current = Some(parse_entry_header(line).map_err(at)?);
            continue;
        }

        let entry = current.as_mut().ok_or_else(|| {
            at(ParseError::syntax(
                "value line outside of a 'Name:' entry",
                line.span(),
            ))
        })?;
        entry.values.push(parse_value_line(line).map_err(at)?);
    }
    if let Some(entry) = current.take() {
        push_entry(&mut batches, entry);
    }

    let mut batches = batches.into_iter();
    let problem = Problem {
        initial: batches.next().unwrap_or_default(),
        iterations: batches.collect(),
    };
    debug!(
        entries = problem.initial.len(),
        iterations = problem.iterations.len(),
        "loaded problem"
    );
    Ok(problem)
}

fn push_entry(batches: &mut Vec<Vec<ProblemEntry>>, entry: ProblemEntry) {
    if let Some(batch) = batches.last_mut() {
        batch.push(entry);
    }
}

fn is_entry_header(text: &str) -> bool {
    text.starts_with(char::is_alphabetic) && text.contains(':')
}

fn parse_entry_header(line: &SourceLine) -> ParseResult<ProblemEntry> {
    let colon = line.text.find(':').unwrap_or(line.text.len());
    let name = line.slice(0, colon).text;
    let inline = line.tail((colon + 1).min(line.text.len()));
    let mut values = Vec::new();
    for (start, end) in split_top_level(&inline.text) {
        let part = inline.slice(start, end);
        if part.text.is_empty() {
            continue;
        }
        values.push(InitValue {
            index: None,
            value: parse_literal(&part)?,
            line: line.line,
        });
    }
    Ok(ProblemEntry {
        name,
        values,
        line: line.line,
    })
}

/// `k. value` or a bare value.
fn parse_value_line(line: &SourceLine) -> ParseResult<InitValue> {
    let digits = line.text.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 && line.text[digits..].starts_with('.') {
        let index = line.text[..digits]
            .parse::<usize>()
            .map_err(|_| ParseError::syntax("index out of range", line.span()))?;
        let value = line.tail(digits + 1);
        return Ok(InitValue {
            index: Some(index),
            value: parse_literal(&value)?,
            line: line.line,
        });
    }
    Ok(InitValue {
        index: None,
        value: parse_literal(line)?,
        line: line.line,
    })
}

/// Byte ranges of the comma-separated parts of `text`, ignoring commas
/// nested in brackets.
fn split_top_level(text: &str) -> Vec<(usize, usize)> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' | '{' | '[' => depth += 1,
            ')' | '}' | ']' => depth -= 1,
            ',' if depth == 0 => {
                parts.push((start, i));
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push((start, text.len()));
    parts
}

/// Reader for problem literals: integers, booleans, `{...}` sets,
/// `[k:v ...]` maps and `(...)` item rows.
struct LiteralReader<'a> {
    line: &'a SourceLine,
    text: &'a str,
    pos: usize,
}

/// Parse a single literal spanning the whole line.
pub fn parse_literal(line: &SourceLine) -> ParseResult<Literal> {
    let mut reader = LiteralReader {
        line,
        text: &line.text,
        pos: 0,
    };
    let literal = reader.literal()?;
    reader.skip_separators(false);
    if reader.pos < reader.text.len() {
        return Err(reader.error("unexpected text after value"));
    }
    Ok(literal)
}

impl<'a> LiteralReader<'a> {
    fn error(&self, message: &str) -> ParseError {
        let column = self.line.column + self.text[..self.pos].chars().count() as u32;
        ParseError::syntax(
            message,
            Span::new(self.pos, self.pos + 1, self.line.line, column),
        )
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn skip_separators(&mut self, commas: bool) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() || (commas && c == ',') {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
    }

    fn expect(&mut self, c: char) -> ParseResult<()> {
        self.skip_separators(false);
        if self.peek() == Some(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", c)))
        }
    }

    fn literal(&mut self) -> ParseResult<Literal> {
        self.skip_separators(false);
        match self.peek() {
            Some('{') => {
                self.pos += 1;
                let mut elements = Vec::new();
                loop {
                    self.skip_separators(true);
                    if self.peek() == Some('}') {
                        self.pos += 1;
                        return Ok(Literal::Set(elements));
                    }
                    elements.push(self.integer()?);
                }
            }
            Some('[') => {
                self.pos += 1;
                let mut pairs = Vec::new();
                loop {
                    self.skip_separators(true);
                    if self.peek() == Some(']') {
                        self.pos += 1;
                        return Ok(Literal::Map(pairs));
                    }
                    let key = self.integer()?;
                    self.expect(':')?;
                    self.skip_separators(false);
                    let value = self.integer()?;
                    pairs.push((key, value));
                }
            }
            Some('(') => {
                self.pos += 1;
                let mut fields = vec![self.literal()?];
                loop {
                    self.skip_separators(false);
                    match self.peek() {
                        Some(',') => {
                            self.pos += 1;
                            fields.push(self.literal()?);
                        }
                        Some(')') => {
                            self.pos += 1;
                            return Ok(Literal::Tuple(fields));
                        }
                        _ => return Err(self.error("expected ',' or ')'")),
                    }
                }
            }
            Some(c) if c.is_alphabetic() => {
                let word: String = self.text[self.pos..]
                    .chars()
                    .take_while(|c| c.is_alphanumeric())
                    .collect();
                let value = match word.to_ascii_lowercase().as_str() {
                    "true" => true,
                    "false" => false,
                    _ => return Err(self.error("expected a value")),
                };
                self.pos += word.len();
                Ok(Literal::Bool(value))
            }
            _ => self.integer().map(Literal::Int),
        }
    }

    fn integer(&mut self) -> ParseResult<i64> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.pos += 1;
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let text = self.text;
        match text[start..self.pos].parse::<i64>() {
            Ok(n) => Ok(n),
            Err(_) => {
                self.pos = start;
                Err(self.error("expected an integer"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOMAIN: &str = "\
Start Domain:
Entities:
Vehicle (Truck), Location, Package
End Entities
Variables:
var charge INT - Vehicle
const adjacent MULTY - Location (adjacency)
var location - Vehicle (location)
var delivered
items Package var package onEntity INT, const package destination INT
End Variables
Actions:
Move: v - Vehicle, l - Location (Drive)
Precs:
adjacent (location v) ? l
Effects:
location v: l
Cost:
1
End Action
Deliver: v - Vehicle, p - Package
Precs:
package onEntity p = v
Effects:
Package remove: p
delivered: delivered + 1
End Action
End Actions
EnvSteps:
Drain:
All (v - Vehicle):
charge v: charge v - 1
End
End Step
End EnvSteps
End Domain
";

    #[test]
    fn test_source_lines_strip_comments() {
        let lines = source_lines("  a # comment\n\n# only comment\nb");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "a");
        assert_eq!(lines[0].column, 3);
        assert_eq!(lines[1].line, 4);
    }

    #[test]
    fn test_parse_domain_sections() {
        let domain = parse_domain(DOMAIN).unwrap();
        assert_eq!(domain.entities().len(), 3);
        assert_eq!(domain.entities()[0].base_role.as_deref(), Some("Truck"));
        assert_eq!(domain.entities()[2].collection, Some(0));

        assert_eq!(domain.variables.len(), 4);
        let adjacent = &domain.variables[1];
        assert!(adjacent.constant);
        assert_eq!(adjacent.kind, ValueKind::Multy);
        assert_eq!(adjacent.role.as_deref(), Some("adjacency"));
        assert_eq!(domain.variables[2].kind, ValueKind::Int);
        assert_eq!(domain.variables[3].owner, None);

        assert_eq!(domain.items.len(), 1);
        assert_eq!(domain.items[0].fields.len(), 2);
        assert_eq!(domain.items[0].fields[0].name, "package onEntity");
        assert!(domain.items[0].fields[1].constant);

        assert_eq!(domain.actions.len(), 2);
        let moving = domain.action("Move").unwrap();
        assert_eq!(moving.base_action.as_deref(), Some("Drive"));
        assert_eq!(moving.params.len(), 2);
        assert_eq!(moving.cost.value, Expr::Int(1));

        assert_eq!(domain.env_steps.len(), 1);
        assert!(matches!(
            domain.env_steps[0].effects[0],
            Update::ForAllEntities { .. }
        ));
    }

    #[test]
    fn test_inheritance_keeps_parent_slots() {
        let source = DOMAIN.replace(
            "End Actions",
            "DeliverAt: l - Location, v - Vehicle (Deliver)\nPrecsAdd:\nlocation v = l\nEnd Action\nEnd Actions",
        );
        let domain = parse_domain(&source).unwrap();
        let child = domain.action("DeliverAt").unwrap();
        assert_eq!(child.parent.as_deref(), Some("Deliver"));
        let names: Vec<_> = child.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["v", "p", "l"]);
        assert_eq!(child.preconditions.len(), 2);
        assert_eq!(child.effects.len(), 2);
    }

    #[test]
    fn test_inheritance_rejects_retyped_parameter() {
        let source = DOMAIN.replace(
            "End Actions",
            "Bad: p - Location (Deliver)\nEnd Action\nEnd Actions",
        );
        assert!(parse_domain(&source).is_err());
    }

    #[test]
    fn test_error_names_section_and_line() {
        let source = DOMAIN.replace("package onEntity p = v", "package onEntity p = fuel");
        let err = parse_domain(&source).unwrap_err();
        assert_eq!(err.section, "Actions");
        assert_eq!(err.line, 23);
        assert!(matches!(err.source, ParseError::UnknownVariable { .. }));
    }

    #[test]
    fn test_envelope_errors() {
        assert!(parse_domain("Entities:\nA\nEnd Domain").is_err());
        assert!(parse_domain("Start Domain:\nEntities:\nA").is_err());
        assert!(parse_domain("Start Domain:\nEnd Domain\nextra").is_err());
    }

    #[test]
    fn test_sections_must_be_ordered() {
        let err = parse_domain("Start Domain:\nVariables:\nEntities:\nEnd Domain").unwrap_err();
        assert_eq!(err.line, 3);
    }

    #[test]
    fn test_unterminated_action() {
        let err = parse_domain(
            "Start Domain:\nEntities:\nA\nActions:\nGo: a - A\nPrecs:\ntrue\nEnd Domain",
        )
        .unwrap_err();
        assert_eq!(err.section, "Actions");
        assert_eq!(err.line, 5);
    }

    #[test]
    fn test_action_needs_a_parameter() {
        assert!(parse_domain("Start Domain:\nActions:\nIdle:\nEnd Action\nEnd Domain").is_err());
    }

    #[test]
    fn test_dynamic_owner_rejected() {
        let source = DOMAIN.replace("var delivered\n", "var weight - Package\n");
        assert!(parse_domain(&source).is_err());
    }

    const PROBLEM: &str = "\
Start Problem:
Vehicle: 2
Location: 3
charge: 5, 5
delivered: 0
adjacent:
0. {1}
1. {0 2}
2. {1}
Package:
(0, 2)
(1, 0)
*
Package: (0, 1)
*
Package:
(1, 1)
End Problem
";

    #[test]
    fn test_parse_problem() {
        let problem = parse_problem(PROBLEM).unwrap();
        assert_eq!(problem.initial.len(), 6);
        assert_eq!(problem.iterations.len(), 2);

        let charge = &problem.initial[2];
        assert_eq!(charge.name, "charge");
        assert_eq!(charge.values.len(), 2);

        let adjacent = &problem.initial[4];
        assert_eq!(adjacent.values[1].index, Some(1));
        assert_eq!(adjacent.values[1].value, Literal::Set(vec![0, 2]));

        let packages = &problem.initial[5];
        assert_eq!(
            packages.values[0].value,
            Literal::Tuple(vec![Literal::Int(0), Literal::Int(2)])
        );
        assert_eq!(problem.iterations[0][0].values.len(), 1);
    }

    #[test]
    fn test_literals() {
        let lit = |text: &str| parse_literal(&SourceLine::new(text, 1, 1));
        assert_eq!(lit("-4").unwrap(), Literal::Int(-4));
        assert_eq!(lit("TRUE").unwrap(), Literal::Bool(true));
        assert_eq!(lit("{}").unwrap(), Literal::Set(vec![]));
        assert_eq!(lit("[1:4, 2:5]").unwrap(), Literal::Map(vec![(1, 4), (2, 5)]));
        assert_eq!(
            lit("({1 2}, false)").unwrap(),
            Literal::Tuple(vec![Literal::Set(vec![1, 2]), Literal::Bool(false)])
        );
        assert!(lit("{1 x}").is_err());
        assert!(lit("3 4").is_err());
        assert!(lit("maybe").is_err());
    }

    #[test]
    fn test_value_outside_entry() {
        let err = parse_problem("Start Problem:\n5\nEnd Problem").unwrap_err();
        assert_eq!(err.line, 2);
    }
}
