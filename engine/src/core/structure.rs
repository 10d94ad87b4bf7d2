//! Structure-aware inserts: function/class bodies, decorators and imports.
//!
//! Two body styles are recognised. Indentation bodies open with a header line
//! ending in `:` (`def`, `class`). Brace bodies are delimited by `{ ... }`
//! (`function`, `fn`, brace-style `class`).

use std::str::FromStr;

use regex::Regex;

use crate::core::edit::{EditError, EditOutcome, TextBuffer, block_lines};

const DEFAULT_INDENT: &str = "    ";

/// Where inside a body a block lands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Position {
    Top,
    #[default]
    Bottom,
}

impl FromStr for Position {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "top" | "start" => Ok(Self::Top),
            "bottom" | "end" => Ok(Self::Bottom),
            other => Err(format!("unknown position '{other}' (expected top or bottom)")),
        }
    }
}

impl Position {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::Bottom => "bottom",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SymbolKind {
    Function,
    Class,
}

impl SymbolKind {
    fn label(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
        }
    }

    fn patterns(self, name: &str) -> Vec<Regex> {
        let name = regex::escape(name);
        let sources = match self {
            Self::Function => vec![
                format!(r"^\s*(async\s+)?def\s+{name}\s*\("),
                format!(r"^\s*(export\s+)?(default\s+)?(async\s+)?function\s*\*?\s+{name}\s*\("),
                format!(r"^\s*(pub(\([^)]*\))?\s+)?(const\s+)?(async\s+)?(unsafe\s+)?fn\s+{name}\b"),
            ],
            Self::Class => vec![format!(r"^\s*(export\s+)?(default\s+)?class\s+{name}\b")],
        };
        sources
            .iter()
            .filter_map(|source| Regex::new(source).ok())
            .collect()
    }
}

#[derive(Debug)]
enum Body {
    /// Header ends at `header_end`; the body is the following deeper-indented lines.
    Indented { header_end: usize },
    /// `{` opens on `open`, matching `}` on `close`.
    Braced { open: usize, close: usize },
}

/// Insert `block` into the body of function `name`.
pub fn insert_into_function(
    content: &str,
    name: &str,
    block: &str,
    position: Position,
) -> Result<EditOutcome, EditError> {
    insert_into(content, SymbolKind::Function, name, block, position)
}

/// Insert `block` into the body of class `name`.
pub fn insert_into_class(
    content: &str,
    name: &str,
    block: &str,
    position: Position,
) -> Result<EditOutcome, EditError> {
    insert_into(content, SymbolKind::Class, name, block, position)
}

fn insert_into(
    content: &str,
    kind: SymbolKind,
    name: &str,
    block: &str,
    position: Position,
) -> Result<EditOutcome, EditError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(EditError::SymbolNotFound {
            kind: kind.label(),
            name: String::new(),
        });
    }
    let mut buf = TextBuffer::parse(content);
    let def_idx = find_unique(&buf.lines, kind, name)?;
    let leading = indent_of(&buf.lines[def_idx]).to_string();
    let body = locate_body(&buf.lines, def_idx).ok_or_else(|| EditError::SymbolNotFound {
        kind: kind.label(),
        name: format!("{name} (body)"),
    })?;

    let (insert_idx, body_indent) = match body {
        Body::Indented { header_end } => {
            let body_indent = first_deeper_indent(&buf.lines, header_end + 1, buf.len(), &leading)
                .unwrap_or_else(|| format!("{leading}{DEFAULT_INDENT}"));
            let idx = match position {
                Position::Top => skip_docstring(&buf.lines, header_end + 1),
                Position::Bottom => last_indented_line(&buf.lines, header_end, &leading) + 1,
            };
            (idx, body_indent)
        }
        Body::Braced { open, close } => {
            let body_indent = first_deeper_indent(&buf.lines, open + 1, close, "")
                .unwrap_or_else(|| format!("{leading}{DEFAULT_INDENT}"));
            let idx = match position {
                Position::Top => open + 1,
                Position::Bottom => close,
            };
            (idx, body_indent)
        }
    };

    let new_lines = realign(block, &body_indent);
    let inserted = new_lines.len();
    buf.lines.splice(insert_idx..insert_idx, new_lines);
    Ok(EditOutcome::new(
        buf.render(),
        format!("inserted block into {} '{name}'", kind.label()),
    )
    .with(kind.label(), name)
    .with("position", position.as_str())
    .with("line_number", insert_idx + 1)
    .with("inserted_lines", inserted))
}

fn find_unique(lines: &[String], kind: SymbolKind, name: &str) -> Result<usize, EditError> {
    let patterns = kind.patterns(name);
    let matches: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| patterns.iter().any(|re| re.is_match(line)))
        .map(|(idx, _)| idx)
        .collect();
    match matches.as_slice() {
        [] => Err(EditError::SymbolNotFound {
            kind: kind.label(),
            name: name.to_string(),
        }),
        [idx] => Ok(*idx),
        many => Err(EditError::AmbiguousSymbol {
            kind: kind.label(),
            name: name.to_string(),
            count: many.len(),
        }),
    }
}

/// Decide the body style by scanning forward from the definition line for the
/// first `:` header terminator or `{` opener.
fn locate_body(lines: &[String], def_idx: usize) -> Option<Body> {
    for (idx, line) in lines.iter().enumerate().skip(def_idx) {
        let code = strip_line_comment(line).trim_end();
        if code.ends_with(':') {
            return Some(Body::Indented { header_end: idx });
        }
        if code.contains('{') {
            return brace_span(lines, idx).map(|(open, close)| Body::Braced { open, close });
        }
        if code.ends_with(';') {
            return None;
        }
    }
    None
}

fn brace_span(lines: &[String], start: usize) -> Option<(usize, usize)> {
    let mut depth = 0usize;
    let mut open = None;
    for (idx, line) in lines.iter().enumerate().skip(start) {
        for ch in strip_line_comment(line).chars() {
            match ch {
                '{' => {
                    depth += 1;
                    if open.is_none() {
                        open = Some(idx);
                    }
                }
                '}' if depth > 0 => {
                    depth -= 1;
                    if depth == 0 {
                        let open = open?;
                        // Single-line bodies have no room for an aligned insert.
                        return (idx > open).then_some((open, idx));
                    }
                }
                _ => {}
            }
        }
    }
    None
}

fn strip_line_comment(line: &str) -> &str {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') || trimmed.starts_with("//") {
        return "";
    }
    match [line.find("//"), line.find(" #")].into_iter().flatten().min() {
        Some(pos) => &line[..pos],
        None => line,
    }
}

fn indent_of(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}

fn first_deeper_indent(lines: &[String], from: usize, to: usize, leading: &str) -> Option<String> {
    lines
        .iter()
        .take(to)
        .skip(from)
        .find(|line| !line.trim().is_empty())
        .map(|line| indent_of(line))
        .filter(|indent| indent.len() > leading.len())
        .map(str::to_string)
}

fn last_indented_line(lines: &[String], header_end: usize, leading: &str) -> usize {
    let mut last = header_end;
    for (idx, line) in lines.iter().enumerate().skip(header_end + 1) {
        if line.trim().is_empty() {
            continue;
        }
        if indent_of(line).len() <= leading.len() {
            break;
        }
        last = idx;
    }
    last
}

fn skip_docstring(lines: &[String], body_start: usize) -> usize {
    let Some(first) = lines.get(body_start).map(|line| line.trim_start()) else {
        return body_start;
    };
    let Some(quote) = ["\"\"\"", "'''"].into_iter().find(|q| first.starts_with(q)) else {
        return body_start;
    };
    if first[quote.len()..].contains(quote) {
        return body_start + 1;
    }
    for (idx, line) in lines.iter().enumerate().skip(body_start + 1) {
        if line.contains(quote) {
            return idx + 1;
        }
    }
    body_start
}

/// Strip the block's common indentation and re-indent it to `indent`.
fn realign(block: &str, indent: &str) -> Vec<String> {
    let lines = block_lines(block);
    let common = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| indent_of(line).len())
        .min()
        .unwrap_or(0);
    lines
        .iter()
        .map(|line| {
            if line.trim().is_empty() {
                String::new()
            } else {
                format!("{indent}{}", line.get(common..).unwrap_or(line.trim_start()))
            }
        })
        .collect()
}

/// Add `decorator` above the first definition named `target`.
///
/// Existing decorators stay in place; the new one goes on top of the stack.
pub fn add_decorator(content: &str, target: &str, decorator: &str) -> Result<EditOutcome, EditError> {
    let target = target.trim();
    let decorator = decorator.trim();
    let decorator = if decorator.starts_with('@') {
        decorator.to_string()
    } else {
        format!("@{decorator}")
    };
    if target.is_empty() {
        return Err(EditError::NoDecoratorTarget);
    }

    let mut buf = TextBuffer::parse(content);
    let mut patterns = SymbolKind::Function.patterns(target);
    patterns.extend(SymbolKind::Class.patterns(target));
    let target_idx = buf
        .lines
        .iter()
        .position(|line| patterns.iter().any(|re| re.is_match(line)))
        .ok_or(EditError::NoDecoratorTarget)?;

    let mut insert_idx = target_idx;
    while insert_idx > 0 {
        let above = buf.lines[insert_idx - 1].trim_start();
        if !above.starts_with('@') {
            break;
        }
        if decorator_name(above) == decorator_name(&decorator) {
            return Err(EditError::DuplicateDecorator(decorator));
        }
        insert_idx -= 1;
    }

    let indent = indent_of(&buf.lines[target_idx]).to_string();
    buf.lines.insert(insert_idx, format!("{indent}{decorator}"));
    Ok(
        EditOutcome::new(buf.render(), format!("added decorator {decorator} to '{target}'"))
            .with("target", target)
            .with("decorator", decorator)
            .with("line_number", insert_idx + 1),
    )
}

fn decorator_name(line: &str) -> &str {
    let end = line.find(['(', ' ', '\t']).unwrap_or(line.len());
    &line[..end]
}

/// Ensure `symbol` is imported once.
///
/// A dotted `import_path` different from the symbol yields
/// `from <path> import <symbol>`; otherwise `import <symbol>`.
pub fn add_import(content: &str, symbol: &str, import_path: Option<&str>) -> Result<EditOutcome, EditError> {
    let symbol = symbol.trim();
    if symbol.is_empty() {
        return Err(EditError::EmptyNeedle);
    }
    let path = import_path.map(str::trim).filter(|p| !p.is_empty()).unwrap_or(symbol);

    let existing = Regex::new(&format!(
        r"^\s*(from\s+{path}\s+import\s+.*\b{sym}\b|import\s+.*\b{sym}\b)",
        path = regex::escape(path),
        sym = regex::escape(symbol),
    ))
    .map_err(|err| EditError::InvalidPattern(err.to_string()))?;

    let mut buf = TextBuffer::parse(content);
    if buf.lines.iter().any(|line| existing.is_match(line)) {
        return Err(EditError::DuplicateImport(symbol.to_string()));
    }

    let import_line = if path.contains('.') && path != symbol {
        format!("from {path} import {symbol}")
    } else {
        format!("import {symbol}")
    };

    let insert_idx = after_import_section(&buf.lines);
    buf.lines.insert(insert_idx, import_line.clone());
    Ok(
        EditOutcome::new(buf.render(), format!("imported '{symbol}' from '{path}'"))
            .with("symbol", symbol)
            .with("import_path", path)
            .with("import_line", import_line)
            .with("line_number", insert_idx + 1),
    )
}

/// Index just past the leading run of import lines, after any shebang or
/// encoding preamble. Falls back to just after the preamble.
fn after_import_section(lines: &[String]) -> usize {
    let mut idx = 0;
    while idx < lines.len() && (lines[idx].starts_with("#!") || lines[idx].to_lowercase().contains("coding")) {
        idx += 1;
    }
    let mut insert_idx = idx;
    while idx < lines.len() {
        let trimmed = lines[idx].trim_start();
        if !(trimmed.starts_with("import ") || trimmed.starts_with("from ")) {
            break;
        }
        idx += 1;
        insert_idx = idx;
    }
    insert_idx
}
