//! Line-indexed edits. All line numbers are 1-based.

use crate::core::edit::{EditError, EditOutcome, TextBuffer, block_lines};

/// Insert `text` so that it starts at line `line`.
///
/// Accepts `1..=line_count + 1`; the upper sentinel appends at end of file.
pub fn insert_before_line(content: &str, line: usize, text: &str) -> Result<EditOutcome, EditError> {
    let mut buf = TextBuffer::parse(content);
    check_insert_index(line, buf.len())?;
    let inserted = splice_in(&mut buf, line - 1, text);
    Ok(EditOutcome::new(buf.render(), format!("inserted {inserted} line(s) before line {line}"))
        .with("line_number", line)
        .with("inserted_lines", inserted))
}

/// Insert `text` directly after line `line`.
///
/// `line = 0` is rejected; `line_count + 1` is accepted as an append.
pub fn insert_after_line(content: &str, line: usize, text: &str) -> Result<EditOutcome, EditError> {
    let mut buf = TextBuffer::parse(content);
    check_insert_index(line, buf.len())?;
    let at = line.min(buf.len());
    let inserted = splice_in(&mut buf, at, text);
    Ok(EditOutcome::new(buf.render(), format!("inserted {inserted} line(s) after line {line}"))
        .with("line_number", line)
        .with("inserted_lines", inserted))
}

/// Insert a multi-line block so that its first line becomes line `line`.
pub fn insert_block_at_line(content: &str, line: usize, block: &str) -> Result<EditOutcome, EditError> {
    let mut buf = TextBuffer::parse(content);
    check_insert_index(line, buf.len())?;
    let inserted = splice_in(&mut buf, line - 1, block);
    Ok(EditOutcome::new(buf.render(), format!("inserted block of {inserted} line(s) at line {line}"))
        .with("line_number", line)
        .with("inserted_lines", inserted))
}

/// Delete the inclusive range `start..=end`.
pub fn delete_line_range(content: &str, start: usize, end: usize) -> Result<EditOutcome, EditError> {
    let mut buf = TextBuffer::parse(content);
    check_range(start, end, buf.len())?;
    buf.lines.drain(start - 1..end);
    let removed = end - start + 1;
    Ok(EditOutcome::new(buf.render(), format!("deleted lines {start}-{end}"))
        .with("start_line", start)
        .with("end_line", end)
        .with("removed_lines", removed))
}

/// Replace the inclusive range `start..=end` with `block`.
pub fn replace_block(content: &str, start: usize, end: usize, block: &str) -> Result<EditOutcome, EditError> {
    let mut buf = TextBuffer::parse(content);
    check_range(start, end, buf.len())?;
    let new_lines = block_lines(block);
    let inserted = new_lines.len();
    buf.lines.splice(start - 1..end, new_lines);
    Ok(EditOutcome::new(buf.render(), format!("replaced lines {start}-{end}"))
        .with("start_line", start)
        .with("end_line", end)
        .with("inserted_lines", inserted))
}

/// Remove the inclusive range `start..=end` (block-oriented alias of [`delete_line_range`]).
pub fn remove_block(content: &str, start: usize, end: usize) -> Result<EditOutcome, EditError> {
    let mut outcome = delete_line_range(content, start, end)?;
    outcome.summary = format!("removed block {start}-{end}");
    Ok(outcome)
}

/// Prepend `block` to the document.
pub fn insert_at_top(content: &str, block: &str) -> Result<EditOutcome, EditError> {
    let mut buf = TextBuffer::parse(content);
    let inserted = splice_in(&mut buf, 0, block);
    Ok(EditOutcome::new(buf.render(), "inserted block at top").with("inserted_lines", inserted))
}

/// Append `block` to the document, starting on a fresh line.
pub fn insert_at_bottom(content: &str, block: &str) -> Result<EditOutcome, EditError> {
    let mut buf = TextBuffer::parse(content);
    let at = buf.len();
    let inserted = splice_in(&mut buf, at, block);
    Ok(EditOutcome::new(buf.render(), "inserted block at bottom").with("inserted_lines", inserted))
}

fn splice_in(buf: &mut TextBuffer, index: usize, block: &str) -> usize {
    let new_lines = block_lines(block);
    let count = new_lines.len();
    buf.lines.splice(index..index, new_lines);
    count
}

fn check_insert_index(line: usize, line_count: usize) -> Result<(), EditError> {
    let max = line_count + 1;
    if line == 0 || line > max {
        return Err(EditError::LineOutOfRange {
            line,
            line_count,
            max,
        });
    }
    Ok(())
}

fn check_range(start: usize, end: usize, line_count: usize) -> Result<(), EditError> {
    if start > end {
        return Err(EditError::RangeInverted { start, end });
    }
    if start == 0 || end > line_count {
        return Err(EditError::RangeOutOfBounds {
            start,
            end,
            line_count,
        });
    }
    Ok(())
}
