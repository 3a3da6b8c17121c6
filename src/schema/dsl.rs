//! Parser for the SCRT schema DSL (`spec.md` §4.6).
//!
//! The grammar is line-oriented and directive-prefixed:
//!
//! - `@schema[:Name]` begins a schema block; if no name is given inline,
//!   the next non-empty, non-comment line supplies it.
//! - `@field Name Type [attrs...]` declares one field. A `fields:` line
//!   instead opens a block where every following non-directive line is a
//!   `Name Type [attrs...]` field declaration, until the next `@`
//!   directive.
//! - `@Name`, where `Name` is an already-declared schema, opens a data
//!   section for that schema: every following non-directive line is a
//!   comma-separated row.
//! - `#` starts a line comment; empty lines are ignored; every line is
//!   trimmed before classification.

use std::collections::HashSet;

use crate::error::{Error, Result, SchemaError};
use crate::kind::FieldKind;
use crate::row::SlotValue;
use crate::schema::field::parse_default_literal;
use crate::schema::{Document, DocumentBuilder, Field};

enum Mode {
    Top,
    /// Collecting `Name Type [attrs...]` lines for the named schema until
    /// the next `@` directive.
    FieldsBlock(String),
    /// Collecting comma-separated data rows for the named schema until
    /// the next `@` directive.
    Data(String),
}

/// Parses `text` into a finalized [`Document`].
pub fn parse(text: &str) -> Result<Document> {
    let mut builder = DocumentBuilder::new();
    let mut declared: HashSet<String> = HashSet::new();
    let mut mode = Mode::Top;
    let mut current: Option<(String, Vec<Field>)> = None;
    let mut awaiting_schema_name = false;

    let lines: Vec<&str> = text.lines().collect();
    let mut i = 0usize;
    while i < lines.len() {
        let line_no = i + 1;
        let raw = lines[i];
        i += 1;
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }

        if awaiting_schema_name {
            let name = line.to_string();
            current = Some((name.clone(), Vec::new()));
            declared.insert(name);
            awaiting_schema_name = false;
            mode = Mode::Top;
            continue;
        }

        if let Some(rest) = line.strip_prefix("@schema") {
            flush_schema(&mut builder, &mut current)?;
            let rest = rest.trim();
            if let Some(name) = rest.strip_prefix(':') {
                let name = name.trim().to_string();
                current = Some((name.clone(), Vec::new()));
                declared.insert(name);
                mode = Mode::Top;
            } else if rest.is_empty() {
                awaiting_schema_name = true;
            } else {
                return Err(parse_err(line_no, format!("malformed @schema directive: `{line}`")));
            }
            continue;
        }

        if let Some(rest) = line.strip_prefix("@field ") {
            let schema_name = current
                .as_ref()
                .map(|(n, _)| n.clone())
                .ok_or_else(|| parse_err(line_no, "@field directive outside of a @schema block"))?;
            let field = parse_field_line(rest, line_no)?;
            current.as_mut().unwrap().1.push(field);
            let _ = schema_name;
            continue;
        }

        if line == "fields:" {
            let schema_name = current
                .as_ref()
                .map(|(n, _)| n.clone())
                .ok_or_else(|| parse_err(line_no, "fields: directive outside of a @schema block"))?;
            mode = Mode::FieldsBlock(schema_name);
            continue;
        }

        if let Some(rest) = line.strip_prefix('@') {
            let name = rest.split_whitespace().next().unwrap_or(rest).to_string();
            if declared.contains(&name) {
                flush_schema(&mut builder, &mut current)?;
                mode = Mode::Data(name);
                continue;
            }
            return Err(parse_err(
                line_no,
                format!("`@{name}` does not refer to a previously declared schema"),
            ));
        }

        match &mode {
            Mode::FieldsBlock(schema_name) => {
                let field = parse_field_line(line, line_no)?;
                match &mut current {
                    Some((name, fields)) if name == schema_name => fields.push(field),
                    _ => {
                        return Err(parse_err(
                            line_no,
                            format!("field line for `{schema_name}` found outside its schema block"),
                        ))
                    }
                }
            }
            Mode::Data(schema_name) => {
                parse_data_row(&mut builder, schema_name, line, line_no)?;
            }
            Mode::Top => {
                return Err(parse_err(line_no, format!("unexpected line outside any block: `{line}`")));
            }
        }
    }
    flush_schema(&mut builder, &mut current)?;
    builder.finalize()
}

fn flush_schema(builder: &mut DocumentBuilder, current: &mut Option<(String, Vec<Field>)>) -> Result<()> {
    if let Some((name, fields)) = current.take() {
        builder.add_schema(name, fields)?;
    }
    Ok(())
}

fn parse_err(line: usize, reason: impl Into<String>) -> Error {
    Error::Schema(SchemaError::Parse {
        line,
        reason: reason.into(),
    })
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// Splits the first whitespace-delimited token off `s`, returning
/// `(token, rest)` with `rest` left untrimmed-of-leading-space handled by
/// the caller.
fn split_first_token(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(idx) => (&s[..idx], s[idx..].trim_start()),
        None => (s, ""),
    }
}

/// Parses a `Name Type [attrs...]` field declaration line.
fn parse_field_line(line: &str, line_no: usize) -> Result<Field> {
    let (name, rest) = split_first_token(line);
    if name.is_empty() {
        return Err(parse_err(line_no, "field declaration is missing a name"));
    }
    let (raw_type, rest) = split_first_token(rest);
    if raw_type.is_empty() {
        return Err(parse_err(line_no, format!("field `{name}` is missing a type")));
    }
    let attrs = tokenize_attrs(rest);

    let mut field = if let Some(target) = raw_type.strip_prefix("ref:") {
        let mut parts = target.splitn(2, ':');
        let target_schema = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| parse_err(line_no, format!("malformed ref type `{raw_type}` on field `{name}`")))?;
        let target_field = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| parse_err(line_no, format!("malformed ref type `{raw_type}` on field `{name}`")))?;
        Field::new_ref(name, raw_type, target_schema, target_field)
    } else {
        let kind = FieldKind::parse_primitive(raw_type)
            .ok_or_else(|| Error::Schema(SchemaError::UnknownKind {
                field: name.to_string(),
                token: raw_type.to_string(),
            }))?;
        Field::new(name, raw_type, kind)
    };

    let mut auto_increment = false;
    let mut default_literal: Option<String> = None;
    let mut kept_attrs = Vec::new();
    for attr in attrs {
        let lower = attr.to_ascii_lowercase();
        if matches!(lower.as_str(), "auto_increment" | "autoincrement" | "serial") {
            auto_increment = true;
        } else if let Some(value) = lower.strip_prefix("default=").or_else(|| lower.strip_prefix("default:")) {
            // Re-derive from the original-case token so quoted string casing
            // and hex digits are preserved; `lower` is only used to locate
            // the prefix boundary.
            let original_value = &attr[lower.find(value).map(|_| attr.len() - value.len()).unwrap_or(0)..];
            default_literal = Some(original_value.to_string());
        } else {
            kept_attrs.push(lower);
        }
    }

    if auto_increment {
        field = field.with_auto_increment();
    }
    field = field.with_attributes(kept_attrs);
    if let Some(literal) = default_literal {
        if field.is_ref() {
            field = field.with_default_literal(literal);
        } else {
            let default = parse_default_literal(field.resolved_kind(), &literal)
                .map_err(|reason| parse_err(line_no, format!("field `{name}`: {reason}")))?;
            field = field.with_default(default);
        }
    }
    Ok(field)
}

/// Splits an attribute remainder string on commas, pipes, and whitespace,
/// treating any `"`/`'`/`` ` ``-quoted span as a single atomic token so
/// `default="hello world"` survives intact.
fn tokenize_attrs(s: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for ch in s.chars() {
        if let Some(q) = quote {
            current.push(ch);
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' | '`' => {
                quote = Some(ch);
                current.push(ch);
            }
            ',' | '|' | ' ' | '\t' => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(ch),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Splits a data row line on top-level commas (commas inside a quoted
/// span do not split).
fn split_row_cells(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for ch in line.chars() {
        if let Some(q) = quote {
            current.push(ch);
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' | '`' => {
                quote = Some(ch);
                current.push(ch);
            }
            ',' => cells.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    cells.push(current);
    cells.into_iter().map(|c| c.trim().to_string()).collect()
}

fn parse_data_row(
    builder: &mut DocumentBuilder,
    schema_name: &str,
    line: &str,
    line_no: usize,
) -> Result<()> {
    let schema_fields = builder
        .schema_field_meta(schema_name)
        .ok_or_else(|| parse_err(line_no, format!("data row for unknown schema `{schema_name}`")))?;

    let mut explicit: Vec<(String, String)> = Vec::new();
    let mut positional: Vec<String> = Vec::new();
    for cell in split_row_cells(line) {
        if let Some(rest) = cell.strip_prefix('@') {
            let mut parts = rest.splitn(2, '=');
            let field_name = parts.next().unwrap_or_default().trim().to_string();
            let value = parts.next().unwrap_or_default().trim().to_string();
            explicit.push((field_name, value));
        } else {
            positional.push(cell);
        }
    }

    let explicit_names: HashSet<&str> = explicit.iter().map(|(n, _)| n.as_str()).collect();
    for (name, _) in &explicit {
        if !schema_fields.iter().any(|f| f.0 == *name) {
            return Err(Error::Schema(SchemaError::UnknownField {
                schema: schema_name.to_string(),
                field: name.clone(),
            }));
        }
    }

    let remaining_fields: Vec<&(String, bool)> = schema_fields
        .iter()
        .filter(|(name, _)| !explicit_names.contains(name.as_str()))
        .collect();
    let non_auto_count = remaining_fields.iter().filter(|(_, auto)| !auto).count();

    let mut assignments: Vec<(String, String)> = explicit.clone();
    let mut values = positional.into_iter().peekable();
    let mut remaining_needed = non_auto_count;
    for (name, auto) in &remaining_fields {
        if *auto {
            if values.len() > remaining_needed {
                if let Some(v) = values.next() {
                    assignments.push((name.clone(), v));
                }
            }
        } else {
            remaining_needed = remaining_needed.saturating_sub(1);
            if let Some(v) = values.next() {
                assignments.push((name.clone(), v));
            }
        }
    }
    let leftover = values.len();
    if leftover > 0 {
        return Err(Error::Schema(SchemaError::TooManyValues {
            schema: schema_name.to_string(),
            expected: schema_fields.len() - explicit.len(),
            found: schema_fields.len() - explicit.len() + leftover,
        }));
    }

    let mut cells: Vec<(usize, String)> = Vec::new();
    for (name, value) in assignments {
        let index = schema_fields.iter().position(|(n, _)| n == &name).unwrap();
        cells.push((index, value));
    }

    builder.push_pending_row(schema_name, line_no, cells);
    Ok(())
}

/// Parses one data-row cell into a [`SlotValue`], for `kind`. More lenient
/// than [`parse_default_literal`]: strings and bytes may be given without
/// surrounding quotes.
///
/// Called from [`crate::schema::DocumentBuilder::finalize`] once every
/// field's resolved kind is known, not while the row's line is being
/// parsed (a `Ref` field has no usable kind until then).
pub(crate) fn parse_cell_value(kind: FieldKind, raw: &str) -> std::result::Result<SlotValue<'static>, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("empty cell value".to_string());
    }
    match kind {
        FieldKind::String | FieldKind::TimestampTZ => {
            let text = unquote_lenient(raw);
            Ok(SlotValue::Str(text.to_string()))
        }
        FieldKind::Bytes => {
            if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
                let bytes = (0..hex.len())
                    .step_by(2)
                    .map(|i| u8::from_str_radix(&hex[i..(i + 2).min(hex.len())], 16))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|_| format!("invalid hex literal `{raw}`"))?;
                Ok(SlotValue::Bytes(bytes.into()))
            } else {
                Ok(SlotValue::Bytes(unquote_lenient(raw).as_bytes().to_vec().into()))
            }
        }
        _ => match parse_default_literal(kind, raw) {
            Ok(default) => Ok(default.to_slot_value()),
            Err(e) => Err(e),
        },
    }
}

fn unquote_lenient(raw: &str) -> &str {
    let bytes = raw.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' || first == b'\'' || first == b'`') && first == last {
            return &raw[1..raw.len() - 1];
        }
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::field::DefaultValue;

    #[test]
    fn tiny_schema_and_data_round_trip() {
        let text = r#"
            @schema:Log
            fields:
            ID uint64
            Msg string
            @Log
            10, hello
            11, "world"
        "#;
        let doc = Document::parse_str(text).unwrap();
        let schema = doc.schema("Log").unwrap();
        assert_eq!(schema.fields().len(), 2);
        let rows = doc.data_rows("Log");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get(0).unwrap().as_u64(), Some(10));
        assert_eq!(rows[0].get(1).unwrap().as_str(), Some("hello"));
        assert_eq!(rows[1].get(1).unwrap().as_str(), Some("world"));
    }

    #[test]
    fn schema_name_on_next_line() {
        let text = "@schema\nLog\nfields:\nID uint64\n";
        let doc = Document::parse_str(text).unwrap();
        assert!(doc.schema("Log").is_some());
    }

    #[test]
    fn default_attribute_is_parsed() {
        let text = "@schema:Locale\nfields:\nLang string default=\"en\"\n";
        let doc = Document::parse_str(text).unwrap();
        let field = &doc.schema("Locale").unwrap().fields()[0];
        assert_eq!(
            field.default_value(),
            Some(&DefaultValue::Str("en".to_string()))
        );
    }

    #[test]
    fn auto_increment_field_may_be_omitted() {
        let text = "@schema:Log\nfields:\nID uint64 auto_increment\nMsg string\n@Log\nhello\n";
        let doc = Document::parse_str(text).unwrap();
        let rows = doc.data_rows("Log");
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].is_present(0));
        assert_eq!(rows[0].get(1).unwrap().as_str(), Some("hello"));
    }

    #[test]
    fn explicit_field_assignment_skips_positional_consumption() {
        let text = "@schema:Log\nfields:\nID uint64\nMsg string\n@Log\n@Msg=hello, 10\n";
        let doc = Document::parse_str(text).unwrap();
        let rows = doc.data_rows("Log");
        assert_eq!(rows[0].get(1).unwrap().as_str(), Some("hello"));
        assert_eq!(rows[0].get(0).unwrap().as_u64(), Some(10));
    }

    #[test]
    fn too_many_values_is_an_error() {
        let text = "@schema:Log\nfields:\nID uint64\n@Log\n1, 2\n";
        let result = Document::parse_str(text);
        assert!(matches!(
            result,
            Err(Error::Schema(SchemaError::TooManyValues { .. }))
        ));
    }

    #[test]
    fn unknown_field_in_row_is_an_error() {
        let text = "@schema:Log\nfields:\nID uint64\n@Log\n@Nope=1\n";
        let result = Document::parse_str(text);
        assert!(matches!(
            result,
            Err(Error::Schema(SchemaError::UnknownField { .. }))
        ));
    }

    #[test]
    fn ref_field_resolves_and_fingerprints() {
        let text = "@schema:User\nfields:\nID uint64\n@schema:Message\nfields:\nUser ref:User:ID\n";
        let doc = Document::parse_str(text).unwrap();
        let message = doc.schema("Message").unwrap();
        assert_eq!(message.fields()[0].resolved_kind(), FieldKind::Uint64);
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let text = "# a log schema\n@schema:Log\n\nfields:\n# the id\nID uint64\n";
        let doc = Document::parse_str(text).unwrap();
        assert!(doc.schema("Log").is_some());
    }
}
