//! The schema model: [`Field`]s grouped into an immutable, fingerprintable
//! [`Schema`], and [`Document`], the result of parsing a DSL file
//! (`spec.md` §3, §4.6).

mod field;
pub mod dsl;

pub use field::{parse_default_literal, DefaultValue, Field};

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result, SchemaError};
use crate::fingerprint::Fingerprinter;
use crate::kind::FieldKind;
use crate::row::Row;

/// An ordered list of fields plus a unique name, immutable after
/// [`SchemaBuilder::finalize`]/[`Document::finalize`].
///
/// Provides O(1) lookup by field name and a cached 64-bit fingerprint
/// computed once at finalization time (`spec.md` §5: "computed lazily...
/// or eagerly at parse time").
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    fields: Vec<Field>,
    index_by_name: HashMap<String, usize>,
    fingerprint: u64,
}

impl Schema {
    /// Starts building a schema named `name`.
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Schema name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in declaration order; column order on the wire follows this
    /// order exactly.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// O(1) lookup of a field's index by name.
    pub fn field_index_of(&self, name: &str) -> Option<usize> {
        self.index_by_name.get(name).copied()
    }

    /// The schema's cached FNV-1a/64 fingerprint (`spec.md` §6).
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Creates a fresh, all-unset [`Row`] bound to this schema.
    pub fn new_row(self: &Arc<Self>) -> Row<'static> {
        Row::new(Arc::clone(self))
    }
}

/// Builder for a single, reference-free [`Schema`].
///
/// Fields containing a `Ref` cannot be finalized this way: they require
/// cross-schema resolution, which only [`Document::finalize`] performs.
/// Use this builder directly for schemas that only contain concrete
/// (non-`Ref`) fields.
pub struct SchemaBuilder {
    name: String,
    fields: Vec<Field>,
}

impl SchemaBuilder {
    /// Appends a field declaration.
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Validates field-name uniqueness, rejects unresolved `Ref` fields,
    /// finalizes any deferred default literals, and computes the
    /// fingerprint.
    pub fn finalize(mut self) -> Result<Schema> {
        validate_unique_field_names(&self.name, &self.fields)?;
        for field in &mut self.fields {
            if field.is_ref() {
                return Err(Error::Schema(SchemaError::UnresolvedReference(
                    field.name().to_string(),
                )));
            }
            field.finalize_default()?;
        }
        build_finalized_schema(self.name, self.fields)
    }
}

fn validate_unique_field_names(schema_name: &str, fields: &[Field]) -> Result<()> {
    let mut seen = HashMap::new();
    for field in fields {
        if seen.insert(field.name().to_string(), ()).is_some() {
            return Err(Error::Schema(SchemaError::DuplicateField(
                field.name().to_string(),
                schema_name.to_string(),
            )));
        }
    }
    Ok(())
}

fn build_finalized_schema(name: String, fields: Vec<Field>) -> Result<Schema> {
    let fingerprint = canonical_fingerprint(&name, &fields);
    let index_by_name = fields
        .iter()
        .enumerate()
        .map(|(i, f)| (f.name().to_string(), i))
        .collect();
    Ok(Schema {
        name,
        fields,
        index_by_name,
        fingerprint,
    })
}

/// Computes the FNV-1a/64 fingerprint of a schema's canonical byte
/// sequence, per `spec.md` §6.
pub(crate) fn canonical_fingerprint(name: &str, fields: &[Field]) -> u64 {
    let mut fp = Fingerprinter::new();
    fp.write_str(name);
    for field in fields {
        fp.write_str("|");
        fp.write_str(field.name());
        fp.write_str(":");
        fp.write_str(field.raw_type());
        if field.is_ref() {
            fp.write_str("->");
            fp.write_str(field.target_schema().unwrap_or_default());
            fp.write_str(".");
            fp.write_str(field.target_field().unwrap_or_default());
        }
        if field.auto_increment() {
            fp.write_str("+auto");
        }
        if !field.attributes().is_empty() {
            let mut attrs = field.attributes().to_vec();
            attrs.sort();
            for attr in attrs {
                fp.write_str("@");
                fp.write_str(&attr);
            }
        }
        if let Some(default) = field.default_value() {
            fp.write_str("=def:");
            fp.write_str(&default.canonical_key(field.resolved_kind()));
        }
    }
    fp.finish()
}

/// A parsed DSL file: a mapping from schema name to [`Schema`], plus
/// optional inline data rows keyed by schema name (`spec.md` §3).
#[derive(Debug, Clone, Default)]
pub struct Document {
    order: Vec<String>,
    schemas: HashMap<String, Arc<Schema>>,
    data_rows: HashMap<String, Vec<Row<'static>>>,
}

impl Document {
    /// Parses DSL text into a finalized [`Document`]. See
    /// [`crate::schema::dsl`] for the grammar.
    pub fn parse_str(text: &str) -> Result<Document> {
        dsl::parse(text)
    }

    /// Looks up a finalized schema by name.
    pub fn schema(&self, name: &str) -> Option<&Schema> {
        self.schemas.get(name).map(Arc::as_ref)
    }

    /// Looks up a finalized schema by name, returning the shared `Arc` (the
    /// form [`Row`]/[`crate::stream::Writer`]/[`crate::stream::Reader`] are
    /// constructed from).
    pub fn schema_arc(&self, name: &str) -> Option<Arc<Schema>> {
        self.schemas.get(name).cloned()
    }

    /// Schema names in declaration order.
    pub fn schema_names(&self) -> &[String] {
        &self.order
    }

    /// Inline data rows declared for `schema_name`, if any.
    pub fn data_rows(&self, schema_name: &str) -> &[Row<'static>] {
        self.data_rows
            .get(schema_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// A data row not yet convertible to a [`Row`]: each cell's value is kept
/// as a raw string until the owning field's `resolved_kind` is known,
/// since a `Ref` field isn't resolved until [`DocumentBuilder::finalize`]
/// runs (`spec.md` §9, OQ3 generalized to row values, not just defaults).
struct PendingRow {
    line: usize,
    cells: Vec<(usize, String)>,
}

/// Intermediate, pre-resolution schema state used while a [`Document`] is
/// being assembled (by [`dsl::parse`] or programmatically via
/// [`DocumentBuilder`]).
#[derive(Default)]
pub struct DocumentBuilder {
    order: Vec<String>,
    pending: HashMap<String, (String, Vec<Field>)>,
    pending_rows: HashMap<String, Vec<PendingRow>>,
}

impl DocumentBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a new schema with its (possibly `Ref`-bearing) fields.
    /// Fails if a schema with the same name was already declared.
    pub fn add_schema(&mut self, name: impl Into<String>, fields: Vec<Field>) -> Result<()> {
        let name = name.into();
        if self.pending.contains_key(&name) {
            return Err(Error::Schema(SchemaError::DuplicateSchema(name)));
        }
        self.order.push(name.clone());
        self.pending.insert(name.clone(), (name, fields));
        Ok(())
    }

    /// Returns `(name, auto_increment)` for every field of `name`, in
    /// declaration order, or `None` if no such schema has been declared
    /// yet. Used by the DSL parser to validate data rows without needing
    /// a field's resolved kind.
    pub(crate) fn schema_field_meta(&self, name: &str) -> Option<Vec<(String, bool)>> {
        self.pending
            .get(name)
            .map(|(_, fields)| fields.iter().map(|f| (f.name().to_string(), f.auto_increment())).collect())
    }

    /// Records a data row for `schema_name` as raw `(field_index, text)`
    /// cells, to be interpreted once the schema is finalized.
    pub(crate) fn push_pending_row(&mut self, schema_name: &str, line: usize, cells: Vec<(usize, String)>) {
        self.pending_rows
            .entry(schema_name.to_string())
            .or_default()
            .push(PendingRow { line, cells });
    }

    /// Resolves every `Ref` field across all declared schemas (DFS with
    /// cycle detection), finalizes deferred default literals, computes
    /// fingerprints, interprets any pending data rows now that resolved
    /// kinds are known, and produces an immutable [`Document`].
    pub fn finalize(mut self) -> Result<Document> {
        for name in self.order.clone() {
            let mut stack = Vec::new();
            self.resolve_schema(&name, &mut stack)?;
        }
        for (_, fields) in self.pending.values_mut() {
            for field in fields.iter_mut() {
                field.finalize_default()?;
            }
        }

        let mut schemas = HashMap::new();
        for name in &self.order {
            let (schema_name, fields) = self.pending.remove(name).unwrap();
            validate_unique_field_names(&schema_name, &fields)?;
            let schema = Arc::new(build_finalized_schema(schema_name.clone(), fields)?);
            schemas.insert(schema_name, schema);
        }

        let mut data_rows: HashMap<String, Vec<Row<'static>>> = HashMap::new();
        for (schema_name, pending) in self.pending_rows {
            let schema = schemas
                .get(&schema_name)
                .expect("pending rows only recorded for declared schemas");
            let mut rows = Vec::with_capacity(pending.len());
            for pending_row in pending {
                let mut row = Row::new(Arc::clone(schema));
                for (index, text) in pending_row.cells {
                    let kind = schema.fields()[index].resolved_kind();
                    let value = dsl::parse_cell_value(kind, &text).map_err(|reason| {
                        Error::Schema(SchemaError::Parse {
                            line: pending_row.line,
                            reason,
                        })
                    })?;
                    row.set_by_index(index, value)?;
                }
                rows.push(row);
            }
            data_rows.insert(schema_name, rows);
        }

        Ok(Document {
            order: self.order,
            schemas,
            data_rows,
        })
    }

    /// DFS-resolves the `resolved_kind` of every `Ref` field belonging to
    /// schema `name`, tracking the in-progress field path in `stack` to
    /// detect cycles.
    fn resolve_schema(&mut self, name: &str, stack: &mut Vec<(String, String)>) -> Result<()> {
        let field_names: Vec<String> = match self.pending.get(name) {
            Some((_, fields)) => fields.iter().map(|f| f.name().to_string()).collect(),
            None => return Ok(()),
        };
        for field_name in field_names {
            self.resolve_field(name, &field_name, stack)?;
        }
        Ok(())
    }

    fn resolve_field(
        &mut self,
        schema_name: &str,
        field_name: &str,
        stack: &mut Vec<(String, String)>,
    ) -> Result<FieldKind> {
        let (is_ref, already_resolved, target) = {
            let (_, fields) = self
                .pending
                .get(schema_name)
                .ok_or_else(|| Error::Schema(SchemaError::UnknownReference {
                    field: field_name.to_string(),
                    target_schema: schema_name.to_string(),
                    target_field: String::new(),
                }))?;
            let field = fields
                .iter()
                .find(|f| f.name() == field_name)
                .ok_or_else(|| Error::Schema(SchemaError::UnknownField {
                    schema: schema_name.to_string(),
                    field: field_name.to_string(),
                }))?;
            (
                field.is_ref(),
                field.resolved_kind() != FieldKind::Invalid,
                field
                    .target_schema()
                    .zip(field.target_field())
                    .map(|(s, f)| (s.to_string(), f.to_string())),
            )
        };

        if !is_ref {
            return Ok(self.field_kind(schema_name, field_name));
        }
        if already_resolved {
            return Ok(self.field_kind(schema_name, field_name));
        }

        let key = (schema_name.to_string(), field_name.to_string());
        if stack.contains(&key) {
            let from = stack
                .first()
                .map(|(s, f)| format!("{s}.{f}"))
                .unwrap_or_default();
            return Err(Error::Schema(SchemaError::Cycle {
                from,
                to: format!("{schema_name}.{field_name}"),
            }));
        }
        stack.push(key.clone());

        let (target_schema, target_field) = target.ok_or_else(|| {
            Error::Schema(SchemaError::UnknownReference {
                field: field_name.to_string(),
                target_schema: schema_name.to_string(),
                target_field: String::new(),
            })
        })?;

        if !self.pending.contains_key(&target_schema) {
            return Err(Error::Schema(SchemaError::UnknownReference {
                field: field_name.to_string(),
                target_schema: target_schema.clone(),
                target_field: target_field.clone(),
            }));
        }
        let target_has_field = self
            .pending
            .get(&target_schema)
            .map(|(_, fields)| fields.iter().any(|f| f.name() == target_field))
            .unwrap_or(false);
        if !target_has_field {
            return Err(Error::Schema(SchemaError::UnknownReference {
                field: field_name.to_string(),
                target_schema: target_schema.clone(),
                target_field: target_field.clone(),
            }));
        }

        let resolved = self.resolve_field(&target_schema, &target_field, stack)?;
        stack.pop();

        if let Some((_, fields)) = self.pending.get_mut(schema_name) {
            if let Some(field) = fields.iter_mut().find(|f| f.name() == field_name) {
                field.set_resolved_kind(resolved);
            }
        }
        Ok(resolved)
    }

    fn field_kind(&self, schema_name: &str, field_name: &str) -> FieldKind {
        self.pending
            .get(schema_name)
            .and_then(|(_, fields)| fields.iter().find(|f| f.name() == field_name))
            .map(|f| f.resolved_kind())
            .unwrap_or(FieldKind::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::FieldKind;

    #[test]
    fn finalize_computes_fingerprint_and_index() {
        let schema = Schema::builder("Log")
            .field(Field::new("ID", "uint64", FieldKind::Uint64))
            .field(Field::new("Msg", "string", FieldKind::String))
            .finalize()
            .unwrap();
        assert_eq!(schema.field_index_of("Msg"), Some(1));
        assert_ne!(schema.fingerprint(), 0);
    }

    #[test]
    fn duplicate_field_name_is_rejected() {
        let result = Schema::builder("Log")
            .field(Field::new("ID", "uint64", FieldKind::Uint64))
            .field(Field::new("ID", "uint64", FieldKind::Uint64))
            .finalize();
        assert!(matches!(
            result,
            Err(Error::Schema(SchemaError::DuplicateField(_, _)))
        ));
    }

    #[test]
    fn bare_finalize_rejects_unresolved_ref_field() {
        let result = Schema::builder("Message")
            .field(Field::new_ref("User", "ref:User:ID", "User", "ID"))
            .finalize();
        assert!(matches!(
            result,
            Err(Error::Schema(SchemaError::UnresolvedReference(name))) if name == "User"
        ));
    }

    #[test]
    fn fingerprint_ignores_attribute_order() {
        let a = Schema::builder("S")
            .field(
                Field::new("X", "uint64", FieldKind::Uint64)
                    .with_attributes(vec!["b".to_string(), "a".to_string()]),
            )
            .finalize()
            .unwrap();
        let b = Schema::builder("S")
            .field(
                Field::new("X", "uint64", FieldKind::Uint64)
                    .with_attributes(vec!["a".to_string(), "b".to_string()]),
            )
            .finalize()
            .unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_is_sensitive_to_field_order() {
        let a = Schema::builder("S")
            .field(Field::new("X", "uint64", FieldKind::Uint64))
            .field(Field::new("Y", "string", FieldKind::String))
            .finalize()
            .unwrap();
        let b = Schema::builder("S")
            .field(Field::new("Y", "string", FieldKind::String))
            .field(Field::new("X", "uint64", FieldKind::Uint64))
            .finalize()
            .unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_is_sensitive_to_raw_type_token() {
        let a = Schema::builder("S")
            .field(Field::new("X", "uint64", FieldKind::Uint64))
            .finalize()
            .unwrap();
        let b = Schema::builder("S")
            .field(Field::new("X", "uint", FieldKind::Uint64))
            .finalize()
            .unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn reference_resolution_across_schemas() {
        let mut builder = DocumentBuilder::new();
        builder
            .add_schema("User", vec![Field::new("ID", "uint64", FieldKind::Uint64)])
            .unwrap();
        builder
            .add_schema(
                "Message",
                vec![Field::new_ref("User", "ref:User:ID", "User", "ID")],
            )
            .unwrap();
        let doc = builder.finalize().unwrap();
        let message = doc.schema("Message").unwrap();
        assert_eq!(message.fields()[0].resolved_kind(), FieldKind::Uint64);
    }

    #[test]
    fn cyclic_reference_is_rejected() {
        let mut builder = DocumentBuilder::new();
        builder
            .add_schema("A", vec![Field::new_ref("X", "ref:B:Y", "B", "Y")])
            .unwrap();
        builder
            .add_schema("B", vec![Field::new_ref("Y", "ref:A:X", "A", "X")])
            .unwrap();
        let result = builder.finalize();
        assert!(matches!(result, Err(Error::Schema(SchemaError::Cycle { .. }))));
    }

    #[test]
    fn unknown_reference_target_is_rejected() {
        let mut builder = DocumentBuilder::new();
        builder
            .add_schema("A", vec![Field::new_ref("X", "ref:Nope:Y", "Nope", "Y")])
            .unwrap();
        let result = builder.finalize();
        assert!(matches!(
            result,
            Err(Error::Schema(SchemaError::UnknownReference { .. }))
        ));
    }
}
