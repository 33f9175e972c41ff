//! Type-to-schema compilation.
//!
//! Every declared struct or enum that is reached becomes one component. A
//! placeholder entry is registered before the type's fields are visited, so
//! self-referential and mutually recursive types end in a `$ref` instead of
//! recursing forever. Anything that is not a declared type (primitives,
//! collections, well-known library types) is inlined.

use super::enums;
use super::{Schema, X_FIELD_NAME, X_POINTER_DEPTH, X_RUST_TYPE, X_TAG_VALIDATE};
use crate::error::{Error, Result};
use crate::eval::Evaluator;
use crate::index::attrs::{validate_requires, validate_tag, Docs, SerdeAttributes};
use crate::index::{Declared, TypeDecl, TypeExpr, TypeIndex, TypePath};
use heck::ToUpperCamelCase;
use indexmap::IndexMap;
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};
use syn::Fields;

/// Identity of a compiled type: qualified declaration path plus generic arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeKey(pub String);

/// Entry of the definition table. `schema` stays `None` while the type is
/// being expanded.
#[derive(Debug)]
struct Definition {
    name: String,
    schema: Option<Schema>,
}

/// A compiled field type before it is attached to a property.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldType {
    pub schema: Schema,
    /// Wrapped in `Option`
    pub optional: bool,
    pub pointer_depth: u32,
}

impl FieldType {
    pub fn into_schema(self) -> Schema {
        let mut schema = self.schema;
        if self.pointer_depth > 0 {
            schema = schema.with_extension(X_POINTER_DEPTH, self.pointer_depth);
        }
        schema.settle()
    }
}

/// A compiled struct field.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    /// Field identifier as written
    pub ident: String,
    /// Serialized name
    pub name: String,
    pub schema: Schema,
    pub required: bool,
}

pub struct SchemaCompiler<'a> {
    index: &'a TypeIndex,
    definitions: HashMap<TypeKey, Definition>,
    /// Reverse map of assigned component names
    names: HashMap<String, TypeKey>,
    /// Declarations currently being expanded, innermost last
    stack: Vec<String>,
}

impl<'a> SchemaCompiler<'a> {
    pub fn new(index: &'a TypeIndex) -> Self {
        Self {
            index,
            definitions: HashMap::new(),
            names: HashMap::new(),
            stack: Vec::new(),
        }
    }

    pub fn index(&self) -> &'a TypeIndex {
        self.index
    }

    /// Compiles a type as written in `module`.
    pub fn compile(&mut self, ty: &TypeExpr, module: &[String]) -> Result<Schema> {
        Ok(self.compile_field(ty, module)?.into_schema())
    }

    /// Compiles a type, reporting `Option` and pointer layers separately.
    pub fn compile_field(&mut self, ty: &TypeExpr, module: &[String]) -> Result<FieldType> {
        let mut current = ty;
        let mut optional = false;
        let mut pointer_depth = 0;
        loop {
            match current {
                TypeExpr::Reference(inner) => {
                    if inner.name() != Some("str") {
                        pointer_depth += 1;
                    }
                    current = inner;
                }
                TypeExpr::Path(p) if !p.args.is_empty() && matches!(p.name(), "Box" | "Rc" | "Arc") => {
                    pointer_depth += 1;
                    current = &p.args[0];
                }
                TypeExpr::Path(p) if p.args.len() == 1 && p.name() == "Option" => {
                    optional = true;
                    current = &p.args[0];
                }
                TypeExpr::Path(p)
                    if !p.args.is_empty()
                        && matches!(p.name(), "Cow" | "Cell" | "RefCell" | "Mutex" | "RwLock") =>
                {
                    current = &p.args[0];
                }
                _ => break,
            }
        }
        Ok(FieldType {
            schema: self.compile_shape(current, module)?,
            optional,
            pointer_depth,
        })
    }

    /// Compiles one named field of a struct or struct variant.
    pub fn compile_member(
        &mut self,
        field: &syn::Field,
        ty: &TypeExpr,
        container: &SerdeAttributes,
        module: &[String],
    ) -> Result<Member> {
        let serde_attrs = SerdeAttributes::from_attrs(&field.attrs);
        let ident = field
            .ident
            .as_ref()
            .map(|i| i.to_string().trim_start_matches("r#").to_string())
            .unwrap_or_default();
        let name = serde_attrs
            .rename
            .clone()
            .unwrap_or_else(|| container.renamed(&ident));

        let field_type = self.compile_field(ty, module)?;
        let validate = validate_tag(&field.attrs);
        let required = match &validate {
            Some(tag) if validate_requires(tag) => true,
            _ => !field_type.optional && !serde_attrs.default && !container.default,
        };

        let mut schema = field_type
            .into_schema()
            .with_description(Docs::from_attrs(&field.attrs).text());
        if name != ident {
            schema = schema.with_extension(X_FIELD_NAME, ident.clone());
        }
        if let Some(tag) = validate {
            schema = schema.with_extension(X_TAG_VALIDATE, tag);
        }
        Ok(Member {
            ident,
            name,
            schema: schema.settle(),
            required,
        })
    }

    /// Reserves a component for a schema that has no Rust declaration.
    pub fn register_builtin(&mut self, name: &str, schema: Schema) -> Schema {
        let key = TypeKey(format!("<builtin>::{}", name));
        if let Some(def) = self.definitions.get(&key) {
            return Schema::reference(&def.name);
        }
        let mut assigned = name.to_string();
        let mut n = 2;
        while self.names.contains_key(&assigned) {
            assigned = format!("{}{}", name, n);
            n += 1;
        }
        self.names.insert(assigned.clone(), key.clone());
        self.definitions.insert(
            key,
            Definition {
                name: assigned.clone(),
                schema: Some(schema),
            },
        );
        Schema::reference(&assigned)
    }

    /// Component schemas keyed by their assigned name.
    pub fn into_components(self) -> BTreeMap<String, Schema> {
        self.definitions
            .into_values()
            .filter_map(|def| match def.schema {
                Some(schema) => Some((def.name, schema)),
                None => {
                    warn!("Schema {} was never resolved", def.name);
                    None
                }
            })
            .collect()
    }

    fn context(&self, fallback: &TypeExpr) -> String {
        self.stack
            .last()
            .cloned()
            .unwrap_or_else(|| fallback.to_string())
    }

    fn compile_shape(&mut self, ty: &TypeExpr, module: &[String]) -> Result<Schema> {
        match ty {
            TypeExpr::Path(path) => self.compile_path(ty, path, module),
            TypeExpr::Reference(inner) => self.compile_shape(inner, module),
            TypeExpr::Slice(inner) => Ok(Schema::array(self.compile(inner, module)?)),
            TypeExpr::Array(inner, len) => {
                let mut schema = Schema::array(self.compile(inner, module)?);
                schema.min_items = *len;
                schema.max_items = *len;
                Ok(schema)
            }
            TypeExpr::Tuple(elems) if elems.is_empty() => Ok(Schema::default()),
            TypeExpr::Tuple(elems) => self.compile_tuple(elems, module),
            TypeExpr::Opaque | TypeExpr::Unknown => Ok(Schema::default()),
        }
    }

    fn compile_path(&mut self, ty: &TypeExpr, path: &TypePath, module: &[String]) -> Result<Schema> {
        let name = path.name();
        if let Some(schema) = primitive_schema(name) {
            return Ok(schema);
        }
        match (name, path.args.as_slice()) {
            ("Vec" | "VecDeque" | "LinkedList" | "BinaryHeap", [item, ..]) => {
                return Ok(Schema::array(self.compile(item, module)?));
            }
            ("HashSet" | "BTreeSet" | "IndexSet", [item, ..]) => {
                let mut schema = Schema::array(self.compile(item, module)?);
                schema.unique_items = Some(true);
                return Ok(schema);
            }
            ("HashMap" | "BTreeMap" | "IndexMap", [key, value, ..]) => {
                if !self.is_string_key(key, module) {
                    return Err(Error::UnsupportedMapKey {
                        key: key.to_string(),
                        context: self.context(ty),
                    });
                }
                let mut schema = Schema::typed("object");
                schema.additional_properties = Some(Box::new(self.compile(value, module)?));
                return Ok(schema);
            }
            _ => {}
        }

        if let Some(decl) = self.index.find_type(path, module) {
            return self.compile_declared(decl, &path.args, module);
        }
        if let Some(schema) = well_known_schema(path) {
            return Ok(schema);
        }
        if looks_numeric(name) {
            return Err(Error::UnknownPrimitive {
                name: name.to_string(),
                context: self.context(ty),
            });
        }
        warn!("Unresolved type {}, emitting an empty schema", path);
        Ok(Schema::default().with_extension(X_RUST_TYPE, path.to_string()))
    }

    fn compile_tuple(&mut self, elems: &[TypeExpr], module: &[String]) -> Result<Schema> {
        let mut distinct: Vec<Schema> = Vec::new();
        for elem in elems {
            let schema = self.compile(elem, module)?;
            if !distinct.contains(&schema) {
                distinct.push(schema);
            }
        }
        let item = if distinct.len() == 1 {
            distinct.remove(0)
        } else {
            Schema {
                one_of: Some(distinct),
                ..Default::default()
            }
        };
        let mut schema = Schema::array(item);
        schema.min_items = Some(elems.len() as u64);
        schema.max_items = Some(elems.len() as u64);
        Ok(schema)
    }

    fn compile_declared(&mut self, decl: TypeDecl<'a>, args: &[TypeExpr], module: &[String]) -> Result<Schema> {
        if let TypeDecl::Alias(alias) = decl {
            let subst = substitution(&decl, args);
            let target = substitute(&TypeExpr::from(&*alias.item.ty), &subst);
            return self.compile(&target, &alias.module);
        }

        let args: Vec<TypeExpr> = args.iter().map(|a| self.canonical(a, module)).collect();
        let key = type_key(&decl, &args);
        if let Some(def) = self.definitions.get(&key) {
            return Ok(Schema::reference(&def.name));
        }

        let name = self.assign_name(&decl, &args);
        debug!("Registering schema {} for {}", name, key.0);
        self.names.insert(name.clone(), key.clone());
        self.definitions.insert(
            key.clone(),
            Definition {
                name: name.clone(),
                schema: None,
            },
        );

        self.stack.push(key.0.clone());
        let expanded = self.expand(&decl, &args);
        self.stack.pop();
        let mut schema = expanded?;

        if let Some(text) = Docs::from_attrs(decl.attrs()).text() {
            schema.description = Some(match schema.description.take() {
                Some(block) => format!("{}\n\n{}", text, block),
                None => text,
            });
        }
        if schema.enum_values.is_none() && schema.properties.is_none() {
            if let Some(members) = enums::typed_constants(self.index, &decl.name()) {
                enums::apply(&mut schema, members);
            }
        }
        let schema = schema.with_extension(X_RUST_TYPE, decl.name()).settle();

        if let Some(def) = self.definitions.get_mut(&key) {
            def.schema = Some(schema);
        }
        Ok(Schema::reference(&name))
    }

    fn expand(&mut self, decl: &TypeDecl<'a>, args: &[TypeExpr]) -> Result<Schema> {
        let subst = substitution(decl, args);
        match *decl {
            TypeDecl::Struct(d) => self.expand_struct(d, &subst),
            TypeDecl::Enum(d) => self.expand_enum(d, &subst),
            TypeDecl::Alias(d) => {
                let target = substitute(&TypeExpr::from(&*d.item.ty), &subst);
                self.compile(&target, &d.module)
            }
        }
    }

    fn expand_struct(
        &mut self,
        d: &Declared<syn::ItemStruct>,
        subst: &HashMap<String, TypeExpr>,
    ) -> Result<Schema> {
        let container = SerdeAttributes::from_attrs(&d.item.attrs);
        match &d.item.fields {
            Fields::Unit => Ok(Schema::object(IndexMap::new(), Vec::new())),
            Fields::Unnamed(fields) => {
                let tys: Vec<TypeExpr> = fields
                    .unnamed
                    .iter()
                    .map(|f| substitute(&TypeExpr::from(&f.ty), subst))
                    .collect();
                if tys.len() == 1 {
                    // newtype: the inner schema under the struct's own name
                    self.compile(&tys[0], &d.module)
                } else {
                    self.compile_tuple(&tys, &d.module)
                }
            }
            Fields::Named(fields) => self.expand_named(fields, &container, &d.module, subst),
        }
    }

    fn expand_named(
        &mut self,
        fields: &syn::FieldsNamed,
        container: &SerdeAttributes,
        module: &[String],
        subst: &HashMap<String, TypeExpr>,
    ) -> Result<Schema> {
        let mut properties = IndexMap::new();
        let mut required = Vec::new();
        let mut composed = Vec::new();
        for field in &fields.named {
            let serde_attrs = SerdeAttributes::from_attrs(&field.attrs);
            if serde_attrs.skip {
                continue;
            }
            let ty = substitute(&TypeExpr::from(&field.ty), subst);
            if serde_attrs.flatten {
                if is_bytes(&ty) {
                    return Ok(Schema::binary());
                }
                composed.push(self.compile(&ty, module)?);
                continue;
            }
            let member = self.compile_member(field, &ty, container, module)?;
            if member.required {
                required.push(member.name.clone());
            }
            properties.insert(member.name, member.schema);
        }

        let object = Schema::object(properties, required);
        if composed.is_empty() {
            Ok(object)
        } else {
            composed.push(object);
            Ok(Schema {
                all_of: Some(composed),
                ..Default::default()
            })
        }
    }

    fn expand_enum(
        &mut self,
        d: &Declared<syn::ItemEnum>,
        subst: &HashMap<String, TypeExpr>,
    ) -> Result<Schema> {
        let ident = d.item.ident.to_string();
        let evaluator = Evaluator::new(self.index, &d.module, Some(ident.as_str()));
        if let Some(members) = enums::unit_variants(&d.item, &evaluator) {
            let mut schema = Schema::typed("string");
            enums::apply(&mut schema, members);
            return Ok(schema);
        }

        let container = SerdeAttributes::from_attrs(&d.item.attrs);
        let mut variants = Vec::new();
        for variant in &d.item.variants {
            let variant_attrs = SerdeAttributes::from_attrs(&variant.attrs);
            if variant_attrs.skip {
                continue;
            }
            let name = variant_attrs
                .rename
                .clone()
                .unwrap_or_else(|| container.renamed(&variant.ident.to_string()));
            let payload = match &variant.fields {
                Fields::Unit => None,
                Fields::Unnamed(fields) => {
                    let tys: Vec<TypeExpr> = fields
                        .unnamed
                        .iter()
                        .map(|f| substitute(&TypeExpr::from(&f.ty), subst))
                        .collect();
                    if tys.len() == 1 {
                        Some(self.compile(&tys[0], &d.module)?)
                    } else {
                        Some(self.compile_tuple(&tys, &d.module)?)
                    }
                }
                Fields::Named(fields) => {
                    Some(self.expand_named(fields, &variant_attrs, &d.module, subst)?)
                }
            };

            let schema = match (&container.tag, payload) {
                (None, None) => Schema {
                    enum_values: Some(vec![name.clone().into()]),
                    ..Schema::typed("string")
                },
                (None, Some(payload)) => {
                    let mut properties = IndexMap::new();
                    properties.insert(name.clone(), payload);
                    Schema::object(properties, vec![name])
                }
                (Some(tag), payload) => internally_tagged(tag, &name, payload),
            };
            variants.push(schema.with_description(Docs::from_attrs(&variant.attrs).text()));
        }
        Ok(Schema {
            one_of: Some(variants),
            ..Default::default()
        })
    }

    /// Picks a unique component name: the declared name plus generic argument
    /// labels, prefixed with enclosing module segments on collision, then
    /// numbered.
    fn assign_name(&self, decl: &TypeDecl<'a>, args: &[TypeExpr]) -> String {
        let base: String = std::iter::once(decl.name())
            .chain(args.iter().map(type_label))
            .collect();
        if !self.names.contains_key(&base) {
            return base;
        }
        let mut candidate = base;
        for segment in decl.module().iter().rev() {
            candidate = format!("{}{}", segment.to_upper_camel_case(), candidate);
            if !self.names.contains_key(&candidate) {
                return candidate;
            }
        }
        let mut n = 2;
        loop {
            let numbered = format!("{}{}", candidate, n);
            if !self.names.contains_key(&numbered) {
                return numbered;
            }
            n += 1;
        }
    }

    /// Rewrites declared type paths to their absolute module path so generic
    /// arguments resolve the same way inside the generic type's module.
    fn canonical(&self, ty: &TypeExpr, module: &[String]) -> TypeExpr {
        match ty {
            TypeExpr::Path(p) => {
                let args = p.args.iter().map(|a| self.canonical(a, module)).collect();
                let segments = match self.index.find_type(p, module) {
                    Some(decl) if primitive_schema(p.name()).is_none() => std::iter::once("crate".to_string())
                        .chain(decl.module().iter().cloned())
                        .chain(std::iter::once(decl.name()))
                        .collect(),
                    _ => p.segments.clone(),
                };
                TypeExpr::Path(TypePath { segments, args })
            }
            TypeExpr::Reference(inner) => TypeExpr::Reference(Box::new(self.canonical(inner, module))),
            TypeExpr::Slice(inner) => TypeExpr::Slice(Box::new(self.canonical(inner, module))),
            TypeExpr::Array(inner, len) => TypeExpr::Array(Box::new(self.canonical(inner, module)), *len),
            TypeExpr::Tuple(elems) => TypeExpr::Tuple(elems.iter().map(|e| self.canonical(e, module)).collect()),
            other => other.clone(),
        }
    }

    fn is_string_key(&self, ty: &TypeExpr, module: &[String]) -> bool {
        let path = match ty.peel() {
            TypeExpr::Path(path) => path,
            _ => return false,
        };
        if matches!(path.name(), "String" | "str" | "char" | "Uuid") {
            return true;
        }
        match self.index.find_type(path, module) {
            Some(TypeDecl::Enum(d)) => d
                .item
                .variants
                .iter()
                .all(|v| matches!(v.fields, Fields::Unit)),
            Some(TypeDecl::Struct(d)) => match &d.item.fields {
                Fields::Unnamed(fields) if fields.unnamed.len() == 1 => {
                    self.is_string_key(&TypeExpr::from(&fields.unnamed[0].ty), &d.module)
                }
                _ => false,
            },
            Some(TypeDecl::Alias(d)) => self.is_string_key(&TypeExpr::from(&*d.item.ty), &d.module),
            None => false,
        }
    }
}

fn type_key(decl: &TypeDecl<'_>, args: &[TypeExpr]) -> TypeKey {
    if args.is_empty() {
        TypeKey(decl.qualified_name())
    } else {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        TypeKey(format!("{}<{}>", decl.qualified_name(), args.join(", ")))
    }
}

fn substitution(decl: &TypeDecl<'_>, args: &[TypeExpr]) -> HashMap<String, TypeExpr> {
    decl.type_params().into_iter().zip(args.iter().cloned()).collect()
}

/// Replaces generic parameters by their arguments.
fn substitute(ty: &TypeExpr, subst: &HashMap<String, TypeExpr>) -> TypeExpr {
    if subst.is_empty() {
        return ty.clone();
    }
    match ty {
        TypeExpr::Path(p) if p.segments.len() == 1 && p.args.is_empty() => subst
            .get(&p.segments[0])
            .cloned()
            .unwrap_or_else(|| ty.clone()),
        TypeExpr::Path(p) => TypeExpr::Path(TypePath {
            segments: p.segments.clone(),
            args: p.args.iter().map(|a| substitute(a, subst)).collect(),
        }),
        TypeExpr::Reference(inner) => TypeExpr::Reference(Box::new(substitute(inner, subst))),
        TypeExpr::Slice(inner) => TypeExpr::Slice(Box::new(substitute(inner, subst))),
        TypeExpr::Array(inner, len) => TypeExpr::Array(Box::new(substitute(inner, subst)), *len),
        TypeExpr::Tuple(elems) => TypeExpr::Tuple(elems.iter().map(|e| substitute(e, subst)).collect()),
        other => other.clone(),
    }
}

/// UpperCamel label of a generic argument used in component names.
fn type_label(ty: &TypeExpr) -> String {
    match ty {
        TypeExpr::Path(p) if matches!(p.name(), "Box" | "Rc" | "Arc") && !p.args.is_empty() => {
            type_label(&p.args[0])
        }
        TypeExpr::Path(p) => std::iter::once(p.name().to_upper_camel_case())
            .chain(p.args.iter().map(type_label))
            .collect(),
        TypeExpr::Reference(inner) => type_label(inner),
        TypeExpr::Slice(inner) | TypeExpr::Array(inner, _) => format!("{}List", type_label(inner)),
        TypeExpr::Tuple(elems) if !elems.is_empty() => elems.iter().map(type_label).collect(),
        _ => "Any".to_string(),
    }
}

fn internally_tagged(tag: &str, name: &str, payload: Option<Schema>) -> Schema {
    let tag_schema = Schema {
        enum_values: Some(vec![name.into()]),
        ..Schema::typed("string")
    };
    let mut properties = IndexMap::new();
    properties.insert(tag.to_string(), tag_schema);
    let mut required = vec![tag.to_string()];
    match payload {
        Some(Schema {
            properties: Some(fields),
            required: fields_required,
            ..
        }) => {
            properties.extend(fields);
            required.extend(fields_required.unwrap_or_default());
            Schema::object(properties, required)
        }
        Some(other) => Schema {
            all_of: Some(vec![Schema::object(properties, required), other]),
            ..Default::default()
        },
        None => Schema::object(properties, required),
    }
}

fn is_bytes(ty: &TypeExpr) -> bool {
    matches!(ty.peel().name(), Some("Bytes" | "BytesMut"))
}

/// Fixed table of primitive types.
fn primitive_schema(name: &str) -> Option<Schema> {
    let schema = match name {
        "bool" => Schema::typed("boolean"),
        "i8" | "i16" | "i32" | "u8" | "u16" => Schema::typed("integer").with_format("int32"),
        "u32" | "i64" | "u64" | "i128" | "u128" | "isize" | "usize" => {
            Schema::typed("integer").with_format("int64")
        }
        "f32" => Schema::typed("number").with_format("float"),
        "f64" => Schema::typed("number").with_format("double"),
        "String" | "str" | "char" => Schema::typed("string"),
        _ => return None,
    };
    Some(schema)
}

/// Library types with a conventional string representation.
fn well_known_schema(path: &TypePath) -> Option<Schema> {
    let schema = match path.name() {
        "DateTime" | "NaiveDateTime" | "SystemTime" | "OffsetDateTime" | "PrimitiveDateTime" => {
            Schema::typed("string").with_format("date-time")
        }
        "NaiveDate" => Schema::typed("string").with_format("date"),
        "NaiveTime" => Schema::typed("string").with_format("time"),
        "Uuid" => Schema::typed("string").with_format("uuid"),
        "Url" => Schema::typed("string").with_format("uri"),
        "Decimal" | "BigDecimal" => Schema::typed("string").with_format("decimal"),
        "Bytes" | "BytesMut" => Schema::binary(),
        "Value" | "RawValue" => Schema::default(),
        _ => return None,
    };
    Some(schema)
}

/// `u256`, `f16`, `i9`: shaped like a primitive but not in the table.
fn looks_numeric(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some('i' | 'u' | 'f')) && name.len() > 1 && chars.all(|c| c.is_ascii_digit())
}
