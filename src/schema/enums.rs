//! Enum detection.
//!
//! Two shapes are recognized: enums whose variants are all unit variants, and
//! named types with constants of that type (module level or associated) that
//! carry a doc-comment label. Members are ordered by underlying value, never
//! by declaration order.

use super::{Schema, X_ENUM_LABELS};
use crate::eval::{call_name, Evaluator, Value};
use crate::index::attrs::{Docs, SerdeAttributes};
use crate::index::TypeIndex;
use serde_json::Value as Json;
use syn::Expr;

/// Ordering key of a member.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Rank {
    Int(i64),
    Str(String),
}

/// One enum member as emitted into the schema.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumMember {
    pub name: String,
    pub value: Json,
    pub rank: Rank,
    pub label: Option<String>,
}

/// Members of an enum made only of unit variants, `None` otherwise.
///
/// Serialized values are the (renamed) variant names; the ordering follows
/// explicit discriminants, counting up from the previous one like rustc does.
pub fn unit_variants(item: &syn::ItemEnum, evaluator: &Evaluator<'_>) -> Option<Vec<EnumMember>> {
    if item.variants.is_empty() || item.variants.iter().any(|v| !matches!(v.fields, syn::Fields::Unit)) {
        return None;
    }
    let container = SerdeAttributes::from_attrs(&item.attrs);
    let mut next = 0i64;
    let mut members = Vec::new();
    for variant in &item.variants {
        let discriminant = variant
            .discriminant
            .as_ref()
            .and_then(|(_, expr)| evaluator.eval_int(expr))
            .unwrap_or(next);
        next = discriminant.saturating_add(1);

        let serde_attrs = SerdeAttributes::from_attrs(&variant.attrs);
        if serde_attrs.skip {
            continue;
        }
        let ident = variant.ident.to_string();
        let value = serde_attrs
            .rename
            .clone()
            .unwrap_or_else(|| container.renamed(&ident));
        members.push(EnumMember {
            name: ident,
            value: Json::String(value),
            rank: Rank::Int(discriminant),
            label: Docs::from_attrs(&variant.attrs).summary,
        });
    }
    Some(members)
}

/// Labeled constants of `type_name`, `None` when no constant carries a label.
pub fn typed_constants(index: &TypeIndex, type_name: &str) -> Option<Vec<EnumMember>> {
    let mut members = Vec::new();
    for decl in index.consts_of_type(type_name) {
        let evaluator = Evaluator::new(index, &decl.module, decl.self_ty.as_deref());
        let value = match constructor_arg(&decl.expr, type_name) {
            Some(arg) => evaluator.eval(arg),
            None => evaluator.eval(&decl.expr),
        };
        let (value, rank) = match value {
            Some(Value::Int(n)) => (Json::from(n), Rank::Int(n)),
            Some(Value::Str(s)) => (Json::String(s.clone()), Rank::Str(s)),
            _ => continue,
        };
        members.push(EnumMember {
            name: decl.name.clone(),
            value,
            rank,
            label: Docs::from_attrs(&decl.attrs).summary,
        });
    }
    if members.iter().any(|m| m.label.is_some()) {
        Some(members)
    } else {
        None
    }
}

/// `Gender(1)` or `Self(1)` yields `1`.
fn constructor_arg<'e>(expr: &'e Expr, type_name: &str) -> Option<&'e Expr> {
    match expr {
        Expr::Call(call) if call.args.len() == 1 => {
            let name = call_name(call)?;
            if name == type_name || name == "Self" {
                call.args.first()
            } else {
                None
            }
        }
        Expr::Paren(p) => constructor_arg(&p.expr, type_name),
        _ => None,
    }
}

/// Writes ordered members into `schema`.
pub fn apply(schema: &mut Schema, mut members: Vec<EnumMember>) {
    members.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.name.cmp(&b.name)));
    schema.enum_values = Some(members.iter().map(|m| m.value.clone()).collect());

    if members.iter().all(|m| m.label.is_none()) {
        return;
    }
    let labels: Vec<Json> = members
        .iter()
        .map(|m| Json::String(m.label.clone().unwrap_or_else(|| m.name.clone())))
        .collect();
    schema.extensions.insert(X_ENUM_LABELS.to_string(), Json::Array(labels));

    let block: Vec<String> = members
        .iter()
        .filter_map(|m| m.label.as_ref().map(|label| format!("- {}: {}", m.name, label)))
        .collect();
    let block = block.join("\n");
    schema.description = Some(match schema.description.take() {
        Some(existing) => format!("{}\n\n{}", existing, block),
        None => block,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParsedFile;
    use pretty_assertions::assert_eq;

    fn index_of(source: &str) -> TypeIndex {
        TypeIndex::new(&[ParsedFile::from_source("src/lib.rs", source).unwrap()])
    }

    #[test]
    fn test_unit_variants_ordered_by_discriminant() {
        let item: syn::ItemEnum = syn::parse_str(
            r#"
            #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
            pub enum Pet {
                /// cat
                Cat = 1,
                /// dog
                Dog = 0,
                /// fish
                GoldFish = 2,
            }
            "#,
        )
        .unwrap();
        let index = TypeIndex::default();
        let evaluator = Evaluator::new(&index, &[], None);
        let members = unit_variants(&item, &evaluator).unwrap();

        let mut schema = Schema::typed("string");
        apply(&mut schema, members);
        assert_eq!(
            schema.enum_values.unwrap(),
            vec![Json::from("DOG"), Json::from("CAT"), Json::from("GOLD_FISH")]
        );
        assert_eq!(
            schema.extensions[X_ENUM_LABELS],
            serde_json::json!(["dog", "cat", "fish"])
        );
        assert_eq!(
            schema.description.as_deref(),
            Some("- Dog: dog\n- Cat: cat\n- GoldFish: fish")
        );
    }

    #[test]
    fn test_implicit_discriminants_count_up() {
        let item: syn::ItemEnum = syn::parse_str("enum Level { Low, Mid = 5, High }").unwrap();
        let index = TypeIndex::default();
        let evaluator = Evaluator::new(&index, &[], None);
        let ranks: Vec<Rank> = unit_variants(&item, &evaluator)
            .unwrap()
            .into_iter()
            .map(|m| m.rank)
            .collect();
        assert_eq!(ranks, vec![Rank::Int(0), Rank::Int(5), Rank::Int(6)]);
    }

    #[test]
    fn test_largest_discriminant() {
        let item: syn::ItemEnum =
            syn::parse_str("enum Edge { Top = 9223372036854775807, Bottom = 0 }").unwrap();
        let index = TypeIndex::default();
        let evaluator = Evaluator::new(&index, &[], None);
        let ranks: Vec<Rank> = unit_variants(&item, &evaluator)
            .unwrap()
            .into_iter()
            .map(|m| m.rank)
            .collect();
        assert_eq!(ranks, vec![Rank::Int(i64::MAX), Rank::Int(0)]);
    }

    #[test]
    fn test_data_enum_is_not_unit() {
        let item: syn::ItemEnum = syn::parse_str("enum Shape { Circle(f64), Empty }").unwrap();
        let index = TypeIndex::default();
        let evaluator = Evaluator::new(&index, &[], None);
        assert!(unit_variants(&item, &evaluator).is_none());
    }

    #[test]
    fn test_typed_constants() {
        let index = index_of(
            r#"
            pub struct Gender(u8);
            impl Gender {
                /// female
                pub const FEMALE: Gender = Gender(2);
                /// male
                pub const MALE: Self = Self(1);
            }
            /// unknown
            pub const UNKNOWN: Gender = Gender(0);
            "#,
        );
        let members = typed_constants(&index, "Gender").unwrap();
        let mut schema = Schema::typed("integer");
        apply(&mut schema, members);
        assert_eq!(
            schema.enum_values.unwrap(),
            vec![Json::from(0), Json::from(1), Json::from(2)]
        );
        assert_eq!(
            schema.description.as_deref(),
            Some("- UNKNOWN: unknown\n- MALE: male\n- FEMALE: female")
        );
    }

    #[test]
    fn test_unlabeled_constants_are_not_an_enum() {
        let index = index_of("pub struct Limit(u32); pub const MAX: Limit = Limit(10);");
        assert!(typed_constants(&index, "Limit").is_none());
    }
}
