//! Definition store: the parsed result of one or more headers, indexed by
//! kind and name with insertion order preserved for iteration. Frozen once
//! construction finishes — everything here is read-only and `Send + Sync`.

use crate::macros::{Macro, MacroTable};
use crate::record::{AggregateRecord, Definition, EnumRecord, FunctionRecord, TypedefRecord, VariableRecord};
use crate::types::{resolve, TypeNameResolver, TypeRef};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An insertion-ordered `name -> record` table for one definition kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KindTable<T> {
    order: Vec<String>,
    entries: HashMap<String, T>,
}

impl<T> KindTable<T> {
    fn insert(&mut self, name: String, value: T) {
        if !self.entries.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.entries.insert(name, value);
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.order.iter().map(move |n| (n.as_str(), self.entries.get(n).unwrap()))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// The full parsed result: one [`KindTable`] per definition kind, plus the
/// macro table inherited from preprocessing (split into object-like
/// `macros` and function-like `fnmacros`, matching the kind list consumers
/// index against) and a flattened `values` table used by [`DefinitionStore::eval`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefinitionStore {
    pub types: KindTable<TypedefRecord>,
    pub variables: KindTable<VariableRecord>,
    pub structs: KindTable<AggregateRecord>,
    pub unions: KindTable<AggregateRecord>,
    pub enums: KindTable<EnumRecord>,
    pub functions: KindTable<FunctionRecord>,
    pub macros: KindTable<Vec<crate::token::Token>>,
    pub fnmacros: KindTable<(Vec<String>, Vec<crate::token::Token>, bool)>,
    pub values: KindTable<Value>,
}

/// The kind a definition or macro is filed under, for the generic `get`/
/// `iterate` entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Types,
    Variables,
    Structs,
    Unions,
    Enums,
    Functions,
    Macros,
    FnMacros,
    Values,
}

impl DefinitionStore {
    /// Fold a file's parsed [`Definition`]s into the store. Later
    /// definitions of the same name under the same kind replace earlier
    /// ones (matching `#define` redefinition semantics generalized across
    /// all kinds), while insertion order is preserved from first sight.
    pub fn absorb_definitions(&mut self, defs: Vec<Definition>) {
        for def in defs {
            match def {
                Definition::Typedef(name, rec) => self.types.insert(name, rec),
                Definition::Struct(name, rec) => self.structs.insert(name, rec),
                Definition::Union(name, rec) => self.unions.insert(name, rec),
                Definition::Enum(name, rec) => {
                    for member in &rec.members {
                        self.values.insert(member.name.clone(), Value::Int64(member.value));
                    }
                    self.enums.insert(name, rec);
                }
                Definition::Function(name, rec) => self.functions.insert(name, rec),
                Definition::Variable(name, rec) => {
                    if let Some(v) = rec.initializer.clone() {
                        self.values.insert(name.clone(), v);
                    }
                    self.variables.insert(name, rec);
                }
            }
        }
    }

    /// Fold a header's macro table in: object-like macros whose replacement
    /// reduces to a plain literal are also filed under `values` so they can
    /// be looked up alongside enum members.
    pub fn absorb_macros(&mut self, macros: &MacroTable) {
        for (name, def) in macros.iter() {
            match def {
                Macro::Object { replacement, .. } => {
                    self.macros.insert(name.to_string(), replacement.clone());
                    if let [single] = replacement.as_slice() {
                        if let Ok(v) = single.text.parse::<i64>() {
                            self.values.insert(name.to_string(), Value::Int64(v));
                        }
                    }
                }
                Macro::Function { params, replacement, variadic, .. } => {
                    self.fnmacros
                        .insert(name.to_string(), (params.clone(), replacement.clone(), *variadic));
                }
            }
        }
    }

    /// Look up a record by kind and name. Returns `None` for an unknown
    /// kind/name combination.
    pub fn get(&self, kind: Kind, name: &str) -> bool {
        match kind {
            Kind::Types => self.types.get(name).is_some(),
            Kind::Variables => self.variables.get(name).is_some(),
            Kind::Structs => self.structs.get(name).is_some(),
            Kind::Unions => self.unions.get(name).is_some(),
            Kind::Enums => self.enums.get(name).is_some(),
            Kind::Functions => self.functions.get(name).is_some(),
            Kind::Macros => self.macros.get(name).is_some(),
            Kind::FnMacros => self.fnmacros.get(name).is_some(),
            Kind::Values => self.values.get(name).is_some(),
        }
    }

    /// Resolve one step of typedef indirection for a type reference, using
    /// this store's own typedef table.
    pub fn resolve(&self, ty: &TypeRef) -> TypeRef {
        resolve(ty, self)
    }

    /// Look up a reduced constant value (enum member or literal object
    /// macro) by name.
    pub fn eval(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }
}

impl TypeNameResolver for DefinitionStore {
    fn typedef_target(&self, name: &str) -> Option<TypeRef> {
        self.types.get(name).map(|rec| rec.target.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceLocation;
    use crate::record::{EnumMember, StructField};
    use crate::types::BaseType;

    #[test]
    fn absorbs_struct_and_preserves_insertion_order() {
        let mut store = DefinitionStore::default();
        store.absorb_definitions(vec![
            Definition::Struct(
                "B".into(),
                AggregateRecord { fields: vec![], pack: 8, location: SourceLocation::unknown() },
            ),
            Definition::Struct(
                "A".into(),
                AggregateRecord { fields: vec![], pack: 8, location: SourceLocation::unknown() },
            ),
        ]);
        let names: Vec<&str> = store.structs.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["B", "A"]);
    }

    #[test]
    fn enum_members_populate_values_table() {
        let mut store = DefinitionStore::default();
        store.absorb_definitions(vec![Definition::Enum(
            "Color".into(),
            EnumRecord {
                members: vec![
                    EnumMember { name: "RED".into(), value: 0 },
                    EnumMember { name: "GREEN".into(), value: 1 },
                ],
                location: SourceLocation::unknown(),
            },
        )]);
        assert_eq!(store.eval("RED"), Some(&Value::Int64(0)));
        assert_eq!(store.eval("GREEN"), Some(&Value::Int64(1)));
    }

    #[test]
    fn redefinition_replaces_but_keeps_original_position() {
        let mut store = DefinitionStore::default();
        store.absorb_definitions(vec![Definition::Variable(
            "count".into(),
            VariableRecord { ty: TypeRef::primitive("int"), initializer: Some(Value::Int64(1)), location: SourceLocation::unknown() },
        )]);
        store.absorb_definitions(vec![Definition::Variable(
            "count".into(),
            VariableRecord { ty: TypeRef::primitive("int"), initializer: Some(Value::Int64(2)), location: SourceLocation::unknown() },
        )]);
        assert_eq!(store.variables.len(), 1);
        assert_eq!(store.eval("count"), Some(&Value::Int64(2)));
    }

    #[test]
    fn resolves_typedef_through_store() {
        let mut store = DefinitionStore::default();
        store.absorb_definitions(vec![Definition::Typedef(
            "myint".into(),
            TypedefRecord { target: TypeRef::primitive("int"), location: SourceLocation::unknown() },
        )]);
        let alias = TypeRef::named("myint");
        let resolved = store.resolve(&alias);
        assert_eq!(resolved.base, Some(BaseType::Primitive("int".into())));
    }

    #[test]
    fn struct_field_default_is_not_hoisted_to_values() {
        let mut store = DefinitionStore::default();
        store.absorb_definitions(vec![Definition::Struct(
            "Flags".into(),
            AggregateRecord {
                fields: vec![StructField {
                    name: Some("a".into()),
                    ty: TypeRef::primitive("unsigned"),
                    bit_width: Some(1),
                    default: None,
                }],
                pack: 8,
                location: SourceLocation::unknown(),
            },
        )]);
        assert!(store.eval("a").is_none());
    }
}
