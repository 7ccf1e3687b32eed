//! Canonical type reference model: a base plus an ordered list of
//! modifiers (pointer / array / function) plus a qualifier set. This is
//! the shape every declarator in the declaration parser reduces to, and
//! the shape the definition store resolves one level of typedef/tag
//! indirection against.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The innermost thing a declarator names: a built-in keyword, a
/// previously-seen type name (`typedef`, `struct`, `union`, `enum`), or the
/// synthetic id of an anonymous aggregate defined inline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaseType {
    Primitive(String),
    Named(String),
    AnonymousId(String),
}

/// A calling convention or placement modifier recognized only because the
/// active [`crate::config::ParserConfig`] registered it (`__stdcall`,
/// `near`, `far`, and so on) — never semantic pointer classes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Qualifier {
    Const,
    Volatile,
    Static,
    Extern,
    Inline,
    Restrict,
    /// A configuration-registered modifier keyword, carried verbatim.
    Named(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: Option<String>,
    pub ty: TypeRef,
}

/// One layer of derivation applied to a base type, outermost last: index 0
/// is the layer nearest the base type, and the last entry is the variable's
/// own type. `int (*p)[4]` — pointer to array of 4 ints, p itself being the
/// pointer — is `[Array(Some(4)), Pointer]`, while `int *q[4]` — array of
/// pointers, q itself being the array — is `[Pointer, Array(Some(4))]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Modifier {
    Pointer,
    Array(Option<i64>),
    Function { params: Vec<Param>, variadic: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TypeRef {
    pub base: Option<BaseType>,
    pub modifiers: Vec<Modifier>,
    pub qualifiers: Vec<Qualifier>,
}

impl TypeRef {
    pub fn primitive(name: impl Into<String>) -> Self {
        Self {
            base: Some(BaseType::Primitive(name.into())),
            modifiers: Vec::new(),
            qualifiers: Vec::new(),
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            base: Some(BaseType::Named(name.into())),
            modifiers: Vec::new(),
            qualifiers: Vec::new(),
        }
    }

    /// Wrap this type in one more layer of pointer, as its own outermost
    /// (last) modifier.
    pub fn with_pointer(mut self) -> Self {
        self.modifiers.push(Modifier::Pointer);
        self
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self.modifiers.last(), Some(Modifier::Pointer))
    }

    /// The type name this reference points at one level of indirection,
    /// if its base is a named (not yet resolved) type.
    pub fn base_name(&self) -> Option<&str> {
        match &self.base {
            Some(BaseType::Named(n)) => Some(n),
            _ => None,
        }
    }
}

/// Anything `resolve` can look up a base name against: the definition
/// store exposes this without this module depending on its concrete type.
pub trait TypeNameResolver {
    /// Returns the aliased type, if `name` is a typedef; `None` if it names
    /// a struct/union/enum tag or isn't known at all (those are terminal).
    fn typedef_target(&self, name: &str) -> Option<TypeRef>;
}

/// Resolve one step of user-type-name (typedef) indirection: if `ty`'s base
/// is a typedef name, splice the typedef's own modifiers/qualifiers in
/// ahead of `ty`'s, and replace the base. Struct/union/enum tag names and
/// primitives are already terminal and returned unchanged. Cyclic typedef
/// chains (`typedef A B; typedef B A;`) are detected via `seen` and the
/// reference is returned as-is, unresolved, rather than looping forever.
pub fn resolve(ty: &TypeRef, resolver: &dyn TypeNameResolver) -> TypeRef {
    resolve_inner(ty, resolver, &mut HashSet::new())
}

fn resolve_inner(ty: &TypeRef, resolver: &dyn TypeNameResolver, seen: &mut HashSet<String>) -> TypeRef {
    let Some(name) = ty.base_name() else {
        return ty.clone();
    };
    // A pointer or function boundary before reaching the named base means
    // this isn't a plain alias chain; leave indirection to the consumer.
    if !ty.modifiers.is_empty() {
        return ty.clone();
    }
    if seen.contains(name) {
        return ty.clone();
    }
    let Some(target) = resolver.typedef_target(name) else {
        return ty.clone();
    };
    seen.insert(name.to_string());
    let mut combined = resolve_inner(&target, resolver, seen);
    // The outer reference's own qualifiers (e.g. `const MyAlias x`) still
    // apply on top of whatever the alias itself carried.
    combined.qualifiers.extend(ty.qualifiers.iter().cloned());
    combined
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeResolver(HashMap<String, TypeRef>);

    impl TypeNameResolver for FakeResolver {
        fn typedef_target(&self, name: &str) -> Option<TypeRef> {
            self.0.get(name).cloned()
        }
    }

    #[test]
    fn pointer_to_array_vs_array_of_pointers() {
        // int (*p)[4] — p itself is the pointer, so Pointer is outermost/last.
        let ptr_to_array = TypeRef {
            base: Some(BaseType::Primitive("int".into())),
            modifiers: vec![Modifier::Array(Some(4)), Modifier::Pointer],
            qualifiers: vec![],
        };
        // int *p[4] — p itself is the array, so Array is outermost/last.
        let array_of_ptrs = TypeRef {
            base: Some(BaseType::Primitive("int".into())),
            modifiers: vec![Modifier::Pointer, Modifier::Array(Some(4))],
            qualifiers: vec![],
        };
        assert_ne!(ptr_to_array, array_of_ptrs);
        assert_eq!(ptr_to_array.modifiers.last(), Some(&Modifier::Pointer));
        assert_eq!(array_of_ptrs.modifiers.last(), Some(&Modifier::Array(Some(4))));
    }

    #[test]
    fn resolves_one_step_of_typedef_indirection() {
        let mut map = HashMap::new();
        map.insert("myint".to_string(), TypeRef::primitive("int"));
        let resolver = FakeResolver(map);
        let alias = TypeRef::named("myint");
        let resolved = resolve(&alias, &resolver);
        assert_eq!(resolved.base, Some(BaseType::Primitive("int".into())));
    }

    #[test]
    fn pointer_or_function_boundary_stops_resolution() {
        let mut map = HashMap::new();
        map.insert("myint".to_string(), TypeRef::primitive("int"));
        let resolver = FakeResolver(map);
        let ptr_alias = TypeRef::named("myint").with_pointer();
        let resolved = resolve(&ptr_alias, &resolver);
        // Left as a pointer to the named type; caller resolves the pointee
        // on demand rather than flattening through the pointer.
        assert_eq!(resolved.base_name(), Some("myint"));
    }

    #[test]
    fn cyclic_typedef_chain_does_not_loop() {
        let mut map = HashMap::new();
        map.insert("a".to_string(), TypeRef::named("b"));
        map.insert("b".to_string(), TypeRef::named("a"));
        let resolver = FakeResolver(map);
        let alias = TypeRef::named("a");
        let resolved = resolve(&alias, &resolver);
        // Unresolved rather than infinite: base is still a named reference.
        assert!(resolved.base_name().is_some());
    }

    #[test]
    fn tag_names_and_primitives_are_terminal() {
        struct EmptyResolver;
        impl TypeNameResolver for EmptyResolver {
            fn typedef_target(&self, _name: &str) -> Option<TypeRef> {
                None
            }
        }
        let tag = TypeRef::named("struct point");
        let resolved = resolve(&tag, &EmptyResolver);
        assert_eq!(resolved, tag);
    }
}
