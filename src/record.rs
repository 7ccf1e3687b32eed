//! Declaration records: what the declaration parser produces and the
//! definition store indexes. One variant per `kind` in the store.

use crate::error::SourceLocation;
use crate::types::{Param, TypeRef};
use crate::value::Value;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructField {
    /// `None` for an anonymous nested aggregate promoted into its parent.
    pub name: Option<String>,
    pub ty: TypeRef,
    pub bit_width: Option<i64>,
    pub default: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRecord {
    pub fields: Vec<StructField>,
    /// The `#pragma pack` alignment in effect where this aggregate was
    /// declared.
    pub pack: u32,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumMember {
    pub name: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumRecord {
    pub members: Vec<EnumMember>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedefRecord {
    pub target: TypeRef,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableRecord {
    pub ty: TypeRef,
    pub initializer: Option<Value>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionRecord {
    pub return_type: TypeRef,
    pub params: Vec<Param>,
    pub variadic: bool,
    pub location: SourceLocation,
}

/// One parsed top-level (or promoted-anonymous) declaration, tagged with
/// the name it will be indexed under in the [`crate::store::DefinitionStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Definition {
    Typedef(String, TypedefRecord),
    Struct(String, AggregateRecord),
    Union(String, AggregateRecord),
    Enum(String, EnumRecord),
    Function(String, FunctionRecord),
    Variable(String, VariableRecord),
}

impl Definition {
    pub fn name(&self) -> &str {
        match self {
            Definition::Typedef(n, _)
            | Definition::Struct(n, _)
            | Definition::Union(n, _)
            | Definition::Enum(n, _)
            | Definition::Function(n, _)
            | Definition::Variable(n, _) => n,
        }
    }
}
