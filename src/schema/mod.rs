//! Parameter schema handling: definition types, parsing, and
//! normalization of caller-supplied values into desired state.

mod normalizer;
mod parser;
mod spec;

pub use normalizer::{Normalized, Normalizer};
pub use parser::{find_definition_file, DefinitionParser, DEFAULT_DEFINITION_FILES};
pub use spec::{
    Constraints, ModuleDefinition, Mutability, ParamKind, ParamSpec, Schema, TargetConfig,
    TargetKind, STATE_PARAM,
};
