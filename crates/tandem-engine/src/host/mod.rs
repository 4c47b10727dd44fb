//! Host type model
//!
//! Explicit metadata standing in for runtime reflection: types, their
//! members, live objects and the values exchanged with host members.

pub mod assembly;
pub mod builder;
pub mod members;
pub mod object;
pub mod types;

pub use assembly::{HostAssembly, TypeGroup};
pub use builder::TypeBuilder;
pub use members::{
    CallContext, ConstructorInfo, EventHandler, EventInfo, FieldInfo, FieldStorage, Invoke, MethodInfo, Operator,
    ParameterInfo, PropertyInfo, TypeMembers, Visibility,
};
pub use object::{default_value, HostArray, HostObject, HostObjectRef, HostValue};
pub use types::{
    array_type, primitive, GenericConstraint, GenericParam, HostType, HostTypeId, HostTypeRef, Primitive, TypeKind,
    TypeRef,
};
