//! Fluent construction of host type metadata
//!
//! ```ignore
//! let point = TypeBuilder::structure::<Point>("Point")
//!     .namespace("Geometry")
//!     .field(FieldInfo::instance("X", Primitive::F64, get_x, set_x))
//!     .constructor(ConstructorInfo::new(params, make_point))
//!     .build();
//! ```

use std::any::Any;
use std::rc::Rc;

use tracing::debug;

use super::members::{ConstructorInfo, EventInfo, FieldInfo, MethodInfo, Operator, PropertyInfo};
use super::object::HostObject;
use super::types::{GenericParam, HostType, HostTypeRef, TypeKind};

/// Builder for a [`HostType`]
pub struct TypeBuilder {
    ty: HostType,
}

impl TypeBuilder {
    fn with_kind(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            ty: HostType::bare(name, kind),
        }
    }

    /// Reference type
    pub fn class(name: impl Into<String>) -> Self {
        Self::with_kind(name, TypeKind::Class)
    }

    /// Value type whose payload is a `T`; copies go through `Clone` and
    /// argument-less construction through `Default`
    pub fn structure<T: Any + Clone + Default>(name: impl Into<String>) -> Self {
        let mut builder = Self::with_kind(name, TypeKind::Struct);
        builder.ty.cloner = Some(Rc::new(|payload: &dyn Any| {
            payload
                .downcast_ref::<T>()
                .map(|value| Box::new(value.clone()) as Box<dyn Any>)
        }));
        builder.ty.default_value = Some(Rc::new(|| Box::new(T::default()) as Box<dyn Any>));
        builder
    }

    pub fn interface(name: impl Into<String>) -> Self {
        Self::with_kind(name, TypeKind::Interface)
    }

    /// Enum with named integer values
    pub fn enumeration<'a>(name: impl Into<String>, values: impl IntoIterator<Item = (&'a str, i64)>) -> Self {
        let mut builder = Self::with_kind(name, TypeKind::Enum);
        builder.ty.enum_values = values.into_iter().map(|(n, v)| (n.to_string(), v)).collect();
        builder
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.ty.namespace = namespace.into();
        self
    }

    pub fn base(mut self, base: &HostTypeRef) -> Self {
        self.ty.base = Some(base.clone());
        self
    }

    pub fn implements(mut self, interface: &HostTypeRef) -> Self {
        self.ty.interfaces.push(interface.clone());
        self
    }

    /// Mark as not constructible
    pub fn abstract_type(mut self) -> Self {
        self.ty.is_abstract = true;
        self
    }

    /// Make this an open generic definition closed by `instantiate`
    pub fn generic(
        mut self,
        params: Vec<GenericParam>,
        instantiate: impl Fn(&HostTypeRef, &[HostTypeRef]) -> HostTypeRef + 'static,
    ) -> Self {
        self.ty.generic_params = params;
        self.ty.instantiator = Some(Rc::new(instantiate));
        self
    }

    /// Record that this type closes `definition` over `args`
    pub fn closed_from(mut self, definition: &HostTypeRef, args: &[HostTypeRef]) -> Self {
        self.ty.generic_definition = Some(definition.clone());
        self.ty.generic_args = args.to_vec();
        if self.ty.namespace.is_empty() {
            self.ty.namespace = definition.namespace().to_string();
        }
        self
    }

    /// Custom `ToString` for instances
    pub fn display(mut self, f: impl Fn(&HostObject) -> String + 'static) -> Self {
        self.ty.display = Some(Rc::new(f));
        self
    }

    pub fn field(mut self, field: FieldInfo) -> Self {
        self.ty.members.fields.push(Rc::new(field));
        self
    }

    pub fn property(mut self, property: PropertyInfo) -> Self {
        self.ty.members.properties.push(Rc::new(property));
        self
    }

    pub fn method(mut self, method: MethodInfo) -> Self {
        self.ty.members.methods.push(Rc::new(method));
        self
    }

    pub fn constructor(mut self, constructor: ConstructorInfo) -> Self {
        self.ty.members.constructors.push(Rc::new(constructor));
        self
    }

    pub fn event(mut self, event: EventInfo) -> Self {
        self.ty.members.events.push(Rc::new(event));
        self
    }

    /// Expose `ty` as a nested type (visible on the type object only)
    pub fn nested(mut self, ty: &HostTypeRef) -> Self {
        self.ty.members.nested.push(ty.clone());
        self
    }

    /// Overload an operator; the method is always static
    pub fn operator(mut self, op: Operator, method: MethodInfo) -> Self {
        let method = MethodInfo {
            name: op.method_name().to_string(),
            ..method.static_method()
        };
        self.ty.members.operators.push((op, Rc::new(method)));
        self
    }

    pub fn build(self) -> HostTypeRef {
        let members = &self.ty.members;
        debug!(
            target: "tandem::members",
            ty = %self.ty.full_name(),
            fields = members.fields.len(),
            properties = members.properties.len(),
            methods = members.methods.len(),
            "host type built"
        );
        Rc::new(self.ty)
    }
}
