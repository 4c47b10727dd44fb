//! Member metadata: fields, properties, methods, constructors, events
//!
//! Members carry their implementation as closures. Methods, constructors
//! and property accessors receive a [`CallContext`] giving access to the
//! receiver, explicit generic type arguments and the live script state.

use std::cell::RefCell;
use std::rc::Rc;

use tandem_sdk::{ScriptState, MULTRET};

use super::object::{HostObject, HostObjectRef, HostValue};
use super::types::{GenericParam, HostTypeRef, TypeRef};
use crate::environment::Bridge;
use crate::error::HostException;
use crate::marshal;
use crate::value::Value;

/// Closure implementing a method, constructor or property accessor
pub type Invoke = Rc<dyn Fn(&mut CallContext<'_>, Vec<HostValue>) -> Result<HostValue, HostException>>;

/// Closure implementing an event's add or remove accessor
pub type EventHandler = Rc<dyn Fn(&mut CallContext<'_>, Value) -> Result<(), HostException>>;

/// Reads an instance field
pub type FieldGetter = Rc<dyn Fn(&HostObject) -> HostValue>;

/// Writes an instance field
pub type FieldSetter = Rc<dyn Fn(&HostObject, HostValue)>;

/// Member accessibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Public,
    Internal,
    Private,
}

impl Visibility {
    #[inline]
    pub fn is_public(self) -> bool {
        self == Visibility::Public
    }
}

// ============================================================================
// Call context
// ============================================================================

/// What a host member sees while it runs
pub struct CallContext<'a> {
    pub(crate) bridge: &'a Bridge,
    pub(crate) state: &'a mut dyn ScriptState,
    pub(crate) owner: &'a HostTypeRef,
    pub(crate) receiver: Option<HostObjectRef>,
    pub(crate) type_args: &'a [HostTypeRef],
}

impl<'a> CallContext<'a> {
    /// Type declaring the member; the type being built for constructors
    pub fn owner(&self) -> &HostTypeRef {
        self.owner
    }

    /// The instance the member was invoked on (`None` for static members)
    pub fn receiver(&self) -> Option<&HostObjectRef> {
        self.receiver.as_ref()
    }

    /// The receiver, or an exception for static invocation
    pub fn this(&self) -> Result<&HostObjectRef, HostException> {
        self.receiver
            .as_ref()
            .ok_or_else(|| HostException::invalid_operation("instance member invoked without a receiver"))
    }

    /// Explicit type arguments of a generic method
    pub fn type_args(&self) -> &[HostTypeRef] {
        self.type_args
    }

    pub fn type_arg(&self, n: usize) -> Result<&HostTypeRef, HostException> {
        self.type_args
            .get(n)
            .ok_or_else(|| HostException::argument(format!("missing type argument {}", n)))
    }

    /// The embedded runtime running the call
    pub fn state(&mut self) -> &mut dyn ScriptState {
        &mut *self.state
    }

    /// Call a script function from host code
    pub fn call(&mut self, function: &Value, args: &[HostValue]) -> Result<Vec<Value>, HostException> {
        let script_error = |message: String| HostException::new("ScriptError", message);
        let base = self.state.top();
        marshal::push_value(self.bridge, self.state, function).map_err(|e| script_error(e.to_string()))?;
        for arg in args {
            if let Err(e) = marshal::push_host(self.bridge, self.state, arg) {
                self.state.set_top(base);
                return Err(script_error(e.to_string()));
            }
        }
        self.state
            .pcall(args.len(), MULTRET)
            .map_err(|e| script_error(e.to_string()))?;
        let top = self.state.top();
        let results = (base + 1..=top)
            .map(|idx| marshal::pull_value(self.bridge, self.state, idx))
            .collect();
        self.state.set_top(base);
        Ok(results)
    }
}

// ============================================================================
// Parameters and operators
// ============================================================================

/// A method, constructor or indexer parameter
#[derive(Clone)]
pub struct ParameterInfo {
    pub name: String,
    pub ty: TypeRef,
    /// Value used when the caller omits the argument
    pub default: Option<HostValue>,
    /// Variadic tail collecting the remaining arguments into an array
    pub is_params: bool,
}

impl ParameterInfo {
    pub fn new(name: impl Into<String>, ty: impl Into<TypeRef>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            default: None,
            is_params: false,
        }
    }

    /// Optional parameter
    pub fn default_value(mut self, value: impl Into<HostValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Variadic tail of the given element type
    pub fn params(name: impl Into<String>, element: impl Into<TypeRef>) -> Self {
        Self {
            name: name.into(),
            ty: TypeRef::array(element),
            default: None,
            is_params: true,
        }
    }
}

/// Overloadable operators exposed as metamethods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Unm,
    Eq,
    Lt,
    Le,
    Concat,
}

impl Operator {
    /// Every operator
    pub const ALL: [Operator; 10] = [
        Operator::Add,
        Operator::Sub,
        Operator::Mul,
        Operator::Div,
        Operator::Mod,
        Operator::Unm,
        Operator::Eq,
        Operator::Lt,
        Operator::Le,
        Operator::Concat,
    ];

    /// Metatable event name
    pub const fn event(self) -> &'static str {
        match self {
            Operator::Add => "__add",
            Operator::Sub => "__sub",
            Operator::Mul => "__mul",
            Operator::Div => "__div",
            Operator::Mod => "__mod",
            Operator::Unm => "__unm",
            Operator::Eq => "__eq",
            Operator::Lt => "__lt",
            Operator::Le => "__le",
            Operator::Concat => "__concat",
        }
    }

    /// Host-side member name
    pub const fn method_name(self) -> &'static str {
        match self {
            Operator::Add => "op_Addition",
            Operator::Sub => "op_Subtraction",
            Operator::Mul => "op_Multiply",
            Operator::Div => "op_Division",
            Operator::Mod => "op_Modulus",
            Operator::Unm => "op_UnaryNegation",
            Operator::Eq => "op_Equality",
            Operator::Lt => "op_LessThan",
            Operator::Le => "op_LessThanOrEqual",
            Operator::Concat => "op_Concat",
        }
    }

    pub const fn is_unary(self) -> bool {
        matches!(self, Operator::Unm)
    }
}

// ============================================================================
// Fields
// ============================================================================

/// Where a field's value lives
pub enum FieldStorage {
    Instance { get: FieldGetter, set: FieldSetter },
    Static(RefCell<HostValue>),
    Const(HostValue),
}

pub struct FieldInfo {
    pub name: String,
    pub ty: TypeRef,
    pub visibility: Visibility,
    pub read_only: bool,
    pub storage: FieldStorage,
}

impl FieldInfo {
    /// Instance field backed by accessor closures
    pub fn instance(
        name: impl Into<String>,
        ty: impl Into<TypeRef>,
        get: impl Fn(&HostObject) -> HostValue + 'static,
        set: impl Fn(&HostObject, HostValue) + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            visibility: Visibility::Public,
            read_only: false,
            storage: FieldStorage::Instance {
                get: Rc::new(get),
                set: Rc::new(set),
            },
        }
    }

    /// Static field holding its own value
    pub fn static_field(name: impl Into<String>, ty: impl Into<TypeRef>, initial: impl Into<HostValue>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            visibility: Visibility::Public,
            read_only: false,
            storage: FieldStorage::Static(RefCell::new(initial.into())),
        }
    }

    /// Compile-time constant
    pub fn constant(name: impl Into<String>, ty: impl Into<TypeRef>, value: impl Into<HostValue>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            visibility: Visibility::Public,
            read_only: true,
            storage: FieldStorage::Const(value.into()),
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn is_static(&self) -> bool {
        !matches!(self.storage, FieldStorage::Instance { .. })
    }

    pub fn is_const(&self) -> bool {
        matches!(self.storage, FieldStorage::Const(_))
    }
}

// ============================================================================
// Properties
// ============================================================================

/// A property, or an indexer when it has index parameters
pub struct PropertyInfo {
    pub name: String,
    pub ty: TypeRef,
    pub is_static: bool,
    pub index_params: Vec<ParameterInfo>,
    /// Receives the index arguments
    pub getter: Option<Invoke>,
    /// Receives the index arguments followed by the new value
    pub setter: Option<Invoke>,
    pub get_visibility: Visibility,
    pub set_visibility: Visibility,
}

impl PropertyInfo {
    pub fn new(name: impl Into<String>, ty: impl Into<TypeRef>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            is_static: false,
            index_params: Vec::new(),
            getter: None,
            setter: None,
            get_visibility: Visibility::Public,
            set_visibility: Visibility::Public,
        }
    }

    pub fn getter(
        mut self,
        f: impl Fn(&mut CallContext<'_>, Vec<HostValue>) -> Result<HostValue, HostException> + 'static,
    ) -> Self {
        self.getter = Some(Rc::new(f));
        self
    }

    pub fn setter(
        mut self,
        f: impl Fn(&mut CallContext<'_>, Vec<HostValue>) -> Result<HostValue, HostException> + 'static,
    ) -> Self {
        self.setter = Some(Rc::new(f));
        self
    }

    /// Turn the property into an indexer taking `params`
    pub fn indexer(mut self, params: Vec<ParameterInfo>) -> Self {
        self.index_params = params;
        self
    }

    pub fn static_property(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn private_getter(mut self) -> Self {
        self.get_visibility = Visibility::Private;
        self
    }

    pub fn private_setter(mut self) -> Self {
        self.set_visibility = Visibility::Private;
        self
    }

    pub fn is_indexer(&self) -> bool {
        !self.index_params.is_empty()
    }

    /// Has a public getter
    pub fn readable(&self) -> bool {
        self.getter.is_some() && self.get_visibility.is_public()
    }

    /// Has a public setter
    pub fn writable(&self) -> bool {
        self.setter.is_some() && self.set_visibility.is_public()
    }
}

// ============================================================================
// Methods and constructors
// ============================================================================

pub struct MethodInfo {
    pub name: String,
    pub params: Vec<ParameterInfo>,
    pub ret: TypeRef,
    pub is_static: bool,
    pub visibility: Visibility,
    pub generic_params: Vec<GenericParam>,
    pub invoke: Invoke,
}

impl MethodInfo {
    pub fn new(
        name: impl Into<String>,
        params: Vec<ParameterInfo>,
        ret: impl Into<TypeRef>,
        invoke: impl Fn(&mut CallContext<'_>, Vec<HostValue>) -> Result<HostValue, HostException> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            params,
            ret: ret.into(),
            is_static: false,
            visibility: Visibility::Public,
            generic_params: Vec::new(),
            invoke: Rc::new(invoke),
        }
    }

    pub fn static_method(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// Make the method generic; parameters refer to them through [`TypeRef::MethodParam`]
    pub fn generic(mut self, params: Vec<GenericParam>) -> Self {
        self.generic_params = params;
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn is_generic(&self) -> bool {
        !self.generic_params.is_empty()
    }
}

pub struct ConstructorInfo {
    pub params: Vec<ParameterInfo>,
    pub visibility: Visibility,
    /// Returns the new instance
    pub invoke: Invoke,
}

impl ConstructorInfo {
    pub fn new(
        params: Vec<ParameterInfo>,
        invoke: impl Fn(&mut CallContext<'_>, Vec<HostValue>) -> Result<HostValue, HostException> + 'static,
    ) -> Self {
        Self {
            params,
            visibility: Visibility::Public,
            invoke: Rc::new(invoke),
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }
}

// ============================================================================
// Events
// ============================================================================

pub struct EventInfo {
    pub name: String,
    pub is_static: bool,
    pub visibility: Visibility,
    pub add: EventHandler,
    pub remove: EventHandler,
}

impl EventInfo {
    pub fn new(
        name: impl Into<String>,
        add: impl Fn(&mut CallContext<'_>, Value) -> Result<(), HostException> + 'static,
        remove: impl Fn(&mut CallContext<'_>, Value) -> Result<(), HostException> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            is_static: false,
            visibility: Visibility::Public,
            add: Rc::new(add),
            remove: Rc::new(remove),
        }
    }

    pub fn static_event(mut self) -> Self {
        self.is_static = true;
        self
    }
}

/// Members declared directly on one type
#[derive(Default)]
pub struct TypeMembers {
    pub fields: Vec<Rc<FieldInfo>>,
    pub properties: Vec<Rc<PropertyInfo>>,
    pub methods: Vec<Rc<MethodInfo>>,
    pub constructors: Vec<Rc<ConstructorInfo>>,
    pub events: Vec<Rc<EventInfo>>,
    pub nested: Vec<HostTypeRef>,
    pub operators: Vec<(Operator, Rc<MethodInfo>)>,
}
