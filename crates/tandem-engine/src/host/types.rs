//! Host type metadata
//!
//! Rust has no runtime reflection, so every host type visible to scripts is
//! described by a [`HostType`]: its kind, inheritance, generic shape and
//! public members. Types are shared as [`HostTypeRef`] and compared by
//! [`HostTypeId`].

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};

use rustc_hash::FxHashMap;

use super::members::{Operator, PropertyInfo, TypeMembers};
use super::object::{HostArray, HostObject, HostValue};

/// Shared handle to a host type
pub type HostTypeRef = Rc<HostType>;

/// Builds a closed generic type from its definition and type arguments
pub type Instantiator = Rc<dyn Fn(&HostTypeRef, &[HostTypeRef]) -> HostTypeRef>;

/// Custom display form of an instance (its `ToString`)
pub type DisplayFn = Rc<dyn Fn(&HostObject) -> String>;

pub(crate) type CloneFn = Rc<dyn Fn(&dyn Any) -> Option<Box<dyn Any>>>;
pub(crate) type DefaultFn = Rc<dyn Fn() -> Box<dyn Any>>;

static NEXT_TYPE_ID: AtomicU32 = AtomicU32::new(1);

/// Unique identity of a host type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostTypeId(u32);

impl HostTypeId {
    fn next() -> Self {
        Self(NEXT_TYPE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id value
    pub const fn raw(self) -> u32 {
        self.0
    }
}

// ============================================================================
// Primitive types
// ============================================================================

/// Built-in host types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Void,
    Bool,
    Char,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    String,
    /// Accepts any value
    Object,
    /// Receives the raw bridge [`Value`](crate::Value)
    Value,
    /// A host type object
    Type,
    Pointer,
}

impl Primitive {
    /// Every primitive, in declaration order
    pub const ALL: [Primitive; 18] = [
        Primitive::Void,
        Primitive::Bool,
        Primitive::Char,
        Primitive::I8,
        Primitive::I16,
        Primitive::I32,
        Primitive::I64,
        Primitive::U8,
        Primitive::U16,
        Primitive::U32,
        Primitive::U64,
        Primitive::F32,
        Primitive::F64,
        Primitive::String,
        Primitive::Object,
        Primitive::Value,
        Primitive::Type,
        Primitive::Pointer,
    ];

    /// Type name
    pub const fn name(self) -> &'static str {
        match self {
            Primitive::Void => "void",
            Primitive::Bool => "bool",
            Primitive::Char => "char",
            Primitive::I8 => "i8",
            Primitive::I16 => "i16",
            Primitive::I32 => "i32",
            Primitive::I64 => "i64",
            Primitive::U8 => "u8",
            Primitive::U16 => "u16",
            Primitive::U32 => "u32",
            Primitive::U64 => "u64",
            Primitive::F32 => "f32",
            Primitive::F64 => "f64",
            Primitive::String => "string",
            Primitive::Object => "object",
            Primitive::Value => "value",
            Primitive::Type => "type",
            Primitive::Pointer => "pointer",
        }
    }

    /// Inclusive range of an integer type
    pub const fn integer_range(self) -> Option<(i128, i128)> {
        match self {
            Primitive::I8 => Some((i8::MIN as i128, i8::MAX as i128)),
            Primitive::I16 => Some((i16::MIN as i128, i16::MAX as i128)),
            Primitive::I32 => Some((i32::MIN as i128, i32::MAX as i128)),
            Primitive::I64 => Some((i64::MIN as i128, i64::MAX as i128)),
            Primitive::U8 => Some((0, u8::MAX as i128)),
            Primitive::U16 => Some((0, u16::MAX as i128)),
            Primitive::U32 => Some((0, u32::MAX as i128)),
            Primitive::U64 => Some((0, u64::MAX as i128)),
            _ => None,
        }
    }

    /// Whether nil cannot be converted to this type
    pub const fn is_value_type(self) -> bool {
        !matches!(
            self,
            Primitive::Void | Primitive::String | Primitive::Object | Primitive::Value | Primitive::Type
        )
    }
}

thread_local! {
    static PRIMITIVES: Vec<HostTypeRef> = Primitive::ALL
        .iter()
        .map(|&p| Rc::new(HostType::bare(p.name(), TypeKind::Primitive(p))))
        .collect();

    static ARRAY_TYPES: RefCell<FxHashMap<(HostTypeId, usize), HostTypeRef>> = RefCell::new(FxHashMap::default());
}

/// The shared type object of a primitive
pub fn primitive(p: Primitive) -> HostTypeRef {
    PRIMITIVES.with(|types| types[p as usize].clone())
}

/// The array type with the given element type and rank
///
/// Array types expose read-only `Length` and `Rank` properties; element
/// access is handled by the index adapters.
pub fn array_type(element: &HostTypeRef, rank: usize) -> HostTypeRef {
    let rank = rank.max(1);
    let key = (element.id(), rank);
    if let Some(ty) = ARRAY_TYPES.with(|cache| cache.borrow().get(&key).cloned()) {
        return ty;
    }

    let mut ty = HostType::bare(
        element.name(),
        TypeKind::Array {
            element: element.clone(),
            rank,
        },
    );
    ty.namespace = element.namespace().to_string();
    ty.members.properties.push(Rc::new(
        PropertyInfo::new("Length", Primitive::I32).getter(|ctx, _| {
            let len = ctx.this()?.with(|array: &HostArray| array.len()).unwrap_or(0);
            Ok(HostValue::I32(len as i32))
        }),
    ));
    ty.members.properties.push(Rc::new(
        PropertyInfo::new("Rank", Primitive::I32).getter(|ctx, _| {
            let rank = ctx.this()?.with(|array: &HostArray| array.rank()).unwrap_or(1);
            Ok(HostValue::I32(rank as i32))
        }),
    ));
    let ty = Rc::new(ty);
    ARRAY_TYPES.with(|cache| cache.borrow_mut().insert(key, ty.clone()));
    ty
}

// ============================================================================
// Kinds, generics, type references
// ============================================================================

/// Kind of a host type
#[derive(Clone)]
pub enum TypeKind {
    Primitive(Primitive),
    Class,
    /// Value type: copied when crossing the boundary
    Struct,
    Enum,
    Interface,
    Array {
        element: HostTypeRef,
        rank: usize,
    },
}

impl fmt::Debug for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeKind::Primitive(p) => write!(f, "Primitive({})", p.name()),
            TypeKind::Class => write!(f, "Class"),
            TypeKind::Struct => write!(f, "Struct"),
            TypeKind::Enum => write!(f, "Enum"),
            TypeKind::Interface => write!(f, "Interface"),
            TypeKind::Array { element, rank } => write!(f, "Array({}, {})", element.display_name(), rank),
        }
    }
}

/// A constraint on a generic parameter
#[derive(Clone)]
pub enum GenericConstraint {
    /// Argument must be a value type
    ValueType,
    /// Argument must be a reference type
    ReferenceType,
    /// Argument must be default-constructible
    DefaultConstructor,
    /// Argument must derive from or implement the given type
    AssignableTo(HostTypeRef),
}

impl GenericConstraint {
    fn describe(&self) -> String {
        match self {
            GenericConstraint::ValueType => "struct".to_string(),
            GenericConstraint::ReferenceType => "class".to_string(),
            GenericConstraint::DefaultConstructor => "new()".to_string(),
            GenericConstraint::AssignableTo(ty) => ty.display_name(),
        }
    }

    fn accepts(&self, arg: &HostType) -> bool {
        match self {
            GenericConstraint::ValueType => arg.is_value_type(),
            GenericConstraint::ReferenceType => !arg.is_value_type(),
            GenericConstraint::DefaultConstructor => arg.has_default_constructor(),
            GenericConstraint::AssignableTo(target) => arg.is_assignable_to(target),
        }
    }
}

/// A generic type or method parameter
#[derive(Clone)]
pub struct GenericParam {
    pub name: String,
    pub constraints: Vec<GenericConstraint>,
}

impl GenericParam {
    /// Unconstrained parameter
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constraints: Vec::new(),
        }
    }

    /// Add a constraint
    pub fn constraint(mut self, constraint: GenericConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }
}

/// Check type arguments against generic parameters
pub(crate) fn check_constraints(params: &[GenericParam], args: &[HostTypeRef]) -> Result<(), String> {
    for (param, arg) in params.iter().zip(args) {
        if let Some(failed) = param.constraints.iter().find(|c| !c.accepts(arg)) {
            return Err(format!(
                "type argument `{}` violates constraint `{}` on `{}`",
                arg.display_name(),
                failed.describe(),
                param.name
            ));
        }
    }
    Ok(())
}

/// A type as written in a member signature
#[derive(Clone)]
pub enum TypeRef {
    Concrete(HostTypeRef),
    /// The type declaring the member
    SelfType,
    /// The n-th generic parameter of the method
    MethodParam(usize),
    /// Array of the inner type with the given rank
    ArrayOf(Box<TypeRef>, usize),
}

impl TypeRef {
    /// Resolve to a concrete type; `None` when a generic parameter is unbound
    pub fn resolve(&self, owner: &HostTypeRef, type_args: &[HostTypeRef]) -> Option<HostTypeRef> {
        match self {
            TypeRef::Concrete(ty) => Some(ty.clone()),
            TypeRef::SelfType => Some(owner.clone()),
            TypeRef::MethodParam(n) => type_args.get(*n).cloned(),
            TypeRef::ArrayOf(inner, rank) => inner.resolve(owner, type_args).map(|el| array_type(&el, *rank)),
        }
    }

    /// Array of `element` with rank 1
    pub fn array(element: impl Into<TypeRef>) -> Self {
        TypeRef::ArrayOf(Box::new(element.into()), 1)
    }

    /// Whether this is the `void` type
    pub fn is_void(&self) -> bool {
        matches!(self, TypeRef::Concrete(ty) if ty.primitive() == Some(Primitive::Void))
    }
}

impl From<HostTypeRef> for TypeRef {
    fn from(ty: HostTypeRef) -> Self {
        TypeRef::Concrete(ty)
    }
}

impl From<&HostTypeRef> for TypeRef {
    fn from(ty: &HostTypeRef) -> Self {
        TypeRef::Concrete(ty.clone())
    }
}

impl From<Primitive> for TypeRef {
    fn from(p: Primitive) -> Self {
        TypeRef::Concrete(primitive(p))
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Concrete(ty) => write!(f, "{}", ty.display_name()),
            TypeRef::SelfType => write!(f, "Self"),
            TypeRef::MethodParam(n) => write!(f, "!!{}", n),
            TypeRef::ArrayOf(inner, rank) => write!(f, "{:?}[{}]", inner, ",".repeat(rank.saturating_sub(1))),
        }
    }
}

// ============================================================================
// HostType
// ============================================================================

/// Metadata for one host type
pub struct HostType {
    pub(crate) id: HostTypeId,
    pub(crate) name: String,
    pub(crate) namespace: String,
    pub(crate) kind: TypeKind,
    pub(crate) is_abstract: bool,
    pub(crate) base: Option<HostTypeRef>,
    pub(crate) interfaces: Vec<HostTypeRef>,
    pub(crate) generic_params: Vec<GenericParam>,
    pub(crate) generic_definition: Option<HostTypeRef>,
    pub(crate) generic_args: Vec<HostTypeRef>,
    pub(crate) instantiator: Option<Instantiator>,
    pub(crate) instantiations: RefCell<FxHashMap<Vec<HostTypeId>, HostTypeRef>>,
    pub(crate) enum_values: Vec<(String, i64)>,
    pub(crate) display: Option<DisplayFn>,
    pub(crate) cloner: Option<CloneFn>,
    pub(crate) default_value: Option<DefaultFn>,
    pub(crate) members: TypeMembers,
}

impl HostType {
    pub(crate) fn bare(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            id: HostTypeId::next(),
            name: name.into(),
            namespace: String::new(),
            kind,
            is_abstract: false,
            base: None,
            interfaces: Vec::new(),
            generic_params: Vec::new(),
            generic_definition: None,
            generic_args: Vec::new(),
            instantiator: None,
            instantiations: RefCell::new(FxHashMap::default()),
            enum_values: Vec::new(),
            display: None,
            cloner: None,
            default_value: None,
            members: TypeMembers::default(),
        }
    }

    #[inline]
    pub fn id(&self) -> HostTypeId {
        self.id
    }

    /// Simple name, without namespace or generic suffix
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[inline]
    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    /// Name as shown to script code: `List`1`, `List<i32>`, `i32[,]`
    pub fn display_name(&self) -> String {
        if let TypeKind::Array { element, rank } = &self.kind {
            return format!("{}[{}]", element.display_name(), ",".repeat(rank - 1));
        }
        if self.is_generic_definition() {
            return format!("{}`{}", self.name, self.generic_params.len());
        }
        if !self.generic_args.is_empty() {
            let args: Vec<String> = self.generic_args.iter().map(|t| t.display_name()).collect();
            return format!("{}<{}>", self.name, args.join(", "));
        }
        self.name.clone()
    }

    /// Namespace-qualified display name
    pub fn full_name(&self) -> String {
        if let TypeKind::Array { element, rank } = &self.kind {
            return format!("{}[{}]", element.full_name(), ",".repeat(rank - 1));
        }
        if self.namespace.is_empty() {
            self.display_name()
        } else {
            format!("{}.{}", self.namespace, self.display_name())
        }
    }

    pub fn primitive(&self) -> Option<Primitive> {
        match self.kind {
            TypeKind::Primitive(p) => Some(p),
            _ => None,
        }
    }

    pub fn is_struct(&self) -> bool {
        matches!(self.kind, TypeKind::Struct)
    }

    pub fn is_enum(&self) -> bool {
        matches!(self.kind, TypeKind::Enum)
    }

    pub fn is_interface(&self) -> bool {
        matches!(self.kind, TypeKind::Interface)
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, TypeKind::Array { .. })
    }

    /// Element type and rank of an array type
    pub fn array_element(&self) -> Option<(&HostTypeRef, usize)> {
        match &self.kind {
            TypeKind::Array { element, rank } => Some((element, *rank)),
            _ => None,
        }
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract || self.is_interface()
    }

    /// Whether values of this type are copied and never nil
    pub fn is_value_type(&self) -> bool {
        match self.kind {
            TypeKind::Primitive(p) => p.is_value_type(),
            TypeKind::Struct | TypeKind::Enum => true,
            _ => false,
        }
    }

    pub fn base(&self) -> Option<&HostTypeRef> {
        self.base.as_ref()
    }

    pub fn interfaces(&self) -> &[HostTypeRef] {
        &self.interfaces
    }

    // ------------------------------------------------------------------------
    // Generics
    // ------------------------------------------------------------------------

    /// Whether this is an open generic definition
    pub fn is_generic_definition(&self) -> bool {
        !self.generic_params.is_empty()
    }

    /// Number of type arguments needed to close this type (0 unless open)
    pub fn generic_arity(&self) -> usize {
        self.generic_params.len()
    }

    pub fn generic_params(&self) -> &[GenericParam] {
        &self.generic_params
    }

    /// Definition a closed generic type was instantiated from
    pub fn generic_definition(&self) -> Option<&HostTypeRef> {
        self.generic_definition.as_ref()
    }

    pub fn generic_args(&self) -> &[HostTypeRef] {
        &self.generic_args
    }

    /// Close a generic definition over `args`, checking arity and constraints.
    ///
    /// Instantiations are cached, so the same arguments always yield the same type.
    pub fn make_generic(self: &Rc<Self>, args: &[HostTypeRef]) -> Result<HostTypeRef, String> {
        if !self.is_generic_definition() {
            return Err(format!("`{}` is not a generic type definition", self.full_name()));
        }
        if args.len() != self.generic_params.len() {
            return Err(format!(
                "`{}` takes {} type arguments but {} were supplied",
                self.full_name(),
                self.generic_params.len(),
                args.len()
            ));
        }
        check_constraints(&self.generic_params, args).map_err(|e| format!("{} of `{}`", e, self.full_name()))?;

        let key: Vec<HostTypeId> = args.iter().map(|t| t.id()).collect();
        if let Some(closed) = self.instantiations.borrow().get(&key) {
            return Ok(closed.clone());
        }
        let instantiate = self
            .instantiator
            .clone()
            .ok_or_else(|| format!("`{}` cannot be instantiated", self.full_name()))?;
        let closed = instantiate(self, args);
        self.instantiations.borrow_mut().insert(key, closed.clone());
        Ok(closed)
    }

    // ------------------------------------------------------------------------
    // Relationships
    // ------------------------------------------------------------------------

    /// Whether a value of this type can be used where `target` is expected
    pub fn is_assignable_to(&self, target: &HostType) -> bool {
        if self.id == target.id {
            return true;
        }
        if target.primitive() == Some(Primitive::Object) {
            return self.primitive() != Some(Primitive::Void);
        }
        let mut base = self.base.as_ref();
        while let Some(ty) = base {
            if ty.id == target.id {
                return true;
            }
            base = ty.base.as_ref();
        }
        target.is_interface() && self.implements(target)
    }

    fn implements(&self, iface: &HostType) -> bool {
        self.interfaces
            .iter()
            .any(|i| i.id == iface.id || i.implements(iface))
            || self.base.as_ref().is_some_and(|b| b.implements(iface))
    }

    /// Inheritance distance to `target`; interfaces and `object` count as far
    pub(crate) fn distance_to(&self, target: &HostType) -> Option<u32> {
        if self.id == target.id {
            return Some(0);
        }
        let mut depth = 1;
        let mut base = self.base.as_ref();
        while let Some(ty) = base {
            if ty.id == target.id {
                return Some(depth);
            }
            depth += 1;
            base = ty.base.as_ref();
        }
        self.is_assignable_to(target).then_some(depth + 8)
    }

    /// Whether the type can be constructed without arguments
    pub fn has_default_constructor(&self) -> bool {
        if self.is_value_type() {
            return true;
        }
        !self.is_abstract()
            && self.members.constructors.iter().any(|c| {
                c.visibility.is_public() && c.params.iter().all(|p| p.default.is_some() || p.is_params)
            })
    }

    // ------------------------------------------------------------------------
    // Enums and instances
    // ------------------------------------------------------------------------

    pub fn enum_values(&self) -> &[(String, i64)] {
        &self.enum_values
    }

    /// Underlying value of a named enum member
    pub fn enum_value(&self, name: &str) -> Option<i64> {
        self.enum_values.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    /// Display form of an instance
    pub fn describe_object(&self, object: &HostObject) -> String {
        match &self.display {
            Some(display) => display(object),
            None => self.full_name(),
        }
    }

    /// Operator overloads declared by this type or its bases
    pub fn operators(&self, op: Operator) -> Vec<Rc<super::members::MethodInfo>> {
        let mut found: Vec<_> = self
            .members
            .operators
            .iter()
            .filter(|(o, _)| *o == op)
            .map(|(_, m)| m.clone())
            .collect();
        if let Some(base) = &self.base {
            found.extend(base.operators(op));
        }
        found
    }

    /// Members declared directly on this type
    pub fn members(&self) -> &TypeMembers {
        &self.members
    }
}

impl PartialEq for HostType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for HostType {}

impl fmt::Debug for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostType")
            .field("id", &self.id.0)
            .field("name", &self.full_name())
            .field("kind", &self.kind)
            .finish()
    }
}

impl fmt::Display for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}
