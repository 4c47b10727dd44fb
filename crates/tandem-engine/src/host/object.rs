//! Host objects and the values passed to and from host members

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::types::{array_type, HostTypeRef, Primitive, TypeKind};
use crate::value::Value;

/// Shared, identity-bearing handle to a host object
pub type HostObjectRef = Rc<HostObject>;

/// An instance of a host type.
///
/// The payload is an arbitrary Rust value; member closures reach it through
/// [`HostObject::with`] and [`HostObject::with_mut`].
pub struct HostObject {
    ty: HostTypeRef,
    payload: RefCell<Box<dyn Any>>,
}

impl HostObject {
    /// Wrap `value` as an instance of `ty`
    pub fn new<T: Any>(ty: &HostTypeRef, value: T) -> HostObjectRef {
        Rc::new(Self {
            ty: ty.clone(),
            payload: RefCell::new(Box::new(value)),
        })
    }

    /// A default-initialised instance of a struct type
    pub fn default_of(ty: &HostTypeRef) -> Option<HostObjectRef> {
        let make = ty.default_value.as_ref()?;
        Some(Rc::new(Self {
            ty: ty.clone(),
            payload: RefCell::new(make()),
        }))
    }

    /// One-dimensional array holding `items`
    pub fn array(element: &HostTypeRef, items: Vec<HostValue>) -> HostObjectRef {
        let lengths = vec![items.len()];
        Self::new(
            &array_type(element, 1),
            HostArray {
                element: element.clone(),
                lengths,
                items,
            },
        )
    }

    /// Array with the given dimension lengths, filled with default values
    pub fn array_nd(element: &HostTypeRef, lengths: &[usize]) -> HostObjectRef {
        Self::new(&array_type(element, lengths.len()), HostArray::new(element, lengths))
    }

    #[inline]
    pub fn host_type(&self) -> &HostTypeRef {
        &self.ty
    }

    /// Whether the payload is a `T`
    pub fn is<T: Any>(&self) -> bool {
        self.payload.borrow().is::<T>()
    }

    /// Borrow the payload as `T`; `None` when it is another type
    pub fn with<T: Any, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let payload = self.payload.borrow();
        payload.downcast_ref::<T>().map(f)
    }

    /// Mutably borrow the payload as `T`
    pub fn with_mut<T: Any, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut payload = self.payload.borrow_mut();
        payload.downcast_mut::<T>().map(f)
    }

    /// A fresh copy for struct types, the same object otherwise
    pub fn boxed_copy(self: &Rc<Self>) -> HostObjectRef {
        if !self.ty.is_struct() {
            return self.clone();
        }
        let Some(clone) = self.ty.cloner.as_ref() else {
            return self.clone();
        };
        let copied = {
            let payload = self.payload.borrow();
            clone(&**payload)
        };
        match copied {
            Some(payload) => Rc::new(Self {
                ty: self.ty.clone(),
                payload: RefCell::new(payload),
            }),
            None => self.clone(),
        }
    }

    /// Identity used for anchoring
    pub fn address(self: &Rc<Self>) -> usize {
        Rc::as_ptr(self) as *const u8 as usize
    }

    /// Display form (the type's `ToString`)
    pub fn describe(&self) -> String {
        self.ty.describe_object(self)
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostObject({})", self.ty.full_name())
    }
}

// ============================================================================
// Arrays
// ============================================================================

/// Payload of a host array: row-major storage with per-dimension lengths
#[derive(Debug, Clone)]
pub struct HostArray {
    pub element: HostTypeRef,
    pub lengths: Vec<usize>,
    pub items: Vec<HostValue>,
}

impl HostArray {
    /// Array filled with the element type's default value
    pub fn new(element: &HostTypeRef, lengths: &[usize]) -> Self {
        let total = lengths.iter().product();
        let items = (0..total).map(|_| default_value(element)).collect();
        Self {
            element: element.clone(),
            lengths: lengths.to_vec(),
            items,
        }
    }

    /// Total number of elements
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn rank(&self) -> usize {
        self.lengths.len()
    }

    /// Row-major offset of a multi-dimensional index
    pub fn offset(&self, indices: &[i64]) -> Option<usize> {
        if indices.len() != self.lengths.len() {
            return None;
        }
        let mut offset = 0usize;
        for (&index, &len) in indices.iter().zip(&self.lengths) {
            if index < 0 || index as usize >= len {
                return None;
            }
            offset = offset * len + index as usize;
        }
        Some(offset)
    }
}

/// Zero value of a type: numeric zero, `false`, default struct or null
pub fn default_value(ty: &HostTypeRef) -> HostValue {
    match ty.kind() {
        TypeKind::Primitive(p) => match p {
            Primitive::Bool => HostValue::Bool(false),
            Primitive::Char => HostValue::Char('\0'),
            Primitive::I8 => HostValue::I8(0),
            Primitive::I16 => HostValue::I16(0),
            Primitive::I32 => HostValue::I32(0),
            Primitive::I64 => HostValue::I64(0),
            Primitive::U8 => HostValue::U8(0),
            Primitive::U16 => HostValue::U16(0),
            Primitive::U32 => HostValue::U32(0),
            Primitive::U64 => HostValue::U64(0),
            Primitive::F32 => HostValue::F32(0.0),
            Primitive::F64 => HostValue::F64(0.0),
            Primitive::Pointer => HostValue::Pointer(0),
            _ => HostValue::Null,
        },
        TypeKind::Enum => HostValue::Enum(ty.clone(), 0),
        TypeKind::Struct => HostObject::default_of(ty).map_or(HostValue::Null, HostValue::Object),
        _ => HostValue::Null,
    }
}

// ============================================================================
// HostValue
// ============================================================================

/// A value as host members see it
#[derive(Debug, Clone)]
pub enum HostValue {
    Null,
    Bool(bool),
    Char(char),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Pointer(usize),
    /// Enum member by underlying value
    Enum(HostTypeRef, i64),
    Object(HostObjectRef),
    Type(HostTypeRef),
    /// A bridge value passed through untouched
    Script(Value),
}

impl HostValue {
    /// Name of the value's type, for messages
    pub fn type_name(&self) -> String {
        match self {
            HostValue::Null => "null".to_string(),
            HostValue::Bool(_) => "bool".to_string(),
            HostValue::Char(_) => "char".to_string(),
            HostValue::I8(_) => "i8".to_string(),
            HostValue::I16(_) => "i16".to_string(),
            HostValue::I32(_) => "i32".to_string(),
            HostValue::I64(_) => "i64".to_string(),
            HostValue::U8(_) => "u8".to_string(),
            HostValue::U16(_) => "u16".to_string(),
            HostValue::U32(_) => "u32".to_string(),
            HostValue::U64(_) => "u64".to_string(),
            HostValue::F32(_) => "f32".to_string(),
            HostValue::F64(_) => "f64".to_string(),
            HostValue::String(_) => "string".to_string(),
            HostValue::Pointer(_) => "pointer".to_string(),
            HostValue::Enum(ty, _) | HostValue::Type(ty) => ty.full_name(),
            HostValue::Object(obj) => obj.host_type().full_name(),
            HostValue::Script(value) => value.type_name().to_string(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, HostValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Any integer, enum or char as `i64`
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            HostValue::I8(v) => Some(v as i64),
            HostValue::I16(v) => Some(v as i64),
            HostValue::I32(v) => Some(v as i64),
            HostValue::I64(v) => Some(v),
            HostValue::U8(v) => Some(v as i64),
            HostValue::U16(v) => Some(v as i64),
            HostValue::U32(v) => Some(v as i64),
            HostValue::U64(v) => i64::try_from(v).ok(),
            HostValue::Char(c) => Some(c as i64),
            HostValue::Enum(_, v) => Some(v),
            _ => None,
        }
    }

    /// Any number as `f64`
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            HostValue::F32(v) => Some(v as f64),
            HostValue::F64(v) => Some(v),
            HostValue::U64(v) => Some(v as f64),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HostObjectRef> {
        match self {
            HostValue::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<&HostTypeRef> {
        match self {
            HostValue::Type(ty) => Some(ty),
            _ => None,
        }
    }

    pub fn as_script(&self) -> Option<&Value> {
        match self {
            HostValue::Script(value) => Some(value),
            _ => None,
        }
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        use HostValue::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Char(a), Char(b)) => a == b,
            (I8(a), I8(b)) => a == b,
            (I16(a), I16(b)) => a == b,
            (I32(a), I32(b)) => a == b,
            (I64(a), I64(b)) => a == b,
            (U8(a), U8(b)) => a == b,
            (U16(a), U16(b)) => a == b,
            (U32(a), U32(b)) => a == b,
            (U64(a), U64(b)) => a == b,
            (F32(a), F32(b)) => a.to_bits() == b.to_bits(),
            (F64(a), F64(b)) => a.to_bits() == b.to_bits(),
            (String(a), String(b)) => a == b,
            (Pointer(a), Pointer(b)) => a == b,
            (Enum(ta, a), Enum(tb, b)) => ta.id() == tb.id() && a == b,
            (Object(a), Object(b)) => Rc::ptr_eq(a, b),
            (Type(a), Type(b)) => a.id() == b.id(),
            (Script(a), Script(b)) => a == b,
            _ => false,
        }
    }
}

macro_rules! host_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for HostValue {
                fn from(v: $ty) -> Self {
                    HostValue::$variant(v)
                }
            }
        )*
    };
}

host_value_from! {
    bool => Bool,
    char => Char,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    String => String,
    HostObjectRef => Object,
    Value => Script,
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::String(s.to_string())
    }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(HostValue::Null, Into::into)
    }
}
