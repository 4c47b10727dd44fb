//! Host types the end-to-end tests expose to scripts
//!
//! Everything lives in the `Demo` namespace except `Geometry.Point`.

use tandem_runtime::tandem_engine::{
    CallContext, ConstructorInfo, EventInfo, FieldInfo, GenericConstraint, GenericParam, HostArray, HostAssembly,
    HostException, HostObject, HostTypeRef, HostValue, MethodInfo, Operator, ParameterInfo, Primitive,
    PropertyInfo, TypeBuilder, TypeRef, Value, Visibility,
};

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Default)]
pub struct Counter {
    pub count: i64,
    pub label: String,
    pub password: String,
    pub handlers: Vec<Value>,
}

pub struct Grid {
    pub cells: Vec<i64>,
}

pub struct Catalog;

pub struct Circle {
    pub radius: f64,
}

pub struct BoxPayload(pub HostValue);

// ============================================================================
// Argument helpers
// ============================================================================

fn f64_arg(args: &[HostValue], n: usize) -> f64 {
    args.get(n).and_then(HostValue::as_f64).unwrap_or_default()
}

fn i64_arg(args: &[HostValue], n: usize) -> i64 {
    args.get(n).and_then(HostValue::as_i64).unwrap_or_default()
}

fn str_arg(args: &[HostValue], n: usize) -> String {
    match args.get(n) {
        Some(HostValue::Null) | None => "null".to_string(),
        Some(value) => value.as_str().unwrap_or_default().to_string(),
    }
}

fn point_of(value: &HostValue) -> Point {
    value
        .as_object()
        .and_then(|obj| obj.with(|p: &Point| p.clone()))
        .unwrap_or_default()
}

fn with_counter<R>(ctx: &CallContext<'_>, f: impl FnOnce(&mut Counter) -> R) -> Result<R, HostException> {
    ctx.this()?
        .with_mut(f)
        .ok_or_else(|| HostException::invalid_operation("receiver is not a counter"))
}

fn new_point(ctx: &CallContext<'_>, x: f64, y: f64) -> HostValue {
    HostValue::Object(HostObject::new(ctx.owner(), Point { x, y }))
}

// ============================================================================
// Geometry.Point
// ============================================================================

pub fn point_type() -> HostTypeRef {
    let pair = || {
        vec![
            ParameterInfo::new("a", TypeRef::SelfType),
            ParameterInfo::new("b", TypeRef::SelfType),
        ]
    };

    TypeBuilder::structure::<Point>("Point")
        .namespace("Geometry")
        .display(|obj| {
            obj.with(|p: &Point| format!("({}, {})", p.x, p.y))
                .unwrap_or_default()
        })
        .field(FieldInfo::instance(
            "X",
            Primitive::F64,
            |obj| HostValue::F64(obj.with(|p: &Point| p.x).unwrap_or_default()),
            |obj, value| {
                obj.with_mut(|p: &mut Point| p.x = value.as_f64().unwrap_or_default());
            },
        ))
        .field(FieldInfo::instance(
            "Y",
            Primitive::F64,
            |obj| HostValue::F64(obj.with(|p: &Point| p.y).unwrap_or_default()),
            |obj, value| {
                obj.with_mut(|p: &mut Point| p.y = value.as_f64().unwrap_or_default());
            },
        ))
        .constructor(ConstructorInfo::new(
            vec![
                ParameterInfo::new("x", Primitive::F64),
                ParameterInfo::new("y", Primitive::F64),
            ],
            |ctx, args| Ok(new_point(ctx, f64_arg(&args, 0), f64_arg(&args, 1))),
        ))
        .method(MethodInfo::new("Length", vec![], Primitive::F64, |ctx, _| {
            let p = ctx.this()?.with(|p: &Point| p.clone()).unwrap_or_default();
            Ok(HostValue::F64((p.x * p.x + p.y * p.y).sqrt()))
        }))
        .operator(
            Operator::Add,
            MethodInfo::new("op_Add", pair(), TypeRef::SelfType, |ctx, args| {
                let (a, b) = (point_of(&args[0]), point_of(&args[1]));
                Ok(new_point(ctx, a.x + b.x, a.y + b.y))
            }),
        )
        .operator(
            Operator::Eq,
            MethodInfo::new("op_Equality", pair(), Primitive::Bool, |_, args| {
                Ok(HostValue::Bool(point_of(&args[0]) == point_of(&args[1])))
            }),
        )
        .operator(
            Operator::Unm,
            MethodInfo::new(
                "op_UnaryNegation",
                vec![ParameterInfo::new("a", TypeRef::SelfType)],
                TypeRef::SelfType,
                |ctx, args| {
                    let p = point_of(&args[0]);
                    Ok(new_point(ctx, -p.x, -p.y))
                },
            ),
        )
        .build()
}

// ============================================================================
// Demo.Counter
// ============================================================================

pub fn counter_type() -> HostTypeRef {
    let settings = TypeBuilder::class("Settings")
        .namespace("Demo")
        .field(FieldInfo::constant("Version", Primitive::I32, 3))
        .build();

    TypeBuilder::class("Counter")
        .namespace("Demo")
        .display(|obj| {
            obj.with(|c: &Counter| format!("Counter({})", c.count))
                .unwrap_or_default()
        })
        .nested(&settings)
        .constructor(ConstructorInfo::new(vec![], |ctx, _| {
            Ok(HostValue::Object(HostObject::new(ctx.owner(), Counter::default())))
        }))
        .constructor(ConstructorInfo::new(
            vec![ParameterInfo::new("label", Primitive::String)],
            |ctx, args| {
                let counter = Counter {
                    label: str_arg(&args, 0),
                    ..Counter::default()
                };
                Ok(HostValue::Object(HostObject::new(ctx.owner(), counter)))
            },
        ))
        .field(FieldInfo::constant("Max", Primitive::I32, 100))
        .field(FieldInfo::static_field("Instances", Primitive::I32, 0))
        .field(FieldInfo::instance("Id", Primitive::I32, |_| HostValue::I32(7), |_, _| {}).read_only())
        .property(
            PropertyInfo::new("Count", Primitive::I64)
                .getter(|ctx, _| Ok(HostValue::I64(with_counter(ctx, |c| c.count)?))),
        )
        .property(
            PropertyInfo::new("Label", Primitive::String)
                .getter(|ctx, _| Ok(HostValue::String(with_counter(ctx, |c| c.label.clone())?)))
                .setter(|ctx, args| {
                    with_counter(ctx, |c| c.label = str_arg(&args, 0))?;
                    Ok(HostValue::Null)
                }),
        )
        .property(PropertyInfo::new("Password", Primitive::String).setter(|ctx, args| {
            with_counter(ctx, |c| c.password = str_arg(&args, 0))?;
            Ok(HostValue::Null)
        }))
        .property(
            PropertyInfo::new("Checked", Primitive::Bool)
                .getter(|ctx, _| Ok(HostValue::Bool(with_counter(ctx, |c| !c.password.is_empty())?)))
                .setter(|_, _| Ok(HostValue::Null))
                .private_setter(),
        )
        .method(MethodInfo::new("Increment", vec![], Primitive::Void, |ctx, _| {
            let (count, handlers) = with_counter(ctx, |c| {
                c.count += 1;
                (c.count, c.handlers.clone())
            })?;
            for handler in &handlers {
                ctx.call(handler, &[HostValue::I64(count)])?;
            }
            Ok(HostValue::Null)
        }))
        .method(MethodInfo::new(
            "Add",
            vec![ParameterInfo::new("n", Primitive::I64)],
            Primitive::I64,
            |ctx, args| {
                let n = i64_arg(&args, 0);
                Ok(HostValue::I64(with_counter(ctx, |c| {
                    c.count += n;
                    c.count
                })?))
            },
        ))
        .method(MethodInfo::new(
            "Add",
            vec![
                ParameterInfo::new("a", Primitive::I64),
                ParameterInfo::new("b", Primitive::I64),
            ],
            Primitive::I64,
            |ctx, args| {
                let n = i64_arg(&args, 0) + i64_arg(&args, 1);
                Ok(HostValue::I64(with_counter(ctx, |c| {
                    c.count += n;
                    c.count
                })?))
            },
        ))
        .method(MethodInfo::new(
            "Describe",
            vec![ParameterInfo::new("prefix", Primitive::String).default_value("count")],
            Primitive::String,
            |ctx, args| {
                let count = with_counter(ctx, |c| c.count)?;
                Ok(HostValue::String(format!("{}={}", str_arg(&args, 0), count)))
            },
        ))
        .method(
            MethodInfo::new(
                "Sum",
                vec![ParameterInfo::params("values", Primitive::I64)],
                Primitive::I64,
                |_, args| {
                    let total = args
                        .first()
                        .and_then(HostValue::as_object)
                        .and_then(|arr| arr.with(|a: &HostArray| {
                            a.items.iter().filter_map(HostValue::as_i64).sum::<i64>()
                        }))
                        .unwrap_or_default();
                    Ok(HostValue::I64(total))
                },
            )
            .static_method(),
        )
        .method(MethodInfo::new("Identity", vec![], TypeRef::SelfType, |ctx, _| {
            Ok(HostValue::Object(ctx.this()?.clone()))
        }))
        .method(MethodInfo::new("Fail", vec![], Primitive::Void, |_, _| {
            Err(HostException::invalid_operation("counter is sealed"))
        }))
        .method(MethodInfo::new("Explode", vec![], Primitive::Void, |_, _| panic!("boom")))
        .method(
            MethodInfo::new("Hidden", vec![], Primitive::I64, |_, _| Ok(HostValue::I64(0)))
                .with_visibility(Visibility::Private),
        )
        .method(MethodInfo::new(
            "AVeryLongMethodNameThatDoesNotFitTheInternLimit",
            vec![],
            Primitive::String,
            |_, _| Ok("long".into()),
        ))
        .event(EventInfo::new(
            "Changed",
            |ctx, handler| {
                with_counter(ctx, |c| c.handlers.push(handler))?;
                Ok(())
            },
            |ctx, handler| {
                with_counter(ctx, |c| c.handlers.retain(|h| h != &handler))?;
                Ok(())
            },
        ))
        .build()
}

// ============================================================================
// Demo.Formatter
// ============================================================================

pub fn formatter_type() -> HostTypeRef {
    let show = |param: Primitive, tag: &'static str| {
        MethodInfo::new(
            "Show",
            vec![ParameterInfo::new("value", param)],
            Primitive::String,
            move |_, args| {
                let text = match &args[0] {
                    HostValue::F64(v) => v.to_string(),
                    HostValue::Null => "null".to_string(),
                    other => other
                        .as_i64()
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| other.as_str().unwrap_or_default().to_string()),
                };
                Ok(HostValue::String(format!("{}:{}", tag, text)))
            },
        )
        .static_method()
    };
    let mix = |param: Primitive| {
        MethodInfo::new("Mix", vec![ParameterInfo::new("value", param)], Primitive::I64, |_, args| {
            Ok(HostValue::I64(i64_arg(&args, 0)))
        })
        .static_method()
    };

    TypeBuilder::class("Formatter")
        .namespace("Demo")
        .method(show(Primitive::I64, "int"))
        .method(show(Primitive::F64, "float"))
        .method(show(Primitive::String, "string"))
        .method(mix(Primitive::I16))
        .method(mix(Primitive::U8))
        .method(
            MethodInfo::new("Largest", vec![], Primitive::U64, |_, _| Ok(HostValue::U64(u64::MAX))).static_method(),
        )
        .method(
            MethodInfo::new("HighBit", vec![], Primitive::U64, |_, _| Ok(HostValue::U64(1 << 63))).static_method(),
        )
        .method(
            MethodInfo::new(
                "Narrow",
                vec![ParameterInfo::new("value", Primitive::I8)],
                Primitive::I64,
                |_, args| Ok(HostValue::I64(i64_arg(&args, 0))),
            )
            .static_method(),
        )
        .method(
            MethodInfo::new(
                "Greet",
                vec![
                    ParameterInfo::new("name", Primitive::String),
                    ParameterInfo::new("greeting", Primitive::String).default_value("hello"),
                ],
                Primitive::String,
                |_, args| Ok(HostValue::String(format!("{}, {}", str_arg(&args, 1), str_arg(&args, 0)))),
            )
            .static_method(),
        )
        .method(
            MethodInfo::new(
                "Join",
                vec![
                    ParameterInfo::new("separator", Primitive::String),
                    ParameterInfo::params("parts", Primitive::String),
                ],
                Primitive::String,
                |_, args| {
                    let separator = str_arg(&args, 0);
                    let parts = args
                        .get(1)
                        .and_then(HostValue::as_object)
                        .and_then(|arr| {
                            arr.with(|a: &HostArray| {
                                a.items
                                    .iter()
                                    .map(|item| item.as_str().unwrap_or_default().to_string())
                                    .collect::<Vec<_>>()
                            })
                        })
                        .unwrap_or_default();
                    Ok(HostValue::String(parts.join(&separator)))
                },
            )
            .static_method(),
        )
        .method(
            MethodInfo::new(
                "Code",
                vec![ParameterInfo::new("c", Primitive::Char)],
                Primitive::I64,
                |_, args| match args[0] {
                    HostValue::Char(c) => Ok(HostValue::I64(c as i64)),
                    _ => Err(HostException::argument("expected a character")),
                },
            )
            .static_method(),
        )
        .method(
            MethodInfo::new(
                "Echo",
                vec![ParameterInfo::new("value", Primitive::Object)],
                Primitive::Object,
                |_, mut args| Ok(args.remove(0)),
            )
            .static_method(),
        )
        .method(
            MethodInfo::new(
                "Kind",
                vec![ParameterInfo::new("value", Primitive::Value)],
                Primitive::String,
                |_, args| match &args[0] {
                    HostValue::Script(value) => Ok(value.type_name().into()),
                    other => Ok(HostValue::String(other.type_name())),
                },
            )
            .static_method(),
        )
        .build()
}

// ============================================================================
// Demo.Color, Demo.Palette
// ============================================================================

pub fn color_type() -> HostTypeRef {
    TypeBuilder::enumeration("Color", [("Red", 1), ("Green", 2), ("Blue", 4)])
        .namespace("Demo")
        .build()
}

pub fn palette_type(color: &HostTypeRef) -> HostTypeRef {
    TypeBuilder::class("Palette")
        .namespace("Demo")
        .method(
            MethodInfo::new("Code", vec![ParameterInfo::new("color", color)], Primitive::I64, |_, args| {
                match args[0] {
                    HostValue::Enum(_, v) => Ok(HostValue::I64(v)),
                    _ => Err(HostException::argument("expected a color")),
                }
            })
            .static_method(),
        )
        .method({
            let green = HostValue::Enum(color.clone(), 2);
            MethodInfo::new("Favorite", vec![], color, move |_, _| Ok(green.clone())).static_method()
        })
        .build()
}

// ============================================================================
// Demo.INamed, Demo.Shape, Demo.Circle
// ============================================================================

pub fn named_type() -> HostTypeRef {
    TypeBuilder::interface("INamed")
        .namespace("Demo")
        .property(PropertyInfo::new("Name", Primitive::String).getter(|_, _| Ok("named".into())))
        .build()
}

pub fn shape_type(named: &HostTypeRef) -> HostTypeRef {
    TypeBuilder::class("Shape")
        .namespace("Demo")
        .implements(named)
        .abstract_type()
        .property(PropertyInfo::new("Name", Primitive::String).getter(|_, _| Ok("shape".into())))
        .method(MethodInfo::new("Kind", vec![], Primitive::String, |_, _| Ok("shape".into())))
        .method(MethodInfo::new("Area", vec![], Primitive::F64, |_, _| Ok(HostValue::F64(0.0))))
        .build()
}

pub fn circle_type(shape: &HostTypeRef) -> HostTypeRef {
    TypeBuilder::class("Circle")
        .namespace("Demo")
        .base(shape)
        .constructor(ConstructorInfo::new(
            vec![ParameterInfo::new("radius", Primitive::F64)],
            |ctx, args| {
                let circle = Circle { radius: f64_arg(&args, 0) };
                Ok(HostValue::Object(HostObject::new(ctx.owner(), circle)))
            },
        ))
        .method(MethodInfo::new("Area", vec![], Primitive::F64, |ctx, _| {
            let radius = ctx.this()?.with(|c: &Circle| c.radius).unwrap_or_default();
            Ok(HostValue::F64(std::f64::consts::PI * radius * radius))
        }))
        .build()
}

pub fn measure_type(shape: &HostTypeRef) -> HostTypeRef {
    TypeBuilder::class("Measure")
        .namespace("Demo")
        .method(
            MethodInfo::new("TypeOf", vec![ParameterInfo::new("shape", shape)], Primitive::String, |_, args| {
                let name = args[0]
                    .as_object()
                    .map(|obj| obj.host_type().full_name())
                    .unwrap_or_else(|| "null".to_string());
                Ok(HostValue::String(name))
            })
            .static_method(),
        )
        .build()
}

// ============================================================================
// Demo.Grid, Demo.Catalog
// ============================================================================

fn grid_cell(ctx: &CallContext<'_>, index: i64) -> Result<usize, HostException> {
    let len = ctx.this()?.with(|g: &Grid| g.cells.len()).unwrap_or(0);
    usize::try_from(index)
        .ok()
        .filter(|i| *i < len)
        .ok_or_else(|| HostException::argument(format!("cell {} is outside the grid", index)))
}

pub fn grid_type() -> HostTypeRef {
    TypeBuilder::class("Grid")
        .namespace("Demo")
        .constructor(ConstructorInfo::new(
            vec![ParameterInfo::new("size", Primitive::I32)],
            |ctx, args| {
                let size = usize::try_from(i64_arg(&args, 0)).unwrap_or(0);
                Ok(HostValue::Object(HostObject::new(ctx.owner(), Grid { cells: vec![0; size] })))
            },
        ))
        .property(
            PropertyInfo::new("Item", Primitive::I64)
                .indexer(vec![ParameterInfo::new("index", Primitive::I32)])
                .getter(|ctx, args| {
                    let cell = grid_cell(ctx, i64_arg(&args, 0))?;
                    let value = ctx.this()?.with(|g: &Grid| g.cells[cell]).unwrap_or_default();
                    Ok(HostValue::I64(value))
                })
                .setter(|ctx, args| {
                    let cell = grid_cell(ctx, i64_arg(&args, 0))?;
                    let value = i64_arg(&args, 1);
                    ctx.this()?.with_mut(|g: &mut Grid| g.cells[cell] = value);
                    Ok(HostValue::Null)
                }),
        )
        .property(
            PropertyInfo::new("Size", Primitive::I32).getter(|ctx, _| {
                let len = ctx.this()?.with(|g: &Grid| g.cells.len()).unwrap_or(0);
                Ok(HostValue::I32(len as i32))
            }),
        )
        .build()
}

pub fn catalog_type() -> HostTypeRef {
    TypeBuilder::class("Catalog")
        .namespace("Demo")
        .constructor(ConstructorInfo::new(vec![], |ctx, _| {
            Ok(HostValue::Object(HostObject::new(ctx.owner(), Catalog)))
        }))
        .property(
            PropertyInfo::new("Item", Primitive::String)
                .indexer(vec![ParameterInfo::new("key", Primitive::String)])
                .getter(|_, args| Ok(HostValue::String(format!("item:{}", str_arg(&args, 0))))),
        )
        .build()
}

// ============================================================================
// Demo.Box, Demo.Box`1, Demo.Factory
// ============================================================================

pub fn box_type() -> HostTypeRef {
    TypeBuilder::class("Box")
        .namespace("Demo")
        .constructor(ConstructorInfo::new(vec![], |ctx, _| {
            Ok(HostValue::Object(HostObject::new(ctx.owner(), BoxPayload(HostValue::Null))))
        }))
        .method(MethodInfo::new("Kind", vec![], Primitive::String, |_, _| Ok("plain".into())))
        .build()
}

pub fn generic_box_type() -> HostTypeRef {
    TypeBuilder::class("Box")
        .namespace("Demo")
        .generic(
            vec![GenericParam::new("T").constraint(GenericConstraint::ValueType)],
            closed_box,
        )
        .build()
}

fn closed_box(definition: &HostTypeRef, args: &[HostTypeRef]) -> HostTypeRef {
    let item = args[0].clone();
    TypeBuilder::class("Box")
        .closed_from(definition, args)
        .constructor(ConstructorInfo::new(
            vec![ParameterInfo::new("value", &item)],
            |ctx, args| {
                let value = args.into_iter().next().unwrap_or(HostValue::Null);
                Ok(HostValue::Object(HostObject::new(ctx.owner(), BoxPayload(value))))
            },
        ))
        .method(MethodInfo::new("Get", vec![], &item, |ctx, _| {
            ctx.this()?
                .with(|b: &BoxPayload| b.0.clone())
                .ok_or_else(|| HostException::invalid_operation("empty box"))
        }))
        .method(MethodInfo::new("Kind", vec![], Primitive::String, |_, _| Ok("generic".into())))
        .build()
}

fn type_arg_name(ctx: &mut CallContext<'_>, _: Vec<HostValue>) -> Result<HostValue, HostException> {
    Ok(HostValue::String(ctx.type_arg(0)?.full_name()))
}

pub fn factory_type() -> HostTypeRef {
    TypeBuilder::class("Factory")
        .namespace("Demo")
        .method(
            MethodInfo::new("Make", vec![], Primitive::String, type_arg_name)
                .static_method()
                .generic(vec![GenericParam::new("T")]),
        )
        .method(
            MethodInfo::new("MakeRef", vec![], Primitive::String, type_arg_name)
                .static_method()
                .generic(vec![GenericParam::new("T").constraint(GenericConstraint::ReferenceType)]),
        )
        .method(
            MethodInfo::new(
                "Pick",
                vec![ParameterInfo::new("value", TypeRef::MethodParam(0))],
                TypeRef::MethodParam(0),
                |_, mut args| Ok(args.remove(0)),
            )
            .static_method()
            .generic(vec![GenericParam::new("T")]),
        )
        .build()
}

// ============================================================================
// Assembly
// ============================================================================

/// Every fixture type in one assembly
pub fn demo_assembly() -> HostAssembly {
    let color = color_type();
    let named = named_type();
    let shape = shape_type(&named);

    HostAssembly::new("Demo")
        .with_type(&point_type())
        .with_type(&counter_type())
        .with_type(&formatter_type())
        .with_type(&palette_type(&color))
        .with_type(&color)
        .with_type(&named)
        .with_type(&circle_type(&shape))
        .with_type(&measure_type(&shape))
        .with_type(&shape)
        .with_type(&grid_type())
        .with_type(&catalog_type())
        .with_type(&box_type())
        .with_type(&generic_box_type())
        .with_type(&factory_type())
}
