//! Integration tests for the bridge over the reference VM

use std::any::Any;
use std::rc::Rc;

use tandem_engine::{
    BridgeConfig, BridgeError, Environment, HostObject, HostTypeSet, ScriptState, TypeBuilder, Value,
};
use tandem_vm::Vm;

fn env() -> Environment {
    Environment::new(Box::new(Vm::new()), BridgeConfig::default()).unwrap()
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_state_owned_elsewhere_is_rejected() {
    let mut vm = Vm::new();
    let data: Rc<dyn Any> = Rc::new(1u8);
    vm.set_app_data(Some(data));
    let err = Environment::new(Box::new(vm), BridgeConfig::default()).err();
    assert!(matches!(err, Some(BridgeError::Argument(_))));
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = BridgeConfig {
        default_chunk_name: String::new(),
        ..BridgeConfig::default()
    };
    let err = Environment::new(Box::new(Vm::new()), config).err();
    assert!(matches!(err, Some(BridgeError::Argument(_))));
}

// ============================================================================
// Round trips
// ============================================================================

#[test]
fn test_primitive_values_round_trip() {
    let env = env();
    let values = [
        Value::Nil,
        Value::from(true),
        Value::from(-5),
        Value::from(i64::MAX),
        Value::from(2.5),
        Value::from(f64::NAN),
        Value::from("héllo"),
        Value::from_bytes(&[0xff, 0x00, 0x41]),
        Value::from_pointer(0x1000),
    ];
    for value in values {
        env.set_global("v", &value).unwrap();
        assert_eq!(env.get_global("v").unwrap(), value);
    }
}

#[test]
fn test_host_object_identity_round_trip() {
    let env = env();
    let ty = TypeBuilder::class("Node").build();
    let node = HostObject::new(&ty, 7u32);
    env.set_global("node", &Value::from(node.clone())).unwrap();

    let back = env.get_global("node").unwrap().to_host_object().unwrap();
    assert!(Rc::ptr_eq(&back, &node));
}

#[test]
fn test_type_set_round_trip() {
    let env = env();
    let plain = TypeBuilder::class("List").build();
    let generic = TypeBuilder::class("List")
        .generic(vec![tandem_engine::GenericParam::new("T")], |def, args| {
            TypeBuilder::class("List").closed_from(def, args).build()
        })
        .build();
    let set = HostTypeSet::new([plain.clone(), generic.clone()]).unwrap();
    env.set_global("List", &Value::HostTypes(set)).unwrap();

    let back = env.get_global("List").unwrap();
    let types = back.to_host_types().unwrap();
    assert!(types.contains(&plain));
    assert!(types.contains(&generic));
    assert_eq!(types.by_arity(1).map(|t| t.id()), Some(generic.id()));
}

#[test]
fn test_eval_returns_every_result() {
    let env = env();
    let results = env.eval("return 1, 'two', nil, 4.5", "multi").unwrap();
    assert_eq!(
        results,
        vec![Value::from(1), Value::from("two"), Value::Nil, Value::from(4.5)]
    );
}

#[test]
fn test_stack_is_balanced_after_calls() {
    let env = env();
    for _ in 0..100 {
        env.run("return 1, 2, 3").unwrap();
        let _ = env.run("error('x')");
    }
    assert_eq!(env.run("return select('#')").unwrap(), vec![Value::from(0)]);
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_load_error_names_chunk() {
    let env = env();
    match env.eval("local = 1", "broken") {
        Err(BridgeError::Load { chunk, line, .. }) => {
            assert_eq!(chunk, "broken");
            assert_eq!(line, 1);
        }
        other => panic!("expected a load error, got {:?}", other),
    }
}

#[test]
fn test_runtime_error_is_not_a_load_error() {
    let env = env();
    let err = env.eval("local t = nil\nreturn t.x", "main").unwrap_err();
    assert!(matches!(err, BridgeError::Runtime(_)), "{:?}", err);
}

// ============================================================================
// Disposal
// ============================================================================

#[test]
fn test_dispose_invalidates_handles() {
    let env = env();
    let table = env.create_table().unwrap();
    let function = env.run("return print").unwrap()[0].to_function().unwrap();
    let thread = env.create_thread(&function).unwrap();

    env.dispose();
    assert_eq!(table.pairs().unwrap_err(), BridgeError::Disposed);
    assert_eq!(function.call(&[]).unwrap_err(), BridgeError::Disposed);
    assert_eq!(thread.resume(&[]).unwrap_err(), BridgeError::Disposed);
    assert_eq!(thread.status().unwrap_err(), BridgeError::Disposed);
    assert_eq!(env.create_table().unwrap_err(), BridgeError::Disposed);
    assert_eq!(env.set_global("x", &Value::Nil).unwrap_err(), BridgeError::Disposed);
}

#[test]
fn test_dropped_handles_release_their_anchor() {
    let env = env();
    let table = env.create_table().unwrap();
    table.set_field("k", &Value::from(1)).unwrap();
    let copy = table.clone();
    drop(table);
    assert_eq!(copy.get_field("k").unwrap(), Value::from(1));
}
