//! Bootstrap path: register a class, obtain its factory, create instances.

use std::ffi::c_void;

use crossbind::{
    AddRefFn, ClassFactory, ComClass, FactoryError, GUID, QueryInterfaceFn, RawComPtr, ReleaseFn,
    TablePtr, com_interface, register_class, unknown_add_ref, unknown_query_interface,
    unknown_release, with_exported,
};

com_interface! {
    interface IGreeter : "9b2f4e6a-1c3d-4b5e-8f70-717273747576", size 4 {
        [3] fn greet(&self) -> i32;
    }
}

com_interface! {
    /// An interface no registered class implements.
    interface IStranger : "9b2f4e6a-0000-4000-8000-717273747577", size 4 {
        [3] fn lurk(&self) -> i32;
    }
}

#[derive(Default)]
struct Greeter;

impl Greeter {
    fn greet(&self) -> i32 {
        42
    }
}

#[repr(C)]
struct GreeterVtbl {
    query_interface: QueryInterfaceFn,
    add_ref: AddRefFn,
    release: ReleaseFn,
    greet: unsafe extern "system" fn(this: RawComPtr) -> i32,
}

unsafe extern "system" fn greeter_greet(this: RawComPtr) -> i32 {
    with_exported::<Greeter, i32>(this, |object| object.value().greet())
}

static GREETER_VTBL: GreeterVtbl = GreeterVtbl {
    query_interface: unknown_query_interface,
    add_ref: unknown_add_ref,
    release: unknown_release,
    greet: greeter_greet,
};

impl ComClass for Greeter {
    fn dispatch_table(iid: &GUID) -> Option<TablePtr> {
        if *iid == IID_IGREETER || *iid == crossbind::IID_IUNKNOWN {
            Some(TablePtr(
                &GREETER_VTBL as *const GreeterVtbl as *const c_void,
            ))
        } else {
            None
        }
    }
}

const CLSID_GREETER: GUID = GUID::parse("77000001-0000-4000-8000-000000000001");
const CLSID_UNSERVED: GUID = GUID::parse("77000001-0000-4000-8000-0000000000ff");

#[test]
fn registered_class_is_created_through_its_factory() {
    register_class::<Greeter>(CLSID_GREETER);

    let greeter: IGreeter =
        ClassFactory::create_instance(CLSID_GREETER).expect("class is registered");
    assert_eq!(unsafe { greeter.greet() }, 42);
}

#[test]
fn each_create_call_yields_a_distinct_instance() {
    register_class::<Greeter>(CLSID_GREETER);
    let factory = ClassFactory::obtain(CLSID_GREETER).expect("class is registered");

    let first: IGreeter = factory.create().expect("supported interface");
    let second: IGreeter = factory.create().expect("supported interface");
    assert_ne!(first.as_raw(), second.as_raw());
}

#[test]
fn unknown_class_reports_class_not_registered() {
    let result = ClassFactory::create_instance::<IGreeter>(CLSID_UNSERVED);
    match result {
        Err(FactoryError::ClassNotRegistered { clsid, status }) => {
            assert_eq!(clsid, CLSID_UNSERVED);
            assert_eq!(status, crossbind::CLASS_E_CLASSNOTAVAILABLE);
        }
        other => panic!("expected ClassNotRegistered, got {other:?}"),
    }
}

#[test]
fn unsupported_interface_reports_interface_not_supported() {
    register_class::<Greeter>(CLSID_GREETER);

    let result = ClassFactory::create_instance::<IStranger>(CLSID_GREETER);
    match result {
        Err(FactoryError::InterfaceNotSupported { clsid, iid, status }) => {
            assert_eq!(clsid, CLSID_GREETER);
            assert_eq!(iid, IID_ISTRANGER);
            assert_eq!(status, crossbind::E_NOINTERFACE);
        }
        other => panic!("expected InterfaceNotSupported, got {other:?}"),
    }
}

#[test]
fn lock_server_accepts_both_directions() {
    register_class::<Greeter>(CLSID_GREETER);
    let factory = ClassFactory::obtain(CLSID_GREETER).expect("class is registered");

    assert_eq!(unsafe { factory_proxy(&factory).lock_server(1) }, 0);
    assert_eq!(unsafe { factory_proxy(&factory).lock_server(0) }, 0);
}

fn factory_proxy(factory: &ClassFactory) -> &crossbind::IClassFactory {
    factory.proxy()
}
