//! A small native core shared across the integration tests.
//!
//! Each `demo_*` function below is what generated scaffolding for one exported
//! function looks like: arguments are lifted from core buffers, the body runs
//! through the call envelope, and the result is lowered back.

#![allow(dead_code)]

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use ffi_contract::codec::{
    CodecError, EnumDesc, FieldDesc, Reader, VariantDesc, Writer, read_discriminant,
    write_discriminant,
};
use ffi_contract::future;
use ffi_contract::prelude::*;
use once_cell::sync::Lazy;
use tokio::sync::oneshot;

// =============================================================================
// Contract
// =============================================================================

pub const CONTRACT_VERSION: u32 = 7;

pub fn store_error_type() -> TypeDesc {
    TypeDesc::Enum(EnumDesc::new(
        "StoreError",
        vec![
            VariantDesc::new("NotFound", vec![FieldDesc::new("key", TypeDesc::String)]),
            VariantDesc::unit("ReadOnly"),
        ],
    ))
}

pub fn add_signature() -> FunctionSignature {
    FunctionSignature::new("demo_add")
        .arg("a", TypeDesc::I32)
        .arg("b", TypeDesc::I32)
        .returns(TypeDesc::I32)
}

pub fn lookup_signature() -> FunctionSignature {
    FunctionSignature::new("demo_lookup")
        .arg("key", TypeDesc::String)
        .returns(TypeDesc::String)
        .throws(store_error_type())
}

pub fn delayed_echo_signature() -> FunctionSignature {
    FunctionSignature::new("demo_delayed_echo")
        .arg("value", TypeDesc::U32)
        .arg("delay_ms", TypeDesc::U64)
        .returns(TypeDesc::U32)
        .asynchronous()
}

pub fn signatures() -> Vec<FunctionSignature> {
    vec![add_signature(), lookup_signature(), delayed_echo_signature()]
}

ffi_contract::export_integrity! {
    version demo_contract_version = CONTRACT_VERSION;
    checksum demo_checksum_add = add_signature();
    checksum demo_checksum_lookup = lookup_signature();
    checksum demo_checksum_delayed_echo = delayed_echo_signature();
}

// =============================================================================
// Declared error
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NotFound(String),
    ReadOnly,
}

impl Lower for StoreError {
    fn allocation_size(&self) -> u64 {
        4 + match self {
            Self::NotFound(key) => key.allocation_size(),
            Self::ReadOnly => 0,
        }
    }

    fn write(&self, writer: &mut Writer<'_>) -> std::result::Result<(), CodecError> {
        match self {
            Self::NotFound(key) => {
                write_discriminant(writer, 0)?;
                key.write(writer)
            }
            Self::ReadOnly => write_discriminant(writer, 1),
        }
    }
}

impl Lift for StoreError {
    fn read(reader: &mut Reader<'_>) -> std::result::Result<Self, CodecError> {
        match read_discriminant(reader, "StoreError", 2)? {
            0 => Ok(Self::NotFound(String::read(reader)?)),
            _ => Ok(Self::ReadOnly),
        }
    }
}

// =============================================================================
// Synchronous exports
// =============================================================================

#[unsafe(no_mangle)]
pub extern "C" fn demo_add(a: i32, b: i32, status: &mut CallStatus) -> i32 {
    call_with_output(status, || a.checked_add(b).expect("i32 overflow in demo_add"))
}

#[unsafe(no_mangle)]
pub extern "C" fn demo_lookup(key: CoreBuffer, status: &mut CallStatus) -> CoreBuffer {
    call_with_result(status, || {
        let key: String = key
            .lift()
            .map_err(|e| StoreError::NotFound(e.to_string()))?;
        match key.as_str() {
            "greeting" => Ok("hello".to_string()),
            "config" => Err(StoreError::ReadOnly),
            _ => Err(StoreError::NotFound(key)),
        }
    })
}

/// Sum a sequence of numbers; a malformed argument is an internal failure.
#[unsafe(no_mangle)]
pub extern "C" fn demo_sum(values: CoreBuffer, status: &mut CallStatus) -> i64 {
    call_with_internal(status, || {
        let values: Vec<i64> = values.lift()?;
        Ok(values.iter().sum::<i64>())
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn demo_is_even(value: u32, status: &mut CallStatus) -> i8 {
    call_with_output(status, || value % 2 == 0)
}

// =============================================================================
// Objects
// =============================================================================

#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU32,
}

pub static COUNTERS: Lazy<HandleMap<Arc<Counter>>> = Lazy::new(|| HandleMap::new("Counter"));

#[unsafe(no_mangle)]
pub extern "C" fn demo_counter_new(start: u32, status: &mut CallStatus) -> u64 {
    call_with_internal(status, || {
        let counter = Counter {
            value: AtomicU32::new(start),
        };
        Ok(COUNTERS.insert(Arc::new(counter))?)
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn demo_counter_increment(handle: u64, status: &mut CallStatus) -> u32 {
    call_with_internal(status, || {
        let counter = COUNTERS.get(Handle::from_raw(handle))?;
        Ok(counter.value.fetch_add(1, Ordering::SeqCst) + 1)
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn demo_counter_clone(handle: u64, status: &mut CallStatus) -> u64 {
    call_with_internal(status, || Ok(COUNTERS.clone_handle(Handle::from_raw(handle))?))
}

#[unsafe(no_mangle)]
pub extern "C" fn demo_counter_free(handle: u64, status: &mut CallStatus) {
    call_with_internal(status, || {
        COUNTERS.remove(Handle::from_raw(handle))?;
        Ok(())
    })
}

// =============================================================================
// Async exports
// =============================================================================

/// Resolve with `value` after `delay_ms`, completed from a plain thread so the
/// future does not depend on any particular executor.
#[unsafe(no_mangle)]
pub extern "C" fn demo_delayed_echo(value: u32, delay_ms: u64) -> u64 {
    future::start(async move {
        let (sender, receiver) = oneshot::channel();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(delay_ms));
            let _ = sender.send(value);
        });
        Ok::<u32, Infallible>(receiver.await.unwrap_or_default())
    })
}

/// Fail with a declared error once polled.
#[unsafe(no_mangle)]
pub extern "C" fn demo_async_lookup(key: CoreBuffer) -> u64 {
    future::start(async move {
        let key: String = key
            .lift()
            .map_err(|e| StoreError::NotFound(e.to_string()))?;
        match key.as_str() {
            "greeting" => Ok("hello".to_string()),
            _ => Err(StoreError::NotFound(key)),
        }
    })
}

/// Never resolves on its own; used for cancellation.
#[unsafe(no_mangle)]
pub extern "C" fn demo_forever() -> u64 {
    future::start(async {
        std::future::pending::<()>().await;
        Ok::<(), Infallible>(())
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn demo_async_panic() -> u64 {
    future::start(async {
        if std::hint::black_box(true) {
            panic!("async core exploded");
        }
        Ok::<u64, Infallible>(0)
    })
}

// =============================================================================
// Helpers
// =============================================================================

pub fn caller() -> Caller {
    Caller::in_process()
}

/// The contract a binding generated alongside this core would carry.
pub fn bindings() -> BindingContract {
    BindingContract::from_signatures(CONTRACT_VERSION, &signatures())
}
