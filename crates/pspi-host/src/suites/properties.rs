//! Property suite.
//!
//! Only a handful of read-only image properties exist. Writes to them
//! succeed without effect; every other key fails the single call.

use tracing::trace;

use super::NO_CONTEXT;
use crate::abi::{FourCc, Handle, OsErr, codes, tags};
use crate::context::{InvocationContext, with_active};
use crate::handle::HandleRepresentation;

const KNOWN_KEYS: [FourCc; 5] = [
    tags::PROP_NUMBER_OF_CHANNELS,
    tags::PROP_CHANNEL_NAME,
    tags::PROP_IMAGE_MODE,
    tags::PROP_NUMBER_OF_PATHS,
    tags::PROP_PATH_NAME,
];

/// A property value ready to hand back.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Simple(i32),
    Complex(Vec<u8>),
}

fn lookup(context: &InvocationContext<'_>, key: FourCc, index: i32) -> Result<Value, OsErr> {
    let host = context.host_ref().ok_or(NO_CONTEXT)?;
    let nth = |names: Vec<String>| {
        usize::try_from(index)
            .ok()
            .and_then(|position| names.into_iter().nth(position))
            .map(|name| Value::Complex(name.into_bytes()))
            .ok_or(codes::ERR_PLUG_IN_PROPERTY_UNDEFINED)
    };
    match key {
        tags::PROP_NUMBER_OF_CHANNELS => Ok(Value::Simple(count(&host.channel_names()))),
        tags::PROP_CHANNEL_NAME => nth(host.channel_names()),
        tags::PROP_IMAGE_MODE => Ok(Value::Simple(i32::from(context.record.image_mode))),
        tags::PROP_NUMBER_OF_PATHS => Ok(Value::Simple(count(&host.path_names()))),
        tags::PROP_PATH_NAME => nth(host.path_names()),
        _ => Err(codes::ERR_PLUG_IN_HOST_INSUFFICIENT),
    }
}

fn count(names: &[String]) -> i32 {
    i32::try_from(names.len()).unwrap_or(i32::MAX)
}

pub(super) unsafe extern "C" fn get(
    signature: FourCc,
    key: FourCc,
    index: i32,
    simple_property: *mut i32,
    complex_property: *mut Handle,
) -> OsErr {
    if signature != tags::PHOTOSHOP_SIGNATURE {
        trace!(%signature, %key, "property with foreign signature");
        return codes::ERR_PLUG_IN_HOST_INSUFFICIENT;
    }
    with_active(NO_CONTEXT, |context| {
        let value = match lookup(context, key, index) {
            Ok(value) => value,
            Err(code) => {
                trace!(%key, index, code, "property unavailable");
                return code;
            }
        };
        trace!(%key, index, ?value, "property read");
        match value {
            Value::Simple(number) if !simple_property.is_null() => {
                // SAFETY: the module passes a writable slot for the value.
                unsafe { simple_property.write_unaligned(number) };
            }
            Value::Complex(bytes) if !complex_property.is_null() => {
                let handle = context.handles.restore(HandleRepresentation::Arena, &bytes);
                // SAFETY: the module passes a writable slot for the handle.
                unsafe { complex_property.write_unaligned(handle) };
            }
            Value::Simple(_) | Value::Complex(_) => return codes::NIL_HANDLE_ERR,
        }
        codes::NO_ERR
    })
}

pub(super) unsafe extern "C" fn set(
    signature: FourCc,
    key: FourCc,
    _index: i32,
    _simple_property: i32,
    _complex_property: Handle,
) -> OsErr {
    if signature == tags::PHOTOSHOP_SIGNATURE && KNOWN_KEYS.contains(&key) {
        trace!(%key, "ignoring property write");
        codes::NO_ERR
    } else {
        trace!(%signature, %key, "unsupported property write");
        codes::ERR_PLUG_IN_HOST_INSUFFICIENT
    }
}
