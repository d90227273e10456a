//! Resource suite.
//!
//! Resource blobs are kept as host metadata under
//! `pspi-res-<type>-<index>`. Indices are dense from zero, so deleting one
//! shifts every later blob down by one.

use tracing::trace;

use super::NO_CONTEXT;
use crate::abi::{FourCc, Handle, OsErr, codes};
use crate::context::with_active;
use crate::handle::HandleRepresentation;
use crate::host::FilterHost;

/// Metadata key of the resource at `index`.
#[must_use]
pub fn resource_key(of_type: FourCc, index: usize) -> String {
    let tag: String = of_type.bytes().iter().copied().map(char::from).collect();
    format!("pspi-res-{tag}-{index}")
}

fn count_in(host: &dyn FilterHost, of_type: FourCc) -> usize {
    (0..)
        .take_while(|index| host.find_metadata(&resource_key(of_type, *index)).is_some())
        .count()
}

pub(super) unsafe extern "C" fn count(of_type: FourCc) -> i16 {
    with_active(0, |context| {
        let Some(host) = context.host_ref() else {
            return 0;
        };
        let count = count_in(host, of_type);
        trace!(%of_type, count, "resource count");
        i16::try_from(count).unwrap_or(i16::MAX)
    })
}

pub(super) unsafe extern "C" fn get(of_type: FourCc, position: i16) -> Handle {
    with_active(std::ptr::null_mut(), |context| {
        let Ok(index) = usize::try_from(position) else {
            return std::ptr::null_mut();
        };
        let Some(bytes) = context
            .host_ref()
            .and_then(|host| host.find_metadata(&resource_key(of_type, index)))
        else {
            trace!(%of_type, index, "resource not found");
            return std::ptr::null_mut();
        };
        context.handles.restore(HandleRepresentation::Arena, &bytes)
    })
}

pub(super) unsafe extern "C" fn delete(of_type: FourCc, position: i16) {
    with_active((), |context| {
        let (Ok(index), Some(host)) = (usize::try_from(position), context.host()) else {
            return;
        };
        if host.find_metadata(&resource_key(of_type, index)).is_none() {
            trace!(%of_type, index, "delete of missing resource");
            return;
        }
        host.detach_metadata(&resource_key(of_type, index));
        let mut next = index + 1;
        while let Some(bytes) = host.find_metadata(&resource_key(of_type, next)) {
            host.attach_metadata(&resource_key(of_type, next - 1), &bytes);
            host.detach_metadata(&resource_key(of_type, next));
            next += 1;
        }
        trace!(%of_type, index, shifted = next - index - 1, "resource deleted");
    });
}

pub(super) unsafe extern "C" fn add(of_type: FourCc, data: Handle) -> OsErr {
    with_active(NO_CONTEXT, |context| {
        let Some((_, bytes)) = context.handles.contents(data) else {
            return codes::NIL_HANDLE_ERR;
        };
        let Some(host) = context.host() else {
            return NO_CONTEXT;
        };
        let index = count_in(&*host, of_type);
        host.attach_metadata(&resource_key(of_type, index), &bytes);
        trace!(%of_type, index, size = bytes.len(), "resource added");
        codes::NO_ERR
    })
}
