//! Logging helpers for the bridge
//!
//! Events are grouped by target so they can be filtered independently:
//! `tandem::adapter`, `tandem::members`, `tandem::env` and `tandem::marshal`.
//! The library never installs a subscriber.

use tracing::{debug, trace, warn};

use crate::adapter::AdapterKind;
use crate::host::HostType;
use crate::members::MemberMode;

/// Log a newly synthesized adapter
#[inline]
pub(crate) fn log_adapter_synthesized(ty: &HostType, mode: MemberMode, kind: AdapterKind) {
    debug!(
        target: "tandem::adapter",
        ty = %ty.full_name(),
        mode = ?mode,
        kind = ?kind,
        "adapter synthesized"
    );
}

/// Log an adapter served from the cache
#[inline]
pub(crate) fn log_adapter_hit(ty: &HostType, mode: MemberMode, kind: AdapterKind) {
    trace!(
        target: "tandem::adapter",
        ty = %ty.full_name(),
        mode = ?mode,
        kind = ?kind,
        "adapter cache hit"
    );
}

/// Log a metatable built for a type
#[inline]
pub(crate) fn log_metatable_built(ty: &HostType, mode: MemberMode, adapters: usize) {
    debug!(
        target: "tandem::adapter",
        ty = %ty.full_name(),
        mode = ?mode,
        adapters,
        "metatable built"
    );
}

/// Log a host panic caught at an adapter boundary
#[inline]
pub(crate) fn log_panic_caught(message: &str) {
    warn!(target: "tandem::adapter", message, "host panic caught in adapter");
}

/// Log a resolved candidate list
#[inline]
pub(crate) fn log_members_resolved(ty: &HostType, mode: MemberMode, count: usize) {
    debug!(
        target: "tandem::members",
        ty = %ty.full_name(),
        mode = ?mode,
        count,
        "candidate list resolved"
    );
}

/// Log a name table built from interned member names
#[inline]
pub(crate) fn log_name_table(ty: &HostType, interned: usize, long: usize) {
    trace!(
        target: "tandem::members",
        ty = %ty.full_name(),
        interned,
        long,
        "name table built"
    );
}

/// Log a failed try-load
#[inline]
pub(crate) fn log_conversion_failed(from: &str, to: &HostType) {
    trace!(
        target: "tandem::marshal",
        from,
        to = %to.full_name(),
        "conversion failed"
    );
}

/// Log a host object or type set anchored in the runtime
#[inline]
pub(crate) fn log_anchored(ty: &HostType, slot: usize) {
    trace!(
        target: "tandem::marshal",
        ty = %ty.full_name(),
        slot,
        "value anchored"
    );
}

/// Log an anchor freed after the runtime collected its userdata
#[inline]
pub(crate) fn log_unanchored(payload: u64, remaining: usize) {
    trace!(target: "tandem::marshal", payload, remaining, "collected value unanchored");
}
