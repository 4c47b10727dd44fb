//! Registry and caching
//!
//! One [`Registry`] lives in each environment. It memoizes candidate lists,
//! synthesized adapters and metatables per `(type, mode)`, and it anchors
//! host objects and type sets that have been handed to the runtime.
//!
//! An anchored value is represented in the runtime by a full userdata whose
//! payload is `(generation << 32) | slot`. The registry holds the userdata
//! weakly: while the script keeps it alive, pushing the same host value again
//! yields the same script value, and once the script drops it the `__gc`
//! adapter frees the slot. The generation makes a stale payload miss after
//! its slot has been released and reused.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tandem_sdk::{NativeFunction, RegistryKey, ScriptState, ScriptType};

use crate::adapter::{self, AdapterKind};
use crate::environment::Bridge;
use crate::host::{HostObjectRef, HostTypeId, HostTypeRef};
use crate::logging::{log_adapter_hit, log_adapter_synthesized, log_metatable_built};
use crate::members::{MemberList, MemberMode};
use crate::value::HostTypeSet;

/// A host value kept alive on behalf of the runtime
#[derive(Clone)]
pub(crate) enum Anchored {
    Object(HostObjectRef),
    Types(HostTypeSet),
}

impl Anchored {
    fn identity(&self) -> AnchorKey {
        match self {
            Anchored::Object(obj) => AnchorKey::Object(obj.address()),
            Anchored::Types(set) => AnchorKey::Types(set.key()),
        }
    }

    /// Type and mode whose metatable the userdata carries
    pub(crate) fn dispatch(&self) -> (HostTypeRef, MemberMode) {
        match self {
            Anchored::Object(obj) => (obj.host_type().clone(), MemberMode::Instance),
            Anchored::Types(set) => (set.primary().clone(), MemberMode::Static),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum AnchorKey {
    Object(usize),
    Types(Vec<u32>),
}

struct AnchorSlot {
    target: Anchored,
    key: Option<RegistryKey>,
}

/// Slot table of anchored host values
#[derive(Default)]
pub(crate) struct AnchorTable {
    slots: Vec<Option<AnchorSlot>>,
    generations: Vec<u32>,
    free: Vec<usize>,
    index: FxHashMap<AnchorKey, usize>,
}

impl AnchorTable {
    /// Registry key of an already anchored value
    pub(crate) fn find(&self, target: &Anchored) -> Option<RegistryKey> {
        let slot = *self.index.get(&target.identity())?;
        self.slots[slot].as_ref().and_then(|s| s.key)
    }

    /// Claim a slot for `target`, returning the slot and userdata payload
    pub(crate) fn reserve(&mut self, target: Anchored) -> (usize, u64) {
        let identity = target.identity();
        let entry = AnchorSlot { target, key: None };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(entry);
                slot
            }
            None => {
                self.slots.push(Some(entry));
                self.generations.push(0);
                self.slots.len() - 1
            }
        };
        self.index.insert(identity, slot);
        (slot, payload(slot, self.generations[slot]))
    }

    /// Record the registry key holding the slot's userdata
    pub(crate) fn commit(&mut self, slot: usize, key: RegistryKey) {
        if let Some(Some(entry)) = self.slots.get_mut(slot) {
            entry.key = Some(key);
        }
    }

    /// The value behind a userdata payload, if still anchored
    pub(crate) fn get(&self, payload: u64) -> Option<Anchored> {
        let (slot, generation) = split(payload);
        if self.generations.get(slot) != Some(&generation) {
            return None;
        }
        self.slots[slot].as_ref().map(|s| s.target.clone())
    }

    /// Release the slot behind `payload`
    pub(crate) fn release_payload(&mut self, payload: u64) -> Option<RegistryKey> {
        let (slot, generation) = split(payload);
        if self.generations.get(slot) != Some(&generation) {
            return None;
        }
        self.release_slot(slot)
    }

    /// Release the slot anchoring `target`
    pub(crate) fn release(&mut self, target: &Anchored) -> Option<RegistryKey> {
        let slot = *self.index.get(&target.identity())?;
        self.release_slot(slot)
    }

    fn release_slot(&mut self, slot: usize) -> Option<RegistryKey> {
        let entry = self.slots.get_mut(slot)?.take()?;
        self.index.remove(&entry.target.identity());
        self.generations[slot] = self.generations[slot].wrapping_add(1);
        self.free.push(slot);
        entry.key
    }

    pub(crate) fn len(&self) -> usize {
        self.index.len()
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.generations.clear();
        self.free.clear();
        self.index.clear();
    }
}

#[inline]
fn payload(slot: usize, generation: u32) -> u64 {
    ((generation as u64) << 32) | slot as u64
}

#[inline]
fn split(payload: u64) -> (usize, u32) {
    ((payload & 0xffff_ffff) as usize, (payload >> 32) as u32)
}

// ============================================================================
// Registry
// ============================================================================

type ModeKey = (HostTypeId, MemberMode);

/// Per-environment caches
#[derive(Default)]
pub(crate) struct Registry {
    members: RefCell<FxHashMap<ModeKey, Rc<MemberList>>>,
    adapters: RefCell<FxHashMap<(HostTypeId, MemberMode, AdapterKind), NativeFunction>>,
    metatables: RefCell<FxHashMap<ModeKey, RegistryKey>>,
    pub(crate) anchors: RefCell<AnchorTable>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Candidate list of `ty` in `mode`, resolved on first request
    pub(crate) fn members(&self, ty: &HostTypeRef, mode: MemberMode) -> Rc<MemberList> {
        let key = (ty.id(), mode);
        if let Some(list) = self.members.borrow().get(&key) {
            return list.clone();
        }
        let list = Rc::new(MemberList::resolve(ty, mode));
        self.members.borrow_mut().insert(key, list.clone());
        list
    }

    /// Adapter for `(ty, mode, kind)`, synthesized on first request
    pub(crate) fn adapter(&self, ty: &HostTypeRef, mode: MemberMode, kind: AdapterKind) -> NativeFunction {
        let key = (ty.id(), mode, kind);
        if let Some(function) = self.adapters.borrow().get(&key) {
            log_adapter_hit(ty, mode, kind);
            return function.clone();
        }
        let function = adapter::synthesize(ty, mode, kind);
        self.adapters.borrow_mut().insert(key, function.clone());
        log_adapter_synthesized(ty, mode, kind);
        function
    }

    /// Metatable shared by every anchored value of `(ty, mode)`
    pub(crate) fn metatable(&self, state: &mut dyn ScriptState, ty: &HostTypeRef, mode: MemberMode) -> RegistryKey {
        if let Some(key) = self.metatables.borrow().get(&(ty.id(), mode)) {
            return *key;
        }

        let kinds = adapter::kinds_for(ty, mode);
        state.create_table(0, kinds.len() + 1);
        for &kind in &kinds {
            let function = self.adapter(ty, mode, kind);
            state.push_str(kind.event());
            state.push_function(function);
            state.raw_set(-3);
        }
        state.push_str("__name");
        state.push_str(&ty.full_name());
        state.raw_set(-3);
        let key = state.reference();

        self.metatables.borrow_mut().insert((ty.id(), mode), key);
        log_metatable_built(ty, mode, kinds.len());
        key
    }

    /// Anchored value behind the full userdata at `idx`
    pub(crate) fn anchored_at(&self, state: &dyn ScriptState, idx: i32) -> Option<Anchored> {
        let payload = state.to_userdata(idx)?;
        self.anchors.borrow().get(payload)
    }

    pub(crate) fn adapter_count(&self) -> usize {
        self.adapters.borrow().len()
    }

    pub(crate) fn anchored_count(&self) -> usize {
        self.anchors.borrow().len()
    }

    /// Forget everything; registry keys die with the state
    pub(crate) fn clear(&self) {
        self.members.borrow_mut().clear();
        self.adapters.borrow_mut().clear();
        self.metatables.borrow_mut().clear();
        self.anchors.borrow_mut().clear();
    }
}

/// Push `target` as its anchored userdata, anchoring it on first use
pub(crate) fn push_anchored(bridge: &Bridge, state: &mut dyn ScriptState, target: Anchored) {
    let existing = bridge.registry.anchors.borrow().find(&target);
    if let Some(key) = existing {
        if state.push_reference(key) == ScriptType::UserData {
            return;
        }
        // dropped by the runtime, finalizer still pending
        state.pop(1);
        bridge.registry.anchors.borrow_mut().release(&target);
        state.unreference(key);
    }

    let (ty, mode) = target.dispatch();
    let metatable = bridge.registry.metatable(state, &ty, mode);
    let (slot, payload) = bridge.registry.anchors.borrow_mut().reserve(target);
    state.push_userdata(payload);
    state.push_reference(metatable);
    state.set_metatable(-2);
    state.push_value(-1);
    let key = state.reference_weak();
    bridge.registry.anchors.borrow_mut().commit(slot, key);
    crate::logging::log_anchored(&ty, slot);
}
