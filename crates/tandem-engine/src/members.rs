//! Member Resolution
//!
//! For a host type and a mode (instance or static), builds the ordered list
//! of public members a script can reach, once, and looks names up in it.
//! Method overloads stay grouped under their name; picking one happens at
//! call time when the arguments are known.
//!
//! Names are looked up through a [`NameTable`]: every member name is
//! interned in the embedded runtime, so a short-string key matches by
//! identity and the table is a sorted array of `(StrId, member)` pairs,
//! scanned linearly when small and binary searched otherwise.

use std::cell::OnceCell;
use std::rc::Rc;

use tandem_sdk::{ScriptState, StrId};

use crate::config::BridgeConfig;
use crate::host::{EventInfo, FieldInfo, HostTypeRef, MethodInfo, PropertyInfo, TypeRef};
use crate::logging::{log_members_resolved, log_name_table};

/// Pseudo-member name under which indexers are exposed
pub const INDEXER_NAME: &str = "Item";

/// Whether members are looked up on an instance or on the type object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberMode {
    Instance,
    Static,
}

/// All overloads sharing a method name
pub struct MethodGroup {
    pub name: String,
    /// Most derived type declaring an overload
    pub owner: HostTypeRef,
    pub overloads: Vec<Rc<MethodInfo>>,
}

impl MethodGroup {
    /// `Type.Name`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.owner.full_name(), self.name)
    }

    pub fn has_generic(&self) -> bool {
        self.overloads.iter().any(|m| m.is_generic())
    }
}

/// A resolved candidate
#[derive(Clone)]
pub enum Member {
    Field(Rc<FieldInfo>),
    Property(Rc<PropertyInfo>),
    /// Every indexer of the type, exposed as `Item`
    Indexer(Rc<[Rc<PropertyInfo>]>),
    Methods(Rc<MethodGroup>),
    Event(Rc<EventInfo>),
    NestedType(HostTypeRef),
    /// Named enum value
    EnumValue(i64),
}

impl Member {
    /// Kind name used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Member::Field(f) if f.is_const() => "constant",
            Member::Field(f) if f.read_only => "read-only field",
            Member::Field(_) => "field",
            Member::Property(_) => "property",
            Member::Indexer(_) => "indexer",
            Member::Methods(_) => "method",
            Member::Event(_) => "event",
            Member::NestedType(_) => "nested type",
            Member::EnumValue(_) => "constant",
        }
    }
}

enum Pending {
    Ready(Member),
    Group(HostTypeRef, Vec<Rc<MethodInfo>>),
}

/// The memoized candidate list of one `(type, mode)`
pub struct MemberList {
    ty: HostTypeRef,
    mode: MemberMode,
    entries: Vec<(String, Member)>,
    indexers: Rc<[Rc<PropertyInfo>]>,
    names: OnceCell<NameTable>,
}

impl MemberList {
    /// Collect the public members of `ty` and its bases for `mode`.
    ///
    /// Members of a derived type shadow base members with the same name,
    /// except methods, whose overloads merge unless the derived one has the
    /// same signature (an override).
    pub fn resolve(ty: &HostTypeRef, mode: MemberMode) -> Self {
        let mut pending: Vec<(String, Pending)> = Vec::new();
        let mut indexers: Vec<Rc<PropertyInfo>> = Vec::new();
        let is_static = mode == MemberMode::Static;

        for declaring in hierarchy(ty) {
            let members = declaring.members();

            for field in members.fields.iter().filter(|f| f.visibility.is_public() && f.is_static() == is_static) {
                add(&mut pending, &field.name, Member::Field(field.clone()));
            }
            for property in members
                .properties
                .iter()
                .filter(|p| p.is_static == is_static && (p.readable() || p.writable()))
            {
                if property.is_indexer() {
                    if !is_static {
                        indexers.push(property.clone());
                    }
                } else {
                    add(&mut pending, &property.name, Member::Property(property.clone()));
                }
            }
            for method in members.methods.iter().filter(|m| m.visibility.is_public() && m.is_static == is_static) {
                add_method(&mut pending, &declaring, method);
            }
            for event in members.events.iter().filter(|e| e.visibility.is_public() && e.is_static == is_static) {
                add(&mut pending, &event.name, Member::Event(event.clone()));
            }
            if is_static {
                for nested in &members.nested {
                    add(&mut pending, nested.name(), Member::NestedType(nested.clone()));
                }
                for (name, value) in declaring.enum_values() {
                    add(&mut pending, name, Member::EnumValue(*value));
                }
            }
        }

        let indexers: Rc<[Rc<PropertyInfo>]> = indexers.into();
        if !indexers.is_empty() {
            add(&mut pending, INDEXER_NAME, Member::Indexer(indexers.clone()));
        }

        let entries: Vec<(String, Member)> = pending
            .into_iter()
            .map(|(name, p)| {
                let member = match p {
                    Pending::Ready(member) => member,
                    Pending::Group(owner, overloads) => Member::Methods(Rc::new(MethodGroup {
                        name: name.clone(),
                        owner,
                        overloads,
                    })),
                };
                (name, member)
            })
            .collect();

        log_members_resolved(ty, mode, entries.len());
        Self {
            ty: ty.clone(),
            mode,
            entries,
            indexers,
            names: OnceCell::new(),
        }
    }

    pub fn host_type(&self) -> &HostTypeRef {
        &self.ty
    }

    pub fn mode(&self) -> MemberMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Candidates in resolution order
    pub fn entries(&self) -> &[(String, Member)] {
        &self.entries
    }

    /// Look up a member by host-side name
    pub fn get(&self, name: &str) -> Option<&Member> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, m)| m)
    }

    /// Indexers of an instance list
    pub fn indexers(&self) -> &Rc<[Rc<PropertyInfo>]> {
        &self.indexers
    }

    /// Look up the string key at stack index `idx`.
    ///
    /// The name table is built on first use by interning every name.
    pub fn lookup(&self, state: &mut dyn ScriptState, idx: i32, config: &BridgeConfig) -> Option<Member> {
        let table = self.names.get_or_init(|| {
            let table = NameTable::build(self.entries.iter().map(|(n, _)| n.as_str()), state, config);
            log_name_table(&self.ty, table.interned.len(), table.long.len());
            table
        });
        table.find(state, idx).map(|slot| self.entries[slot].1.clone())
    }
}

/// `ty`, its base chain, then the interfaces an interface type extends
fn hierarchy(ty: &HostTypeRef) -> Vec<HostTypeRef> {
    let mut chain = vec![ty.clone()];
    let mut base = ty.base().cloned();
    while let Some(next) = base {
        base = next.base().cloned();
        chain.push(next);
    }
    if ty.is_interface() {
        let mut n = 0;
        while n < chain.len() {
            for parent in chain[n].interfaces().to_vec() {
                if !chain.iter().any(|t| t.id() == parent.id()) {
                    chain.push(parent);
                }
            }
            n += 1;
        }
    }
    chain
}

fn add(pending: &mut Vec<(String, Pending)>, name: &str, member: Member) {
    if !pending.iter().any(|(n, _)| n == name) {
        pending.push((name.to_string(), Pending::Ready(member)));
    }
}

fn add_method(pending: &mut Vec<(String, Pending)>, declaring: &HostTypeRef, method: &Rc<MethodInfo>) {
    match pending.iter_mut().find(|(n, _)| *n == method.name) {
        Some((_, Pending::Group(owner, overloads))) => {
            let owner = owner.clone();
            if !overloads.iter().any(|m| same_signature(m, &owner, method, declaring)) {
                overloads.push(method.clone());
            }
        }
        Some(_) => {}
        None => pending.push((method.name.clone(), Pending::Group(declaring.clone(), vec![method.clone()]))),
    }
}

fn same_signature(a: &MethodInfo, a_owner: &HostTypeRef, b: &MethodInfo, b_owner: &HostTypeRef) -> bool {
    a.params.len() == b.params.len()
        && a.generic_params.len() == b.generic_params.len()
        && a.params
            .iter()
            .zip(&b.params)
            .all(|(x, y)| signature_key(&x.ty, a_owner) == signature_key(&y.ty, b_owner))
}

fn signature_key(ty: &TypeRef, owner: &HostTypeRef) -> String {
    match ty.resolve(owner, &[]) {
        Some(resolved) => resolved.id().raw().to_string(),
        None => format!("{:?}", ty),
    }
}

// ============================================================================
// Name tables
// ============================================================================

/// Member names keyed by interned string identity
pub struct NameTable {
    /// Sorted by `StrId`
    interned: Vec<(StrId, usize)>,
    /// Names too long to intern, compared by bytes
    long: Vec<(Box<[u8]>, usize)>,
    linear_threshold: usize,
}

impl NameTable {
    /// Intern every name in `state`
    pub fn build<'a>(
        names: impl Iterator<Item = &'a str>,
        state: &mut dyn ScriptState,
        config: &BridgeConfig,
    ) -> Self {
        let mut interned = Vec::new();
        let mut long = Vec::new();
        for (slot, name) in names.enumerate() {
            let bytes = config.encoding.encode(name);
            let id = if bytes.len() <= config.short_key_limit {
                state.intern(&bytes)
            } else {
                None
            };
            match id {
                Some(id) => interned.push((id, slot)),
                None => long.push((bytes.into_boxed_slice(), slot)),
            }
        }
        interned.sort_by_key(|(id, _)| *id);
        Self {
            interned,
            long,
            linear_threshold: config.linear_lookup_threshold,
        }
    }

    /// Slot of the name matching the string at `idx`
    pub fn find(&self, state: &dyn ScriptState, idx: i32) -> Option<usize> {
        if let Some(id) = state.string_id(idx) {
            let found = if self.interned.len() < self.linear_threshold {
                self.interned.iter().find(|(k, _)| *k == id).map(|(_, slot)| *slot)
            } else {
                self.interned
                    .binary_search_by_key(&id, |(k, _)| *k)
                    .ok()
                    .map(|pos| self.interned[pos].1)
            };
            if found.is_some() {
                return found;
            }
        }
        if self.long.is_empty() {
            return None;
        }
        let bytes = state.to_bytes(idx)?;
        self.long.iter().find(|(name, _)| **name == *bytes).map(|(_, slot)| *slot)
    }

    pub fn len(&self) -> usize {
        self.interned.len() + self.long.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
