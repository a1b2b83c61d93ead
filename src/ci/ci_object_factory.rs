// Copyright 2017 The Australian National University
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The compiler interface's object factory.
//!
//! A factory hands out at most one wrapper per metadata item or heap
//! object. Wrappers for VM symbols, primitive types, the null object and
//! the well-known boot classes are built once into a `SharedObjectCache`
//! and visible to every compilation; everything else lives in the
//! factory of a single compilation and dies with it.

use crate::ci::ci_field::CiField;
use crate::ci::ci_klass::{CiKlass, CiKlassKind};
use crate::ci::ci_metadata::*;
use crate::ci::ci_method::CiMethod;
use crate::ci::ci_method_data::{CiMethodData, ProfilePolicy};
use crate::ci::ci_object::{CiObject, CiObjectRef};
use crate::ci::ci_symbol::CiSymbol;
use crate::ci::TRACE_CI;
use crate::runtime::*;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// number of buckets for heap object wrappers
pub const NON_PERM_BUCKETS: usize = 61;

/// The wrappers every compilation starts from. Built once, then read-only.
pub struct SharedObjectCache {
    universe: Arc<Universe>,
    metadata: Vec<(MetadataId, CiMetadataRef)>,
    vm_symbols: Vec<CiMetadataRef>,
    symbols: HashMap<SymbolId, CiMetadataRef>,
    basic_types: HashMap<BasicType, CiMetadataRef>,
    null_object: CiObjectRef,
    unloaded_ciinstance_klass: CiMetadataRef,
    unloaded_ciobjarrayklass: CiMetadataRef,
    ident_limit: usize
}

impl SharedObjectCache {
    /// Builds the shared wrappers: VM symbols, primitive types, the null
    /// object, the well-known classes, the primitive array classes and the
    /// placeholders used when a compilation runs out of memory.
    pub fn init_shared_objects(universe: &Arc<Universe>) -> Arc<SharedObjectCache> {
        let mut factory = CiObjectFactory::bootstrap(universe.clone());

        for &wk in WellKnownKlass::ALL.iter() {
            let klass = universe.well_known_klass(wk).clone();
            factory.get_metadata(&Metadata::Klass(klass));
        }
        for &bt in BasicType::ARRAY_ELEMENTS.iter() {
            if let Some(klass) = universe.type_array_klass(bt) {
                factory.get_metadata(&Metadata::Klass(klass.clone()));
            }
        }

        let unloaded_cisymbol = factory.vm_symbol(VmSymbolId::DummySymbol);
        let unloaded_ciinstance_klass = factory.new_metadata(CiMetadataKind::Klass(CiKlass::unloaded(
            unloaded_cisymbol.clone(),
            ClassLoaderId::BOOT,
            None,
            CiKlassKind::Instance {
                super_klass: None,
                fields: vec![],
                is_interface: false
            }
        )));
        let unloaded_ciobjarrayklass = factory.new_metadata(CiMetadataKind::Klass(CiKlass::unloaded(
            unloaded_cisymbol,
            ClassLoaderId::BOOT,
            None,
            CiKlassKind::ObjArray {
                base_element: unloaded_ciinstance_klass.clone(),
                dimension: 1
            }
        )));

        let cache = SharedObjectCache {
            universe: universe.clone(),
            ident_limit: factory.next_ident,
            metadata: factory.metadata,
            vm_symbols: factory.vm_symbols,
            symbols: factory.symbols,
            basic_types: factory.basic_types,
            null_object: factory.null_object,
            unloaded_ciinstance_klass,
            unloaded_ciobjarrayklass
        };
        info!(
            "ciObjectFactory: {} shared metadata, {} shared symbols, shared idents below {}",
            cache.metadata.len(),
            cache.vm_symbols.len() + cache.symbols.len(),
            cache.ident_limit
        );
        Arc::new(cache)
    }

    /// Releases the shared set. Returns false (and keeps nothing) if some
    /// compilation still holds a reference.
    pub fn shutdown(cache: Arc<SharedObjectCache>) -> bool {
        match Arc::try_unwrap(cache) {
            Ok(cache) => {
                debug!("ciObjectFactory: released {} shared metadata", cache.metadata.len());
                true
            }
            Err(cache) => {
                warn!(
                    "ciObjectFactory: shared set still referenced {} times at shutdown",
                    Arc::strong_count(&cache) - 1
                );
                false
            }
        }
    }

    pub fn universe(&self) -> &Arc<Universe> {
        &self.universe
    }

    /// every shared wrapper has an ident below this
    pub fn ident_limit(&self) -> usize {
        self.ident_limit
    }

    pub fn metadata_count(&self) -> usize {
        self.metadata.len()
    }

    pub fn vm_symbol(&self, sid: VmSymbolId) -> CiMetadataRef {
        self.vm_symbols[sid.index()].clone()
    }

    pub fn null_object(&self) -> CiObjectRef {
        self.null_object.clone()
    }

    pub fn unloaded_ciinstance_klass(&self) -> CiMetadataRef {
        self.unloaded_ciinstance_klass.clone()
    }

    pub fn unloaded_ciobjarrayklass(&self) -> CiMetadataRef {
        self.unloaded_ciobjarrayklass.clone()
    }
}

/// The wrapper cache of one compilation. Not shared between threads.
pub struct CiObjectFactory {
    universe: Arc<Universe>,
    shared: Option<Arc<SharedObjectCache>>,
    policy: ProfilePolicy,
    next_ident: usize,

    /// sorted by metadata id, shared entries included
    metadata: Vec<(MetadataId, CiMetadataRef)>,
    vm_symbols: Vec<CiMetadataRef>,
    symbols: HashMap<SymbolId, CiMetadataRef>,
    basic_types: HashMap<BasicType, CiMetadataRef>,
    null_object: CiObjectRef,

    non_perm_bucket: Vec<Vec<(Oop, CiObjectRef)>>,
    non_perm_count: usize,

    unloaded_klasses: Vec<CiMetadataRef>,
    unloaded_methods: Vec<CiMetadataRef>,
    unloaded_instances: Vec<CiObjectRef>,
    return_addresses: Vec<CiMetadataRef>,

    out_of_memory: bool
}

impl CiObjectFactory {
    /// a factory for one compilation, seeded with the shared set
    pub fn new(shared: &Arc<SharedObjectCache>, policy: ProfilePolicy) -> CiObjectFactory {
        CiObjectFactory {
            universe: shared.universe.clone(),
            shared: Some(shared.clone()),
            policy,
            next_ident: shared.ident_limit,
            metadata: shared.metadata.clone(),
            vm_symbols: shared.vm_symbols.clone(),
            symbols: shared.symbols.clone(),
            basic_types: shared.basic_types.clone(),
            null_object: shared.null_object.clone(),
            non_perm_bucket: vec![vec![]; NON_PERM_BUCKETS],
            non_perm_count: 0,
            unloaded_klasses: vec![],
            unloaded_methods: vec![],
            unloaded_instances: vec![],
            return_addresses: vec![],
            out_of_memory: false
        }
    }

    /// the factory that builds the shared set; everything it makes is shared
    fn bootstrap(universe: Arc<Universe>) -> CiObjectFactory {
        let mut next_ident = 1;
        let mut shared = |kind| {
            let ret = Arc::new(CiMetadata::new(next_ident, true, kind));
            next_ident += 1;
            ret
        };

        let vm_symbols: Vec<CiMetadataRef> = VmSymbolId::ALL
            .iter()
            .map(|&sid| shared(CiMetadataKind::Symbol(CiSymbol::new(universe.vm_symbol(sid).clone()))))
            .collect();
        let basic_types: HashMap<BasicType, CiMetadataRef> = BasicType::ALL
            .iter()
            .filter(|bt| bt.has_primitive_type())
            .map(|&bt| (bt, shared(CiMetadataKind::Type(CiType::new(bt)))))
            .collect();
        let null_object = Arc::new(CiObject::null(next_ident, true));
        next_ident += 1;

        CiObjectFactory {
            universe,
            shared: None,
            policy: ProfilePolicy::default(),
            next_ident,
            metadata: vec![],
            vm_symbols,
            symbols: HashMap::new(),
            basic_types,
            null_object,
            non_perm_bucket: vec![vec![]; NON_PERM_BUCKETS],
            non_perm_count: 0,
            unloaded_klasses: vec![],
            unloaded_methods: vec![],
            unloaded_instances: vec![],
            return_addresses: vec![],
            out_of_memory: false
        }
    }

    fn is_bootstrapping(&self) -> bool {
        self.shared.is_none()
    }

    pub fn universe(&self) -> &Arc<Universe> {
        &self.universe
    }

    pub fn policy(&self) -> &ProfilePolicy {
        &self.policy
    }

    fn next_ident(&mut self) -> usize {
        let ret = self.next_ident;
        self.next_ident += 1;
        ret
    }

    fn new_metadata(&mut self, kind: CiMetadataKind) -> CiMetadataRef {
        let ident = self.next_ident();
        Arc::new(CiMetadata::new(ident, self.is_bootstrapping(), kind))
    }

    fn find(&self, id: MetadataId) -> Result<usize, usize> {
        self.metadata.binary_search_by_key(&id, |&(k, _)| k)
    }

    /// Gets the wrapper for a metadata item, creating it on a miss.
    pub fn get_metadata(&mut self, key: &Metadata) -> CiMetadataRef {
        let id = key.id();
        let len = self.metadata.len();
        let index = match self.find(id) {
            Ok(i) => return self.metadata[i].1.clone(),
            Err(i) => i
        };

        let kind = self.create_new_metadata(key);
        let new_object = self.new_metadata(kind);
        trace_if!(TRACE_CI, "ciObjectFactory: created {}", new_object);

        // making the wrapper may have inserted others
        let index = if len != self.metadata.len() {
            match self.find(id) {
                Ok(_) => should_not_reach_here!("{} was inserted while its wrapper was made", id),
                Err(i) => i
            }
        } else {
            index
        };
        self.metadata.insert(index, (id, new_object.clone()));
        debug_assert!(self.metadata.windows(2).all(|w| w[0].0 < w[1].0));
        new_object
    }

    fn create_new_metadata(&mut self, key: &Metadata) -> CiMetadataKind {
        match *key {
            Metadata::Klass(ref klass) => CiMetadataKind::Klass(self.create_klass(klass)),
            Metadata::Method(ref method) => {
                let holder = self.get_metadata(&Metadata::Klass(method.holder().clone()));
                let name = self.get_symbol(method.name());
                let signature = self.get_symbol(method.signature());
                CiMetadataKind::Method(CiMethod::loaded(holder, name, signature, method.clone()))
            }
            Metadata::MethodData(ref mdo) => {
                guarantee!(!self.is_bootstrapping(), "profiles are never shared");
                let mut data = CiMethodData::new(mdo.clone());
                data.load_data(self);
                CiMetadataKind::MethodData(data)
            }
        }
    }

    fn create_klass(&mut self, klass: &Arc<Klass>) -> CiKlass {
        guarantee!(klass.is_loader_alive(), "{} has been unloaded", klass);
        let name = self.get_symbol(klass.name());
        let kind = match *klass.kind() {
            KlassKind::Instance { ref super_klass, ref fields, is_interface } => {
                let super_klass = match *super_klass {
                    Some(ref s) => Some(self.get_metadata(&Metadata::Klass(s.clone()))),
                    None => None
                };
                let mut ci_fields = Vec::with_capacity(fields.len());
                for f in fields.iter() {
                    ci_fields.push(CiField::new(
                        self.get_symbol(&f.name),
                        self.get_symbol(&f.signature),
                        f.offset,
                        f.is_static,
                        klass.loader(),
                        klass.protection_domain(),
                        self.is_bootstrapping()
                    ));
                }
                CiKlassKind::Instance {
                    super_klass,
                    fields: ci_fields,
                    is_interface
                }
            }
            KlassKind::ObjArray { ref element, dimension } => {
                let mut base = element;
                while let KlassKind::ObjArray { ref element, .. } = *base.kind() {
                    base = element;
                }
                CiKlassKind::ObjArray {
                    base_element: self.get_metadata(&Metadata::Klass(base.clone())),
                    dimension
                }
            }
            KlassKind::TypeArray { element } => CiKlassKind::TypeArray { element }
        };
        CiKlass::loaded(name, klass.clone(), kind)
    }

    /// Gets the wrapper for a heap object, creating it on a miss. Objects
    /// are bucketed by their klass wrapper.
    pub fn get(&mut self, oop: &Oop) -> CiObjectRef {
        guarantee!(!self.is_bootstrapping(), "heap objects are never shared");
        let klass = self.get_metadata(&Metadata::Klass(oop.klass().clone()));
        let bucket = klass.hash() % NON_PERM_BUCKETS;
        if let Some(&(_, ref obj)) = self.non_perm_bucket[bucket].iter().find(|&&(ref o, _)| o.id() == oop.id()) {
            return obj.clone();
        }

        let ident = self.next_ident();
        let new_object = Arc::new(CiObject::from_oop(ident, klass, oop.clone()));
        trace_if!(TRACE_CI, "ciObjectFactory: created {}", new_object);
        self.non_perm_bucket[bucket].insert(0, (oop.clone(), new_object.clone()));
        self.non_perm_count += 1;
        new_object
    }

    pub fn get_symbol(&mut self, symbol: &Symbol) -> CiMetadataRef {
        if let Some(sid) = VmSymbolId::find(symbol.as_str()) {
            return self.vm_symbol(sid);
        }
        if let Some(s) = self.symbols.get(&symbol.id()) {
            return s.clone();
        }
        let s = self.new_metadata(CiMetadataKind::Symbol(CiSymbol::new(symbol.clone())));
        self.symbols.insert(symbol.id(), s.clone());
        s
    }

    /// Interns `name` and wraps it. None, with the out-of-memory failure
    /// recorded, if the symbol table is full.
    pub fn lookup_symbol(&mut self, name: &str) -> Option<CiMetadataRef> {
        match self.universe.symbols().lookup(name) {
            Some(sym) => Some(self.get_symbol(&sym)),
            None => {
                self.record_out_of_memory_failure();
                None
            }
        }
    }

    pub fn vm_symbol(&self, sid: VmSymbolId) -> CiMetadataRef {
        self.vm_symbols[sid.index()].clone()
    }

    /// the wrapper of a primitive type
    pub fn get_type(&self, bt: BasicType) -> CiMetadataRef {
        match self.basic_types.get(&bt) {
            Some(t) => t.clone(),
            None => should_not_reach_here!("{} is not a primitive type", bt)
        }
    }

    pub fn null_object(&self) -> CiObjectRef {
        self.null_object.clone()
    }

    pub fn well_known_klass(&mut self, wk: WellKnownKlass) -> CiMetadataRef {
        let klass = self.universe.well_known_klass(wk).clone();
        self.get_metadata(&Metadata::Klass(klass))
    }

    fn type_array_klass(&mut self, bt: BasicType) -> CiMetadataRef {
        match self.universe.type_array_klass(bt).cloned() {
            Some(klass) => self.get_metadata(&Metadata::Klass(klass)),
            None => should_not_reach_here!("no array class for {}", bt)
        }
    }

    pub fn unloaded_ciinstance_klass(&self) -> CiMetadataRef {
        match self.shared {
            Some(ref s) => s.unloaded_ciinstance_klass(),
            None => should_not_reach_here!("placeholders do not exist while bootstrapping")
        }
    }

    pub fn unloaded_ciobjarrayklass(&self) -> CiMetadataRef {
        match self.shared {
            Some(ref s) => s.unloaded_ciobjarrayklass(),
            None => should_not_reach_here!("placeholders do not exist while bootstrapping")
        }
    }

    pub fn record_out_of_memory_failure(&mut self) {
        if !self.out_of_memory {
            warn!("ciObjectFactory: out of memory, degrading to unloaded placeholders");
        }
        self.out_of_memory = true;
    }

    pub fn out_of_memory(&self) -> bool {
        self.out_of_memory
    }

    /// Resolves a class name as seen from `loader`. Signature-form names
    /// (`Lfoo;`) are accepted. An array class whose element is loaded is
    /// made on the spot. Anything else becomes an unloaded placeholder,
    /// unless `require_local` asks for the loader's own classes only.
    pub fn get_klass_by_name(
        &mut self,
        name: &str,
        loader: ClassLoaderId,
        protection_domain: Option<ProtectionDomainId>,
        require_local: bool
    ) -> Option<CiMetadataRef> {
        if name.len() > 2 && name.starts_with('L') && name.ends_with(';') {
            return self.get_klass_by_name(&name[1..name.len() - 1], loader, protection_domain, require_local);
        }

        let sym = match self.universe.symbols().lookup(name) {
            Some(sym) => sym,
            None => {
                self.record_out_of_memory_failure();
                return Some(if name.starts_with('[') {
                    self.unloaded_ciobjarrayklass()
                } else {
                    self.unloaded_ciinstance_klass()
                });
            }
        };

        let found = if require_local {
            self.universe.find_local_klass(&sym, loader)
        } else {
            self.universe.find_klass(&sym, loader)
        };
        if let Some(klass) = found {
            return Some(self.get_metadata(&Metadata::Klass(klass)));
        }

        if !require_local && array_name_info(name).is_some() {
            let element = self.get_klass_by_name(&name[1..], loader, protection_domain, false);
            if let Some(element) = element.as_ref().and_then(|e| e.as_klass()).and_then(|k| k.klass()).cloned() {
                let array = self.universe.obj_array_klass_of(&element);
                return Some(self.get_metadata(&Metadata::Klass(array)));
            }
        }

        if require_local {
            return None;
        }
        let name = self.get_symbol(&sym);
        Some(self.unloaded_klass_for(&name, loader, protection_domain))
    }

    /// Gets a placeholder for a class that is not loaded, keyed by name
    /// and the loader and protection domain of `accessing_klass`.
    pub fn get_unloaded_klass(
        &mut self,
        accessing_klass: Option<&CiMetadataRef>,
        name: &CiMetadataRef,
        create_if_not_found: bool
    ) -> Option<CiMetadataRef> {
        let (loader, domain) = accessing_klass
            .and_then(|k| k.as_klass())
            .map_or((ClassLoaderId::BOOT, None), |k| (k.loader(), k.protection_domain()));
        if let Some(k) = self.find_unloaded_klass(name, loader, domain) {
            return Some(k);
        }
        if !create_if_not_found {
            return None;
        }
        Some(self.unloaded_klass_for(name, loader, domain))
    }

    fn find_unloaded_klass(
        &self,
        name: &CiMetadataRef,
        loader: ClassLoaderId,
        domain: Option<ProtectionDomainId>
    ) -> Option<CiMetadataRef> {
        self.unloaded_klasses
            .iter()
            .find(|entry| match entry.as_klass() {
                Some(k) => Arc::ptr_eq(k.name(), name) && k.loader() == loader && k.protection_domain() == domain,
                None => false
            })
            .cloned()
    }

    fn unloaded_klass_for(
        &mut self,
        name: &CiMetadataRef,
        loader: ClassLoaderId,
        domain: Option<ProtectionDomainId>
    ) -> CiMetadataRef {
        if let Some(k) = self.find_unloaded_klass(name, loader, domain) {
            return k;
        }

        let name_str = name.symbol_str().unwrap_or("").to_string();
        let kind = match array_name_info(&name_str) {
            Some((dimension, BasicType::Object, element)) => {
                let base = self
                    .get_klass_by_name(element, loader, domain, false)
                    .unwrap_or_else(|| self.unloaded_ciinstance_klass());
                CiKlassKind::ObjArray {
                    base_element: base,
                    dimension
                }
            }
            Some((dimension, bt, _)) => {
                guarantee!(dimension > 1, "one-dimensional primitive arrays are always loaded");
                CiKlassKind::ObjArray {
                    base_element: self.type_array_klass(bt),
                    dimension
                }
            }
            None if name_str.starts_with('[') => {
                self.record_out_of_memory_failure();
                return self.unloaded_ciobjarrayklass();
            }
            None => CiKlassKind::Instance {
                super_klass: None,
                fields: vec![],
                is_interface: false
            }
        };

        let new_klass = self.new_metadata(CiMetadataKind::Klass(CiKlass::unloaded(name.clone(), loader, domain, kind)));
        trace_if!(TRACE_CI, "ciObjectFactory: created {}", new_klass);
        self.unloaded_klasses.push(new_klass.clone());
        new_klass
    }

    /// Gets a placeholder for a method that could not be resolved from
    /// `accessor`.
    pub fn get_unloaded_method(
        &mut self,
        holder: &CiMetadataRef,
        name: &CiMetadataRef,
        signature: &CiMetadataRef,
        accessor: &CiMetadataRef
    ) -> CiMetadataRef {
        let found = self.unloaded_methods.iter().find(|entry| match entry.as_method() {
            Some(m) => {
                Arc::ptr_eq(m.holder(), holder)
                    && Arc::ptr_eq(m.name(), name)
                    && Arc::ptr_eq(m.signature(), signature)
                    && m.accessor().map_or(false, |a| Arc::ptr_eq(a, accessor))
            }
            None => false
        });
        if let Some(m) = found {
            return m.clone();
        }

        let new_method = self.new_metadata(CiMetadataKind::Method(CiMethod::unloaded(
            holder.clone(),
            name.clone(),
            signature.clone(),
            accessor.clone()
        )));
        trace_if!(TRACE_CI, "ciObjectFactory: created {}", new_method);
        self.unloaded_methods.push(new_method.clone());
        new_method
    }

    /// Gets a placeholder instance of a class that is not loaded.
    pub fn get_unloaded_instance(&mut self, instance_klass: &CiMetadataRef) -> CiObjectRef {
        guarantee!(
            instance_klass.as_klass().map_or(false, |k| k.is_instance_klass()),
            "{} is not an instance klass",
            instance_klass
        );
        if let Some(obj) = self
            .unloaded_instances
            .iter()
            .find(|obj| obj.klass().map_or(false, |k| Arc::ptr_eq(k, instance_klass)))
        {
            return obj.clone();
        }

        let ident = self.next_ident();
        let new_instance = Arc::new(CiObject::unloaded_instance(ident, instance_klass.clone()));
        self.unloaded_instances.push(new_instance.clone());
        new_instance
    }

    /// the mirror of a class that is not loaded
    pub fn get_unloaded_klass_mirror(&mut self) -> CiObjectRef {
        let class_klass = self.well_known_klass(WellKnownKlass::Class);
        self.get_unloaded_instance(&class_klass)
    }

    pub fn get_unloaded_method_handle_constant(&mut self) -> CiObjectRef {
        let mh_klass = self.well_known_klass(WellKnownKlass::MethodHandle);
        self.get_unloaded_instance(&mh_klass)
    }

    pub fn get_unloaded_method_type_constant(&mut self) -> CiObjectRef {
        let mt_klass = self.well_known_klass(WellKnownKlass::MethodType);
        self.get_unloaded_instance(&mt_klass)
    }

    pub fn get_return_address(&mut self, bci: usize) -> CiMetadataRef {
        if let Some(r) = self
            .return_addresses
            .iter()
            .find(|r| r.as_return_address().map_or(false, |r| r.bci() == bci))
        {
            return r.clone();
        }
        let new_ret_addr = self.new_metadata(CiMetadataKind::ReturnAddress(CiReturnAddress::new(bci)));
        self.return_addresses.push(new_ret_addr.clone());
        new_ret_addr
    }

    /// a fresh profile wrapper for a method without one
    pub fn get_empty_method_data(&mut self) -> CiMetadataRef {
        self.new_metadata(CiMetadataKind::MethodData(CiMethodData::empty()))
    }

    /// The profile of `method` as of now, or an empty one.
    pub fn method_data_of(&mut self, method: &CiMetadataRef) -> CiMetadataRef {
        let mdo = method.as_method().and_then(|m| m.method()).and_then(|m| m.method_data());
        match mdo {
            Some(mdo) => self.get_metadata(&Metadata::MethodData(mdo)),
            None => self.get_empty_method_data()
        }
    }

    /// The wrapper of a loaded metadata item by identity. None once the
    /// item is unloaded or if it is a class whose loader is gone.
    pub fn get_metadata_by_id(&mut self, id: MetadataId) -> Option<CiMetadataRef> {
        if let Ok(i) = self.find(id) {
            return Some(self.metadata[i].1.clone());
        }
        match self.universe.metadata_at(id)? {
            Metadata::Klass(ref k) if !k.is_loader_alive() => None,
            Metadata::Method(ref m) if !m.holder().is_loader_alive() => None,
            key => Some(self.get_metadata(&key))
        }
    }

    pub fn metadata_count(&self) -> usize {
        self.metadata.len()
    }

    pub fn non_perm_count(&self) -> usize {
        self.non_perm_count
    }

    pub fn unloaded_klass_count(&self) -> usize {
        self.unloaded_klasses.len()
    }

    pub fn print_contents(&self) -> String {
        let mut ret = format!("{}\n", self);
        for &(_, ref m) in self.metadata.iter() {
            ret.push_str(&format!("  {}\n", m));
        }
        for bucket in self.non_perm_bucket.iter() {
            for &(_, ref obj) in bucket.iter() {
                ret.push_str(&format!("  {}\n", obj));
            }
        }
        for k in self.unloaded_klasses.iter().chain(self.unloaded_methods.iter()) {
            ret.push_str(&format!("  {}\n", k));
        }
        for obj in self.unloaded_instances.iter() {
            ret.push_str(&format!("  {}\n", obj));
        }
        ret
    }

    pub fn print(&self) {
        info!("{}", self);
    }
}

impl fmt::Display for CiObjectFactory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<ciObjectFactory> ({}) metadata, ({}) non-perm objects, ({}) unloaded klasses, ({}) unloaded methods, ({}) unloaded instances",
            self.metadata.len(),
            self.non_perm_count,
            self.unloaded_klasses.len(),
            self.unloaded_methods.len(),
            self.unloaded_instances.len()
        )
    }
}
