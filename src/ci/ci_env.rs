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

use crate::ci::ci_metadata::CiMetadataRef;
use crate::ci::ci_method_data::ProfilePolicy;
use crate::ci::ci_object::CiObjectRef;
use crate::ci::ci_object_factory::{CiObjectFactory, SharedObjectCache};
use crate::runtime::*;

use std::sync::Arc;

/// The context of one compilation: its object factory, its identity and
/// whether it has failed.
pub struct CiEnv {
    factory: CiObjectFactory,
    compile_id: usize,
    failure_reason: Option<String>
}

impl CiEnv {
    pub fn new(shared: &Arc<SharedObjectCache>, compile_id: usize, policy: ProfilePolicy) -> CiEnv {
        CiEnv {
            factory: CiObjectFactory::new(shared, policy),
            compile_id,
            failure_reason: None
        }
    }

    pub fn compile_id(&self) -> usize {
        self.compile_id
    }

    pub fn factory(&self) -> &CiObjectFactory {
        &self.factory
    }

    pub fn factory_mut(&mut self) -> &mut CiObjectFactory {
        &mut self.factory
    }

    pub fn universe(&self) -> &Arc<Universe> {
        self.factory.universe()
    }

    /// The first recorded reason sticks.
    pub fn record_failure(&mut self, reason: &str) {
        if self.failure_reason.is_none() {
            info!("compile {}: failed: {}", self.compile_id, reason);
            self.failure_reason = Some(reason.to_string());
        }
    }

    pub fn record_out_of_memory_failure(&mut self) {
        self.factory.record_out_of_memory_failure();
        self.record_failure("out of memory");
    }

    /// why the compilation failed, if it did
    pub fn failing(&self) -> Option<&str> {
        match self.failure_reason {
            Some(ref reason) => Some(reason),
            None if self.factory.out_of_memory() => Some("out of memory"),
            None => None
        }
    }

    pub fn unloaded_ciinstance_klass(&self) -> CiMetadataRef {
        self.factory.unloaded_ciinstance_klass()
    }

    pub fn unloaded_ciobjarrayklass(&self) -> CiMetadataRef {
        self.factory.unloaded_ciobjarrayklass()
    }

    pub fn unloaded_cisymbol(&self) -> CiMetadataRef {
        self.factory.vm_symbol(VmSymbolId::DummySymbol)
    }

    /// Resolves `name` as `accessing_klass` would. Only `require_local`
    /// lookups can come back empty; otherwise an unresolved name gives an
    /// unloaded placeholder.
    pub fn get_klass_by_name(
        &mut self,
        accessing_klass: Option<&CiMetadataRef>,
        name: &str,
        require_local: bool
    ) -> Option<CiMetadataRef> {
        let (loader, domain) = accessing_klass
            .and_then(|k| k.as_klass())
            .map_or((ClassLoaderId::BOOT, None), |k| (k.loader(), k.protection_domain()));
        self.get_klass_by_name_impl(name, loader, domain, require_local)
    }

    pub fn get_klass_by_name_impl(
        &mut self,
        name: &str,
        loader: ClassLoaderId,
        protection_domain: Option<ProtectionDomainId>,
        require_local: bool
    ) -> Option<CiMetadataRef> {
        let ret = self.factory.get_klass_by_name(name, loader, protection_domain, require_local);
        if self.factory.out_of_memory() {
            self.record_out_of_memory_failure();
        }
        ret
    }

    /// The method `holder.name signature`, looked up through the holder's
    /// superclasses, or an unloaded placeholder keyed by `accessor`.
    pub fn get_method_by_name(
        &mut self,
        holder: &CiMetadataRef,
        name: &str,
        signature: &str,
        accessor: &CiMetadataRef
    ) -> CiMetadataRef {
        let universe = self.universe().clone();
        let (name_sym, sig_sym) = match (universe.symbols().lookup(name), universe.symbols().lookup(signature)) {
            (Some(n), Some(s)) => (n, s),
            _ => {
                self.record_out_of_memory_failure();
                let dummy = self.unloaded_cisymbol();
                return self.factory.get_unloaded_method(holder, &dummy, &dummy, accessor);
            }
        };

        let found = holder
            .as_klass()
            .and_then(|k| k.klass())
            .and_then(|k| universe.find_method(k, &name_sym, &sig_sym));
        match found {
            Some(method) => self.factory.get_metadata(&Metadata::Method(method)),
            None => {
                let ci_name = self.factory.get_symbol(&name_sym);
                let ci_sig = self.factory.get_symbol(&sig_sym);
                self.factory.get_unloaded_method(holder, &ci_name, &ci_sig, accessor)
            }
        }
    }

    pub fn get_metadata(&mut self, key: &Metadata) -> CiMetadataRef {
        self.factory.get_metadata(key)
    }

    /// the wrapper of a heap object, the null object for None
    pub fn get_instance(&mut self, oop: Option<&Oop>) -> CiObjectRef {
        match oop {
            Some(oop) => self.factory.get(oop),
            None => self.factory.null_object()
        }
    }

    /// the profile snapshot of a method, empty if it has none
    pub fn get_method_data(&mut self, method: &CiMetadataRef) -> CiMetadataRef {
        self.factory.method_data_of(method)
    }

    /// The `java/lang/Class` instance of a klass. Unloaded klasses share
    /// one placeholder mirror.
    pub fn java_mirror(&mut self, klass: &CiMetadataRef) -> CiObjectRef {
        let mirror = klass
            .as_klass()
            .and_then(|k| k.klass())
            .and_then(|k| self.universe().java_mirror(k));
        match mirror {
            Some(oop) => self.factory.get(&oop),
            None => self.factory.get_unloaded_klass_mirror()
        }
    }

    /// the klass a mirror stands for
    pub fn java_mirror_type(&mut self, mirror: &CiObjectRef) -> Option<CiMetadataRef> {
        let id = mirror.handle()?.mirrored_klass()?;
        self.factory.get_metadata_by_id(id)
    }
}
