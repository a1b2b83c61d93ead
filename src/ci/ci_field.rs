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

use crate::ci::ci_env::CiEnv;
use crate::ci::ci_metadata::CiMetadataRef;
use crate::runtime::BasicType;
use crate::runtime::ClassLoaderId;
use crate::runtime::ProtectionDomainId;

use std::sync::RwLock;

/// A field of a loaded instance klass.
///
/// The field's object type resolves lazily. A shared field only caches a
/// shared type, since an unshared wrapper belongs to a single compilation.
pub struct CiField {
    name: CiMetadataRef,
    signature: CiMetadataRef,
    offset: usize,
    is_static: bool,
    basic_type: BasicType,
    loader: ClassLoaderId,
    protection_domain: Option<ProtectionDomainId>,
    shared: bool,
    field_type: RwLock<Option<CiMetadataRef>>
}

impl CiField {
    pub(crate) fn new(
        name: CiMetadataRef,
        signature: CiMetadataRef,
        offset: usize,
        is_static: bool,
        loader: ClassLoaderId,
        protection_domain: Option<ProtectionDomainId>,
        shared: bool
    ) -> CiField {
        let basic_type = signature.symbol_str()
            .and_then(BasicType::from_signature)
            .unwrap_or(BasicType::Conflict);
        CiField {
            name,
            signature,
            offset,
            is_static,
            basic_type,
            loader,
            protection_domain,
            shared,
            field_type: RwLock::new(None)
        }
    }

    pub fn name(&self) -> &CiMetadataRef {
        &self.name
    }

    pub fn name_str(&self) -> &str {
        self.name.symbol_str().unwrap_or("")
    }

    pub fn signature(&self) -> &CiMetadataRef {
        &self.signature
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn basic_type(&self) -> BasicType {
        self.basic_type
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }

    /// The type of the field: a primitive type wrapper, or the klass named
    /// by the signature (possibly unloaded).
    pub fn field_type(&self, env: &mut CiEnv) -> CiMetadataRef {
        if self.basic_type.has_primitive_type() {
            return env.factory_mut().get_type(self.basic_type);
        }
        if let Some(ref t) = *self.field_type.read().unwrap() {
            return t.clone();
        }

        let sig = self.signature.symbol_str().unwrap_or("");
        let klass_name = if sig.starts_with('L') && sig.ends_with(';') && sig.len() > 2 {
            &sig[1..sig.len() - 1]
        } else {
            sig
        };
        let t = env.get_klass_by_name_impl(klass_name, self.loader, self.protection_domain, false)
            .unwrap_or_else(|| env.unloaded_ciinstance_klass());

        // an unshared wrapper never leaks into a shared field
        if !self.shared || t.is_shared() {
            *self.field_type.write().unwrap() = Some(t.clone());
        }
        t
    }
}
