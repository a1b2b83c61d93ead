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

use crate::ci::ci_field::CiField;
use crate::ci::ci_metadata::CiMetadataRef;
use crate::runtime::BasicType;
use crate::runtime::ClassLoaderId;
use crate::runtime::Klass;
use crate::runtime::ProtectionDomainId;

use std::fmt;
use std::sync::Arc;

pub enum CiKlassKind {
    Instance {
        super_klass: Option<CiMetadataRef>,
        fields: Vec<CiField>,
        is_interface: bool
    },
    /// `base_element` is the innermost non-array element klass
    ObjArray {
        base_element: CiMetadataRef,
        dimension: usize
    },
    TypeArray {
        element: BasicType
    }
}

/// A klass as the compiler sees it. An unloaded klass is a placeholder
/// named by its symbol and the loader that asked for it.
pub struct CiKlass {
    name: CiMetadataRef,
    klass: Option<Arc<Klass>>,
    loader: ClassLoaderId,
    protection_domain: Option<ProtectionDomainId>,
    kind: CiKlassKind
}

impl CiKlass {
    pub(crate) fn loaded(name: CiMetadataRef, klass: Arc<Klass>, kind: CiKlassKind) -> CiKlass {
        CiKlass {
            name,
            loader: klass.loader(),
            protection_domain: klass.protection_domain(),
            klass: Some(klass),
            kind
        }
    }

    pub(crate) fn unloaded(
        name: CiMetadataRef,
        loader: ClassLoaderId,
        protection_domain: Option<ProtectionDomainId>,
        kind: CiKlassKind
    ) -> CiKlass {
        CiKlass { name, klass: None, loader, protection_domain, kind }
    }

    /// the name symbol wrapper
    pub fn name(&self) -> &CiMetadataRef {
        &self.name
    }

    pub fn name_str(&self) -> &str {
        self.name.symbol_str().unwrap_or("")
    }

    pub fn is_loaded(&self) -> bool {
        self.klass.is_some()
    }

    pub fn klass(&self) -> Option<&Arc<Klass>> {
        self.klass.as_ref()
    }

    pub fn loader(&self) -> ClassLoaderId {
        self.loader
    }

    pub fn protection_domain(&self) -> Option<ProtectionDomainId> {
        self.protection_domain
    }

    pub fn kind(&self) -> &CiKlassKind {
        &self.kind
    }

    pub fn is_instance_klass(&self) -> bool {
        match self.kind {
            CiKlassKind::Instance { .. } => true,
            _ => false
        }
    }

    pub fn is_array_klass(&self) -> bool {
        !self.is_instance_klass()
    }

    pub fn is_interface(&self) -> bool {
        match self.kind {
            CiKlassKind::Instance { is_interface, .. } => is_interface,
            _ => false
        }
    }

    pub fn super_klass(&self) -> Option<&CiMetadataRef> {
        match self.kind {
            CiKlassKind::Instance { ref super_klass, .. } => super_klass.as_ref(),
            _ => None
        }
    }

    pub fn fields(&self) -> &[CiField] {
        match self.kind {
            CiKlassKind::Instance { ref fields, .. } => fields,
            _ => &[]
        }
    }

    pub fn field_at_offset(&self, offset: usize, is_static: bool) -> Option<&CiField> {
        self.fields().iter().find(|f| f.offset() == offset && f.is_static() == is_static)
    }

    pub fn field_by_name(&self, name: &str) -> Option<&CiField> {
        self.fields().iter().find(|f| f.name_str() == name)
    }

    /// array dimension, 0 for instance klasses
    pub fn dimension(&self) -> usize {
        match self.kind {
            CiKlassKind::Instance { .. } => 0,
            CiKlassKind::ObjArray { dimension, .. } => dimension,
            CiKlassKind::TypeArray { .. } => 1
        }
    }

    pub fn base_element_klass(&self) -> Option<&CiMetadataRef> {
        match self.kind {
            CiKlassKind::ObjArray { ref base_element, .. } => Some(base_element),
            _ => None
        }
    }

    pub fn element_type(&self) -> Option<BasicType> {
        match self.kind {
            CiKlassKind::Instance { .. } => None,
            CiKlassKind::ObjArray { dimension, .. } => {
                if dimension > 1 {
                    Some(BasicType::Array)
                } else {
                    Some(BasicType::Object)
                }
            }
            CiKlassKind::TypeArray { element } => Some(element)
        }
    }

    pub fn basic_type(&self) -> BasicType {
        if self.is_instance_klass() {
            BasicType::Object
        } else {
            BasicType::Array
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.klass.as_ref().map_or(false, |k| k.is_initialized())
    }

    /// Only answers for loaded klasses; unloaded klasses are not known to
    /// be related to anything.
    pub fn is_subtype_of(&self, other: &CiKlass) -> bool {
        match (self.klass.as_ref(), other.klass.as_ref()) {
            (Some(a), Some(b)) => a.is_subclass_of(b),
            _ => false
        }
    }

    fn kind_name(&self) -> &'static str {
        match self.kind {
            CiKlassKind::Instance { .. } => "ciInstanceKlass",
            CiKlassKind::ObjArray { .. } => "ciObjArrayKlass",
            CiKlassKind::TypeArray { .. } => "ciTypeArrayKlass"
        }
    }
}

impl fmt::Display for CiKlass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} name={}", self.kind_name(), self.name_str())?;
        match self.klass {
            Some(ref k) => write!(f, " {}", k.id()),
            None => write!(f, " (unloaded, loader {:?})", self.loader)
        }
    }
}
