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
use crate::runtime::BasicType;
use crate::runtime::Oop;
use crate::runtime::OopKind;

use std::fmt;
use std::sync::Arc;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CiObjectKind {
    Null,
    Instance,
    ObjArray { length: usize },
    TypeArray { element: BasicType, length: usize },
    /// placeholder for an instance of a klass that is not loaded
    UnloadedInstance
}

/// A compiler-visible wrapper for a heap object.
pub struct CiObject {
    ident: usize,
    shared: bool,
    klass: Option<CiMetadataRef>,
    handle: Option<Oop>,
    scavengable: bool,
    kind: CiObjectKind
}

pub type CiObjectRef = Arc<CiObject>;

impl CiObject {
    pub(crate) fn null(ident: usize, shared: bool) -> CiObject {
        CiObject {
            ident,
            shared,
            klass: None,
            handle: None,
            scavengable: false,
            kind: CiObjectKind::Null
        }
    }

    pub(crate) fn from_oop(ident: usize, klass: CiMetadataRef, oop: Oop) -> CiObject {
        let kind = match oop.kind() {
            OopKind::Instance => CiObjectKind::Instance,
            OopKind::ObjArray { length } => CiObjectKind::ObjArray { length },
            OopKind::TypeArray { element, length } => CiObjectKind::TypeArray { element, length }
        };
        CiObject {
            ident,
            shared: false,
            klass: Some(klass),
            scavengable: oop.is_scavengable(),
            handle: Some(oop),
            kind
        }
    }

    pub(crate) fn unloaded_instance(ident: usize, klass: CiMetadataRef) -> CiObject {
        CiObject {
            ident,
            shared: false,
            klass: Some(klass),
            handle: None,
            scavengable: false,
            kind: CiObjectKind::UnloadedInstance
        }
    }

    pub fn ident(&self) -> usize {
        self.ident
    }

    pub fn hash(&self) -> usize {
        self.ident.wrapping_mul(31)
    }

    /// the null object is the only shared heap object
    pub fn is_shared(&self) -> bool {
        self.shared
    }

    pub fn kind(&self) -> CiObjectKind {
        self.kind
    }

    /// the klass wrapper; none for the null object
    pub fn klass(&self) -> Option<&CiMetadataRef> {
        self.klass.as_ref()
    }

    pub fn handle(&self) -> Option<&Oop> {
        self.handle.as_ref()
    }

    pub fn is_null_object(&self) -> bool {
        self.kind == CiObjectKind::Null
    }

    pub fn is_loaded(&self) -> bool {
        self.kind != CiObjectKind::UnloadedInstance
    }

    pub fn is_array(&self) -> bool {
        match self.kind {
            CiObjectKind::ObjArray { .. } | CiObjectKind::TypeArray { .. } => true,
            _ => false
        }
    }

    pub fn array_length(&self) -> Option<usize> {
        match self.kind {
            CiObjectKind::ObjArray { length } | CiObjectKind::TypeArray { length, .. } => Some(length),
            _ => None
        }
    }

    /// whether the object could move in a young collection, as of when
    /// the wrapper was made
    pub fn is_scavengable(&self) -> bool {
        self.scavengable
    }

    /// can compiled code embed a direct reference to this object
    pub fn can_be_constant(&self) -> bool {
        self.is_loaded() && !self.scavengable
    }
}

impl fmt::Display for CiObject {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            CiObjectKind::Null => write!(f, "<ciNullObject")?,
            CiObjectKind::Instance => write!(f, "<ciInstance")?,
            CiObjectKind::ObjArray { length } => write!(f, "<ciObjArray length={}", length)?,
            CiObjectKind::TypeArray { element, length } => {
                write!(f, "<ciTypeArray {}[{}]", element, length)?
            }
            CiObjectKind::UnloadedInstance => write!(f, "<ciInstance (unloaded)")?
        }
        if let Some(k) = self.klass.as_ref().and_then(|k| k.as_klass()) {
            write!(f, " klass={}", k.name_str())?;
        }
        write!(f, " ident={}", self.ident)?;
        if self.shared {
            write!(f, " shared")?;
        }
        if self.scavengable {
            write!(f, " scavengable")?;
        }
        write!(f, ">")
    }
}

impl fmt::Debug for CiObject {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}
