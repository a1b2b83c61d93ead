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

use crate::ci::ci_klass::CiKlass;
use crate::ci::ci_method::CiMethod;
use crate::ci::ci_method_data::CiMethodData;
use crate::ci::ci_symbol::CiSymbol;
use crate::runtime::BasicType;
use crate::runtime::MetadataId;

use std::fmt;
use std::sync::Arc;

/// a primitive type
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct CiType {
    basic_type: BasicType
}

impl CiType {
    pub(crate) fn new(basic_type: BasicType) -> CiType {
        debug_assert!(basic_type.has_primitive_type());
        CiType { basic_type }
    }

    pub fn basic_type(&self) -> BasicType {
        self.basic_type
    }
}

/// the return address a `jsr` pushes
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct CiReturnAddress {
    bci: usize
}

impl CiReturnAddress {
    pub(crate) fn new(bci: usize) -> CiReturnAddress {
        CiReturnAddress { bci }
    }

    pub fn bci(&self) -> usize {
        self.bci
    }
}

/// The kinds of metadata wrapper. Matching on this replaces type tests and
/// downcasts.
pub enum CiMetadataKind {
    Symbol(CiSymbol),
    Type(CiType),
    Klass(CiKlass),
    Method(CiMethod),
    MethodData(CiMethodData),
    ReturnAddress(CiReturnAddress)
}

/// A compiler-visible wrapper for a metadata item. A factory hands out at
/// most one wrapper per underlying item, so wrappers compare by address.
pub struct CiMetadata {
    ident: usize,
    shared: bool,
    kind: CiMetadataKind
}

pub type CiMetadataRef = Arc<CiMetadata>;

impl CiMetadata {
    pub(crate) fn new(ident: usize, shared: bool, kind: CiMetadataKind) -> CiMetadata {
        CiMetadata { ident, shared, kind }
    }

    /// creation order number, unique within the VM's shared set and one
    /// compilation
    pub fn ident(&self) -> usize {
        self.ident
    }

    /// created at bootstrap and visible to every compilation
    pub fn is_shared(&self) -> bool {
        self.shared
    }

    pub fn kind(&self) -> &CiMetadataKind {
        &self.kind
    }

    pub fn hash(&self) -> usize {
        self.ident.wrapping_mul(31)
    }

    /// Unloaded klass and method placeholders are the only wrappers that
    /// are not loaded.
    pub fn is_loaded(&self) -> bool {
        match self.kind {
            CiMetadataKind::Klass(ref k) => k.is_loaded(),
            CiMetadataKind::Method(ref m) => m.is_loaded(),
            CiMetadataKind::Symbol(_)
            | CiMetadataKind::Type(_)
            | CiMetadataKind::MethodData(_)
            | CiMetadataKind::ReturnAddress(_) => true
        }
    }

    /// the identity of the wrapped VM metadata, for loaded klasses,
    /// methods and non-empty profiles
    pub fn metadata_id(&self) -> Option<MetadataId> {
        match self.kind {
            CiMetadataKind::Klass(ref k) => k.klass().map(|k| k.id()),
            CiMetadataKind::Method(ref m) => m.method().map(|m| m.id()),
            CiMetadataKind::MethodData(ref md) => md.metadata_id(),
            CiMetadataKind::Symbol(_) | CiMetadataKind::Type(_) | CiMetadataKind::ReturnAddress(_) => None
        }
    }

    /// the basic type values of this type have
    pub fn basic_type(&self) -> Option<BasicType> {
        match self.kind {
            CiMetadataKind::Type(ref t) => Some(t.basic_type()),
            CiMetadataKind::Klass(ref k) => Some(k.basic_type()),
            CiMetadataKind::ReturnAddress(_) => Some(BasicType::Address),
            _ => None
        }
    }

    pub fn as_symbol(&self) -> Option<&CiSymbol> {
        match self.kind {
            CiMetadataKind::Symbol(ref s) => Some(s),
            _ => None
        }
    }

    pub fn as_type(&self) -> Option<&CiType> {
        match self.kind {
            CiMetadataKind::Type(ref t) => Some(t),
            _ => None
        }
    }

    pub fn as_klass(&self) -> Option<&CiKlass> {
        match self.kind {
            CiMetadataKind::Klass(ref k) => Some(k),
            _ => None
        }
    }

    pub fn as_method(&self) -> Option<&CiMethod> {
        match self.kind {
            CiMetadataKind::Method(ref m) => Some(m),
            _ => None
        }
    }

    pub fn as_method_data(&self) -> Option<&CiMethodData> {
        match self.kind {
            CiMetadataKind::MethodData(ref md) => Some(md),
            _ => None
        }
    }

    pub fn as_return_address(&self) -> Option<&CiReturnAddress> {
        match self.kind {
            CiMetadataKind::ReturnAddress(ref r) => Some(r),
            _ => None
        }
    }

    /// the text of a symbol wrapper
    pub fn symbol_str(&self) -> Option<&str> {
        self.as_symbol().map(|s| s.as_str())
    }
}

impl fmt::Display for CiMetadata {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<")?;
        match self.kind {
            CiMetadataKind::Symbol(ref s) => write!(f, "ciSymbol \"{}\"", s.as_str())?,
            CiMetadataKind::Type(ref t) => write!(f, "ciType {}", t.basic_type())?,
            CiMetadataKind::Klass(ref k) => write!(f, "{}", k)?,
            CiMetadataKind::Method(ref m) => write!(f, "{}", m)?,
            CiMetadataKind::MethodData(ref md) => write!(f, "{}", md)?,
            CiMetadataKind::ReturnAddress(ref r) => write!(f, "ciReturnAddress bci={}", r.bci())?
        }
        write!(f, " ident={}", self.ident)?;
        if self.shared {
            write!(f, " shared")?;
        }
        write!(f, ">")
    }
}

impl fmt::Debug for CiMetadata {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}
