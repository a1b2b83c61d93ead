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
use crate::runtime::signature_arg_count;
use crate::runtime::Method;
use crate::runtime::MethodFlags;

use std::fmt;
use std::sync::Arc;

/// A method as the compiler sees it. Unloaded methods are placeholders
/// keyed by holder, name, signature and the klass that referred to them.
pub struct CiMethod {
    holder: CiMetadataRef,
    name: CiMetadataRef,
    signature: CiMetadataRef,
    method: Option<Arc<Method>>,
    accessor: Option<CiMetadataRef>,
    flags: MethodFlags,
    code_size: usize,
    arg_size: usize
}

impl CiMethod {
    pub(crate) fn loaded(holder: CiMetadataRef, name: CiMetadataRef, signature: CiMetadataRef, method: Arc<Method>) -> CiMethod {
        CiMethod {
            holder,
            name,
            signature,
            flags: method.flags(),
            code_size: method.code_size(),
            arg_size: method.arg_size(),
            method: Some(method),
            accessor: None
        }
    }

    pub(crate) fn unloaded(
        holder: CiMetadataRef,
        name: CiMetadataRef,
        signature: CiMetadataRef,
        accessor: CiMetadataRef
    ) -> CiMethod {
        // without the method the receiver is assumed
        let arg_size = signature.symbol_str()
            .and_then(signature_arg_count)
            .map_or(1, |n| n + 1);
        CiMethod {
            holder,
            name,
            signature,
            method: None,
            accessor: Some(accessor),
            flags: MethodFlags::default(),
            code_size: 0,
            arg_size
        }
    }

    pub fn holder(&self) -> &CiMetadataRef {
        &self.holder
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

    pub fn signature_str(&self) -> &str {
        self.signature.symbol_str().unwrap_or("")
    }

    pub fn method(&self) -> Option<&Arc<Method>> {
        self.method.as_ref()
    }

    /// the klass an unloaded method was looked up from
    pub fn accessor(&self) -> Option<&CiMetadataRef> {
        self.accessor.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.method.is_some()
    }

    pub fn flags(&self) -> MethodFlags {
        self.flags
    }

    pub fn is_static(&self) -> bool {
        self.flags.is_static()
    }

    pub fn code_size(&self) -> usize {
        self.code_size
    }

    pub fn arg_size(&self) -> usize {
        self.arg_size
    }

    pub fn has_method_data(&self) -> bool {
        self.method.as_ref().map_or(false, |m| m.method_data().is_some())
    }

    pub fn invocation_count(&self) -> u32 {
        self.method.as_ref().map_or(0, |m| m.invocation_count())
    }

    pub fn backedge_count(&self) -> u32 {
        self.method.as_ref().map_or(0, |m| m.backedge_count())
    }
}

impl fmt::Display for CiMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let holder = self.holder.as_klass().map_or("?", |k| k.name_str());
        write!(f, "ciMethod {}.{}{}", holder, self.name_str(), self.signature_str())?;
        if !self.is_loaded() {
            write!(f, " (unloaded)")?;
        }
        Ok(())
    }
}
