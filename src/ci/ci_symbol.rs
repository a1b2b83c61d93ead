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

use crate::runtime::Symbol;
use crate::runtime::VmSymbolId;

/// a symbol as the compiler sees it
pub struct CiSymbol {
    symbol: Symbol,
    sid: Option<VmSymbolId>
}

impl CiSymbol {
    pub(crate) fn new(symbol: Symbol) -> CiSymbol {
        let sid = VmSymbolId::find(symbol.as_str());
        CiSymbol { symbol, sid }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn as_str(&self) -> &str {
        self.symbol.as_str()
    }

    /// the VM symbol this is, if any
    pub fn sid(&self) -> Option<VmSymbolId> {
        self.sid
    }

    pub fn equals(&self, s: &str) -> bool {
        self.symbol.as_str() == s
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.symbol.starts_with(prefix)
    }

    pub fn len(&self) -> usize {
        self.symbol.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbol.is_empty()
    }
}
