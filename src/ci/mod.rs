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

//! The compiler interface: stable wrappers for heap objects and metadata,
//! handed out by a per-compilation factory over a bootstrap-time shared set,
//! plus profile snapshots.

pub mod ci_env;
pub mod ci_field;
pub mod ci_klass;
pub mod ci_metadata;
pub mod ci_method;
pub mod ci_method_data;
pub mod ci_object;
pub mod ci_object_factory;
pub mod ci_symbol;

pub use self::ci_env::CiEnv;
pub use self::ci_field::CiField;
pub use self::ci_klass::{CiKlass, CiKlassKind};
pub use self::ci_metadata::*;
pub use self::ci_method::CiMethod;
pub use self::ci_method_data::*;
pub use self::ci_object::*;
pub use self::ci_object_factory::*;
pub use self::ci_symbol::CiSymbol;

pub const TRACE_CI: bool = false;
