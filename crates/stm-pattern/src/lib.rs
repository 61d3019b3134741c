//! # stm-pattern
//!
//! Parser for the comparison-expression language carried by STIX indicators.
//!
//! Only flat expressions are accepted: one bracketed observation whose
//! clauses are joined entirely by `AND` or entirely by `OR`. A parsed
//! [`Pattern`] yields ordered `(qualified key, value)` pairs, and
//! [`CompositeRules`] collapses the clauses of a composite attribute
//! (`filename|md5`, `ip-dst|port`, ...) back into one joined value.
//!
//! ```
//! use stm_pattern::{CompositeRules, Collapsed, parse};
//!
//! let pattern = parse("[file:hashes.MD5 = 'aaa' AND file:name = 'x.exe']").unwrap();
//! let collapsed = CompositeRules::default().collapse(&pattern).unwrap();
//! assert_eq!(collapsed.value(), "x.exe|aaa");
//! ```

pub mod composite;
pub mod error;
pub mod grammar;
pub mod path;

pub use composite::{Collapsed, CompositeGroup, CompositeRules, CompositeValue};
pub use error::PatternError;
pub use grammar::{Clause, Joiner, Literal, Operator, Pattern, parse};
pub use path::{FieldPath, Segment};
