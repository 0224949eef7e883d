pub mod bar;
pub mod granularity;
pub mod options;
pub mod query;
pub mod symbol;

pub use bar::{Bar, Price};
pub use granularity::{Granularity, SpanClass};
pub use options::{OptionRight, OptionRow};
pub use query::{fingerprint, BarsQuery};
pub use symbol::{Symbol, SymbolInterner};
