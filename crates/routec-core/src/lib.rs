pub mod attribute;
pub mod cache;
pub mod compiler;
pub mod config;
pub mod lexer;
pub mod namespace;
pub mod pattern;
pub mod reflect;
pub mod scanner;
pub mod table;
pub mod walker;

pub use attribute::{
    CallbackRef, ErrorAttribute, GroupAttribute, Middleware, PrefixAttribute, RouteAttribute,
};
pub use cache::{CacheContext, CacheStore, FsCacheStore, MemoryCacheStore, RouteCache};
pub use compiler::{CompileMetrics, Compiler, is_pattern_valid};
pub use config::Config;
pub use namespace::Layout;
pub use pattern::{excluder, is_controller_prefix, is_home, normalize};
pub use routec_error::{Error, ErrorKind, Result};
pub use table::{ExportTable, RouteTable};
pub use walker::{WalkContext, walk};
