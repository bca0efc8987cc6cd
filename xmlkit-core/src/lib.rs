//! xmlkit core - streaming path-selected XML engine
//!
//! This library provides the shared machinery behind the xmlkit
//! command-line tools: an event tokenizer, a path/selection engine,
//! selection-aware document walkers, and the write pipeline with
//! rollback discipline.

pub mod attfilter;
pub mod attlist;
pub mod blockmgr;
pub mod collect;
pub mod cursor;
pub mod echo;
pub mod entities;
pub mod error;
pub mod escape;
pub mod fbparser;
pub mod fbreader;
pub mod filelist;
pub mod fixtags;
pub mod history;
pub mod input;
pub mod leafparse;
pub mod parser;
pub mod path;
pub mod pattern;
pub mod predicate;
pub mod rcm;
pub mod rollback;
pub mod select;
pub mod signal;
pub mod skip;
pub mod stdparse;
pub mod token;
pub mod unecho;
pub mod wrap;

pub use attlist::AttributeList;
pub use collect::TempCollect;
pub use cursor::Cursor;
pub use echo::Echo;
pub use error::XmlkitError;
pub use filelist::{FileList, FileListFlags};
pub use fixtags::Fixtags;
pub use leafparse::{Leaf, LeafFlags, LeafReader};
pub use parser::{Consumer, EventParser, Flow};
pub use path::XmlPath;
pub use pattern::{match_pattern, MatchOutcome};
pub use rcm::{Rcm, RcmFlags};
pub use rollback::RollbackFile;
pub use select::Selector;
pub use stdparse::{ParseFlags, StdConsumer, StdParser, StdState};
pub use token::{NodeKind, Tokenizer, XmlEvent};
pub use unecho::{Unecho, UnechoFlags};
pub use wrap::Wrap;

/// Result type alias for xmlkit operations
pub type Result<T> = std::result::Result<T, XmlkitError>;
