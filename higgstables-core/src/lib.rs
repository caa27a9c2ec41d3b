//! higgstables core library
//!
//! Turns per-event measurement records into per-category event counts.
//!
//! # Architecture
//!
//! The library evaluates one event population (one source file) at a time:
//! - Parses and type-checks condition strings once, at configuration time
//! - Fetches per-event vectors lazily through an [`EventSource`]
//! - Runs triggers, preselections and ordered categories as a
//!   [`SelectionCascade`], producing one [`CascadeResult`] per file
//! - Sums results into [`GroupedTable`]s, optionally with cross sections
//!
//! The library does NOT:
//! - Discover files on disk
//! - Load configuration files
//! - Write tables
//!
//! Those are handled by the application layer (higgstables-cli).
//!
//! # Example Usage
//!
//! ```
//! use higgstables_core::{CascadeConfig, ConfigSpec, InMemorySource, SelectionCascade};
//!
//! let spec = ConfigSpec::new("Events")
//!     .with_category("low", "x < 3")
//!     .with_category("mid", "x < 7")
//!     .with_category("rest", "x >= 0");
//! let config = CascadeConfig::from_spec(spec).unwrap();
//!
//! let source = InMemorySource::new()
//!     .with_variable("Events", "x", (0..10).collect::<Vec<i64>>());
//! let result = SelectionCascade::new(&config).run(&source).unwrap();
//!
//! assert_eq!(result.row(), vec![0, 3, 4, 3]);
//! ```

// Public modules
pub mod aggregator;
pub mod cascade;
pub mod config;
pub mod cross_sections;
pub mod expression;
pub mod source;
pub mod trigger;
pub mod types;

// Re-export main types for convenience
pub use aggregator::{GroupedTable, GroupingScheme, SourceFile, TableAggregator, CROSS_SECTION_COLUMN};
pub use cascade::SelectionCascade;
pub use config::{CascadeConfig, Category, ConditionSpec, ConfigSpec, OutputFormat, TriggerSpec};
pub use cross_sections::{CrossSectionProvider, CrossSectionTable, MachineCrossSections};
pub use expression::{Environment, Expression};
pub use resolver::VariableResolver;
pub use source::{EventSource, InMemorySource};
pub use trigger::{Selector, Trigger};
pub use types::{CascadeResult, Column, Mask, Result, TablesError, UNSELECTED};

mod resolver;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
