/*!
 * Per-Integration Patch Functions
 * Library-specific glue between loaded client surfaces and the lifecycle
 * channels
 */

pub mod kafka;
pub mod pubsub;
pub mod span_table;

pub use span_table::SpanTable;
