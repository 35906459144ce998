//! Integration tests: drive the full scan pipeline against in-memory
//! market sources and alert sinks.

mod mock_source;
mod pipeline;
