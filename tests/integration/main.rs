//! Integration tests: the round controller driven end to end against an
//! in-memory mock store and against SQLite.

mod mock_store;
mod sqlite_flow;
