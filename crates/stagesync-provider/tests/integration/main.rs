//! Integration tests for stagesync-provider
//!
//! Drives the folder provider through the `ISyncProvider` port the way the
//! sync engine does: publish a snapshot from one device, fetch it from
//! another, and check change detection in between.

mod common;

mod test_folder_exchange;
