//! Integration tests for dbsync-dropbox
//!
//! Uses wiremock to simulate both Dropbox API hosts and verifies the
//! DropboxStore end to end: listings, downloads, uploads, namespace
//! operations, error mapping and token refresh.

mod common;

mod test_auth;
mod test_files;
