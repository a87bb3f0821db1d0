//! Integration tests for the testbed CLI
//!
//! These tests spawn the actual binary and test end-to-end behavior.
//! None of them reach docker: every case fails or exits before the first
//! container call.
