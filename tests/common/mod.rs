#![allow(dead_code)]

use std::error::Error;

pub use vertexsync_test_utils::builders::{
    ConfigFileBuilder, ConnectionBuilder, collections, criteria, record,
};
pub use vertexsync_test_utils::recording::{CountingServer, RecordingDatabase};
pub use vertexsync_test_utils::{init_tracing, with_timeout};

pub type TestResult = Result<(), Box<dyn Error>>;
