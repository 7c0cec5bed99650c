//! Core types shared between the watcher, builder and supervisor

use std::path::PathBuf;

/// What to compile and where to put the result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSpec {
    /// Package or directory handed to the compiler
    pub source: PathBuf,

    /// Where the compiled binary is written
    pub output: PathBuf,

    /// Extra arguments inserted before the source path
    pub extra_args: Vec<String>,
}

/// Outcome of one build attempt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildResult {
    /// Compiler exited successfully
    pub success: bool,

    /// Combined stdout and stderr of the compiler
    pub output: Vec<u8>,

    /// The build was superseded before it finished
    pub cancelled: bool,
}

impl BuildResult {
    pub fn succeeded(output: Vec<u8>) -> Self {
        Self {
            success: true,
            output,
            cancelled: false,
        }
    }

    pub fn failed(output: Vec<u8>) -> Self {
        Self {
            success: false,
            output,
            cancelled: false,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            success: false,
            output: Vec::new(),
            cancelled: true,
        }
    }

    /// Compiler output as text, lossily decoded
    pub fn output_text(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

/// Kind of filesystem change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Removed,
}

/// A relevant change reported by one of the watch strategies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Path relative to the working directory when it lies under it
    pub path: PathBuf,

    pub kind: ChangeKind,
}
