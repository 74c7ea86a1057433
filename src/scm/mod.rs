//! SCM Dispatcher (C5): classifies a source URL, decomposes its fragment
//! into ref + ref-type, and emits in-container checkout commands.
//!
//! Grounded on `original_source/task_adapters/scm/{git,base}.py`. Commit
//! hash is resolved via `exec_capture` rather than the source's
//! write-then-read-through-bind-mount trick — see SPEC_FULL.md's Open
//! Question decision.

mod error;
mod git;

pub use error::{ScmError, ScmResult};
pub use git::{get_scm_handler, CheckoutMetadata, CheckoutOptions, GitHandler, RefType};
