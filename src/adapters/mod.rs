//! Task Adapters (C6): one adapter per Koji task type, each driving
//! `ContainerRuntime` to do the actual build work.
//!
//! `buildArch` and `rebuildSRPM` and `buildSRPMFromSCM` use the exec pattern
//! exclusively — a long-lived `sleep infinity` container is driven through a
//! sequence of `exec` calls, then force-removed — per the Open Question
//! decision in SPEC_FULL.md eliding the source's non-exec legacy path.
//! `createrepo` has no buildroot to set up and uses the `run()` convenience
//! instead.

mod base;
mod buildarch;
mod buildsrpm_scm;
mod createrepo;
mod error;
mod rebuild_srpm;

pub use base::{default_mounts, TaskContext};
pub use buildarch::{BuildArchAdapter, BuildArchParams, BuildArchResult};
pub use buildsrpm_scm::{BuildSrpmScmAdapter, BuildSrpmScmParams, BuildSrpmScmResult, ScmSourceInfo};
pub use createrepo::{CreaterepoAdapter, CreaterepoParams, CreaterepoResult};
pub use error::{AdapterError, AdapterResult};
pub use rebuild_srpm::{RebuildSrpmAdapter, RebuildSrpmParams, RebuildSrpmResult, SrpmSourceInfo};

use crate::config::{Configuration, PullPolicyConfig};
use crate::runtime::PullPolicy;

/// Converts the configured image pull policy into the runtime port's enum.
pub(crate) fn pull_policy(config: &Configuration) -> PullPolicy {
    match config.image_pull_policy {
        PullPolicyConfig::Always => PullPolicy::Always,
        PullPolicyConfig::IfNotPresent => PullPolicy::IfNotPresent,
        PullPolicyConfig::Never => PullPolicy::Never,
    }
}
