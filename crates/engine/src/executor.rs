// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::invoke::ProgressSink;
use crate::report::JobReport;
use crate::request::JobRequest;

/// Runs validated job requests. The session server depends on this trait
/// rather than on [`Engine`](crate::Engine) so it can be exercised without
/// spawning plugins.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(
        &self,
        request: JobRequest,
        progress: Option<ProgressSink>,
        cancel: CancellationToken,
    ) -> JobReport;
}
