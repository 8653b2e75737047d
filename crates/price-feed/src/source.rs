//! Upstream price source abstraction

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use ltp_core::{Price, Symbol, UpstreamResult};

/// Batch lookup of last traded prices
///
/// Implementations return one price per symbol they could resolve and omit
/// the rest; the caller decides whether a missing symbol is fatal. A fired
/// `cancel` token must make the call return promptly with
/// [`UpstreamError::Cancelled`](ltp_core::UpstreamError::Cancelled).
#[async_trait::async_trait]
pub trait PriceSource: Send + Sync {
    async fn batch_fetch(
        &self,
        symbols: &[Symbol],
        cancel: &CancellationToken,
    ) -> UpstreamResult<HashMap<Symbol, Price>>;

    fn name(&self) -> &'static str;
}
