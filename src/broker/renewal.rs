// crates.io
use tokio::task::JoinHandle;
// self
use super::BrokerInner;
use crate::_prelude::*;

/// One-shot proactive renewal task.
///
/// The task only holds a weak reference, so a dropped broker stops it at its next wake-up.
pub(super) struct RenewalTimer {
	pub(super) ticket: u64,
	handle: JoinHandle<()>,
}
impl RenewalTimer {
	pub(super) fn arm(broker: Weak<BrokerInner>, ticket: u64, delay: StdDuration) -> Self {
		let handle = tokio::spawn(async move {
			tokio::time::sleep(delay).await;

			if let Some(inner) = broker.upgrade() {
				inner.renew(ticket).await;
			}
		});

		Self { ticket, handle }
	}

	pub(super) fn cancel(self) {
		self.handle.abort();
	}
}
