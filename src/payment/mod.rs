//! Import-payment detection.
//!
//! A client that wants to import an account pays a fixed amount to the
//! service's import address, tagged with a short payment id. The searcher
//! looks for that payment:
//!
//! ```text
//! find(payment_id, amount)
//!        │
//!        ▼
//! ┌─────────────────────┐
//! │ Check LRU cache     │──── HIT ───► tx hash
//! └─────────┬───────────┘
//!          MISS
//!           ▼
//! ┌─────────────────────┐
//! │ Mempool snapshot    │──── MATCH ─► tx hash (not cached)
//! └─────────┬───────────┘
//!         NONE
//!           ▼
//! ┌─────────────────────┐
//! │ Confirmed blocks,   │──── MATCH ─► cache + tx hash
//! │ ascending height    │
//! └─────────┬───────────┘
//!     NONE / node error
//!           ▼
//!         None
//! ```
//!
//! A transaction matches when its decrypted payment id equals the requested
//! one and the outputs it sends to the import address add up to at least
//! the requested amount.

mod cache;
mod searcher;

pub use cache::{CacheStats, FoundPaymentCache};
pub use searcher::PaymentSearcher;
